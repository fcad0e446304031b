use anyhow::{Context, bail};
use oxc_sourcemap::SourceMapBuilder;

use super::{Payload, ScriptModule, Transform, TransformContext};

/// Wraps a JSON document as a script module exporting the parsed value.
#[derive(Debug, Default)]
pub struct JsonModule;

impl Transform for JsonModule {
    fn name(&self) -> &'static str {
        "json"
    }

    fn apply(&self, input: Payload, cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        let Payload::Bytes(bytes) = input else {
            bail!("json stage expects source bytes, got {}", input.kind_name());
        };

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).context("invalid JSON document")?;
        let code = format!("module.exports = {};", serde_json::to_string(&value)?);

        let map = cx.options.source_map.then(|| {
            let mut builder = SourceMapBuilder::default();
            let id = builder.set_source_and_content(&cx.asset.rel, &String::from_utf8_lossy(&bytes));
            builder.add_token(0, 0, 0, 0, Some(id), None);
            builder.into_sourcemap()
        });

        Ok(Payload::Script(ScriptModule { code, map }))
    }
}
