use super::{Payload, Transform, TransformContext};

/// Marks the module as hot-replaceable. The dev server pushes changed
/// factories of hot modules instead of asking the page to reload.
#[derive(Debug, Default)]
pub struct HotReload;

impl Transform for HotReload {
    fn name(&self) -> &'static str {
        "hot"
    }

    fn apply(&self, input: Payload, cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        if cx.options.hot {
            cx.mark_hot();
        }
        Ok(input)
    }
}
