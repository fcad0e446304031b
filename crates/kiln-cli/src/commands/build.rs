//! `kiln build`.

use std::time::Instant;

use kiln_bundler::{CleanPolicy, DiskSink, Mode, Pipeline, ServeContext};

use crate::cli::BuildArgs;
use crate::config;
use crate::error::{BuildError, Result};
use crate::ui;

/// 1. Load configuration (flags > environment > file > defaults)
/// 2. Clean, copy, route and link one generation
/// 3. Write it under the output directory and print the summary
pub async fn execute(args: BuildArgs) -> Result<()> {
    let start = Instant::now();

    let root = config::project_root(&args.project)?;
    let config = config::load(&root, &args.project, &config::build_overrides(&args))?;
    let mode = Mode::from(args.mode);

    let pipeline = Pipeline::new(
        config::pipeline_config(&config, &root, &config.build.public_path, CleanPolicy::EveryBuild),
        mode,
        ServeContext::Build,
    );
    let out_dir = pipeline.out_dir().to_path_buf();
    ui::info(&format!(
        "Building {} {} in {} mode",
        config.build.entries.len(),
        if config.build.entries.len() == 1 { "entry" } else { "entries" },
        mode
    ));

    let spinner = ui::Spinner::new("Building...");
    let sink = DiskSink::new(&out_dir);
    let result = tokio::task::spawn_blocking(move || pipeline.build_into(&sink))
        .await
        .map_err(|e| BuildError::Task(e.to_string()))?;

    let output = match result {
        Ok(output) => {
            spinner.finish(&format!("Built generation {}", output.manifest.generation));
            output
        }
        Err(e) => {
            spinner.fail("Build failed");
            return Err(e.into());
        }
    };

    ui::print_build_summary(&output, start.elapsed());
    ui::success(&format!("Wrote {}", out_dir.display()));
    Ok(())
}
