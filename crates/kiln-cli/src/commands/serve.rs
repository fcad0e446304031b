//! `kiln serve`.
//!
//! The watcher starts first so edits made during the initial build queue up
//! for the build loop. The build loop and the HTTP server then run side by
//! side until Ctrl+C.

use std::sync::Arc;

use kiln_bundler::{CleanPolicy, Mode, Pipeline, ServeContext};
use tokio::signal;

use crate::cli::ServeArgs;
use crate::config;
use crate::dev::{DevBuilder, DevServer, DevServerConfig, DevServerState, FileWatcher, WatchFilter};
use crate::error::Result;
use crate::ui;

pub async fn execute(args: ServeArgs) -> Result<()> {
    let root = config::project_root(&args.project)?;
    let config = config::load(&root, &args.project, &config::serve_overrides(&args))?;
    let dev = &config.dev;
    let mode = Mode::from(args.mode);

    // The disk copy is cleaned once; later generations only live in memory.
    let pipeline = Pipeline::new(
        config::pipeline_config(&config, &root, &dev.public_path, CleanPolicy::OncePerProcess),
        mode,
        ServeContext::Server { hot: dev.hot },
    );
    let out_dir = pipeline.out_dir().to_path_buf();
    let state = Arc::new(DevServerState::new(out_dir.clone()));
    let builder = DevBuilder::new(pipeline, Arc::clone(&state), dev.debounce_ms);

    let filter = WatchFilter::new(root.clone(), dev.watch_ignore.clone()).ignore_dir(out_dir);
    let (watcher, change_rx) = FileWatcher::new(filter, dev.debounce_ms)?;
    ui::info(&format!("Watching {}", watcher.root().display()));

    ui::info(&format!(
        "Starting {} build of {} ({})",
        mode,
        root.display(),
        builder.pipeline().profile().name()
    ));
    // A failed first build is reported to pages once they connect.
    builder.build_once().await?;

    let server = DevServer::new(
        DevServerConfig {
            host: dev.host.clone(),
            port: dev.port,
            public_path: mount_path(&dev.public_path),
            cors: dev.cors,
        },
        Arc::clone(&state),
    );
    let mut server_handle = tokio::spawn(server.start());
    let mut build_handle = tokio::spawn(builder.run(change_rx));

    ui::info("Press Ctrl+C to stop");

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            ui::info("Shutting down...");
            Ok(())
        }
        served = &mut server_handle => match served {
            Ok(Ok(())) => {
                ui::warning("Server stopped unexpectedly");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(crate::error::CliError::Server(e.to_string())),
        },
        _ = &mut build_handle => {
            ui::warning("Build loop stopped unexpectedly");
            Ok(())
        }
    };

    server_handle.abort();
    build_handle.abort();
    drop(watcher);

    if result.is_ok() {
        ui::success("Development server stopped");
    }
    result
}

/// Path part of a public path, which may be an absolute URL.
pub fn mount_path(public_path: &str) -> String {
    match public_path.split_once("://") {
        Some((_, rest)) => rest
            .find('/')
            .map(|i| rest[i..].to_string())
            .unwrap_or_else(|| "/".to_string()),
        None => public_path.to_string(),
    }
}
