//! Blog build command, with optional watch mode and serving.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use quire_md::MarkdownRenderer;
use quire_server::{rebuild_queue, FileServer, FileWatcher, ServeConfig};
use quire_static::{BlogBuilder, BuildResult};

use crate::config::Settings;

/// Run the build command.
///
/// A failed build is fatal unless watching, in which case it is logged and the next
/// change triggers another attempt.
pub async fn run(settings: Settings, watch: bool, serve: Option<SocketAddr>) -> Result<()> {
    settings.prepare_dirs()?;

    let renderer = Arc::new(MarkdownRenderer::new(settings.render.clone()));
    let builder = Arc::new(BlogBuilder::new(settings.build.clone(), renderer));

    tracing::info!("Building blog...");
    let initial = {
        let builder = Arc::clone(&builder);
        tokio::task::spawn_blocking(move || builder.build())
            .await
            .context("Build task failed")?
    };
    match initial {
        Ok(result) => report(&result),
        Err(e) if watch => tracing::error!("Build failed: {}", e),
        Err(e) => return Err(e).context("Build failed"),
    }

    if watch {
        let (requests, worker) = rebuild_queue();
        FileWatcher::new(&settings.build)?.spawn(requests);

        let builder = Arc::clone(&builder);
        tokio::spawn(worker.run(move || match builder.build() {
            Ok(result) => report(&result),
            Err(e) => tracing::error!("Rebuild failed: {}", e),
        }));
        tracing::info!("Watching {} for changes", settings.build.source_dir.display());
    }

    match serve {
        Some(addr) => {
            let config = ServeConfig {
                output_dir: settings.build.output_dir,
                assets_dir: settings.assets_dir,
                addr,
                open: false,
            };
            FileServer::new(config).start().await?;
        }
        None if watch => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
        }
        None => {}
    }

    Ok(())
}

fn report(result: &BuildResult) {
    tracing::info!(
        "Built {} posts ({} drafts skipped) in {}ms",
        result.posts,
        result.drafts,
        result.duration_ms
    );
    tracing::debug!("Output: {}", result.output_dir.display());
}
