//! Preview server command.

use anyhow::Result;
use quire_server::{FileServer, ServeConfig};

use crate::config::Settings;

/// Run the serve command.
pub async fn run(settings: Settings, open: bool) -> Result<()> {
    settings.require_dirs()?;

    let config = ServeConfig {
        output_dir: settings.build.output_dir,
        assets_dir: settings.assets_dir,
        addr: settings.addr,
        open,
    };

    FileServer::new(config).start().await?;

    Ok(())
}
