//! quire CLI - static blog generator.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Static blog generator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to quire.toml config file
    #[arg(short, long, global = true, default_value = "quire.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a new blog
    Init {
        /// Directory to create the blog in
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Build the blog, optionally watching for changes and serving the output
    Build {
        /// Directory with posts and _index.md (defaults to config or "src")
        source: Option<PathBuf>,

        /// Directory with post.html, index.html and feed.xml
        #[arg(short, long)]
        templates: Option<PathBuf>,

        /// Output directory (defaults to config or "generated")
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Assets directory served at /assets (defaults to <output>/assets)
        #[arg(short, long)]
        assets: Option<PathBuf>,

        /// Rebuild when sources or templates change
        #[arg(short, long)]
        watch: bool,

        /// Serve the output on this address
        #[arg(short, long)]
        serve: Option<SocketAddr>,
    },

    /// Serve a built blog
    Serve {
        /// Address to listen on (defaults to config or 127.0.0.1:8080)
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Open browser on start
        #[arg(long)]
        open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Init { dir, yes } => {
            commands::init::run(&dir, yes)?;
        }
        Commands::Build {
            source,
            templates,
            output,
            assets,
            watch,
            serve,
        } => {
            let config = Config::load(&cli.config)?.resolve(Overrides {
                source,
                templates,
                output,
                assets,
                addr: None,
            });
            commands::build::run(config, watch, serve).await?;
        }
        Commands::Serve { addr, open } => {
            let config = Config::load(&cli.config)?.resolve(Overrides {
                addr,
                ..Overrides::default()
            });
            commands::serve::run(config, open).await?;
        }
    }

    Ok(())
}
