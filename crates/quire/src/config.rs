//! Configuration file (quire.toml) and startup directory checks.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quire_md::RenderOptions;
use quire_static::post::POST_DIR;
use quire_static::BuildConfig;
use serde::Deserialize;

/// Configuration file structure (quire.toml).
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    paths: PathsConfig,
    serve: ServeSection,
    markdown: MarkdownConfig,
}

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct PathsConfig {
    source: Option<PathBuf>,
    templates: Option<PathBuf>,
    output: Option<PathBuf>,
    assets: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct ServeSection {
    addr: Option<SocketAddr>,
}

/// Markdown extensions. Anything left out keeps its default.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct MarkdownConfig {
    tables: Option<bool>,
    strikethrough: Option<bool>,
    definition_lists: Option<bool>,
    smart_punctuation: Option<bool>,
    smart_fractions: Option<bool>,
    heading_ids: Option<bool>,
    autolink: Option<bool>,
    lenient_headings: Option<bool>,
}

impl MarkdownConfig {
    fn options(&self) -> RenderOptions {
        let defaults = RenderOptions::default();
        RenderOptions {
            tables: self.tables.unwrap_or(defaults.tables),
            strikethrough: self.strikethrough.unwrap_or(defaults.strikethrough),
            definition_lists: self.definition_lists.unwrap_or(defaults.definition_lists),
            smart_punctuation: self.smart_punctuation.unwrap_or(defaults.smart_punctuation),
            smart_fractions: self.smart_fractions.unwrap_or(defaults.smart_fractions),
            heading_ids: self.heading_ids.unwrap_or(defaults.heading_ids),
            autolink: self.autolink.unwrap_or(defaults.autolink),
            lenient_headings: self.lenient_headings.unwrap_or(defaults.lenient_headings),
        }
    }
}

/// Values given on the command line. They win over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub source: Option<PathBuf>,
    pub templates: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub assets: Option<PathBuf>,
    pub addr: Option<SocketAddr>,
}

/// Fully resolved settings for a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub build: BuildConfig,
    pub assets_dir: PathBuf,
    pub addr: SocketAddr,
    pub render: RenderOptions,
}

const DEFAULT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);

impl Config {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the config file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());

        Ok(config)
    }

    /// Merge command-line values over the file and fill in defaults.
    pub fn resolve(self, overrides: Overrides) -> Settings {
        let defaults = BuildConfig::default();
        let paths = self.paths;

        let output_dir = overrides
            .output
            .or(paths.output)
            .unwrap_or(defaults.output_dir);
        let assets_dir = overrides
            .assets
            .or(paths.assets)
            .unwrap_or_else(|| output_dir.join("assets"));

        Settings {
            build: BuildConfig {
                source_dir: overrides.source.or(paths.source).unwrap_or(defaults.source_dir),
                templates_dir: overrides
                    .templates
                    .or(paths.templates)
                    .unwrap_or(defaults.templates_dir),
                output_dir,
            },
            assets_dir,
            addr: overrides
                .addr
                .or(self.serve.addr)
                .unwrap_or_else(|| SocketAddr::from(DEFAULT_ADDR)),
            render: self.markdown.options(),
        }
    }
}

impl Settings {
    /// Make sure the output, post and assets directories exist, creating them as needed.
    pub fn prepare_dirs(&self) -> Result<()> {
        let output = &self.build.output_dir;
        for dir in [output.clone(), output.join(POST_DIR), self.assets_dir.clone()] {
            if dir.is_dir() {
                continue;
            }
            fs::create_dir_all(&dir)
                .with_context(|| format!("Path {} couldn't be created", dir.display()))?;
        }
        Ok(())
    }

    /// Fail unless the output and assets directories both exist.
    pub fn require_dirs(&self) -> Result<()> {
        let output = &self.build.output_dir;
        if !output.is_dir() {
            anyhow::bail!(
                "Directory not found: {}. Run 'quire build' first.",
                output.display()
            );
        }
        if !self.assets_dir.is_dir() {
            anyhow::bail!("Assets directory not found: {}", self.assets_dir.display());
        }
        Ok(())
    }
}
