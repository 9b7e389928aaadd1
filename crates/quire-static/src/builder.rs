//! Blog builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use walkdir::WalkDir;

use quire_md::MarkdownRenderer;

use crate::index::{Index, SettingsError, Site, SETTINGS_FILENAME};
use crate::post::{PostError, PostSource, POST_DIR};
use crate::templates::{TemplateError, TemplateSet, FEED_TEMPLATE, INDEX_TEMPLATE, POST_TEMPLATE};

/// Extension of post source files.
pub const SOURCE_EXTENSION: &str = "md";

/// Rendered index page, relative to the output directory.
pub const INDEX_OUTPUT: &str = "index.html";

/// Rendered feed document, relative to the output directory.
pub const FEED_OUTPUT: &str = "index.xml";

/// Configuration for building a blog.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory with `*.md` posts and the settings file
    pub source_dir: PathBuf,

    /// Directory with the post, index and feed templates
    pub templates_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            templates_dir: PathBuf::from("templates"),
            output_dir: PathBuf::from("generated"),
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of posts written
    pub posts: usize,

    /// Number of drafts skipped
    pub drafts: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// Errors that can occur during build.
///
/// Every error aborts the build. Files written before the failure stay on disk.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to list source files in {}: {source}", path.display())]
    Discover {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read site settings {}: {source}", path.display())]
    Settings {
        path: PathBuf,
        source: SettingsError,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse { path: PathBuf, source: PostError },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Failed to render {template} into {}: {source}", target.display())]
    Render {
        template: &'static str,
        target: PathBuf,
        source: minijinja::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Builds the whole blog from scratch on every call.
pub struct BlogBuilder {
    config: BuildConfig,
    renderer: Arc<MarkdownRenderer>,
}

impl BlogBuilder {
    /// Create a new builder.
    pub fn new(config: BuildConfig, renderer: Arc<MarkdownRenderer>) -> Self {
        Self { config, renderer }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build the blog.
    ///
    /// Templates and settings are loaded first, then every post is rendered and written
    /// in turn, and finally the sorted index page and feed are written.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        let config = &self.config;

        let templates = TemplateSet::load(&config.templates_dir)?;

        let settings_path = config.source_dir.join(SETTINGS_FILENAME);
        let settings = read(&settings_path)?;
        let site = Site::parse(&settings, Utc::now()).map_err(|source| BuildError::Settings {
            path: settings_path.clone(),
            source,
        })?;
        let mut index = Index::new(site);

        let post_dir = config.output_dir.join(POST_DIR);
        fs::create_dir_all(&post_dir).map_err(|source| BuildError::Write {
            path: post_dir.clone(),
            source,
        })?;

        let mut drafts = 0;
        for path in list_source_files(&config.source_dir)? {
            let source = read(&path)?;
            let parse_error = |source| BuildError::Parse {
                path: path.clone(),
                source,
            };

            let post_source = PostSource::parse(&path, &source).map_err(parse_error)?;
            if post_source.is_draft() {
                drafts += 1;
                self.remove_stale(&post_source.output_path())?;
                tracing::info!("Skipping draft {}", path.display());
                continue;
            }

            let post = post_source
                .render(&index.site.url, &self.renderer)
                .map_err(parse_error)?;

            let target = config.output_dir.join(&post.output_path);
            let html = templates
                .render_post(&post, &index.site)
                .map_err(|source| BuildError::Render {
                    template: POST_TEMPLATE,
                    target: target.clone(),
                    source,
                })?;
            write(&target, html)?;

            tracing::info!("Built {} -> {}", path.display(), target.display());
            index.push(post);
        }

        index.sort();

        let target = config.output_dir.join(INDEX_OUTPUT);
        let html = templates
            .render_index(&index)
            .map_err(|source| BuildError::Render {
                template: INDEX_TEMPLATE,
                target: target.clone(),
                source,
            })?;
        write(&target, html)?;

        let target = config.output_dir.join(FEED_OUTPUT);
        let xml = templates
            .render_feed(&index)
            .map_err(|source| BuildError::Render {
                template: FEED_TEMPLATE,
                target: target.clone(),
                source,
            })?;
        write(&target, xml)?;

        Ok(BuildResult {
            posts: index.len(),
            drafts,
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: config.output_dir.clone(),
        })
    }

    /// Remove the page of a post that has become a draft.
    fn remove_stale(&self, output_path: &str) -> Result<(), BuildError> {
        let path = self.config.output_dir.join(output_path);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Removed stale {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BuildError::Write { path, source }),
        }
    }
}

/// List the post sources in a directory, sorted by file name.
///
/// Only direct children with the `.md` extension count; the settings file is skipped.
pub fn list_source_files(source_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(source_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| BuildError::Discover {
            path: source_dir.to_path_buf(),
            source,
        })?;

        if is_post_source(entry.path()) && entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Whether a path names a post source: a `.md` file other than the settings file.
pub fn is_post_source(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    ext == SOURCE_EXTENSION && name != SETTINGS_FILENAME
}

fn read(path: &Path) -> Result<Vec<u8>, BuildError> {
    fs::read(path).map_err(|source| BuildError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: String) -> Result<(), BuildError> {
    fs::write(path, contents).map_err(|source| BuildError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{DEFAULT_FEED_TEMPLATE, DEFAULT_INDEX_TEMPLATE, DEFAULT_POST_TEMPLATE};
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};

    const SETTINGS: &str =
        "---\ntitle: Test Blog\nurl: https://blog.example/\nxmlurl: https://blog.example/index.xml\n---\n";

    fn seed() -> (TempDir, BuildConfig) {
        let temp = tempdir().unwrap();
        let source_dir = temp.path().join("src");
        let templates_dir = temp.path().join("templates");
        fs::create_dir_all(&source_dir).unwrap();
        fs::create_dir_all(&templates_dir).unwrap();

        fs::write(source_dir.join(SETTINGS_FILENAME), SETTINGS).unwrap();
        fs::write(templates_dir.join(POST_TEMPLATE), DEFAULT_POST_TEMPLATE).unwrap();
        fs::write(templates_dir.join(INDEX_TEMPLATE), DEFAULT_INDEX_TEMPLATE).unwrap();
        fs::write(templates_dir.join(FEED_TEMPLATE), DEFAULT_FEED_TEMPLATE).unwrap();

        let config = BuildConfig {
            source_dir,
            templates_dir,
            output_dir: temp.path().join("generated"),
        };
        (temp, config)
    }

    fn post(config: &BuildConfig, name: &str, contents: &str) {
        fs::write(config.source_dir.join(name), contents).unwrap();
    }

    fn builder(config: &BuildConfig) -> BlogBuilder {
        BlogBuilder::new(config.clone(), Arc::new(MarkdownRenderer::default()))
    }

    #[test]
    fn builds_simple_blog() {
        let (_temp, config) = seed();
        post(&config, "hello.md", "---\ntitle: Hello\ndate: 2021-06-15\n---\n# Welcome\n");

        let result = builder(&config).build().unwrap();

        assert_eq!(result.posts, 1);
        assert_eq!(result.drafts, 0);
        let out = &config.output_dir;
        let page = fs::read_to_string(out.join("post/hello.html")).unwrap();
        assert!(page.contains("<h1 id=\"welcome\">Welcome</h1>"));
        assert!(page.contains("<title>Hello - Test Blog</title>"));
        assert!(out.join(INDEX_OUTPUT).exists());
        let feed = fs::read_to_string(out.join(FEED_OUTPUT)).unwrap();
        assert!(feed.contains("<link>https://blog.example/post/hello</link>"));
    }

    #[test]
    fn skips_drafts() {
        let (_temp, config) = seed();
        post(&config, "public.md", "---\ntitle: Public\n---\nvisible\n");
        post(&config, "secret.md", "---\ntitle: Secret\ndraft: true\n---\nhidden\n");

        let result = builder(&config).build().unwrap();

        assert_eq!(result.posts, 1);
        assert_eq!(result.drafts, 1);
        assert!(config.output_dir.join("post/public.html").exists());
        assert!(!config.output_dir.join("post/secret.html").exists());
        let index = fs::read_to_string(config.output_dir.join(INDEX_OUTPUT)).unwrap();
        assert!(!index.contains("Secret"));
        let feed = fs::read_to_string(config.output_dir.join(FEED_OUTPUT)).unwrap();
        assert!(!feed.contains("Secret"));
    }

    #[test]
    fn removes_page_of_post_turned_draft() {
        let (_temp, config) = seed();
        post(&config, "later.md", "---\ntitle: Later\n---\nbody\n");
        builder(&config).build().unwrap();
        assert!(config.output_dir.join("post/later.html").exists());

        post(&config, "later.md", "---\ntitle: Later\ndraft: true\n---\nbody\n");
        builder(&config).build().unwrap();

        assert!(!config.output_dir.join("post/later.html").exists());
    }

    #[test]
    fn orders_index_by_date() {
        let (_temp, config) = seed();
        post(&config, "a.md", "---\ntitle: First Old\ndate: 2020-01-01\n---\n");
        post(&config, "b.md", "---\ntitle: Newest\ndate: 2021-06-15\n---\n");
        post(&config, "c.md", "---\ntitle: Second Old\ndate: 2020-01-01\n---\n");

        builder(&config).build().unwrap();

        let index = fs::read_to_string(config.output_dir.join(INDEX_OUTPUT)).unwrap();
        let newest = index.find("Newest").unwrap();
        let first = index.find("First Old").unwrap();
        let second = index.find("Second Old").unwrap();
        assert!(newest < first && first < second);
    }

    #[test]
    fn rebuild_is_idempotent_except_feed_timestamp() {
        let (_temp, config) = seed();
        post(&config, "a.md", "---\ntitle: A\ndate: 2020-01-01\n---\nSome *text* 1/2.\n");
        post(&config, "b.md", "---\ntitle: B\n---\n```rust\nfn main() {}\n```\n");
        let builder = builder(&config);

        let snapshot = || {
            ["post/a.html", "post/b.html", INDEX_OUTPUT, FEED_OUTPUT]
                .map(|f| fs::read_to_string(config.output_dir.join(f)).unwrap())
        };
        let strip_timestamp = |feed: &str| {
            feed.lines()
                .filter(|l| !l.contains("<lastBuildDate>"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        builder.build().unwrap();
        let first = snapshot();
        builder.build().unwrap();
        let second = snapshot();

        assert_eq!(first[..3], second[..3]);
        assert_eq!(strip_timestamp(&first[3]), strip_timestamp(&second[3]));
    }

    #[test]
    fn missing_title_aborts_build() {
        let (_temp, config) = seed();
        post(&config, "a.md", "---\ntitle: Fine\n---\n");
        post(&config, "b.md", "---\ndate: 2020-01-01\n---\nno title\n");

        let err = builder(&config).build().unwrap_err();

        assert!(matches!(err, BuildError::Parse { ref path, .. } if path.ends_with("b.md")));
        assert!(!config.output_dir.join(INDEX_OUTPUT).exists());
    }

    #[test]
    fn unclosed_frontmatter_aborts_build() {
        let (_temp, config) = seed();
        post(&config, "broken.md", "---\ntitle: Broken\n\nno closing line\n");

        let err = builder(&config).build().unwrap_err();

        assert!(matches!(err, BuildError::Parse { .. }));
    }

    #[test]
    fn settings_errors_are_fatal() {
        let (_temp, config) = seed();
        fs::write(
            config.source_dir.join(SETTINGS_FILENAME),
            "---\ntitle: No URLs\n---\n",
        )
        .unwrap();

        let err = builder(&config).build().unwrap_err();

        assert!(matches!(err, BuildError::Settings { .. }));
    }

    #[test]
    fn template_errors_are_fatal() {
        let (_temp, config) = seed();
        fs::write(config.templates_dir.join(INDEX_TEMPLATE), "{% for %}").unwrap();

        let err = builder(&config).build().unwrap_err();

        assert!(matches!(err, BuildError::Template(TemplateError::Syntax { .. })));
    }

    #[test]
    fn lists_only_markdown_posts() {
        let (_temp, config) = seed();
        post(&config, "b.md", "");
        post(&config, "a.md", "");
        post(&config, "notes.txt", "");
        fs::create_dir_all(config.source_dir.join("nested.md")).unwrap();

        let files = list_source_files(&config.source_dir).unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.md", "b.md"]);
    }
}
