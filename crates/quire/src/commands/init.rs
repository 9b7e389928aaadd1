//! Scaffold a new blog.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use quire_md::highlight_css;
use quire_static::templates::{
    DEFAULT_FEED_TEMPLATE, DEFAULT_INDEX_TEMPLATE, DEFAULT_POST_TEMPLATE, FEED_TEMPLATE,
    INDEX_TEMPLATE, POST_TEMPLATE,
};

/// Theme the scaffolded highlight stylesheet is generated from.
const HIGHLIGHT_THEME: &str = "InspiredGitHub";

/// Run the init command.
pub fn run(dir: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing blog in {}...", dir.display());

    let css = highlight_css(HIGHLIGHT_THEME)
        .with_context(|| format!("Highlight theme {HIGHLIGHT_THEME} is not available"))?;

    let files: Vec<(String, &str)> = vec![
        ("quire.toml".into(), DEFAULT_CONFIG),
        ("src/_index.md".into(), DEFAULT_SETTINGS),
        ("src/hello-world.md".into(), DEFAULT_POST),
        (format!("templates/{POST_TEMPLATE}"), DEFAULT_POST_TEMPLATE),
        (format!("templates/{INDEX_TEMPLATE}"), DEFAULT_INDEX_TEMPLATE),
        (format!("templates/{FEED_TEMPLATE}"), DEFAULT_FEED_TEMPLATE),
        ("assets/highlight.css".into(), css.as_str()),
    ];

    for (name, contents) in &files {
        scaffold(dir, name, contents, yes)?;
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'quire build --watch --serve 127.0.0.1:8080' to start writing.");

    Ok(())
}

/// Write one scaffold file, keeping an existing one unless `overwrite` is set.
fn scaffold(root: &Path, name: &str, contents: &str, overwrite: bool) -> Result<()> {
    let path = root.join(name);

    if path.exists() && !overwrite {
        tracing::warn!("{} already exists. Use --yes to overwrite.", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Created {}", name);

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# quire configuration

[paths]
# Posts and _index.md
source = "src"

# post.html, index.html and feed.xml
templates = "templates"

# Built site
output = "generated"

# Served at /assets
assets = "assets"

[serve]
addr = "127.0.0.1:8080"

[markdown]
smart_punctuation = true
smart_fractions = true
"#;

const DEFAULT_SETTINGS: &str = r#"---
title: My Blog
url: http://127.0.0.1:8080
xmlurl: http://127.0.0.1:8080/index.xml
---
"#;

const DEFAULT_POST: &str = r#"---
title: Hello, World
date: 2024-01-01
draft: false
short: true
---
This is the first post. Posts live in `src/`, one Markdown file each; the file
name becomes the URL, so this one is served at `/post/hello-world`.

## Code

Fenced blocks with a language are highlighted:

```rust
fn main() {
    println!("Hello, world!");
}
```

Use `shell` for commands and `output` for what they print:

```shell
$ quire build
```

```output
Built 1 posts (0 drafts skipped) in 3ms
```
"#;
