//! Template loading and rendering.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime};
use minijinja::{
    context, default_auto_escape_callback, path_loader, AutoEscape, Environment, Error, ErrorKind,
    UndefinedBehavior, Value,
};

use crate::index::{Index, Site};
use crate::post::{escape_xml, Post};

/// Per-post page template.
pub const POST_TEMPLATE: &str = "post.html";

/// Index page template.
pub const INDEX_TEMPLATE: &str = "index.html";

/// Feed document template.
pub const FEED_TEMPLATE: &str = "feed.xml";

/// All templates a build needs.
pub const TEMPLATE_NAMES: [&str; 3] = [POST_TEMPLATE, INDEX_TEMPLATE, FEED_TEMPLATE];

/// The three templates of a blog, compiled into one environment.
pub struct TemplateSet {
    env: Environment<'static>,
}

impl TemplateSet {
    /// Load and compile the templates from a directory.
    ///
    /// Other files in the directory can be pulled in with `{% include %}` or
    /// `{% extends %}`.
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        let mut env = Self::environment();
        env.set_loader(path_loader(dir.to_path_buf()));

        for name in TEMPLATE_NAMES {
            let path = dir.join(name);
            let source = fs::read_to_string(&path).map_err(|source| TemplateError::Read {
                path: path.clone(),
                source,
            })?;
            env.add_template_owned(name, source)
                .map_err(|source| TemplateError::Syntax { name, source })?;
        }

        Ok(Self { env })
    }

    /// Compile templates from strings.
    pub fn from_sources(post: &str, index: &str, feed: &str) -> Result<Self, TemplateError> {
        let mut env = Self::environment();

        for (name, source) in TEMPLATE_NAMES.into_iter().zip([post, index, feed]) {
            env.add_template_owned(name, source.to_string())
                .map_err(|source| TemplateError::Syntax { name, source })?;
        }

        Ok(Self { env })
    }

    /// The default templates written by `quire init`.
    pub fn defaults() -> Result<Self, TemplateError> {
        Self::from_sources(DEFAULT_POST_TEMPLATE, DEFAULT_INDEX_TEMPLATE, DEFAULT_FEED_TEMPLATE)
    }

    /// HTML templates are auto-escaped. XML templates are not: they use the
    /// pre-escaped `xml_*` fields and the `xml` filter.
    fn environment() -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|name: &str| {
            if name.ends_with(".xml") {
                AutoEscape::None
            } else {
                default_auto_escape_callback(name)
            }
        });
        env.add_filter("dateformat", dateformat);
        env.add_filter("xml", |value: String| escape_xml(&value));
        env
    }

    /// Render a post page. Post fields are top-level, site fields live under `site`.
    pub fn render_post(&self, post: &Post, site: &Site) -> Result<String, Error> {
        self.env.get_template(POST_TEMPLATE)?.render(context! {
            site => site,
            ..Value::from_serialize(post)
        })
    }

    /// Render the index page.
    pub fn render_index(&self, index: &Index) -> Result<String, Error> {
        self.env.get_template(INDEX_TEMPLATE)?.render(index)
    }

    /// Render the feed document.
    pub fn render_feed(&self, index: &Index) -> Result<String, Error> {
        self.env.get_template(FEED_TEMPLATE)?.render(index)
    }
}

/// `dateformat` filter: formats `YYYY-MM-DD` dates and RFC 3339 timestamps.
///
/// `{{ post.date | dateformat("%B %d, %Y") }}`. Missing dates format to "".
pub fn dateformat(value: Value, format: Option<String>) -> Result<String, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(String::new());
    }
    let Some(text) = value.as_str() else {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dateformat expects a date string",
        ));
    };
    if text.is_empty() {
        return Ok(String::new());
    }

    let format = format.as_deref().unwrap_or("%Y-%m-%d");
    let timestamp = match DateTime::parse_from_rfc3339(text) {
        Ok(ts) => ts,
        Err(_) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|e| {
                Error::new(ErrorKind::InvalidOperation, format!("invalid date {text:?}"))
                    .with_source(e)
            })?
            .and_time(NaiveTime::MIN)
            .and_utc()
            .fixed_offset(),
    };

    let mut out = String::new();
    write!(out, "{}", timestamp.format(format)).map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid date format {format:?}"),
        )
    })?;
    Ok(out)
}

/// Errors that can occur when loading templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to compile template {name}: {source}")]
    Syntax {
        name: &'static str,
        source: Error,
    },
}

pub const DEFAULT_POST_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }} - {{ site.title }}</title>
  <meta name="description" content="{{ description }}">
  <link rel="alternate" type="application/rss+xml" title="{{ site.title }}" href="{{ site.xml_url }}">
  <link rel="stylesheet" href="/assets/highlight.css">
</head>
<body>
  <header><a href="/">{{ site.title }}</a></header>
  <article>
    <h1>{{ title }}</h1>
    {% if date %}<time datetime="{{ date }}">{{ date | dateformat("%B %d, %Y") }}</time>{% endif %}
    {{ body | safe }}
  </article>
</body>
</html>
"##;

pub const DEFAULT_INDEX_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }}</title>
  <link rel="alternate" type="application/rss+xml" title="{{ title }}" href="{{ xml_url }}">
  <link rel="stylesheet" href="/assets/highlight.css">
</head>
<body>
  <header><h1>{{ title }}</h1></header>
  <ul class="posts">
  {% for post in posts %}
    <li>
      {% if post.date %}<time datetime="{{ post.date }}">{{ post.date | dateformat("%Y-%m-%d") }}</time>{% endif %}
      <a href="/{{ post.relative_link }}">{{ post.title }}</a>
      {% if post.short %}<div class="short">{{ post.body | safe }}</div>{% endif %}
    </li>
  {% endfor %}
  </ul>
</body>
</html>
"##;

pub const DEFAULT_FEED_TEMPLATE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
  <title>{{ title | xml }}</title>
  <link>{{ url | xml }}</link>
  <description>{{ title | xml }}</description>
  <atom:link href="{{ xml_url | xml }}" rel="self" type="application/rss+xml" />
  <lastBuildDate>{{ updated_at | dateformat("%a, %d %b %Y %H:%M:%S %z") }}</lastBuildDate>
  {% for post in posts %}
  <item>
    <title>{{ post.xml_title }}</title>
    <link>{{ post.link | xml }}</link>
    <guid>{{ post.link | xml }}</guid>
    {% if post.date %}<pubDate>{{ post.date | dateformat("%a, %d %b %Y %H:%M:%S %z") }}</pubDate>{% endif %}
    <description>{{ post.xml_desc }}</description>
  </item>
  {% endfor %}
</channel>
</rss>
"##;
