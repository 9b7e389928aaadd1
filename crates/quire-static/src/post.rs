//! Blog post model.

use std::path::Path;

use chrono::NaiveDate;
use quire_md::{parse_frontmatter, FieldError, Frontmatter, FrontmatterError, MarkdownRenderer};
use serde::Serialize;

/// Subdirectory of the output directory that holds rendered posts.
pub const POST_DIR: &str = "post";

/// Raw bytes of the body that feed the description.
pub const DESCRIPTION_LEN: usize = 200;

/// Frontmatter fields a post understands.
#[derive(Debug, Clone, PartialEq)]
pub struct PostMeta {
    pub title: String,
    pub date: Option<NaiveDate>,
    pub draft: bool,
    pub short: bool,
}

impl PostMeta {
    /// Extract post metadata. `title` is required, everything else is optional.
    pub fn from_frontmatter(frontmatter: &Frontmatter) -> Result<Self, FieldError> {
        Ok(Self {
            title: frontmatter.string("title")?,
            date: frontmatter.opt_date("date")?,
            draft: frontmatter.opt_bool("draft")?.unwrap_or(false),
            short: frontmatter.opt_bool("short")?.unwrap_or(false),
        })
    }
}

/// A source file whose frontmatter has been read but whose body is not rendered yet.
#[derive(Debug)]
pub struct PostSource<'s> {
    pub slug: String,
    pub meta: PostMeta,
    body: &'s [u8],
}

impl<'s> PostSource<'s> {
    /// Split a source file into metadata and body.
    pub fn parse(path: &Path, source: &'s [u8]) -> Result<Self, PostError> {
        let slug = slug_from_path(path).ok_or(PostError::BadFilename)?;
        let (frontmatter, body) = parse_frontmatter(source)?;
        let meta = PostMeta::from_frontmatter(&frontmatter)?;

        Ok(Self { slug, meta, body })
    }

    pub fn is_draft(&self) -> bool {
        self.meta.draft
    }

    /// Raw Markdown body, as it appears after the frontmatter.
    pub fn body(&self) -> &'s [u8] {
        self.body
    }

    /// Output path relative to the output directory.
    pub fn output_path(&self) -> String {
        format!("{}/{}.html", POST_DIR, self.slug)
    }

    /// Render the body and derive links for a site rooted at `site_url`.
    pub fn render(self, site_url: &str, renderer: &MarkdownRenderer) -> Result<Post, PostError> {
        let body = std::str::from_utf8(self.body).map_err(|_| PostError::InvalidUtf8)?;
        let description = describe(body).to_string();
        let relative_link = format!("{}/{}", POST_DIR, self.slug);

        Ok(Post {
            output_path: self.output_path(),
            link: format!("{}/{}", site_url.trim_end_matches('/'), relative_link),
            relative_link,
            xml_title: escape_xml(&self.meta.title),
            xml_desc: escape_xml(&description),
            description,
            body: renderer.render(body),
            title: self.meta.title,
            date: self.meta.date,
            draft: self.meta.draft,
            short: self.meta.short,
            slug: self.slug,
        })
    }
}

/// A rendered post, as seen by templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    /// Source file name without extension
    pub slug: String,

    pub title: String,

    /// Title escaped for XML
    pub xml_title: String,

    /// Publication date, `null` in templates when absent
    pub date: Option<NaiveDate>,

    pub draft: bool,

    /// Whether the index may show the whole post inline
    pub short: bool,

    /// Rendered HTML
    pub body: String,

    /// Start of the raw body, trimmed
    pub description: String,

    /// Description escaped for XML
    pub xml_desc: String,

    /// Absolute URL
    pub link: String,

    /// URL relative to the site root
    pub relative_link: String,

    /// File path relative to the output directory
    pub output_path: String,
}

/// Slug of a source file: its base name without extension.
pub fn slug_from_path(path: impl AsRef<Path>) -> Option<String> {
    path.as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Output file name for a source file: always `post/<stem><ext>`.
pub fn output_filename(filename: impl AsRef<Path>, ext: &str) -> String {
    let slug = slug_from_path(filename).unwrap_or_default();
    format!("{}/{}{}", POST_DIR, slug, ext)
}

/// First [`DESCRIPTION_LEN`] bytes of a raw body, trimmed of spaces and line breaks.
///
/// The cut backs off to the previous character boundary.
pub fn describe(body: &str) -> &str {
    let mut end = body.len().min(DESCRIPTION_LEN);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].trim_matches([' ', '\n', '\r'])
}

/// Escape text for XML character data and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\t' => escaped.push_str("&#x9;"),
            '\n' => escaped.push_str("&#xA;"),
            '\r' => escaped.push_str("&#xD;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Errors that can occur when reading a post.
#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error(transparent)]
    Frontmatter(#[from] FrontmatterError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("post body is not valid UTF-8")]
    InvalidUtf8,

    #[error("source file has no usable name")]
    BadFilename,
}
