//! Frontmatter parsing and Markdown rendering for quire.
//!
//! This crate splits post sources into their YAML frontmatter and Markdown body, and
//! renders the body to HTML with highlighted, shell and output code blocks.

pub mod codeblock;
pub mod frontmatter;
pub mod render;

pub use codeblock::FenceKind;
pub use frontmatter::{parse_frontmatter, FieldError, FieldValue, Frontmatter, FrontmatterError};
pub use render::{escape_html, highlight_css, slugify, MarkdownRenderer, RenderOptions};
