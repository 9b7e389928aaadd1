//! Static blog generator for quire.
//!
//! Turns a directory of Markdown posts into post pages, an index page and a feed.

pub mod builder;
pub mod index;
pub mod post;
pub mod templates;

pub use builder::{BlogBuilder, BuildConfig, BuildError, BuildResult};
pub use index::{Index, Site};
pub use post::{Post, PostSource};
pub use templates::TemplateSet;
