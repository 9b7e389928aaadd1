//! Watch mode and file serving for quire blogs.
//!
//! Watches the sources and templates of a blog, serializes the rebuilds that
//! changes trigger, and serves the generated output over HTTP.

pub mod rebuild;
pub mod server;
pub mod watcher;

pub use rebuild::{rebuild_queue, RebuildHandle, RebuildWorker};
pub use server::{FileServer, PathRule, ServeConfig, ServerError};
pub use watcher::{FileWatcher, WatchEvent, WatchSet};
