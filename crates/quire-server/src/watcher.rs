//! File watching for rebuilds.
//!
//! Every source file and template is watched individually, and the source and
//! template directories are watched non-recursively so new posts and partials are
//! noticed. Editors that save by replacing a file (remove, then create) drop the
//! underlying watch, so removed paths that still belong to the build are
//! registered again.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use quire_static::builder::{is_post_source, list_source_files};
use quire_static::index::SETTINGS_FILENAME;
use quire_static::templates::TEMPLATE_NAMES;
use quire_static::BuildConfig;

use crate::rebuild::RebuildHandle;
use crate::server::ServerError;

/// Filesystem changes the rebuild loop cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File appeared, including the target of a rename
    Created(PathBuf),

    /// File contents changed
    Modified(PathBuf),

    /// File went away, including the source of a rename
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) | WatchEvent::Modified(path) | WatchEvent::Removed(path) => {
                path
            }
        }
    }
}

/// Classify a notify event into a WatchEvent.
///
/// Access and metadata-only events are dropped.
pub fn classify_event(path: &Path, kind: &EventKind) -> Option<WatchEvent> {
    let path = path.to_path_buf();

    match kind {
        EventKind::Create(_) => Some(WatchEvent::Created(path)),
        EventKind::Remove(_) => Some(WatchEvent::Removed(path)),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WatchEvent::Removed(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WatchEvent::Created(path)),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.exists() {
                Some(WatchEvent::Created(path))
            } else {
                Some(WatchEvent::Removed(path))
            }
        }
        EventKind::Modify(_) => Some(WatchEvent::Modified(path)),
        _ => None,
    }
}

/// The set of paths owned by the build, and their watch registrations.
pub struct WatchSet {
    watcher: RecommendedWatcher,
    source_dir: PathBuf,
    templates_dir: PathBuf,
    tracked: BTreeSet<PathBuf>,
}

impl WatchSet {
    fn new(watcher: RecommendedWatcher, config: &BuildConfig) -> Self {
        Self {
            watcher,
            source_dir: absolute(&config.source_dir),
            templates_dir: absolute(&config.templates_dir),
            tracked: BTreeSet::new(),
        }
    }

    /// Watch a directory for entries coming and going.
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watcher.watch(&absolute(dir), RecursiveMode::NonRecursive)
    }

    /// Take ownership of a file and watch it.
    ///
    /// The path stays tracked even when the watch cannot be registered yet, so it
    /// is picked up once it appears.
    pub fn track(&mut self, path: &Path) {
        let path = absolute(path);
        if let Err(e) = self.watcher.watch(&path, RecursiveMode::NonRecursive) {
            tracing::debug!("Not watching {} yet: {}", path.display(), e);
        } else {
            tracing::debug!("Watching {}", path.display());
        }
        self.tracked.insert(path);
    }

    /// Register the watch on a tracked path again after it was replaced.
    fn rearm(&mut self, path: &Path) {
        if let Err(e) = self.watcher.unwatch(path) {
            tracing::debug!("No watch to drop on {}: {}", path.display(), e);
        }
        match self.watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => tracing::debug!("Re-added watch on {}", path.display()),
            Err(e) => tracing::debug!("{} is gone, waiting for it to reappear: {}", path.display(), e),
        }
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.tracked.contains(path)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &Path> {
        self.tracked.iter().map(PathBuf::as_path)
    }

    fn is_template(&self, path: &Path) -> bool {
        path.parent() == Some(self.templates_dir.as_path()) && !is_scratch_file(path)
    }

    fn is_new_post(&self, path: &Path) -> bool {
        path.parent() == Some(self.source_dir.as_path())
            && is_post_source(path)
            && !is_scratch_file(path)
    }

    /// Update registrations for an event. Returns whether it calls for a rebuild.
    pub fn handle(&mut self, event: &WatchEvent) -> bool {
        let path = event.path();

        match event {
            WatchEvent::Modified(_) => self.is_tracked(path) || self.is_template(path),
            WatchEvent::Created(_) => {
                if self.is_tracked(path) {
                    self.rearm(path);
                    true
                } else if self.is_new_post(path) {
                    tracing::info!("New post: {}", path.display());
                    self.track(path);
                    true
                } else {
                    self.is_template(path)
                }
            }
            WatchEvent::Removed(_) => {
                if self.is_tracked(path) {
                    self.rearm(path);
                    true
                } else {
                    self.is_template(path)
                }
            }
        }
    }
}

/// Editor swap, backup and lock files that show up next to the real ones.
fn is_scratch_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    name.starts_with('.')
        || name.starts_with('#')
        || name.ends_with('~')
        || [".swp", ".swx", ".tmp"].iter().any(|ext| name.ends_with(ext))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Watches the build inputs and turns changes into rebuild requests.
pub struct FileWatcher {
    set: WatchSet,
    events: mpsc::Receiver<notify::Result<notify::Event>>,
}

impl FileWatcher {
    /// Register watches for everything the build reads.
    ///
    /// Fails only when the watcher itself or the directory watches cannot be set up.
    pub fn new(config: &BuildConfig) -> Result<Self, ServerError> {
        let (tx, events) = mpsc::channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| ServerError::WatchError(e.to_string()))?;

        let mut set = WatchSet::new(watcher, config);

        for dir in [&config.source_dir, &config.templates_dir] {
            set.watch_dir(dir)
                .map_err(|e| ServerError::WatchError(format!("{}: {}", dir.display(), e)))?;
        }

        set.track(&config.source_dir.join(SETTINGS_FILENAME));
        match list_source_files(&config.source_dir) {
            Ok(files) => files.iter().for_each(|file| set.track(file)),
            Err(e) => tracing::warn!("Could not list posts to watch: {}", e),
        }
        for name in TEMPLATE_NAMES {
            set.track(&config.templates_dir.join(name));
        }

        Ok(Self { set, events })
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.set
    }

    /// Forward changes to `rebuild` on a dedicated thread, for the life of the process.
    pub fn spawn(self, rebuild: RebuildHandle) -> JoinHandle<()> {
        std::thread::spawn(move || self.run(rebuild))
    }

    fn run(mut self, rebuild: RebuildHandle) {
        while let Ok(res) = self.events.recv() {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Watch error: {}", e);
                    continue;
                }
            };

            for path in &event.paths {
                let Some(change) = classify_event(path, &event.kind) else {
                    continue;
                };
                if self.set.handle(&change) {
                    tracing::info!("Changed: {}", path.display());
                    rebuild.request();
                }
            }
        }
    }
}
