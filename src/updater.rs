// Shader hot-reload watcher
//
// Elements register the shader source files backing their pipelines. A
// notify watcher records changes from its own thread; the render loop polls
// once per frame and dispatches pipeline rebuilds for files that were
// actually registered.

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Updater {
    watcher: Option<RecommendedWatcher>,
    /// Paths reported changed by the watcher thread, drained every frame.
    changed: Arc<Mutex<Vec<PathBuf>>>,
    /// Registered shader sources, canonicalized.
    watched: HashSet<PathBuf>,
    /// Directories already handed to the watcher.
    watched_dirs: HashSet<PathBuf>,
}

impl Updater {
    pub fn new() -> Self {
        Self {
            watcher: None,
            changed: Arc::new(Mutex::new(Vec::new())),
            watched: HashSet::new(),
            watched_dirs: HashSet::new(),
        }
    }

    /// Register shader source files for change tracking.
    ///
    /// The parent directory of each file is watched; events for files that
    /// were never registered are filtered out in [`poll`](Self::poll).
    pub fn watch_shaders(&mut self, paths: &[&Path]) -> Result<()> {
        if self.watcher.is_none() {
            let changed = self.changed.clone();
            let watcher = notify::recommended_watcher(
                move |result: std::result::Result<notify::Event, notify::Error>| match result {
                    Ok(event) => {
                        if matches!(
                            event.kind,
                            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                        ) {
                            changed.lock().extend(event.paths);
                        }
                    }
                    Err(e) => log::warn!("Shader watcher error: {}", e),
                },
            )
            .context("Failed to create file watcher")?;
            self.watcher = Some(watcher);
        }
        let watcher = self.watcher.as_mut().context("Watcher not created")?;

        for path in paths {
            let canonical = path
                .canonicalize()
                .with_context(|| format!("Shader file not found: {}", path.display()))?;

            let dir = canonical
                .parent()
                .context("Shader path has no parent directory")?
                .to_path_buf();

            if self.watched_dirs.insert(dir.clone()) {
                watcher
                    .watch(&dir, RecursiveMode::NonRecursive)
                    .with_context(|| format!("Failed to watch {}", dir.display()))?;
                log::info!("Watching {} for shader changes", dir.display());
            }

            self.watched.insert(canonical);
        }

        Ok(())
    }

    /// Drain changes since the last poll, keeping only registered files.
    /// Duplicate events for the same file are coalesced.
    pub fn poll(&mut self) -> Vec<PathBuf> {
        let mut raw = self.changed.lock();
        if raw.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let drained: Vec<PathBuf> = raw
            .drain(..)
            .filter_map(|p| p.canonicalize().ok())
            .filter(|p| self.watched.contains(p))
            .filter(|p| seen.insert(p.clone()))
            .collect();
        drained
    }
}

impl Default for Updater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "// test shader").unwrap();
        path
    }

    #[test]
    fn poll_is_empty_without_events() {
        let mut updater = Updater::new();
        assert!(updater.poll().is_empty());
    }

    #[test]
    fn poll_filters_unregistered_paths() {
        let dir = std::env::temp_dir().join("hello-triangle-updater-filter");
        std::fs::create_dir_all(&dir).unwrap();
        let registered = touch(&dir, "registered.vert");
        let stranger = touch(&dir, "stranger.frag");

        let mut updater = Updater::new();
        updater.watch_shaders(&[&registered]).unwrap();

        // Inject events directly instead of racing the watcher thread
        updater
            .changed
            .lock()
            .extend([registered.clone(), stranger]);

        let changes = updater.poll();
        assert_eq!(changes, vec![registered.canonicalize().unwrap()]);
    }

    #[test]
    fn poll_coalesces_duplicate_events() {
        let dir = std::env::temp_dir().join("hello-triangle-updater-dedup");
        std::fs::create_dir_all(&dir).unwrap();
        let shader = touch(&dir, "basic.vert");

        let mut updater = Updater::new();
        updater.watch_shaders(&[&shader]).unwrap();

        updater
            .changed
            .lock()
            .extend([shader.clone(), shader.clone(), shader.clone()]);

        assert_eq!(updater.poll().len(), 1);
        assert!(updater.poll().is_empty());
    }

    #[test]
    fn missing_shader_file_is_an_error() {
        let mut updater = Updater::new();
        let missing = Path::new("does/not/exist.vert");
        assert!(updater.watch_shaders(&[missing]).is_err());
    }
}
