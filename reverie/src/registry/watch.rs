use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::core::logging::{info, trace, warn};

/// Flags edits to a single unit file so the host can reload it between
/// frames. Saves that leave the content unchanged are ignored.
pub struct UnitWatch {
    changed: Arc<AtomicBool>,
    _watcher: RecommendedWatcher,
}

impl UnitWatch {
    pub fn start(path: PathBuf) -> Result<Self, notify::Error> {
        let changed = Arc::new(AtomicBool::new(false));
        let changed_flag = changed.clone();
        let last_hash = Arc::new(Mutex::new(file_content_hash(&path).ok()));
        let unit_path = path.clone();
        let watch_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        info!("Watching unit {}", unit_path.display());

        let mut watcher = notify::recommended_watcher(move |result| {
            let event: Event = match result {
                Ok(event) => event,
                Err(err) => {
                    warn!(
                        "Unit watcher failed for {}: {}",
                        unit_path.display(),
                        err
                    );
                    return;
                }
            };

            if !unit_changed(&event, &unit_path) {
                return;
            }

            let hash = match file_content_hash(&unit_path) {
                Ok(hash) => hash,
                Err(err) => {
                    trace!(
                        "Change event before {} was readable: {}",
                        unit_path.display(),
                        err
                    );
                    return;
                }
            };

            let mut guard = last_hash.lock();
            if *guard == Some(hash) {
                trace!("Unit content unchanged: {}", unit_path.display());
                return;
            }
            *guard = Some(hash);

            changed_flag.store(true, Ordering::SeqCst);
            info!("Detected unit change: {}", unit_path.display());
        })?;

        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            changed,
            _watcher: watcher,
        })
    }

    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::SeqCst)
    }
}

fn file_content_hash(path: &Path) -> Result<u64, std::io::Error> {
    let bytes = fs::read(path)?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Ok(hasher.finish())
}

fn unit_changed(event: &Event, target: &Path) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }

    event.paths.is_empty()
        || event.paths.iter().any(|path| {
            path == target
                || path.file_name() == target.file_name()
                || matches!(
                    (path.canonicalize(), target.canonicalize()),
                    (Ok(a), Ok(b)) if a == b
                )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn matches_modify_on_target_file() {
        let target = Path::new("/tmp/units/wave.rhai");
        let ev =
            event(EventKind::Modify(ModifyKind::Any), "/tmp/units/wave.rhai");
        assert!(unit_changed(&ev, target));
    }

    #[test]
    fn ignores_other_files_and_removals() {
        let target = Path::new("/tmp/units/wave.rhai");
        let other =
            event(EventKind::Create(CreateKind::File), "/tmp/units/other.rhai");
        assert!(!unit_changed(&other, target));

        let removed =
            event(EventKind::Remove(RemoveKind::File), "/tmp/units/wave.rhai");
        assert!(!unit_changed(&removed, target));
    }

    #[test]
    fn content_hash_tracks_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.rhai");
        fs::write(&path, "fn draw() {}").unwrap();
        let first = file_content_hash(&path).unwrap();
        fs::write(&path, "fn draw() { }").unwrap();
        assert_ne!(first, file_content_hash(&path).unwrap());
    }
}
