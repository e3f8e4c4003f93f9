//! File-watching hot reload for the skill cache (spec §9 design note):
//! the cache already validates by mtime, so watching is strictly an
//! optimisation that pushes invalidations instead of waiting out the
//! TTL. Uses `notify` (the idiomatic crate for this; no example repo in
//! the pack does file-watching, so this is picked fresh per DESIGN.md),
//! falling back to a poll loop when the native watch can't be installed.
//! Watcher failures are logged, never fatal.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use skillflow_storage::{paths, Storage};

pub struct FileWatcher {
    _watcher: Option<RecommendedWatcher>,
}

impl FileWatcher {
    /// Watches `<data_dir>/skills` and invalidates the touched skill's
    /// cache entry (conservatively, also the tool-list cache) on every
    /// write, instead of waiting for the TTL to expire.
    pub fn start(storage: Arc<Storage>) -> Self {
        let skills_dir = paths::skills_dir(storage.root());
        let (tx, rx) = std::sync::mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        );

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "native file watcher unavailable, falling back to polling");
                Self::spawn_poll_fallback(storage);
                return Self { _watcher: None };
            }
        };

        if let Err(e) = watcher.watch(&skills_dir, RecursiveMode::Recursive) {
            tracing::warn!(error = %e, path = %skills_dir.display(), "failed to watch skills directory, falling back to polling");
            Self::spawn_poll_fallback(storage);
            return Self { _watcher: None };
        }

        std::thread::spawn(move || {
            for event in rx {
                handle_event(&storage, event);
            }
        });

        Self { _watcher: Some(watcher) }
    }

    /// Invalidates the whole compiled tool-list cache every 5s. Coarser
    /// than the native-watcher path (which invalidates just the touched
    /// skill), but still bounds staleness well under the 300s TTL.
    fn spawn_poll_fallback(storage: Arc<Storage>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                storage.tool_list_cache().invalidate();
            }
        });
    }
}

fn handle_event(storage: &Arc<Storage>, event: notify::Result<notify::Event>) {
    let Ok(event) = event else {
        return;
    };
    for path in event.paths {
        if let Some(skill_id) = skill_id_from_path(&path) {
            storage.skill_cache().invalidate(&skill_id);
            storage.tool_list_cache().invalidate_if_contributed(&skill_id);
        }
    }
}

/// `<root>/skills/<skill_id>/{meta.json,v0001.json,...}` -> `skill_id`.
fn skill_id_from_path(path: &Path) -> Option<String> {
    let skill_dir = path.parent()?;
    let skills_dir = skill_dir.parent()?;
    if skills_dir.file_name()?.to_str()? != "skills" {
        return None;
    }
    skill_dir.file_name()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_id_extracted_from_version_file_path() {
        let path = Path::new("/data/skills/sk1/v0002.json");
        assert_eq!(skill_id_from_path(path), Some("sk1".to_string()));
    }

    #[test]
    fn non_skills_path_yields_none() {
        let path = Path::new("/data/sessions/session_x.json");
        assert_eq!(skill_id_from_path(path), None);
    }
}
