// Ephemeral artifact store with time-based eviction
//
// Identities are never reused, so concurrent requests never collide on disk.
// The sweeper is purely age-based except for the in-use set, which protects
// artifacts still being transferred or served from mid-flight deletion.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extension priority when resolving an identity to a file on disk.
pub const KNOWN_EXTENSIONS: [&str; 4] = ["mp3", "m4a", "webm", "opus"];

/// Collision-free artifact identity. Allocation does not create a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct ArtifactStore {
    root: PathBuf,
    retention: Duration,
    sweep_interval: Duration,
    in_use: Mutex<HashSet<String>>,
}

impl ArtifactStore {
    pub fn new(
        root: impl Into<PathBuf>,
        retention: Duration,
        sweep_interval: Duration,
    ) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            retention,
            sweep_interval,
            in_use: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// New random identity. Two calls never return the same value.
    pub fn allocate(&self) -> ArtifactId {
        ArtifactId(Uuid::new_v4().to_string())
    }

    /// First existing file for the identity, in extension priority order.
    pub fn resolve(&self, id: &ArtifactId) -> Option<PathBuf> {
        KNOWN_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", id, ext)))
            .find(|path| path.exists())
    }

    /// Shield an identity from eviction while it is being written or read.
    pub fn mark_in_use(&self, id: &ArtifactId) {
        self.in_use.lock().unwrap().insert(id.0.clone());
    }

    pub fn release(&self, id: &ArtifactId) {
        self.in_use.lock().unwrap().remove(&id.0);
    }

    /// Remove anything a failed attempt left behind for this identity,
    /// including partial-download droppings like `<id>.mp3.part`.
    pub fn remove_partial(&self, id: &ArtifactId) {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot scan store for partial files: {}", e);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(id.as_str()) {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!("failed to remove partial file {}: {}", name, e);
                }
            }
        }
    }

    fn is_in_use(&self, file_name: &str) -> bool {
        let stem = file_name.split('.').next().unwrap_or(file_name);
        self.in_use.lock().unwrap().contains(stem)
    }

    /// One eviction pass. Deletes files whose age exceeds the retention
    /// window unless their identity is in use. Individual failures are
    /// logged and skipped; no single bad file stops the pass.
    pub fn sweep_pass(&self) -> usize {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("sweep: cannot read store root: {}", e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let age = match entry.metadata().and_then(|m| m.modified()) {
                Ok(mtime) => now.duration_since(mtime).unwrap_or_default(),
                Err(e) => {
                    warn!("sweep: cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };
            if age <= self.retention {
                continue;
            }
            let name = entry.file_name();
            if self.is_in_use(&name.to_string_lossy()) {
                debug!("sweep: {} is in use, skipping", path.display());
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("sweep: evicted {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("sweep: failed to remove {}: {}", path.display(), e),
            }
        }
        removed
    }

    /// Background sweep loop. Runs for the process lifetime: sequential
    /// passes with the configured pause in between, never overlapping with
    /// itself. Spawn once at startup.
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        loop {
            ticker.tick().await;
            let removed = self.sweep_pass();
            if removed > 0 {
                debug!("sweep: removed {} expired artifact(s)", removed);
            }
        }
    }
}
