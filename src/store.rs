use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, ReelgrabError};

pub const ARTIFACT_EXTENSION: &str = "mp4";

/// Exactly the names produced by [`allocate_filename`].
static ARTIFACT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^video_[0-9]{13,}_[0-9a-f]{8}\.mp4$").expect("artifact name pattern is valid")
});

/// A produced media file in the downloads directory.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size_bytes: u64,
    /// File modification time
    pub created_at: DateTime<Utc>,
}

/// Allocate a fresh artifact filename: `video_<unix_ms>_<8 hex>.mp4`.
pub fn allocate_filename() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("video_{}_{}.{}", millis, &suffix[..8], ARTIFACT_EXTENSION)
}

pub fn is_artifact_name(name: &str) -> bool {
    ARTIFACT_NAME.is_match(name)
}

/// The flat directory backing `/downloads`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist yet
    pub async fn ensure_dir(&self) -> Result<()> {
        if fs::metadata(&self.dir).await.is_err() {
            fs::create_dir_all(&self.dir).await.map_err(|e| {
                ReelgrabError::Store(format!(
                    "Failed to create downloads directory {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;
            info!("Initialized downloads directory: {}", self.dir.display());
        }
        Ok(())
    }

    /// Path a new artifact called `filename` will be written to.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Map a client-supplied name onto an existing artifact path.
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf> {
        if !is_artifact_name(filename) {
            return Err(ReelgrabError::InvalidArtifactName(filename.to_string()));
        }

        let path = self.path_for(filename);
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            _ => Err(ReelgrabError::ArtifactNotFound(filename.to_string())),
        }
    }

    /// Open an artifact for streaming, returning the handle and its length.
    pub async fn open(&self, filename: &str) -> Result<(fs::File, u64)> {
        let path = self.resolve(filename).await?;

        // Reclaim may remove the file between resolve and open.
        let file = fs::File::open(&path).await.map_err(|e| match e.kind() {
            IoErrorKind::NotFound => ReelgrabError::ArtifactNotFound(filename.to_string()),
            _ => ReelgrabError::Io(e),
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Enumerate regular files in the directory, newest first.
    pub async fn list(&self) -> Result<Vec<Artifact>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            ReelgrabError::Store(format!(
                "Failed to read downloads directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut artifacts = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ReelgrabError::Store(format!("Failed to read directory entry: {}", e)))?
        {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(_) => continue, // removed while listing
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            artifacts.push(Artifact {
                filename: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                size_bytes: metadata.len(),
                created_at: DateTime::<Utc>::from(modified),
            });
        }

        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(artifacts)
    }

    /// Remove every file older than `retention`. Returns the number removed.
    pub async fn reclaim(&self, retention: Duration) -> Result<usize> {
        self.reclaim_at(SystemTime::now(), retention).await
    }

    /// Reclaim relative to an explicit clock reading.
    pub async fn reclaim_at(&self, now: SystemTime, retention: Duration) -> Result<usize> {
        let stale = self.stale_files(now, retention).await?;
        Ok(remove_each(&stale, |path| async move { fs::remove_file(path).await }).await)
    }

    /// Regular files whose mtime is more than `retention` before `now`.
    async fn stale_files(&self, now: SystemTime, retention: Duration) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            ReelgrabError::Store(format!(
                "Failed to read downloads directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut stale = Vec::new();

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopping reclaim scan early: {}", e);
                    break;
                }
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    error!("Failed to clean {}: {}", entry.file_name().to_string_lossy(), e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    error!("Failed to clean {}: {}", entry.file_name().to_string_lossy(), e);
                    continue;
                }
            };
            // Future mtimes count as brand new.
            let age = now.duration_since(modified).unwrap_or_default();
            if age > retention {
                stale.push(entry.path());
            }
        }

        Ok(stale)
    }
}

/// Remove each path with `remove`, logging failures and carrying on.
/// Returns how many were actually removed.
async fn remove_each<F, Fut>(paths: &[PathBuf], remove: F) -> usize
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut removed = 0;

    for path in paths {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        match remove(path.clone()).await {
            Ok(()) => {
                info!("Cleaned up: {}", name);
                removed += 1;
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!("{} already gone", name);
            }
            Err(e) => error!("Failed to clean {}: {}", name, e),
        }
    }

    removed
}

/// Run a reclaim pass now and then every `every`, until the handle is aborted.
pub fn spawn_reclaim_loop(store: Arc<ArtifactStore>, retention: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match store.reclaim(retention).await {
                Ok(removed) => info!(removed, dir = %store.dir().display(), "Reclaim pass finished"),
                Err(e) => error!(error = %e, "Reclaim pass failed"),
            }
        }
    })
}
