//! The registry of volumes and their directories on disk.
//!
//! Layout under the base path:
//!
//! ```text
//! <base>/volumes/<name>/_data   <- watched and tailed
//! ```
//!
//! The registry is the only component that creates or deletes anything in
//! this tree. Each volume present in the registry has a live watch on its
//! data directory and vice versa; creation and removal keep the map, the
//! directory and the watch in step under one lock.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::tail::TailSupervisor;
use crate::watcher::{DirectoryWatcher, WatchError};

pub const VOLUMES_DIR_NAME: &str = "volumes";
pub const VOLUME_DATA_DIR_NAME: &str = "_data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    /// The data directory, `<root>/<name>/_data`
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("volume {0} not found")]
    NotFound(String),
    #[error("volume already exists under {0}")]
    AlreadyExistsUnderDifferentPath(PathBuf),
    #[error("unable to remove a directory outside of the volumes root {root}: {path}")]
    OutOfScope { root: PathBuf, path: PathBuf },
    #[error("invalid volume name: {0:?}")]
    InvalidName(String),
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub struct VolumeRegistry {
    /// Managed root, `<base>/volumes`
    root: PathBuf,
    /// `root` with symlinks resolved, used for scope checks
    real_root: PathBuf,
    volumes: Mutex<HashMap<String, Volume>>,
    watcher: Arc<dyn DirectoryWatcher>,
    supervisor: TailSupervisor,
}

impl std::fmt::Debug for VolumeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeRegistry")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl VolumeRegistry {
    /// Open the registry under `base`, creating `<base>/volumes` if needed
    /// and re-registering a watch for every volume already on disk.
    ///
    /// No file is tailed as a result of opening; tailing starts when files
    /// are created inside a watched volume.
    pub async fn open(
        base: &Path,
        watcher: Arc<dyn DirectoryWatcher>,
        supervisor: TailSupervisor,
    ) -> Result<Self, VolumeError> {
        let root = base.join(VOLUMES_DIR_NAME);
        tracing::info!("using volumes root {}", root.display());

        tokio::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&root)
            .await?;
        let real_root = tokio::fs::canonicalize(&root).await?;

        let registry = Self {
            root,
            real_root,
            volumes: Mutex::new(HashMap::new()),
            watcher,
            supervisor,
        };
        registry.reconcile().await?;
        Ok(registry)
    }

    async fn reconcile(&self) -> Result<(), VolumeError> {
        let mut volumes = self.volumes.lock().await;
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("skipping non UTF-8 entry {}", entry.path().display());
                continue;
            };
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let path = self.data_path(&name);
            if let Err(e) = create_data_dir(&path).await {
                tracing::warn!("skipping volume {}: {}", name, e);
                continue;
            }
            if let Err(e) = self.watcher.register(&path) {
                tracing::warn!("skipping volume {}: {}", name, e);
                continue;
            }

            tracing::info!("found volume in root - name: {}, path: {}", name, path.display());
            volumes.insert(name.clone(), Volume { name, path });
        }

        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(VOLUME_DATA_DIR_NAME)
    }

    /// Create a volume, or return the existing one with the same name
    pub async fn create(&self, name: &str) -> Result<Volume, VolumeError> {
        validate_name(name)?;
        let mut volumes = self.volumes.lock().await;

        if let Some(volume) = volumes.get(name) {
            tracing::info!("volume {} already exists", name);
            return Ok(volume.clone());
        }

        let path = self.data_path(name);
        tracing::info!("creating volume path: {}", path.display());
        if let Err(e) = create_data_dir(&path).await {
            let volume_dir = self.root.join(name);
            if collides_with_file(&path).await {
                return Err(VolumeError::AlreadyExistsUnderDifferentPath(volume_dir));
            }
            return Err(e.into());
        }

        if let Err(e) = self.watcher.register(&path) {
            // keep the disk in step with the registry
            if let Err(cleanup) = remove_path(&self.root.join(name)).await {
                tracing::warn!("failed to clean up volume {}: {}", name, cleanup);
            }
            return Err(e.into());
        }

        let volume = Volume {
            name: name.to_string(),
            path,
        };
        volumes.insert(name.to_string(), volume.clone());
        Ok(volume)
    }

    /// Remove a volume, its directory, its watch and every tail under it.
    ///
    /// When this returns Ok no file of the volume is being tailed any more.
    pub async fn remove(&self, name: &str) -> Result<(), VolumeError> {
        let mut volumes = self.volumes.lock().await;
        let volume = volumes
            .get(name)
            .cloned()
            .ok_or_else(|| VolumeError::NotFound(name.to_string()))?;

        let real_path = resolve_real_path(&volume.path).await?;
        if !self.in_scope(&real_path) {
            return Err(VolumeError::OutOfScope {
                root: self.root.clone(),
                path: real_path,
            });
        }

        remove_path(&real_path).await?;
        self.watcher.unregister(&volume.path);
        volumes.remove(name);

        let mut stopped = self.supervisor.stop_all(&volume.path).await;
        if real_path != volume.path {
            stopped += self.supervisor.stop_all(&real_path).await;
        }
        tracing::info!("removed volume {} ({} tail process(es) stopped)", name, stopped);

        match volume.path.parent() {
            Some(parent) => remove_path(parent).await.map_err(VolumeError::from),
            None => Ok(()),
        }
    }

    pub async fn lookup(&self, name: &str) -> Option<Volume> {
        self.volumes.lock().await.get(name).cloned()
    }

    /// All volumes, sorted by name
    pub async fn list(&self) -> Vec<Volume> {
        let mut volumes: Vec<Volume> = self.volumes.lock().await.values().cloned().collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        volumes
    }

    fn in_scope(&self, real_path: &Path) -> bool {
        real_path.starts_with(&self.real_root) && real_path != self.real_root
    }
}

fn validate_name(name: &str) -> Result<(), VolumeError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(VolumeError::InvalidName(name.to_string()));
    }
    Ok(())
}

async fn create_data_dir(path: &Path) -> io::Result<()> {
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
        .await
}

/// Whether directory creation at `path` failed because something that is
/// not a directory sits somewhere along the chain.
async fn collides_with_file(path: &Path) -> bool {
    for ancestor in path.ancestors() {
        if let Ok(meta) = tokio::fs::metadata(ancestor).await {
            if !meta.is_dir() {
                return true;
            }
        }
    }
    false
}

/// Resolve symlinks in `path`. If it no longer exists, fall back to its
/// parent, which is then what gets deleted.
async fn resolve_real_path(path: &Path) -> Result<PathBuf, VolumeError> {
    match tokio::fs::canonicalize(path).await {
        Ok(real) => Ok(real),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let parent = path.parent().unwrap_or(path);
            match tokio::fs::canonicalize(parent).await {
                Ok(real) => Ok(real),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(parent.to_path_buf()),
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Recursively delete `path`; an absent path counts as deleted
async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
