//! Persistent configuration and queue store
//!
//! The broker engine owns the queue and routing data behind this surface;
//! the bootstrap's contract with it is a single `init` call carrying the
//! node identity and the two storage locations. Initialization creates the
//! queue directory when absent and writes the node manifest to the config
//! store so restarts and peers can verify which identity owns the data.

use crate::identity::NodeId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from store initialization.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create queue directory {}: {source}", path.display())]
    CreateQueueDir { path: PathBuf, source: io::Error },

    #[error("failed to create store directory {}: {source}", path.display())]
    CreateStoreDir { path: PathBuf, source: io::Error },

    #[error("failed to write node manifest {}: {source}", path.display())]
    WriteManifest { path: PathBuf, source: io::Error },

    #[error("failed to render node manifest: {0}")]
    RenderManifest(#[from] serde_json::Error),

    #[error("no usable default store location; pass -c and -q")]
    NoDefaultLocation,
}

/// On-disk record of which node owns this store.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeManifest {
    pub node: String,
    pub queue_dir: PathBuf,
    pub initialized_at: String,
}

/// Handle to the initialized store, passed on to the broker engine.
#[derive(Debug)]
pub struct ConfigStore {
    node_id: NodeId,
    config_path: PathBuf,
    queue_dir: PathBuf,
}

impl ConfigStore {
    /// Initialize the store for this node.
    ///
    /// `config_path` and `queue_path` fall back to per-user defaults when
    /// not given on the command line.
    pub fn init(
        node_id: NodeId,
        config_path: Option<&Path>,
        queue_path: Option<&Path>,
    ) -> Result<Self, StoreError> {
        let config_path = match config_path {
            Some(p) => p.to_path_buf(),
            None => default_base_dir()?.join("config.json"),
        };
        let queue_dir = match queue_path {
            Some(p) => p.to_path_buf(),
            None => default_base_dir()?.join("queues"),
        };

        fs::create_dir_all(&queue_dir).map_err(|source| StoreError::CreateQueueDir {
            path: queue_dir.clone(),
            source,
        })?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateStoreDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let manifest = NodeManifest {
            node: node_id.to_string(),
            queue_dir: queue_dir.clone(),
            initialized_at: chrono::Utc::now().to_rfc3339(),
        };
        let body = serde_json::to_vec_pretty(&manifest)?;
        fs::write(&config_path, body).map_err(|source| StoreError::WriteManifest {
            path: config_path.clone(),
            source,
        })?;

        debug!(config = %config_path.display(), queues = %queue_dir.display(), "store paths resolved");
        info!(node = %node_id, "config store initialized");

        Ok(Self {
            node_id,
            config_path,
            queue_dir,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }
}

fn default_base_dir() -> Result<PathBuf, StoreError> {
    dirs::data_local_dir()
        .map(|d| d.join("ferryd"))
        .ok_or(StoreError::NoDefaultLocation)
}
