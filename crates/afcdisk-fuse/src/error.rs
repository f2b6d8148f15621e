use std::io;
use std::path::PathBuf;

use afcdisk_types::{status_code_t, MountCode, Status, VolumeName};
use thiserror::Error;

/// Why a mount could not be brought up.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("volume {volume} is already mounted")]
    AlreadyMounted { volume: VolumeName },

    #[error("failed to set up mount point {}: {source}", path.display())]
    MountPoint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create session on {}: {source}", path.display())]
    Session {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn mount worker: {0}")]
    WorkerSpawn(#[source] io::Error),

    #[error("mount worker exited before reporting readiness")]
    WorkerExited,
}

impl MountError {
    pub fn code(&self) -> status_code_t {
        match self {
            MountError::AlreadyMounted { .. } => MountCode::ALREADY_MOUNTED,
            MountError::MountPoint { .. } => MountCode::MOUNT_FAILED,
            MountError::Session { .. } | MountError::WorkerExited => MountCode::SESSION_FAILED,
            MountError::WorkerSpawn(_) => MountCode::WORKER_SPAWN_FAILED,
        }
    }

    pub fn status(&self) -> Status {
        Status::with_message(self.code(), self.to_string())
    }
}

impl From<MountError> for Status {
    fn from(e: MountError) -> Self {
        e.status()
    }
}
