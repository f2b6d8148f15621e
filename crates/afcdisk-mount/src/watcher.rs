//! Mounts and unmounts volumes as devices come and go.

use afcdisk_types::{FsId, Result, VolumeName};
use tokio::sync::mpsc;

use crate::manager::{blocking, MountManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A device exposing `volume` through the filesystem `fs_id` appeared.
    Connected { fs_id: FsId, volume: VolumeName },
    /// Every volume of `fs_id` must go.
    Disconnected { fs_id: FsId },
}

pub struct DeviceWatcher {
    manager: MountManager,
    events: mpsc::Receiver<DeviceEvent>,
}

impl DeviceWatcher {
    pub fn new(manager: MountManager, events: mpsc::Receiver<DeviceEvent>) -> Self {
        Self { manager, events }
    }

    /// A watcher together with the sender feeding it.
    pub fn channel(manager: MountManager, capacity: usize) -> (mpsc::Sender<DeviceEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(manager, rx))
    }

    /// Handle events until every sender is dropped. Failures are logged and
    /// do not stop the watcher.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            if let Err(e) = self.handle(event.clone()).await {
                tracing::warn!(?event, error = %e, "device event failed");
            }
        }
        tracing::debug!("device event channel closed");
    }

    pub async fn handle(&self, event: DeviceEvent) -> Result<()> {
        match event {
            DeviceEvent::Connected { fs_id, volume } => {
                let manager = self.manager.clone();
                let path = blocking(move || manager.mount_volume(fs_id, volume)).await?;
                tracing::info!(path = %path.display(), "device volume mounted");
                Ok(())
            }
            DeviceEvent::Disconnected { fs_id } => {
                let manager = self.manager.clone();
                blocking(move || {
                    for volume in manager.volumes_of(&fs_id) {
                        if let Err(e) = manager.unmount_volume(&fs_id, &volume) {
                            tracing::warn!(%volume, error = %e, "unmount on disconnect failed");
                        }
                    }
                    Ok(())
                })
                .await
            }
        }
    }
}
