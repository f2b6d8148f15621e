use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use afcdisk_fuse::{FuseConfig, MountContext, MountDriver, MountState, ProxyFilesystem};
use afcdisk_proto::mount::{
    ListMountsReq, ListMountsRsp, MountInfo, MountReq, MountRsp, UnmountReq, UnmountRsp,
};
use afcdisk_stubs::{DeviceFileService, MountServiceStub};
use afcdisk_types::{make_error_msg, FsId, MountCode, Result, Status, StatusCode, VolumeName};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;

struct Inner {
    service: Arc<dyn DeviceFileService>,
    driver: Arc<dyn MountDriver>,
    runtime: Handle,
    config: FuseConfig,
    volicon: Option<PathBuf>,
    mounts: Mutex<HashMap<VolumeName, Slot>>,
}

enum Slot {
    /// A `mount_volume` call is in progress.
    Reserved,
    Mounted(Arc<ProxyFilesystem>),
}

impl Slot {
    fn mounted(&self) -> Option<&Arc<ProxyFilesystem>> {
        match self {
            Slot::Mounted(proxy) if proxy.state() != MountState::Idle => Some(proxy),
            _ => None,
        }
    }
}

/// Volume → [`ProxyFilesystem`] table of a mount server.
///
/// Every filesystem shares the same device file service; requests are told
/// apart by the `fs_id` each mount stamps on them. The blocking methods
/// must not run on a runtime worker thread; the async
/// [`MountServiceStub`] methods move them to the blocking pool.
#[derive(Clone)]
pub struct MountManager {
    inner: Arc<Inner>,
}

impl MountManager {
    pub fn new(
        service: Arc<dyn DeviceFileService>,
        driver: Arc<dyn MountDriver>,
        runtime: Handle,
        config: FuseConfig,
        volicon: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                driver,
                runtime,
                config,
                volicon,
                mounts: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Mount `volume` for the filesystem `fs_id` and return its path.
    ///
    /// The table lock is not held while the mount is set up; the volume is
    /// reserved instead, so concurrent mounts of it fail with
    /// `ALREADY_MOUNTED`.
    pub fn mount_volume(&self, fs_id: FsId, volume: VolumeName) -> Result<PathBuf> {
        {
            let mut mounts = self.inner.mounts.lock();
            match mounts.get(&volume) {
                Some(Slot::Reserved) => {
                    return make_error_msg(
                        MountCode::ALREADY_MOUNTED,
                        format!("volume {} is being mounted", volume),
                    );
                }
                Some(slot) if slot.mounted().is_some() => {
                    return make_error_msg(
                        MountCode::ALREADY_MOUNTED,
                        format!("volume {} is already mounted", volume),
                    );
                }
                // A leftover entry belongs to a volume unmounted by a third party.
                _ => {
                    mounts.insert(volume.clone(), Slot::Reserved);
                }
            }
        }

        let context = Arc::new(MountContext::new(
            self.inner.service.clone(),
            fs_id,
            self.inner.runtime.clone(),
            self.inner.config.clone(),
        ));
        let proxy = Arc::new(ProxyFilesystem::new(
            context,
            self.inner.driver.clone(),
            volume.clone(),
            self.inner.volicon.clone(),
        ));
        if let Err(e) = proxy.mount() {
            let mut mounts = self.inner.mounts.lock();
            if matches!(mounts.get(&volume), Some(Slot::Reserved)) {
                mounts.remove(&volume);
            }
            return Err(e.into());
        }

        let path = proxy
            .mount_path()
            .unwrap_or_else(|| self.inner.config.mount_root.join(volume.as_str()));
        {
            let mut mounts = self.inner.mounts.lock();
            if let Some(slot) = mounts.get_mut(&volume) {
                if matches!(slot, Slot::Reserved) {
                    *slot = Slot::Mounted(proxy);
                    return Ok(path);
                }
            }
        }
        // The reservation was dropped by `unmount_all` meanwhile.
        proxy.unmount();
        proxy.wait_for_unmount();
        make_error_msg(
            MountCode::NOT_MOUNTED,
            format!("volume {} was unmounted while mounting", volume),
        )
    }

    /// Unmount `volume` and wait for its session to be torn down. An empty
    /// `fs_id` matches any filesystem.
    pub fn unmount_volume(&self, fs_id: &FsId, volume: &VolumeName) -> Result<()> {
        let proxy = {
            let mut mounts = self.inner.mounts.lock();
            match mounts.get(volume) {
                Some(Slot::Mounted(p)) if fs_id.is_empty() || p.context().fs_id() == fs_id => {
                    match mounts.remove(volume) {
                        Some(Slot::Mounted(p)) => Some(p),
                        _ => None,
                    }
                }
                _ => None,
            }
        };
        let Some(proxy) = proxy else {
            return make_error_msg(MountCode::NOT_MOUNTED, volume.to_string());
        };
        let was_mounted = proxy.state() != MountState::Idle;
        proxy.unmount();
        proxy.wait_for_unmount();
        if !was_mounted {
            return make_error_msg(MountCode::NOT_MOUNTED, volume.to_string());
        }
        Ok(())
    }

    /// Volumes currently mounted for `fs_id`.
    pub fn volumes_of(&self, fs_id: &FsId) -> Vec<VolumeName> {
        self.inner
            .mounts
            .lock()
            .iter()
            .filter(|(_, slot)| slot.mounted().is_some_and(|p| p.context().fs_id() == fs_id))
            .map(|(v, _)| v.clone())
            .collect()
    }

    pub fn list(&self) -> Vec<MountInfo> {
        let mut mounts: Vec<MountInfo> = self
            .inner
            .mounts
            .lock()
            .iter()
            .filter_map(|(volume, slot)| {
                let Slot::Mounted(proxy) = slot else {
                    return None;
                };
                proxy.mount_path().map(|path| MountInfo {
                    fs_id: proxy.context().fs_id().clone(),
                    volume: volume.clone(),
                    mount_path: path.display().to_string(),
                })
            })
            .collect();
        mounts.sort_by(|a, b| a.volume.cmp(&b.volume));
        mounts
    }

    /// Force every session to exit, then wait for all of them.
    pub fn unmount_all(&self) {
        let proxies: Vec<_> = self
            .inner
            .mounts
            .lock()
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Mounted(p) => Some(p),
                Slot::Reserved => None,
            })
            .collect();
        for proxy in &proxies {
            proxy.unmount();
        }
        for proxy in &proxies {
            proxy.wait_for_unmount();
        }
        tracing::info!(count = proxies.len(), "all volumes unmounted");
    }
}

/// Run blocking mount work on the runtime's blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Status::with_message(StatusCode::UNKNOWN, e.to_string()))?
}

#[async_trait]
impl MountServiceStub for MountManager {
    async fn mount(&self, req: MountReq) -> Result<MountRsp> {
        let this = self.clone();
        let path = blocking(move || this.mount_volume(req.fs_id, req.volume)).await?;
        Ok(MountRsp {
            mount_path: path.display().to_string(),
        })
    }

    async fn unmount(&self, req: UnmountReq) -> Result<UnmountRsp> {
        let this = self.clone();
        blocking(move || this.unmount_volume(&req.fs_id, &req.volume)).await?;
        Ok(UnmountRsp {})
    }

    async fn list_mounts(&self, _req: ListMountsReq) -> Result<ListMountsRsp> {
        Ok(ListMountsRsp {
            mounts: self.list(),
        })
    }
}
