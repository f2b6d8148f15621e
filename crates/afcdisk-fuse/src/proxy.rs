//! Mount lifecycle on a dedicated worker thread.
//!
//! `mount()` starts a worker that builds the [`MountPoint`] and the
//! [`Session`], reports readiness, then blocks in the driver loop.
//! `unmount()` forces the loop to exit without waiting; `wait_for_unmount()`
//! joins the worker. The session slot is the only state the caller and the
//! worker share, and it is only touched under its mutex.

use std::path::PathBuf;
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use afcdisk_types::VolumeName;
use parking_lot::Mutex;

use crate::dispatch::MountContext;
use crate::driver::MountDriver;
use crate::error::MountError;
use crate::mount_point::MountPoint;
use crate::session::{Session, SessionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Idle,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug)]
struct Slot {
    session: Option<SessionHandle>,
    state: MountState,
    /// `unmount()` arrived while the worker was still starting.
    exit_requested: bool,
}

/// One volume, mounted and served by a worker thread.
pub struct ProxyFilesystem {
    context: Arc<MountContext>,
    driver: Arc<dyn MountDriver>,
    volume: VolumeName,
    volicon: Option<PathBuf>,
    shared: Arc<Mutex<Slot>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProxyFilesystem {
    pub fn new(
        context: Arc<MountContext>,
        driver: Arc<dyn MountDriver>,
        volume: impl Into<VolumeName>,
        volicon: Option<PathBuf>,
    ) -> Self {
        Self {
            context,
            driver,
            volume: volume.into(),
            volicon,
            shared: Arc::new(Mutex::new(Slot {
                session: None,
                state: MountState::Idle,
                exit_requested: false,
            })),
            worker: Mutex::new(None),
        }
    }

    pub fn volume(&self) -> &VolumeName {
        &self.volume
    }

    pub fn context(&self) -> &Arc<MountContext> {
        &self.context
    }

    pub fn state(&self) -> MountState {
        self.shared.lock().state
    }

    /// Path of the running mount, if any.
    pub fn mount_path(&self) -> Option<PathBuf> {
        self.shared
            .lock()
            .session
            .as_ref()
            .map(|h| h.mount_path().to_path_buf())
    }

    /// Start the worker and wait until the session is installed or setup
    /// failed. On failure nothing stays registered and the worker is gone.
    pub fn mount(&self) -> Result<(), MountError> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(MountError::AlreadyMounted {
                volume: self.volume.clone(),
            });
        }
        if let Some(finished) = worker.take() {
            join_worker(finished, &self.volume);
        }

        {
            let mut slot = self.shared.lock();
            slot.state = MountState::Starting;
            slot.exit_requested = false;
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let job = WorkerJob {
            context: self.context.clone(),
            driver: self.driver.clone(),
            volume: self.volume.clone(),
            volicon: self.volicon.clone(),
            shared: self.shared.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("afcdisk-{}", self.volume))
            .spawn(move || job.run(ready_tx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.lock().state = MountState::Idle;
                tracing::error!(volume = %self.volume, error = %e, "failed to spawn mount worker");
                return Err(MountError::WorkerSpawn(e));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(handle);
                tracing::info!(volume = %self.volume, fs_id = %self.context.fs_id(), "mount ready");
                Ok(())
            }
            Ok(Err(e)) => {
                join_worker(handle, &self.volume);
                Err(e)
            }
            Err(_) => {
                join_worker(handle, &self.volume);
                let mut slot = self.shared.lock();
                slot.session = None;
                slot.state = MountState::Idle;
                Err(MountError::WorkerExited)
            }
        }
    }

    /// Force the running session to exit. Does not wait; no-op when nothing
    /// is mounted.
    pub fn unmount(&self) {
        let mut guard = self.shared.lock();
        let slot = &mut *guard;
        match (&slot.session, slot.state) {
            (Some(handle), _) => {
                tracing::info!(volume = %self.volume, "unmounting");
                handle.make_loop_exit();
                slot.state = MountState::Stopping;
            }
            (None, MountState::Starting) => slot.exit_requested = true,
            (None, _) => {}
        }
    }

    /// Block until the worker has torn the session down. Returns at once
    /// when no worker exists.
    pub fn wait_for_unmount(&self) {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            join_worker(handle, &self.volume);
        }
    }
}

impl Drop for ProxyFilesystem {
    fn drop(&mut self) {
        self.unmount();
        self.wait_for_unmount();
    }
}

fn join_worker(handle: JoinHandle<()>, volume: &VolumeName) {
    if handle.join().is_err() {
        tracing::error!(volume = %volume, "mount worker panicked");
    }
}

struct WorkerJob {
    context: Arc<MountContext>,
    driver: Arc<dyn MountDriver>,
    volume: VolumeName,
    volicon: Option<PathBuf>,
    shared: Arc<Mutex<Slot>>,
}

impl WorkerJob {
    fn run(self, ready: SyncSender<Result<(), MountError>>) {
        let mut session = match self.start() {
            Ok(session) => session,
            Err(e) => {
                self.shared.lock().state = MountState::Idle;
                let _ = ready.send(Err(e));
                return;
            }
        };

        {
            let mut slot = self.shared.lock();
            let handle = session.handle();
            if slot.exit_requested {
                handle.make_loop_exit();
                slot.state = MountState::Stopping;
            } else {
                slot.state = MountState::Running;
            }
            slot.session = Some(handle);
        }
        let _ = ready.send(Ok(()));
        drop(ready);

        if let Err(e) = session.run_loop() {
            tracing::error!(volume = %self.volume, error = %e, "driver loop failed");
        }

        let mut slot = self.shared.lock();
        slot.session = None;
        drop(session);
        slot.state = MountState::Idle;
        slot.exit_requested = false;
        tracing::info!(volume = %self.volume, "unmounted");
    }

    fn start(&self) -> Result<Session, MountError> {
        let mount_point = MountPoint::create(
            self.driver.as_ref(),
            self.context.config(),
            &self.volume,
            self.volicon.as_deref(),
            self.context.fs_id(),
        )?;
        Session::create(mount_point, self.context.clone())
    }
}
