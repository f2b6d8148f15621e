//! A mount bound to its dispatch table and the loop serving it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::dispatch::{MountContext, ServiceDispatch};
use crate::driver::{DriverLoop, LoopExit};
use crate::error::MountError;
use crate::mount_point::MountPoint;

/// Owns a [`MountPoint`] and the driver loop bound to it.
pub struct Session {
    // Field order is drop order: the mount goes away before the loop.
    mount_point: MountPoint,
    driver_loop: Box<dyn DriverLoop>,
    exit: Arc<dyn LoopExit>,
    context: Arc<MountContext>,
}

impl Session {
    /// Bind a [`ServiceDispatch`] over `context` to the mount. On failure
    /// the mount point is dropped, which unregisters it.
    pub fn create(mut mount_point: MountPoint, context: Arc<MountContext>) -> Result<Self, MountError> {
        let path = mount_point.path().to_path_buf();
        let Some(channel) = mount_point.channel_mut() else {
            return Err(MountError::Session {
                path,
                source: io::Error::new(io::ErrorKind::NotConnected, "mount point is not registered"),
            });
        };
        let exit = channel.exit_handle();
        let ops = Box::new(ServiceDispatch::new(context.clone()));
        match channel.bind(ops) {
            Ok(driver_loop) => Ok(Self {
                mount_point,
                driver_loop,
                exit,
                context,
            }),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to create session");
                Err(MountError::Session { path, source: e })
            }
        }
    }

    pub fn mount_point(&self) -> &MountPoint {
        &self.mount_point
    }

    pub fn context(&self) -> &Arc<MountContext> {
        &self.context
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            exit: self.exit.clone(),
            mount_path: self.mount_point.path().to_path_buf(),
        }
    }

    /// Serve requests until the mount goes away or exit is forced.
    ///
    /// With `handle_signals` set, SIGINT, SIGTERM and SIGHUP force exit
    /// while the loop runs.
    pub fn run_loop(&mut self) -> io::Result<()> {
        let listener = self.context.config().handle_signals.then(|| {
            spawn_signal_listener(
                self.context.runtime(),
                self.exit.clone(),
                self.mount_point.path().to_path_buf(),
            )
        });
        tracing::debug!(path = %self.mount_point.path().display(), "entering driver loop");
        let result = self.driver_loop.run();
        tracing::debug!(path = %self.mount_point.path().display(), "driver loop returned");
        if let Some(task) = listener {
            task.abort();
        }
        result
    }

    pub fn make_loop_exit(&self) {
        self.exit.exit();
    }
}

fn spawn_signal_listener(
    runtime: &Handle,
    exit: Arc<dyn LoopExit>,
    mount_path: PathBuf,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let (mut int, mut term, mut hup) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::hangup()),
        ) {
            (Ok(int), Ok(term), Ok(hup)) => (int, term, hup),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                tracing::warn!(error = %e, "cannot install signal listeners");
                return;
            }
        };
        let name = tokio::select! {
            _ = int.recv() => "SIGINT",
            _ = term.recv() => "SIGTERM",
            _ = hup.recv() => "SIGHUP",
        };
        tracing::info!(signal = name, path = %mount_path.display(), "signal received, unmounting");
        exit.exit();
    })
}

/// Cloneable handle forcing a session's loop to exit from any thread.
#[derive(Clone)]
pub struct SessionHandle {
    exit: Arc<dyn LoopExit>,
    mount_path: PathBuf,
}

impl SessionHandle {
    pub fn mount_path(&self) -> &Path {
        &self.mount_path
    }

    /// Force unmount. Idempotent, also after the loop returned.
    pub fn make_loop_exit(&self) {
        tracing::debug!(path = %self.mount_path.display(), "forcing loop exit");
        self.exit.exit();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("mount_path", &self.mount_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FuseConfig;
    use crate::driver::MemoryDriver;
    use afcdisk_services::MemoryFs;
    use afcdisk_types::{FsId, VolumeName};
    use std::thread;
    use tokio::runtime::Runtime;

    fn setup(
        rt: &Runtime,
        root: &Path,
        driver: &MemoryDriver,
        handle_signals: bool,
    ) -> Result<Session, MountError> {
        let config = FuseConfig {
            mount_root: root.to_path_buf(),
            handle_signals,
            ..Default::default()
        };
        let fs_id = FsId::from("dev-1");
        let mount_point =
            MountPoint::create(driver, &config, &VolumeName::from("Test"), None, &fs_id)?;
        let context = Arc::new(MountContext::new(
            Arc::new(MemoryFs::new()),
            fs_id,
            rt.handle().clone(),
            config,
        ));
        Session::create(mount_point, context)
    }

    #[test]
    fn test_run_until_exit() {
        let rt = Runtime::new().unwrap();
        let root = tempfile::tempdir().unwrap();
        let driver = MemoryDriver::new();
        let mut session = setup(&rt, root.path(), &driver, false).unwrap();
        let handle = session.handle();
        let path = handle.mount_path().to_path_buf();
        assert_eq!(path, root.path().join("Test"));

        let worker = thread::spawn(move || {
            let result = session.run_loop();
            drop(session);
            result
        });

        let client = driver.client(&path).unwrap();
        let made = client.call(|ops| ops.mkdir("/a", 0o755));
        assert_eq!(made, Some(Ok(())));
        let names = client.call(|ops| ops.readdir("/").map(|r| r.entries));
        assert_eq!(names, Some(Ok(vec!["a".to_string()])));

        handle.make_loop_exit();
        worker.join().unwrap().unwrap();
        handle.make_loop_exit();
        assert!(!driver.is_mounted(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_bind_failure_unregisters() {
        let rt = Runtime::new().unwrap();
        let root = tempfile::tempdir().unwrap();
        let driver = MemoryDriver::new();
        driver.fail_next_bind();

        let err = setup(&rt, root.path(), &driver, false).err().unwrap();
        assert!(matches!(err, MountError::Session { .. }));
        assert!(driver.mounted_paths().is_empty());
        assert!(!root.path().join("Test").exists());
    }

    #[test]
    fn test_exit_before_loop_with_signal_listener() {
        let rt = Runtime::new().unwrap();
        let root = tempfile::tempdir().unwrap();
        let driver = MemoryDriver::new();
        let mut session = setup(&rt, root.path(), &driver, true).unwrap();

        // Exit requested before the loop starts: the loop returns at once.
        session.make_loop_exit();
        session.run_loop().unwrap();
        drop(session);
        assert!(driver.mounted_paths().is_empty());
    }
}
