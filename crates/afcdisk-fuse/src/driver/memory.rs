//! In-process driver: mounts are registered in a table and requests are
//! injected through a [`MemoryClient`] instead of the kernel.
//!
//! The loop still runs on whichever thread calls [`DriverLoop::run`], so
//! the whole mount lifecycle behaves as it does with a real driver.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DriverLoop, LoopExit, MountArg, MountChannel, MountDriver};
use crate::ops::FsOps;

type Request = Box<dyn FnOnce(&dyn FsOps) + Send>;

enum Msg {
    Request(Request),
    Exit,
}

struct Registration {
    args: Vec<MountArg>,
    sender: Sender<Msg>,
    exit: Arc<MemoryExit>,
}

#[derive(Default)]
struct Inner {
    mounts: Mutex<HashMap<PathBuf, Registration>>,
    fail_next_mount: AtomicBool,
    fail_next_bind: AtomicBool,
}

/// A [`MountDriver`] that never touches the OS.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    inner: Arc<Inner>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `mount` fail.
    pub fn fail_next_mount(&self) {
        self.inner.fail_next_mount.store(true, Ordering::SeqCst);
    }

    /// Make the next `bind` fail.
    pub fn fail_next_bind(&self) {
        self.inner.fail_next_bind.store(true, Ordering::SeqCst);
    }

    pub fn is_mounted(&self, path: &Path) -> bool {
        self.inner.mounts.lock().contains_key(path)
    }

    pub fn mount_args(&self, path: &Path) -> Option<Vec<MountArg>> {
        self.inner.mounts.lock().get(path).map(|r| r.args.clone())
    }

    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.inner.mounts.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// A client issuing requests against the mount at `path`.
    pub fn client(&self, path: &Path) -> Option<MemoryClient> {
        self.inner.mounts.lock().get(path).map(|r| MemoryClient {
            sender: r.sender.clone(),
        })
    }

    /// Unmount as a third party would (`umount <path>`): the registration
    /// disappears and the loop returns.
    pub fn unmount_externally(&self, path: &Path) -> bool {
        let Some(registration) = self.inner.mounts.lock().remove(path) else {
            return false;
        };
        registration.exit.exit();
        true
    }
}

impl MountDriver for MemoryDriver {
    fn mount(&self, path: &Path, args: &[MountArg]) -> io::Result<Box<dyn MountChannel>> {
        if self.inner.fail_next_mount.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected mount failure"));
        }
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            ));
        }
        let mut mounts = self.inner.mounts.lock();
        if mounts.contains_key(path) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        let (sender, receiver) = mpsc::channel();
        let exit = Arc::new(MemoryExit {
            sender: Mutex::new(sender.clone()),
        });
        mounts.insert(
            path.to_path_buf(),
            Registration {
                args: args.to_vec(),
                sender,
                exit: exit.clone(),
            },
        );
        tracing::debug!(path = %path.display(), "memory mount registered");
        Ok(Box::new(MemoryChannel {
            inner: self.inner.clone(),
            path: path.to_path_buf(),
            receiver: Some(receiver),
            exit,
        }))
    }
}

struct MemoryExit {
    sender: Mutex<Sender<Msg>>,
}

impl LoopExit for MemoryExit {
    fn exit(&self) {
        // Fails only when the loop already returned.
        let _ = self.sender.lock().send(Msg::Exit);
    }
}

struct MemoryChannel {
    inner: Arc<Inner>,
    path: PathBuf,
    receiver: Option<Receiver<Msg>>,
    exit: Arc<MemoryExit>,
}

impl MountChannel for MemoryChannel {
    fn exit_handle(&self) -> Arc<dyn LoopExit> {
        self.exit.clone()
    }

    fn bind(&mut self, ops: Box<dyn FsOps>) -> io::Result<Box<dyn DriverLoop>> {
        if self.inner.fail_next_bind.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected bind failure"));
        }
        let Some(receiver) = self.receiver.take() else {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "channel already bound",
            ));
        };
        Ok(Box::new(MemoryLoop { ops, receiver }))
    }

    fn unregister(&mut self) {
        self.inner.mounts.lock().remove(&self.path);
        self.exit.exit();
        tracing::debug!(path = %self.path.display(), "memory mount unregistered");
    }
}

struct MemoryLoop {
    ops: Box<dyn FsOps>,
    receiver: Receiver<Msg>,
}

impl DriverLoop for MemoryLoop {
    fn run(&mut self) -> io::Result<()> {
        self.ops.init();
        while let Ok(Msg::Request(request)) = self.receiver.recv() {
            request(self.ops.as_ref());
        }
        self.ops.destroy();
        Ok(())
    }
}

/// Sends requests to a mounted loop and waits for the answers.
#[derive(Clone)]
pub struct MemoryClient {
    sender: Sender<Msg>,
}

impl MemoryClient {
    /// Run `f` on the loop thread. `None` once the loop is gone.
    pub fn call<T, F>(&self, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn FsOps) -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let request: Request = Box::new(move |ops| {
            let _ = tx.send(f(ops));
        });
        self.sender.send(Msg::Request(request)).ok()?;
        rx.recv().ok()
    }
}
