//! The seam between a session and the OS filesystem driver.
//!
//! A [`MountDriver`] registers a mount at a path and yields a
//! [`MountChannel`]. Binding a dispatch table to the channel produces the
//! blocking [`DriverLoop`]. The channel's [`LoopExit`] forces the loop to
//! return from any thread.

mod kernel;
mod memory;

pub use self::kernel::FuserDriver;
pub use self::memory::{MemoryClient, MemoryDriver};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ops::FsOps;

/// One argument of the mount argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountArg {
    Debug,
    DeferPermissions,
    AllowOther,
    AutoUnmount,
    VolName(String),
    VolIcon(PathBuf),
    FsName(String),
}

impl MountArg {
    /// The `-o` form of the argument, e.g. `volname=Test`.
    pub fn as_option_string(&self) -> String {
        match self {
            MountArg::Debug => "debug".to_string(),
            MountArg::DeferPermissions => "defer_permissions".to_string(),
            MountArg::AllowOther => "allow_other".to_string(),
            MountArg::AutoUnmount => "auto_unmount".to_string(),
            MountArg::VolName(name) => format!("volname={}", name),
            MountArg::VolIcon(path) => format!("volicon={}", path.display()),
            MountArg::FsName(name) => format!("fsname={}", name),
        }
    }
}

impl fmt::Display for MountArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_option_string())
    }
}

/// Registers mounts with the OS (or a stand-in).
pub trait MountDriver: Send + Sync {
    fn mount(&self, path: &Path, args: &[MountArg]) -> io::Result<Box<dyn MountChannel>>;
}

impl<T: MountDriver + ?Sized> MountDriver for Arc<T> {
    fn mount(&self, path: &Path, args: &[MountArg]) -> io::Result<Box<dyn MountChannel>> {
        (**self).mount(path, args)
    }
}

/// A registered mount, not yet serving requests.
pub trait MountChannel: Send {
    /// Handle that forces the loop bound to this channel to return.
    fn exit_handle(&self) -> Arc<dyn LoopExit>;

    /// Attach the dispatch table. Can only succeed once per channel.
    fn bind(&mut self, ops: Box<dyn FsOps>) -> io::Result<Box<dyn DriverLoop>>;

    /// Withdraw the registration. Called exactly once, by the owning
    /// [`MountPoint`](crate::MountPoint).
    fn unregister(&mut self);
}

/// The blocking request loop of one mount.
pub trait DriverLoop: Send {
    /// Serve requests until the mount goes away.
    fn run(&mut self) -> io::Result<()>;
}

/// Forces a loop to exit. Idempotent, callable from any thread, also after
/// the loop already returned.
pub trait LoopExit: Send + Sync {
    fn exit(&self);
}
