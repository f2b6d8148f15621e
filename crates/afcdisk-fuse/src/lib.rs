//! afcdisk-fuse: expose a device file service as a mounted filesystem.
//!
//! # Architecture
//!
//! - **[`config`]** - `FuseConfig`: mount root, mount flags, cache timeouts
//!   and the error policy.
//!
//! - **[`types`]** / **[`reply`]** - driver-facing attribute and reply types.
//!   Every operation returns `FuseResult<T>`, the error being an errno.
//!
//! - **[`ops`]** - the path-based `FsOps` trait the driver loop calls into.
//!   Default implementations return `ENOSYS`.
//!
//! - **[`dispatch`]** - `ServiceDispatch`, the `FsOps` implementation that
//!   forwards each callback to a `DeviceFileService` through a
//!   `MountContext`.
//!
//! - **[`driver`]** - the OS seam: `MountDriver` registers a mount and
//!   yields a channel, the channel binds a dispatch table into a blocking
//!   `DriverLoop`. `FuserDriver` talks to the kernel, `MemoryDriver` runs
//!   everything in process.
//!
//! - **[`mount_point`]**, **[`session`]**, **[`proxy`]** - the lifecycle:
//!   a `MountPoint` owns the registration, a `Session` owns the loop bound
//!   to it, and `ProxyFilesystem` runs a session on a dedicated thread with
//!   `mount()` / `unmount()` / `wait_for_unmount()`.

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod inode;
pub mod mount_point;
pub mod ops;
pub mod proxy;
pub mod reply;
pub mod session;
pub mod types;

pub use config::{ErrorPolicy, FuseConfig};
pub use dispatch::{MountContext, ServiceDispatch};
pub use driver::{
    DriverLoop, FuserDriver, LoopExit, MemoryClient, MemoryDriver, MountArg, MountChannel,
    MountDriver,
};
pub use error::MountError;
pub use mount_point::MountPoint;
pub use ops::FsOps;
pub use proxy::{MountState, ProxyFilesystem};
pub use reply::FuseResult;
pub use session::{Session, SessionHandle};
pub use types::{FileAttr, StatFs};
