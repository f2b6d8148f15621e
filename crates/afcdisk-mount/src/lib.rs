//! Mount orchestration for a mount server.
//!
//! [`MountManager`] keeps one [`ProxyFilesystem`](afcdisk_fuse::ProxyFilesystem)
//! per volume and serves the mount RPC service. [`DeviceWatcher`] turns
//! device connect/disconnect events into mounts and unmounts.

pub mod manager;
pub mod watcher;

pub use manager::MountManager;
pub use watcher::{DeviceEvent, DeviceWatcher};
