//! Service stub traits for the device file service and the mount service.
//!
//! Each trait is the async interface a caller programs against. This crate
//! provides a configurable mock, a remote implementation over
//! [`afcdisk_net::RpcClient`], and a server-side adapter exposing any
//! implementation as an RPC service.

pub mod fs_stub;
pub mod handler;
pub mod mount_stub;
pub mod remote;

pub use fs_stub::{DeviceFileService, MockDeviceFileService};
pub use handler::FsServiceHandler;
pub use mount_stub::{MountServiceHandler, MountServiceStub, RemoteMountStub};
pub use remote::RemoteFsStub;
