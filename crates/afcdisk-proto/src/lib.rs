//! Request and response messages exchanged with the device file service
//! and the mount service.

pub mod common;
pub mod fs;
pub mod mount;

pub use common::RequestHeader;
