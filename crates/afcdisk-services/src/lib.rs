//! Device file service backends.
//!
//! [`MemoryFs`] keeps a whole filesystem in memory. [`LoopbackFs`] serves a
//! directory of the host. Both report attributes through the AFC-style
//! key/value dictionaries in [`afc_info`], the same shape a device returns.

pub mod afc_info;
pub mod loopback;
pub mod memory;
pub mod path;

pub use loopback::LoopbackFs;
pub use memory::MemoryFs;

use afcdisk_types::{make_error_msg, FsCode, Result};

/// Largest read a backend serves in one call.
pub const MAX_READ_SIZE: u32 = 1024 * 1024;

pub(crate) fn check_read_size(size: u32) -> Result<()> {
    if size > MAX_READ_SIZE {
        return make_error_msg(FsCode::READ_TOO_LARGE, "Read request too large");
    }
    Ok(())
}
