//! Reply types for the dispatch operations.
//!
//! Each operation produces one of these. The driver turns them into the
//! kernel response, which lets [`FsOps`](crate::FsOps) be tested without a
//! kernel connection.

use std::time::Duration;

use crate::types::{FileAttr, StatFs};

/// Result of an operation; the error is a positive errno.
pub type FuseResult<T> = Result<T, i32>;

/// Reply for getattr.
#[derive(Debug, Clone)]
pub struct ReplyAttr {
    pub attr: FileAttr,
    pub attr_timeout: Duration,
}

/// Reply for open and create.
#[derive(Debug, Clone, Copy)]
pub struct ReplyOpen {
    /// Backend file handle, returned untouched on read/write/release.
    pub fh: u64,
}

#[derive(Debug)]
pub struct ReplyData {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplyWrite {
    /// Number of bytes the backend reports as written.
    pub written: u32,
}

/// Reply for readdir: entry names, without `.` and `..`.
#[derive(Debug)]
pub struct ReplyDirectory {
    pub entries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReplyStatFs {
    pub stat: StatFs,
}
