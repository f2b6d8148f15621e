//! Driver-facing attribute types.

use std::time::{SystemTime, UNIX_EPOCH};

// ── Inode number constants ──────────────────────────────────────────────────

/// The root inode number (always 1 in the kernel protocol).
pub const ROOT_INO: u64 = 1;

// ── File type bits ──────────────────────────────────────────────────────────

pub const S_IFMT: u32 = libc::S_IFMT as u32;
pub const S_IFREG: u32 = libc::S_IFREG as u32;
pub const S_IFDIR: u32 = libc::S_IFDIR as u32;
pub const S_IFLNK: u32 = libc::S_IFLNK as u32;

/// Longest file name reported through statfs.
pub const NAME_MAX: u32 = 255;

// ── Attributes ──────────────────────────────────────────────────────────────

/// Attributes of one path, as handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttr {
    pub size: u64,
    /// Number of 512-byte blocks.
    pub blocks: u64,
    /// File type and permission bits.
    pub mode: u32,
    pub nlink: u32,
    pub mtime: SystemTime,
}

impl Default for FileAttr {
    fn default() -> Self {
        Self {
            size: 0,
            blocks: 0,
            mode: 0,
            nlink: 0,
            mtime: UNIX_EPOCH,
        }
    }
}

impl FileAttr {
    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }

    pub fn permissions(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

/// Filesystem statistics (statfs).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatFs {
    pub bsize: u32,
    pub frsize: u32,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub namelen: u32,
}
