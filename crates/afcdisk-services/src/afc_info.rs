//! AFC key/value dictionaries and their conversion into protocol stats.
//!
//! A device describes a path with keys like `st_size`, `st_blocks`,
//! `st_ifmt` (`"S_IFDIR"`, `"S_IFREG"`, ...), `st_nlink` and `st_mtime`
//! (nanoseconds), and itself with `FSTotalBytes`, `FSFreeBytes`,
//! `FSBlockSize` and `Model`. All values are decimal strings.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use afcdisk_proto::common::Timespec;
use afcdisk_proto::fs::{FsStat, Stat};
use afcdisk_types::{make_error_msg, FsCode, Result, Status, StatusCode};

pub type InfoMap = BTreeMap<String, String>;

/// File type as named by `st_ifmt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl FileKind {
    pub fn ifmt_name(self) -> &'static str {
        match self {
            FileKind::Directory => "S_IFDIR",
            FileKind::Regular => "S_IFREG",
            FileKind::Symlink => "S_IFLNK",
            FileKind::CharDevice => "S_IFCHR",
            FileKind::BlockDevice => "S_IFBLK",
            FileKind::Fifo => "S_IFIFO",
            FileKind::Socket => "S_IFSOCK",
        }
    }

    pub fn from_ifmt_name(name: &str) -> Option<Self> {
        Some(match name {
            "S_IFDIR" => FileKind::Directory,
            "S_IFREG" => FileKind::Regular,
            "S_IFLNK" => FileKind::Symlink,
            "S_IFCHR" => FileKind::CharDevice,
            "S_IFBLK" => FileKind::BlockDevice,
            "S_IFIFO" => FileKind::Fifo,
            "S_IFSOCK" => FileKind::Socket,
            _ => return None,
        })
    }

    fn type_bits(self) -> u32 {
        (match self {
            FileKind::Directory => libc::S_IFDIR,
            FileKind::Regular => libc::S_IFREG,
            FileKind::Symlink => libc::S_IFLNK,
            FileKind::CharDevice => libc::S_IFCHR,
            FileKind::BlockDevice => libc::S_IFBLK,
            FileKind::Fifo => libc::S_IFIFO,
            FileKind::Socket => libc::S_IFSOCK,
        }) as u32
    }

    /// Devices expose no permission bits; these are the ones reported.
    fn permission_bits(self) -> u32 {
        match self {
            FileKind::Directory => 0o755,
            FileKind::Symlink => 0o777,
            _ => 0o644,
        }
    }
}

/// Build the dictionary a device would return for one path.
pub fn file_info(kind: FileKind, size: u64, nlink: u32, mtime: SystemTime) -> InfoMap {
    let mut info = InfoMap::new();
    info.insert("st_size".into(), size.to_string());
    info.insert("st_blocks".into(), size.div_ceil(512).to_string());
    info.insert("st_ifmt".into(), kind.ifmt_name().into());
    info.insert("st_nlink".into(), nlink.to_string());
    let nanos = mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    info.insert("st_mtime".into(), nanos.to_string());
    info
}

/// Build the dictionary a device would return about its filesystem.
pub fn device_info(model: &str, block_size: u32, total_bytes: u64, free_bytes: u64) -> InfoMap {
    let mut info = InfoMap::new();
    info.insert("Model".into(), model.into());
    info.insert("FSBlockSize".into(), block_size.to_string());
    info.insert("FSTotalBytes".into(), total_bytes.to_string());
    info.insert("FSFreeBytes".into(), free_bytes.to_string());
    info
}

fn number<T: std::str::FromStr>(info: &InfoMap, key: &str) -> Result<Option<T>> {
    match info.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Status::with_message(
                StatusCode::INVALID_FORMAT,
                format!("{}: not a number: {:?}", key, raw),
            )
        }),
    }
}

/// Convert a path dictionary into a [`Stat`].
///
/// `st_size`, `st_ifmt` and `st_blocks` are required. The mode carries the
/// file type plus fixed permissions; mtime keeps whole seconds only.
pub fn stat_from_file_info(info: &InfoMap) -> Result<Stat> {
    let (Some(size), Some(blocks), Some(ifmt)) = (
        number::<u64>(info, "st_size")?,
        number::<u64>(info, "st_blocks")?,
        info.get("st_ifmt"),
    ) else {
        return make_error_msg(FsCode::MISSING_KEYS, "file info: missing keys");
    };

    let Some(kind) = FileKind::from_ifmt_name(ifmt) else {
        return make_error_msg(
            FsCode::UNKNOWN_FILE_TYPE,
            format!("file info: unknown st_ifmt value {:?}", ifmt),
        );
    };

    let mtime = number::<u64>(info, "st_mtime")?.map(|ns| Timespec {
        tv_sec: (ns / 1_000_000_000) as i64,
        tv_nsec: 0,
    });

    Ok(Stat {
        size,
        blocks,
        mode: kind.type_bits() | kind.permission_bits(),
        nlink: number::<u32>(info, "st_nlink")?.unwrap_or(0),
        mtime,
    })
}

/// Convert a device dictionary into an [`FsStat`].
pub fn fs_stat_from_device_info(info: &InfoMap) -> Result<FsStat> {
    let (Some(total), Some(block_size), true) = (
        number::<u64>(info, "FSTotalBytes")?,
        number::<u32>(info, "FSBlockSize")?,
        info.contains_key("Model"),
    ) else {
        return make_error_msg(FsCode::MISSING_KEYS, "device info: missing keys");
    };
    if block_size == 0 {
        return make_error_msg(StatusCode::INVALID_FORMAT, "device info: zero block size");
    }
    let free = number::<u64>(info, "FSFreeBytes")?.unwrap_or(0);
    Ok(FsStat {
        bsize: block_size,
        frsize: block_size,
        blocks: total / block_size as u64,
        bfree: free / block_size as u64,
    })
}
