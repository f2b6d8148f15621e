//! Device file service messages.
//!
//! One request/response pair per operation. Every request carries a
//! [`RequestHeader`] naming the target filesystem.

use afcdisk_types::FileHandle;
use serde::{Deserialize, Serialize};

use crate::common::{RequestHeader, Timespec};

/// Service id the device file service registers under.
pub const FS_SERVICE_ID: u16 = 1;

/// Method ids of the device file service.
#[allow(non_snake_case)]
pub mod FsMethod {
    pub const GET_ATTR: u16 = 1;
    pub const READ_DIR: u16 = 2;
    pub const UNLINK: u16 = 3;
    pub const MKDIR: u16 = 4;
    pub const RENAME: u16 = 5;
    pub const OPEN: u16 = 6;
    pub const CREATE: u16 = 7;
    pub const RELEASE: u16 = 8;
    pub const READ: u16 = 9;
    pub const WRITE: u16 = 10;
    pub const TRUNCATE: u16 = 11;
    pub const STAT_FS: u16 = 12;
}

/// File attributes as reported by the backing store.
///
/// `mode` holds both the `S_IF*` type bits and the permission bits.
/// An `nlink` of zero means the backend did not report a link count.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stat {
    pub size: u64,
    pub blocks: u64,
    pub mode: u32,
    pub nlink: u32,
    pub mtime: Option<Timespec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetAttrReq {
    pub header: RequestHeader,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetAttrRsp {
    pub stat: Stat,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadDirReq {
    pub header: RequestHeader,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirEntry {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadDirRsp {
    pub entries: Vec<DirEntry>,
}

impl ReadDirRsp {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: names
                .into_iter()
                .map(|n| DirEntry { filename: n.into() })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnlinkReq {
    pub header: RequestHeader,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnlinkRsp {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MkDirReq {
    pub header: RequestHeader,
    pub path: String,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MkDirRsp {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenameReq {
    pub header: RequestHeader,
    pub source_path: String,
    pub destination_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenameRsp {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenReq {
    pub header: RequestHeader,
    pub path: String,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenRsp {
    pub filehandle: FileHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateReq {
    pub header: RequestHeader,
    pub path: String,
    pub flags: i32,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateRsp {
    pub filehandle: FileHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReleaseReq {
    pub header: RequestHeader,
    pub filehandle: FileHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReleaseRsp {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadReq {
    pub header: RequestHeader,
    pub filehandle: FileHandle,
    pub size: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadRsp {
    pub buffer: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteReq {
    pub header: RequestHeader,
    pub filehandle: FileHandle,
    pub buffer: Vec<u8>,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteRsp {
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TruncateReq {
    pub header: RequestHeader,
    pub path: String,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TruncateRsp {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatFsReq {
    pub header: RequestHeader,
}

/// Space figures of the backing store, in units of `bsize`/`frsize`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FsStat {
    pub bsize: u32,
    pub frsize: u32,
    pub blocks: u64,
    pub bfree: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatFsRsp {
    pub stat: FsStat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_dir_from_names() {
        let rsp = ReadDirRsp::from_names(["a", "b"]);
        let names: Vec<_> = rsp.entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_stat_missing_mtime_decodes() {
        let stat: Stat =
            serde_json::from_str(r#"{"size":1,"blocks":0,"mode":33188,"nlink":0,"mtime":null}"#)
                .unwrap();
        assert_eq!(stat.size, 1);
        assert!(stat.mtime.is_none());
    }

    #[test]
    fn test_method_ids_are_distinct() {
        let ids = [
            FsMethod::GET_ATTR,
            FsMethod::READ_DIR,
            FsMethod::UNLINK,
            FsMethod::MKDIR,
            FsMethod::RENAME,
            FsMethod::OPEN,
            FsMethod::CREATE,
            FsMethod::RELEASE,
            FsMethod::READ,
            FsMethod::WRITE,
            FsMethod::TRUNCATE,
            FsMethod::STAT_FS,
        ];
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }
}
