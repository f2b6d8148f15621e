//! In-memory device file service.
//!
//! [`MemoryFs`] behaves like a small AFC device: a tree of directories and
//! regular files addressed by absolute path, with file handles handed out by
//! `open`/`create`. It backs the tests of the proxy layers and the
//! `--memory` mode of the fs server.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use afcdisk_proto::fs::{
    CreateReq, CreateRsp, GetAttrReq, GetAttrRsp, MkDirReq, MkDirRsp, OpenReq, OpenRsp,
    ReadDirReq, ReadDirRsp, ReadReq, ReadRsp, ReleaseReq, ReleaseRsp, RenameReq, RenameRsp,
    StatFsReq, StatFsRsp, TruncateReq, TruncateRsp, UnlinkReq, UnlinkRsp, WriteReq, WriteRsp,
};
use afcdisk_stubs::DeviceFileService;
use afcdisk_types::{make_error, make_error_msg, FileHandle, FsCode, Result, StatusCode};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::afc_info::{self, FileKind};
use crate::path;

const DEFAULT_CAPACITY: u64 = 1 << 30;
const DEFAULT_BLOCK_SIZE: u32 = 4096;
const MODEL: &str = "MemoryFs";

enum NodeData {
    Dir,
    File(Vec<u8>),
}

struct Node {
    data: NodeData,
    mtime: SystemTime,
    /// False once unlinked while a handle still refers to it.
    linked: bool,
}

impl Node {
    fn dir() -> Self {
        Self {
            data: NodeData::Dir,
            mtime: SystemTime::now(),
            linked: true,
        }
    }

    fn file(contents: Vec<u8>) -> Self {
        Self {
            data: NodeData::File(contents),
            mtime: SystemTime::now(),
            linked: true,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.data, NodeData::Dir)
    }
}

struct OpenFile {
    ino: u64,
    writable: bool,
}

struct State {
    paths: BTreeMap<String, u64>,
    nodes: HashMap<u64, Node>,
    handles: HashMap<FileHandle, OpenFile>,
    next_ino: u64,
    next_fh: u64,
}

impl State {
    fn new() -> Self {
        let mut state = Self {
            paths: BTreeMap::new(),
            nodes: HashMap::new(),
            handles: HashMap::new(),
            next_ino: 1,
            next_fh: 1,
        };
        state.insert("/".to_string(), Node::dir());
        state
    }

    fn insert(&mut self, path: String, node: Node) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        self.nodes.insert(ino, node);
        self.paths.insert(path, ino);
        ino
    }

    fn lookup(&self, path: &str) -> Result<(u64, &Node)> {
        let ino = match self.paths.get(path) {
            Some(ino) => *ino,
            None => return make_error_msg(FsCode::NOT_FOUND, path.to_string()),
        };
        match self.nodes.get(&ino) {
            Some(node) => Ok((ino, node)),
            None => make_error_msg(FsCode::NOT_FOUND, path.to_string()),
        }
    }

    /// `Some(true)` for a directory, `Some(false)` for a file, `None` if
    /// nothing lives at `path`.
    fn is_dir(&self, path: &str) -> Option<bool> {
        self.lookup(path).ok().map(|(_, node)| node.is_dir())
    }

    fn require_parent_dir(&self, path: &str) -> Result<()> {
        let Some((parent, _)) = path::split(path) else {
            return make_error_msg(FsCode::EXISTS, "/");
        };
        let (_, node) = self.lookup(parent)?;
        if !node.is_dir() {
            return make_error_msg(FsCode::NOT_DIRECTORY, parent.to_string());
        }
        Ok(())
    }

    /// Paths of the direct children of `dir`, in name order.
    fn children(&self, dir: &str) -> Vec<&str> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.paths
            .range(prefix.clone()..)
            .map(|(p, _)| p.as_str())
            .take_while(|p| p.starts_with(&prefix))
            .filter(|p| p.len() > prefix.len() && !p[prefix.len()..].contains('/'))
            .collect()
    }

    fn nlink(&self, path: &str, node: &Node) -> u32 {
        match node.data {
            NodeData::File(_) => 1,
            NodeData::Dir => {
                let subdirs = self
                    .children(path)
                    .into_iter()
                    .filter(|c| {
                        self.paths
                            .get(*c)
                            .and_then(|ino| self.nodes.get(ino))
                            .is_some_and(Node::is_dir)
                    })
                    .count();
                2 + subdirs as u32
            }
        }
    }

    /// Remove the name at `path`. The node goes away too unless a handle
    /// still has it open.
    fn remove_path(&mut self, path: &str) {
        let Some(ino) = self.paths.remove(path) else {
            return;
        };
        if self.handles.values().any(|h| h.ino == ino) {
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.linked = false;
            }
        } else {
            self.nodes.remove(&ino);
        }
    }

    fn file_mut(&mut self, fh: FileHandle) -> Result<(&mut Vec<u8>, &mut SystemTime, bool)> {
        let Some(open) = self.handles.get(&fh) else {
            return make_error_msg(FsCode::BAD_HANDLE, format!("unknown handle {}", fh));
        };
        let writable = open.writable;
        match self.nodes.get_mut(&open.ino) {
            Some(Node {
                data: NodeData::File(contents),
                mtime,
                ..
            }) => Ok((contents, mtime, writable)),
            _ => make_error_msg(FsCode::BAD_HANDLE, format!("stale handle {}", fh)),
        }
    }

    fn used_bytes(&self) -> u64 {
        self.nodes
            .values()
            .map(|n| match &n.data {
                NodeData::File(contents) => contents.len() as u64,
                NodeData::Dir => 0,
            })
            .sum()
    }
}

/// End offset of `len` bytes at `offset`, if a file may grow that far.
fn file_end(capacity: u64, offset: u64, len: u64) -> Result<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => usize::try_from(end)
            .or_else(|_| make_error_msg(FsCode::NO_SPACE, format!("offset {} out of range", offset))),
        _ => make_error_msg(
            FsCode::NO_SPACE,
            format!("{} bytes at offset {} exceed capacity {}", len, offset, capacity),
        ),
    }
}

pub struct MemoryFs {
    state: Mutex<State>,
    capacity: u64,
    block_size: u32,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A store reporting `capacity` total bytes through `stat_fs`.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            state: Mutex::new(State::new()),
            capacity,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Seed a file, creating missing parent directories.
    pub fn insert_file(&self, file_path: &str, contents: impl Into<Vec<u8>>) -> Result<()> {
        let file_path = path::normalize(file_path)?;
        let mut state = self.state.lock();
        let mut dir = String::new();
        if let Some((parent, _)) = path::split(&file_path) {
            for part in parent.split('/').filter(|p| !p.is_empty()) {
                dir.push('/');
                dir.push_str(part);
                match state.is_dir(&dir) {
                    Some(true) => {}
                    Some(false) => return make_error_msg(FsCode::NOT_DIRECTORY, dir),
                    None => {
                        state.insert(dir.clone(), Node::dir());
                    }
                }
            }
        }
        match state.is_dir(&file_path) {
            Some(true) => return make_error_msg(FsCode::IS_DIRECTORY, file_path),
            Some(false) => state.remove_path(&file_path),
            None => {}
        }
        state.insert(file_path, Node::file(contents.into()));
        Ok(())
    }

    /// Number of open file handles.
    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    fn open_handle(state: &mut State, ino: u64, writable: bool) -> FileHandle {
        let fh = FileHandle(state.next_fh);
        state.next_fh += 1;
        state.handles.insert(fh, OpenFile { ino, writable });
        fh
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceFileService for MemoryFs {
    async fn get_attr(&self, req: GetAttrReq) -> Result<GetAttrRsp> {
        let path = path::normalize(&req.path)?;
        let state = self.state.lock();
        let (_, node) = state.lookup(&path)?;
        let info = match &node.data {
            NodeData::Dir => {
                afc_info::file_info(FileKind::Directory, 0, state.nlink(&path, node), node.mtime)
            }
            NodeData::File(contents) => afc_info::file_info(
                FileKind::Regular,
                contents.len() as u64,
                state.nlink(&path, node),
                node.mtime,
            ),
        };
        Ok(GetAttrRsp {
            stat: afc_info::stat_from_file_info(&info)?,
        })
    }

    async fn read_dir(&self, req: ReadDirReq) -> Result<ReadDirRsp> {
        let path = path::normalize(&req.path)?;
        let state = self.state.lock();
        let (_, node) = state.lookup(&path)?;
        if !node.is_dir() {
            return make_error_msg(FsCode::NOT_DIRECTORY, path);
        }
        let names = state
            .children(&path)
            .into_iter()
            .filter_map(|child| path::split(child).map(|(_, name)| name.to_string()));
        Ok(ReadDirRsp::from_names(names))
    }

    async fn unlink(&self, req: UnlinkReq) -> Result<UnlinkRsp> {
        let path = path::normalize(&req.path)?;
        if path == "/" {
            return make_error_msg(FsCode::NO_PERMISSION, "cannot remove /");
        }
        let mut state = self.state.lock();
        let (_, node) = state.lookup(&path)?;
        if node.is_dir() && !state.children(&path).is_empty() {
            return make_error_msg(FsCode::NOT_EMPTY, path);
        }
        state.remove_path(&path);
        tracing::debug!(path = %path, "removed");
        Ok(UnlinkRsp {})
    }

    async fn mkdir(&self, req: MkDirReq) -> Result<MkDirRsp> {
        let path = path::normalize(&req.path)?;
        let mut state = self.state.lock();
        if state.paths.contains_key(&path) {
            return make_error_msg(FsCode::EXISTS, path);
        }
        state.require_parent_dir(&path)?;
        state.insert(path, Node::dir());
        Ok(MkDirRsp {})
    }

    async fn rename(&self, req: RenameReq) -> Result<RenameRsp> {
        let src = path::normalize(&req.source_path)?;
        let dst = path::normalize(&req.destination_path)?;
        let mut state = self.state.lock();
        let src_is_dir = state.lookup(&src)?.1.is_dir();
        if src == dst {
            return Ok(RenameRsp {});
        }
        if src == "/" || path::is_within(&dst, &src) {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("cannot move {} into {}", src, dst),
            );
        }
        state.require_parent_dir(&dst)?;

        if let Some(dst_is_dir) = state.is_dir(&dst) {
            match (src_is_dir, dst_is_dir) {
                (false, true) => return make_error_msg(FsCode::IS_DIRECTORY, dst),
                (true, false) => return make_error_msg(FsCode::NOT_DIRECTORY, dst),
                (true, true) if !state.children(&dst).is_empty() => {
                    return make_error_msg(FsCode::NOT_EMPTY, dst)
                }
                _ => state.remove_path(&dst),
            }
        }

        let moved: Vec<String> = state
            .paths
            .range(src.clone()..)
            .map(|(p, _)| p.clone())
            .take_while(|p| p.starts_with(&src))
            .filter(|p| path::is_within(p, &src))
            .collect();
        for old in moved {
            if let Some(ino) = state.paths.remove(&old) {
                let new = format!("{}{}", dst, &old[src.len()..]);
                state.paths.insert(new, ino);
            }
        }
        tracing::debug!(from = %src, to = %dst, "renamed");
        Ok(RenameRsp {})
    }

    async fn open(&self, req: OpenReq) -> Result<OpenRsp> {
        let path = path::normalize(&req.path)?;
        let mut state = self.state.lock();
        let (ino, node) = state.lookup(&path)?;
        if node.is_dir() {
            return make_error_msg(FsCode::IS_DIRECTORY, path);
        }
        let writable = req.flags & libc::O_ACCMODE != libc::O_RDONLY;
        let filehandle = Self::open_handle(&mut state, ino, writable);
        Ok(OpenRsp { filehandle })
    }

    async fn create(&self, req: CreateReq) -> Result<CreateRsp> {
        let path = path::normalize(&req.path)?;
        let mut state = self.state.lock();
        state.require_parent_dir(&path)?;
        let existing = state.lookup(&path).ok().map(|(ino, node)| (ino, node.is_dir()));
        let ino = match existing {
            Some((_, true)) => return make_error_msg(FsCode::IS_DIRECTORY, path),
            Some((ino, false)) => {
                if let Some(node) = state.nodes.get_mut(&ino) {
                    node.data = NodeData::File(Vec::new());
                    node.mtime = SystemTime::now();
                }
                ino
            }
            None => state.insert(path, Node::file(Vec::new())),
        };
        let filehandle = Self::open_handle(&mut state, ino, true);
        Ok(CreateRsp { filehandle })
    }

    async fn release(&self, req: ReleaseReq) -> Result<ReleaseRsp> {
        let mut state = self.state.lock();
        let Some(open) = state.handles.remove(&req.filehandle) else {
            tracing::debug!(filehandle = %req.filehandle, "release of unknown handle");
            return Ok(ReleaseRsp {});
        };
        let orphaned = state.nodes.get(&open.ino).is_some_and(|n| !n.linked)
            && !state.handles.values().any(|h| h.ino == open.ino);
        if orphaned {
            state.nodes.remove(&open.ino);
        }
        Ok(ReleaseRsp {})
    }

    async fn read(&self, req: ReadReq) -> Result<ReadRsp> {
        crate::check_read_size(req.size)?;
        let mut state = self.state.lock();
        let (contents, _, _) = state.file_mut(req.filehandle)?;
        let start = req.offset as usize;
        if start >= contents.len() {
            return Ok(ReadRsp::default());
        }
        let end = std::cmp::min(start.saturating_add(req.size as usize), contents.len());
        Ok(ReadRsp {
            buffer: contents[start..end].to_vec(),
        })
    }

    async fn write(&self, req: WriteReq) -> Result<WriteRsp> {
        let mut state = self.state.lock();
        let (contents, mtime, writable) = state.file_mut(req.filehandle)?;
        if !writable {
            return make_error_msg(
                FsCode::NO_PERMISSION,
                format!("handle {} is read-only", req.filehandle),
            );
        }
        let end = file_end(self.capacity, req.offset, req.buffer.len() as u64)?;
        let start = end - req.buffer.len();
        if end > contents.len() {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(&req.buffer);
        *mtime = SystemTime::now();
        Ok(WriteRsp {
            size: req.buffer.len() as u32,
        })
    }

    async fn truncate(&self, req: TruncateReq) -> Result<TruncateRsp> {
        let path = path::normalize(&req.path)?;
        let mut state = self.state.lock();
        let (ino, _) = state.lookup(&path)?;
        match state.nodes.get_mut(&ino) {
            Some(Node {
                data: NodeData::File(contents),
                mtime,
                ..
            }) => {
                contents.resize(file_end(self.capacity, req.offset, 0)?, 0);
                *mtime = SystemTime::now();
                Ok(TruncateRsp {})
            }
            _ => make_error(FsCode::IS_DIRECTORY),
        }
    }

    async fn stat_fs(&self, _req: StatFsReq) -> Result<StatFsRsp> {
        let used = self.state.lock().used_bytes();
        let info = afc_info::device_info(
            MODEL,
            self.block_size,
            self.capacity,
            self.capacity.saturating_sub(used),
        );
        Ok(StatFsRsp {
            stat: afc_info::fs_stat_from_device_info(&info)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afcdisk_proto::RequestHeader;

    fn header() -> RequestHeader {
        RequestHeader::new("memory")
    }

    async fn names(fs: &MemoryFs, dir: &str) -> Vec<String> {
        fs.read_dir(ReadDirReq {
            header: header(),
            path: dir.into(),
        })
        .await
        .unwrap()
        .entries
        .into_iter()
        .map(|e| e.filename)
        .collect()
    }

    async fn mkdir(fs: &MemoryFs, dir: &str) -> Result<MkDirRsp> {
        fs.mkdir(MkDirReq {
            header: header(),
            path: dir.into(),
            mode: 0o755,
        })
        .await
    }

    #[tokio::test]
    async fn test_mkdir_rename_rmdir() {
        let fs = MemoryFs::new();
        mkdir(&fs, "/a").await.unwrap();
        assert_eq!(names(&fs, "/").await, vec!["a"]);

        fs.rename(RenameReq {
            header: header(),
            source_path: "/a".into(),
            destination_path: "/b".into(),
        })
        .await
        .unwrap();
        assert_eq!(names(&fs, "/").await, vec!["b"]);

        fs.unlink(UnlinkReq {
            header: header(),
            path: "/b".into(),
        })
        .await
        .unwrap();
        assert!(names(&fs, "/").await.is_empty());
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let fs = MemoryFs::new();
        let fh = fs
            .create(CreateReq {
                header: header(),
                path: "/hello.txt".into(),
                flags: libc::O_WRONLY | libc::O_CREAT,
                mode: 0o644,
            })
            .await
            .unwrap()
            .filehandle;

        let written = fs
            .write(WriteReq {
                header: header(),
                filehandle: fh,
                buffer: b"hello, world!".to_vec(),
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(written.size, 13);

        let rsp = fs
            .read(ReadReq {
                header: header(),
                filehandle: fh,
                size: 13,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(rsp.buffer, b"hello, world!");

        // Short read at the tail.
        let rsp = fs
            .read(ReadReq {
                header: header(),
                filehandle: fh,
                size: 100,
                offset: 7,
            })
            .await
            .unwrap();
        assert_eq!(rsp.buffer, b"world!");

        let attr = fs
            .get_attr(GetAttrReq {
                header: header(),
                path: "/hello.txt".into(),
            })
            .await
            .unwrap();
        assert_eq!(attr.stat.size, 13);
        assert_eq!(attr.stat.nlink, 1);
        assert_eq!(attr.stat.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);

        fs.release(ReleaseReq {
            header: header(),
            filehandle: fh,
        })
        .await
        .unwrap();
        assert_eq!(fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_read_too_large() {
        let fs = MemoryFs::new();
        fs.insert_file("/big", vec![0u8; 16]).unwrap();
        let fh = fs
            .open(OpenReq {
                header: header(),
                path: "/big".into(),
                flags: libc::O_RDONLY,
            })
            .await
            .unwrap()
            .filehandle;
        let err = fs
            .read(ReadReq {
                header: header(),
                filehandle: fh,
                size: crate::MAX_READ_SIZE + 1,
                offset: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::READ_TOO_LARGE);
        assert_eq!(err.message(), Some("Read request too large"));
    }

    #[tokio::test]
    async fn test_readonly_handle_rejects_write() {
        let fs = MemoryFs::new();
        fs.insert_file("/ro", b"x".to_vec()).unwrap();
        let fh = fs
            .open(OpenReq {
                header: header(),
                path: "/ro".into(),
                flags: libc::O_RDONLY,
            })
            .await
            .unwrap()
            .filehandle;
        let err = fs
            .write(WriteReq {
                header: header(),
                filehandle: fh,
                buffer: b"y".to_vec(),
                offset: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::NO_PERMISSION);
    }

    #[tokio::test]
    async fn test_error_codes() {
        let fs = MemoryFs::new();
        fs.insert_file("/DCIM/100APPLE/IMG_0001.JPG", b"jpeg".to_vec())
            .unwrap();

        let err = fs
            .get_attr(GetAttrReq {
                header: header(),
                path: "/missing".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::NOT_FOUND);

        assert_eq!(mkdir(&fs, "/DCIM").await.unwrap_err().code(), FsCode::EXISTS);
        assert_eq!(mkdir(&fs, "/x/y").await.unwrap_err().code(), FsCode::NOT_FOUND);

        let err = fs
            .unlink(UnlinkReq {
                header: header(),
                path: "/DCIM".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::NOT_EMPTY);

        let err = fs
            .read_dir(ReadDirReq {
                header: header(),
                path: "/DCIM/100APPLE/IMG_0001.JPG".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::NOT_DIRECTORY);
    }

    #[tokio::test]
    async fn test_rename_directory_moves_children() {
        let fs = MemoryFs::new();
        fs.insert_file("/a/b/c.txt", b"c".to_vec()).unwrap();
        fs.rename(RenameReq {
            header: header(),
            source_path: "/a".into(),
            destination_path: "/z".into(),
        })
        .await
        .unwrap();
        assert_eq!(names(&fs, "/z/b").await, vec!["c.txt"]);

        let err = fs
            .rename(RenameReq {
                header: header(),
                source_path: "/z".into(),
                destination_path: "/z/b/inner".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::INVALID_ARG);
    }

    #[tokio::test]
    async fn test_unlinked_file_readable_until_release() {
        let fs = MemoryFs::new();
        fs.insert_file("/tmp.bin", b"abc".to_vec()).unwrap();
        let fh = fs
            .open(OpenReq {
                header: header(),
                path: "/tmp.bin".into(),
                flags: libc::O_RDONLY,
            })
            .await
            .unwrap()
            .filehandle;
        fs.unlink(UnlinkReq {
            header: header(),
            path: "/tmp.bin".into(),
        })
        .await
        .unwrap();

        let rsp = fs
            .read(ReadReq {
                header: header(),
                filehandle: fh,
                size: 3,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(rsp.buffer, b"abc");

        fs.release(ReleaseReq {
            header: header(),
            filehandle: fh,
        })
        .await
        .unwrap();
        let err = fs
            .read(ReadReq {
                header: header(),
                filehandle: fh,
                size: 3,
                offset: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::BAD_HANDLE);
    }

    #[tokio::test]
    async fn test_truncate_and_stat_fs() {
        let fs = MemoryFs::with_capacity(1 << 20);
        fs.insert_file("/f", vec![1u8; 8192]).unwrap();
        fs.truncate(TruncateReq {
            header: header(),
            path: "/f".into(),
            offset: 4096,
        })
        .await
        .unwrap();

        let attr = fs
            .get_attr(GetAttrReq {
                header: header(),
                path: "/f".into(),
            })
            .await
            .unwrap();
        assert_eq!(attr.stat.size, 4096);
        assert_eq!(attr.stat.blocks, 8);

        let stat = fs.stat_fs(StatFsReq { header: header() }).await.unwrap().stat;
        assert_eq!(stat.bsize, 4096);
        assert_eq!(stat.blocks, 256);
        assert_eq!(stat.bfree, 255);
    }

    #[tokio::test]
    async fn test_write_past_capacity_rejected() {
        let fs = MemoryFs::with_capacity(1 << 20);
        let fh = fs
            .create(CreateReq {
                header: header(),
                path: "/f".into(),
                flags: libc::O_WRONLY | libc::O_CREAT,
                mode: 0o644,
            })
            .await
            .unwrap()
            .filehandle;

        for offset in [u64::MAX - 4, 1 << 40, (1 << 20) - 4] {
            let err = fs
                .write(WriteReq {
                    header: header(),
                    filehandle: fh,
                    buffer: b"hello, world!".to_vec(),
                    offset,
                })
                .await
                .unwrap_err();
            assert_eq!(err.code(), FsCode::NO_SPACE);
        }

        // Up to the last byte is fine.
        let written = fs
            .write(WriteReq {
                header: header(),
                filehandle: fh,
                buffer: b"hello, world!".to_vec(),
                offset: (1 << 20) - 13,
            })
            .await
            .unwrap();
        assert_eq!(written.size, 13);
    }

    #[tokio::test]
    async fn test_truncate_past_capacity_rejected() {
        let fs = MemoryFs::with_capacity(1 << 20);
        fs.insert_file("/f", vec![1u8; 16]).unwrap();
        for offset in [u64::MAX, (1 << 20) + 1] {
            let err = fs
                .truncate(TruncateReq {
                    header: header(),
                    path: "/f".into(),
                    offset,
                })
                .await
                .unwrap_err();
            assert_eq!(err.code(), FsCode::NO_SPACE);
        }

        let attr = fs
            .get_attr(GetAttrReq {
                header: header(),
                path: "/f".into(),
            })
            .await
            .unwrap();
        assert_eq!(attr.stat.size, 16);
    }

    #[tokio::test]
    async fn test_directory_nlink_counts_subdirs() {
        let fs = MemoryFs::new();
        mkdir(&fs, "/a").await.unwrap();
        mkdir(&fs, "/a/b").await.unwrap();
        mkdir(&fs, "/a/c").await.unwrap();
        fs.insert_file("/a/f", Vec::new()).unwrap();
        let attr = fs
            .get_attr(GetAttrReq {
                header: header(),
                path: "/a".into(),
            })
            .await
            .unwrap();
        assert_eq!(attr.stat.nlink, 4);
        assert_eq!(attr.stat.mode, libc::S_IFDIR as u32 | 0o755);
    }
}
