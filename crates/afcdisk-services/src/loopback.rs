//! Device file service serving a directory of the host.
//!
//! Device paths are resolved below a root directory; `..` never escapes it.
//! Open files live in a handle table keyed by [`FileHandle`].

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use afcdisk_proto::fs::{
    CreateReq, CreateRsp, GetAttrReq, GetAttrRsp, MkDirReq, MkDirRsp, OpenReq, OpenRsp,
    ReadDirReq, ReadDirRsp, ReadReq, ReadRsp, ReleaseReq, ReleaseRsp, RenameReq, RenameRsp,
    StatFsReq, StatFsRsp, TruncateReq, TruncateRsp, UnlinkReq, UnlinkRsp, WriteReq, WriteRsp,
};
use afcdisk_stubs::DeviceFileService;
use afcdisk_types::{make_error_msg, FileHandle, FsCode, Result, Status, StatusCode};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::afc_info::{self, FileKind};
use crate::path;

const MODEL: &str = "LoopbackFs";

/// Map an OS error onto the closest `FsCode`.
fn io_status(err: io::Error, path: &str) -> Status {
    let code = match err.raw_os_error() {
        Some(libc::ENOENT) => FsCode::NOT_FOUND,
        Some(libc::EEXIST) => FsCode::EXISTS,
        Some(libc::ENOTEMPTY) => FsCode::NOT_EMPTY,
        Some(libc::ENOTDIR) => FsCode::NOT_DIRECTORY,
        Some(libc::EISDIR) => FsCode::IS_DIRECTORY,
        Some(libc::EACCES) | Some(libc::EPERM) => FsCode::NO_PERMISSION,
        Some(libc::ENAMETOOLONG) => FsCode::NAME_TOO_LONG,
        _ => StatusCode::OS_ERROR,
    };
    Status::with_message(code, format!("{}: {}", path, err))
}

fn file_kind(file_type: fs::FileType) -> FileKind {
    if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_char_device() {
        FileKind::CharDevice
    } else if file_type.is_block_device() {
        FileKind::BlockDevice
    } else if file_type.is_fifo() {
        FileKind::Fifo
    } else if file_type.is_socket() {
        FileKind::Socket
    } else {
        FileKind::Regular
    }
}

pub struct LoopbackFs {
    root: PathBuf,
    handles: DashMap<FileHandle, Arc<File>>,
    next_fh: AtomicU64,
}

impl LoopbackFs {
    /// Serve `root`, which must be an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|e| io_status(e, &root.display().to_string()))?;
        if !meta.is_dir() {
            return make_error_msg(FsCode::NOT_DIRECTORY, root.display().to_string());
        }
        tracing::info!(root = %root.display(), "loopback fs ready");
        Ok(Self {
            root,
            handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, device_path: &str) -> Result<(String, PathBuf)> {
        let normalized = path::normalize(device_path)?;
        let host = self.root.join(normalized.trim_start_matches('/'));
        Ok((normalized, host))
    }

    fn file(&self, fh: FileHandle) -> Result<Arc<File>> {
        self.handles
            .get(&fh)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| Status::with_message(FsCode::BAD_HANDLE, format!("unknown handle {}", fh)))
    }

    fn register(&self, file: File) -> FileHandle {
        let fh = FileHandle(self.next_fh.fetch_add(1, Ordering::Relaxed));
        self.handles.insert(fh, Arc::new(file));
        fh
    }

    async fn open_with(&self, device_path: &str, options: OpenOptions) -> Result<FileHandle> {
        let (normalized, host) = self.resolve(device_path)?;
        let file = blocking(move || {
            if host.is_dir() {
                return make_error_msg(FsCode::IS_DIRECTORY, normalized);
            }
            options.open(&host).map_err(|e| io_status(e, &normalized))
        })
        .await?;
        Ok(self.register(file))
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

/// Run blocking file I/O on the runtime's blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Status::with_message(StatusCode::UNKNOWN, e.to_string()))?
}

#[async_trait]
impl DeviceFileService for LoopbackFs {
    async fn get_attr(&self, req: GetAttrReq) -> Result<GetAttrRsp> {
        let (normalized, host) = self.resolve(&req.path)?;
        let meta = blocking(move || fs::symlink_metadata(&host).map_err(|e| io_status(e, &normalized)))
            .await?;
        let kind = file_kind(meta.file_type());
        let nlink = meta.nlink() as u32;
        let mtime = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
        let info = afc_info::file_info(kind, meta.len(), nlink, mtime);
        Ok(GetAttrRsp {
            stat: afc_info::stat_from_file_info(&info)?,
        })
    }

    async fn read_dir(&self, req: ReadDirReq) -> Result<ReadDirRsp> {
        let (normalized, host) = self.resolve(&req.path)?;
        let names = blocking(move || {
            let entries = fs::read_dir(&host).map_err(|e| io_status(e, &normalized))?;
            let mut names = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| io_status(e, &normalized))?;
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            Ok(names)
        })
        .await?;
        Ok(ReadDirRsp::from_names(names))
    }

    async fn unlink(&self, req: UnlinkReq) -> Result<UnlinkRsp> {
        let (normalized, host) = self.resolve(&req.path)?;
        if normalized == "/" {
            return make_error_msg(FsCode::NO_PERMISSION, "cannot remove /");
        }
        blocking(move || {
            let meta = fs::symlink_metadata(&host).map_err(|e| io_status(e, &normalized))?;
            let removed = if meta.is_dir() {
                fs::remove_dir(&host)
            } else {
                fs::remove_file(&host)
            };
            removed.map_err(|e| io_status(e, &normalized))
        })
        .await?;
        Ok(UnlinkRsp {})
    }

    async fn mkdir(&self, req: MkDirReq) -> Result<MkDirRsp> {
        let (normalized, host) = self.resolve(&req.path)?;
        blocking(move || fs::create_dir(&host).map_err(|e| io_status(e, &normalized))).await?;
        Ok(MkDirRsp {})
    }

    async fn rename(&self, req: RenameReq) -> Result<RenameRsp> {
        let (src, src_host) = self.resolve(&req.source_path)?;
        let (_, dst_host) = self.resolve(&req.destination_path)?;
        blocking(move || fs::rename(&src_host, &dst_host).map_err(|e| io_status(e, &src))).await?;
        Ok(RenameRsp {})
    }

    async fn open(&self, req: OpenReq) -> Result<OpenRsp> {
        let mut options = OpenOptions::new();
        match req.flags & libc::O_ACCMODE {
            libc::O_WRONLY => options.write(true),
            libc::O_RDWR => options.read(true).write(true),
            _ => options.read(true),
        };
        let filehandle = self.open_with(&req.path, options).await?;
        Ok(OpenRsp { filehandle })
    }

    async fn create(&self, req: CreateReq) -> Result<CreateRsp> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(true);
        let filehandle = self.open_with(&req.path, options).await?;
        Ok(CreateRsp { filehandle })
    }

    async fn release(&self, req: ReleaseReq) -> Result<ReleaseRsp> {
        if self.handles.remove(&req.filehandle).is_none() {
            tracing::debug!(filehandle = %req.filehandle, "release of unknown handle");
        }
        Ok(ReleaseRsp {})
    }

    async fn read(&self, req: ReadReq) -> Result<ReadRsp> {
        crate::check_read_size(req.size)?;
        let file = self.file(req.filehandle)?;
        let buffer = blocking(move || {
            let mut buffer = vec![0u8; req.size as usize];
            let mut filled = 0;
            while filled < buffer.len() {
                match file.read_at(&mut buffer[filled..], req.offset + filled as u64) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(io_status(e, &format!("handle {}", req.filehandle))),
                }
            }
            buffer.truncate(filled);
            Ok(buffer)
        })
        .await?;
        Ok(ReadRsp { buffer })
    }

    async fn write(&self, req: WriteReq) -> Result<WriteRsp> {
        let file = self.file(req.filehandle)?;
        let size = req.buffer.len() as u32;
        blocking(move || {
            file.write_all_at(&req.buffer, req.offset)
                .map_err(|e| io_status(e, &format!("handle {}", req.filehandle)))
        })
        .await?;
        Ok(WriteRsp { size })
    }

    async fn truncate(&self, req: TruncateReq) -> Result<TruncateRsp> {
        let (normalized, host) = self.resolve(&req.path)?;
        blocking(move || {
            let file = OpenOptions::new()
                .write(true)
                .open(&host)
                .map_err(|e| io_status(e, &normalized))?;
            file.set_len(req.offset).map_err(|e| io_status(e, &normalized))
        })
        .await?;
        Ok(TruncateRsp {})
    }

    async fn stat_fs(&self, _req: StatFsReq) -> Result<StatFsRsp> {
        let c_root = std::ffi::CString::new(self.root.as_os_str().as_bytes())
            .map_err(|e| Status::with_message(StatusCode::INVALID_ARG, e.to_string()))?;
        let vfs = blocking(move || {
            let mut vfs: libc::statvfs = unsafe { std::mem::zeroed() };
            // SAFETY: `c_root` is a valid NUL-terminated path and `vfs` is a
            // properly sized out-parameter.
            let rc = unsafe { libc::statvfs(c_root.as_ptr(), &mut vfs) };
            if rc != 0 {
                return Err(io_status(io::Error::last_os_error(), "/"));
            }
            Ok(vfs)
        })
        .await?;
        let frsize = vfs.f_frsize as u64;
        let info = afc_info::device_info(
            MODEL,
            frsize as u32,
            vfs.f_blocks as u64 * frsize,
            vfs.f_bavail as u64 * frsize,
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
        RequestHeader::new("loopback")
    }

    fn setup() -> (tempfile::TempDir, LoopbackFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = LoopbackFs::new(dir.path()).unwrap();
        (dir, fs)
    }

    #[tokio::test]
    async fn test_create_write_read() {
        let (dir, fs) = setup();
        let fh = fs
            .create(CreateReq {
                header: header(),
                path: "/note.txt".into(),
                flags: libc::O_RDWR | libc::O_CREAT,
                mode: 0o644,
            })
            .await
            .unwrap()
            .filehandle;
        let rsp = fs
            .write(WriteReq {
                header: header(),
                filehandle: fh,
                buffer: b"hello, world!".to_vec(),
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(rsp.size, 13);

        let rsp = fs
            .read(ReadReq {
                header: header(),
                filehandle: fh,
                size: 64,
                offset: 7,
            })
            .await
            .unwrap();
        assert_eq!(rsp.buffer, b"world!");

        fs.release(ReleaseReq {
            header: header(),
            filehandle: fh,
        })
        .await
        .unwrap();
        assert_eq!(fs.open_handles(), 0);
        assert_eq!(
            std::fs::read(dir.path().join("note.txt")).unwrap(),
            b"hello, world!"
        );
    }

    #[tokio::test]
    async fn test_read_size_cap() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("a"), b"a").unwrap();
        let fh = fs
            .open(OpenReq {
                header: header(),
                path: "/a".into(),
                flags: libc::O_RDONLY,
            })
            .await
            .unwrap()
            .filehandle;
        let err = fs
            .read(ReadReq {
                header: header(),
                filehandle: fh,
                size: 2 * 1024 * 1024,
                offset: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::READ_TOO_LARGE);
        assert_eq!(err.message(), Some("Read request too large"));
    }

    #[tokio::test]
    async fn test_dir_ops_and_attrs() {
        let (dir, fs) = setup();
        fs.mkdir(MkDirReq {
            header: header(),
            path: "/a".into(),
            mode: 0o755,
        })
        .await
        .unwrap();
        std::fs::write(dir.path().join("a/f"), b"12345").unwrap();

        let attr = fs
            .get_attr(GetAttrReq {
                header: header(),
                path: "/a".into(),
            })
            .await
            .unwrap();
        assert_eq!(attr.stat.mode, libc::S_IFDIR as u32 | 0o755);

        let attr = fs
            .get_attr(GetAttrReq {
                header: header(),
                path: "/a/f".into(),
            })
            .await
            .unwrap();
        assert_eq!(attr.stat.size, 5);
        assert_eq!(attr.stat.mode, libc::S_IFREG as u32 | 0o644);
        assert!(attr.stat.mtime.is_some());

        let err = fs
            .unlink(UnlinkReq {
                header: header(),
                path: "/a".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::NOT_EMPTY);

        fs.rename(RenameReq {
            header: header(),
            source_path: "/a".into(),
            destination_path: "/b".into(),
        })
        .await
        .unwrap();
        let listing = fs
            .read_dir(ReadDirReq {
                header: header(),
                path: "/".into(),
            })
            .await
            .unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].filename, "b");
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_root() {
        let (_dir, fs) = setup();
        let err = fs
            .get_attr(GetAttrReq {
                header: header(),
                path: "/../etc/passwd".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::NO_PERMISSION);
    }

    #[tokio::test]
    async fn test_truncate_and_statfs() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("t"), vec![7u8; 100]).unwrap();
        fs.truncate(TruncateReq {
            header: header(),
            path: "/t".into(),
            offset: 10,
        })
        .await
        .unwrap();
        assert_eq!(std::fs::metadata(dir.path().join("t")).unwrap().len(), 10);

        let stat = fs.stat_fs(StatFsReq { header: header() }).await.unwrap().stat;
        assert!(stat.bsize > 0);
        assert!(stat.blocks >= stat.bfree);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_io_on_single_thread() {
        let (dir, fs) = setup();
        let mut handles = Vec::new();
        for name in ["/x", "/y"] {
            let fh = fs
                .create(CreateReq {
                    header: header(),
                    path: name.into(),
                    flags: libc::O_RDWR | libc::O_CREAT,
                    mode: 0o644,
                })
                .await
                .unwrap()
                .filehandle;
            handles.push(fh);
        }

        let write = |fh, byte: u8| {
            fs.write(WriteReq {
                header: header(),
                filehandle: fh,
                buffer: vec![byte; 4096],
                offset: 0,
            })
        };
        let (x, y, stat) = tokio::join!(
            write(handles[0], b'x'),
            write(handles[1], b'y'),
            fs.stat_fs(StatFsReq { header: header() }),
        );
        assert_eq!(x.unwrap().size, 4096);
        assert_eq!(y.unwrap().size, 4096);
        assert!(stat.unwrap().stat.bsize > 0);
        assert_eq!(std::fs::read(dir.path().join("x")).unwrap(), vec![b'x'; 4096]);
        assert_eq!(std::fs::read(dir.path().join("y")).unwrap(), vec![b'y'; 4096]);

        let err = fs
            .read(ReadReq {
                header: header(),
                filehandle: FileHandle(999),
                size: 1,
                offset: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), FsCode::BAD_HANDLE);
    }

    #[test]
    fn test_missing_root() {
        let err = match LoopbackFs::new("/definitely/not/here") {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.code(), FsCode::NOT_FOUND);
    }
}
