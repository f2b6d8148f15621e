//! Forwarding of driver callbacks to a [`DeviceFileService`].
//!
//! Every callback builds a request carrying the mount's `fs_id`, blocks on
//! the service call with a fresh [`RpcCall`] and copies the response into
//! the reply. Backend failures become an errno according to the
//! configured [`ErrorPolicy`](crate::ErrorPolicy).

use std::future::Future;
use std::sync::Arc;

use afcdisk_net::RpcCall;
use afcdisk_proto::fs::{
    CreateReq, GetAttrReq, MkDirReq, OpenReq, ReadDirReq, ReadReq, ReleaseReq, RenameReq, Stat,
    StatFsReq, TruncateReq, UnlinkReq, WriteReq,
};
use afcdisk_proto::RequestHeader;
use afcdisk_stubs::DeviceFileService;
use afcdisk_types::{FileHandle, FsCode, FsId, Result};
use tokio::runtime::Handle;

use crate::config::FuseConfig;
use crate::ops::FsOps;
use crate::reply::*;
use crate::types::{FileAttr, StatFs, NAME_MAX, S_IFDIR, S_IFMT};

// Fixed inode figures reported by statfs; devices do not expose them.
const STATFS_FILES: u64 = 110_000;
const STATFS_FFREE: u64 = 100_000;

/// Everything a callback needs, shared read-only by the whole session.
pub struct MountContext {
    service: Arc<dyn DeviceFileService>,
    fs_id: FsId,
    runtime: Handle,
    config: FuseConfig,
}

impl MountContext {
    /// `runtime` drives the service futures. Callbacks block on it from the
    /// loop thread, so it must not be the thread's own runtime.
    pub fn new(
        service: Arc<dyn DeviceFileService>,
        fs_id: impl Into<FsId>,
        runtime: Handle,
        config: FuseConfig,
    ) -> Self {
        Self {
            service,
            fs_id: fs_id.into(),
            runtime,
            config,
        }
    }

    pub fn fs_id(&self) -> &FsId {
        &self.fs_id
    }

    pub fn config(&self) -> &FuseConfig {
        &self.config
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn service(&self) -> &Arc<dyn DeviceFileService> {
        &self.service
    }

    fn header(&self) -> RequestHeader {
        RequestHeader::new(self.fs_id.clone())
    }

    /// Run one service call to completion and translate its outcome.
    fn call<T, F>(&self, op: &'static str, path: &str, fut: F) -> FuseResult<T>
    where
        F: Future<Output = Result<T>>,
    {
        let mut call = RpcCall::new();
        if let Some(value) = call.record(self.runtime.block_on(fut)) {
            return Ok(value);
        }
        let errno = match call.status() {
            Some(status) => {
                if status.code() == FsCode::NOT_FOUND {
                    tracing::trace!(op, path, fs_id = %self.fs_id, "{}", status);
                } else {
                    tracing::warn!(op, path, fs_id = %self.fs_id, "{}", status);
                }
                self.config.error_policy.errno(status)
            }
            None => libc::EIO,
        };
        Err(errno)
    }
}

/// Converts a backend [`Stat`] into driver attributes.
///
/// A zero link count means the backend did not report one: directories
/// get 2, everything else 1.
pub fn file_attr_from_stat(stat: &Stat) -> FileAttr {
    let nlink = match stat.nlink {
        0 if stat.mode & S_IFMT == S_IFDIR => 2,
        0 => 1,
        n => n,
    };
    FileAttr {
        size: stat.size,
        blocks: stat.blocks,
        mode: stat.mode,
        nlink,
        mtime: stat
            .mtime
            .map(|t| t.to_system_time())
            .unwrap_or(std::time::UNIX_EPOCH),
    }
}

/// The [`FsOps`] table of a mount: every callback goes to the service held
/// by its [`MountContext`].
#[derive(Clone)]
pub struct ServiceDispatch {
    ctx: Arc<MountContext>,
}

impl ServiceDispatch {
    pub fn new(ctx: Arc<MountContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<MountContext> {
        &self.ctx
    }
}

impl FsOps for ServiceDispatch {
    fn init(&self) {
        tracing::info!(fs_id = %self.ctx.fs_id, "filesystem init");
    }

    fn destroy(&self) {
        tracing::info!(fs_id = %self.ctx.fs_id, "filesystem destroy");
    }

    fn getattr(&self, path: &str) -> FuseResult<ReplyAttr> {
        let svc = &self.ctx.service;
        let req = GetAttrReq {
            header: self.ctx.header(),
            path: path.to_string(),
        };
        let rsp = self.ctx.call("getattr", path, svc.get_attr(req))?;
        Ok(ReplyAttr {
            attr: file_attr_from_stat(&rsp.stat),
            attr_timeout: self.ctx.config.attr_timeout(),
        })
    }

    // Devices carry no ownership, modes or settable times.
    fn chown(&self, _path: &str, _uid: Option<u32>, _gid: Option<u32>) -> FuseResult<()> {
        Ok(())
    }

    fn chmod(&self, _path: &str, _mode: u32) -> FuseResult<()> {
        Ok(())
    }

    fn utimens(&self, _path: &str) -> FuseResult<()> {
        Ok(())
    }

    fn truncate(&self, path: &str, size: u64) -> FuseResult<()> {
        let req = TruncateReq {
            header: self.ctx.header(),
            path: path.to_string(),
            offset: size,
        };
        self.ctx
            .call("truncate", path, self.ctx.service.truncate(req))
            .map(drop)
    }

    fn readdir(&self, path: &str) -> FuseResult<ReplyDirectory> {
        let req = ReadDirReq {
            header: self.ctx.header(),
            path: path.to_string(),
        };
        let rsp = self
            .ctx
            .call("readdir", path, self.ctx.service.read_dir(req))?;
        Ok(ReplyDirectory {
            entries: rsp.entries.into_iter().map(|e| e.filename).collect(),
        })
    }

    fn mkdir(&self, path: &str, mode: u32) -> FuseResult<()> {
        let req = MkDirReq {
            header: self.ctx.header(),
            path: path.to_string(),
            mode,
        };
        self.ctx
            .call("mkdir", path, self.ctx.service.mkdir(req))
            .map(drop)
    }

    /// The service has no separate rmdir; Unlink removes empty directories.
    fn rmdir(&self, path: &str) -> FuseResult<()> {
        let req = UnlinkReq {
            header: self.ctx.header(),
            path: path.to_string(),
        };
        self.ctx
            .call("rmdir", path, self.ctx.service.unlink(req))
            .map(drop)
    }

    fn unlink(&self, path: &str) -> FuseResult<()> {
        let req = UnlinkReq {
            header: self.ctx.header(),
            path: path.to_string(),
        };
        self.ctx
            .call("unlink", path, self.ctx.service.unlink(req))
            .map(drop)
    }

    fn rename(&self, from: &str, to: &str) -> FuseResult<()> {
        let req = RenameReq {
            header: self.ctx.header(),
            source_path: from.to_string(),
            destination_path: to.to_string(),
        };
        self.ctx
            .call("rename", from, self.ctx.service.rename(req))
            .map(drop)
    }

    fn open(&self, path: &str, flags: i32) -> FuseResult<ReplyOpen> {
        let req = OpenReq {
            header: self.ctx.header(),
            path: path.to_string(),
            flags,
        };
        let rsp = self.ctx.call("open", path, self.ctx.service.open(req))?;
        Ok(ReplyOpen {
            fh: rsp.filehandle.0,
        })
    }

    fn create(&self, path: &str, mode: u32, flags: i32) -> FuseResult<ReplyOpen> {
        let req = CreateReq {
            header: self.ctx.header(),
            path: path.to_string(),
            flags,
            mode,
        };
        let rsp = self
            .ctx
            .call("create", path, self.ctx.service.create(req))?;
        Ok(ReplyOpen {
            fh: rsp.filehandle.0,
        })
    }

    fn read(&self, path: &str, fh: u64, size: u32, offset: u64) -> FuseResult<ReplyData> {
        let req = ReadReq {
            header: self.ctx.header(),
            filehandle: FileHandle(fh),
            size,
            offset,
        };
        let rsp = self.ctx.call("read", path, self.ctx.service.read(req))?;
        Ok(ReplyData { data: rsp.buffer })
    }

    fn write(&self, path: &str, fh: u64, data: &[u8], offset: u64) -> FuseResult<ReplyWrite> {
        let req = WriteReq {
            header: self.ctx.header(),
            filehandle: FileHandle(fh),
            buffer: data.to_vec(),
            offset,
        };
        let rsp = self.ctx.call("write", path, self.ctx.service.write(req))?;
        Ok(ReplyWrite { written: rsp.size })
    }

    fn release(&self, path: &str, fh: u64) -> FuseResult<()> {
        let req = ReleaseReq {
            header: self.ctx.header(),
            filehandle: FileHandle(fh),
        };
        self.ctx
            .call("release", path, self.ctx.service.release(req))
            .map(drop)
    }

    fn statfs(&self, path: &str) -> FuseResult<ReplyStatFs> {
        let req = StatFsReq {
            header: self.ctx.header(),
        };
        let rsp = self
            .ctx
            .call("statfs", path, self.ctx.service.stat_fs(req))?;
        let s = rsp.stat;
        Ok(ReplyStatFs {
            stat: StatFs {
                bsize: s.bsize,
                frsize: s.frsize,
                blocks: s.blocks,
                bfree: s.bfree,
                bavail: s.bfree,
                files: STATFS_FILES,
                ffree: STATFS_FFREE,
                namelen: NAME_MAX,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorPolicy;
    use crate::types::S_IFREG;
    use afcdisk_proto::common::Timespec;
    use afcdisk_proto::fs::{FsStat, GetAttrRsp, StatFsRsp};
    use afcdisk_services::MemoryFs;
    use afcdisk_stubs::MockDeviceFileService;
    use afcdisk_types::{make_error, Status};
    use parking_lot::Mutex;
    use tokio::runtime::Runtime;

    fn dispatch(rt: &Runtime, service: Arc<dyn DeviceFileService>) -> ServiceDispatch {
        dispatch_with(rt, service, FuseConfig::default())
    }

    fn dispatch_with(
        rt: &Runtime,
        service: Arc<dyn DeviceFileService>,
        config: FuseConfig,
    ) -> ServiceDispatch {
        ServiceDispatch::new(Arc::new(MountContext::new(
            service,
            "mobile-fs",
            rt.handle().clone(),
            config,
        )))
    }

    fn stat_rsp(mode: u32, nlink: u32) -> GetAttrRsp {
        GetAttrRsp {
            stat: Stat {
                size: 102,
                blocks: 1,
                mode,
                nlink,
                mtime: Some(Timespec {
                    tv_sec: 1_200_000_000,
                    tv_nsec: 0,
                }),
            },
        }
    }

    #[test]
    fn test_write_then_read() {
        let rt = Runtime::new().unwrap();
        let ops = dispatch(&rt, Arc::new(MemoryFs::new()));

        let fh = ops
            .create("/hello.txt", S_IFREG | 0o644, libc::O_RDWR)
            .unwrap()
            .fh;
        let written = ops.write("/hello.txt", fh, b"hello, world!", 0).unwrap();
        assert_eq!(written.written, 13);

        let data = ops.read("/hello.txt", fh, 13, 0).unwrap();
        assert_eq!(data.data, b"hello, world!");
        ops.release("/hello.txt", fh).unwrap();

        let attr = ops.getattr("/hello.txt").unwrap().attr;
        assert_eq!(attr.size, 13);
    }

    #[test]
    fn test_short_read_passes_through() {
        let rt = Runtime::new().unwrap();
        let fs = Arc::new(MemoryFs::new());
        fs.insert_file("/short", "abc").unwrap();
        let ops = dispatch(&rt, fs);

        let fh = ops.open("/short", libc::O_RDONLY).unwrap().fh;
        assert_eq!(ops.read("/short", fh, 4096, 1).unwrap().data, b"bc");
        ops.release("/short", fh).unwrap();
    }

    #[test]
    fn test_getattr_nlink_synthesis() {
        let rt = Runtime::new().unwrap();
        let mock = MockDeviceFileService::new();
        mock.on_get_attr(|req| {
            Ok(match req.path.as_str() {
                "/dir" => stat_rsp(S_IFDIR | 0o755, 0),
                "/file" => stat_rsp(S_IFREG | 0o644, 0),
                _ => stat_rsp(S_IFREG | 0o644, 3),
            })
        });
        let ops = dispatch(&rt, mock.into_arc());

        let dir = ops.getattr("/dir").unwrap().attr;
        assert!(dir.is_dir());
        assert_eq!(dir.nlink, 2);
        assert_eq!(dir.size, 102);
        assert_eq!(dir.blocks, 1);

        let file = ops.getattr("/file").unwrap().attr;
        assert_eq!(file.file_type(), S_IFREG);
        assert_eq!(file.nlink, 1);

        let linked = ops.getattr("/linked").unwrap().attr;
        assert_eq!(linked.nlink, 3);
        assert_eq!(
            linked.mtime,
            std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_200_000_000)
        );
    }

    #[test]
    fn test_failures_collapse_to_enoent() {
        let rt = Runtime::new().unwrap();
        let mock = MockDeviceFileService::new();
        mock.on_mkdir(|_| make_error(FsCode::EXISTS));
        mock.on_read(|_| make_error(afcdisk_types::RPCCode::SOCKET_CLOSED));
        mock.on_stat_fs(|_| make_error(FsCode::DEVICE_GONE));
        let ops = dispatch(&rt, mock.into_arc());

        assert_eq!(ops.mkdir("/a", 0o755).unwrap_err(), libc::ENOENT);
        assert_eq!(ops.read("/a", 1, 10, 0).unwrap_err(), libc::ENOENT);
        assert_eq!(ops.statfs("/").unwrap_err(), libc::ENOENT);
    }

    #[test]
    fn test_errno_policy() {
        let rt = Runtime::new().unwrap();
        let mock = MockDeviceFileService::new();
        mock.on_mkdir(|_| make_error(FsCode::EXISTS));
        mock.on_unlink(|_| make_error(FsCode::NOT_EMPTY));
        let config = FuseConfig {
            error_policy: ErrorPolicy::Errno,
            ..Default::default()
        };
        let ops = dispatch_with(&rt, mock.into_arc(), config);

        assert_eq!(ops.mkdir("/a", 0o755).unwrap_err(), libc::EEXIST);
        assert_eq!(ops.rmdir("/a").unwrap_err(), libc::ENOTEMPTY);
    }

    #[test]
    fn test_requests_carry_fs_id() {
        let rt = Runtime::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::<(String, String)>::new()));
        let mock = MockDeviceFileService::new();
        let log = seen.clone();
        mock.on_unlink(move |req| {
            log.lock().push((req.header.fs_id.to_string(), req.path));
            Ok(Default::default())
        });
        let ops = dispatch(&rt, mock.into_arc());

        ops.rmdir("/b").unwrap();
        ops.unlink("/c").unwrap();
        assert_eq!(
            *seen.lock(),
            vec![
                ("mobile-fs".to_string(), "/b".to_string()),
                ("mobile-fs".to_string(), "/c".to_string()),
            ]
        );
    }

    #[test]
    fn test_statfs_constants() {
        let rt = Runtime::new().unwrap();
        let mock = MockDeviceFileService::new();
        mock.on_stat_fs(|_| {
            Ok(StatFsRsp {
                stat: FsStat {
                    bsize: 4096,
                    frsize: 4096,
                    blocks: 1000,
                    bfree: 250,
                },
            })
        });
        let ops = dispatch(&rt, mock.into_arc());

        let stat = ops.statfs("/").unwrap().stat;
        assert_eq!(stat.bsize, 4096);
        assert_eq!(stat.blocks, 1000);
        assert_eq!(stat.bavail, 250);
        assert_eq!(stat.files, 110_000);
        assert_eq!(stat.ffree, 100_000);
        assert_eq!(stat.namelen, 255);
    }

    #[test]
    fn test_metadata_setters_succeed() {
        let rt = Runtime::new().unwrap();
        let mock = MockDeviceFileService::new();
        mock.on_get_attr(|_| Err(Status::new(FsCode::NOT_FOUND)));
        let ops = dispatch(&rt, mock.into_arc());

        assert!(ops.chown("/x", Some(0), None).is_ok());
        assert!(ops.chmod("/x", 0o600).is_ok());
        assert!(ops.utimens("/x").is_ok());
        assert_eq!(ops.getattr("/x").unwrap_err(), libc::ENOENT);
    }
}
