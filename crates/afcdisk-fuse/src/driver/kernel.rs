//! Kernel driver backed by the `fuser` crate.
//!
//! Kernel requests arrive as inode numbers; [`FuseBridge`] resolves them
//! to paths through an [`InodeTable`] and forwards to the bound [`FsOps`].

use std::ffi::OsStr;
use std::io;
use std::os::raw::c_int;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use fuser::{
    FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    SessionUnmounter, TimeOrNow,
};
use parking_lot::Mutex;

use super::{DriverLoop, LoopExit, MountArg, MountChannel, MountDriver};
use crate::inode::InodeTable;
use crate::ops::FsOps;
use crate::types::{FileAttr, ROOT_INO, S_IFDIR, S_IFLNK, S_IFMT};

const BLKSIZE: u32 = 4096;

/// Mounts through `/dev/fuse` (or macFUSE).
#[derive(Debug, Default, Clone, Copy)]
pub struct FuserDriver;

impl MountDriver for FuserDriver {
    fn mount(&self, path: &Path, args: &[MountArg]) -> io::Result<Box<dyn MountChannel>> {
        // The mount directory was just created by us; its owner is reported
        // for every entry.
        let meta = std::fs::metadata(path)?;
        let ops = Arc::new(OnceLock::new());
        let bridge = FuseBridge {
            ops: ops.clone(),
            inodes: InodeTable::new(),
            uid: meta.uid(),
            gid: meta.gid(),
        };
        let options = mount_options(args);
        tracing::debug!(path = %path.display(), ?options, "registering fuse mount");
        let mut session = fuser::Session::new(bridge, path, &options)?;
        let exit = Arc::new(UnmountExit {
            unmounter: Mutex::new(Some(session.unmount_callable())),
        });
        Ok(Box::new(FuserChannel {
            path: path.to_path_buf(),
            session: Some(session),
            ops,
            exit,
        }))
    }
}

/// Translate the argument list. Arguments only macFUSE understands are
/// passed verbatim there and dropped elsewhere.
fn mount_options(args: &[MountArg]) -> Vec<MountOption> {
    let mut options = vec![MountOption::Subtype("afcdisk".to_string())];
    for arg in args {
        match arg {
            MountArg::FsName(name) => options.push(MountOption::FSName(name.clone())),
            MountArg::AllowOther => options.push(MountOption::AllowOther),
            MountArg::AutoUnmount => options.push(MountOption::AutoUnmount),
            MountArg::Debug
            | MountArg::DeferPermissions
            | MountArg::VolName(_)
            | MountArg::VolIcon(_) => {
                if cfg!(target_os = "macos") {
                    options.push(MountOption::CUSTOM(arg.as_option_string()));
                }
            }
        }
    }
    options
}

struct UnmountExit {
    unmounter: Mutex<Option<SessionUnmounter>>,
}

impl LoopExit for UnmountExit {
    fn exit(&self) {
        let Some(mut unmounter) = self.unmounter.lock().take() else {
            return;
        };
        if let Err(e) = unmounter.unmount() {
            tracing::debug!(error = %e, "unmount after exit");
        }
    }
}

struct FuserChannel {
    path: PathBuf,
    session: Option<fuser::Session<FuseBridge>>,
    ops: Arc<OnceLock<Arc<dyn FsOps>>>,
    exit: Arc<UnmountExit>,
}

impl MountChannel for FuserChannel {
    fn exit_handle(&self) -> Arc<dyn LoopExit> {
        self.exit.clone()
    }

    fn bind(&mut self, ops: Box<dyn FsOps>) -> io::Result<Box<dyn DriverLoop>> {
        let Some(session) = self.session.take() else {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "channel already bound",
            ));
        };
        if self.ops.set(Arc::from(ops)).is_err() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "dispatch table already set",
            ));
        }
        Ok(Box::new(FuserLoop { session }))
    }

    fn unregister(&mut self) {
        tracing::debug!(path = %self.path.display(), "unregistering fuse mount");
        self.exit.exit();
        self.session.take();
    }
}

struct FuserLoop {
    session: fuser::Session<FuseBridge>,
}

impl DriverLoop for FuserLoop {
    fn run(&mut self) -> io::Result<()> {
        self.session.run()
    }
}

// ── Bridge ──────────────────────────────────────────────────────────────────

struct FuseBridge {
    ops: Arc<OnceLock<Arc<dyn FsOps>>>,
    inodes: InodeTable,
    uid: u32,
    gid: u32,
}

fn file_type(mode: u32) -> FileType {
    match mode & S_IFMT {
        S_IFDIR => FileType::Directory,
        S_IFLNK => FileType::Symlink,
        m if m == libc::S_IFCHR as u32 => FileType::CharDevice,
        m if m == libc::S_IFBLK as u32 => FileType::BlockDevice,
        m if m == libc::S_IFIFO as u32 => FileType::NamedPipe,
        m if m == libc::S_IFSOCK as u32 => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

impl FuseBridge {
    fn to_fuser_attr(&self, ino: u64, attr: &FileAttr) -> fuser::FileAttr {
        fuser::FileAttr {
            ino,
            size: attr.size,
            blocks: attr.blocks,
            atime: attr.mtime,
            mtime: attr.mtime,
            ctime: attr.mtime,
            crtime: attr.mtime,
            kind: file_type(attr.mode),
            perm: attr.permissions(),
            nlink: attr.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLKSIZE,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.inodes.path(ino).map(str::to_string).ok_or(libc::ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let name = name.to_str().ok_or(libc::ENOENT)?;
        self.inodes.child_path(parent, name).ok_or(libc::ENOENT)
    }

    /// Stat `path` and give it an inode number.
    fn entry(&mut self, ops: &dyn FsOps, path: &str) -> Result<(Duration, fuser::FileAttr), c_int> {
        let reply = ops.getattr(path)?;
        let ino = self.inodes.get_or_insert(path);
        Ok((reply.attr_timeout, self.to_fuser_attr(ino, &reply.attr)))
    }
}

/// Fetch the bound dispatch table or fail the request with `EIO`.
macro_rules! bound_ops {
    ($self:ident, $reply:ident) => {
        match $self.ops.get() {
            Some(ops) => ops.clone(),
            None => {
                $reply.error(libc::EIO);
                return;
            }
        }
    };
}

impl Filesystem for FuseBridge {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        if let Some(ops) = self.ops.get() {
            ops.init();
        }
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(ops) = self.ops.get() {
            ops.destroy();
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let ops = bound_ops!(self, reply);
        let result = self
            .child_of(parent, name)
            .and_then(|path| self.entry(ops.as_ref(), &path));
        match result {
            Ok((ttl, attr)) => reply.entry(&ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let ops = bound_ops!(self, reply);
        let result = self.path_of(ino).and_then(|path| ops.getattr(&path));
        match result {
            Ok(r) => reply.attr(&r.attr_timeout, &self.to_fuser_attr(ino, &r.attr)),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let ops = bound_ops!(self, reply);
        let result = self.path_of(ino).and_then(|path| {
            if let Some(mode) = mode {
                ops.chmod(&path, mode)?;
            }
            if uid.is_some() || gid.is_some() {
                ops.chown(&path, uid, gid)?;
            }
            if let Some(size) = size {
                ops.truncate(&path, size)?;
            }
            if atime.is_some() || mtime.is_some() {
                ops.utimens(&path)?;
            }
            ops.getattr(&path)
        });
        match result {
            Ok(r) => reply.attr(&r.attr_timeout, &self.to_fuser_attr(ino, &r.attr)),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let ops = bound_ops!(self, reply);
        let result = self.child_of(parent, name).and_then(|path| {
            ops.mkdir(&path, mode)?;
            self.entry(ops.as_ref(), &path)
        });
        match result {
            Ok((ttl, attr)) => reply.entry(&ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let ops = bound_ops!(self, reply);
        let result = self.child_of(parent, name).and_then(|path| {
            ops.unlink(&path)?;
            self.inodes.remove(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let ops = bound_ops!(self, reply);
        let result = self.child_of(parent, name).and_then(|path| {
            ops.rmdir(&path)?;
            self.inodes.remove(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let ops = bound_ops!(self, reply);
        let result = self.child_of(parent, name).and_then(|from| {
            let to = self.child_of(newparent, newname)?;
            ops.rename(&from, &to)?;
            self.inodes.rename(&from, &to);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let ops = bound_ops!(self, reply);
        match self.path_of(ino).and_then(|path| ops.open(&path, flags)) {
            Ok(r) => reply.opened(r.fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let ops = bound_ops!(self, reply);
        let result = self.child_of(parent, name).and_then(|path| {
            let opened = ops.create(&path, mode, flags)?;
            let (ttl, attr) = self.entry(ops.as_ref(), &path)?;
            Ok((ttl, attr, opened.fh))
        });
        match result {
            Ok((ttl, attr, fh)) => reply.created(&ttl, &attr, 0, fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let ops = bound_ops!(self, reply);
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = self.inodes.path(ino).unwrap_or_default();
        match ops.read(path, fh, size, offset) {
            Ok(r) => reply.data(&r.data),
            Err(errno) => reply.error(errno),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let ops = bound_ops!(self, reply);
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = self.inodes.path(ino).unwrap_or_default();
        match ops.write(path, fh, data, offset) {
            Ok(r) => reply.written(r.written),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let ops = bound_ops!(self, reply);
        // The path may already be unlinked; the handle is what counts.
        let path = self.inodes.path(ino).unwrap_or_default();
        match ops.release(path, fh) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let ops = bound_ops!(self, reply);
        let path = match self.path_of(ino) {
            Ok(p) => p,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let names = match ops.readdir(&path) {
            Ok(r) => r.entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        let parent_ino = match path.rfind('/') {
            Some(0) | None => ROOT_INO,
            Some(idx) => self.inodes.get_or_insert(&path[..idx]),
        };
        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for name in names {
            if name == "." || name == ".." {
                continue;
            }
            let Some(child) = self.inodes.child_path(ino, &name) else {
                continue;
            };
            let kind = ops
                .getattr(&child)
                .map(|r| file_type(r.attr.mode))
                .unwrap_or(FileType::RegularFile);
            let child_ino = self.inodes.get_or_insert(&child);
            entries.push((child_ino, kind, name));
        }

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (entry_ino, kind, name)) in entries.iter().enumerate().skip(skip) {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let ops = bound_ops!(self, reply);
        let path = self.inodes.path(ino).unwrap_or("/");
        match ops.statfs(path) {
            Ok(r) => {
                let s = r.stat;
                reply.statfs(
                    s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize,
                );
            }
            Err(errno) => reply.error(errno),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_options() {
        let options = mount_options(&[
            MountArg::DeferPermissions,
            MountArg::VolName("Test".into()),
            MountArg::FsName("afcdisk:dev-1".into()),
            MountArg::AllowOther,
        ]);
        assert!(options.contains(&MountOption::FSName("afcdisk:dev-1".into())));
        assert!(options.contains(&MountOption::AllowOther));
        assert!(options.contains(&MountOption::Subtype("afcdisk".into())));
        let custom = options
            .iter()
            .filter(|o| matches!(o, MountOption::CUSTOM(_)))
            .count();
        if cfg!(target_os = "macos") {
            assert_eq!(custom, 2);
        } else {
            assert_eq!(custom, 0);
        }
    }

    #[test]
    fn test_file_type() {
        assert_eq!(file_type(S_IFDIR | 0o755), FileType::Directory);
        assert_eq!(file_type(S_IFLNK | 0o777), FileType::Symlink);
        assert_eq!(file_type(libc::S_IFREG as u32 | 0o644), FileType::RegularFile);
    }
}
