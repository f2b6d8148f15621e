//! The dispatch table the driver loop calls into.
//!
//! Operations are path based: the driver resolves inode numbers to absolute
//! paths inside the mount before calling in. Calls arrive one at a time on
//! the loop thread.

use crate::reply::*;

/// Filesystem operations served by a mount.
///
/// Default implementations return `ENOSYS` (function not implemented),
/// except the lifecycle hooks which do nothing.
pub trait FsOps: Send + Sync + 'static {
    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Called once before the first request.
    fn init(&self) {}

    /// Called once after the loop returned.
    fn destroy(&self) {}

    // ── Attributes ──────────────────────────────────────────────────────

    fn getattr(&self, path: &str) -> FuseResult<ReplyAttr> {
        let _ = path;
        Err(libc::ENOSYS)
    }

    fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FuseResult<()> {
        let _ = (path, uid, gid);
        Err(libc::ENOSYS)
    }

    fn chmod(&self, path: &str, mode: u32) -> FuseResult<()> {
        let _ = (path, mode);
        Err(libc::ENOSYS)
    }

    fn utimens(&self, path: &str) -> FuseResult<()> {
        let _ = path;
        Err(libc::ENOSYS)
    }

    fn truncate(&self, path: &str, size: u64) -> FuseResult<()> {
        let _ = (path, size);
        Err(libc::ENOSYS)
    }

    // ── Directories ─────────────────────────────────────────────────────

    fn readdir(&self, path: &str) -> FuseResult<ReplyDirectory> {
        let _ = path;
        Err(libc::ENOSYS)
    }

    fn mkdir(&self, path: &str, mode: u32) -> FuseResult<()> {
        let _ = (path, mode);
        Err(libc::ENOSYS)
    }

    fn rmdir(&self, path: &str) -> FuseResult<()> {
        let _ = path;
        Err(libc::ENOSYS)
    }

    // ── Names ───────────────────────────────────────────────────────────

    fn unlink(&self, path: &str) -> FuseResult<()> {
        let _ = path;
        Err(libc::ENOSYS)
    }

    fn rename(&self, from: &str, to: &str) -> FuseResult<()> {
        let _ = (from, to);
        Err(libc::ENOSYS)
    }

    // ── File I/O ────────────────────────────────────────────────────────

    fn open(&self, path: &str, flags: i32) -> FuseResult<ReplyOpen> {
        let _ = (path, flags);
        Err(libc::ENOSYS)
    }

    fn create(&self, path: &str, mode: u32, flags: i32) -> FuseResult<ReplyOpen> {
        let _ = (path, mode, flags);
        Err(libc::ENOSYS)
    }

    fn read(&self, path: &str, fh: u64, size: u32, offset: u64) -> FuseResult<ReplyData> {
        let _ = (path, fh, size, offset);
        Err(libc::ENOSYS)
    }

    fn write(&self, path: &str, fh: u64, data: &[u8], offset: u64) -> FuseResult<ReplyWrite> {
        let _ = (path, fh, data, offset);
        Err(libc::ENOSYS)
    }

    fn release(&self, path: &str, fh: u64) -> FuseResult<()> {
        let _ = (path, fh);
        Err(libc::ENOSYS)
    }

    // ── Filesystem ──────────────────────────────────────────────────────

    fn statfs(&self, path: &str) -> FuseResult<ReplyStatFs> {
        let _ = path;
        Err(libc::ENOSYS)
    }
}

impl<T: FsOps + ?Sized> FsOps for Box<T> {
    fn init(&self) {
        (**self).init()
    }
    fn destroy(&self) {
        (**self).destroy()
    }
    fn getattr(&self, path: &str) -> FuseResult<ReplyAttr> {
        (**self).getattr(path)
    }
    fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FuseResult<()> {
        (**self).chown(path, uid, gid)
    }
    fn chmod(&self, path: &str, mode: u32) -> FuseResult<()> {
        (**self).chmod(path, mode)
    }
    fn utimens(&self, path: &str) -> FuseResult<()> {
        (**self).utimens(path)
    }
    fn truncate(&self, path: &str, size: u64) -> FuseResult<()> {
        (**self).truncate(path, size)
    }
    fn readdir(&self, path: &str) -> FuseResult<ReplyDirectory> {
        (**self).readdir(path)
    }
    fn mkdir(&self, path: &str, mode: u32) -> FuseResult<()> {
        (**self).mkdir(path, mode)
    }
    fn rmdir(&self, path: &str) -> FuseResult<()> {
        (**self).rmdir(path)
    }
    fn unlink(&self, path: &str) -> FuseResult<()> {
        (**self).unlink(path)
    }
    fn rename(&self, from: &str, to: &str) -> FuseResult<()> {
        (**self).rename(from, to)
    }
    fn open(&self, path: &str, flags: i32) -> FuseResult<ReplyOpen> {
        (**self).open(path, flags)
    }
    fn create(&self, path: &str, mode: u32, flags: i32) -> FuseResult<ReplyOpen> {
        (**self).create(path, mode, flags)
    }
    fn read(&self, path: &str, fh: u64, size: u32, offset: u64) -> FuseResult<ReplyData> {
        (**self).read(path, fh, size, offset)
    }
    fn write(&self, path: &str, fh: u64, data: &[u8], offset: u64) -> FuseResult<ReplyWrite> {
        (**self).write(path, fh, data, offset)
    }
    fn release(&self, path: &str, fh: u64) -> FuseResult<()> {
        (**self).release(path, fh)
    }
    fn statfs(&self, path: &str) -> FuseResult<ReplyStatFs> {
        (**self).statfs(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;
    impl FsOps for Empty {}

    #[test]
    fn test_defaults_are_enosys() {
        let ops: Box<dyn FsOps> = Box::new(Empty);
        ops.init();
        assert_eq!(ops.getattr("/").unwrap_err(), libc::ENOSYS);
        assert_eq!(ops.mkdir("/a", 0o755).unwrap_err(), libc::ENOSYS);
        assert_eq!(ops.read("/a", 1, 10, 0).unwrap_err(), libc::ENOSYS);
        assert_eq!(ops.statfs("/").unwrap_err(), libc::ENOSYS);
        ops.destroy();
    }
}
