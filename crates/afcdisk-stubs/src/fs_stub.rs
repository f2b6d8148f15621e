//! Device file service trait and mock implementation.

use afcdisk_proto::fs::{
    CreateReq, CreateRsp, GetAttrReq, GetAttrRsp, MkDirReq, MkDirRsp, OpenReq, OpenRsp, ReadDirReq,
    ReadDirRsp, ReadReq, ReadRsp, ReleaseReq, ReleaseRsp, RenameReq, RenameRsp, StatFsReq,
    StatFsRsp, TruncateReq, TruncateRsp, UnlinkReq, UnlinkRsp, WriteReq, WriteRsp,
};
use afcdisk_types::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Filesystem operations against a single backing store.
///
/// Paths are absolute within the store (`/`, `/DCIM/a.jpg`). File handles
/// returned by `open`/`create` are opaque to callers and only valid for the
/// implementation that issued them.
#[async_trait]
pub trait DeviceFileService: Send + Sync {
    async fn get_attr(&self, req: GetAttrReq) -> Result<GetAttrRsp>;
    async fn read_dir(&self, req: ReadDirReq) -> Result<ReadDirRsp>;
    async fn unlink(&self, req: UnlinkReq) -> Result<UnlinkRsp>;
    async fn mkdir(&self, req: MkDirReq) -> Result<MkDirRsp>;
    async fn rename(&self, req: RenameReq) -> Result<RenameRsp>;
    async fn open(&self, req: OpenReq) -> Result<OpenRsp>;
    async fn create(&self, req: CreateReq) -> Result<CreateRsp>;
    async fn release(&self, req: ReleaseReq) -> Result<ReleaseRsp>;
    async fn read(&self, req: ReadReq) -> Result<ReadRsp>;
    async fn write(&self, req: WriteReq) -> Result<WriteRsp>;
    async fn truncate(&self, req: TruncateReq) -> Result<TruncateRsp>;
    async fn stat_fs(&self, req: StatFsReq) -> Result<StatFsRsp>;
}

// ---------------------------------------------------------------------------
// Mock implementation
// ---------------------------------------------------------------------------

type Handler<Req, Rsp> = Box<dyn Fn(Req) -> Result<Rsp> + Send + Sync>;

macro_rules! mock_device_file_service {
    ($( $method:ident, $setter:ident, $field:ident: $req:ty => $rsp:ty, |$arg:ident| $default:expr; )*) => {
        /// A configurable mock for [`DeviceFileService`].
        ///
        /// Each method can be overridden with a closure. Without a handler
        /// the mock succeeds with a default response.
        pub struct MockDeviceFileService {
            $( pub $field: Mutex<Option<Handler<$req, $rsp>>>, )*
        }

        impl MockDeviceFileService {
            pub fn new() -> Self {
                Self {
                    $( $field: Mutex::new(None), )*
                }
            }

            $(
                pub fn $setter(&self, f: impl Fn($req) -> Result<$rsp> + Send + Sync + 'static) {
                    *self.$field.lock() = Some(Box::new(f));
                }
            )*
        }

        #[async_trait]
        impl DeviceFileService for MockDeviceFileService {
            $(
                async fn $method(&self, $arg: $req) -> Result<$rsp> {
                    let guard = self.$field.lock();
                    match guard.as_ref() {
                        Some(f) => f($arg),
                        None => Ok($default),
                    }
                }
            )*
        }
    };
}

mock_device_file_service! {
    get_attr, on_get_attr, get_attr_handler: GetAttrReq => GetAttrRsp, |_req| GetAttrRsp::default();
    read_dir, on_read_dir, read_dir_handler: ReadDirReq => ReadDirRsp, |_req| ReadDirRsp::default();
    unlink, on_unlink, unlink_handler: UnlinkReq => UnlinkRsp, |_req| UnlinkRsp {};
    mkdir, on_mkdir, mkdir_handler: MkDirReq => MkDirRsp, |_req| MkDirRsp {};
    rename, on_rename, rename_handler: RenameReq => RenameRsp, |_req| RenameRsp {};
    open, on_open, open_handler: OpenReq => OpenRsp, |_req| OpenRsp::default();
    create, on_create, create_handler: CreateReq => CreateRsp, |_req| CreateRsp::default();
    release, on_release, release_handler: ReleaseReq => ReleaseRsp, |_req| ReleaseRsp {};
    read, on_read, read_handler: ReadReq => ReadRsp, |_req| ReadRsp::default();
    write, on_write, write_handler: WriteReq => WriteRsp, |req| WriteRsp {
        size: req.buffer.len() as u32,
    };
    truncate, on_truncate, truncate_handler: TruncateReq => TruncateRsp, |_req| TruncateRsp {};
    stat_fs, on_stat_fs, stat_fs_handler: StatFsReq => StatFsRsp, |_req| StatFsRsp::default();
}

impl MockDeviceFileService {
    /// Wrap in an `Arc` for convenient sharing.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for MockDeviceFileService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: DeviceFileService + ?Sized> DeviceFileService for Arc<T> {
    async fn get_attr(&self, req: GetAttrReq) -> Result<GetAttrRsp> {
        (**self).get_attr(req).await
    }
    async fn read_dir(&self, req: ReadDirReq) -> Result<ReadDirRsp> {
        (**self).read_dir(req).await
    }
    async fn unlink(&self, req: UnlinkReq) -> Result<UnlinkRsp> {
        (**self).unlink(req).await
    }
    async fn mkdir(&self, req: MkDirReq) -> Result<MkDirRsp> {
        (**self).mkdir(req).await
    }
    async fn rename(&self, req: RenameReq) -> Result<RenameRsp> {
        (**self).rename(req).await
    }
    async fn open(&self, req: OpenReq) -> Result<OpenRsp> {
        (**self).open(req).await
    }
    async fn create(&self, req: CreateReq) -> Result<CreateRsp> {
        (**self).create(req).await
    }
    async fn release(&self, req: ReleaseReq) -> Result<ReleaseRsp> {
        (**self).release(req).await
    }
    async fn read(&self, req: ReadReq) -> Result<ReadRsp> {
        (**self).read(req).await
    }
    async fn write(&self, req: WriteReq) -> Result<WriteRsp> {
        (**self).write(req).await
    }
    async fn truncate(&self, req: TruncateReq) -> Result<TruncateRsp> {
        (**self).truncate(req).await
    }
    async fn stat_fs(&self, req: StatFsReq) -> Result<StatFsRsp> {
        (**self).stat_fs(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afcdisk_proto::fs::Stat;
    use afcdisk_proto::RequestHeader;
    use afcdisk_types::{make_error, FileHandle, FsCode};

    #[tokio::test]
    async fn test_mock_defaults() {
        let mock = MockDeviceFileService::new();
        let rsp = mock.read_dir(ReadDirReq::default()).await.unwrap();
        assert!(rsp.entries.is_empty());

        let rsp = mock
            .write(WriteReq {
                buffer: b"hello".to_vec(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rsp.size, 5);
    }

    #[tokio::test]
    async fn test_mock_custom_handler() {
        let mock = MockDeviceFileService::new();
        mock.on_get_attr(|req| {
            assert_eq!(req.header.fs_id.as_str(), "dev-1");
            Ok(GetAttrRsp {
                stat: Stat {
                    size: 42,
                    mode: 0o100644,
                    ..Default::default()
                },
            })
        });
        let rsp = mock
            .get_attr(GetAttrReq {
                header: RequestHeader::new("dev-1"),
                path: "/a".into(),
            })
            .await
            .unwrap();
        assert_eq!(rsp.stat.size, 42);
    }

    #[tokio::test]
    async fn test_mock_error_handler() {
        let mock = MockDeviceFileService::new();
        mock.on_open(|_| make_error(FsCode::NOT_FOUND));
        let err = mock.open(OpenReq::default()).await.unwrap_err();
        assert_eq!(err.code(), FsCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mock_via_arc() {
        let mock = MockDeviceFileService::new().into_arc();
        mock.on_create(|_| {
            Ok(CreateRsp {
                filehandle: FileHandle(9),
            })
        });
        let service: Arc<dyn DeviceFileService> = mock;
        let rsp = service.create(CreateReq::default()).await.unwrap();
        assert_eq!(rsp.filehandle, FileHandle(9));
    }
}
