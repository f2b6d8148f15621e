use std::net::SocketAddr;
use std::sync::Arc;

use afcdisk_net::RpcClient;
use afcdisk_proto::fs::{
    CreateReq, CreateRsp, FsMethod, GetAttrReq, GetAttrRsp, MkDirReq, MkDirRsp, OpenReq, OpenRsp,
    ReadDirReq, ReadDirRsp, ReadReq, ReadRsp, ReleaseReq, ReleaseRsp, RenameReq, RenameRsp,
    StatFsReq, StatFsRsp, TruncateReq, TruncateRsp, UnlinkReq, UnlinkRsp, WriteReq, WriteRsp,
    FS_SERVICE_ID,
};
use afcdisk_types::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::fs_stub::DeviceFileService;

/// [`DeviceFileService`] backed by a remote fs server.
///
/// Transport failures surface as RPC statuses (`RPC::Timeout`,
/// `RPC::ConnectFailed`, ...), remote failures keep the server's code.
#[derive(Clone)]
pub struct RemoteFsStub {
    client: Arc<RpcClient>,
}

impl RemoteFsStub {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }

    pub fn connect(addr: SocketAddr) -> Self {
        Self::new(Arc::new(RpcClient::new(addr)))
    }

    async fn invoke<Req, Rsp>(&self, method_id: u16, req: &Req) -> Result<Rsp>
    where
        Req: Serialize + Sync,
        Rsp: DeserializeOwned,
    {
        self.client
            .call_message(FS_SERVICE_ID, method_id, req)
            .await
            .map_err(|e| {
                let status = e.into_status();
                tracing::debug!(method_id, status = %status, "fs call failed");
                status
            })
    }
}

#[async_trait]
impl DeviceFileService for RemoteFsStub {
    async fn get_attr(&self, req: GetAttrReq) -> Result<GetAttrRsp> {
        self.invoke(FsMethod::GET_ATTR, &req).await
    }

    async fn read_dir(&self, req: ReadDirReq) -> Result<ReadDirRsp> {
        self.invoke(FsMethod::READ_DIR, &req).await
    }

    async fn unlink(&self, req: UnlinkReq) -> Result<UnlinkRsp> {
        self.invoke(FsMethod::UNLINK, &req).await
    }

    async fn mkdir(&self, req: MkDirReq) -> Result<MkDirRsp> {
        self.invoke(FsMethod::MKDIR, &req).await
    }

    async fn rename(&self, req: RenameReq) -> Result<RenameRsp> {
        self.invoke(FsMethod::RENAME, &req).await
    }

    async fn open(&self, req: OpenReq) -> Result<OpenRsp> {
        self.invoke(FsMethod::OPEN, &req).await
    }

    async fn create(&self, req: CreateReq) -> Result<CreateRsp> {
        self.invoke(FsMethod::CREATE, &req).await
    }

    async fn release(&self, req: ReleaseReq) -> Result<ReleaseRsp> {
        self.invoke(FsMethod::RELEASE, &req).await
    }

    async fn read(&self, req: ReadReq) -> Result<ReadRsp> {
        self.invoke(FsMethod::READ, &req).await
    }

    async fn write(&self, req: WriteReq) -> Result<WriteRsp> {
        self.invoke(FsMethod::WRITE, &req).await
    }

    async fn truncate(&self, req: TruncateReq) -> Result<TruncateRsp> {
        self.invoke(FsMethod::TRUNCATE, &req).await
    }

    async fn stat_fs(&self, req: StatFsReq) -> Result<StatFsRsp> {
        self.invoke(FsMethod::STAT_FS, &req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_stub::MockDeviceFileService;
    use crate::handler::FsServiceHandler;
    use afcdisk_net::Server;
    use afcdisk_proto::RequestHeader;
    use afcdisk_types::{make_error_msg, FileHandle, FsCode, RPCCode};

    async fn serve(mock: Arc<MockDeviceFileService>) -> (Server, SocketAddr) {
        let mut server = Server::new();
        server.register_service(Arc::new(FsServiceHandler::new(mock)));
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (server, addr)
    }

    #[tokio::test]
    async fn test_remote_write_then_read() {
        let mock = MockDeviceFileService::new().into_arc();
        mock.on_read(|req| {
            assert_eq!(req.filehandle, FileHandle(3));
            Ok(ReadRsp {
                buffer: b"hello, world!"[..req.size as usize].to_vec(),
            })
        });
        let (_server, addr) = serve(mock).await;
        let stub = RemoteFsStub::connect(addr);

        let rsp = stub
            .write(WriteReq {
                header: RequestHeader::new("dev"),
                filehandle: FileHandle(3),
                buffer: b"hello, world!".to_vec(),
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(rsp.size, 13);

        let rsp = stub
            .read(ReadReq {
                header: RequestHeader::new("dev"),
                filehandle: FileHandle(3),
                size: 5,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(rsp.buffer, b"hello");
    }

    #[tokio::test]
    async fn test_remote_error_keeps_code() {
        let mock = MockDeviceFileService::new().into_arc();
        mock.on_read(|_| make_error_msg(FsCode::READ_TOO_LARGE, "Read request too large"));
        let (_server, addr) = serve(mock).await;
        let stub = RemoteFsStub::connect(addr);

        let err = stub.read(ReadReq::default()).await.unwrap_err();
        assert_eq!(err.code(), FsCode::READ_TOO_LARGE);
        assert_eq!(err.message(), Some("Read request too large"));
    }

    #[tokio::test]
    async fn test_remote_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let stub = RemoteFsStub::connect(addr);
        let err = stub.stat_fs(StatFsReq::default()).await.unwrap_err();
        assert_eq!(err.code(), RPCCode::CONNECT_FAILED);
    }
}
