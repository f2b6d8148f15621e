//! Mount service: stub trait, remote client and RPC adapter.

use std::net::SocketAddr;
use std::sync::Arc;

use afcdisk_net::codec::{decode_request_body, encode_result};
use afcdisk_net::{RpcClient, ServiceHandler};
use afcdisk_proto::mount::{
    ListMountsReq, ListMountsRsp, MountMethod, MountReq, MountRsp, UnmountReq, UnmountRsp,
    MOUNT_SERVICE_ID,
};
use afcdisk_types::{RPCCode, Result, Status};
use async_trait::async_trait;
use bytes::Bytes;

/// Mounts and unmounts proxied volumes.
#[async_trait]
pub trait MountServiceStub: Send + Sync {
    async fn mount(&self, req: MountReq) -> Result<MountRsp>;
    async fn unmount(&self, req: UnmountReq) -> Result<UnmountRsp>;
    async fn list_mounts(&self, req: ListMountsReq) -> Result<ListMountsRsp>;
}

#[async_trait]
impl<T: MountServiceStub + ?Sized> MountServiceStub for Arc<T> {
    async fn mount(&self, req: MountReq) -> Result<MountRsp> {
        (**self).mount(req).await
    }
    async fn unmount(&self, req: UnmountReq) -> Result<UnmountRsp> {
        (**self).unmount(req).await
    }
    async fn list_mounts(&self, req: ListMountsReq) -> Result<ListMountsRsp> {
        (**self).list_mounts(req).await
    }
}

/// [`MountServiceStub`] talking to a mount server over TCP.
pub struct RemoteMountStub {
    client: RpcClient,
}

impl RemoteMountStub {
    pub fn connect(addr: SocketAddr) -> Self {
        Self {
            client: RpcClient::new(addr),
        }
    }
}

#[async_trait]
impl MountServiceStub for RemoteMountStub {
    async fn mount(&self, req: MountReq) -> Result<MountRsp> {
        self.client
            .call_message(MOUNT_SERVICE_ID, MountMethod::MOUNT, &req)
            .await
            .map_err(|e| e.into_status())
    }

    async fn unmount(&self, req: UnmountReq) -> Result<UnmountRsp> {
        self.client
            .call_message(MOUNT_SERVICE_ID, MountMethod::UNMOUNT, &req)
            .await
            .map_err(|e| e.into_status())
    }

    async fn list_mounts(&self, req: ListMountsReq) -> Result<ListMountsRsp> {
        self.client
            .call_message(MOUNT_SERVICE_ID, MountMethod::LIST_MOUNTS, &req)
            .await
            .map_err(|e| e.into_status())
    }
}

/// Exposes a [`MountServiceStub`] implementation as the `mount` RPC service.
pub struct MountServiceHandler<S> {
    service: S,
}

impl<S: MountServiceStub> MountServiceHandler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: MountServiceStub + 'static> ServiceHandler for MountServiceHandler<S> {
    fn service_id(&self) -> u16 {
        MOUNT_SERVICE_ID
    }

    fn service_name(&self) -> &str {
        "mount"
    }

    async fn handle(&self, method_id: u16, request: Bytes) -> std::result::Result<Bytes, Status> {
        match method_id {
            MountMethod::MOUNT => {
                encode_result(self.service.mount(decode_request_body(&request)?).await)
            }
            MountMethod::UNMOUNT => {
                encode_result(self.service.unmount(decode_request_body(&request)?).await)
            }
            MountMethod::LIST_MOUNTS => {
                encode_result(self.service.list_mounts(decode_request_body(&request)?).await)
            }
            other => Err(Status::with_message(
                RPCCode::INVALID_METHOD_ID,
                format!("mount: unknown method {}", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afcdisk_net::Server;
    use afcdisk_proto::mount::MountInfo;
    use afcdisk_types::{make_error, MountCode, VolumeName};
    use parking_lot::Mutex;

    /// Records mounted volumes without touching the OS.
    #[derive(Default)]
    struct FakeMounts {
        mounts: Mutex<Vec<MountInfo>>,
    }

    #[async_trait]
    impl MountServiceStub for FakeMounts {
        async fn mount(&self, req: MountReq) -> Result<MountRsp> {
            let mut mounts = self.mounts.lock();
            if mounts.iter().any(|m| m.volume == req.volume) {
                return make_error(MountCode::ALREADY_MOUNTED);
            }
            let mount_path = format!("/Volumes/{}", req.volume);
            mounts.push(MountInfo {
                fs_id: req.fs_id,
                volume: req.volume,
                mount_path: mount_path.clone(),
            });
            Ok(MountRsp { mount_path })
        }

        async fn unmount(&self, req: UnmountReq) -> Result<UnmountRsp> {
            let mut mounts = self.mounts.lock();
            let before = mounts.len();
            mounts.retain(|m| m.volume != req.volume);
            if mounts.len() == before {
                return make_error(MountCode::NOT_MOUNTED);
            }
            Ok(UnmountRsp {})
        }

        async fn list_mounts(&self, _req: ListMountsReq) -> Result<ListMountsRsp> {
            Ok(ListMountsRsp {
                mounts: self.mounts.lock().clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_remote_mount_roundtrip() {
        let mut server = Server::new();
        server.register_service(Arc::new(MountServiceHandler::new(FakeMounts::default())));
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let stub = RemoteMountStub::connect(addr);

        let req = MountReq {
            fs_id: "dev-1".into(),
            volume: VolumeName::from("Test"),
        };
        let rsp = stub.mount(req.clone()).await.unwrap();
        assert_eq!(rsp.mount_path, "/Volumes/Test");

        let err = stub.mount(req).await.unwrap_err();
        assert_eq!(err.code(), MountCode::ALREADY_MOUNTED);

        let listed = stub.list_mounts(ListMountsReq {}).await.unwrap();
        assert_eq!(listed.mounts.len(), 1);

        stub.unmount(UnmountReq {
            fs_id: "dev-1".into(),
            volume: "Test".into(),
        })
        .await
        .unwrap();
        let err = stub
            .unmount(UnmountReq {
                fs_id: "dev-1".into(),
                volume: "Test".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), MountCode::NOT_MOUNTED);
    }
}
