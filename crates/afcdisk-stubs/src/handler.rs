use afcdisk_net::codec::{decode_request_body, encode_result};
use afcdisk_net::ServiceHandler;
use afcdisk_proto::fs::{FsMethod, FS_SERVICE_ID};
use afcdisk_types::{RPCCode, Status};
use async_trait::async_trait;
use bytes::Bytes;

use crate::fs_stub::DeviceFileService;

/// Exposes a [`DeviceFileService`] as the `fs` RPC service.
pub struct FsServiceHandler<S> {
    service: S,
}

impl<S: DeviceFileService> FsServiceHandler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn inner(&self) -> &S {
        &self.service
    }
}

#[async_trait]
impl<S: DeviceFileService + 'static> ServiceHandler for FsServiceHandler<S> {
    fn service_id(&self) -> u16 {
        FS_SERVICE_ID
    }

    fn service_name(&self) -> &str {
        "fs"
    }

    async fn handle(&self, method_id: u16, request: Bytes) -> Result<Bytes, Status> {
        let s = &self.service;
        match method_id {
            FsMethod::GET_ATTR => encode_result(s.get_attr(decode_request_body(&request)?).await),
            FsMethod::READ_DIR => encode_result(s.read_dir(decode_request_body(&request)?).await),
            FsMethod::UNLINK => encode_result(s.unlink(decode_request_body(&request)?).await),
            FsMethod::MKDIR => encode_result(s.mkdir(decode_request_body(&request)?).await),
            FsMethod::RENAME => encode_result(s.rename(decode_request_body(&request)?).await),
            FsMethod::OPEN => encode_result(s.open(decode_request_body(&request)?).await),
            FsMethod::CREATE => encode_result(s.create(decode_request_body(&request)?).await),
            FsMethod::RELEASE => encode_result(s.release(decode_request_body(&request)?).await),
            FsMethod::READ => encode_result(s.read(decode_request_body(&request)?).await),
            FsMethod::WRITE => encode_result(s.write(decode_request_body(&request)?).await),
            FsMethod::TRUNCATE => encode_result(s.truncate(decode_request_body(&request)?).await),
            FsMethod::STAT_FS => encode_result(s.stat_fs(decode_request_body(&request)?).await),
            other => Err(Status::with_message(
                RPCCode::INVALID_METHOD_ID,
                format!("fs: unknown method {}", other),
            )),
        }
    }
}
