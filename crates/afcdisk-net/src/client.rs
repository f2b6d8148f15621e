use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::codec::{decode_message, decode_response, encode_message, encode_request};
use crate::error::NetError;
use crate::message::{read_frame, write_frame};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC client bound to one server address.
///
/// Holds a single lazily-established connection. Calls are serialised on
/// it; a transport failure drops the connection and the next call
/// reconnects.
pub struct RpcClient {
    addr: SocketAddr,
    timeout: Duration,
    conn: Mutex<Option<TcpStream>>,
}

impl RpcClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_TIMEOUT,
            conn: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send one request and wait for its response body.
    ///
    /// A non-OK remote status comes back as [`NetError::ServiceError`].
    pub async fn call(
        &self,
        service_id: u16,
        method_id: u16,
        request: &[u8],
    ) -> Result<Bytes, NetError> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            let stream = TcpStream::connect(self.addr)
                .await
                .map_err(|source| NetError::ConnectFailed {
                    addr: self.addr,
                    source,
                })?;
            stream.set_nodelay(true)?;
            tracing::debug!(addr = %self.addr, "connected");
            *guard = Some(stream);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(NetError::ConnectionClosed);
        };

        let envelope = encode_request(service_id, method_id, request);
        let exchange = async {
            write_frame(stream, &envelope).await?;
            let payload = read_frame(stream).await?;
            Ok::<Bytes, NetError>(payload)
        };

        let payload = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                *guard = None;
                return Err(e);
            }
            Err(_) => {
                *guard = None;
                return Err(NetError::Timeout);
            }
        };

        decode_response(payload)
    }

    /// Typed call: JSON-encode `req`, decode the response as `Rsp`.
    pub async fn call_message<Req, Rsp>(
        &self,
        service_id: u16,
        method_id: u16,
        req: &Req,
    ) -> Result<Rsp, NetError>
    where
        Req: Serialize + Sync,
        Rsp: DeserializeOwned,
    {
        let body = encode_message(req)?;
        let rsp = self.call(service_id, method_id, &body).await?;
        decode_message(&rsp)
    }
}
