use afcdisk_types::{RPCCode, Status, StatusCode};
use thiserror::Error;

/// Errors raised by the framing, transport and dispatch layers.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Low byte of the checksum is not the message magic.
    #[error("invalid message: bad magic (checksum low byte: {0:#04x})")]
    InvalidMagic(u8),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed envelope: need {need} bytes, have {have}")]
    MalformedEnvelope { need: usize, have: usize },

    #[error("service not found: service_id={0}")]
    ServiceNotFound(u16),

    #[error("server shutting down")]
    ShuttingDown,

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The remote handler answered with a non-OK status.
    #[error("service error: {0}")]
    ServiceError(#[from] Status),
}

impl NetError {
    /// Collapse a transport error into the status a service caller sees.
    pub fn into_status(self) -> Status {
        match self {
            NetError::ServiceError(status) => status,
            NetError::ConnectionClosed => Status::new(RPCCode::SOCKET_CLOSED),
            NetError::ConnectFailed { .. } => {
                Status::with_message(RPCCode::CONNECT_FAILED, self.to_string())
            }
            NetError::Timeout => Status::new(RPCCode::TIMEOUT),
            NetError::Io(_) => Status::with_message(RPCCode::SOCKET_ERROR, self.to_string()),
            NetError::ChecksumMismatch { .. }
            | NetError::InvalidMagic(_)
            | NetError::MessageTooLarge { .. }
            | NetError::MalformedEnvelope { .. } => {
                Status::with_message(RPCCode::VERIFY_RESPONSE_FAILED, self.to_string())
            }
            NetError::ServiceNotFound(_) => {
                Status::with_message(RPCCode::INVALID_SERVICE_ID, self.to_string())
            }
            NetError::ShuttingDown => Status::with_message(RPCCode::SEND_FAILED, self.to_string()),
            NetError::Codec(_) => {
                Status::with_message(StatusCode::INVALID_FORMAT, self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afcdisk_types::FsCode;

    #[test]
    fn test_display_checksum_mismatch() {
        let err = NetError::ChecksumMismatch {
            expected: 0xAABBCC86,
            actual: 0x11223386,
        };
        let s = err.to_string();
        assert!(s.contains("0xaabbcc86"));
        assert!(s.contains("0x11223386"));
    }

    #[test]
    fn test_service_error_keeps_status() {
        let err = NetError::from(Status::with_message(FsCode::NOT_FOUND, "/x"));
        let status = err.into_status();
        assert_eq!(status.code(), FsCode::NOT_FOUND);
        assert_eq!(status.message(), Some("/x"));
    }

    #[test]
    fn test_transport_errors_map_to_rpc_codes() {
        assert_eq!(NetError::ConnectionClosed.into_status().code(), RPCCode::SOCKET_CLOSED);
        assert_eq!(NetError::Timeout.into_status().code(), RPCCode::TIMEOUT);
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        assert_eq!(NetError::from(io).into_status().code(), RPCCode::SOCKET_ERROR);
    }
}
