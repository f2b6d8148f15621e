pub mod call;
pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod server;
pub mod service;

pub use call::RpcCall;
pub use client::RpcClient;
pub use error::NetError;
pub use message::MessageHeader;
pub use server::Server;
pub use service::{ServiceHandler, ServiceRegistry};
