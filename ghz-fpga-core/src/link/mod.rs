mod context;
mod error;
mod mac;
mod request;
mod response;
mod transport;

pub use context::ContextId;
pub use error::TransportError;
pub use mac::{MacAddress, MacAddressParseError};
pub use request::{Record, Request};
pub use response::{RawPacket, Response};
pub use transport::Transport;
