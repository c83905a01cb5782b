pub mod traits;
pub mod websocket;

#[cfg(test)]
pub mod mock;

pub use traits::{TransportConnector, TransportLink};
pub use websocket::{socket_io_url, WebSocketConnector, WebSocketLink};
