pub mod reconnect;
pub mod transport;
pub mod websocket;

pub use reconnect::{ReconnectPolicy, ReconnectionManager};
pub use transport::FeedTransport;
pub use websocket::WebSocketTransport;
