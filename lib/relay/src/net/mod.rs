//! The networking modules in `relay` implement a single-threaded WebSocket server: framing, the
//! opening handshake, connection bookkeeping and the event loop driving a `MessageHandler`.

pub mod buffer;
pub mod client;
pub mod endpoint;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod registry;
pub mod shared;
pub mod transport;
pub mod user;
