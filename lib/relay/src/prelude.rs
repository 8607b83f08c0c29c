pub use crate::net::endpoint::{Endpoint, Hub, Settings, StopReason};
pub use crate::net::handler::MessageHandler;
pub use crate::net::handshake::Policy;
pub use crate::net::shared::{ErrorType, NetworkError, NetworkResult};
pub use crate::net::user::{ConnectedUser, UserId};
