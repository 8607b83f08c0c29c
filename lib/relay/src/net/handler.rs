use crate::net::endpoint::Hub;
use crate::net::user::{ConnectedUser, UserId};

/// Application side of an `Endpoint`. All callbacks run on the endpoint's thread, one at a time.
pub trait MessageHandler {
    /// Per-connection application state stored on each `ConnectedUser`.
    type Profile: Default;

    /// The connection completed the WebSocket handshake.
    fn connected(&mut self, hub: &mut Hub<Self::Profile>, user: &UserId);

    /// A complete text or binary message arrived.
    fn process(&mut self, hub: &mut Hub<Self::Profile>, user: &UserId, message: &[u8]);

    /// The connection went away. The user has already been removed from the registry.
    fn closed(&mut self, hub: &mut Hub<Self::Profile>, user: ConnectedUser<Self::Profile>);

    /// Periodic hook, runs at least once per tick interval.
    fn tick(&mut self, _hub: &mut Hub<Self::Profile>) {}
}
