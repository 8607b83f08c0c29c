use crate::protocol::Inbound;
use flux::logging;
use relay::prelude::{ConnectedUser, Hub, MessageHandler, UserId};

/// Connectivity smoke-test server. Echoes every message back to its sender and shuts down on
/// `shutdownTest`.
pub struct EchoServer {
    echoed: u64,
    log: logging::Logger,
}

impl EchoServer {
    pub fn new(log: &logging::Logger) -> EchoServer {
        EchoServer {
            echoed: 0,
            log: log.new(logging::o!("handler" => "probe")),
        }
    }

    /// Number of messages echoed so far.
    #[inline]
    pub fn echoed(&self) -> u64 {
        self.echoed
    }
}

impl MessageHandler for EchoServer {
    type Profile = ();

    fn connected(&mut self, _hub: &mut Hub<()>, user: &UserId) {
        logging::info!(self.log, "probe connected"; "user" => %user);
    }

    fn process(&mut self, hub: &mut Hub<()>, user: &UserId, message: &[u8]) {
        if let Ok(Inbound::ShutdownTest) = Inbound::decode(message) {
            logging::warn!(self.log, "shutdown requested"; "user" => %user);
            hub.shutdown();
            return;
        }

        if hub.send(user, &String::from_utf8_lossy(message)) {
            self.echoed += 1;
        }
    }

    fn closed(&mut self, _hub: &mut Hub<()>, user: ConnectedUser<()>) {
        logging::info!(self.log, "probe disconnected"; "user" => %user.id);
    }
}
