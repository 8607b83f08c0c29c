use crate::net::buffer::{Buffer, Ingress};
use crate::net::frame::{Decoder, Encoder, Inbound, Opcode};
use crate::net::handshake::Request;
use crate::net::shared::NetworkResult;
use crate::net::transport::Transport;
use mio::Token;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// Opaque connection identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates an id from the accept sequence number and a random suffix.
    #[inline]
    pub fn generate(sequence: u64) -> UserId {
        let suffix = rand::random::<u32>() & 0xf_ffff;
        UserId(format!("u{:x}{:05x}", sequence, suffix))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    #[inline]
    fn from(id: &str) -> Self {
        UserId(id.to_string())
    }
}

/// A single live connection along with its protocol state. The application state `P` is filled
/// in by the message handler.
pub struct ConnectedUser<P> {
    pub id: UserId,
    pub token: Token,
    pub address: SocketAddr,
    pub profile: P,

    transport: Transport,
    handshake: Option<Request>,
    connected_at: Instant,

    ingress: Buffer,
    decoder: Decoder,
    encoder: Encoder,
    has_sent_close: bool,
}

impl<P: Default> ConnectedUser<P> {
    pub(crate) fn new(
        id: UserId,
        token: Token,
        address: SocketAddr,
        transport: Transport,
        max_message_size: usize,
        now: Instant,
    ) -> ConnectedUser<P> {
        ConnectedUser {
            id,
            token,
            address,
            profile: P::default(),
            transport,
            handshake: None,
            connected_at: now,
            // Room for one full message plus the frame headers of its fragments
            ingress: Buffer::new(max_message_size.saturating_mul(2)),
            decoder: Decoder::new(max_message_size),
            encoder: Encoder::default(),
            has_sent_close: false,
        }
    }
}

impl<P> ConnectedUser<P> {
    #[inline]
    pub fn is_handshake_complete(&self) -> bool {
        self.handshake.is_some()
    }

    /// The upgrade request, once the handshake has completed.
    #[inline]
    pub fn handshake(&self) -> Option<&Request> {
        self.handshake.as_ref()
    }

    #[inline]
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    #[inline]
    pub fn has_sent_close(&self) -> bool {
        self.has_sent_close
    }

    #[inline]
    pub fn is_sending_continuous(&self) -> bool {
        self.encoder.is_sending_continuous()
    }

    #[inline]
    pub fn has_partial_message(&self) -> bool {
        self.decoder.has_partial_message() || self.decoder.is_handling_partial()
    }

    #[inline]
    pub fn has_egress(&self) -> bool {
        self.transport.has_egress()
    }

    #[inline]
    pub(crate) fn transport(&mut self) -> &mut Transport {
        &mut self.transport
    }

    #[inline]
    pub(crate) fn receive(&mut self) -> NetworkResult<Ingress> {
        self.transport.receive(&mut self.ingress)
    }

    /// Parses the upgrade request out of the received bytes, leaving anything after it in place.
    pub(crate) fn read_request(&mut self) -> NetworkResult<Request> {
        let (request, consumed) = Request::read(self.ingress.read_slice())?;
        self.ingress.move_head(consumed);
        Ok(request)
    }

    #[inline]
    pub(crate) fn complete_handshake(&mut self, request: Request) {
        self.handshake = Some(request);
    }

    #[inline]
    pub(crate) fn deframe(&mut self) -> NetworkResult<Inbound> {
        self.decoder.deframe(&mut self.ingress)
    }

    #[inline]
    pub(crate) fn write_raw(&mut self, data: &[u8]) -> NetworkResult<()> {
        self.transport.write(data)
    }

    #[inline]
    pub(crate) fn send_frame(&mut self, payload: &[u8], opcode: Opcode, continues: bool) -> NetworkResult<()> {
        let frame = self.encoder.frame(payload, opcode, continues);
        self.transport.write(&frame)
    }

    /// Sends a close frame echoing the status code of `payload`, at most once.
    pub(crate) fn send_close(&mut self, payload: &[u8]) -> NetworkResult<()> {
        if self.has_sent_close {
            return Ok(());
        }

        self.has_sent_close = true;
        let code = &payload[..payload.len().min(2)];
        self.send_frame(code, Opcode::Close, false)
    }

    #[inline]
    pub(crate) fn flush(&mut self) -> NetworkResult<()> {
        self.transport.flush()
    }

    #[inline]
    pub(crate) fn shutdown(&mut self) {
        self.transport.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let first = UserId::generate(1);
        let second = UserId::generate(2);

        assert_ne!(first, second);
        assert!(first.as_str().starts_with("u1"));
        assert_eq!(first.to_string(), first.as_str());
    }
}
