//! Minimal blocking WebSocket client, used by the probe tooling and the end-to-end tests.

use crate::net::buffer::Buffer;
use crate::net::frame::{self, Decoder, Inbound, Opcode};
use crate::net::handshake;
use crate::net::shared::NetworkError;
use std::io;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const READ_CHUNK: usize = 4096;

/// Speaks the client side of the protocol over any blocking byte stream: plain TCP by default,
/// or a TLS stream wrapping one.
pub struct Client<S = TcpStream> {
    stream: S,
    ingress: Buffer,
    decoder: Decoder,
}

impl Client<TcpStream> {
    pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

    /// Connects and performs the opening handshake.
    pub fn connect(address: SocketAddr) -> io::Result<Client> {
        Client::upgrade(TcpStream::connect(address)?)
    }

    /// Performs the opening handshake on an already connected stream.
    pub fn upgrade(stream: TcpStream) -> io::Result<Client> {
        stream.set_read_timeout(Some(Self::READ_TIMEOUT))?;
        stream.set_nodelay(true)?;

        Client::handshake(stream)
    }
}

impl<S: Read + Write> Client<S> {
    /// Performs the opening handshake over `stream`. Read timeouts are up to the caller.
    pub fn handshake(stream: S) -> io::Result<Client<S>> {
        let mut client = Client {
            stream,
            ingress: Buffer::new(usize::max_value()),
            decoder: Decoder::default(),
        };

        let request = format!(
            "GET / HTTP/1.1\r\n\
             Host: localhost\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: {}\r\n\r\n",
            SAMPLE_KEY,
            handshake::SUPPORTED_VERSION
        );
        client.stream.write_all(request.as_bytes())?;
        client.stream.flush()?;

        let response = client.read_response()?;
        let expected = format!("Sec-WebSocket-Accept: {}\r\n", handshake::accept_key(SAMPLE_KEY));

        if !response.starts_with("HTTP/1.1 101") || !response.contains(&expected) {
            return Err(io::Error::new(io::ErrorKind::InvalidData, response));
        }

        Ok(client)
    }

    /// Sends a masked, final text frame.
    pub fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.send(text.as_bytes(), Opcode::Text, true)
    }

    /// Sends a single masked frame.
    pub fn send(&mut self, payload: &[u8], opcode: Opcode, fin: bool) -> io::Result<()> {
        let key: [u8; 4] = rand::random();
        self.send_raw(&frame::mask_with(payload, opcode, fin, key))
    }

    #[inline]
    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    /// Blocks until the next complete frame or message arrives.
    pub fn receive(&mut self) -> io::Result<Inbound> {
        loop {
            match self.decoder.deframe(&mut self.ingress) {
                Ok(inbound) => return Ok(inbound),
                Err(NetworkError::Wait) => self.fill()?,
                Err(NetworkError::Fatal(err)) => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
                }
            }
        }
    }

    /// Blocks until the next text message, skipping control frames other than close.
    pub fn receive_text(&mut self) -> io::Result<String> {
        loop {
            match self.receive()? {
                Inbound::Message(payload) => {
                    return String::from_utf8(payload)
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
                }
                Inbound::Close(_) => return Err(io::ErrorKind::ConnectionAborted.into()),
                Inbound::Ping(_) | Inbound::Pong(_) => (),
            }
        }
    }

    /// Reads until the server closes the connection. Returns false if the read timed out first.
    pub fn wait_closed(&mut self) -> bool {
        loop {
            match self.receive() {
                Ok(Inbound::Close(_)) => return true,
                Ok(_) => (),
                Err(err) => {
                    return match err.kind() {
                        io::ErrorKind::UnexpectedEof
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::BrokenPipe => true,
                        _ => false,
                    }
                }
            }
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];

        match self.stream.read(&mut chunk)? {
            0 => Err(io::ErrorKind::UnexpectedEof.into()),
            count => {
                self.ingress.extend(&chunk[..count]);
                Ok(())
            }
        }
    }

    fn read_response(&mut self) -> io::Result<String> {
        loop {
            let stream = self.ingress.read_slice();

            if let Some(end) = stream.windows(4).position(|window| window == b"\r\n\r\n") {
                let response = self.ingress.split_head(end + 4);
                return Ok(String::from_utf8_lossy(&response).into_owned());
            }

            self.fill()?;
        }
    }
}
