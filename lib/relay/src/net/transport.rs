use crate::net::buffer::{Buffer, Ingress};
use crate::net::shared::{NetworkError, NetworkResult};
use mio::net::TcpStream;
use rustls::{ServerConfig, ServerConnection};
use std::fs::File;
use std::io;
use std::io::{BufReader, Write};
use std::net::Shutdown;
use std::path::Path;
use std::sync::Arc;

/// Loads a PEM certificate chain and private key into a TLS server configuration.
pub fn server_config<P: AsRef<Path>>(certificate: P, private_key: P) -> io::Result<Arc<ServerConfig>> {
    let invalid = |err: rustls::Error| io::Error::new(io::ErrorKind::InvalidData, err);

    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(certificate)?))
        .collect::<io::Result<Vec<_>>>()?;

    if certs.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "No certificate found"));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(private_key)?))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "No private key found"))?;

    let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(invalid)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(invalid)?;

    Ok(Arc::new(config))
}

/// Byte transport of a single connection: either plain TCP or TLS on top of it. Outbound data
/// that the socket can't take right away is kept and flushed on the next writable event.
pub enum Transport {
    Plain {
        stream: TcpStream,
        egress: Buffer,
    },
    Tls {
        stream: TcpStream,
        session: Box<ServerConnection>,
    },
}

impl Transport {
    #[inline]
    pub fn plain(stream: TcpStream) -> Transport {
        Transport::Plain {
            stream,
            egress: Buffer::new(usize::max_value()),
        }
    }

    pub fn tls(stream: TcpStream, config: &Arc<ServerConfig>) -> NetworkResult<Transport> {
        let mut session = ServerConnection::new(config.clone())?;
        // Egress is bounded by the connection lifetime, not by rustls
        session.set_buffer_limit(None);

        Ok(Transport::Tls {
            stream,
            session: Box::new(session),
        })
    }

    #[inline]
    pub fn is_tls(&self) -> bool {
        match self {
            Transport::Plain { .. } => false,
            Transport::Tls { .. } => true,
        }
    }

    /// The underlying socket, for poll registration.
    #[inline]
    pub fn source(&mut self) -> &mut TcpStream {
        match self {
            Transport::Plain { stream, .. } => stream,
            Transport::Tls { stream, .. } => stream,
        }
    }

    /// Returns true if there is outgoing data waiting for the socket.
    #[inline]
    pub fn has_egress(&self) -> bool {
        match self {
            Transport::Plain { egress, .. } => !egress.is_empty(),
            Transport::Tls { session, .. } => session.wants_write(),
        }
    }

    /// Reads everything currently available into `into`.
    pub fn receive(&mut self, into: &mut Buffer) -> NetworkResult<Ingress> {
        match self {
            Transport::Plain { stream, .. } => Ok(into.ingress(stream)?),
            Transport::Tls { stream, session } => {
                let mut total = 0;
                let mut closed = false;

                loop {
                    match session.read_tls(stream) {
                        Ok(0) => closed = true,
                        Ok(_) => (),
                        Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                        Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => return Err(err.into()),
                    }

                    let state = session.process_new_packets()?;

                    if state.plaintext_bytes_to_read() > 0 {
                        match into.ingress(session.reader())? {
                            Ingress::Drained(count) => total += count,
                            Ingress::Closed(count) => {
                                total += count;
                                closed = true;
                            }
                        }
                    }

                    if closed || state.peer_has_closed() {
                        closed = true;
                        break;
                    }
                }

                // The TLS handshake produces output of its own
                Self::flush_tls(stream, session)?;

                Ok(if closed {
                    Ingress::Closed(total)
                } else {
                    Ingress::Drained(total)
                })
            }
        }
    }

    /// Queues `data` and sends as much of it as the socket accepts.
    pub fn write(&mut self, data: &[u8]) -> NetworkResult<()> {
        match self {
            Transport::Plain { egress, .. } => egress.extend(data),
            Transport::Tls { session, .. } => session.writer().write_all(data)?,
        }

        match self.flush() {
            Err(NetworkError::Wait) => Ok(()),
            other => other,
        }
    }

    /// Sends buffered data. Returns `NetworkError::Wait` if the socket could not take all of it.
    pub fn flush(&mut self) -> NetworkResult<()> {
        match self {
            Transport::Plain { stream, egress } => {
                egress.egress(stream)?;
                Ok(())
            }
            Transport::Tls { stream, session } => Self::flush_tls(stream, session),
        }
    }

    /// Shuts the connection down. Errors are ignored, the peer may already be gone.
    pub fn shutdown(&mut self) {
        if let Transport::Tls { session, .. } = self {
            session.send_close_notify();
        }

        drop(self.flush());
        drop(self.source().shutdown(Shutdown::Both));
    }

    fn flush_tls(stream: &mut TcpStream, session: &mut ServerConnection) -> NetworkResult<()> {
        while session.wants_write() {
            match session.write_tls(stream) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(_) => (),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}
