//! RFC 6455 opening handshake.

use crate::net::shared::{ErrorType, NetworkError, NetworkResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hashbrown::HashMap;
use sha1::{Digest, Sha1};
use std::str;

pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const MAX_HEADER_SIZE: usize = 8192;
pub const SUPPORTED_VERSION: &str = "13";

const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Computes the `Sec-WebSocket-Accept` value for the supplied client key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Parsed HTTP upgrade request. Header names are kept exactly as sent.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
}

impl Request {
    /// Parses the header block at the start of `buffer`. Returns the request along with the
    /// number of bytes it occupied, or `NetworkError::Wait` if the terminating blank line has
    /// not arrived yet.
    pub fn read(buffer: &[u8]) -> NetworkResult<(Request, usize)> {
        let end = match buffer.windows(TERMINATOR.len()).position(|window| window == TERMINATOR) {
            Some(end) => end,
            None if buffer.len() > MAX_HEADER_SIZE => {
                return Err(NetworkError::Fatal(ErrorType::HeaderTooLarge))
            }
            None => return Err(NetworkError::Wait),
        };

        let consumed = end + TERMINATOR.len();

        if consumed > MAX_HEADER_SIZE {
            return Err(NetworkError::Fatal(ErrorType::HeaderTooLarge));
        }

        let text = str::from_utf8(&buffer[..end]).map_err(|_| ErrorType::MalformedRequest)?;
        let mut lines = text.split("\r\n");

        let mut request_line = lines.next().unwrap_or_default().split_whitespace();

        let (method, path, version) = match (request_line.next(), request_line.next(), request_line.next()) {
            (Some(method), Some(path), Some(version)) => (method, path, version),
            _ => return Err(NetworkError::Fatal(ErrorType::MalformedRequest)),
        };

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok((
            Request {
                method: method.to_string(),
                path: path.to_string(),
                version: version.to_string(),
                headers,
            },
            consumed,
        ))
    }

    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Server side acceptance rules.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// When non-empty, only requests carrying one of these `Origin` values are accepted.
    pub allowed_origins: Vec<String>,
}

/// A refused handshake along with the HTTP status to answer with.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Rejection {
    pub status: u16,
    pub reason: &'static str,
}

impl Rejection {
    pub const BAD_REQUEST: Rejection = Rejection {
        status: 400,
        reason: "Bad Request",
    };
    pub const FORBIDDEN: Rejection = Rejection {
        status: 403,
        reason: "Forbidden",
    };
    pub const METHOD_NOT_ALLOWED: Rejection = Rejection {
        status: 405,
        reason: "Method Not Allowed",
    };
    pub const UPGRADE_REQUIRED: Rejection = Rejection {
        status: 426,
        reason: "Upgrade Required",
    };

    pub fn response(&self) -> String {
        let mut response = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);

        if self.status == Self::UPGRADE_REQUIRED.status {
            response.push_str(&format!("Sec-WebSocket-Version: {}\r\n", SUPPORTED_VERSION));
        }

        response.push_str("Connection: close\r\n\r\n");
        response
    }
}

/// Validates the request and produces the `101 Switching Protocols` response.
pub fn negotiate(request: &Request, policy: &Policy) -> Result<String, Rejection> {
    if request.method != "GET" {
        return Err(Rejection::METHOD_NOT_ALLOWED);
    }

    if !request.version.starts_with("HTTP/1.") || request.version == "HTTP/1.0" {
        return Err(Rejection::BAD_REQUEST);
    }

    if !policy.allowed_origins.is_empty() {
        let allowed = request
            .header("Origin")
            .map_or(false, |origin| policy.allowed_origins.iter().any(|item| item == origin));

        if !allowed {
            return Err(Rejection::FORBIDDEN);
        }
    }

    if let Some(version) = request.header("Sec-WebSocket-Version") {
        if version != SUPPORTED_VERSION {
            return Err(Rejection::UPGRADE_REQUIRED);
        }
    }

    let key = request.header("Sec-WebSocket-Key").ok_or(Rejection::BAD_REQUEST)?;

    Ok(format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key)
    ))
}
