use std::error;
use std::fmt;
use std::io;
use std::net;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Eq, PartialEq)]
pub enum NetworkError {
    /// Not enough data (or socket capacity) yet, try again on the next readiness event.
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorType {
    ReservedBits,
    UnknownOpcode(u8),
    PayloadTooLarge,
    ControlFrameTooLarge,
    FragmentedControl,
    UnexpectedContinuation,
    InterleavedMessage,
    HeaderTooLarge,
    MalformedRequest,
    MissingKey,
    Tls,
    AddrParse,
    Closed,
    Io(io::ErrorKind),
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorType::ReservedBits => write!(f, "reserved bits set"),
            ErrorType::UnknownOpcode(opcode) => write!(f, "unknown opcode {:#x}", opcode),
            ErrorType::PayloadTooLarge => write!(f, "payload too large"),
            ErrorType::ControlFrameTooLarge => write!(f, "control frame too large"),
            ErrorType::FragmentedControl => write!(f, "fragmented control frame"),
            ErrorType::UnexpectedContinuation => write!(f, "continuation without a message"),
            ErrorType::InterleavedMessage => write!(f, "new message before the previous one ended"),
            ErrorType::HeaderTooLarge => write!(f, "request header too large"),
            ErrorType::MalformedRequest => write!(f, "malformed request"),
            ErrorType::MissingKey => write!(f, "missing Sec-WebSocket-Key"),
            ErrorType::Tls => write!(f, "TLS failure"),
            ErrorType::AddrParse => write!(f, "invalid address"),
            ErrorType::Closed => write!(f, "connection closed"),
            ErrorType::Io(kind) => write!(f, "I/O error: {:?}", kind),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkError::Wait => write!(f, "operation would block"),
            NetworkError::Fatal(kind) => write!(f, "{}", kind),
        }
    }
}

impl error::Error for NetworkError {}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}

impl From<rustls::Error> for NetworkError {
    #[inline]
    fn from(_: rustls::Error) -> Self {
        NetworkError::Fatal(ErrorType::Tls)
    }
}

impl From<ErrorType> for NetworkError {
    #[inline]
    fn from(kind: ErrorType) -> Self {
        NetworkError::Fatal(kind)
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(NetworkError::Wait) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_would_block_is_wait() {
        let err: NetworkError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(err, NetworkError::Wait);

        let err: NetworkError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert_eq!(err, NetworkError::Fatal(ErrorType::Io(io::ErrorKind::ConnectionReset)));
    }

    #[test]
    fn test_has_failed() {
        assert!(!NetworkResult::Ok(()).has_failed());
        assert!(!NetworkResult::<()>::Err(NetworkError::Wait).has_failed());
        assert!(NetworkResult::<()>::Err(ErrorType::ReservedBits.into()).has_failed());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ErrorType::UnknownOpcode(0x3).to_string(), "unknown opcode 0x3");
        assert_eq!(NetworkError::Fatal(ErrorType::MissingKey).to_string(), "missing Sec-WebSocket-Key");
        assert_eq!(NetworkError::Wait.to_string(), "operation would block");
    }
}
