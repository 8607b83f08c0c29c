//! WebSocket framing (RFC 6455 section 5).
//!
//! Server frames are never masked. Client frames are unmasked with the key carried in their
//! header. Fragmented messages are reassembled by the per-connection `Decoder`, while the
//! `Encoder` tracks whether a fragmented message is currently being sent.

use crate::net::buffer::Buffer;
use crate::net::shared::{ErrorType, NetworkError, NetworkResult};
use byteorder::{BigEndian, ReadBytesExt};
use flux::choose;
use std::mem;

/// Upper bound for a single (reassembled) message.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

const MAX_CONTROL_PAYLOAD: u64 = 125;
const LENGTH_16: u8 = 126;
const LENGTH_64: u8 = 127;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Opcode {
    Continuation = 0,
    Text = 1,
    Binary = 2,
    Close = 8,
    Ping = 9,
    Pong = 10,
}

impl From<Opcode> for u8 {
    #[inline]
    fn from(opcode: Opcode) -> Self {
        opcode as u8
    }
}

impl Opcode {
    #[inline]
    pub fn from_u8(code: u8) -> NetworkResult<Opcode> {
        Ok(match code {
            0 => Opcode::Continuation,
            1 => Opcode::Text,
            2 => Opcode::Binary,
            8 => Opcode::Close,
            9 => Opcode::Ping,
            10 => Opcode::Pong,
            other => return Err(NetworkError::Fatal(ErrorType::UnknownOpcode(other))),
        })
    }

    #[inline]
    pub fn is_control(self) -> bool {
        (self as u8) & 0x08 != 0
    }
}

/// Decoded frame header.
#[derive(Debug, Eq, PartialEq)]
pub struct Header {
    pub fin: bool,
    pub rsv: u8,
    pub opcode: u8,
    pub masked: bool,
    pub length: u64,
    pub mask: [u8; 4],
    /// Number of bytes taken up by the header, masking key included.
    pub size: usize,
}

impl Header {
    /// Parses the header at the start of `buffer`. Returns `NetworkError::Wait` if the header has
    /// not fully arrived yet.
    pub fn read(buffer: &[u8]) -> NetworkResult<Header> {
        if buffer.len() < 2 {
            return Err(NetworkError::Wait);
        }

        let fin = buffer[0] & FIN_BIT != 0;
        let rsv = (buffer[0] & 0x70) >> 4;
        let opcode = buffer[0] & 0x0f;
        let masked = buffer[1] & MASK_BIT != 0;

        let (length, mut size) = match buffer[1] & 0x7f {
            LENGTH_16 => {
                if buffer.len() < 4 {
                    return Err(NetworkError::Wait);
                }
                (u64::from((&buffer[2..4]).read_u16::<BigEndian>()?), 4)
            }
            LENGTH_64 => {
                if buffer.len() < 10 {
                    return Err(NetworkError::Wait);
                }
                ((&buffer[2..10]).read_u64::<BigEndian>()?, 10)
            }
            short => (u64::from(short), 2),
        };

        let mut mask = [0u8; 4];

        if masked {
            if buffer.len() < size + 4 {
                return Err(NetworkError::Wait);
            }
            mask.copy_from_slice(&buffer[size..size + 4]);
            size += 4;
        }

        Ok(Header {
            fin,
            rsv,
            opcode,
            masked,
            length,
            mask,
            size,
        })
    }
}

/// XORs each payload byte with `key[i mod 4]`. Applying it twice restores the input.
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (idx, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[idx % 4];
    }
}

fn write_header(out: &mut Vec<u8>, first: u8, length: usize, key: Option<[u8; 4]>) {
    let mask_bit = choose!(key.is_some() => MASK_BIT, 0);

    out.push(first);

    if length <= MAX_CONTROL_PAYLOAD as usize {
        out.push(mask_bit | length as u8);
    } else if length < 65536 {
        out.push(mask_bit | LENGTH_16);
        out.extend_from_slice(&(length as u16).to_be_bytes());
    } else {
        out.push(mask_bit | LENGTH_64);
        out.extend_from_slice(&(length as u64).to_be_bytes());
    }

    if let Some(key) = key {
        out.extend_from_slice(&key);
    }
}

/// Builds a final, unmasked text frame carrying `payload`.
pub fn mask(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    write_header(&mut out, FIN_BIT | u8::from(Opcode::Text), payload.len(), None);
    out.extend_from_slice(payload);
    out
}

/// Builds a masked (client to server) frame.
pub fn mask_with(payload: &[u8], opcode: Opcode, fin: bool, key: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    write_header(&mut out, choose!(fin => FIN_BIT, 0) | u8::from(opcode), payload.len(), Some(key));

    let start = out.len();
    out.extend_from_slice(payload);
    apply_mask(&mut out[start..], key);
    out
}

/// Extracts the payload of a complete single frame, unmasking it if the mask bit is set.
pub fn unmask(frame: &[u8]) -> NetworkResult<Vec<u8>> {
    let header = Header::read(frame)?;

    if header.length > MAX_PAYLOAD_SIZE as u64 {
        return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
    }

    let end = header.size + header.length as usize;

    if frame.len() < end {
        return Err(NetworkError::Wait);
    }

    let mut payload = frame[header.size..end].to_vec();

    if header.masked {
        apply_mask(&mut payload, header.mask);
    }

    Ok(payload)
}

/// Outbound framing state of a single connection.
#[derive(Debug, Default)]
pub struct Encoder {
    sending_continuous: bool,
}

impl Encoder {
    /// Frames `payload`. When `continues` is set the frame is not final and follow-up text or
    /// binary frames are emitted as continuations until a call without `continues`.
    pub fn frame(&mut self, payload: &[u8], opcode: Opcode, continues: bool) -> Vec<u8> {
        let mut code = u8::from(opcode);

        if !opcode.is_control() {
            if self.sending_continuous {
                code = u8::from(Opcode::Continuation);
            }
            self.sending_continuous = continues;
        }

        let first = choose!(continues && !opcode.is_control() => code, code | FIN_BIT);

        let mut out = Vec::with_capacity(payload.len() + 10);
        write_header(&mut out, first, payload.len(), None);
        out.extend_from_slice(payload);
        out
    }

    #[inline]
    pub fn is_sending_continuous(&self) -> bool {
        self.sending_continuous
    }
}

/// A fully decoded inbound unit.
#[derive(Debug, Eq, PartialEq)]
pub enum Inbound {
    Message(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Vec<u8>),
}

/// Inbound framing state of a single connection.
#[derive(Debug)]
pub struct Decoder {
    partial_message: Vec<u8>,
    message_opcode: Option<Opcode>,
    handling_partial: bool,
    limit: usize,
}

impl Default for Decoder {
    fn default() -> Decoder {
        Decoder::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder {
    #[inline]
    pub fn new(limit: usize) -> Decoder {
        Decoder {
            partial_message: Vec::new(),
            message_opcode: None,
            handling_partial: false,
            limit: limit.min(MAX_PAYLOAD_SIZE),
        }
    }

    /// True if the buffer ended in the middle of a frame during the last call.
    #[inline]
    pub fn is_handling_partial(&self) -> bool {
        self.handling_partial
    }

    /// True if a fragmented message is being reassembled.
    #[inline]
    pub fn has_partial_message(&self) -> bool {
        self.message_opcode.is_some()
    }

    /// Consumes frames from the buffer until a complete unit can be returned. Non-final data
    /// fragments are absorbed into the reassembly buffer. Returns `NetworkError::Wait` once the
    /// buffer holds no complete frame, leaving any partial frame in place.
    pub fn deframe(&mut self, buffer: &mut Buffer) -> NetworkResult<Inbound> {
        loop {
            let stream = buffer.read_slice();

            let header = match Header::read(stream) {
                Err(NetworkError::Wait) => {
                    self.handling_partial = !stream.is_empty();
                    return Err(NetworkError::Wait);
                }
                other => other?,
            };

            if header.rsv != 0 {
                return Err(NetworkError::Fatal(ErrorType::ReservedBits));
            }

            let opcode = Opcode::from_u8(header.opcode)?;

            if opcode.is_control() {
                if !header.fin {
                    return Err(NetworkError::Fatal(ErrorType::FragmentedControl));
                }
                if header.length > MAX_CONTROL_PAYLOAD {
                    return Err(NetworkError::Fatal(ErrorType::ControlFrameTooLarge));
                }
            } else if header.length.saturating_add(self.partial_message.len() as u64) > self.limit as u64 {
                return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
            }

            let total = header.size + header.length as usize;

            if stream.len() < total {
                self.handling_partial = true;
                return Err(NetworkError::Wait);
            }

            let mut payload = stream[header.size..total].to_vec();

            if header.masked {
                apply_mask(&mut payload, header.mask);
            }

            buffer.move_head(total);
            self.handling_partial = false;

            match opcode {
                Opcode::Close => return Ok(Inbound::Close(payload)),
                Opcode::Ping => return Ok(Inbound::Ping(payload)),
                Opcode::Pong => return Ok(Inbound::Pong(payload)),
                Opcode::Continuation => {
                    if self.message_opcode.is_none() {
                        return Err(NetworkError::Fatal(ErrorType::UnexpectedContinuation));
                    }
                    self.partial_message.extend_from_slice(&payload);
                }
                Opcode::Text | Opcode::Binary => {
                    if self.message_opcode.is_some() {
                        return Err(NetworkError::Fatal(ErrorType::InterleavedMessage));
                    }
                    self.message_opcode = Some(opcode);
                    self.partial_message = payload;
                }
            }

            if header.fin {
                self.message_opcode = None;
                return Ok(Inbound::Message(mem::take(&mut self.partial_message)));
            }
        }
    }
}
