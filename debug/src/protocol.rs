//! Request/response payloads and the length-delimited wire framing used to
//! carry them over a TCP stream.
//!
//! Frame layout: a 4-byte little-endian length prefix (covering everything
//! that follows), then a 1-byte version, then the bincode-encoded payload.
//! The original source exchanged commands as Python `pickle` blobs with no
//! length prefix at all, relying on one `recv()` per message; `bincode` plus
//! an explicit length prefix gives the same "one call, one message" shape
//! without pickle's arbitrary-code-execution surface.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::DebugError;

/// Current wire version. Bumped if the payload shape changes incompatibly.
pub const WIRE_VERSION: u8 = 1;

/// Frames larger than this are rejected before their payload is read.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    GetRegisters,
    SetRegister { index: u8, value: i32 },
    GetMemory { addr: u16, len: u16 },
    SetMemory { addr: u16, bytes: Vec<u8> },
    GetStack,
    SetStackFromTop { index: usize, value: i32 },
    GetPc,
    SetPc { value: u16 },
    Pause,
    Resume,
    Halt { message: String },
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Registers([i32; 8]),
    Memory(Vec<u8>),
    Stack(Vec<i32>),
    Pc(u16),
    Status {
        halted: bool,
        paused: bool,
        pc: u16,
    },
    Ok,
    Err(String),
}

/// Read one length-delimited frame and decode it as `T`.
pub fn read_frame<T, R>(reader: &mut R) -> Result<T, DebugError>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut len_bytes = [0u8; 4];
    read_exact_or_closed(reader, &mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(DebugError::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut body = vec![0u8; len as usize];
    read_exact_or_closed(reader, &mut body)?;

    let version = *body.first().ok_or(DebugError::ConnectionClosed)?;
    if version != WIRE_VERSION {
        return Err(DebugError::UnsupportedVersion { version });
    }

    let value = bincode::deserialize(&body[1..])?;
    Ok(value)
}

/// Encode `value` and write it as one length-delimited frame.
pub fn write_frame<T, W>(writer: &mut W, value: &T) -> Result<(), DebugError>
where
    T: Serialize,
    W: Write,
{
    let mut body = vec![WIRE_VERSION];
    bincode::serialize_into(&mut body, value)?;

    let len = body.len() as u32;
    if len > MAX_FRAME_BYTES {
        return Err(DebugError::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

fn read_exact_or_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DebugError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(DebugError::ConnectionClosed)
        }
        Err(err) => Err(DebugError::Io(err)),
    }
}
