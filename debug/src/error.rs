use thiserror::Error;

/// Errors from the debug wire protocol and the control-plane server.
#[derive(Error, Debug)]
pub enum DebugError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {len} bytes exceeds the {max}-byte bound")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("unsupported wire version {version}")]
    UnsupportedVersion { version: u8 },

    #[error("malformed frame: {0}")]
    Codec(#[from] bincode::Error),

    #[error("peer closed the connection mid-frame")]
    ConnectionClosed,

    #[error("vm error: {0}")]
    Vm(#[from] vm_core::error::RuntimeError),
}
