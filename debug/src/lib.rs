pub mod error;
pub mod protocol;
pub mod server;

pub use error::DebugError;
pub use protocol::{Request, Response};
pub use server::{serve, DEFAULT_ADDR};
