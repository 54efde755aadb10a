mod client;
mod error;
mod transport;
mod types;

pub use client::{CdpClient, CdpConfig, CloseHandle};
pub use error::CdpError;
pub use types::{CdpEvent, CdpResponse};
