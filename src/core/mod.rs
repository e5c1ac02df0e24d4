pub mod config;
pub mod error;
pub mod ids;
pub mod log;
pub mod pdu;
pub mod verify;

pub use config::Config;
pub use error::{Error, Result};
pub use pdu::{Pdu, PduEvent};
