//! Library crate for portprobe: TCP connect probing, service hints, scan sessions.
pub mod config;
pub mod error;
pub mod logging;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod server;
pub mod service;
pub mod session;
pub mod store;
pub mod types;

pub use error::{Result, ScanError, ValidationError};
pub use probe::{Prober, TcpProber};
pub use scanner::{ScanHandle, Scanner};
