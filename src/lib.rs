pub mod config;
pub mod connector;
pub mod device;
pub mod discovery;
pub mod error;
pub mod http;
pub mod payload;
pub mod progress;
pub mod sacp;
pub mod storage;
pub mod upload;

#[cfg(test)]
mod testing;

pub use error::{AppError, ErrorKind, Result};
