//! Capability-probing dispatch over the SACP and HTTP protocols.

mod handler;
mod registry;

pub use handler::{Handler, HttpHandler, Protocol, SacpHandler};
pub use registry::Registry;
