//! HTTP session protocol: token issuance, on-device approval and uploads.

mod client;


pub use client::{HttpClient, NoticeFn};
