//! Conduit HTTP
//!
//! The engine only needs method, url, headers and body in, and status,
//! headers and body out, with a timeout. [`HttpClient`] is that seam;
//! [`ReqwestClient`] is the production implementation and tests substitute
//! their own.

mod client;
mod error;
mod types;

pub use client::{DEFAULT_TIMEOUT, ReqwestClient};
pub use error::HttpError;
pub use types::{HttpClient, HttpRequest, HttpResponse};
