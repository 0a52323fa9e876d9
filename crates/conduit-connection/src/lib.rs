//! Conduit Connection
//!
//! Connections are credential/endpoint bundles managed outside the engine and
//! referenced from `api_call` steps by `connectionId`. The engine resolves them
//! through a [`ConnectionProvider`] once per run and never persists them.
//!
//! Only the non-secret part of a connection ([`Connection::public_view`]) is
//! ever exposed to templates. Auth material stays inside [`AuthMaterial`] and
//! is turned into a request header at the last moment.

mod connection;
mod provider;

pub use connection::{AuthMaterial, Connection};
pub use provider::{ConnectionProvider, FileConnections, MemoryConnections};

/// Errors raised by connection providers.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
  /// The backing file could not be read.
  #[error("failed to read connections: {0}")]
  Io(#[from] std::io::Error),

  /// The connection document is malformed.
  #[error("invalid connection document: {0}")]
  Parse(#[from] serde_json::Error),
}
