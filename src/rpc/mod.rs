//! XML-RPC gateway.
//!
//! - `xmlrpc`: wire codec for calls, responses and faults
//! - `gateway`: the method table over the registry and the manager
//! - `server`: HTTP transport built on axum

/// XML-RPC codec.
pub mod xmlrpc;

/// Method table.
pub mod gateway;

/// HTTP transport.
pub mod server;

pub use gateway::{handle, Gema, Reply};
pub use server::{build_app, serve, AppState};
pub use xmlrpc::{MethodCall, MethodResponse, Value};
