//! JSON-RPC API Layer
//!
//! Exposes the annotation engine over JSON-RPC 2.0. Coder identity arrives
//! as a plain user id; bearer-token authentication is a transport concern
//! handled in front of this service.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::RpcServer;
