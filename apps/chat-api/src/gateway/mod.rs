//! Live chat connections: session registry, outbound buffering, message
//! handling and notification push.

pub mod bridge;
pub mod chat;
pub mod hub;
pub mod notify;
pub mod server;
pub mod session;
