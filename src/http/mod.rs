//! HTTP Transport layer for the Model Context Protocol
//!
//! Provides the external API routing: the unary `/message` endpoint, the
//! `/sse` push channel, metadata endpoints and the server lifecycle.

pub mod handlers;
pub mod server;
pub mod sse;
