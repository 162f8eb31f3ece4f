//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides the envelope codec, the tool catalog with schema derivation, and
//! method routing.

pub mod registry;
pub mod rpc;
pub mod schema;
pub mod server;
