//! Host-side collaborators exposed as tools and resources
//!
//! Provides the in-memory scene the host loop owns, the tool providers that
//! mutate it, and the resource provider that snapshots it.

pub mod resources;
pub mod scene;
pub mod tools;
