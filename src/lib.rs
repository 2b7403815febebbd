//! minicache - A networked in-memory cache node
//!
//! Stores byte keys and values with optional TTL expiry, speaks a compact
//! binary protocol over TCP, and replicates Sets best-effort to joined peers.

pub mod cache;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod tasks;

pub use client::Client;
pub use config::Config;
pub use server::{Server, ShutdownHandle};
