//! cinder-server: TCP front end for the cinder engine.
//!
//! Library surface exists so integration tests can bind a server on an
//! ephemeral port and drive it in-process; the binary in `main.rs` is
//! a thin CLI wrapper around the same [`Server`].

pub mod config;
pub mod connection;
pub mod server;

pub use config::ServerConfig;
pub use server::Server;
