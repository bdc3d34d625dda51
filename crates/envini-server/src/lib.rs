//! `Envini` HTTP server.
//!
//! Wires the vault engine, storage backend and upstream provider into a
//! JSON API under `/v1/*`. See [`routes::build_router`].

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
