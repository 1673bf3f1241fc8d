//! Marketstall storefront library.
//!
//! Signed stateless sessions, a TTL response cache and a repository that
//! falls back to an in-process store while the primary database is down.
//! The binary in `main.rs` wires these into an axum server; tests build
//! isolated instances through [`state::AppState::with_primary`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
