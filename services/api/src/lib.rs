//! Debate API Library Crate
//!
//! This library contains the web service around `debate-core`: configuration,
//! the SQLite session store, REST handlers, the WebSocket debate channel and
//! routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
