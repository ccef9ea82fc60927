//! Clarify API Library Crate
//!
//! This library contains the HTTP layer of the tutoring service: configuration,
//! the in-memory session store, request models, handlers, and routing. The
//! `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod sessions;
pub mod state;
