//! NextSpace Session Library
//!
//! - `auth`: sealed session cookie and the session endpoints
//! - `client`: session lifecycle manager and its collaborators
//! - `realtime`: authenticated realtime channel supervision

pub mod auth;
pub mod client;
pub mod config;
pub mod middleware;
pub mod realtime;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;
