//! Family chat server.
//!
//! Authenticated users exchange messages over WebSockets, either in the
//! shared group channel or directly with one other user. Every accepted
//! message is appended to a JSON log and replayed through `/messages`.

pub mod chat;
pub mod config;
pub mod directory;
pub mod message_log;
pub mod record;
pub mod registry;
pub mod routing;
pub mod server;
pub mod session;
pub mod web;
