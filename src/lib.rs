//! Paymo command-line client with a persistent TTL cache in front of the API.

pub mod cache;
pub mod commands;
pub mod config;
pub mod output;
pub mod paymo;
