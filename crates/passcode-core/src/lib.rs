//! Core types, store contract, and the one-time-password state machine.
//!
//! This crate has no HTTP or database dependencies.
//! Storage backends implement [`store::OtpStore`]; SMS providers implement
//! [`notify::Notifier`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod code;
pub mod config;
pub mod error;
pub mod flow;
pub mod generator;
pub mod locks;
pub mod memory;
pub mod notify;
pub mod principal;
pub mod store;

pub use error::{Error, Result};
