//! Dealboard client library.
//!
//! Maintains a local view of the task board, applies server-pushed
//! events with idempotent merge rules, and falls back to direct REST
//! calls when the push channel degrades. The [`sync`] module owns the
//! connection state machine; [`board`] owns the merge rules; [`push`]
//! and [`rest`] are the two transports behind it.

pub mod board;
pub mod config;
pub mod push;
pub mod rest;
pub mod sync;
