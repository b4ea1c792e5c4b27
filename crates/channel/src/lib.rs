//! `po-channel` — One playout channel.
//!
//! Wires the three devices together and owns their lifetimes:
//!
//! ```text
//! producers(layers) ──► producer device ──► mixer ──► consumer device ──► [consumer …]
//!                          (clock)         (compose)     (fan-out)
//! ```
//!
//! Teardown is leaves-first: the producer device stops ticking, then
//! the consumer device drains and each consumer flushes.

pub mod channel;

pub use channel::Channel;
