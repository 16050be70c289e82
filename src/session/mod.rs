//! # Session Module
//!
//! The per-guild voice session state machine and the registry that guarantees
//! a single authoritative session per guild.
//!
//! ## Architecture
//!
//! ### [`voice`] - Voice Session
//! - Connect/disconnect lifecycle over the abstract voice transport
//! - One mixer plus one queue-consumer loop per connected session, both
//!   supervised and cancelled through a session-scoped token
//! - The control surface callers use: enqueue, speech, skip, volumes, state
//!
//! ### [`registry`] - Session Registry
//! - Concurrent guild-keyed map with atomic get-or-create
//! - Explicit removal with full session teardown

pub mod registry;
pub mod voice;
