//! # Audio Module
//!
//! Frame-based multi-source PCM mixing for one voice session.
//!
//! This module provides the core audio functionality including:
//! - Additive mixing of independently volume-scaled sources
//! - Fixed 20ms frame cadence with silence keep-alive frames
//! - Per-source completion signaling and lifecycle management
//! - The FIFO track queue feeding the session's consumer loop
//!
//! ## Architecture
//!
//! The audio system is built around four components:
//!
//! ### [`mixer`] - PCM Mixer
//! - Owns the keyed set of active sources under one lock
//! - Sums samples with per-source volume scaling and i16 saturation
//! - Drops ended sources and signals their completion exactly once
//!
//! ### [`source`] - Frame Buffer Source
//! - Wraps one decoded PCM byte stream with a live volume scalar
//! - Accumulates short reads until a full frame or end-of-stream
//!
//! ### [`completion`] - Completion Signaling
//! - Per-key one-shot completion, resolved exactly once on removal
//!
//! ### [`queue`] - Track Queue
//! - Unbounded FIFO of pending tracks with a counting signal
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz
//! - **Bit Depth**: 16-bit signed integers, little endian
//! - **Channels**: Stereo (2 channels, interleaved)
//! - **Frame**: 20ms = 3840 bytes

pub mod completion;
pub mod mixer;
pub mod queue;
pub mod source;
