//! # guildmix
//!
//! Per-guild real-time audio mixing and voice playback-session orchestration.
//!
//! Each guild (tenant) gets exactly one [`VoiceSession`], obtained from the
//! [`SessionRegistry`]. A session owns a multi-source PCM [`Mixer`] and a FIFO
//! track queue drained by a background consumer loop, so a streamed music
//! track and a synthesized speech clip can play at the same time while queued
//! tracks are serialized one after another.
//!
//! ## Architecture
//!
//! - [`audio`] - the frame-based mixer, its sources and the track queue
//! - [`session`] - the per-guild voice session state machine and registry
//! - [`transport`] / [`sources`] / [`transcode`] / [`speech`] - the narrow
//!   capability interfaces the core consumes (voice output, media resolution,
//!   PCM transcoding, speech synthesis), each with a fakeable trait seam
//!
//! The pipeline is fixed at 48 kHz interleaved 16-bit stereo PCM in 20 ms
//! frames; see [`config`] for the constants.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use guildmix::{ChannelId, Config, GuildId, SessionRegistry};
//! # use guildmix::{sources::YtDlpResolver, transcode::FfmpegTranscoder, speech::ElevenLabsSynth};
//! # async fn example(transport: Arc<dyn guildmix::transport::VoiceTransport>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let registry = SessionRegistry::new(
//!     config.clone(),
//!     transport,
//!     Arc::new(YtDlpResolver::new(&config)),
//!     Arc::new(FfmpegTranscoder::new(&config)),
//!     Arc::new(ElevenLabsSynth::new(&config)?),
//! );
//!
//! let session = registry.get_or_create(GuildId(1));
//! session.connect(ChannelId(42)).await?;
//! let queued = session.search_and_enqueue("lofi hip hop").await?;
//! println!("{} en posición {}", queued.track.title, queued.position);
//! # Ok(())
//! # }
//! ```

use std::fmt;

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod sources;
pub mod speech;
pub mod transcode;
pub mod transport;

pub use audio::mixer::Mixer;
pub use audio::queue::{QueuedTrack, TrackQueue};
pub use config::Config;
pub use error::SessionError;
pub use session::registry::SessionRegistry;
pub use session::voice::{ConnectionState, Enqueued, VoiceSession};

/// Identificador de guild (tenant). Una sesión de voz por guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuildId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for GuildId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identificador de canal de voz dentro de un guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
