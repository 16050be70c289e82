//! # Sources Module
//!
//! Media resolution: turning a free-text query into a playable track and a
//! track locator into a compressed audio byte stream.
//!
//! The session core only consumes the [`MediaResolver`] trait; the shipped
//! implementation drives `yt-dlp` as an external process. Tests plug
//! in-memory fakes.

pub mod ytdlp;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use ytdlp::YtDlpResolver;

/// Stream de audio comprimido tal como llega de la fuente.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Resultado de resolver una búsqueda: el primer/mejor match.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
}

/// Resolución de medios externa.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Busca y devuelve el primer resultado para la consulta.
    async fn search(&self, query: &str) -> Result<ResolvedMedia>;

    /// Abre el stream de audio comprimido de un locator ya resuelto.
    async fn open_audio(&self, url: &str) -> Result<ByteStream>;
}
