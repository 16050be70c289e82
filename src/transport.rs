//! # Transport Module
//!
//! Capability interfaces for the voice transport the mixer writes into.
//!
//! The concrete gateway (Discord or otherwise) lives outside this crate; the
//! session core only needs to connect to a channel, obtain a paced PCM sink
//! and disconnect. Tests plug in-memory fakes behind these traits.

use anyhow::Result;
use async_trait::async_trait;

use crate::ChannelId;

/// Sumidero de PCM hacia el transporte de voz.
///
/// Acepta frames completos de s16le intercalado (48 kHz estéreo, 3840 bytes)
/// y un `flush` final al desmontar el stream. Un error de escritura es fatal
/// para la sesión dueña del mezclador.
#[async_trait]
pub trait PcmSink: Send {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;
}

/// Una conexión de voz establecida sobre un canal concreto.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Abre el stream de salida PCM de esta conexión.
    async fn open_output(&self) -> Result<Box<dyn PcmSink>>;

    /// Libera la conexión con el gateway de voz.
    async fn disconnect(&self) -> Result<()>;
}

/// Gateway de voz abstracto: conecta a un canal y entrega la conexión.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, channel: ChannelId) -> Result<Box<dyn VoiceConnection>>;
}
