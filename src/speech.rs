//! # Speech Module
//!
//! Text-to-speech synthesis behind a narrow trait seam. The shipped
//! implementation calls the ElevenLabs HTTP API and returns encoded audio
//! bytes; decoding to PCM happens through the same transcoder path as music.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::config::Config;

/// Sintetizador de voz externo.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Sintetiza el texto y devuelve audio codificado (p. ej. MP3).
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

/// Cliente de texto a voz de ElevenLabs.
pub struct ElevenLabsSynth {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
}

impl ElevenLabsSynth {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .elevenlabs_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ELEVENLABS_API_KEY no configurada"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id: config.elevenlabs_voice_id.clone(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynth {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        info!("🗣️ Generando TTS ({} caracteres)", text.len());

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice_id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&serde_json::json!({
                "text": text,
                "model_id": "eleven_multilingual_v2",
            }))
            .send()
            .await
            .context("Error al llamar a ElevenLabs")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ElevenLabs devolvió {}: {}", status, body);
        }

        response
            .bytes()
            .await
            .context("Error al leer la respuesta de ElevenLabs")
    }
}
