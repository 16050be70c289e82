use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Sample rate fijo de la tubería de audio (estándar de voz: 48 kHz).
pub const SAMPLE_RATE: u32 = 48_000;
/// Canales intercalados (estéreo).
pub const CHANNELS: usize = 2;
/// Bytes por muestra (PCM s16le).
pub const SAMPLE_BYTES: usize = 2;
/// Duración de un frame de mezcla en milisegundos.
pub const FRAME_MILLIS: u64 = 20;
/// Tamaño de un frame en bytes: 48000 * 2 * 2 / 50 = 3840 (20ms).
pub const FRAME_BYTES: usize =
    (SAMPLE_RATE as usize / 1000) * FRAME_MILLIS as usize * CHANNELS * SAMPLE_BYTES;

/// Volumen máximo permitido para cualquier fuente.
pub const MAX_VOLUME: f32 = 2.0;

/// Recorta un volumen al rango válido [0.0, 2.0].
pub fn clamp_volume(volume: f32) -> f32 {
    volume.clamp(0.0, MAX_VOLUME)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Audio
    pub music_volume: f32,
    pub speech_volume: f32,

    // Binarios externos
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,

    // ElevenLabs (opcional - sin clave no hay síntesis de voz)
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Audio (valores por defecto: música baja, voz al natural)
            music_volume: std::env::var("MUSIC_VOLUME")
                .unwrap_or_else(|_| "0.2".to_string())
                .parse()?,
            speech_volume: std::env::var("SPEECH_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,

            // Binarios externos
            ytdlp_bin: std::env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string()),
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),

            // ElevenLabs
            elevenlabs_api_key: std::env::var("ELEVENLABS_API_KEY").ok(),
            elevenlabs_voice_id: std::env::var("ELEVENLABS_VOICE_ID")
                .unwrap_or_else(|_| "21m00Tcm4TlvDq8ikWAM".to_string()),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volumes must be between 0.0 and 2.0
    /// - External binary names must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.music_volume < 0.0 || self.music_volume > MAX_VOLUME {
            anyhow::bail!(
                "Music volume must be between 0.0 and {}, got: {}",
                MAX_VOLUME,
                self.music_volume
            );
        }

        if self.speech_volume < 0.0 || self.speech_volume > MAX_VOLUME {
            anyhow::bail!(
                "Speech volume must be between 0.0 and {}, got: {}",
                MAX_VOLUME,
                self.speech_volume
            );
        }

        if self.ytdlp_bin.trim().is_empty() {
            anyhow::bail!("yt-dlp binary name must not be empty");
        }

        if self.ffmpeg_bin.trim().is_empty() {
            anyhow::bail!("ffmpeg binary name must not be empty");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes sensitive information like the ElevenLabs API key.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Audio: {}kHz stereo s16le, {}ms frames ({} bytes)\n  \
            Volumes: music {}%, speech {}%\n  \
            Binaries: {} / {}\n  \
            ElevenLabs: key={}, voice={}",
            SAMPLE_RATE / 1000,
            FRAME_MILLIS,
            FRAME_BYTES,
            (self.music_volume * 100.0) as u32,
            (self.speech_volume * 100.0) as u32,
            self.ytdlp_bin,
            self.ffmpeg_bin,
            if self.elevenlabs_api_key.is_some() {
                "set"
            } else {
                "missing"
            },
            self.elevenlabs_voice_id,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            music_volume: 0.2,
            speech_volume: 1.0,
            ytdlp_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_frame_size_is_20ms_of_stereo_s16le() {
        assert_eq!(FRAME_BYTES, 3840);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_volume_is_rejected() {
        let mut config = Config::default();
        config.music_volume = 2.5;
        assert!(config.validate().is_err());

        config.music_volume = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clamp_volume_bounds() {
        assert_eq!(clamp_volume(-1.0), 0.0);
        assert_eq!(clamp_volume(0.7), 0.7);
        assert_eq!(clamp_volume(5.0), MAX_VOLUME);
    }
}
