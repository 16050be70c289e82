use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use crate::config::{clamp_volume, FRAME_BYTES};

/// Stream de PCM decodificado (s16le intercalado a 48 kHz estéreo).
pub type PcmStream = Box<dyn AsyncRead + Send + Unpin>;

/// Una fuente activa del mezclador: un stream PCM con volumen propio y un
/// buffer de trabajo del tamaño de un frame.
pub(crate) struct MixerSource {
    stream: PcmStream,
    volume: f32,
    buf: Box<[u8]>,
}

impl MixerSource {
    pub(crate) fn new(stream: PcmStream, volume: f32) -> Self {
        Self {
            stream,
            volume: clamp_volume(volume),
            buf: vec![0u8; FRAME_BYTES].into_boxed_slice(),
        }
    }

    pub(crate) fn volume(&self) -> f32 {
        self.volume
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    /// Lee hasta un frame completo, acumulando lecturas cortas.
    ///
    /// Devuelve los bytes leídos; 0 marca fin de stream. Un error de lectura
    /// a mitad de stream se trata como fin de stream, nunca tumba la mezcla.
    pub(crate) async fn read_frame(&mut self) -> usize {
        let mut total = 0;

        while total < self.buf.len() {
            match self.stream.read(&mut self.buf[total..]).await {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => {
                    warn!("⚠️ Error leyendo fuente de audio, se descarta: {}", e);
                    break;
                }
            }
        }

        total
    }

    /// Últimos bytes leídos por `read_frame` (los primeros `n` del buffer).
    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buf
    }
}
