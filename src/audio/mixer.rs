use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::completion::CompletionSet;
use crate::audio::source::{MixerSource, PcmStream};
use crate::config::{FRAME_BYTES, FRAME_MILLIS};
use crate::transport::PcmSink;

/// Mezclador multi-fuente de una sesión de voz.
///
/// Mantiene el conjunto de fuentes activas bajo un único lock: altas, bajas y
/// el ciclo de mezcla son mutuamente excluyentes, de modo que ningún ciclo ve
/// una fuente a medio instalar o a medio retirar. El bucle de mezcla suma las
/// fuentes muestra a muestra con saturación a i16 y escribe un frame de 20ms
/// por ciclo en el transporte, incluyendo frames de silencio para mantener
/// vivo el ritmo del stream.
pub struct Mixer {
    sources: Mutex<HashMap<String, MixerSource>>,
    completions: CompletionSet,
    closed: AtomicBool,
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
            completions: CompletionSet::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Instala una fuente bajo `id`, reemplazando cualquier fuente previa.
    ///
    /// La fuente reemplazada libera su stream y su finalización se señala
    /// como éxito antes de que la nueva quede instalada, para desbloquear a
    /// quien espere por la antigua. Tras `close` las altas se rechazan.
    ///
    /// Devuelve si la fuente quedó instalada.
    pub async fn add_source(&self, id: &str, stream: PcmStream, volume: f32) -> bool {
        let mut sources = self.sources.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            debug!("🔚 Mezclador cerrado, fuente '{}' descartada", id);
            return false;
        }

        if sources.remove(id).is_some() {
            debug!("🔁 Fuente '{}' reemplazada", id);
            self.completions.complete(id);
        }

        sources.insert(id.to_string(), MixerSource::new(stream, volume));
        self.completions.register(id);
        true
    }

    /// Retira la fuente `id` y señala su finalización exactamente una vez.
    ///
    /// Devuelve si la fuente existía.
    pub async fn remove_source(&self, id: &str) -> bool {
        let mut sources = self.sources.lock().await;
        self.remove_locked(&mut sources, id)
    }

    fn remove_locked(&self, sources: &mut HashMap<String, MixerSource>, id: &str) -> bool {
        if sources.remove(id).is_none() {
            return false;
        }
        self.completions.complete(id);
        true
    }

    /// Ajusta el volumen en vivo de una fuente; no-op si no existe.
    ///
    /// El nuevo valor se aplica en el siguiente ciclo de mezcla.
    pub async fn set_volume(&self, id: &str, volume: f32) {
        if let Some(source) = self.sources.lock().await.get_mut(id) {
            source.set_volume(volume);
        }
    }

    /// Espera a que la fuente `id` sea retirada (fin natural, retirada
    /// explícita o reemplazo). Resuelve de inmediato si no está presente.
    pub async fn wait_for_completion(&self, id: &str) {
        self.completions.wait(id).await;
    }

    pub async fn has_source(&self, id: &str) -> bool {
        self.sources.lock().await.contains_key(id)
    }

    pub async fn source_count(&self) -> usize {
        self.sources.lock().await.len()
    }

    pub async fn active_sources(&self) -> Vec<String> {
        self.sources.lock().await.keys().cloned().collect()
    }

    /// Desmonta el mezclador: libera todas las fuentes, resuelve todas las
    /// finalizaciones pendientes y rechaza altas posteriores.
    pub async fn close(&self) {
        let mut sources = self.sources.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        sources.clear();
        self.completions.complete_all();
    }

    /// Bucle de mezcla: corre hasta cancelación o fallo del transporte.
    ///
    /// La cancelación a mitad de lectura o escritura es esperada y termina
    /// con `Ok`; un error de escritura en el sink es fatal y se propaga.
    pub async fn run(&self, mut sink: Box<dyn PcmSink>, cancel: CancellationToken) -> Result<()> {
        let cadence = Duration::from_millis(FRAME_MILLIS);
        let mut frame = vec![0u8; FRAME_BYTES];
        info!("🎚️ Mezclador iniciado");

        let result = loop {
            let has_audio = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                cycle = self.mix_cycle(sink.as_mut(), &mut frame) => match cycle {
                    Ok(has_audio) => has_audio,
                    Err(e) => break Err(e),
                },
            };

            // Sin datos este ciclo: esperar la cadencia para no girar en vacío
            if !has_audio {
                tokio::select! {
                    _ = cancel.cancelled() => break Ok(()),
                    _ = tokio::time::sleep(cadence) => {}
                }
            }
        };

        if let Err(e) = sink.flush().await {
            warn!("⚠️ Error al hacer flush del stream de salida: {}", e);
        }
        info!("🎚️ Mezclador detenido");

        result
    }

    /// Un ciclo de mezcla completo bajo el lock de fuentes.
    async fn mix_cycle(&self, sink: &mut dyn PcmSink, frame: &mut [u8]) -> Result<bool> {
        let mut sources = self.sources.lock().await;

        frame.fill(0);
        let mut has_audio = false;
        let mut ended = Vec::new();

        for (id, source) in sources.iter_mut() {
            let n = source.read_frame().await;
            if n == 0 {
                ended.push(id.clone());
                continue;
            }

            let volume = source.volume();
            mix_into(frame, &source.buffer()[..n], volume);
            has_audio = true;
        }

        for id in ended {
            debug!("🔚 Fuente '{}' terminada", id);
            self.remove_locked(&mut sources, &id);
        }

        // Siempre se escribe el frame, aunque sea silencio, para mantener el
        // ritmo del transporte
        sink.write_frame(frame).await?;

        Ok(has_audio)
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

/// Suma `source` sobre `target` muestra a muestra (s16le) escalando por
/// `volume`, con saturación al rango de i16.
fn mix_into(target: &mut [u8], source: &[u8], volume: f32) {
    let n = target.len().min(source.len());
    let mut i = 0;

    while i + 1 < n {
        let t = i16::from_le_bytes([target[i], target[i + 1]]);
        let s = i16::from_le_bytes([source[i], source[i + 1]]);

        let mixed = (t as i32 + (s as f32 * volume) as i32)
            .clamp(i16::MIN as i32, i16::MAX as i32) as i16;

        target[i..i + 2].copy_from_slice(&mixed.to_le_bytes());
        i += 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::sync::Arc;

    fn pcm_frame(sample: i16, samples: usize) -> Vec<u8> {
        sample
            .to_le_bytes()
            .iter()
            .copied()
            .cycle()
            .take(samples * 2)
            .collect()
    }

    fn samples_of(frame: &[u8]) -> Vec<i16> {
        frame
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    /// Sink que acumula los frames escritos.
    struct CollectSink {
        frames: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl PcmSink for CollectSink {
        async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
            self.frames.lock().push(frame.to_vec());
            Ok(())
        }

        async fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_mix_into_scales_and_saturates() {
        // Casos límite: 0, máximos, combinaciones que desbordan.
        // expected = clamp(target + source * volume)
        let cases: &[(i16, i16, f32, i16)] = &[
            (0, 0, 1.0, 0),
            (1000, 500, 2.0, 2000),
            (i16::MAX, i16::MAX, 1.0, i16::MAX),
            (i16::MIN, i16::MIN, 1.0, i16::MIN),
            (i16::MAX, 1, 1.0, i16::MAX),
            (i16::MIN, -1, 1.0, i16::MIN),
            (-2000, 3000, 1.0, 1000),
            (1000, 3000, 0.0, 1000),
            (1000, -400, 0.5, 800),
        ];

        for &(target_sample, source_sample, volume, expected) in cases {
            let mut target = pcm_frame(target_sample, 4);
            let source = pcm_frame(source_sample, 4);
            mix_into(&mut target, &source, volume);
            assert_eq!(
                samples_of(&target),
                vec![expected; 4],
                "target={} source={} volume={}",
                target_sample,
                source_sample,
                volume
            );
        }
    }

    #[test]
    fn test_mix_into_only_touches_overlapping_samples() {
        let mut target = pcm_frame(100, 4);
        let source = pcm_frame(50, 2);
        mix_into(&mut target, &source, 1.0);
        assert_eq!(samples_of(&target), vec![150, 150, 100, 100]);
    }

    #[tokio::test]
    async fn test_duplicate_id_replaces_and_completes_previous() {
        let mixer = Arc::new(Mixer::new());
        mixer
            .add_source("music", Box::new(Cursor::new(pcm_frame(1, 4000))), 1.0)
            .await;

        let waiter = {
            let mixer = mixer.clone();
            tokio::spawn(async move { mixer.wait_for_completion("music").await })
        };
        tokio::task::yield_now().await;

        mixer
            .add_source("music", Box::new(Cursor::new(pcm_frame(2, 4000))), 1.0)
            .await;

        // El esperador de la fuente reemplazada se desbloquea
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve on replacement")
            .expect("waiter task should not panic");

        assert_eq!(mixer.source_count().await, 1);
        assert!(mixer.has_source("music").await);
    }

    #[tokio::test]
    async fn test_remove_source_reports_existence() {
        let mixer = Mixer::new();
        assert!(!mixer.remove_source("music").await);

        assert!(
            mixer
                .add_source("music", Box::new(Cursor::new(Vec::new())), 1.0)
                .await
        );
        assert!(mixer.remove_source("music").await);
        assert!(!mixer.remove_source("music").await);

        // La finalización quedó resuelta
        mixer.wait_for_completion("music").await;
    }

    #[tokio::test]
    async fn test_run_mixes_two_sources_with_volume_and_clamp() {
        let mixer = Arc::new(Mixer::new());
        let frames = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        mixer
            .add_source(
                "music",
                Box::new(Cursor::new(pcm_frame(1000, FRAME_BYTES / 2))),
                1.0,
            )
            .await;
        mixer
            .add_source(
                "tts",
                Box::new(Cursor::new(pcm_frame(500, FRAME_BYTES / 2))),
                2.0,
            )
            .await;

        let task = {
            let mixer = mixer.clone();
            let sink = CollectSink {
                frames: frames.clone(),
            };
            let cancel = cancel.clone();
            tokio::spawn(async move { mixer.run(Box::new(sink), cancel).await })
        };

        // Ambas fuentes duran un frame: esperar a que terminen
        tokio::time::timeout(Duration::from_secs(2), mixer.wait_for_completion("music"))
            .await
            .expect("music should complete");
        tokio::time::timeout(Duration::from_secs(2), mixer.wait_for_completion("tts"))
            .await
            .expect("tts should complete");

        cancel.cancel();
        task.await
            .expect("mixer task should join")
            .expect("mixer loop should exit cleanly");

        let frames = frames.lock();
        assert!(!frames.is_empty());
        // Primer frame: 1000*1.0 + 500*2.0 = 2000 en cada muestra
        assert_eq!(samples_of(&frames[0]), vec![2000i16; FRAME_BYTES / 2]);
        assert_eq!(mixer.source_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_writes_silence_when_idle() {
        let mixer = Arc::new(Mixer::new());
        let frames = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let task = {
            let mixer = mixer.clone();
            let sink = CollectSink {
                frames: frames.clone(),
            };
            let cancel = cancel.clone();
            tokio::spawn(async move { mixer.run(Box::new(sink), cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(70)).await;
        cancel.cancel();
        task.await
            .expect("mixer task should join")
            .expect("mixer loop should exit cleanly");

        let frames = frames.lock();
        // Frames de silencio para mantener el ritmo, a cadencia de 20ms (no
        // cientos por girar en vacío)
        assert!(!frames.is_empty());
        assert!(frames.len() < 10);
        assert!(frames.iter().all(|f| f.iter().all(|&b| b == 0)));
    }

    #[tokio::test]
    async fn test_close_resolves_all_pending_completions() {
        let mixer = Mixer::new();
        mixer
            .add_source("music", Box::new(Cursor::new(pcm_frame(1, 4000))), 1.0)
            .await;
        mixer
            .add_source("tts", Box::new(Cursor::new(pcm_frame(1, 4000))), 1.0)
            .await;

        mixer.close().await;

        assert_eq!(mixer.source_count().await, 0);
        mixer.wait_for_completion("music").await;
        mixer.wait_for_completion("tts").await;
    }

    #[tokio::test]
    async fn test_add_after_close_is_rejected_and_wait_resolves() {
        let mixer = Mixer::new();
        mixer.close().await;

        assert!(
            !mixer
                .add_source("tts", Box::new(Cursor::new(pcm_frame(1, 4000))), 1.0)
                .await
        );

        assert!(!mixer.has_source("tts").await);
        mixer.wait_for_completion("tts").await;
    }
}
