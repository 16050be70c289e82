use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::mixer::Mixer;
use crate::audio::queue::{QueuedTrack, TrackQueue};
use crate::config::{clamp_volume, Config};
use crate::error::SessionError;
use crate::sources::{ByteStream, MediaResolver};
use crate::speech::SpeechSynthesizer;
use crate::transcode::PcmTranscoder;
use crate::transport::{VoiceConnection, VoiceTransport};
use crate::{ChannelId, GuildId};

/// Id reservado de la fuente de música (cola secuencial).
pub const MUSIC_SOURCE_ID: &str = "music";
/// Id reservado de la fuente de voz sintetizada.
pub const TTS_SOURCE_ID: &str = "tts";

/// Estado de conexión de la sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Resultado de encolar una pista.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub track: QueuedTrack,
    /// Posición en la que sonará: 0 si va a sonar de inmediato.
    pub position: usize,
}

/// Volúmenes por categoría de la sesión, compartidos con el consumidor.
struct Volumes {
    music: Mutex<f32>,
    speech: Mutex<f32>,
}

impl Volumes {
    fn music(&self) -> f32 {
        *self.music.lock()
    }

    fn speech(&self) -> f32 {
        *self.speech.lock()
    }
}

/// Estado propio de una conexión activa.
struct Connected {
    channel: ChannelId,
    connection: Arc<dyn VoiceConnection>,
    mixer: Arc<Mixer>,
    cancel: CancellationToken,
    mixer_task: JoinHandle<()>,
    consumer_task: JoinHandle<()>,
    /// Error fatal del bucle de mezcla, pendiente de aflorar en `disconnect`.
    /// Si está puesto, la tarea del mezclador ya liberó la conexión.
    fatal: Arc<Mutex<Option<anyhow::Error>>>,
}

/// Sesión de voz de un guild.
///
/// Compone un [`Mixer`] con el consumidor de la cola de pistas y gobierna el
/// ciclo de vida `Disconnected → Connecting → Connected → Disconnecting`.
/// Solo en `Connected` se agregan fuentes al mezclador o se sacan pistas de
/// la cola. Música (`music`) y voz (`tts`) se mezclan de forma concurrente;
/// las pistas de música se serializan estrictamente una a una.
pub struct VoiceSession {
    guild_id: GuildId,
    transport: Arc<dyn VoiceTransport>,
    resolver: Arc<dyn MediaResolver>,
    transcoder: Arc<dyn PcmTranscoder>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    queue: Arc<TrackQueue>,
    current_track: Arc<Mutex<Option<QueuedTrack>>>,
    volumes: Arc<Volumes>,
    state: Arc<Mutex<ConnectionState>>,
    inner: tokio::sync::Mutex<Option<Connected>>,
    speech_gate: tokio::sync::Mutex<()>,
}

impl VoiceSession {
    pub(crate) fn new(
        guild_id: GuildId,
        config: &Config,
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<dyn MediaResolver>,
        transcoder: Arc<dyn PcmTranscoder>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            guild_id,
            transport,
            resolver,
            transcoder,
            synthesizer,
            queue: Arc::new(TrackQueue::new()),
            current_track: Arc::new(Mutex::new(None)),
            volumes: Arc::new(Volumes {
                music: Mutex::new(clamp_volume(config.music_volume)),
                speech: Mutex::new(clamp_volume(config.speech_volume)),
            }),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            inner: tokio::sync::Mutex::new(None),
            speech_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Conecta la sesión a un canal de voz.
    ///
    /// Si ya hay una conexión activa, primero ejecuta la secuencia completa
    /// de desconexión. Construye un mezclador nuevo y arranca el bucle de
    /// mezcla y el consumidor de cola como tareas supervisadas bajo una señal
    /// de cancelación con vida de sesión.
    pub async fn connect(&self, channel: ChannelId) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;

        if inner.is_some() {
            self.teardown(&mut inner).await?;
        }

        self.set_state(ConnectionState::Connecting);

        let connection: Arc<dyn VoiceConnection> = match self.transport.connect(channel).await {
            Ok(connection) => Arc::from(connection),
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(SessionError::Connect(e));
            }
        };

        let sink = match connection.open_output().await {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(e) = connection.disconnect().await {
                    warn!("⚠️ [Guild {}] Error liberando la conexión: {:#}", self.guild_id, e);
                }
                self.set_state(ConnectionState::Disconnected);
                return Err(SessionError::Connect(e));
            }
        };

        let mixer = Arc::new(Mixer::new());
        let cancel = CancellationToken::new();
        let fatal: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

        let mixer_task = {
            let mixer = mixer.clone();
            let run_cancel = cancel.clone();
            let fatal_cancel = cancel.clone();
            let connection = connection.clone();
            let fatal = fatal.clone();
            let state = self.state.clone();
            let guild_id = self.guild_id;
            tokio::spawn(async move {
                if let Err(e) = mixer.run(sink, run_cancel).await {
                    error!("❌ [Guild {}] Error en el mezclador: {:#}", guild_id, e);
                    // Fallo de transporte: parar el consumidor, soltar las
                    // fuentes y liberar la conexión. El error queda guardado
                    // para aflorar en disconnect()
                    fatal_cancel.cancel();
                    mixer.close().await;
                    if let Err(release_err) = connection.disconnect().await {
                        warn!(
                            "⚠️ [Guild {}] Error liberando la conexión: {:#}",
                            guild_id, release_err
                        );
                    }
                    *fatal.lock() = Some(e);
                    *state.lock() = ConnectionState::Disconnected;
                }
            })
        };

        let consumer_task = tokio::spawn(
            QueueWorker {
                guild_id: self.guild_id,
                queue: self.queue.clone(),
                mixer: mixer.clone(),
                resolver: self.resolver.clone(),
                transcoder: self.transcoder.clone(),
                current: self.current_track.clone(),
                volumes: self.volumes.clone(),
                cancel: cancel.clone(),
            }
            .run(),
        );

        *inner = Some(Connected {
            channel,
            connection,
            mixer,
            cancel,
            mixer_task,
            consumer_task,
            fatal,
        });
        self.set_state(ConnectionState::Connected);

        info!("🔊 [Guild {}] Conectado al canal de voz {}", self.guild_id, channel);
        Ok(())
    }

    /// Desconecta la sesión. No-op si ya está desconectada.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await
    }

    /// Secuencia completa de desconexión bajo el lock de conexión.
    async fn teardown(&self, inner: &mut Option<Connected>) -> Result<(), SessionError> {
        let Some(conn) = inner.take() else {
            return Ok(());
        };

        self.set_state(ConnectionState::Disconnecting);

        // Parar ambos bucles y liberar todas las fuentes del mezclador
        conn.cancel.cancel();
        conn.mixer.close().await;

        if let Err(e) = conn.mixer_task.await {
            warn!("⚠️ [Guild {}] La tarea del mezclador no terminó limpia: {}", self.guild_id, e);
        }
        if let Err(e) = conn.consumer_task.await {
            warn!("⚠️ [Guild {}] El consumidor de cola no terminó limpio: {}", self.guild_id, e);
        }

        // Si el bucle de mezcla cayó por fallo del transporte, él mismo
        // liberó la conexión; aquí solo queda aflorar ese error
        let transport_result = match conn.fatal.lock().take() {
            Some(e) => Err(e),
            None => conn.connection.disconnect().await,
        };

        self.queue.clear();
        *self.current_track.lock() = None;
        self.set_state(ConnectionState::Disconnected);

        info!("👋 [Guild {}] Desconectado del canal de voz", self.guild_id);
        transport_result.map_err(SessionError::Transport)
    }

    /// Busca la consulta y encola el primer resultado.
    ///
    /// Devuelve el título y la posición resultante en la cola (0 si sonará
    /// de inmediato por no haber nada reproduciéndose).
    pub async fn search_and_enqueue(&self, query: &str) -> Result<Enqueued, SessionError> {
        self.ensure_connected().await?;

        info!("🔍 [Guild {}] Buscando: {}", self.guild_id, query);
        let media = self
            .resolver
            .search(query)
            .await
            .map_err(SessionError::Resolve)?;

        let track = QueuedTrack::new(media.title, media.url, media.duration);
        self.enqueue_track(track).await
    }

    /// Encola un descriptor ya resuelto. Válido solo en `Connected`.
    pub async fn enqueue_track(&self, track: QueuedTrack) -> Result<Enqueued, SessionError> {
        self.ensure_connected().await?;

        // Posición calculada bajo el lock de la cola: una pista a medio
        // reclamar por el consumidor cuenta como sonando
        let current = &self.current_track;
        let position = self
            .queue
            .push_with(track.clone(), || current.lock().is_some());

        Ok(Enqueued { track, position })
    }

    /// Sintetiza el texto y lo reproduce sobre la mezcla, en paralelo con la
    /// música. Espera a que el clip termine de sonar.
    pub async fn play_speech(&self, text: &str) -> Result<(), SessionError> {
        let mixer = {
            let inner = self.inner.lock().await;
            inner
                .as_ref()
                .ok_or(SessionError::NotConnected)?
                .mixer
                .clone()
        };

        // A lo sumo una síntesis en vuelo por sesión
        let _gate = self.speech_gate.lock().await;

        let clip = self
            .synthesizer
            .synthesize(text)
            .await
            .map_err(SessionError::Synthesis)?;

        let encoded: ByteStream = Box::new(std::io::Cursor::new(clip));
        let pcm = self
            .transcoder
            .transcode(encoded)
            .await
            .map_err(SessionError::Transcode)?;

        let added = mixer
            .add_source(TTS_SOURCE_ID, pcm, self.volumes.speech())
            .await;
        if !added {
            // La sesión se desmontó mientras se sintetizaba: el clip no sonó
            return Err(SessionError::NotConnected);
        }
        mixer.wait_for_completion(TTS_SOURCE_ID).await;

        Ok(())
    }

    /// Salta la pista actual retirando la fuente `music` del mezclador, lo
    /// que desbloquea al consumidor para pasar a la siguiente.
    ///
    /// Devuelve si había algo que saltar.
    pub async fn skip(&self) -> bool {
        let mixer = {
            let inner = self.inner.lock().await;
            inner.as_ref().map(|conn| conn.mixer.clone())
        };

        match mixer {
            Some(mixer) => {
                let skipped = mixer.remove_source(MUSIC_SOURCE_ID).await;
                if skipped {
                    info!("⏭️ [Guild {}] Pista saltada", self.guild_id);
                }
                skipped
            }
            None => false,
        }
    }

    /// Ajusta el volumen de música (recortado a [0.0, 2.0]) y lo propaga a
    /// la fuente activa si la hay. Devuelve el valor aplicado.
    pub async fn set_music_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        *self.volumes.music.lock() = volume;

        if let Some(conn) = self.inner.lock().await.as_ref() {
            conn.mixer.set_volume(MUSIC_SOURCE_ID, volume).await;
        }

        info!("🔊 [Guild {}] Volumen de música: {}%", self.guild_id, (volume * 100.0) as u32);
        volume
    }

    /// Ajusta el volumen de voz sintetizada. Devuelve el valor aplicado.
    pub async fn set_speech_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        *self.volumes.speech.lock() = volume;

        if let Some(conn) = self.inner.lock().await.as_ref() {
            conn.mixer.set_volume(TTS_SOURCE_ID, volume).await;
        }

        volume
    }

    pub fn music_volume(&self) -> f32 {
        self.volumes.music()
    }

    pub fn speech_volume(&self) -> f32 {
        self.volumes.speech()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub async fn connected_channel(&self) -> Option<ChannelId> {
        self.inner.lock().await.as_ref().map(|conn| conn.channel)
    }

    /// Pista que está sonando (o resolviéndose) ahora mismo.
    pub fn current_track(&self) -> Option<QueuedTrack> {
        self.current_track.lock().clone()
    }

    pub fn queued_tracks(&self) -> Vec<QueuedTrack> {
        self.queue.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    pub async fn is_playing(&self) -> bool {
        match self.mixer().await {
            Some(mixer) => mixer.source_count().await > 0,
            None => false,
        }
    }

    pub async fn is_music_playing(&self) -> bool {
        match self.mixer().await {
            Some(mixer) => mixer.has_source(MUSIC_SOURCE_ID).await,
            None => false,
        }
    }

    pub async fn is_tts_playing(&self) -> bool {
        match self.mixer().await {
            Some(mixer) => mixer.has_source(TTS_SOURCE_ID).await,
            None => false,
        }
    }

    pub async fn active_sources(&self) -> Vec<String> {
        match self.mixer().await {
            Some(mixer) => mixer.active_sources().await,
            None => Vec::new(),
        }
    }

    async fn mixer(&self) -> Option<Arc<Mixer>> {
        self.inner.lock().await.as_ref().map(|conn| conn.mixer.clone())
    }

    async fn ensure_connected(&self) -> Result<(), SessionError> {
        match self.inner.lock().await.as_ref() {
            Some(conn) if conn.fatal.lock().is_none() => Ok(()),
            _ => Err(SessionError::NotConnected),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }
}

/// Consumidor de la cola de pistas: serializa la reproducción de música.
///
/// Nunca arranca una pista nueva mientras `current` sigue puesta; los errores
/// de una pista se registran y el bucle continúa con la siguiente.
struct QueueWorker {
    guild_id: GuildId,
    queue: Arc<TrackQueue>,
    mixer: Arc<Mixer>,
    resolver: Arc<dyn MediaResolver>,
    transcoder: Arc<dyn PcmTranscoder>,
    current: Arc<Mutex<Option<QueuedTrack>>>,
    volumes: Arc<Volumes>,
    cancel: CancellationToken,
}

impl QueueWorker {
    async fn run(self) {
        loop {
            let track = tokio::select! {
                _ = self.cancel.cancelled() => break,
                track = self.queue.pop_claiming(|track| {
                    // Reclamada como sonando en el mismo instante en que
                    // deja de estar pendiente
                    *self.current.lock() = Some(track.clone());
                }) => match track {
                    Some(track) => track,
                    None => continue,
                },
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.mixer.remove_source(MUSIC_SOURCE_ID).await;
                }
                result = self.play(&track) => {
                    if let Err(e) = result {
                        warn!(
                            "⚠️ [Guild {}] Error reproduciendo '{}': {:#}",
                            self.guild_id, track.title, e
                        );
                        self.mixer.remove_source(MUSIC_SOURCE_ID).await;
                    }
                }
            }

            *self.current.lock() = None;
        }

        debug!("[Guild {}] Consumidor de cola terminado", self.guild_id);
    }

    async fn play(&self, track: &QueuedTrack) -> anyhow::Result<()> {
        info!("🎵 [Guild {}] Reproduciendo: {}", self.guild_id, track.title);

        let audio = self
            .resolver
            .open_audio(&track.url)
            .await
            .context("abrir audio")?;
        let pcm = self
            .transcoder
            .transcode(audio)
            .await
            .context("transcodificar")?;

        let added = self
            .mixer
            .add_source(MUSIC_SOURCE_ID, pcm, self.volumes.music())
            .await;
        if !added {
            // Mezclador cerrado: la sesión está cayendo
            return Ok(());
        }
        self.mixer.wait_for_completion(MUSIC_SOURCE_ID).await;

        info!("✅ [Guild {}] Terminada: {}", self.guild_id, track.title);
        Ok(())
    }
}
