use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::Config;
use crate::session::voice::VoiceSession;
use crate::sources::MediaResolver;
use crate::speech::SpeechSynthesizer;
use crate::transcode::PcmTranscoder;
use crate::transport::VoiceTransport;
use crate::GuildId;

/// Registro concurrente de sesiones de voz, una por guild.
///
/// `get_or_create` es atómico: dos llamadas concurrentes para un guild nunca
/// visto devuelven la misma instancia y construyen exactamente una sesión.
/// Las sesiones solo se destruyen con `remove` (o `shutdown_all`), nunca de
/// forma implícita.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<VoiceSession>>,
    config: Config,
    transport: Arc<dyn VoiceTransport>,
    resolver: Arc<dyn MediaResolver>,
    transcoder: Arc<dyn PcmTranscoder>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl SessionRegistry {
    pub fn new(
        config: Config,
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<dyn MediaResolver>,
        transcoder: Arc<dyn PcmTranscoder>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            transport,
            resolver,
            transcoder,
            synthesizer,
        }
    }

    /// Obtiene la sesión del guild, creándola si no existe.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<VoiceSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 Creando sesión de voz para guild {}", guild_id);
                Arc::new(VoiceSession::new(
                    guild_id,
                    &self.config,
                    self.transport.clone(),
                    self.resolver.clone(),
                    self.transcoder.clone(),
                    self.synthesizer.clone(),
                ))
            })
            .clone()
    }

    /// Busca la sesión del guild sin crearla.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<VoiceSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.clone())
    }

    /// Elimina la sesión del guild, desconectándola primero. Idempotente.
    ///
    /// Devuelve si la sesión existía.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return false;
        };

        info!("🗑️ Eliminando sesión de voz de guild {}", guild_id);
        if let Err(e) = session.disconnect().await {
            warn!("⚠️ Error desconectando la sesión de guild {}: {}", guild_id, e);
        }
        true
    }

    /// Copia instantánea de las sesiones vivas.
    pub fn sessions(&self) -> Vec<Arc<VoiceSession>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Desconecta y elimina todas las sesiones (apagado del proceso).
    pub async fn shutdown_all(&self) {
        let sessions = self.sessions();
        let results = futures::future::join_all(
            sessions.iter().map(|session| session.disconnect()),
        )
        .await;

        for (session, result) in sessions.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    "⚠️ Error desconectando la sesión de guild {}: {}",
                    session.guild_id(),
                    e
                );
            }
        }

        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    use crate::audio::source::PcmStream;
    use crate::sources::{ByteStream, ResolvedMedia};
    use crate::transport::VoiceConnection;
    use crate::ChannelId;

    /// Colaboradores inertes: el registro no los invoca hasta conectar.
    struct Inert;

    #[async_trait]
    impl VoiceTransport for Inert {
        async fn connect(&self, _channel: ChannelId) -> Result<Box<dyn VoiceConnection>> {
            anyhow::bail!("sin transporte en este test")
        }
    }

    #[async_trait]
    impl MediaResolver for Inert {
        async fn search(&self, _query: &str) -> Result<ResolvedMedia> {
            anyhow::bail!("sin resolver en este test")
        }

        async fn open_audio(&self, _url: &str) -> Result<ByteStream> {
            anyhow::bail!("sin resolver en este test")
        }
    }

    #[async_trait]
    impl PcmTranscoder for Inert {
        async fn transcode(&self, _input: ByteStream) -> Result<PcmStream> {
            anyhow::bail!("sin transcoder en este test")
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for Inert {
        async fn synthesize(&self, _text: &str) -> Result<Bytes> {
            anyhow::bail!("sin sintetizador en este test")
        }
    }

    fn registry() -> Arc<SessionRegistry> {
        let inert = Arc::new(Inert);
        Arc::new(SessionRegistry::new(
            Config::default(),
            inert.clone(),
            inert.clone(),
            inert.clone(),
            inert,
        ))
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_instance() {
        let registry = registry();
        let a = registry.get_or_create(GuildId(1));
        let b = registry.get_or_create(GuildId(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        let other = registry.get_or_create(GuildId(2));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_builds_one_session() {
        let registry = registry();

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(GuildId(7)) })
            })
            .collect();

        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.expect("task should not panic"));
        }

        let first = &sessions[0];
        assert!(sessions.iter().all(|s| Arc::ptr_eq(first, s)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_get_does_not_create() {
        let registry = registry();
        assert!(registry.get(GuildId(1)).is_none());
        assert!(registry.is_empty());

        registry.get_or_create(GuildId(1));
        assert!(registry.get(GuildId(1)).is_some());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = registry();
        registry.get_or_create(GuildId(1));

        assert!(registry.remove(GuildId(1)).await);
        assert!(!registry.remove(GuildId(1)).await);
        assert!(registry.is_empty());
    }
}
