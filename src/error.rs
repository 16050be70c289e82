use thiserror::Error;

/// Errores visibles en la frontera de una sesión de voz.
///
/// Los fallos a nivel de fuente (`Resolve`, `Transcode`, `Synthesis`) quedan
/// contenidos a la operación que los provocó; los fallos de transporte
/// (`Connect`, `Transport`) son fatales para la sesión.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Precondición: la operación requiere una conexión de voz activa.
    #[error("not connected to a voice channel")]
    NotConnected,

    /// No se pudo establecer la conexión de voz.
    #[error("voice connect failed: {0:#}")]
    Connect(anyhow::Error),

    /// El transporte de voz falló con la sesión ya establecida.
    #[error("voice transport failed: {0:#}")]
    Transport(anyhow::Error),

    /// La búsqueda o apertura de medios falló.
    #[error("media resolve failed: {0:#}")]
    Resolve(anyhow::Error),

    /// La transcodificación a PCM falló.
    #[error("transcode failed: {0:#}")]
    Transcode(anyhow::Error),

    /// La síntesis de voz falló.
    #[error("speech synthesis failed: {0:#}")]
    Synthesis(anyhow::Error),
}

impl SessionError {
    /// Indica si el error es fatal para la sesión (transporte) o queda
    /// contenido a la fuente/pista afectada.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_level_errors_are_not_fatal() {
        assert!(!SessionError::NotConnected.is_fatal());
        assert!(!SessionError::Resolve(anyhow::anyhow!("no match")).is_fatal());
        assert!(SessionError::Transport(anyhow::anyhow!("write failed")).is_fatal());
    }
}
