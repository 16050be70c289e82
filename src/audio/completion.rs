use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Señalización de finalización por clave, al estilo one-shot.
///
/// Cada clave registrada tiene un canal que se resuelve exactamente una vez
/// cuando la fuente se elimina del mezclador. Esperar por una clave ausente
/// resuelve de inmediato (ya completó o nunca existió). Varios esperadores
/// sobre la misma clave resuelven todos con la misma señal.
pub(crate) struct CompletionSet {
    channels: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl CompletionSet {
    pub(crate) fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Registra una clave pendiente. Debe llamarse al instalar la fuente.
    pub(crate) fn register(&self, id: &str) {
        let (tx, _rx) = watch::channel(false);
        self.channels.lock().insert(id.to_string(), tx);
    }

    /// Resuelve la clave y la elimina. Devuelve si estaba registrada.
    pub(crate) fn complete(&self, id: &str) -> bool {
        match self.channels.lock().remove(id) {
            Some(tx) => {
                // Despierta a todos los esperadores antes de soltar el canal
                tx.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Resuelve todas las claves registradas (teardown del mezclador).
    pub(crate) fn complete_all(&self) {
        for (_, tx) in self.channels.lock().drain() {
            tx.send_replace(true);
        }
    }

    /// Espera a que la clave se resuelva; inmediato si no está registrada.
    pub(crate) async fn wait(&self, id: &str) {
        let mut rx = match self.channels.lock().get(id) {
            Some(tx) => tx.subscribe(),
            None => return,
        };

        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // Canal cerrado cuenta como completado
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
