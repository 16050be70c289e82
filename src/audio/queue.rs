use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::info;

/// Descriptor inmutable de una pista encolada.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedTrack {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub queued_at: DateTime<Utc>,
}

impl QueuedTrack {
    pub fn new(title: impl Into<String>, url: impl Into<String>, duration: Option<Duration>) -> Self {
        Self {
            id: format!("{:016x}{:016x}", fastrand::u64(..), fastrand::u64(..)),
            title: title.into(),
            url: url.into(),
            duration,
            queued_at: Utc::now(),
        }
    }
}

/// Cola FIFO sin límite con señal de conteo.
///
/// Varios productores encolan; exactamente un consumidor (el bucle de la
/// sesión) espera en `pop`. La señal es un semáforo contador, igual que el
/// par ConcurrentQueue + SemaphoreSlim clásico: un permiso por pista.
pub struct TrackQueue {
    items: Mutex<VecDeque<QueuedTrack>>,
    signal: Semaphore,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            signal: Semaphore::new(0),
        }
    }

    /// Encola una pista y despierta al consumidor.
    ///
    /// Devuelve la posición de la pista entre las pendientes (0 = siguiente).
    pub fn push(&self, track: QueuedTrack) -> usize {
        self.push_with(track, || false)
    }

    /// Encola una pista calculando su posición de reproducción bajo el mismo
    /// lock con el que el consumidor reclama pistas: `playing` se evalúa con
    /// la cola bloqueada, así una pista a medio reclamar en `pop_claiming`
    /// nunca queda fuera de la cuenta.
    pub fn push_with(&self, track: QueuedTrack, playing: impl FnOnce() -> bool) -> usize {
        let position = {
            let mut items = self.items.lock();
            let position = items.len() + usize::from(playing());
            info!("➕ Agregado a la cola: {}", track.title);
            items.push_back(track);
            position
        };
        self.signal.add_permits(1);
        position
    }

    /// Espera a que haya una pista y la saca de la cola.
    ///
    /// Puede devolver `None` si la cola fue limpiada entre la señal y la
    /// extracción; el consumidor simplemente vuelve a esperar.
    pub async fn pop(&self) -> Option<QueuedTrack> {
        self.pop_claiming(|_| {}).await
    }

    /// Como `pop`, pero ejecuta `claim` con la pista todavía bajo el lock de
    /// la cola: el consumidor la marca como sonando en el mismo instante en
    /// que deja de estar pendiente, sin ventana intermedia.
    pub async fn pop_claiming(&self, claim: impl FnOnce(&QueuedTrack)) -> Option<QueuedTrack> {
        match self.signal.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return None,
        }

        let mut items = self.items.lock();
        let track = items.pop_front();
        if let Some(track) = &track {
            claim(track);
        }
        track
    }

    /// Vacía la cola y consume las señales pendientes.
    pub fn clear(&self) {
        let removed = {
            let mut items = self.items.lock();
            let n = items.len();
            items.clear();
            n
        };

        while let Ok(permit) = self.signal.try_acquire() {
            permit.forget();
        }

        if removed > 0 {
            info!("🗑️ Cola limpiada ({} pistas)", removed);
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copia instantánea de las pistas pendientes, en orden.
    pub fn snapshot(&self) -> Vec<QueuedTrack> {
        self.items.lock().iter().cloned().collect()
    }
}

impl Default for TrackQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn track(title: &str) -> QueuedTrack {
        QueuedTrack::new(title, format!("https://example.com/{title}"), None)
    }

    #[tokio::test]
    async fn test_push_reports_pending_position() {
        let queue = TrackQueue::new();
        assert_eq!(queue.push(track("t1")), 0);
        assert_eq!(queue.push(track("t2")), 1);
        assert_eq!(queue.push(track("t3")), 2);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn test_pop_is_strict_fifo() {
        let queue = TrackQueue::new();
        queue.push(track("t1"));
        queue.push(track("t2"));

        assert_eq!(queue.pop().await.map(|t| t.title), Some("t1".to_string()));
        assert_eq!(queue.pop().await.map(|t| t.title), Some("t2".to_string()));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(TrackQueue::new());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!consumer.is_finished());

        queue.push(track("t1"));
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("pop should resolve after push")
            .expect("consumer task should not panic");
        assert_eq!(popped.map(|t| t.title), Some("t1".to_string()));
    }

    #[tokio::test]
    async fn test_clear_drains_items_and_signals() {
        let queue = Arc::new(TrackQueue::new());
        queue.push(track("t1"));
        queue.push(track("t2"));
        queue.clear();

        assert!(queue.is_empty());

        // Sin señales residuales: un pop posterior espera una pista nueva
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!consumer.is_finished());

        queue.push(track("t3"));
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("pop should resolve")
            .expect("consumer task should not panic");
        assert_eq!(popped.map(|t| t.title), Some("t3".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_push_during_claim_counts_the_claimed_track() {
        let queue = Arc::new(TrackQueue::new());
        let current: Arc<Mutex<Option<QueuedTrack>>> = Arc::new(Mutex::new(None));
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();

        queue.push(track("t1"));

        let consumer = {
            let queue = queue.clone();
            let current = current.clone();
            tokio::spawn(async move {
                queue
                    .pop_claiming(move |track| {
                        *current.lock() = Some(track.clone());
                        let _ = entered_tx.send(());
                        std::thread::sleep(Duration::from_millis(50));
                    })
                    .await
            })
        };

        entered_rx.await.expect("claim should run");

        // El consumidor está reclamando t1 bajo el lock de la cola: la pista
        // encolada ahora la cuenta como sonando, nunca posición 0
        let playing = current.clone();
        let position = queue.push_with(track("t2"), || playing.lock().is_some());
        assert_eq!(position, 1);

        let popped = consumer.await.expect("consumer should not panic");
        assert_eq!(popped.map(|t| t.title), Some("t1".to_string()));
    }

    #[test]
    fn test_tracks_get_unique_ids() {
        let a = track("t1");
        let b = track("t1");
        assert_ne!(a.id, b.id);
    }
}
