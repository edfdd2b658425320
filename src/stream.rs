use crate::engine::alert::Alert;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct AlertListener {
    id: u64,
    rx: mpsc::Receiver<Alert>,
}

impl AlertListener {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next alert, or None once the stream is gone.
    pub async fn recv(&mut self) -> Option<Alert> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Alert> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Listeners whose buffer was full; the alert was dropped for them only.
    pub dropped: usize,
    /// Listeners found closed and unregistered.
    pub removed: usize,
}

/// Best-effort alert fan-out. Each listener has its own bounded buffer, so a
/// slow or vanished listener never blocks delivery to the others.
pub struct AlertStream {
    listeners: Mutex<Vec<(u64, mpsc::Sender<Alert>)>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl AlertStream {
    pub fn new(buffer: usize) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self) -> AlertListener {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, tx));
        AlertListener { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn publish(&self, alert: &Alert) -> PublishReport {
        let mut report = PublishReport::default();
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|(id, tx)| match tx.try_send(alert.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(listener = id, alert_id = alert.id, "listener buffer full, alert dropped");
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.removed += 1;
                false
            }
        });
        report
    }
}
