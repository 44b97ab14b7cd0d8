use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_channel::{Receiver, Sender};

use crate::analytics::{EventBatch, EventTransport};

/// Transport double that records every batch and answers from a script.
///
/// Outcomes queued with [`ScriptedTransport::push_outcome`] are consumed in order; once the
/// script runs out every call succeeds. [`ScriptedTransport::hold_next`] parks the next call until
/// the returned sender fires, which lets tests observe a flush while it is in flight.
#[derive(Clone)]
pub struct ScriptedTransport {
    outcomes: Arc<Mutex<VecDeque<bool>>>,
    sent: Arc<Mutex<Vec<EventBatch>>>,
    gate: Arc<Mutex<Option<Receiver<()>>>>,
    entered_tx: Sender<()>,
    entered_rx: Receiver<()>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        let (entered_tx, entered_rx) = async_channel::unbounded();
        Self {
            outcomes: Arc::default(),
            sent: Arc::default(),
            gate: Arc::default(),
            entered_tx,
            entered_rx,
        }
    }
}

impl ScriptedTransport {
    pub fn push_outcome(&self, delivered: bool) {
        self.outcomes.lock().unwrap().push_back(delivered);
    }

    pub fn fail_next(&self, times: usize) {
        for _ in 0..times {
            self.push_outcome(false);
        }
    }

    pub fn hold_next(&self) -> Sender<()> {
        let (release_tx, release_rx) = async_channel::bounded(1);
        *self.gate.lock().unwrap() = Some(release_rx);
        release_tx
    }

    /// Resolves once a held call has started.
    pub async fn wait_until_entered(&self) {
        let _ = self.entered_rx.recv().await;
    }

    pub fn sent(&self) -> Vec<EventBatch> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_event_names(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .flat_map(|batch| batch.events.into_iter().map(|event| event.name))
            .collect()
    }
}

#[async_trait::async_trait]
impl EventTransport for ScriptedTransport {
    async fn send(&self, batch: &EventBatch) -> bool {
        let gate = self.gate.lock().unwrap().take();
        if let Some(release) = gate {
            let _ = self.entered_tx.send(()).await;
            let _ = release.recv().await;
        }
        self.sent.lock().unwrap().push(batch.clone());
        self.outcomes.lock().unwrap().pop_front().unwrap_or(true)
    }
}
