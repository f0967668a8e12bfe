use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::documents::DocumentStore;
use crate::services::mailer::Mailer;
use crate::store::Store;
use crate::workers::queue::GenerationQueue;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    documents: Arc<dyn DocumentStore>,
    mailer: Arc<dyn Mailer>,
    generation: GenerationQueue,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        documents: Arc<dyn DocumentStore>,
        mailer: Arc<dyn Mailer>,
        generation: GenerationQueue,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            documents,
            mailer,
            generation,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn documents(&self) -> &dyn DocumentStore {
        self.documents.as_ref()
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    pub fn generation(&self) -> &GenerationQueue {
        &self.generation
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::{broadcast, mpsc};

    use super::*;
    use crate::documents::MemoryDocumentStore;
    use crate::services::mailer::MemoryMailer;
    use crate::store::test_support::temp_store;
    use crate::workers::queue::GenerationJob;

    type Fixture = (tempfile::TempDir, AppState, mpsc::Receiver<GenerationJob>);

    fn state(tx: broadcast::Sender<()>) -> Fixture {
        let (dir, store) = temp_store("state.sled");
        let (queue, rx) = GenerationQueue::new(2);
        let state = AppState::new(
            Arc::new(store),
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryMailer::new()),
            queue,
            &Config::from_env(),
            tx,
        );
        (dir, state, rx)
    }

    #[tokio::test]
    async fn shutdown_receiver_can_clone() {
        let (tx, _) = broadcast::channel(4);
        let (_dir, state, _rx) = state(tx.clone());

        let mut rx1 = state.shutdown_rx();
        let mut rx2 = state.shutdown_rx();
        tx.send(()).unwrap();
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();
    }

    #[tokio::test]
    async fn cloned_state_shares_generation_queue() {
        let (tx, _) = broadcast::channel(4);
        let (_dir, state, _rx) = state(tx);
        let clone = state.clone();
        assert_eq!(clone.generation().available(), 2);
        state
            .generation()
            .enqueue(GenerationJob {
                topic_id: "t1".to_string(),
                title: "Rust".to_string(),
                description: String::new(),
            })
            .unwrap();
        assert_eq!(clone.generation().available(), 1);
    }
}
