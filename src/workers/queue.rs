use serde::Serialize;
use tokio::sync::mpsc;

/// Work item for the course generation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub topic_id: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("generation queue is full")]
    Full,
    #[error("generation queue is closed")]
    Closed,
}

/// Sending half of the bounded generation queue. Enqueueing never waits.
#[derive(Debug, Clone)]
pub struct GenerationQueue {
    tx: mpsc::Sender<GenerationJob>,
}

impl GenerationQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<GenerationJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: GenerationJob) -> Result<(), EnqueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> GenerationJob {
        GenerationJob {
            topic_id: id.to_string(),
            title: "Rust".to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let (queue, mut rx) = GenerationQueue::new(1);
        queue.enqueue(job("t1")).unwrap();
        assert_eq!(queue.enqueue(job("t2")), Err(EnqueueError::Full));
        assert_eq!(queue.available(), 0);

        assert_eq!(rx.recv().await.unwrap().topic_id, "t1");
        queue.enqueue(job("t3")).unwrap();
    }

    #[tokio::test]
    async fn dropped_receiver_closes_queue() {
        let (queue, rx) = GenerationQueue::new(4);
        drop(rx);
        assert_eq!(queue.enqueue(job("t1")), Err(EnqueueError::Closed));
    }
}
