//! Simple stateless pub-sub event handler
//!
//! Outer layers (notifications, email, analytics) subscribe to settlement engine events through this module. Handlers
//! are stateless: all they receive is the event itself. They can be async.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight handlers to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Drop our own sender so the loop ends once the last producer goes away.
        drop(self.sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.spawn(async move {
                (handler)(ev).await;
            });
            // Reap whatever has already finished so the set does not grow without bound.
            while let Some(done) = jobs.try_join_next() {
                if let Err(e) = done {
                    warn!("📬️ Event handler task failed: {e}");
                }
            }
        }
        if !jobs.is_empty() {
            debug!("📬️ Waiting for {} jobs to complete", jobs.len());
        }
        while let Some(done) = jobs.join_next().await {
            if let Err(e) = done {
                warn!("📬️ Event handler task failed: {e}");
            }
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}
