use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{EventHandler, EventProducer, Handler, RefundUpdatedEvent, TransactionSettledEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub transaction_settled_producer: Vec<EventProducer<TransactionSettledEvent>>,
    pub refund_updated_producer: Vec<EventProducer<RefundUpdatedEvent>>,
}

impl EventProducers {
    pub async fn publish_transaction_settled(&self, event: TransactionSettledEvent) {
        for emitter in &self.transaction_settled_producer {
            trace!("📬️ Notifying transaction settled hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_refund_updated(&self, event: RefundUpdatedEvent) {
        for emitter in &self.refund_updated_producer {
            trace!("📬️ Notifying refund updated hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_transaction_settled: Option<EventHandler<TransactionSettledEvent>>,
    pub on_refund_updated: Option<EventHandler<RefundUpdatedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_transaction_settled = hooks.on_transaction_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_updated = hooks.on_refund_updated.map(|f| EventHandler::new(buffer_size, f));
        Self { on_transaction_settled, on_refund_updated }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_transaction_settled {
            result.transaction_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_updated {
            result.refund_updated_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_transaction_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_updated {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_transaction_settled: Option<Handler<TransactionSettledEvent>>,
    pub on_refund_updated: Option<Handler<RefundUpdatedEvent>>,
}

impl EventHooks {
    pub fn on_transaction_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transaction_settled = Some(Arc::new(f));
        self
    }

    pub fn on_refund_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_refund_updated = Some(Arc::new(f));
        self
    }
}
