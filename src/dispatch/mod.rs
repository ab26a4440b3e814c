//! Dispatch fabric - type-indexed message subscriptions.
//!
//! The [`Invoker`] routes each published message to the ordered handler list
//! subscribed to its concrete type, then to every blanket handler. The
//! subscription table is built once at construction via [`InvokerBuilder`];
//! publishing never mutates it, so re-entrant publishes (a raw-data
//! subscriber feeding parsed messages back in) are allowed.
//!
//! Handler kinds:
//! - [`TypedHandler<M>`] receives exactly `M`
//! - [`AnyHandler`] receives every message as `&dyn Message`
//!
//! Delivery is sequential in registration order, exact-type handlers first.
//! The first handler error aborts the remaining chain and propagates to the
//! publish site; the connection loops swallow it there so a faulty handler
//! cannot sever the session.

mod events;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use events::{Connected, Disconnected, Message, Popularity, RawData};

/// Handler for one concrete message type.
#[async_trait]
pub trait TypedHandler<M: Message>: Send + Sync {
    /// Handle a message. Errors propagate to the publish site.
    async fn handle(&self, message: &M) -> Result<()>;
}

/// Handler receiving every message regardless of type.
#[async_trait]
pub trait AnyHandler: Send + Sync {
    /// Handle a message. Errors propagate to the publish site.
    async fn handle_any(&self, message: &dyn Message) -> Result<()>;
}

/// Ordered handler list for one message type.
struct Subscription<M: Message> {
    handlers: Vec<Arc<dyn TypedHandler<M>>>,
}

impl<M: Message> Subscription<M> {
    fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

/// Builder assembling the subscription table.
#[derive(Default)]
pub struct InvokerBuilder {
    subscriptions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    any_handlers: Vec<Arc<dyn AnyHandler>>,
}

impl InvokerBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to messages of type `M`.
    ///
    /// Handlers for the same type fire in subscription order.
    pub fn subscribe<M: Message>(mut self, handler: Arc<dyn TypedHandler<M>>) -> Self {
        let entry = self
            .subscriptions
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(Subscription::<M>::new()));

        if let Some(subscription) = entry.downcast_mut::<Subscription<M>>() {
            subscription.handlers.push(handler);
        }
        self
    }

    /// Subscribe a blanket handler receiving every message.
    pub fn subscribe_any(mut self, handler: Arc<dyn AnyHandler>) -> Self {
        self.any_handlers.push(handler);
        self
    }

    /// Freeze the table into an [`Invoker`].
    pub fn build(self) -> Invoker {
        Invoker {
            subscriptions: self.subscriptions,
            any_handlers: self.any_handlers,
        }
    }
}

/// Routes messages to their subscribed handlers.
pub struct Invoker {
    subscriptions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    any_handlers: Vec<Arc<dyn AnyHandler>>,
}

impl Invoker {
    /// Create a builder.
    pub fn builder() -> InvokerBuilder {
        InvokerBuilder::new()
    }

    /// Create an invoker with no subscriptions.
    pub fn empty() -> Self {
        InvokerBuilder::new().build()
    }

    /// Deliver `message` to every subscribed handler, sequentially.
    ///
    /// Exact-type handlers run first in subscription order, then blanket
    /// handlers. The first error aborts the chain and is returned.
    pub async fn publish<M: Message>(&self, message: &M) -> Result<()> {
        if let Some(entry) = self.subscriptions.get(&TypeId::of::<M>()) {
            if let Some(subscription) = entry.downcast_ref::<Subscription<M>>() {
                for handler in &subscription.handlers {
                    handler.handle(message).await?;
                }
            }
        }

        for handler in &self.any_handlers {
            handler.handle_any(message).await?;
        }

        Ok(())
    }

    /// Whether any handler is subscribed to type `M`.
    pub fn has_subscribers<M: Message>(&self) -> bool {
        !self.any_handlers.is_empty() || self.subscriptions.contains_key(&TypeId::of::<M>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DanmakuError;
    use std::sync::Mutex;
    use std::time::SystemTime;

    /// Appends a label to a shared log on every delivery.
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TypedHandler<Popularity> for Recorder {
        async fn handle(&self, message: &Popularity) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, message.value));
            Ok(())
        }
    }

    #[async_trait]
    impl AnyHandler for Recorder {
        async fn handle_any(&self, message: &dyn Message) -> Result<()> {
            let kind = if message.as_any().is::<Popularity>() {
                "popularity"
            } else if message.as_any().is::<Connected>() {
                "connected"
            } else {
                "other"
            };
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, kind));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl TypedHandler<Popularity> for Failing {
        async fn handle(&self, _message: &Popularity) -> Result<()> {
            Err(DanmakuError::Decode("handler failure".to_string()))
        }
    }

    fn popularity(value: u32) -> Popularity {
        Popularity {
            value,
            time: SystemTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn test_delivery_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let invoker = Invoker::builder()
            .subscribe::<Popularity>(Arc::new(Recorder {
                label: "first",
                log: log.clone(),
            }))
            .subscribe::<Popularity>(Arc::new(Recorder {
                label: "second",
                log: log.clone(),
            }))
            .build();

        invoker.publish(&popularity(5)).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first:5", "second:5"]);
    }

    #[tokio::test]
    async fn test_blanket_handler_sees_every_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let invoker = Invoker::builder()
            .subscribe_any(Arc::new(Recorder {
                label: "any",
                log: log.clone(),
            }))
            .build();

        invoker.publish(&popularity(1)).await.unwrap();
        invoker
            .publish(&Connected {
                time: SystemTime::UNIX_EPOCH,
            })
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["any:popularity", "any:connected"]);
    }

    #[tokio::test]
    async fn test_typed_handlers_run_before_blanket_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let invoker = Invoker::builder()
            .subscribe_any(Arc::new(Recorder {
                label: "any",
                log: log.clone(),
            }))
            .subscribe::<Popularity>(Arc::new(Recorder {
                label: "typed",
                log: log.clone(),
            }))
            .build();

        invoker.publish(&popularity(3)).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["typed:3", "any:popularity"]);
    }

    #[tokio::test]
    async fn test_handler_error_aborts_chain_and_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let invoker = Invoker::builder()
            .subscribe::<Popularity>(Arc::new(Failing))
            .subscribe::<Popularity>(Arc::new(Recorder {
                label: "late",
                log: log.clone(),
            }))
            .build();

        let result = invoker.publish(&popularity(1)).await;

        assert!(matches!(result, Err(DanmakuError::Decode(_))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribed_type_is_a_no_op() {
        let invoker = Invoker::empty();
        invoker.publish(&popularity(1)).await.unwrap();
        assert!(!invoker.has_subscribers::<Popularity>());
    }

    /// A raw-data subscriber that parses the document and re-enters the
    /// invoker with a typed message.
    struct PopularityParser {
        invoker: std::sync::OnceLock<Arc<Invoker>>,
    }

    #[async_trait]
    impl TypedHandler<RawData> for PopularityParser {
        async fn handle(&self, message: &RawData) -> Result<()> {
            let value = message.json["popularity"].as_u64().unwrap_or(0) as u32;
            let invoker = self.invoker.get().expect("parser wired after build");
            invoker.publish(&popularity(value)).await
        }
    }

    #[tokio::test]
    async fn test_reentrant_publish_from_parser_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let parser = Arc::new(PopularityParser {
            invoker: std::sync::OnceLock::new(),
        });

        let invoker = Arc::new(
            Invoker::builder()
                .subscribe::<RawData>(parser.clone())
                .subscribe::<Popularity>(Arc::new(Recorder {
                    label: "typed",
                    log: log.clone(),
                }))
                .build(),
        );
        parser.invoker.set(invoker.clone()).ok().unwrap();

        invoker
            .publish(&RawData {
                json: serde_json::json!({ "popularity": 42 }),
            })
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["typed:42"]);
    }
}
