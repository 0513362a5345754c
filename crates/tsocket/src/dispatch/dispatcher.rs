//! Per-connection event routing.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde_json::Value;
use tracing::{debug, warn};

use super::router::ErrorRouter;
use super::{DISPATCH_TARGET, DispatchError, FailureEnvelope, FailureKind};
use crate::channel::ResponseChannel;
use crate::connection::ConnectionContext;
use crate::event::HandlerError;
use crate::protocol::InboundMessage;
use crate::registry::{EventRegistry, EventTable};

/// Result of processing one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The handler succeeded; `output` is its JSON-encoded return value.
    Handled { event: String, output: Value },
    /// Validation or the handler failed and `payload` was sent on `channel`.
    Rejected {
        event: String,
        channel: ResponseChannel,
        kind: FailureKind,
        payload: Value,
    },
    /// No registered event has this name; nothing was sent.
    Unroutable { event: String },
}

/// Creates per-connection dispatchers over a shared registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<EventRegistry>,
}

impl Dispatcher {
    /// Builds a dispatcher reading from `registry`.
    #[must_use]
    pub const fn new(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    /// Subscribes a new connection to every registered event.
    ///
    /// The subscription set is fixed here; events are never added to or
    /// removed from a live connection.
    #[must_use]
    pub fn connect(&self, ctx: ConnectionContext) -> ConnectionDispatcher {
        let subscriptions = self.registry.table();
        debug!(
            target: DISPATCH_TARGET,
            connection = %ctx.id(),
            subscriptions = subscriptions.len(),
            "connection subscribed"
        );
        ConnectionDispatcher { ctx, subscriptions }
    }
}

/// Routes messages arriving on one connection.
#[derive(Debug, Clone)]
pub struct ConnectionDispatcher {
    ctx: ConnectionContext,
    subscriptions: EventTable,
}

impl ConnectionDispatcher {
    /// Connection this dispatcher serves.
    #[must_use]
    pub const fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Whether the connection is subscribed to `event`.
    #[must_use]
    pub fn is_subscribed(&self, event: &str) -> bool {
        self.subscriptions.contains_key(event)
    }

    /// Number of subscribed events.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Processes `message`.
    ///
    /// Lookup and validation run before this returns, so calling `dispatch`
    /// in delivery order starts processing in delivery order even when the
    /// returned futures run concurrently. Handler panics are caught and
    /// routed like handler errors.
    ///
    /// # Errors
    ///
    /// The returned future fails with [`DispatchError::ErrorHandler`] when the
    /// event's error handler fails.
    pub fn dispatch(
        &self,
        message: InboundMessage,
    ) -> BoxFuture<'static, Result<DispatchOutcome, DispatchError>> {
        let InboundMessage { event: name, data } = message;
        let Some(event) = self.subscriptions.get(&name).cloned() else {
            warn!(
                target: DISPATCH_TARGET,
                connection = %self.ctx.id(),
                event = %name,
                "dropping message for unregistered event"
            );
            return future::ready(Ok(DispatchOutcome::Unroutable { event: name })).boxed();
        };

        let ctx = self.ctx.clone();
        match event.definition().pipeline().prepare(&data, ctx.clone()) {
            Err(details) => {
                let failure = FailureEnvelope::Validation {
                    event: name,
                    details,
                };
                ErrorRouter::route(event, failure, ctx).boxed()
            }
            Ok(handler) => async move {
                let result = AssertUnwindSafe(handler)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(HandlerError::panicked(&*panic)));
                match result {
                    Ok(output) => {
                        debug!(
                            target: DISPATCH_TARGET,
                            connection = %ctx.id(),
                            event = %name,
                            "event handled"
                        );
                        Ok(DispatchOutcome::Handled {
                            event: name,
                            output,
                        })
                    }
                    Err(cause) => {
                        let failure = FailureEnvelope::Handler { event: name, cause };
                        ErrorRouter::route(event, failure, ctx).await
                    }
                }
            }
            .boxed(),
        }
    }
}
