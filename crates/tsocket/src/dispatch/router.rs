//! Routes failures to error handlers and the response channel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error};

use super::{DISPATCH_TARGET, DispatchError, DispatchOutcome, FailureEnvelope};
use crate::connection::ConnectionContext;
use crate::event::HandlerError;
use crate::registry::RegisteredEvent;

/// Sends one failure to its event's response channel.
pub(crate) struct ErrorRouter;

impl ErrorRouter {
    /// Invokes the error handler, if any, and emits its result (or `null`) on
    /// the event's response channel exactly once.
    ///
    /// A failing error handler emits nothing and is returned as
    /// [`DispatchError::ErrorHandler`].
    pub(crate) async fn route(
        event: Arc<RegisteredEvent>,
        failure: FailureEnvelope,
        ctx: ConnectionContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        let kind = failure.kind();
        debug!(
            target: DISPATCH_TARGET,
            connection = %ctx.id(),
            event = %event.name(),
            kind = %kind,
            failure = %failure,
            "routing failure"
        );

        let payload = match event.definition().error_handler() {
            Some(handler) => {
                let outcome = AssertUnwindSafe(handler.route(failure, ctx.clone()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(HandlerError::panicked(&*panic)));
                match outcome {
                    Ok(payload) => payload,
                    Err(source) => {
                        error!(
                            target: DISPATCH_TARGET,
                            connection = %ctx.id(),
                            event = %event.name(),
                            error = %source,
                            "error handler failed"
                        );
                        return Err(DispatchError::error_handler(event.name(), source));
                    }
                }
            }
            None => Value::Null,
        };

        ctx.emit_value(event.channel().as_str(), payload.clone());
        Ok(DispatchOutcome::Rejected {
            event: event.name().to_owned(),
            channel: event.channel().clone(),
            kind,
            payload,
        })
    }
}
