//! Event definitions: schema, handler and optional error handler.
//!
//! Definitions are built with [`define_event`] and are otherwise opaque, so
//! every value registered with a server is known to have passed through the
//! builder.
//!
//! ```
//! use serde::Deserialize;
//! use tsocket::schema::{Shape, Typed};
//! use tsocket::{ConnectionContext, HandlerError, define_event};
//!
//! #[derive(Deserialize)]
//! struct Greet {
//!     name: String,
//! }
//!
//! let greet = define_event(Typed::<Greet>::new(Shape::object([("name", Shape::string())])))
//!     .handler(|input: Greet, ctx: ConnectionContext| async move {
//!         ctx.emit("greet:reply", &format!("hello {}", input.name))?;
//!         Ok::<_, HandlerError>(())
//!     })
//!     .on_error(|_failure, _ctx| async { Ok::<_, HandlerError>("bad input") });
//! assert!(greet.has_error_handler());
//! ```

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::connection::{ConnectionContext, EmitError};
use crate::dispatch::FailureEnvelope;
use crate::schema::{Schema, ValidationFailure};

/// Failure raised by an event or error handler.
///
/// Carries a message, an optional numeric code and an optional underlying
/// cause. Serialises as `{"message": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    code: Option<u16>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl HandlerError {
    /// Builds an error with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Attaches a numeric code.
    #[must_use]
    pub const fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn caused_by(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Builds an error from a caught panic payload.
    #[must_use]
    pub fn panicked(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "opaque panic payload".to_owned());
        Self::new(format!("handler panicked: {detail}"))
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Numeric code, when one was attached.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        self.code
    }

    fn output_encoding(source: serde_json::Error) -> Self {
        Self::new("failed to serialise handler output").caused_by(source)
    }
}

impl From<EmitError> for HandlerError {
    fn from(error: EmitError) -> Self {
        Self::new(error.to_string()).caused_by(error)
    }
}

impl Serialize for HandlerError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("HandlerError", 2)?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field("code", &self.code)?;
        state.end()
    }
}

/// Boxed handler future yielding the JSON-encoded output.
pub(crate) type HandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;

/// Validates a payload and, on success, starts the handler.
pub(crate) trait EventPipeline: Send + Sync {
    fn prepare(
        &self,
        raw: &Value,
        ctx: ConnectionContext,
    ) -> Result<HandlerFuture, ValidationFailure>;
}

/// Turns a failure into the payload sent on the response channel.
pub(crate) trait ErrorPipeline: Send + Sync {
    fn route(&self, failure: FailureEnvelope, ctx: ConnectionContext) -> HandlerFuture;
}

struct TypedPipeline<S, H, Fut, R> {
    schema: S,
    handler: Arc<H>,
    _output: PhantomData<fn() -> (Fut, R)>,
}

impl<S, H, Fut, R> EventPipeline for TypedPipeline<S, H, Fut, R>
where
    S: Schema,
    H: Fn(S::Output, ConnectionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: Serialize + 'static,
{
    fn prepare(
        &self,
        raw: &Value,
        ctx: ConnectionContext,
    ) -> Result<HandlerFuture, ValidationFailure> {
        let input = self.schema.validate(raw)?;
        let handler = Arc::clone(&self.handler);
        Ok(async move {
            let output = handler(input, ctx).await?;
            serde_json::to_value(&output).map_err(HandlerError::output_encoding)
        }
        .boxed())
    }
}

struct ErrorHandlerPipeline<E, Fut, R> {
    handler: Arc<E>,
    _output: PhantomData<fn() -> (Fut, R)>,
}

impl<E, Fut, R> ErrorPipeline for ErrorHandlerPipeline<E, Fut, R>
where
    E: Fn(FailureEnvelope, ConnectionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: Serialize + 'static,
{
    fn route(&self, failure: FailureEnvelope, ctx: ConnectionContext) -> HandlerFuture {
        let handler = Arc::clone(&self.handler);
        async move {
            let output = handler(failure, ctx).await?;
            serde_json::to_value(&output).map_err(HandlerError::output_encoding)
        }
        .boxed()
    }
}

/// Starts an event definition from its input schema.
pub fn define_event<S: Schema>(schema: S) -> EventBuilder<S> {
    EventBuilder { schema }
}

/// Intermediate builder holding the schema until a handler is supplied.
#[derive(Debug)]
#[must_use = "an event needs a handler before it can be registered"]
pub struct EventBuilder<S> {
    schema: S,
}

impl<S: Schema> EventBuilder<S> {
    /// Supplies the handler invoked with validated input.
    ///
    /// The handler's output is returned to the dispatcher's caller and is not
    /// sent to the client; handlers reply with [`ConnectionContext::emit`].
    pub fn handler<H, Fut, R>(self, handler: H) -> EventDefinition
    where
        H: Fn(S::Output, ConnectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
        R: Serialize + 'static,
    {
        EventDefinition {
            pipeline: Arc::new(TypedPipeline {
                schema: self.schema,
                handler: Arc::new(handler),
                _output: PhantomData,
            }),
            error_handler: None,
        }
    }
}

/// Immutable description of one event, ready for registration.
#[must_use]
pub struct EventDefinition {
    pipeline: Arc<dyn EventPipeline>,
    error_handler: Option<Arc<dyn ErrorPipeline>>,
}

impl EventDefinition {
    /// Attaches an error handler whose result is sent on the event's
    /// response channel when validation or the handler fails.
    ///
    /// An error returned by the error handler itself is not routed again; it
    /// ends processing of the message with
    /// [`DispatchError::ErrorHandler`](crate::DispatchError::ErrorHandler).
    pub fn on_error<E, Fut, R>(mut self, handler: E) -> Self
    where
        E: Fn(FailureEnvelope, ConnectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
        R: Serialize + 'static,
    {
        self.error_handler = Some(Arc::new(ErrorHandlerPipeline {
            handler: Arc::new(handler),
            _output: PhantomData,
        }));
        self
    }

    /// Whether an error handler is attached.
    #[must_use]
    pub fn has_error_handler(&self) -> bool {
        self.error_handler.is_some()
    }

    pub(crate) fn pipeline(&self) -> &dyn EventPipeline {
        self.pipeline.as_ref()
    }

    pub(crate) fn error_handler(&self) -> Option<&dyn ErrorPipeline> {
        self.error_handler.as_deref()
    }
}

impl fmt::Debug for EventDefinition {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EventDefinition")
            .field("has_error_handler", &self.has_error_handler())
            .finish_non_exhaustive()
    }
}
