//! The `tsocketd` demonstration daemon.
//!
//! Serves a single `greet` event: clients send `{"name": "..."}` and receive
//! a greeting on `greet:reply`. Invalid input is answered on the event's
//! response channel with `{"code": 400, "message": "bad input"}`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::OrthoError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use tsocket_config::Config;

use crate::event::{EventDefinition, HandlerError, define_event};
use crate::lifecycle::{BoundAddress, LifecycleError, ListenOptions, Server};
use crate::schema::{Shape, Typed};
use crate::telemetry::{self, TelemetryError};
use crate::{ConnectionContext, FailureEnvelope};

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Time allowed for connections to finish after a shutdown request.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Event on which greetings are sent.
pub const GREET_REPLY_EVENT: &str = "greet:reply";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that returns a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader(pub Config);

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.0.clone())
    }
}

/// Errors surfaced while running the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        #[source]
        source: TelemetryError,
    },
    /// Registering events or binding the listener failed.
    #[error("failed to start server: {source}")]
    Server {
        #[source]
        source: LifecycleError,
    },
}

impl From<LifecycleError> for DaemonError {
    fn from(source: LifecycleError) -> Self {
        Self::Server { source }
    }
}

#[derive(Debug, Deserialize)]
struct Greet {
    name: String,
}

#[derive(Debug, Serialize)]
struct Greeting {
    greeting: String,
}

#[derive(Debug, Serialize)]
struct ErrorReply {
    code: u16,
    message: String,
}

/// The `greet` event served by the daemon.
pub fn greet_event() -> EventDefinition {
    define_event(Typed::<Greet>::new(Shape::object([("name", Shape::string())])))
        .handler(|input: Greet, ctx: ConnectionContext| async move {
            let greeting = Greeting {
                greeting: format!("hello {}!", input.name),
            };
            ctx.emit(GREET_REPLY_EVENT, &greeting)?;
            Ok::<_, HandlerError>(greeting)
        })
        .on_error(|failure: FailureEnvelope, _ctx| async move {
            let reply = match failure.handler_error() {
                Some(cause) => ErrorReply {
                    code: cause.code().unwrap_or(500),
                    message: cause.message().to_owned(),
                },
                None => ErrorReply {
                    code: 400,
                    message: "bad input".to_owned(),
                },
            };
            Ok::<_, HandlerError>(reply)
        })
}

/// Events registered by the daemon.
pub fn daemon_events() -> Vec<(&'static str, EventDefinition)> {
    vec![("greet", greet_event())]
}

/// A running daemon.
#[derive(Debug)]
pub struct Daemon {
    server: Server,
    address: BoundAddress,
}

impl Daemon {
    /// Initialises telemetry, registers events and starts listening.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError`] when telemetry, registration or binding fails.
    pub async fn start(config: &Config) -> Result<Self, DaemonError> {
        telemetry::initialise(config).map_err(|source| DaemonError::Telemetry { source })?;
        let server = Server::new();
        server
            .init(daemon_events())
            .map_err(LifecycleError::from)?;
        let address = server.listen(ListenOptions::from_config(config)).await?;
        Ok(Self { server, address })
    }

    /// Address clients connect to.
    #[must_use]
    pub const fn address(&self) -> &BoundAddress {
        &self.address
    }

    /// Underlying server.
    #[must_use]
    pub const fn server(&self) -> &Server {
        &self.server
    }

    /// Disconnects every client and closes the listener, waiting at most
    /// [`SHUTDOWN_GRACE`] for connections to finish.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Server`] when the server was not listening.
    pub async fn shutdown(self) -> Result<(), DaemonError> {
        self.server.disconnect_all();
        match tokio::time::timeout(SHUTDOWN_GRACE, self.server.close()).await {
            Ok(result) => result?,
            Err(_) => warn!(
                target: DAEMON_TARGET,
                open_connections = self.server.connection_count(),
                "connections still open after shutdown grace period"
            ),
        }
        Ok(())
    }
}

/// Loads configuration, serves until `shutdown` resolves, then closes.
///
/// # Errors
///
/// Returns [`DaemonError`] when any start-up step fails.
pub async fn run_daemon_with<L, S>(loader: &L, shutdown: S) -> Result<(), DaemonError>
where
    L: ConfigLoader,
    S: Future<Output = ()>,
{
    let config = loader
        .load()
        .map_err(|source| DaemonError::Configuration { source })?;
    let daemon = Daemon::start(&config).await?;
    info!(
        target: DAEMON_TARGET,
        address = %daemon.address(),
        "tsocketd ready"
    );
    shutdown.await;
    info!(target: DAEMON_TARGET, "shutdown requested");
    daemon.shutdown().await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::channel::derive_response_channel;
    use crate::connection::{ConnectionHub, PeerAddr};
    use crate::dispatch::{DispatchOutcome, Dispatcher};
    use crate::protocol::{InboundMessage, OutboundMessage};
    use crate::registry::EventRegistry;

    async fn dispatch_greet(data: serde_json::Value) -> (DispatchOutcome, Vec<OutboundMessage>) {
        let registry = Arc::new(EventRegistry::new());
        registry.register(daemon_events()).expect("register");
        let hub = Arc::new(ConnectionHub::new());
        let (ctx, mut outbox) = ConnectionContext::open(&hub, PeerAddr::InProcess);
        let outcome = Dispatcher::new(registry)
            .connect(ctx)
            .dispatch(InboundMessage::new("greet", data))
            .await
            .expect("dispatch");
        let mut sent = Vec::new();
        while let Ok(message) = outbox.try_recv() {
            sent.push(message);
        }
        (outcome, sent)
    }

    #[tokio::test]
    async fn greet_replies_with_a_greeting() {
        let (outcome, sent) = dispatch_greet(json!({"name": "Ada"})).await;
        assert!(matches!(outcome, DispatchOutcome::Handled { .. }));
        assert_eq!(
            sent,
            vec![OutboundMessage::new(
                GREET_REPLY_EVENT,
                json!({"greeting": "hello Ada!"})
            )]
        );
    }

    #[tokio::test]
    async fn invalid_greet_gets_bad_input() {
        let (_outcome, sent) = dispatch_greet(json!({})).await;
        assert_eq!(
            sent,
            vec![OutboundMessage::new(
                derive_response_channel("greet").into_string(),
                json!({"code": 400, "message": "bad input"})
            )]
        );
    }

    #[tokio::test]
    async fn run_daemon_with_stops_when_shutdown_resolves() {
        let config = Config {
            listen_socket: tsocket_config::SocketEndpoint::tcp("127.0.0.1", 0),
            log_filter: "off".to_owned(),
            ..Config::default()
        };
        run_daemon_with(&StaticConfigLoader(config), async {})
            .await
            .expect("daemon runs and shuts down");
    }
}
