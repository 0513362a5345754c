//! The server: one registry, one connection hub, one listener at a time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::{
    BoundAddress, LIFECYCLE_TARGET, LifecycleError, LifecycleReporter, ListenOptions,
    StructuredLifecycleReporter,
};
use crate::connection::{ConnectionContext, ConnectionHub};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::event::EventDefinition;
use crate::registry::{EventRegistry, RegistrationError};
use crate::transport::{AcceptLoop, FaultHook, Session, SocketListener};

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed; no events registered and not listening.
    Created,
    /// Events registered; not yet listening.
    Initialized,
    /// Accepting connections.
    Listening,
    /// No longer accepting; waiting for connections to end.
    Closing,
    /// Every connection has ended.
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Listening => "listening",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

struct Running {
    address: BoundAddress,
    shutdown: watch::Sender<bool>,
    disconnect: watch::Sender<bool>,
    accept: JoinHandle<()>,
}

struct ServerState {
    phase: LifecycleState,
    binding: bool,
    running: Option<Running>,
    draining: Option<watch::Sender<bool>>,
}

/// Typed event server.
///
/// ```no_run
/// use tsocket::schema::Shape;
/// use tsocket::{HandlerError, ListenOptions, Server, define_event};
///
/// # async fn run() -> Result<(), tsocket::LifecycleError> {
/// let server = Server::new();
/// server.init([(
///     "ping",
///     define_event(Shape::Any).handler(|_input, ctx: tsocket::ConnectionContext| async move {
///         ctx.emit("pong", &())?;
///         Ok::<_, HandlerError>(())
///     }),
/// )])?;
/// let address = server.listen(ListenOptions::new().port(3000)).await?;
/// println!("listening on {address}");
/// server.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    registry: Arc<EventRegistry>,
    hub: Arc<ConnectionHub>,
    reporter: Arc<dyn LifecycleReporter>,
    fault_hook: Mutex<FaultHook>,
    state: Mutex<ServerState>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Creates a server that reports through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reporter(StructuredLifecycleReporter::new())
    }

    /// Creates a server that reports to `reporter`.
    #[must_use]
    pub fn with_reporter(reporter: impl LifecycleReporter + 'static) -> Self {
        Self {
            registry: Arc::new(EventRegistry::new()),
            hub: Arc::new(ConnectionHub::new()),
            reporter: Arc::new(reporter),
            fault_hook: Mutex::new(Arc::new(ignore_fault)),
            state: Mutex::new(ServerState {
                phase: LifecycleState::Created,
                binding: false,
                running: None,
                draining: None,
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock_state().phase
    }

    /// Registered events.
    #[must_use]
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Hub holding every live connection.
    #[must_use]
    pub const fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.hub.connection_count()
    }

    /// Address of the active listener.
    #[must_use]
    pub fn local_address(&self) -> Option<BoundAddress> {
        self.lock_state()
            .running
            .as_ref()
            .map(|running| running.address.clone())
    }

    /// Sets the callback invoked when an error handler fails.
    ///
    /// The failing connection is closed after the callback returns. Takes
    /// effect for listeners started afterwards.
    pub fn on_fault<F>(&self, hook: F)
    where
        F: Fn(&DispatchError, &ConnectionContext) + Send + Sync + 'static,
    {
        *self
            .fault_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(hook);
    }

    /// Registers the server's events.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::AlreadyInitialized`] after a successful
    /// `init` or once the server has started listening, and the registry's
    /// errors for invalid definitions. A failed call changes nothing.
    pub fn init<I, N>(&self, events: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = (N, EventDefinition)>,
        N: Into<String>,
    {
        let mut state = self.lock_state();
        if state.binding || state.phase != LifecycleState::Created {
            return Err(RegistrationError::AlreadyInitialized);
        }
        self.registry.register(events)?;
        state.phase = LifecycleState::Initialized;
        drop(state);
        self.reporter.events_registered(&self.registry.names());
        Ok(())
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// The `on_listening` callback runs exactly once, after the listener is
    /// ready and before this returns. Listening without registered events is
    /// allowed and reported as a warning.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyListening`] while a listener is active,
    /// [`LifecycleError::Closing`] while a previous listener drains and
    /// [`LifecycleError::Listener`] when binding fails.
    pub async fn listen(&self, mut options: ListenOptions) -> Result<BoundAddress, LifecycleError> {
        {
            let mut state = self.lock_state();
            if state.binding || state.running.is_some() {
                return Err(LifecycleError::AlreadyListening);
            }
            if state.phase == LifecycleState::Closing {
                return Err(LifecycleError::Closing);
            }
            if !self.registry.is_initialized() {
                self.reporter.listening_without_events();
            }
            state.binding = true;
        }

        let bound = SocketListener::bind(options.endpoint(), options.backlog_value()).await;
        let mut state = self.lock_state();
        state.binding = false;
        let listener = bound?;

        let address = listener.bound_address();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (disconnect_tx, disconnect_rx) = watch::channel(false);
        let fault_hook = Arc::clone(
            &self
                .fault_hook
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let session = Session::new(
            Dispatcher::new(Arc::clone(&self.registry)),
            Arc::clone(&self.hub),
            options.message_limit(),
            Arc::clone(&self.reporter),
            fault_hook,
        );
        let accept = tokio::spawn(
            AcceptLoop {
                listener,
                session: Arc::new(session),
                shutdown: shutdown_rx,
                disconnect: disconnect_rx,
            }
            .run(),
        );
        state.running = Some(Running {
            address: address.clone(),
            shutdown: shutdown_tx,
            disconnect: disconnect_tx,
            accept,
        });
        state.phase = LifecycleState::Listening;
        drop(state);

        self.reporter.listening(&address);
        if let Some(callback) = options.take_on_listening() {
            callback(&address);
        }
        Ok(address)
    }

    /// Stops accepting connections and waits for open ones to end.
    ///
    /// Connections are not cut: clients leave on their own, or after
    /// [`disconnect_all`](Self::disconnect_all).
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotListening`] when no listener is active.
    pub async fn close(&self) -> Result<(), LifecycleError> {
        let accept = {
            let mut state = self.lock_state();
            let Running {
                shutdown,
                disconnect,
                accept,
                ..
            } = state.running.take().ok_or(LifecycleError::NotListening)?;
            state.phase = LifecycleState::Closing;
            state.draining = Some(disconnect);
            shutdown.send_replace(true);
            accept
        };
        self.reporter.closing(self.hub.connection_count());

        if let Err(join_error) = accept.await {
            error!(
                target: LIFECYCLE_TARGET,
                error = %join_error,
                "accept loop failed"
            );
        }

        let mut state = self.lock_state();
        state.draining = None;
        state.phase = LifecycleState::Closed;
        drop(state);
        self.reporter.closed();
        Ok(())
    }

    /// Runs [`close`](Self::close) in the background and passes its error, if
    /// any, to `callback`.
    ///
    /// Must be called within a tokio runtime.
    pub fn close_with(
        self: &Arc<Self>,
        callback: impl FnOnce(Option<LifecycleError>) + Send + 'static,
    ) -> JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            callback(server.close().await.err());
        })
    }

    /// Asks every open connection to stop reading and close once its
    /// in-flight handlers finish. Returns `false` when no listener is active
    /// or draining.
    pub fn disconnect_all(&self) -> bool {
        let state = self.lock_state();
        let signal = state
            .running
            .as_ref()
            .map(|running| &running.disconnect)
            .or(state.draining.as_ref());
        let Some(signal) = signal else {
            return false;
        };
        signal.send_replace(true);
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ignore_fault(_fault: &DispatchError, _ctx: &ConnectionContext) {}

impl Drop for Server {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = state.running.take() {
            warn!(
                target: LIFECYCLE_TARGET,
                address = %running.address,
                "server dropped while listening; stopping listener"
            );
            running.shutdown.send_replace(true);
            running.disconnect.send_replace(true);
        }
        if let Some(draining) = state.draining.take() {
            draining.send_replace(true);
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Server")
            .field("state", &self.state())
            .field("events", &self.registry.names())
            .field("connections", &self.hub.connection_count())
            .finish_non_exhaustive()
    }
}
