//! Per-connection read, dispatch and write loop.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::TRANSPORT_TARGET;
use super::stream::{BoxedWriter, ConnectionStream, FrameReader};
use crate::connection::{ConnectionContext, ConnectionHub, ConnectionId, OutboundReceiver, PeerAddr};
use crate::dispatch::{DispatchError, DispatchOutcome, Dispatcher};
use crate::lifecycle::{DisconnectReason, LifecycleReporter};
use crate::protocol::{decode_line, encode_line};

/// Callback invoked when an error handler fails on a connection.
pub(crate) type FaultHook = Arc<dyn Fn(&DispatchError, &ConnectionContext) + Send + Sync>;

type PipelineResult = Result<DispatchOutcome, DispatchError>;

/// Settings shared by every connection on a listener.
pub(crate) struct Session {
    dispatcher: Dispatcher,
    hub: Arc<ConnectionHub>,
    max_message_bytes: usize,
    reporter: Arc<dyn LifecycleReporter>,
    fault_hook: FaultHook,
}

impl Session {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        hub: Arc<ConnectionHub>,
        max_message_bytes: usize,
        reporter: Arc<dyn LifecycleReporter>,
        fault_hook: FaultHook,
    ) -> Self {
        Self {
            dispatcher,
            hub,
            max_message_bytes,
            reporter,
            fault_hook,
        }
    }

    /// Serves one connection until the client leaves, the stream fails, an
    /// error handler fails or `disconnect` fires.
    ///
    /// Message pipelines run on this task, polled first in delivery order, so
    /// replies from handlers that do not suspend leave in delivery order.
    /// In-flight handlers are awaited before the connection is detached, so
    /// replies to the last messages still reach a half-closed client.
    pub(crate) async fn run(
        self: Arc<Self>,
        stream: ConnectionStream,
        peer: PeerAddr,
        mut disconnect: watch::Receiver<bool>,
    ) {
        let (ctx, outbox) = ConnectionContext::open(&self.hub, peer);
        let id = ctx.id();
        self.reporter.connection_opened(id, peer);

        let (reader, writer) = stream.into_split();
        let writer = tokio::spawn(write_outbound(writer, outbox, id));
        let dispatcher = self.dispatcher.connect(ctx.clone());
        let mut frames = FrameReader::new(reader, self.max_message_bytes);
        let mut in_flight = FuturesUnordered::new();

        let reason = loop {
            tokio::select! {
                biased;
                () = signalled(&mut disconnect) => break DisconnectReason::ServerShutdown,
                Some(finished) = in_flight.next(), if !in_flight.is_empty() => {
                    if self.complete(finished, &ctx) {
                        break DisconnectReason::Fault;
                    }
                }
                frame = frames.next_line() => match frame {
                    Ok(Some(line)) => match decode_line(&line) {
                        Ok(Some(message)) => {
                            in_flight.push(dispatcher.dispatch(message));
                        }
                        Ok(None) => {}
                        Err(error) => warn!(
                            target: TRANSPORT_TARGET,
                            connection = %id,
                            error = %error,
                            "dropping malformed message"
                        ),
                    },
                    Ok(None) => break DisconnectReason::ClientClosed,
                    Err(error) => {
                        warn!(
                            target: TRANSPORT_TARGET,
                            connection = %id,
                            error = %error,
                            "closing connection after read failure"
                        );
                        break DisconnectReason::Transport;
                    }
                },
            }
        };

        while let Some(finished) = in_flight.next().await {
            self.complete(finished, &ctx);
        }
        ctx.close();
        if let Err(join_error) = writer.await {
            warn!(
                target: TRANSPORT_TARGET,
                connection = %id,
                error = %join_error,
                "connection writer task failed"
            );
        }
        self.reporter.connection_closed(id, reason);
    }

    /// Logs a finished message pipeline; returns `true` when it faulted.
    fn complete(&self, finished: PipelineResult, ctx: &ConnectionContext) -> bool {
        match finished {
            Ok(outcome) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    connection = %ctx.id(),
                    outcome = ?outcome,
                    "message processed"
                );
                false
            }
            Err(fault) => {
                error!(
                    target: TRANSPORT_TARGET,
                    connection = %ctx.id(),
                    event = %fault.event(),
                    error = %fault,
                    "message processing faulted; closing connection"
                );
                (self.fault_hook)(&fault, ctx);
                true
            }
        }
    }
}

async fn write_outbound(mut writer: BoxedWriter, mut outbox: OutboundReceiver, id: ConnectionId) {
    while let Some(message) = outbox.recv().await {
        let line = match encode_line(&message) {
            Ok(line) => line,
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    connection = %id,
                    event = %message.event,
                    error = %error,
                    "dropping unencodable message"
                );
                continue;
            }
        };
        if let Err(error) = writer.write_all(&line).await {
            debug!(
                target: TRANSPORT_TARGET,
                connection = %id,
                error = %error,
                "client stopped reading"
            );
            return;
        }
        if let Err(error) = writer.flush().await {
            debug!(
                target: TRANSPORT_TARGET,
                connection = %id,
                error = %error,
                "client stopped reading"
            );
            return;
        }
    }
    if let Err(error) = writer.shutdown().await {
        debug!(
            target: TRANSPORT_TARGET,
            connection = %id,
            error = %error,
            "failed to shut down connection writer"
        );
    }
}

/// Resolves once `signal` holds `true`; never resolves if the sender is gone.
pub(super) async fn signalled(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|raised| *raised).await.is_err() {
        std::future::pending::<()>().await;
    }
}
