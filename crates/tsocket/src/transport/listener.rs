//! Listener implementation for event transport sockets.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use tsocket_config::SocketEndpoint;

use super::session::{Session, signalled};
use super::stream::ConnectionStream;
use super::{ListenerError, TRANSPORT_TARGET};
use crate::connection::PeerAddr;
use crate::lifecycle::BoundAddress;

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use tokio::net::UnixListener;

const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener bound to a socket endpoint.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    pub(crate) async fn bind(
        endpoint: &SocketEndpoint,
        backlog: u32,
    ) -> Result<Self, ListenerError> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let listener = bind_tcp(endpoint, host, *port, backlog).await?;
                Ok(Self {
                    endpoint: endpoint.clone(),
                    listener: ListenerKind::Tcp(listener),
                })
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    endpoint.prepare_filesystem()?;
                    let listener = bind_unix(path.as_std_path())?;
                    Ok(Self {
                        endpoint: endpoint.clone(),
                        listener: ListenerKind::Unix(listener),
                    })
                }

                #[cfg(not(unix))]
                {
                    let _ = path;
                    Err(ListenerError::UnixUnavailable {
                        endpoint: endpoint.clone(),
                    })
                }
            }
        }
    }

    /// Address clients should connect to.
    pub(crate) fn bound_address(&self) -> BoundAddress {
        match (&self.listener, &self.endpoint) {
            (ListenerKind::Tcp(listener), SocketEndpoint::Tcp { host, port }) => listener
                .local_addr()
                .map_or_else(
                    |_| BoundAddress::Endpoint(SocketEndpoint::tcp(host.clone(), *port)),
                    BoundAddress::Tcp,
                ),
            _ => BoundAddress::Endpoint(self.endpoint.clone()),
        }
    }

    async fn accept(&self) -> io::Result<(ConnectionStream, PeerAddr)> {
        match &self.listener {
            ListenerKind::Tcp(tcp) => {
                let (stream, addr) = tcp.accept().await?;
                Ok((ConnectionStream::tcp(stream), PeerAddr::Tcp(addr)))
            }
            #[cfg(unix)]
            ListenerKind::Unix(unix) => {
                let (stream, _) = unix.accept().await?;
                Ok((ConnectionStream::unix(stream), PeerAddr::Unix))
            }
        }
    }
}

/// Accepts connections until shut down, then waits for every connection.
pub(crate) struct AcceptLoop {
    pub(crate) listener: SocketListener,
    pub(crate) session: Arc<Session>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) disconnect: watch::Receiver<bool>,
}

impl AcceptLoop {
    pub(crate) async fn run(self) {
        let Self {
            listener,
            session,
            mut shutdown,
            disconnect,
        } = self;
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %listener.endpoint,
            "socket listener active"
        );

        let mut connections = JoinSet::new();
        let mut last_error = None::<io::ErrorKind>;
        loop {
            tokio::select! {
                biased;
                () = signalled(&mut shutdown) => break,
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    log_connection_exit(finished);
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        last_error = None;
                        connections.spawn(Arc::clone(&session).run(stream, peer, disconnect.clone()));
                    }
                    Err(error) => {
                        let kind = error.kind();
                        if last_error != Some(kind) {
                            warn!(
                                target: TRANSPORT_TARGET,
                                error = %error,
                                "socket accept error"
                            );
                        }
                        last_error = Some(kind);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                },
            }
        }

        #[cfg(unix)]
        cleanup_unix_socket(&listener.endpoint);
        drop(listener);

        while let Some(finished) = connections.join_next().await {
            log_connection_exit(finished);
        }
    }
}

fn log_connection_exit(finished: Result<(), tokio::task::JoinError>) {
    if let Err(join_error) = finished {
        error!(
            target: TRANSPORT_TARGET,
            error = %join_error,
            "connection task failed"
        );
    }
}

async fn bind_tcp(
    endpoint: &SocketEndpoint,
    host: &str,
    port: u16,
    backlog: u32,
) -> Result<TcpListener, ListenerError> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| ListenerError::Unresolvable {
            endpoint: endpoint.clone(),
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::NoAddress {
        endpoint: endpoint.clone(),
    })?;
    let bind = |addr: SocketAddr| -> io::Result<TcpListener> {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        #[cfg(unix)]
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(backlog)
    };
    bind(addr).map_err(|source| ListenerError::Tcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::Inspect {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::NotASocket {
                path: path.to_path_buf(),
            });
        }
        match std::os::unix::net::UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenerError::Occupied {
                    path: path.to_path_buf(),
                });
            }
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                fs::remove_file(path).map_err(|source| ListenerError::StaleSocket {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            Err(error) => {
                return Err(ListenerError::Inspect {
                    path: path.to_path_buf(),
                    source: error,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::Unix {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: TRANSPORT_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpStream;

    use super::*;

    #[tokio::test]
    async fn tcp_listener_reports_ephemeral_port_and_peer() {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 0);
        let listener = SocketListener::bind(&endpoint, 16)
            .await
            .expect("bind tcp listener");
        let BoundAddress::Tcp(addr) = listener.bound_address() else {
            panic!("tcp listener should report a socket address");
        };
        assert_ne!(addr.port(), 0);

        let client = TcpStream::connect(addr).await.expect("connect client");
        let (_stream, peer) = listener.accept().await.expect("accept");
        assert_eq!(
            peer,
            PeerAddr::Tcp(client.local_addr().expect("client address"))
        );
    }

    #[tokio::test]
    async fn tcp_listener_rejects_occupied_port() {
        let occupied = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("reserve port");
        let port = occupied.local_addr().expect("local addr").port();

        let error = SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", port), 16)
            .await
            .expect_err("port in use");
        assert!(matches!(error, ListenerError::Tcp { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_listener_cleans_stale_socket_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tsocket.sock");
        {
            let _stale = std::os::unix::net::UnixListener::bind(&path).expect("bind stale");
        }
        assert!(path.exists(), "stale socket should remain");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_string());
        let listener = SocketListener::bind(&endpoint, 16)
            .await
            .expect("bind new listener");
        tokio::net::UnixStream::connect(&path)
            .await
            .expect("connect unix client");
        let (_stream, peer) = listener.accept().await.expect("accept");
        assert_eq!(peer, PeerAddr::Unix);

        cleanup_unix_socket(&endpoint);
        assert!(!path.exists(), "socket file should be removed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_listener_rejects_in_use_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tsocket.sock");
        let _existing = std::os::unix::net::UnixListener::bind(&path).expect("bind existing");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_string());
        let error = SocketListener::bind(&endpoint, 16)
            .await
            .expect_err("should fail bind");
        assert!(matches!(error, ListenerError::Occupied { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_listener_refuses_to_replace_regular_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tsocket.sock");
        std::fs::write(&path, b"not a socket").expect("write file");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_string());
        let error = SocketListener::bind(&endpoint, 16)
            .await
            .expect_err("regular file");
        assert!(matches!(error, ListenerError::NotASocket { .. }));
    }
}
