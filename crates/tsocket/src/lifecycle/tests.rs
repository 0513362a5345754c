//! Unit tests for the server lifecycle state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mockall::Sequence;
use rstest::{fixture, rstest};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use super::*;
use crate::event::{EventDefinition, HandlerError, define_event};
use crate::registry::RegistrationError;
use crate::schema::Shape;

fn noop_event() -> EventDefinition {
    define_event(Shape::Any).handler(|_input, _ctx| async { Ok::<_, HandlerError>(()) })
}

fn loopback() -> ListenOptions {
    ListenOptions::new().hostname("127.0.0.1").port(0)
}

#[fixture]
fn quiet_reporter() -> MockLifecycleReporter {
    let mut reporter = MockLifecycleReporter::new();
    reporter.expect_events_registered().return_const(());
    reporter.expect_listening_without_events().return_const(());
    reporter.expect_listening().return_const(());
    reporter.expect_connection_opened().return_const(());
    reporter.expect_connection_closed().return_const(());
    reporter.expect_closing().return_const(());
    reporter.expect_closed().return_const(());
    reporter
}

async fn wait_for_connections(server: &Server, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while server.connection_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count reached");
}

#[tokio::test]
async fn full_lifecycle_reports_each_transition_in_order() {
    let mut reporter = MockLifecycleReporter::new();
    let mut sequence = Sequence::new();
    reporter
        .expect_events_registered()
        .withf(|names| names.len() == 1 && names[0] == "greet")
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(());
    reporter
        .expect_listening()
        .withf(|address| address.tcp_addr().is_some())
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(());
    reporter
        .expect_closing()
        .withf(|open| *open == 0)
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(());
    reporter
        .expect_closed()
        .times(1)
        .in_sequence(&mut sequence)
        .return_const(());

    let server = Server::with_reporter(reporter);
    assert_eq!(server.state(), LifecycleState::Created);
    server.init([("greet", noop_event())]).expect("init");
    assert_eq!(server.state(), LifecycleState::Initialized);
    server.listen(loopback()).await.expect("listen");
    assert_eq!(server.state(), LifecycleState::Listening);
    server.close().await.expect("close");
    assert_eq!(server.state(), LifecycleState::Closed);
    assert!(server.local_address().is_none());
}

#[rstest]
#[tokio::test]
async fn listening_before_init_warns_and_locks_registration() {
    let mut reporter = MockLifecycleReporter::new();
    reporter
        .expect_listening_without_events()
        .times(1)
        .return_const(());
    reporter.expect_listening().times(1).return_const(());
    reporter.expect_closing().return_const(());
    reporter.expect_closed().return_const(());
    reporter.expect_events_registered().never();

    let server = Server::with_reporter(reporter);
    server.listen(loopback()).await.expect("inert listen");
    let error = server
        .init([("greet", noop_event())])
        .expect_err("init after listen");
    assert_eq!(error, RegistrationError::AlreadyInitialized);
    assert!(server.registry().is_empty());
    server.close().await.expect("close");
}

#[rstest]
fn failed_init_keeps_the_server_uninitialised(quiet_reporter: MockLifecycleReporter) {
    let server = Server::with_reporter(quiet_reporter);
    let error = server
        .init([("greet", noop_event()), ("greet", noop_event())])
        .expect_err("duplicate");
    assert!(matches!(error, RegistrationError::DuplicateName { .. }));
    assert_eq!(server.state(), LifecycleState::Created);

    server.init([("greet", noop_event())]).expect("retry");
    assert_eq!(
        server.init([("chat", noop_event())]),
        Err(RegistrationError::AlreadyInitialized)
    );
}

#[rstest]
#[tokio::test]
async fn close_without_listening_fails(quiet_reporter: MockLifecycleReporter) {
    let server = Arc::new(Server::with_reporter(quiet_reporter));
    assert!(matches!(
        server.close().await,
        Err(LifecycleError::NotListening)
    ));

    let (tx, rx) = oneshot::channel();
    server
        .close_with(move |error| {
            let _ = tx.send(error);
        })
        .await
        .expect("close task");
    let reported = rx.await.expect("callback invoked");
    assert!(matches!(reported, Some(LifecycleError::NotListening)));
}

#[rstest]
#[tokio::test]
async fn close_with_reports_success_once_closed(quiet_reporter: MockLifecycleReporter) {
    let server = Arc::new(Server::with_reporter(quiet_reporter));
    server.listen(loopback()).await.expect("listen");

    let (tx, rx) = oneshot::channel();
    server.close_with(move |error| {
        let _ = tx.send(error.is_none());
    });
    assert!(rx.await.expect("callback invoked"));
    assert_eq!(server.state(), LifecycleState::Closed);
}

#[rstest]
#[tokio::test]
async fn second_listen_is_rejected(quiet_reporter: MockLifecycleReporter) {
    let server = Server::with_reporter(quiet_reporter);
    server.listen(loopback()).await.expect("listen");
    assert!(matches!(
        server.listen(loopback()).await,
        Err(LifecycleError::AlreadyListening)
    ));
    server.close().await.expect("close");
}

#[rstest]
#[tokio::test]
async fn on_listening_runs_once_with_the_bound_address(quiet_reporter: MockLifecycleReporter) {
    let server = Server::with_reporter(quiet_reporter);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let (tx, rx) = oneshot::channel();

    let address = server
        .listen(loopback().on_listening(move |address| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(address.clone());
        }))
        .await
        .expect("listen");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(rx.await.expect("callback address"), address);
    assert_ne!(address.tcp_addr().map(|addr| addr.port()), Some(0));
    server.close().await.expect("close");
}

#[rstest]
#[tokio::test]
async fn bind_failures_leave_the_server_able_to_listen(quiet_reporter: MockLifecycleReporter) {
    let occupied = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("reserve port");
    let port = occupied.local_addr().expect("local addr").port();
    let server = Server::with_reporter(quiet_reporter);

    let error = server
        .listen(ListenOptions::new().hostname("127.0.0.1").port(port))
        .await
        .expect_err("port in use");
    assert!(matches!(error, LifecycleError::Listener(_)));
    assert_eq!(server.state(), LifecycleState::Created);

    server.listen(loopback()).await.expect("listen elsewhere");
    server.close().await.expect("close");
}

#[rstest]
#[tokio::test]
async fn close_waits_for_open_connections(quiet_reporter: MockLifecycleReporter) {
    let server = Arc::new(Server::with_reporter(quiet_reporter));
    let address = server.listen(loopback()).await.expect("listen");
    let client = TcpStream::connect(address.tcp_addr().expect("tcp address"))
        .await
        .expect("connect");
    wait_for_connections(&server, 1).await;

    let closing = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.close().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!closing.is_finished(), "close must wait for the client");
    assert_eq!(server.state(), LifecycleState::Closing);
    assert!(matches!(
        server.listen(loopback()).await,
        Err(LifecycleError::Closing)
    ));

    drop(client);
    tokio::time::timeout(Duration::from_secs(2), closing)
        .await
        .expect("close completes after the client leaves")
        .expect("close task")
        .expect("close");
    assert_eq!(server.connection_count(), 0);
}

#[rstest]
#[tokio::test]
async fn disconnect_all_lets_close_finish(quiet_reporter: MockLifecycleReporter) {
    let server = Server::with_reporter(quiet_reporter);
    assert!(!server.disconnect_all());
    let address = server.listen(loopback()).await.expect("listen");
    let _client = TcpStream::connect(address.tcp_addr().expect("tcp address"))
        .await
        .expect("connect");
    wait_for_connections(&server, 1).await;

    assert!(server.disconnect_all());
    tokio::time::timeout(Duration::from_secs(2), server.close())
        .await
        .expect("close completes")
        .expect("close");
}
