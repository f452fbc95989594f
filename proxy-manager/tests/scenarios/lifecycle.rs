//! Startup, inject/remove ticks and completion.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use proxy_manager::daemon::DaemonOp;
use proxy_manager::{app, health, ControllerConfig, EventStore, InMemoryDaemon, InMemoryStore};
use proxy_manager::{RunOutcome, TokioProviders};

use crate::common::{assert_no_toxics, assert_one_toxic_each, mem_reconciler};

async fn health_status(addr: std::net::SocketAddr) -> (StatusCode, Bytes) {
    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });
    let req = Request::builder()
        .uri("/health")
        .header(hyper::header::HOST, addr.to_string())
        .body(Full::new(Bytes::new()))
        .unwrap();
    let res = sender.send_request(req).await.unwrap();
    let status = res.status();
    (status, res.into_body().collect().await.unwrap().to_bytes())
}

#[tokio::test]
async fn fresh_start_creates_proxies_and_serves_health() {
    let r = mem_reconciler(ControllerConfig::fast_local());
    let server = health::spawn(
        r.config().health_socket_addr().unwrap(),
        r.config().health_shutdown_grace,
        r.shutdown_token().clone(),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let (outcome, ()) = tokio::join!(r.run(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.daemon().proxy_names().len(), 7);
        assert_eq!(r.daemon().count_calls(DaemonOp::AddToxic), 0);

        let (status, body) = health_status(addr).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"OK");

        r.shutdown_token().cancel();
    });

    assert_eq!(outcome.unwrap(), RunOutcome::Cancelled);
    server.join().await;
    assert!(r.daemon().proxy_names().is_empty());
    assert_eq!(r.daemon().count_calls(DaemonOp::CreateProxy), 7);
}

#[tokio::test(start_paused = true)]
async fn inject_then_remove_across_ticks() {
    let r = mem_reconciler(ControllerConfig::fast_local());

    let (outcome, ()) = tokio::join!(r.run(), async {
        tokio::time::sleep(Duration::from_millis(25)).await;
        r.store().set_inject(1);
        // Absent toxics are retried before NotFound is accepted.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(r.store().events().is_empty());
        assert_one_toxic_each(&r);

        r.store().set_inject(0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(r.store().events().is_empty());
        assert_no_toxics(&r);

        r.store().set_progress(1, 1);
    });

    assert_eq!(outcome.unwrap(), RunOutcome::Completed);
    assert!(r.daemon().proxy_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn completed_store_tears_down_immediately() {
    let r = mem_reconciler(ControllerConfig::fast_local());
    r.store().initialize().await.unwrap();
    r.store().set_progress(5, 5);

    assert_eq!(r.run().await.unwrap(), RunOutcome::Completed);

    assert_eq!(r.daemon().count_calls(DaemonOp::CreateProxy), 7);
    assert_eq!(r.daemon().count_calls(DaemonOp::DeleteProxy), 7);
    assert!(r.daemon().proxy_names().is_empty());
    assert!(r.store().is_closed());
    assert!(r.shutdown_token().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn rapid_toggle_ends_without_toxics() {
    let r = mem_reconciler(ControllerConfig::fast_local());
    r.store().initialize().await.unwrap();
    r.ensure_proxies().await.unwrap();

    r.store().set_inject(1);
    r.store().set_inject(0);
    assert_eq!(r.process_events().await.unwrap(), 2);

    assert_eq!(r.daemon().count_calls(DaemonOp::AddToxic), 7);
    assert_no_toxics(&r);
}

#[tokio::test]
async fn serve_runs_to_completion() {
    let store = InMemoryStore::new();
    store.initialize().await.unwrap();
    store.set_progress(2, 2);
    let daemon = InMemoryDaemon::new();

    let outcome = app::serve(
        store,
        daemon,
        TokioProviders::seeded(9),
        ControllerConfig::fast_local(),
    )
    .await;
    assert_eq!(outcome.unwrap(), RunOutcome::Completed);
}

#[test]
fn health_answers_while_block_on_thread_is_blocked() {
    let runtime = app::runtime().unwrap();
    runtime.block_on(async {
        let config = ControllerConfig::fast_local();
        let token = tokio_util::sync::CancellationToken::new();
        let server = health::spawn(
            config.health_socket_addr().unwrap(),
            config.health_shutdown_grace,
            token.clone(),
        )
        .await
        .unwrap();
        let addr = server.local_addr();

        let client = std::thread::spawn(move || {
            let mut stream = std::net::TcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            write!(stream, "GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n")
                .unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });
        // Synchronous join: nothing else runs on this thread until it returns.
        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("OK"), "{response}");

        token.cancel();
        server.join().await;
    });
}
