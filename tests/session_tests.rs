//! Session tests against an in-process HTTP server

use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use netw::{Callbacks, Error, Session, SessionConfig, TlsPolicy, TransportStage};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

const BLOB_LEN: usize = 100_000;

#[derive(Debug)]
enum Event {
    Completed {
        id: u32,
        status: u16,
        body: Vec<u8>,
    },
    Downloaded {
        id: u32,
        status: u16,
        path: PathBuf,
        contents: Vec<u8>,
    },
    Failed {
        id: u32,
        stage: Option<TransportStage>,
    },
}

fn blob_bytes() -> Vec<u8> {
    (0..BLOB_LEN).map(|i| (i % 251) as u8).collect()
}

fn app() -> Router {
    Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
        .route(
            "/headers",
            get(|headers: HeaderMap| async move {
                headers
                    .get("x-client")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string()
            }),
        )
        .route(
            "/echo",
            post(|headers: HeaderMap, body: Bytes| async move {
                let length = headers
                    .get("content-length")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string();
                format!("{}|{}", length, String::from_utf8_lossy(&body))
            }),
        )
        .route("/blob", post(|| async { blob_bytes() }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "slow"
            }),
        )
}

async fn serve() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app()).await.unwrap();
    });
    addr
}

/// Accept one connection, answer `ok` and report the raw header lines
async fn capture_header_lines() -> (SocketAddr, oneshot::Receiver<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buffer = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let read = stream.read(&mut buffer).await.unwrap();
            if read == 0 {
                break;
            }
            head.extend_from_slice(&buffer[..read]);
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
            .await
            .unwrap();

        let text = String::from_utf8_lossy(&head).into_owned();
        let lines = text
            .split("\r\n")
            .skip(1)
            .take_while(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        let _ = tx.send(lines);
    });

    (addr, rx)
}

fn recording() -> (Callbacks<u32>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let completed = tx.clone();
    let downloaded = tx.clone();

    let callbacks = Callbacks::new(
        move |id, body: &[u8], status| {
            let _ = completed.send(Event::Completed {
                id,
                status,
                body: body.to_vec(),
            });
        },
        move |id, path: &std::path::Path, status| {
            let _ = downloaded.send(Event::Downloaded {
                id,
                status,
                path: path.to_path_buf(),
                contents: std::fs::read(path).unwrap_or_default(),
            });
        },
    )
    .on_failure(move |id, error: &Error| {
        let _ = tx.send(Event::Failed {
            id,
            stage: error.stage(),
        });
    });

    (callbacks, rx)
}

fn test_config() -> SessionConfig {
    SessionConfig::builder()
        .tls(TlsPolicy::FromScheme)
        .use_default_proxy(false)
        .timeout(Duration::from_secs(10))
        .build()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_delivers_body_and_status_once() {
    let addr = serve().await;
    let (callbacks, mut rx) = recording();
    let session = Session::init(callbacks, test_config()).unwrap();

    session.get(&format!("http://{addr}/ok"), &[], 1).unwrap();
    session.deinit().await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1, "{events:?}");
    match &events[0] {
        Event::Completed { id, status, body } => {
            assert_eq!(*id, 1);
            assert_eq!(*status, 200);
            assert_eq!(body, b"ok");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_sends_caller_headers() {
    let addr = serve().await;
    let (callbacks, mut rx) = recording();
    let session = Session::init(callbacks, test_config()).unwrap();

    session
        .get(&format!("http://{addr}/headers"), &[("X-Client", "launcher")], 2)
        .unwrap();
    session.deinit().await;

    match drain(&mut rx).as_slice() {
        [Event::Completed { status: 200, body, .. }] => assert_eq!(body, b"launcher"),
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_errors_are_delivered_as_completions() {
    let addr = serve().await;
    let (callbacks, mut rx) = recording();
    let session = Session::init(callbacks, test_config()).unwrap();

    session.get(&format!("http://{addr}/missing"), &[], 3).unwrap();
    session.deinit().await;

    match drain(&mut rx).as_slice() {
        [Event::Completed { id: 3, status: 404, body }] => assert_eq!(body, b"nope"),
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn post_sends_payload_with_content_length() {
    let addr = serve().await;
    let (callbacks, mut rx) = recording();
    let session = Session::init(callbacks, test_config()).unwrap();

    let mut payload = br#"{"mod":"alpha"}"#.to_vec();
    session
        .post(
            &format!("http://{addr}/echo"),
            &[("Content-Type", "application/json")],
            &payload,
            4,
        )
        .unwrap();
    // The task owns its own copy of the payload.
    payload.clear();
    session.deinit().await;

    match drain(&mut rx).as_slice() {
        [Event::Completed { id: 4, status: 200, body }] => {
            assert_eq!(String::from_utf8_lossy(body), r#"15|{"mod":"alpha"}"#);
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_lands_in_temp_file_removed_after_callback() {
    let addr = serve().await;
    let (callbacks, mut rx) = recording();
    let session = Session::init(callbacks, test_config()).unwrap();

    session.download(&format!("http://{addr}/blob"), 5).unwrap();
    session.deinit().await;

    match drain(&mut rx).as_slice() {
        [Event::Downloaded { id: 5, status: 200, path, contents }] => {
            assert_eq!(contents.len(), BLOB_LEN);
            assert!(*contents == blob_bytes());
            let name = path.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with("mmi"), "unexpected temp name {name}");
            assert!(!path.exists());
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_can_be_moved_out_by_the_callback() {
    let addr = serve().await;
    let target_dir = tempfile::tempdir().unwrap();
    let target = target_dir.path().join("cache").join("blob.bin");
    let moved_to = target.clone();

    let callbacks = Callbacks::new(
        |_: (), _: &[u8], _: u16| {},
        move |_: (), path: &std::path::Path, _: u16| {
            netw::fs::move_file(path, &moved_to, true).unwrap();
        },
    );
    let session = Session::init(callbacks, test_config()).unwrap();
    session.download(&format!("http://{addr}/blob"), ()).unwrap();
    session.deinit().await;

    assert_eq!(netw::fs::size(&target), Some(BLOB_LEN as u64));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_failure_invokes_failure_callback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (callbacks, mut rx) = recording();
    let session = Session::init(callbacks, test_config()).unwrap();

    session.get(&format!("http://{addr}/ok"), &[], 6).unwrap();
    session.deinit().await;

    match drain(&mut rx).as_slice() {
        [Event::Failed { id: 6, stage }] => assert_eq!(*stage, Some(TransportStage::Connect)),
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_tasks_each_deliver_once() {
    let addr = serve().await;
    let (callbacks, mut rx) = recording();
    let config = SessionConfig::builder()
        .tls(TlsPolicy::FromScheme)
        .use_default_proxy(false)
        .max_concurrent(2)
        .build();
    let session = Session::init(callbacks, config).unwrap();

    for id in 0..10 {
        session.get(&format!("http://{addr}/ok"), &[], id).unwrap();
    }
    session.deinit().await;

    let mut ids: Vec<u32> = drain(&mut rx)
        .into_iter()
        .map(|event| match event {
            Event::Completed { id, status: 200, .. } => id,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_queue_rejects_new_tasks() {
    let addr = serve().await;
    let (callbacks, mut rx) = recording();
    let config = SessionConfig::builder()
        .tls(TlsPolicy::FromScheme)
        .use_default_proxy(false)
        .max_pending(1)
        .build();
    let session = Session::init(callbacks, config).unwrap();

    session.get(&format!("http://{addr}/slow"), &[], 7).unwrap();
    assert_eq!(session.in_flight(), 1);
    let err = session.get(&format!("http://{addr}/ok"), &[], 8).unwrap_err();
    assert!(matches!(err, Error::QueueFull(1)), "{err}");
    session.deinit().await;

    match drain(&mut rx).as_slice() {
        [Event::Completed { id: 7, body, .. }] => assert_eq!(body, b"slow"),
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn requests_after_deinit_are_rejected() {
    let addr = serve().await;
    let (callbacks, mut rx) = recording();
    let session = Session::init(callbacks, test_config()).unwrap();
    let clone = session.clone();

    session.deinit().await;
    assert!(!clone.is_initialized());
    assert!(matches!(
        clone.get(&format!("http://{addr}/ok"), &[], 9),
        Err(Error::NotInitialized)
    ));
    assert!(matches!(
        clone.download(&format!("http://{addr}/blob"), 10),
        Err(Error::NotInitialized)
    ));
    // Deinit twice is harmless.
    session.deinit().await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn header_block_reaches_the_wire_in_caller_case() {
    let (addr, lines) = capture_header_lines().await;
    let (callbacks, mut rx) = recording();
    let session = Session::init(callbacks, test_config()).unwrap();

    session
        .get(
            &format!("http://{addr}/raw"),
            &[("X-B", "2"), ("X-A", "1"), ("X-B", "3")],
            11,
        )
        .unwrap();
    let lines = lines.await.unwrap();
    session.deinit().await;

    // WinHTTP sends the block verbatim; reqwest groups a repeated name
    // with its first occurrence.
    #[cfg(all(windows, feature = "backend-winhttp"))]
    let expected = ["X-B: 2", "X-A: 1", "X-B: 3"];
    #[cfg(not(all(windows, feature = "backend-winhttp")))]
    let expected = ["X-B: 2", "X-B: 3", "X-A: 1"];

    assert_eq!(&lines[..3], &expected[..], "{lines:?}");
    assert!(lines.iter().any(|line| line == "User-Agent: minimod-client"), "{lines:?}");

    match drain(&mut rx).as_slice() {
        [Event::Completed { id: 11, status: 200, body }] => assert_eq!(body, b"ok"),
        other => panic!("unexpected events {other:?}"),
    }
}
