//! Integration tests for inbound frame handling.
//!
//! Frames are injected from the server end of a loopback pair, either
//! straight into `Pipeline::receive_frame` or through the receive loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relaychat::chat::counters::{Category, Direction, Stage};
use relaychat::chat::{Pipeline, PipelineOptions, SessionEnd};
use relaychat::console::{Capture, Console};
use relaychat::crypto::CryptoProvider;
use relaychat::crypto::stub::StubProvider;
use relaychat::net;
use relaychat::orchestrator::BoundedWait;
use relaychat::transport::loopback::LoopbackTransport;
use relaychat::transport::{Frame, Transport};
use relaychat_proto::global::{self, GlobalFrame};
use relaychat_proto::private::{self, PrivateEnvelope, PrivateMessage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type ClientPipeline = Pipeline<StubProvider, LoopbackTransport>;

struct Client {
    pipeline: Arc<ClientPipeline>,
    provider: Arc<StubProvider>,
    server: LoopbackTransport,
    capture: Capture,
}

fn options(shared_dir: PathBuf) -> PipelineOptions {
    PipelineOptions {
        wait: BoundedWait::new(Duration::from_millis(5), Duration::from_secs(5)),
        shared_dir,
        ..PipelineOptions::default()
    }
}

fn client_in(identity: &str, provider: StubProvider, shared_dir: PathBuf) -> Client {
    let provider = Arc::new(provider);
    let (transport, server) = LoopbackTransport::create_pair(64);
    let (console, capture) = Console::capture();
    let pipeline = Pipeline::new(
        identity,
        Arc::clone(&provider),
        Arc::new(transport),
        console,
        options(shared_dir),
    );
    Client {
        pipeline,
        provider,
        server,
        capture,
    }
}

fn client(provider: StubProvider) -> Client {
    client_in("alice", provider, PathBuf::from("shared"))
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "relaychat-inbound-{tag}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn private_frame(from: &str, to: &str, plaintext: &[u8], file_name: &str, error: &str) -> Frame {
    let content = StubProvider::new().encrypt(plaintext, to, 1).unwrap();
    let mut envelope = PrivateEnvelope::chat(PrivateMessage {
        username: from.into(),
        target: to.into(),
        content,
        file_name: file_name.into(),
    });
    envelope.error = error.into();
    Frame::Binary(private::encode(&envelope).unwrap())
}

fn global_frame(from: &str, text: &str) -> Frame {
    Frame::Text(global::encode(&GlobalFrame::chat(from, text)).unwrap())
}

fn received(pipeline: &ClientPipeline, category: Category, stage: Stage) -> u64 {
    pipeline.counters().get(Direction::Received, category, stage)
}

async fn deliver(client: &Client, frame: Frame) {
    if let Some(handle) = client.pipeline.receive_frame(frame) {
        handle.await.unwrap();
    }
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ---------------------------------------------------------------------------
// Private frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn private_frame_with_error_is_dropped_before_decrypt() {
    let c = client(StubProvider::new());

    let handle = c
        .pipeline
        .receive_frame(private_frame("bob", "alice", b"hi", "", "target offline"));

    assert!(handle.is_none());
    assert_eq!(received(&c.pipeline, Category::PrivateText, Stage::Failed), 1);
    assert_eq!(received(&c.pipeline, Category::PrivateText, Stage::Succeeded), 0);
    assert!(c.pipeline.caches().private().contacts().is_empty());
    assert_eq!(c.provider.decrypt_calls(), 0);
}

#[tokio::test]
async fn private_text_is_decrypted_and_shown() {
    let c = client(StubProvider::new());

    deliver(&c, private_frame("bob", "alice", b"hi alice", "", "")).await;

    let log = c.pipeline.caches().private().messages("bob").unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].ends_with("(private - bob) bob said: hi alice"), "{}", log[0]);
    assert!(c.capture.contains("bob said: hi alice"));
    assert_eq!(received(&c.pipeline, Category::PrivateText, Stage::Initiated), 1);
    assert_eq!(received(&c.pipeline, Category::PrivateText, Stage::Succeeded), 1);
    assert_eq!(received(&c.pipeline, Category::Packets, Stage::Succeeded), 1);
    assert_eq!(c.provider.decrypt_calls(), 1);
}

#[tokio::test]
async fn own_private_echo_is_ignored() {
    let c = client(StubProvider::new());

    deliver(&c, private_frame("alice", "bob", b"mine", "", "")).await;

    assert!(c.pipeline.caches().private().contacts().is_empty());
    assert_eq!(c.provider.decrypt_calls(), 0);
    assert_eq!(received(&c.pipeline, Category::PrivateText, Stage::Failed), 0);
}

#[tokio::test]
async fn failed_decrypt_is_counted_and_nothing_recorded() {
    let c = client(StubProvider::builder().fail_decrypt().build());

    deliver(&c, private_frame("bob", "alice", b"hi", "", "")).await;

    assert!(!c.pipeline.caches().private().contains("bob"));
    assert_eq!(received(&c.pipeline, Category::PrivateText, Stage::Failed), 1);
    assert!(c.pipeline.session_end().is_none());
}

#[tokio::test]
async fn lost_provider_on_decrypt_ends_the_session() {
    let c = client(StubProvider::builder().connection_lost().build());

    deliver(&c, private_frame("bob", "alice", b"hi", "", "")).await;

    assert!(matches!(c.pipeline.session_end(), Some(SessionEnd::Fatal(_))));
    assert!(c.capture.contains("!! Unrecoverable crypto provider error"));
}

#[tokio::test]
async fn private_file_is_written_to_the_sender_directory() {
    let root = scratch_dir("file");
    let c = client_in("alice", StubProvider::new(), root.clone());

    deliver(&c, private_frame("bob", "alice", b"report body", "report.txt", "")).await;

    let log = c.pipeline.caches().private().messages("bob").unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("bob secure sent file 'report.txt'"), "{}", log[0]);
    assert_eq!(received(&c.pipeline, Category::PrivateFile, Stage::Succeeded), 1);

    let mut names: Vec<String> = std::fs::read_dir(root.join("bob"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("report-") && names[0].ends_with("-decrypted.txt"));
    assert!(names[1].starts_with("report-") && names[1].ends_with("-encrypted.txt"));
    assert_eq!(
        std::fs::read(root.join("bob").join(&names[0])).unwrap(),
        b"report body"
    );

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn malformed_binary_frames_count_packet_failures() {
    let c = client(StubProvider::new());

    assert!(c.pipeline.receive_frame(Frame::Binary(vec![0xff; 3])).is_none());

    let no_action = PrivateEnvelope::default();
    let bytes = private::encode(&no_action).unwrap();
    assert!(c.pipeline.receive_frame(Frame::Binary(bytes)).is_none());

    let no_message = PrivateEnvelope {
        action: "chat".into(),
        ..PrivateEnvelope::default()
    };
    let bytes = private::encode(&no_message).unwrap();
    assert!(c.pipeline.receive_frame(Frame::Binary(bytes)).is_none());

    assert_eq!(received(&c.pipeline, Category::Packets, Stage::Initiated), 3);
    assert_eq!(received(&c.pipeline, Category::Packets, Stage::Failed), 3);
    assert_eq!(c.provider.decrypt_calls(), 0);
}

// ---------------------------------------------------------------------------
// Text frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn global_message_is_shown_and_recorded() {
    let c = client(StubProvider::new());

    deliver(&c, global_frame("bob", "hello all")).await;

    let shared = c.pipeline.caches().shared().messages("EVERYONE").unwrap();
    assert_eq!(shared.len(), 1);
    assert!(shared[0].ends_with("(global) hello all"));
    assert!(c.capture.contains("(global) hello all"));
    assert_eq!(received(&c.pipeline, Category::Global, Stage::Succeeded), 1);
}

#[tokio::test]
async fn own_global_echo_is_ignored() {
    let c = client(StubProvider::new());

    deliver(&c, global_frame("alice", "my own words")).await;

    assert!(c.pipeline.caches().shared().messages("EVERYONE").unwrap().is_empty());
    assert_eq!(received(&c.pipeline, Category::Global, Stage::Failed), 0);
}

#[tokio::test]
async fn duplicate_identity_ends_the_session() {
    let c = client(StubProvider::new());
    let frame = GlobalFrame {
        action: "identify".into(),
        error: Some("duplicate".into()),
        ..GlobalFrame::default()
    };

    deliver(&c, Frame::Text(global::encode(&frame).unwrap())).await;

    assert!(c
        .capture
        .contains("!! Username is already taken. Please rejoin with another one"));
    assert_eq!(
        c.pipeline.session_end(),
        Some(SessionEnd::DuplicateIdentity("duplicate".into()))
    );
}

#[tokio::test]
async fn successful_identify_keeps_the_session() {
    let c = client(StubProvider::new());
    let frame = GlobalFrame {
        action: "identify".into(),
        error: Some(String::new()),
        ..GlobalFrame::default()
    };

    deliver(&c, Frame::Text(global::encode(&frame).unwrap())).await;

    assert!(c.pipeline.session_end().is_none());
    assert_eq!(received(&c.pipeline, Category::Packets, Stage::Succeeded), 1);
}

#[tokio::test]
async fn garbage_text_counts_a_packet_failure() {
    let c = client(StubProvider::new());

    assert!(c.pipeline.receive_frame(Frame::Text("not json".into())).is_none());

    assert_eq!(received(&c.pipeline, Category::Packets, Stage::Failed), 1);
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receive_loop_ends_session_when_server_disconnects() {
    let c = client(StubProvider::new());
    let task = net::spawn_receive_loop(&c.pipeline);

    c.server.send_text(&global::encode(&GlobalFrame::chat("bob", "bye")).unwrap())
        .await
        .unwrap();
    c.server.close().await;

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.pipeline.session_end(), Some(SessionEnd::Disconnected));
}

#[tokio::test]
async fn alice_and_bob_chat_through_a_relay() {
    let alice = client_in("alice", StubProvider::new(), scratch_dir("relay-alice"));
    let bob = client_in("bob", StubProvider::new(), scratch_dir("relay-bob"));
    let bob_loop = net::spawn_receive_loop(&bob.pipeline);

    // Forward whatever alice sends to bob, as the chat server would.
    let Client {
        pipeline: alice_pipeline,
        server: alice_server,
        ..
    } = alice;
    let bob_server = bob.server;
    let relay = tokio::spawn(async move {
        while let Ok(frame) = alice_server.recv().await {
            let forwarded = match frame {
                Frame::Text(text) => bob_server.send_text(&text).await,
                Frame::Binary(bytes) => bob_server.send_binary(&bytes).await,
            };
            if forwarded.is_err() {
                break;
            }
        }
    });

    for line in ["@bob psst", "hello room"] {
        if let relaychat::chat::Flow::Pending(handle) = alice_pipeline.handle_input(line) {
            handle.await.unwrap();
        }
    }

    let bob_pipeline = Arc::clone(&bob.pipeline);
    assert!(
        eventually(|| {
            bob_pipeline.caches().private().contains("alice")
                && !bob_pipeline
                    .caches()
                    .shared()
                    .messages("EVERYONE")
                    .unwrap_or_default()
                    .is_empty()
        })
        .await
    );

    let private_log = bob.pipeline.caches().private().messages("alice").unwrap();
    assert!(private_log[0].ends_with("alice said: psst"));
    assert!(bob.capture.contains("(global) hello room"));
    assert_eq!(bob.provider.decrypt_calls(), 1);

    bob.pipeline.end_session(SessionEnd::Quit);
    tokio::time::timeout(Duration::from_secs(2), bob_loop)
        .await
        .unwrap()
        .unwrap();
    relay.abort();
}
