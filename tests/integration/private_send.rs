//! Integration tests for the outbound private and global paths.
//!
//! Drives a pipeline for `alice` over a loopback transport. The other end
//! of the loopback plays the chat server, and the stub provider stands in
//! for the encryption provider.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relaychat::chat::counters::{Category, Direction, Stage};
use relaychat::chat::{Flow, Pipeline, PipelineOptions, SessionEnd};
use relaychat::console::{Capture, Console};
use relaychat::crypto::CryptoProvider;
use relaychat::crypto::stub::StubProvider;
use relaychat::orchestrator::BoundedWait;
use relaychat::transport::loopback::LoopbackTransport;
use relaychat::transport::{Frame, Transport};
use relaychat_proto::global::{self, GlobalAction};
use relaychat_proto::private::{self, PrivateEnvelope};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type AlicePipeline = Pipeline<StubProvider, LoopbackTransport>;

struct Session {
    pipeline: Arc<AlicePipeline>,
    provider: Arc<StubProvider>,
    server: LoopbackTransport,
    capture: Capture,
}

fn session_with(provider: StubProvider, wait: BoundedWait) -> Session {
    let provider = Arc::new(provider);
    let (client, server) = LoopbackTransport::create_pair(64);
    let (console, capture) = Console::capture();
    let options = PipelineOptions {
        wait,
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(
        "alice",
        Arc::clone(&provider),
        Arc::new(client),
        console,
        options,
    );
    Session {
        pipeline,
        provider,
        server,
        capture,
    }
}

fn session(provider: StubProvider) -> Session {
    session_with(
        provider,
        BoundedWait::new(Duration::from_millis(5), Duration::from_secs(5)),
    )
}

/// Feed one line and wait for any delivery it started.
async fn input(session: &Session, line: &str) {
    if let Flow::Pending(handle) = session.pipeline.handle_input(line) {
        handle.await.unwrap();
    }
}

async fn next_envelope(server: &LoopbackTransport) -> PrivateEnvelope {
    match tokio::time::timeout(Duration::from_secs(2), server.recv())
        .await
        .expect("no frame sent")
        .unwrap()
    {
        Frame::Binary(bytes) => private::decode(&bytes).unwrap(),
        Frame::Text(text) => panic!("expected a binary frame, got {text}"),
    }
}

fn count(pipeline: &AlicePipeline, category: Category, stage: Stage) -> u64 {
    pipeline.counters().get(Direction::Sent, category, stage)
}

fn scratch_file(tag: &str, contents: &[u8]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "relaychat-send-{tag}-{}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("notes.txt");
    std::fs::write(&path, contents).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Private text
// ---------------------------------------------------------------------------

#[tokio::test]
async fn private_text_is_prerecorded_then_dispatched_once() {
    let s = session(StubProvider::new());

    input(&s, "@bob hello").await;

    let log = s.pipeline.caches().private().messages("bob").unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].ends_with("You said: hello"), "{}", log[0]);

    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Initiated), 1);
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Succeeded), 1);
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Failed), 0);
    assert_eq!(count(&s.pipeline, Category::Packets, Stage::Succeeded), 1);

    let envelope = next_envelope(&s.server).await;
    assert_eq!(envelope.action, "chat");
    assert!(envelope.error.is_empty());
    let message = envelope.message.unwrap();
    assert_eq!(message.username, "alice");
    assert_eq!(message.target, "bob");
    assert!(message.file_name.is_empty());
    assert_ne!(message.content, b"hello");
    assert_eq!(StubProvider::new().decrypt(&message.content, 1).unwrap(), b"hello");
}

#[tokio::test]
async fn private_text_to_self_is_rejected_before_anything_happens() {
    let s = session(StubProvider::new());

    assert!(matches!(s.pipeline.handle_input("@alice hello"), Flow::Continue));

    assert!(s.capture.contains("Error: cannot secure send messages to yourself"));
    assert!(!s.pipeline.caches().private().contains("alice"));
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Initiated), 0);
    assert_eq!(count(&s.pipeline, Category::Packets, Stage::Initiated), 0);
    assert_eq!(s.provider.encrypt_calls(), 0);
}

#[tokio::test]
async fn message_ids_increase_across_sends() {
    let s = session(StubProvider::new());

    input(&s, "@bob one").await;
    input(&s, "@carol two").await;
    input(&s, "@bob three").await;

    assert_eq!(count(&s.pipeline, Category::Packets, Stage::Initiated), 3);
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Succeeded), 3);
    assert_eq!(s.pipeline.caches().private().messages("bob").unwrap().len(), 2);
    assert_eq!(s.pipeline.caches().private().messages("carol").unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_target_is_reported_and_counted_failed() {
    let s = session(StubProvider::builder().reject_target("mallory").build());

    input(&s, "@mallory hi").await;

    assert!(s.capture.contains("!! Invalid private message target mallory"));
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Succeeded), 0);
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Failed), 1);
    // The notice was recorded before encryption was attempted.
    assert_eq!(s.pipeline.caches().private().messages("mallory").unwrap().len(), 1);
    assert!(s.pipeline.session_end().is_none());
}

#[tokio::test]
async fn slow_encryption_times_out() {
    let s = session_with(
        StubProvider::builder().delay(Duration::from_millis(200)).build(),
        BoundedWait::new(Duration::from_millis(5), Duration::from_millis(20)),
    );

    input(&s, "@bob hello").await;

    assert!(s.capture.contains("!! Private message to bob could not be encrypted in time"));
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Failed), 1);
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Succeeded), 0);

    let nothing = tokio::time::timeout(Duration::from_millis(300), s.server.recv()).await;
    assert!(nothing.is_err(), "no frame should be sent after a timeout");

    // The encryption has finished by now; its late result changes nothing.
    assert_eq!(s.provider.encrypt_calls(), 1);
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Failed), 1);
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Succeeded), 0);
    assert_eq!(count(&s.pipeline, Category::Packets, Stage::Succeeded), 0);
    assert_eq!(s.pipeline.caches().private().messages("bob").unwrap().len(), 1);
}

#[tokio::test]
async fn lost_provider_connection_ends_the_session() {
    let s = session(StubProvider::builder().connection_lost().build());

    input(&s, "@bob hello").await;

    assert!(s.capture.contains("!! Unrecoverable crypto provider error"));
    assert!(matches!(s.pipeline.session_end(), Some(SessionEnd::Fatal(_))));
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Failed), 1);
}

#[tokio::test]
async fn empty_ciphertext_is_a_failure() {
    let s = session(StubProvider::builder().empty_ciphertext().build());

    input(&s, "@bob hello").await;

    assert!(s.capture.contains("!! Private message to bob failed"));
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Failed), 1);
}

// ---------------------------------------------------------------------------
// Private files
// ---------------------------------------------------------------------------

#[tokio::test]
async fn private_file_carries_its_name_and_encrypted_contents() {
    let s = session(StubProvider::new());
    let path = scratch_file("ok", b"file body");

    input(&s, &format!("#bob {}", path.display())).await;

    let log = s.pipeline.caches().private().messages("bob").unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("You secure sent file"), "{}", log[0]);
    assert_eq!(count(&s.pipeline, Category::PrivateFile, Stage::Succeeded), 1);
    assert_eq!(count(&s.pipeline, Category::PrivateText, Stage::Initiated), 0);

    let message = next_envelope(&s.server).await.message.unwrap();
    assert_eq!(message.file_name, "notes.txt");
    assert_eq!(
        StubProvider::new().decrypt(&message.content, 1).unwrap(),
        b"file body"
    );
}

#[tokio::test]
async fn missing_file_is_rejected_without_side_effects() {
    let s = session(StubProvider::new());

    let flow = s.pipeline.handle_input("#bob /definitely/not/here.txt");

    assert!(matches!(flow, Flow::Continue));
    assert!(s.capture.contains("Error: cannot find file '/definitely/not/here.txt'"));
    assert!(!s.pipeline.caches().private().contains("bob"));
    assert_eq!(count(&s.pipeline, Category::PrivateFile, Stage::Initiated), 0);
    assert_eq!(s.provider.encrypt_calls(), 0);
}

#[tokio::test]
async fn private_file_to_self_is_rejected() {
    let s = session(StubProvider::new());
    let path = scratch_file("self", b"x");

    let flow = s.pipeline.handle_input(&format!("#alice {}", path.display()));

    assert!(matches!(flow, Flow::Continue));
    assert!(s.capture.contains(&format!(
        "Error: cannot secure send file {} to yourself",
        path.display()
    )));
    assert_eq!(s.provider.encrypt_calls(), 0);
}

// ---------------------------------------------------------------------------
// Global
// ---------------------------------------------------------------------------

#[tokio::test]
async fn global_text_is_sent_unencrypted_as_json() {
    let s = session(StubProvider::new());

    input(&s, "hello everyone").await;

    let frame = s.server.recv().await.unwrap();
    let Frame::Text(json) = frame else {
        panic!("expected a text frame");
    };
    match global::decode(&json).unwrap().classify().unwrap() {
        GlobalAction::Chat(body) => {
            assert_eq!(body.username, "alice");
            assert_eq!(body.content, "hello everyone");
        }
        other => panic!("unexpected action {other:?}"),
    }

    let shared = s.pipeline.caches().shared().messages("EVERYONE").unwrap();
    assert_eq!(shared.len(), 1);
    assert!(shared[0].ends_with("(global) You said: hello everyone"));
    assert_eq!(count(&s.pipeline, Category::Global, Stage::Succeeded), 1);
    assert_eq!(s.provider.encrypt_calls(), 0);
}

#[tokio::test]
async fn global_send_on_closed_transport_counts_failure() {
    let s = session(StubProvider::new());
    s.pipeline.transport().close().await;

    input(&s, "anyone there").await;

    assert_eq!(count(&s.pipeline, Category::Global, Stage::Failed), 1);
    assert!(s.pipeline.caches().shared().messages("EVERYONE").unwrap().is_empty());
    assert!(s.capture.contains("!! Global message failed"));
}
