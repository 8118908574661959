mod common;

use std::path::Path;
use std::time::Duration;

use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use mailalert::charset::CharsetRegistry;
use mailalert::checkpoint::{Checkpoint, CheckpointStore};
use mailalert::decoder::MessageDecoder;
use mailalert::error::{MailError, WatchError};
use mailalert::imap_client::MailSession;
use mailalert::models::RawMessage;
use mailalert::watcher::{Watcher, WatcherState};

use common::{simple_message, MemoryMailbox, MemoryTransport};

const INTERVAL: Duration = Duration::from_secs(30);

fn watcher(mailbox: &MemoryMailbox, state_file: &Path, cap: usize) -> Watcher<MemoryTransport> {
    let session = MailSession::new(mailbox.transport(), "INBOX");
    let decoder = MessageDecoder::new(CharsetRegistry::with_defaults());
    Watcher::new(session, decoder, CheckpointStore::new(state_file), INTERVAL, cap)
        .expect("checkpoint should load")
}

fn saved_checkpoint(state_file: &Path) -> Checkpoint {
    CheckpointStore::new(state_file).load().unwrap()
}

#[tokio::test]
async fn test_first_run_without_checkpoint_file() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("data").join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages((1..=3).map(|uid| simple_message(uid, "hello")));

    let mut watcher = watcher(&mailbox, &state_file, 20);
    assert_eq!(watcher.checkpoint(), Checkpoint::new(0));
    assert_eq!(watcher.state(), WatcherState::Disconnected);

    assert_ok!(watcher.connect().await);
    let emails = watcher.poll_once().await.unwrap();

    assert_eq!(emails.iter().map(|e| e.uid).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(watcher.checkpoint(), Checkpoint::new(3));
    assert_eq!(watcher.state(), WatcherState::Idle);
    assert_eq!(saved_checkpoint(&state_file), Checkpoint::new(3));
}

#[tokio::test]
async fn test_backlog_over_cap_keeps_most_recent() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages((1..=25).map(|uid| simple_message(uid, "backlog")));

    let mut watcher = watcher(&mailbox, &state_file, 20);
    watcher.connect().await.unwrap();
    let emails = watcher.poll_once().await.unwrap();

    let uids: Vec<u32> = emails.iter().map(|e| e.uid).collect();
    assert_eq!(uids, (6..=25).collect::<Vec<_>>());
    assert_eq!(watcher.checkpoint(), Checkpoint::new(25));
    assert_eq!(saved_checkpoint(&state_file), Checkpoint::new(25));

    // UIDs 1..=5 are never offered again
    assert!(watcher.poll_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_poll_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages((1..=2).map(|uid| simple_message(uid, "once")));

    let mut watcher = watcher(&mailbox, &state_file, 20);
    watcher.connect().await.unwrap();
    assert_eq!(watcher.poll_once().await.unwrap().len(), 2);

    for _ in 0..3 {
        assert!(watcher.poll_once().await.unwrap().is_empty());
        assert_eq!(watcher.checkpoint(), Checkpoint::new(2));
    }
    assert_eq!(mailbox.state().fetched.len(), 1);
}

#[tokio::test]
async fn test_restart_resumes_from_saved_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages((1..=2).map(|uid| simple_message(uid, "old")));

    {
        let mut first = watcher(&mailbox, &state_file, 20);
        first.connect().await.unwrap();
        first.poll_once().await.unwrap();
        first.close().await;
        assert_eq!(first.state(), WatcherState::Stopped);
    }

    mailbox.deliver(simple_message(3, "new"));

    let mut second = watcher(&mailbox, &state_file, 20);
    assert_eq!(second.checkpoint(), Checkpoint::new(2));
    second.connect().await.unwrap();
    let emails = second.poll_once().await.unwrap();

    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].subject, "new");
}

#[tokio::test]
async fn test_checkpoint_is_highest_fetched_not_searched() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages((1..=3).map(|uid| simple_message(uid, "x")));
    // The server reports a UID it then fails to return
    mailbox.state().phantom_uids.push(99);

    let mut watcher = watcher(&mailbox, &state_file, 20);
    watcher.connect().await.unwrap();
    let emails = watcher.poll_once().await.unwrap();

    assert_eq!(emails.len(), 3);
    assert_eq!(watcher.checkpoint(), Checkpoint::new(3));
}

#[tokio::test]
async fn test_undecodable_message_still_advances_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages([
        simple_message(1, "fine"),
        RawMessage {
            uid: 2,
            ..Default::default()
        },
    ]);

    let mut watcher = watcher(&mailbox, &state_file, 20);
    watcher.connect().await.unwrap();
    let emails = watcher.poll_once().await.unwrap();

    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].uid, 1);
    assert_eq!(saved_checkpoint(&state_file), Checkpoint::new(2));
}

#[tokio::test]
async fn test_checkpoint_save_failure_keeps_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("data");
    let state_file = blocker.join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages((1..=3).map(|uid| simple_message(uid, "retry")));

    let mut watcher = watcher(&mailbox, &state_file, 20);
    watcher.connect().await.unwrap();

    // The state file's parent directory is a regular file
    std::fs::write(&blocker, b"not a directory").unwrap();

    let err = watcher.poll_once().await.unwrap_err();
    assert!(matches!(err, WatchError::Checkpoint(_)));
    assert_eq!(watcher.checkpoint(), Checkpoint::new(0));
    assert_eq!(watcher.state(), WatcherState::Idle);

    // Once the store is writable again the same messages come back
    std::fs::remove_file(&blocker).unwrap();
    let emails = watcher.poll_once().await.unwrap();

    assert_eq!(emails.iter().map(|e| e.uid).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(watcher.checkpoint(), Checkpoint::new(3));
    assert_eq!(saved_checkpoint(&state_file), Checkpoint::new(3));
    let fetched = mailbox.state().fetched.clone();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0], fetched[1]);
}

#[tokio::test]
async fn test_empty_mailbox() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    let mailbox = MemoryMailbox::new();

    let mut watcher = watcher(&mailbox, &state_file, 20);
    watcher.connect().await.unwrap();

    assert!(watcher.poll_once().await.unwrap().is_empty());
    assert_eq!(mailbox.state().searches, 0);
    // Nothing to persist
    assert!(!state_file.exists());
}

#[tokio::test]
async fn test_corrupt_checkpoint_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    std::fs::write(&state_file, b"{\"last_uid\": ").unwrap();

    let session = MailSession::new(MemoryMailbox::new().transport(), "INBOX");
    let decoder = MessageDecoder::new(CharsetRegistry::with_defaults());
    let result = Watcher::new(session, decoder, CheckpointStore::new(&state_file), INTERVAL, 20);

    assert!(result.is_err());
}

#[tokio::test]
async fn test_poll_before_connect_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut watcher = watcher(&MemoryMailbox::new(), &dir.path().join("s.json"), 20);

    let err = watcher.poll_once().await.unwrap_err();
    assert!(matches!(err, WatchError::Fetch(MailError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn test_watch_delivers_then_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages((1..=3).map(|uid| simple_message(uid, "stream")));

    let cancel = CancellationToken::new();
    let (mut emails, mut errors) = watcher(&mailbox, &state_file, 20).watch(cancel.clone());

    // First cycle runs without waiting for a tick
    for expected in 1..=3 {
        let email = emails.recv().await.expect("email");
        assert_eq!(email.uid, expected);
    }

    // Mail arriving later is picked up on the next tick
    mailbox.deliver(simple_message(4, "later"));
    let email = emails.recv().await.expect("email after tick");
    assert_eq!(email.uid, 4);

    cancel.cancel();
    assert!(emails.recv().await.is_none());
    assert!(errors.recv().await.is_none());
    assert!(mailbox.state().logged_out);
    assert_eq!(saved_checkpoint(&state_file), Checkpoint::new(4));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_consumer_is_stalled() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mail_state.json");
    let mailbox = MemoryMailbox::with_messages((1..=5).map(|uid| simple_message(uid, "stalled")));

    let cancel = CancellationToken::new();
    let (mut emails, _errors) = watcher(&mailbox, &state_file, 20).watch(cancel.clone());

    // Let the watcher fill the channel and block on the next send
    let first = emails.recv().await.expect("first email");
    assert_eq!(first.uid, 1);
    tokio::time::sleep(Duration::from_millis(10)).await;

    cancel.cancel();

    // Whatever was handed over before cancellation is in order; the rest of
    // the cycle is dropped and the stream ends
    let mut rest = Vec::new();
    while let Some(email) = emails.recv().await {
        rest.push(email.uid);
    }
    assert!(rest.len() < 4, "delivery should stop after cancel: {:?}", rest);
    assert!(rest.windows(2).all(|w| w[0] < w[1]));

    // The cycle completed before delivery, so the checkpoint covers it all
    assert_eq!(saved_checkpoint(&state_file), Checkpoint::new(5));
}

#[tokio::test]
async fn test_connect_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = MemoryMailbox::with_messages([simple_message(1, "never seen")]);
    mailbox.state().fail_connect = Some(MailError::Auth("invalid credentials".to_string()));

    let (mut emails, mut errors) =
        watcher(&mailbox, &dir.path().join("s.json"), 20).watch(CancellationToken::new());

    let err = errors.recv().await.expect("connect error");
    assert!(matches!(err, WatchError::Connect(MailError::Auth(_))));
    assert!(errors.recv().await.is_none());
    assert!(emails.recv().await.is_none());
    assert_eq!(mailbox.state().connects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_error_is_reported_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = MemoryMailbox::with_messages([simple_message(1, "after the error")]);
    mailbox.state().fail_search = 1;

    let cancel = CancellationToken::new();
    let (mut emails, mut errors) =
        watcher(&mailbox, &dir.path().join("s.json"), 20).watch(cancel.clone());

    let err = errors.recv().await.expect("cycle error");
    assert!(matches!(err, WatchError::Fetch(MailError::Network(_))));

    let email = emails.recv().await.expect("email on the next tick");
    assert_eq!(email.uid, 1);
    assert_eq!(mailbox.state().searches, 2);

    cancel.cancel();
    assert!(emails.recv().await.is_none());
}
