#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mailalert::error::MailError;
use mailalert::imap_client::MailTransport;
use mailalert::models::RawMessage;

pub fn fixture(name: &str) -> Vec<u8> {
    let path = format!("data_test/{}", name);
    fs::read(&path).unwrap_or_else(|e| panic!("Failed to read test email file {}: {}", path, e))
}

/// Minimal message with the given subject.
pub fn simple_message(uid: u32, subject: &str) -> RawMessage {
    let body = format!(
        "From: sender{uid}@hse.ru\r\nSubject: {subject}\r\nMessage-ID: <{uid}@test>\r\n\r\nBody of message {uid}\r\n"
    );
    RawMessage::new(uid, body.into_bytes())
}

#[derive(Default)]
pub struct MailboxState {
    pub messages: BTreeMap<u32, RawMessage>,
    /// Returned by searches on top of the stored messages
    pub phantom_uids: Vec<u32>,
    pub fail_connect: Option<MailError>,
    pub fail_search: usize,
    pub connects: usize,
    pub searches: usize,
    pub fetched: Vec<Vec<u32>>,
    pub logged_out: bool,
}

/// In-memory mailbox shared between a test and the transport it hands out.
#[derive(Clone, Default)]
pub struct MemoryMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: impl IntoIterator<Item = RawMessage>) -> Self {
        let mailbox = Self::new();
        for message in messages {
            mailbox.deliver(message);
        }
        mailbox
    }

    pub fn deliver(&self, message: RawMessage) {
        self.state().messages.insert(message.uid, message);
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap()
    }

    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            state: self.state.clone(),
            connected: false,
        }
    }
}

pub struct MemoryTransport {
    state: Arc<Mutex<MailboxState>>,
    connected: bool,
}

impl MemoryTransport {
    fn check(&self) -> Result<(), MailError> {
        if self.connected {
            Ok(())
        } else {
            Err(MailError::NotConnected)
        }
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn connect(&mut self) -> Result<(), MailError> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if let Some(e) = state.fail_connect.take() {
            return Err(e);
        }
        self.connected = true;
        Ok(())
    }

    async fn select(&mut self, _mailbox: &str) -> Result<u32, MailError> {
        self.check()?;
        Ok(self.state.lock().unwrap().messages.len() as u32)
    }

    async fn search_uids_above(&mut self, uid: u32) -> Result<Vec<u32>, MailError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.searches += 1;
        if state.fail_search > 0 {
            state.fail_search -= 1;
            return Err(MailError::Network("connection reset by peer".to_string()));
        }
        let mut found: Vec<u32> = state.messages.keys().copied().filter(|&u| u > uid).collect();
        found.extend(state.phantom_uids.iter().copied());
        Ok(found)
    }

    async fn fetch(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>, MailError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.fetched.push(uids.to_vec());
        // Newest first, to check the session sorts
        Ok(uids
            .iter()
            .rev()
            .filter_map(|uid| state.messages.get(uid).cloned())
            .collect())
    }

    async fn logout(&mut self) -> Result<(), MailError> {
        self.connected = false;
        self.state.lock().unwrap().logged_out = true;
        Ok(())
    }
}
