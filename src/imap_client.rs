use std::borrow::Cow;

use async_imap::imap_proto::{Address, Envelope as ImapEnvelope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio_native_tls::{native_tls, TlsStream};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::checkpoint::Checkpoint;
use crate::config::ImapConfig;
use crate::decoder::{decode_header_value, format_address};
use crate::error::MailError;
use crate::models::{Envelope, RawMessage};

/// Éléments demandés pour chaque nouveau message.
const FETCH_ITEMS: &str = "(UID ENVELOPE INTERNALDATE RFC822.SIZE BODY.PEEK[] BODY.PEEK[TEXT])";

/// Opérations serveur utilisées par la session mail.
#[async_trait]
pub trait MailTransport: Send {
    async fn connect(&mut self) -> Result<(), MailError>;

    /// Sélectionne `mailbox` et renvoie son nombre de messages.
    async fn select(&mut self, mailbox: &str) -> Result<u32, MailError>;

    /// UID strictement supérieurs à `uid`, dans un ordre quelconque.
    async fn search_uids_above(&mut self, uid: u32) -> Result<Vec<u32>, MailError>;

    async fn fetch(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>, MailError>;

    async fn logout(&mut self) -> Result<(), MailError>;
}

type ImapSession = async_imap::Session<Compat<TlsStream<TcpStream>>>;

/// IMAP sur TLS implicite.
pub struct ImapTransport {
    config: ImapConfig,
    session: Option<ImapSession>,
}

impl ImapTransport {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut ImapSession, MailError> {
        self.session.as_mut().ok_or(MailError::NotConnected)
    }

    async fn connect_tls(&self) -> Result<Compat<TlsStream<TcpStream>>, MailError> {
        let tcp_stream = TcpStream::connect((self.config.server.as_str(), self.config.port))
            .await
            .map_err(|e| MailError::Network(format!("connexion TCP à {} impossible : {}", self.config.server, e)))?;

        let connector = native_tls::TlsConnector::new()
            .map(tokio_native_tls::TlsConnector::from)
            .map_err(|e| MailError::Network(format!("initialisation TLS impossible : {}", e)))?;

        let tls_stream = connector
            .connect(&self.config.server, tcp_stream)
            .await
            .map_err(|e| MailError::Network(format!("échec de la négociation TLS : {}", e)))?;

        // async-imap attend un flux futures-io
        Ok(tls_stream.compat())
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    async fn connect(&mut self) -> Result<(), MailError> {
        info!("Connexion au serveur IMAP {}:{}", self.config.server, self.config.port);

        let tls_stream = self.connect_tls().await?;
        let client = async_imap::Client::new(tls_stream);

        let session = client
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|(e, _)| match e {
                async_imap::error::Error::Io(io) => MailError::Network(io.to_string()),
                async_imap::error::Error::ConnectionLost => {
                    MailError::Network("connexion perdue pendant l'authentification".to_string())
                }
                other => MailError::Auth(other.to_string()),
            })?;

        self.session = Some(session);
        info!("✅ Connexion IMAP établie avec succès ({})", self.config.username);
        Ok(())
    }

    async fn select(&mut self, mailbox: &str) -> Result<u32, MailError> {
        let selected = self
            .session()?
            .select(mailbox)
            .await
            .map_err(|e| protocol_error("SELECT", e))?;
        Ok(selected.exists)
    }

    async fn search_uids_above(&mut self, uid: u32) -> Result<Vec<u32>, MailError> {
        // `N:*` renvoie toujours le plus grand UID, même s'il est inférieur à N
        let query = format!("UID {}:*", uid.saturating_add(1));
        debug!("UID SEARCH {}", query);

        let found = self
            .session()?
            .uid_search(&query)
            .await
            .map_err(|e| protocol_error("UID SEARCH", e))?;

        Ok(found.into_iter().filter(|&found| found > uid).collect())
    }

    async fn fetch(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>, MailError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let sequence = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let fetches: Vec<_> = self
            .session()?
            .uid_fetch(&sequence, FETCH_ITEMS)
            .await
            .map_err(|e| protocol_error("UID FETCH", e))?
            .try_collect()
            .await
            .map_err(|e| protocol_error("UID FETCH", e))?;

        let mut messages = Vec::with_capacity(fetches.len());
        for fetch in &fetches {
            match fetch.uid {
                Some(uid) => messages.push(RawMessage {
                    uid,
                    envelope: fetch.envelope().map(convert_envelope),
                    internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
                    size: fetch.size.map(|s| s as usize).unwrap_or_default(),
                    full: fetch.body().map(<[u8]>::to_vec),
                    text: fetch.text().map(<[u8]>::to_vec),
                }),
                None => warn!("⚠️  Réponse FETCH sans UID ignorée"),
            }
        }

        Ok(messages)
    }

    async fn logout(&mut self) -> Result<(), MailError> {
        match self.session.take() {
            Some(mut session) => {
                info!("Déconnexion du serveur IMAP");
                session
                    .logout()
                    .await
                    .map_err(|e| protocol_error("LOGOUT", e))
            }
            None => Ok(()),
        }
    }
}

fn protocol_error(command: &str, e: async_imap::error::Error) -> MailError {
    match e {
        async_imap::error::Error::Io(io) => MailError::Network(format!("{} : {}", command, io)),
        async_imap::error::Error::ConnectionLost => {
            MailError::Network(format!("{} : connexion perdue", command))
        }
        other => MailError::Protocol(format!("{} : {}", command, other)),
    }
}

fn convert_envelope(envelope: &ImapEnvelope<'_>) -> Envelope {
    let text = |value: &Option<Cow<'_, [u8]>>| -> String {
        value.as_deref().map(decode_header_value).unwrap_or_default()
    };

    let addresses = |list: &Option<Vec<Address<'_>>>| -> Vec<String> {
        list.iter()
            .flatten()
            .filter_map(|addr| {
                let mailbox = addr.mailbox.as_deref().map(String::from_utf8_lossy)?;
                let address = match addr.host.as_deref() {
                    Some(host) => format!("{}@{}", mailbox, String::from_utf8_lossy(host)),
                    None => mailbox.into_owned(),
                };
                let name = addr.name.as_deref().map(decode_header_value);
                Some(format_address(name.as_deref(), &address))
            })
            .collect()
    };

    let date = envelope
        .date
        .as_deref()
        .and_then(|d| mailparse::dateparse(&String::from_utf8_lossy(d)).ok())
        .and_then(|ts| DateTime::from_timestamp(ts, 0));

    Envelope {
        message_id: text(&envelope.message_id),
        subject: text(&envelope.subject),
        from: addresses(&envelope.from),
        to: addresses(&envelope.to),
        date,
    }
}

/// Messages rendus par un cycle de récupération.
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Par UID croissant
    pub messages: Vec<RawMessage>,
    /// Checkpoint d'entrée avancé jusqu'au plus grand UID réellement récupéré
    pub checkpoint: Checkpoint,
}

/// Une boîte sur un serveur, interrogée de façon incrémentale par UID.
pub struct MailSession<T: MailTransport> {
    transport: T,
    mailbox: String,
    connected: bool,
}

impl<T: MailTransport> MailSession<T> {
    pub fn new(transport: T, mailbox: impl Into<String>) -> Self {
        Self {
            transport,
            mailbox: mailbox.into(),
            connected: false,
        }
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn connect(&mut self) -> Result<(), MailError> {
        self.transport.connect().await?;
        self.connected = true;
        Ok(())
    }

    /// Récupère les messages d'UID supérieur à `checkpoint`, au plus `cap`.
    ///
    /// S'il y en a davantage, seuls les `cap` plus récents sont récupérés et
    /// les plus anciens sont sautés définitivement : le checkpoint rendu les dépasse.
    pub async fn fetch_new_since(
        &mut self,
        checkpoint: Checkpoint,
        cap: usize,
    ) -> Result<FetchBatch, MailError> {
        if !self.connected {
            return Err(MailError::NotConnected);
        }

        let exists = self.transport.select(&self.mailbox).await?;
        if exists == 0 {
            debug!("La boîte {} est vide", self.mailbox);
            return Ok(FetchBatch {
                messages: Vec::new(),
                checkpoint,
            });
        }

        let found = self.transport.search_uids_above(checkpoint.last_uid).await?;
        let uids = select_recent(found, checkpoint.last_uid, cap);
        if uids.is_empty() {
            debug!("Aucun nouveau message au-delà de {}", checkpoint);
            return Ok(FetchBatch {
                messages: Vec::new(),
                checkpoint,
            });
        }

        info!("📬 Récupération de {} nouveau(x) message(s) dans {}", uids.len(), self.mailbox);
        let mut messages = self.transport.fetch(&uids).await?;
        messages.sort_by_key(|m| m.uid);

        let checkpoint = messages
            .iter()
            .map(|m| m.uid)
            .max()
            .map_or(checkpoint, |max| checkpoint.advance(max));

        Ok(FetchBatch {
            messages,
            checkpoint,
        })
    }

    /// Se déconnecte. Sans effet si la session n'est pas connectée.
    pub async fn close(&mut self) -> Result<(), MailError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.transport.logout().await
    }
}

/// UID triés supérieurs à `last_uid`, en ne gardant que les `cap` plus grands.
fn select_recent(found: Vec<u32>, last_uid: u32, cap: usize) -> Vec<u32> {
    let mut uids: Vec<u32> = found.into_iter().filter(|&uid| uid > last_uid).collect();
    uids.sort_unstable();
    uids.dedup();

    if uids.len() > cap {
        let skipped = uids.len() - cap;
        warn!(
            "⚠️  {} messages non lus dépassent la limite de {}, les {} plus anciens sont ignorés",
            uids.len(),
            cap,
            skipped
        );
        uids.drain(..skipped);
    }

    uids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_recent_under_cap() {
        assert_eq!(select_recent(vec![9, 7, 8], 6, 20), vec![7, 8, 9]);
    }

    #[test]
    fn test_select_recent_keeps_highest() {
        let found: Vec<u32> = (1..=25).rev().collect();
        let selected = select_recent(found, 0, 20);

        assert_eq!(selected.len(), 20);
        assert_eq!(selected.first(), Some(&6));
        assert_eq!(selected.last(), Some(&25));
    }

    #[test]
    fn test_select_recent_drops_already_seen() {
        // Une recherche `N:*` renvoie le dernier message même s'il n'est pas nouveau
        assert!(select_recent(vec![5], 5, 20).is_empty());
        assert_eq!(select_recent(vec![5, 6, 6], 5, 20), vec![6]);
    }
}
