use chrono::{DateTime, Utc};

/// Champs de l'enveloppe renvoyés par le serveur, déjà décodés en texte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: String,
    pub subject: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Un message tel que récupéré, avant décodage.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub uid: u32,
    pub envelope: Option<Envelope>,
    pub internal_date: Option<DateTime<Utc>>,
    pub size: usize,
    /// Message complet, en-têtes compris (`BODY[]`)
    pub full: Option<Vec<u8>>,
    /// Corps sans les en-têtes de premier niveau (`BODY[TEXT]`)
    pub text: Option<Vec<u8>>,
}

impl RawMessage {
    pub fn new(uid: u32, full: impl Into<Vec<u8>>) -> Self {
        let full = full.into();
        RawMessage {
            uid,
            size: full.len(),
            full: Some(full),
            ..Default::default()
        }
    }
}
