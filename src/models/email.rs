use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

/// En-têtes du message, sans distinction de casse, dans l'ordre d'apparition.
///
/// Réinsérer un nom déjà présent (quelle que soit la casse) remplace la valeur
/// sans changer sa position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: IndexMap<String, (String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        let key = name.trim().to_ascii_lowercase();
        match self.entries.get_mut(&key) {
            Some(entry) => entry.1 = value.to_string(),
            None => {
                self.entries
                    .insert(key, (name.trim().to_string(), value.to_string()));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.trim().to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Paires `(nom, valeur)`, le nom tel que vu la première fois.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pièce jointe vue au décodage. Seules les métadonnées sont gardées.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: Option<String>,
    pub content_type: String,
    pub size: usize,
}

/// Message décodé, en lecture seule une fois rendu par le décodeur.
#[derive(Debug, Clone)]
pub struct Email {
    pub id: Uuid,
    /// UID sous lequel le message a été récupéré
    pub uid: u32,
    pub message_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: String,
    pub headers: HeaderMap,
    pub links: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub received_at: DateTime<Utc>,
    pub size: usize,
}

impl Email {
    pub fn new(uid: u32) -> Self {
        Email {
            id: Uuid::new_v4(),
            uid,
            message_id: String::new(),
            from: String::new(),
            to: Vec::new(),
            subject: String::new(),
            body: String::new(),
            html: String::new(),
            headers: HeaderMap::new(),
            links: Vec::new(),
            attachments: Vec::new(),
            received_at: Utc::now(),
            size: 0,
        }
    }

    /// Vrai dès qu'un corps texte ou HTML est présent.
    pub fn has_content(&self) -> bool {
        !self.body.trim().is_empty() || !self.html.trim().is_empty()
    }

    /// Domaine de l'expéditeur : `Jane <jane@hse.ru>` donne `hse.ru`.
    pub fn sender_domain(&self) -> Option<&str> {
        let (_, domain) = self.from.rsplit_once('@')?;
        let domain = domain.trim_end_matches('>').trim();
        (!domain.is_empty()).then_some(domain)
    }

    pub fn has_link(&self, pattern: &str) -> bool {
        self.links.iter().any(|link| link.contains(pattern))
    }
}
