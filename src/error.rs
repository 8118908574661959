use std::path::PathBuf;

use thiserror::Error;

/// Erreurs du fichier de checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("impossible d'accéder au fichier de checkpoint {} : {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fichier de checkpoint {} corrompu : {}", .path.display(), .source)]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("impossible de sérialiser le checkpoint : {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Erreurs de dialogue avec le serveur mail.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("échec d'authentification : {0}")]
    Auth(String),

    #[error("erreur réseau : {0}")]
    Network(String),

    #[error("erreur de protocole IMAP : {0}")]
    Protocol(String),

    #[error("session mail non connectée")]
    NotConnected,
}

/// Erreurs publiées sur le canal d'erreurs de la surveillance.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Fatale : la surveillance s'arrête après l'avoir signalée.
    #[error("échec de connexion : {0}")]
    Connect(MailError),

    /// Limitée au cycle : la surveillance reprend au tick suivant.
    #[error("échec de la vérification des mails : {0}")]
    Fetch(MailError),

    /// Limitée au cycle : rien n'est livré et le checkpoint en mémoire est conservé.
    #[error("checkpoint non sauvegardé : {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Erreurs de décodage d'un message ou d'une partie.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("le message {uid} n'a produit aucun contenu")]
    Empty { uid: u32 },

    #[error("encodage de transfert non supporté : {0}")]
    UnsupportedEncoding(String),

    #[error("données quoted-printable invalides : {0}")]
    QuotedPrintable(String),

    #[error("charset inconnu : {0}")]
    UnknownCharset(String),
}

/// Condition impossible à évaluer. Seule la règle concernée est abandonnée.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("expression régulière invalide {pattern:?} : {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("la condition sur en-tête ne nomme aucun en-tête")]
    MissingHeaderName,
}
