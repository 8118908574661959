// Exports de la bibliothèque mailalert
// Permet aux tests et au binaire d'utiliser les modules

pub mod charset;
pub mod checkpoint;
pub mod config;
pub mod decoder;
pub mod error;
pub mod imap_client;
pub mod models;
pub mod watcher;

// Calcul du score des règles
pub mod filter;

// Envoi des alertes
pub mod diagnostics;
pub mod notifier;
pub mod processor;
