//! Envoi des alertes. Le cœur ne fait que les produire, les destinations sont ici.

mod console;
mod manager;
mod slack;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Alert;

pub use console::ConsoleNotifier;
pub use manager::{DispatchReport, NotifierManager};
pub use slack::SlackNotifier;

/// Destination des alertes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert<'_>) -> Result<()>;

    fn name(&self) -> &str;

    /// Un notificateur indisponible n'est jamais enregistré.
    fn is_available(&self) -> bool;
}
