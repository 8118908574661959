use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, warn};

use super::Notifier;
use crate::models::Alert;

/// Compteurs d'envoi pour une alerte.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// Actions sans notificateur, ou dont le notificateur a déjà reçu l'alerte
    pub skipped: usize,
}

/// Aiguille les alertes vers les notificateurs selon le type d'action.
#[derive(Default)]
pub struct NotifierManager {
    notifiers: HashMap<String, Arc<dyn Notifier>>,
    fallback: Option<Arc<dyn Notifier>>,
}

impl NotifierManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Utilisé pour tout type d'action sans notificateur dédié.
    pub fn with_fallback(mut self, notifier: Arc<dyn Notifier>) -> Self {
        info!("Notificateur de repli : {}", notifier.name());
        self.fallback = Some(notifier);
        self
    }

    /// Enregistre `notifier` pour `action_type`. Renvoie false sans rien
    /// garder quand le notificateur se déclare indisponible.
    pub fn register(&mut self, action_type: impl Into<String>, notifier: Arc<dyn Notifier>) -> bool {
        let action_type = action_type.into();
        if !notifier.is_available() {
            warn!("⚠️  Notificateur {} indisponible, non enregistré pour '{}'", notifier.name(), action_type);
            return false;
        }
        info!("Notificateur {} enregistré pour '{}'", notifier.name(), action_type);
        self.notifiers.insert(action_type, notifier);
        true
    }

    pub fn has_notifier(&self, action_type: &str) -> bool {
        self.resolve(action_type).is_some()
    }

    /// Types d'action enregistrés, triés.
    pub fn available(&self) -> Vec<String> {
        let mut types: Vec<String> = self.notifiers.keys().cloned().collect();
        types.sort();
        types
    }

    fn resolve(&self, action_type: &str) -> Option<&Arc<dyn Notifier>> {
        self.notifiers
            .get(action_type)
            .or(self.fallback.as_ref())
            .filter(|n| n.is_available())
    }

    /// Envoie `alert` par le notificateur de `action_type`.
    pub async fn send(&self, action_type: &str, alert: &Alert<'_>) -> Result<()> {
        match self.resolve(action_type) {
            Some(notifier) => notifier.send(alert).await,
            None => anyhow::bail!("aucun notificateur pour l'action '{}'", action_type),
        }
    }

    /// Exécute les actions de la règle dans l'ordre, après le délai de chacune.
    ///
    /// L'échec d'un notificateur n'arrête pas les autres. L'alerte est marquée
    /// traitée dès qu'un notificateur l'a acceptée.
    pub async fn dispatch(&self, alert: &mut Alert<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut notified = HashSet::new();
        let rule = alert.rule;

        for action in &rule.actions {
            let Some(notifier) = self.resolve(&action.kind) else {
                warn!("⚠️  Aucun notificateur pour l'action '{}' de la règle '{}'", action.kind, rule.name);
                report.skipped += 1;
                continue;
            };

            if !notified.insert(notifier.name().to_string()) {
                debug!("{} a déjà reçu l'alerte {}", notifier.name(), alert.id);
                report.skipped += 1;
                continue;
            }

            if action.delay > 0 {
                debug!("Attente de {}s avant l'action '{}'", action.delay, action.kind);
                tokio::time::sleep(Duration::from_secs(action.delay)).await;
            }

            match notifier.send(alert).await {
                Ok(()) => {
                    info!("✅ Alerte '{}' envoyée via {}", rule.name, notifier.name());
                    report.sent += 1;
                }
                Err(e) => {
                    error!("❌ Échec de {} pour l'alerte '{}' : {:#}", notifier.name(), rule.name, e);
                    report.failed += 1;
                }
            }
        }

        if report.sent > 0 {
            alert.mark_processed();
        }
        report
    }
}
