use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::error::WatchError;
use crate::filter::RuleEngine;
use crate::models::Email;
use crate::notifier::NotifierManager;

/// Totaux d'un traitement
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingSummary {
    pub emails_processed: usize,
    pub alerts_raised: usize,
    /// Alertes acceptées par au moins un notificateur
    pub alerts_delivered: usize,
    pub errors: usize,
}

impl ProcessingSummary {
    pub fn merge(&mut self, other: ProcessingSummary) {
        self.emails_processed += other.emails_processed;
        self.alerts_raised += other.alerts_raised;
        self.alerts_delivered += other.alerts_delivered;
        self.errors += other.errors;
    }
}

/// Calcule le score des emails et confie les alertes aux notificateurs.
pub struct AlertProcessor {
    engine: RuleEngine,
    notifiers: NotifierManager,
}

impl AlertProcessor {
    pub fn new(engine: RuleEngine, notifiers: NotifierManager) -> Self {
        Self { engine, notifiers }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub async fn process_email(&self, email: &Email) -> ProcessingSummary {
        let mut summary = ProcessingSummary {
            emails_processed: 1,
            ..Default::default()
        };

        let alerts = self.engine.process(email);
        if alerts.is_empty() {
            debug!("Aucune règle pour l'UID {}", email.uid);
            return summary;
        }

        for mut alert in alerts {
            info!(
                "{} Règle '{}' déclenchée pour l'UID {} (score {}, {})",
                alert.level.marker(),
                alert.rule.name,
                email.uid,
                alert.score,
                alert.level
            );
            summary.alerts_raised += 1;

            self.notifiers.dispatch(&mut alert).await;
            if alert.processed {
                summary.alerts_delivered += 1;
            }
        }

        summary
    }

    /// Consomme les deux flux de la surveillance jusqu'à la fin du flux d'emails.
    pub async fn run(
        &self,
        mut emails: mpsc::Receiver<Email>,
        mut errors: mpsc::Receiver<WatchError>,
    ) -> ProcessingSummary {
        let mut summary = ProcessingSummary::default();
        let mut errors_open = true;

        loop {
            tokio::select! {
                email = emails.recv() => match email {
                    Some(email) => summary.merge(self.process_email(&email).await),
                    None => break,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(e) => {
                        error!("❌ Erreur de surveillance : {}", e);
                        summary.errors += 1;
                    }
                    None => errors_open = false,
                },
            }
        }

        // Erreurs envoyées juste avant l'arrêt de la surveillance
        while let Ok(e) = errors.try_recv() {
            error!("❌ Erreur de surveillance : {}", e);
            summary.errors += 1;
        }

        info!(
            "📊 {} email(s) traité(s), {} alerte(s) levée(s), {} livrée(s), {} erreur(s)",
            summary.emails_processed, summary.alerts_raised, summary.alerts_delivered, summary.errors
        );
        summary
    }
}
