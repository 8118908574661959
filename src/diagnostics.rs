// Vérifications manuelles lancées par `--test-engine` et `--test-notifier`

use std::fmt::Write as _;

use anyhow::Result;
use log::{info, warn};

use crate::filter::RuleEngine;
use crate::models::{Alert, Email, Rule};
use crate::notifier::NotifierManager;

/// Score donné à l'alerte de test, niveau "high".
pub const TEST_ALERT_SCORE: u32 = 85;

/// Email fictif utilisé pour essayer les règles et les notificateurs.
pub fn sample_email() -> Email {
    let mut email = Email::new(0);
    email.from = "Med Office <med@hse.ru>".to_string();
    email.subject = "Registration for the annual medical exam".to_string();
    email.body = "Dear colleagues, registration for the annual medical exam is open.".to_string();
    email.message_id = "<sample@mailalert>".to_string();
    email
}

/// Passe `email` dans le moteur et décrit les alertes produites puis les
/// règles chargées.
pub fn engine_report(engine: &RuleEngine, email: &Email) -> String {
    let alerts = engine.process(email);
    let mut report = String::new();

    let _ = writeln!(report, "📧 Email de test");
    let _ = writeln!(report, "  De : {}", email.from);
    let _ = writeln!(report, "  Sujet : {}", email.subject);
    let _ = writeln!(report);

    if alerts.is_empty() {
        let _ = writeln!(report, "Aucune alerte créée");
    } else {
        let _ = writeln!(report, "🚨 Alertes ({}) :", alerts.len());
        for (index, alert) in alerts.iter().enumerate() {
            let _ = writeln!(
                report,
                "  {}. {} {} : score {} ({})",
                index + 1,
                alert.level.marker(),
                alert.rule.name,
                alert.score,
                alert.reason
            );
        }
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "📋 Règles chargées ({}) :", engine.rules().len());
    for rule in engine.rules() {
        let status = if rule.enabled { "activée" } else { "désactivée" };
        let _ = writeln!(
            report,
            "  - {} [{}] (score min. {}, priorité {})",
            rule.name, status, rule.min_score, rule.priority
        );
    }

    report
}

/// Envoie une alerte de test par le notificateur de `action_type`.
///
/// Renvoie `Ok(false)` sans rien envoyer quand aucun notificateur ne gère ce
/// type d'action.
pub async fn send_test_alert(manager: &NotifierManager, action_type: &str) -> Result<bool> {
    info!("Notificateurs disponibles : {:?}", manager.available());

    if !manager.has_notifier(action_type) {
        warn!("⚠️  Aucun notificateur disponible pour '{}'", action_type);
        return Ok(false);
    }

    let email = sample_email();
    let rule = Rule::new("Test rule");
    let alert = Alert::new(
        &email,
        &rule,
        TEST_ALERT_SCORE,
        "manual notifier check".to_string(),
    );

    info!("Envoi d'une alerte de test via '{}'...", action_type);
    manager.send(action_type, &alert).await?;
    info!("✅ Alerte de test envoyée");
    Ok(true)
}
