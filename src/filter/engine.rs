use log::{debug, warn};

use crate::error::EvalError;
use crate::models::{Alert, Email, Rule};

use super::matcher::evaluate;

/// Résultat du score d'une règle sur un email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleScore {
    pub score: u32,
    /// Descriptions des conditions satisfaites, dans l'ordre de déclaration
    pub reasons: Vec<String>,
}

impl RuleScore {
    pub fn reason(&self) -> String {
        self.reasons.join(", ")
    }
}

/// Calcule le score de chaque règle active pour les emails reçus.
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Somme des poids des conditions satisfaites pour une règle.
    ///
    /// La première condition impossible à évaluer abandonne toute la règle.
    pub fn score_rule(rule: &Rule, email: &Email) -> Result<RuleScore, EvalError> {
        let mut result = RuleScore::default();

        for condition in &rule.conditions {
            if let Some(description) = evaluate(condition, email)? {
                result.score = result.score.saturating_add(condition.weight);
                result.reasons.push(description);
            }
        }

        Ok(result)
    }

    /// Renvoie une alerte par règle active dont le score atteint le seuil,
    /// dans l'ordre de chargement des règles.
    pub fn process<'a>(&'a self, email: &'a Email) -> Vec<Alert<'a>> {
        let mut alerts = Vec::new();

        for rule in self.rules.iter().filter(|r| r.enabled) {
            let scored = match Self::score_rule(rule, email) {
                Ok(scored) => scored,
                Err(e) => {
                    warn!("⚠️  Règle '{}' ignorée pour l'UID {} : {}", rule.name, email.uid, e);
                    continue;
                }
            };

            debug!(
                "Règle '{}' : score {} (min. {}) pour l'UID {}",
                rule.name, scored.score, rule.min_score, email.uid
            );

            if scored.score >= rule.min_score {
                alerts.push(Alert::new(email, rule, scored.score, scored.reason()));
            }
        }

        alerts
    }
}
