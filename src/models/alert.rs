use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::email::Email;
use super::rule::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertLevel {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl AlertLevel {
    /// 90+ critique, 75-89 haute, 65-74 moyenne, en dessous basse.
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => AlertLevel::Critical,
            75..=89 => AlertLevel::High,
            65..=74 => AlertLevel::Medium,
            _ => AlertLevel::Low,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            AlertLevel::Low => "🔵",
            AlertLevel::Medium => "🟡",
            AlertLevel::High => "🟠",
            AlertLevel::Critical => "🔴",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertLevel::Low => "low",
            AlertLevel::Medium => "medium",
            AlertLevel::High => "high",
            AlertLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Règle déclenchée. Emprunte l'email et la règle dont elle vient.
#[derive(Debug, Clone)]
pub struct Alert<'a> {
    pub id: Uuid,
    pub email: &'a Email,
    pub rule: &'a Rule,
    /// Somme des poids satisfaits, non plafonnée à 100
    pub score: u32,
    pub level: AlertLevel,
    /// Conditions satisfaites, séparées par des virgules, dans l'ordre de déclaration
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// Positionné dès qu'un notificateur a accepté l'alerte
    pub processed: bool,
}

impl<'a> Alert<'a> {
    pub fn new(email: &'a Email, rule: &'a Rule, score: u32, reason: String) -> Self {
        Alert {
            id: Uuid::new_v4(),
            email,
            rule,
            score,
            level: AlertLevel::from_score(score),
            reason,
            created_at: Utc::now(),
            processed: false,
        }
    }

    pub fn mark_processed(&mut self) {
        self.processed = true;
    }

    /// Résumé sur plusieurs lignes utilisé par les notificateurs.
    pub fn message(&self) -> String {
        format!(
            "{} {}\nSubject: {}\nFrom: {}\nScore: {}/100 ({})\nReason: {}",
            self.level.marker(),
            self.rule.name,
            self.email.subject,
            self.email.from,
            self.score,
            self.level,
            self.reason
        )
    }
}
