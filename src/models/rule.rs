use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Champ du message examiné par une condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    #[serde(alias = "sender")]
    From,
    Subject,
    Body,
    /// En-tête nommé, voir [`Condition::field`]
    Header,
}

/// Comparaison appliquée au champ choisi, toujours sans distinction de casse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Contains,
    Equals,
    #[serde(alias = "starts_with")]
    StartsWith,
    #[serde(alias = "ends_with")]
    EndsWith,
    Matches,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Contains => "contains",
            Operator::Equals => "equals",
            Operator::StartsWith => "starts with",
            Operator::EndsWith => "ends with",
            Operator::Matches => "matches",
        };
        f.write_str(name)
    }
}

/// Prédicat pondéré sur un seul champ du message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    /// Nom de l'en-tête, utilisé seulement quand `kind` vaut `header`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub operator: Operator,
    pub value: String,
    #[serde(default)]
    pub weight: u32,
}

impl Condition {
    pub fn new(kind: ConditionKind, operator: Operator, value: impl Into<String>, weight: u32) -> Self {
        Condition {
            kind,
            field: None,
            operator,
            value: value.into(),
            weight,
        }
    }

    pub fn header(
        name: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
        weight: u32,
    ) -> Self {
        Condition {
            kind: ConditionKind::Header,
            field: Some(name.into()),
            operator,
            value: value.into(),
            weight,
        }
    }
}

/// Action à mener quand une règle se déclenche. Interprétée par les notificateurs, pas par le moteur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    /// Secondes d'attente avant l'envoi
    #[serde(default)]
    pub delay: u64,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Action {
            kind: kind.into(),
            delay: 0,
            config: serde_json::Value::Null,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> i32 {
    50
}

fn default_min_score() -> u32 {
    60
}

/// Ensemble nommé de conditions pondérées avec un seuil de déclenchement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Indication d'ordre seulement, ignorée par le score.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_min_score")]
    pub min_score: u32,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Rule {
            name: name.into(),
            description: String::new(),
            enabled: true,
            conditions: Vec::new(),
            actions: Vec::new(),
            priority: default_priority(),
            min_score: default_min_score(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_min_score(mut self, min_score: u32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("le nom de la règle ne peut pas être vide");
        }
        if self.conditions.is_empty() {
            anyhow::bail!("la règle doit avoir au moins une condition");
        }
        if self.actions.is_empty() {
            anyhow::bail!("la règle doit avoir au moins une action");
        }
        if self.min_score > 100 {
            anyhow::bail!("min_score doit être entre 0 et 100, reçu {}", self.min_score);
        }
        for (index, condition) in self.conditions.iter().enumerate() {
            let names_header = condition
                .field
                .as_deref()
                .is_some_and(|f| !f.trim().is_empty());
            if condition.kind == ConditionKind::Header && !names_header {
                anyhow::bail!("condition {} : une condition sur en-tête demande un champ field", index);
            }
        }
        Ok(())
    }
}

/// Vérifie chaque règle et l'unicité des noms.
pub fn validate_rules(rules: &[Rule]) -> Result<()> {
    if rules.is_empty() {
        anyhow::bail!("au moins une règle est requise");
    }

    let mut names = HashSet::new();
    for (index, rule) in rules.iter().enumerate() {
        rule.validate()
            .map_err(|e| anyhow::anyhow!("règle {} ('{}') : {}", index, rule.name, e))?;
        if !names.insert(rule.name.as_str()) {
            anyhow::bail!("nom de règle en double : {}", rule.name);
        }
    }
    Ok(())
}
