use regex::RegexBuilder;

use crate::error::EvalError;
use crate::models::{Condition, ConditionKind, Email, Operator};

/// Évalue une condition sur un email.
///
/// Renvoie la description lisible de la correspondance, ou `None` si la
/// condition n'est pas satisfaite. Un champ vide ne correspond jamais.
pub fn evaluate(condition: &Condition, email: &Email) -> Result<Option<String>, EvalError> {
    let (field_name, value) = select_field(condition, email)?;

    if value.is_empty() {
        return Ok(None);
    }

    if !compare(condition.operator, value, &condition.value)? {
        return Ok(None);
    }

    Ok(Some(format!(
        "{} {} \"{}\"",
        field_name, condition.operator, condition.value
    )))
}

fn select_field<'e>(condition: &Condition, email: &'e Email) -> Result<(String, &'e str), EvalError> {
    match condition.kind {
        ConditionKind::From => Ok(("sender".to_string(), email.from.as_str())),
        ConditionKind::Subject => Ok(("subject".to_string(), email.subject.as_str())),
        ConditionKind::Body => Ok(("body".to_string(), email.body.as_str())),
        ConditionKind::Header => {
            let name = condition
                .field
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or(EvalError::MissingHeaderName)?;
            let value = email.headers.get(name).unwrap_or_default();
            Ok((format!("header {}", name), value))
        }
    }
}

fn compare(operator: Operator, value: &str, expected: &str) -> Result<bool, EvalError> {
    let lower = || (value.to_lowercase(), expected.to_lowercase());

    Ok(match operator {
        Operator::Contains => {
            let (value, expected) = lower();
            value.contains(&expected)
        }
        Operator::Equals => {
            let (value, expected) = lower();
            value == expected
        }
        Operator::StartsWith => {
            let (value, expected) = lower();
            value.starts_with(&expected)
        }
        Operator::EndsWith => {
            let (value, expected) = lower();
            value.ends_with(&expected)
        }
        Operator::Matches => RegexBuilder::new(expected)
            .case_insensitive(true)
            .build()
            .map_err(|source| EvalError::InvalidRegex {
                pattern: expected.to_string(),
                source,
            })?
            .is_match(value),
    })
}
