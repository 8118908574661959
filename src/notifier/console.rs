use anyhow::Result;
use async_trait::async_trait;

use super::Notifier;
use crate::models::Alert;

/// Affiche les alertes sur la sortie standard. Sert aux actions `console` et au mode dry-run.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }

    pub fn render(alert: &Alert<'_>) -> String {
        let mut text = format!("\n{}\n{}", "=".repeat(60), alert.message());
        if !alert.email.links.is_empty() {
            text.push_str("\nLinks:");
            for link in &alert.email.links {
                text.push_str(&format!("\n  - {}", link));
            }
        }
        text.push_str(&format!("\n{}", "=".repeat(60)));
        text
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, alert: &Alert<'_>) -> Result<()> {
        println!("{}", Self::render(alert));
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }

    fn is_available(&self) -> bool {
        true
    }
}
