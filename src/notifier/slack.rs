use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use slack_morphism::prelude::*;

use super::Notifier;
use crate::config::SlackConfig;
use crate::models::Alert;

/// Publie les alertes dans un canal Slack via l'API Web.
pub struct SlackNotifier {
    client: SlackClient<SlackClientHyperHttpsConnector>,
    token: SlackApiToken,
    channel_id: SlackChannelId,
    enabled: bool,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        info!("Initialisation du notificateur Slack pour le canal {}", config.channel_id);

        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|e| anyhow::anyhow!("Impossible de créer le connecteur HTTPS pour Slack : {}", e))?;
        let client = SlackClient::new(connector);
        let token = SlackApiToken::new(config.bot_token.clone().into());
        let channel_id = SlackChannelId::new(config.channel_id.clone());

        Ok(SlackNotifier {
            client,
            token,
            channel_id,
            enabled: config.enabled && !config.bot_token.is_empty(),
        })
    }

    /// Corps mrkdwn Slack d'une alerte.
    pub fn format_message(alert: &Alert<'_>) -> String {
        let mut text = format!(
            "{} *{}* ({} score {})\n\n\
             • Subject: {}\n\
             • From: {}\n\
             • Received: {}\n\
             • Reason: {}\n",
            alert.level.marker(),
            escape(&alert.rule.name),
            alert.level,
            alert.score,
            escape(&alert.email.subject),
            escape(&alert.email.from),
            alert.email.received_at.format("%Y-%m-%d %H:%M:%S UTC"),
            escape(&alert.reason)
        );

        if !alert.email.links.is_empty() {
            text.push_str("• Links:\n");
            for link in &alert.email.links {
                text.push_str(&format!("  - <{}>\n", escape(link)));
            }
        }

        text
    }
}

/// Échappe les caractères de contrôle de Slack.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, alert: &Alert<'_>) -> Result<()> {
        let request = SlackApiChatPostMessageRequest::new(
            self.channel_id.clone(),
            SlackMessageContent::new().with_text(Self::format_message(alert)),
        );

        let session = self.client.open_session(&self.token);
        let response = session
            .chat_post_message(&request)
            .await
            .context("Impossible d'envoyer le message Slack")?;

        info!("Message Slack envoyé : {:?}", response.ts);
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }

    fn is_available(&self) -> bool {
        self.enabled
    }
}
