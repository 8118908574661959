use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::rule::validate_rules;
use crate::models::Rule;

/// Emplacements essayés dans l'ordre quand aucun chemin n'est donné.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["./configs/config.yaml", "./config.yaml"];

const ENV_PREFIX: &str = "MAILALERT";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifiers: NotifiersConfig,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Deserialize, Clone)]
pub struct ImapConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: String,
    pub tls: bool,
}

// Le mot de passe ne doit pas apparaître dans les logs
impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("mailbox", &self.mailbox)
            .field("tls", &self.tls)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringConfig {
    pub check_interval_seconds: u64,
    /// Nombre maximum d'emails récupérés par cycle
    pub max_emails: usize,
    pub state_file: PathBuf,
}

impl MonitoringConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifiersConfig {
    pub slack: Option<SlackConfig>,
}

#[derive(Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub bot_token: String,
    pub channel_id: String,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("enabled", &self.enabled)
            .field("bot_token", &"***")
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Charge `path`, ou le premier emplacement par défaut qui existe, applique
    /// les variables d'environnement `MAILALERT__*` puis valide le résultat.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => find_config_path()?,
        };

        Self::from_sources(&path, None)
    }

    /// Comme [`Config::load`] avec un fichier explicite et, si fourni, un jeu
    /// de variables utilisé à la place de l'environnement du processus.
    pub fn from_sources(path: &Path, env: Option<HashMap<String, String>>) -> Result<Self> {
        log::debug!("Chargement de la configuration depuis {}", path.display());

        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env);

        let settings = config::Config::builder()
            .set_default("imap.server", "imap.yandex.ru")?
            .set_default("imap.port", 993)?
            .set_default("imap.username", "")?
            .set_default("imap.password", "")?
            .set_default("imap.mailbox", "INBOX")?
            .set_default("imap.tls", true)?
            .set_default("monitoring.check_interval_seconds", 30)?
            .set_default("monitoring.max_emails", 20)?
            .set_default("monitoring.state_file", "data/mail_state.json")?
            .set_default("logging.level", "info")?
            .add_source(config::File::from(path).required(true))
            .add_source(environment)
            .build()
            .with_context(|| format!("Impossible de lire le fichier de configuration {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("Configuration invalide dans {}", path.display()))?;

        config.validate().context("Échec de la validation de la configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_imap().context("erreur de configuration IMAP")?;
        self.validate_monitoring().context("erreur de configuration monitoring")?;
        validate_rules(&self.rules).context("erreur de configuration des règles")?;

        if let Some(slack) = self.notifiers.slack.as_ref().filter(|s| s.enabled) {
            if slack.bot_token.is_empty() || slack.channel_id.is_empty() {
                anyhow::bail!("notificateur Slack activé sans bot_token ou channel_id");
            }
        }

        Ok(())
    }

    fn validate_imap(&self) -> Result<()> {
        let imap = &self.imap;
        if imap.server.trim().is_empty() {
            anyhow::bail!("server est requis");
        }
        if imap.username.is_empty() {
            anyhow::bail!("username est requis");
        }
        if imap.password.is_empty() {
            anyhow::bail!("password est requis");
        }
        if imap.port == 0 {
            anyhow::bail!("port invalide : {}", imap.port);
        }
        if !imap.tls {
            anyhow::bail!("IMAP sans TLS non supporté, utilisez tls: true");
        }
        Ok(())
    }

    fn validate_monitoring(&self) -> Result<()> {
        let monitoring = &self.monitoring;
        if monitoring.check_interval_seconds < 5 {
            anyhow::bail!(
                "check_interval_seconds trop petit : {}",
                monitoring.check_interval_seconds
            );
        }
        if monitoring.max_emails == 0 {
            anyhow::bail!("max_emails doit être positif");
        }
        Ok(())
    }
}

fn find_config_path() -> Result<PathBuf> {
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Fichier de configuration introuvable (cherché dans {})\n\
                 \n\
                 💡 Solutions :\n\
                 1. Copiez la configuration d'exemple :\n\
                    cp configs/config.example.yaml configs/config.yaml\n\
                 \n\
                 2. Ou indiquez un fichier explicitement :\n\
                    mailalert --config /path/to/config.yaml",
                DEFAULT_CONFIG_PATHS.join(", ")
            )
        })
}
