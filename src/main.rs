use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use mailalert::charset::CharsetRegistry;
use mailalert::checkpoint::CheckpointStore;
use mailalert::config::Config;
use mailalert::decoder::MessageDecoder;
use mailalert::diagnostics;
use mailalert::filter::RuleEngine;
use mailalert::imap_client::{ImapTransport, MailSession};
use mailalert::notifier::{ConsoleNotifier, NotifierManager, SlackNotifier};
use mailalert::processor::{AlertProcessor, ProcessingSummary};
use mailalert::watcher::Watcher;

#[derive(Parser)]
#[command(name = "mailalert")]
#[command(about = "Surveille une boîte mail et lève des alertes pour les messages importants")]
#[command(version = "0.1.0")]
struct Args {
    /// Fichier de configuration (par défaut: ./configs/config.yaml, puis ./config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mode dry-run : les alertes sont affichées dans la console au lieu d'être envoyées
    #[arg(short, long)]
    dry_run: bool,

    /// Vérifier la configuration sans se connecter
    #[arg(long)]
    check_config: bool,

    /// Faire une seule vérification des mails puis quitter
    #[arg(long)]
    once: bool,

    /// Fichier de checkpoint, remplace monitoring.state_file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Passer un email de test dans les règles configurées puis quitter
    #[arg(long)]
    test_engine: bool,

    /// Envoyer une alerte de test pour ce type d'action (par défaut: slack) puis quitter
    #[arg(long, value_name = "ACTION", num_args = 0..=1, default_missing_value = "slack")]
    test_notifier: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger le fichier .env s'il existe
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref());
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = config?;
    if let Some(state_file) = args.state_file.clone() {
        config.monitoring.state_file = state_file;
    }

    // Si demandé, vérifier seulement la configuration
    if args.check_config {
        print_config_summary(&config);
        return Ok(());
    }

    if args.test_engine {
        let engine = RuleEngine::new(config.rules.clone());
        print!("{}", diagnostics::engine_report(&engine, &diagnostics::sample_email()));
        return Ok(());
    }

    if let Some(action_type) = args.test_notifier.as_deref() {
        let notifiers = build_notifiers(&config, args.dry_run)?;
        if !diagnostics::send_test_alert(&notifiers, action_type).await? {
            anyhow::bail!("Aucun notificateur pour '{}'", action_type);
        }
        return Ok(());
    }

    if args.dry_run {
        info!("🧪 Démarrage de mailalert en mode DRY-RUN");
    } else {
        info!("🚀 Démarrage de mailalert");
    }

    let notifiers = build_notifiers(&config, args.dry_run)?;
    let processor = AlertProcessor::new(RuleEngine::new(config.rules.clone()), notifiers);
    let watcher = build_watcher(&config)?;

    if args.once {
        let summary = run_once(watcher, &processor).await?;
        info!("✅ Vérification terminée : {} email(s), {} alerte(s)", summary.emails_processed, summary.alerts_raised);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 Ctrl+C reçu, arrêt en cours"),
            Err(e) => error!("❌ Impossible d'écouter Ctrl+C : {}", e),
        }
        signal_token.cancel();
    });

    let (emails, errors) = watcher.watch(cancel.clone());
    let summary = processor.run(emails, errors).await;

    if !cancel.is_cancelled() {
        error!("❌ La surveillance s'est arrêtée d'elle-même");
        anyhow::bail!("Surveillance arrêtée après {} erreur(s)", summary.errors);
    }

    info!("👋 Au revoir");
    Ok(())
}

fn build_notifiers(config: &Config, dry_run: bool) -> Result<NotifierManager> {
    let console = Arc::new(ConsoleNotifier::new());

    if dry_run {
        return Ok(NotifierManager::new().with_fallback(console));
    }

    let mut manager = NotifierManager::new();
    manager.register("console", console);

    match config.notifiers.slack.as_ref() {
        Some(slack) if slack.enabled => {
            let notifier = SlackNotifier::new(slack).context("Impossible d'initialiser le notificateur Slack")?;
            manager.register("slack", Arc::new(notifier));
        }
        _ => warn!("Slack non configuré - les actions 'slack' seront ignorées"),
    }

    info!("Notificateurs disponibles : {:?}", manager.available());
    Ok(manager)
}

fn build_watcher(config: &Config) -> Result<Watcher<ImapTransport>> {
    let transport = ImapTransport::new(config.imap.clone());
    let session = MailSession::new(transport, config.imap.mailbox.clone());
    let decoder = MessageDecoder::new(CharsetRegistry::with_defaults());
    let store = CheckpointStore::new(&config.monitoring.state_file);

    Watcher::new(
        session,
        decoder,
        store,
        config.monitoring.check_interval(),
        config.monitoring.max_emails,
    )
    .context("Impossible de charger le checkpoint")
}

async fn run_once(
    mut watcher: Watcher<ImapTransport>,
    processor: &AlertProcessor,
) -> Result<ProcessingSummary> {
    watcher.connect().await?;
    let result = watcher.poll_once().await;
    watcher.close().await;

    let mut summary = ProcessingSummary::default();
    for email in result? {
        summary.merge(processor.process_email(&email).await);
    }
    Ok(summary)
}

fn print_config_summary(config: &Config) {
    println!("✅ Configuration valide !");
    println!(
        "📧 IMAP: {}@{}:{} ({})",
        config.imap.username, config.imap.server, config.imap.port, config.imap.mailbox
    );
    println!(
        "⏱️  Vérification toutes les {}s, au plus {} email(s) par vérification",
        config.monitoring.check_interval_seconds, config.monitoring.max_emails
    );
    println!("💾 Fichier d'état : {}", config.monitoring.state_file.display());
    match config.notifiers.slack.as_ref() {
        Some(slack) if slack.enabled => println!("💬 Canal Slack : {}", slack.channel_id),
        _ => println!("💬 Slack : désactivé"),
    }
    println!("📋 Règles : {}", config.rules.len());
    for rule in &config.rules {
        let state = if rule.enabled { "" } else { " [désactivée]" };
        println!(
            "  - {} (priorité {}, score min. {}, {} condition(s)){}",
            rule.name,
            rule.priority,
            rule.min_score,
            rule.conditions.len(),
            state
        );
    }
}
