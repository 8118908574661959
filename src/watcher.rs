use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::decoder::MessageDecoder;
use crate::error::{CheckpointError, WatchError};
use crate::imap_client::{MailSession, MailTransport};
use crate::models::Email;

/// Cycle de vie de la surveillance. `Stopped` est définitif.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Disconnected,
    Connected,
    Fetching,
    Idle,
    Stopped,
}

/// Interroge une boîte mail et remet chaque nouvel email à un seul consommateur.
///
/// Possède la session mail et le checkpoint : rien d'autre ne doit écrire le
/// fichier de checkpoint pendant la surveillance.
pub struct Watcher<T: MailTransport> {
    session: MailSession<T>,
    decoder: MessageDecoder,
    store: CheckpointStore,
    checkpoint: Checkpoint,
    check_interval: Duration,
    max_emails: usize,
    state: WatcherState,
}

impl<T: MailTransport + 'static> Watcher<T> {
    /// Charge le checkpoint depuis `store`. Un fichier corrompu est une erreur.
    pub fn new(
        session: MailSession<T>,
        decoder: MessageDecoder,
        store: CheckpointStore,
        check_interval: Duration,
        max_emails: usize,
    ) -> Result<Self, CheckpointError> {
        let checkpoint = store.load()?;
        info!("Checkpoint {} chargé depuis {}", checkpoint, store.path().display());

        Ok(Self {
            session,
            decoder,
            store,
            checkpoint,
            check_interval,
            max_emails,
            state: WatcherState::Disconnected,
        })
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn session(&self) -> &MailSession<T> {
        &self.session
    }

    pub async fn connect(&mut self) -> Result<(), WatchError> {
        self.session.connect().await.map_err(WatchError::Connect)?;
        self.state = WatcherState::Connected;
        Ok(())
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.session.close().await {
            warn!("⚠️  Erreur à la fermeture de la session mail : {}", e);
        }
        self.state = WatcherState::Stopped;
    }

    /// Lance un cycle de récupération et renvoie les emails décodés, du plus
    /// ancien au plus récent.
    ///
    /// Un message indécodable est journalisé puis abandonné, mais fait quand
    /// même avancer le checkpoint. Si le nouveau checkpoint ne peut pas être
    /// sauvegardé, rien n'est renvoyé et le checkpoint en mémoire ne bouge pas.
    pub async fn poll_once(&mut self) -> Result<Vec<Email>, WatchError> {
        self.state = WatcherState::Fetching;
        let result = self.fetch_cycle().await;
        self.state = WatcherState::Idle;
        result
    }

    async fn fetch_cycle(&mut self) -> Result<Vec<Email>, WatchError> {
        // 1. Récupérer tout ce qui dépasse le checkpoint
        let batch = self
            .session
            .fetch_new_since(self.checkpoint, self.max_emails)
            .await
            .map_err(WatchError::Fetch)?;

        // 2. Décoder
        let mut emails = Vec::with_capacity(batch.messages.len());
        for raw in &batch.messages {
            match self.decoder.decode(raw) {
                Ok(email) => {
                    debug!("UID {} décodé : {:?}", email.uid, email.subject);
                    emails.push(email);
                }
                Err(e) => warn!("⚠️  Message UID {} ignoré : {}", raw.uid, e),
            }
        }

        // 3. Sauvegarder avant toute livraison
        if batch.checkpoint > self.checkpoint {
            self.store.save(batch.checkpoint)?;
            debug!("Checkpoint avancé de {} à {}", self.checkpoint, batch.checkpoint);
            self.checkpoint = batch.checkpoint;
        }

        if !batch.messages.is_empty() {
            info!(
                "📨 Cycle terminé : {} récupéré(s), {} décodé(s), checkpoint {}",
                batch.messages.len(),
                emails.len(),
                self.checkpoint
            );
        }

        Ok(emails)
    }

    /// Démarre la boucle de surveillance dans sa propre tâche.
    ///
    /// Les deux récepteurs rendent `None` quand la boucle s'arrête : annulation
    /// via `cancel`, échec de la connexion initiale ou abandon du récepteur
    /// d'emails.
    pub fn watch(
        self,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<Email>, mpsc::Receiver<WatchError>) {
        let (email_tx, email_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(1);

        tokio::spawn(self.run(cancel, email_tx, error_tx));

        (email_rx, error_rx)
    }

    async fn run(
        mut self,
        cancel: CancellationToken,
        emails: mpsc::Sender<Email>,
        errors: mpsc::Sender<WatchError>,
    ) {
        if let Err(e) = self.connect().await {
            error!("❌ {}", e);
            let _ = errors.send(e).await;
            self.state = WatcherState::Stopped;
            return;
        }

        info!(
            "👀 Surveillance de {} toutes les {}s (checkpoint {})",
            self.session.mailbox(),
            self.check_interval.as_secs(),
            self.checkpoint
        );

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Le premier tick est immédiat et lance le cycle initial

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let keep_going = match self.poll_once().await {
                Ok(batch) => deliver(batch, &cancel, &emails).await,
                Err(e) => {
                    error!("❌ {}", e);
                    // Personne n'écoute les erreurs : on continue quand même
                    let _ = errors.send(e).await;
                    true
                }
            };

            if !keep_going || cancel.is_cancelled() {
                break;
            }
        }

        info!("Arrêt de la surveillance au checkpoint {}", self.checkpoint);
        self.close().await;
    }
}

/// Remet les emails un par un. Renvoie false quand la boucle doit s'arrêter.
async fn deliver(
    batch: Vec<Email>,
    cancel: &CancellationToken,
    emails: &mpsc::Sender<Email>,
) -> bool {
    let total = batch.len();
    for (delivered, email) in batch.into_iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(
                "Annulation avec {} email(s) de ce cycle non livré(s)",
                total - delivered
            );
            return false;
        }
        if emails.send(email).await.is_err() {
            debug!("Récepteur d'emails abandonné");
            return false;
        }
    }
    true
}
