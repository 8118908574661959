use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;

/// Plus grand UID de la boîte déjà livré.
///
/// Sérialisé en `{"last_uid": <u32>}`. Les UID IMAP sont sur 32 bits et un
/// serveur qui les recycle n'est pas détecté ici.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_uid: u32,
}

impl Checkpoint {
    pub fn new(last_uid: u32) -> Self {
        Checkpoint { last_uid }
    }

    /// Avance le checkpoint jusqu'à `uid`, jamais en arrière.
    pub fn advance(self, uid: u32) -> Self {
        Checkpoint {
            last_uid: self.last_uid.max(uid),
        }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "uid {}", self.last_uid)
    }
}

/// Stockage du checkpoint dans un unique fichier JSON.
///
/// L'écriture passe par un fichier `.tmp` voisin, synchronisé puis renommé
/// sur le chemin final : un lecteur voit l'ancienne ou la nouvelle valeur.
/// Un seul écrivain à la fois.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lit le checkpoint. Un fichier absent donne le checkpoint zéro (premier
    /// lancement), un fichier illisible ou corrompu est une erreur.
    pub fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Aucun checkpoint dans {}, démarrage à zéro", self.path.display());
                return Ok(Checkpoint::default());
            }
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&data).map_err(|source| CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        debug!("Checkpoint {} chargé depuis {}", checkpoint, self.path.display());
        Ok(checkpoint)
    }

    pub fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let data = serde_json::to_vec(&checkpoint)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| self.io_error(source))?;
        }

        let tmp_path = self.temp_path();
        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()
        };
        if let Err(source) = write_tmp() {
            let _ = fs::remove_file(&tmp_path);
            return Err(CheckpointError::Io {
                path: tmp_path,
                source,
            });
        }

        fs::rename(&tmp_path, &self.path).map_err(|source| self.io_error(source))?;

        debug!("Checkpoint {} sauvegardé dans {}", checkpoint, self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state.json"));

        assert_eq!(store.load().unwrap(), Checkpoint::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested/state.json"));

        store.save(Checkpoint::new(42)).unwrap();
        assert_eq!(store.load().unwrap().last_uid, 42);

        store.save(Checkpoint::new(43)).unwrap();
        assert_eq!(store.load().unwrap().last_uid, 43);
        assert!(!dir.path().join("nested/state.json.tmp").exists());
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = CheckpointStore::new(&path);

        store.save(Checkpoint::new(7)).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"{"last_uid":7}"#);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{\"last_uid\": \"many\"").unwrap();

        let err = CheckpointStore::new(&path).load().unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn test_empty_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"").unwrap();

        assert!(CheckpointStore::new(&path).load().is_err());
    }

    #[test]
    fn test_advance_never_decreases() {
        let checkpoint = Checkpoint::new(10);
        assert_eq!(checkpoint.advance(5).last_uid, 10);
        assert_eq!(checkpoint.advance(11).last_uid, 11);
    }
}
