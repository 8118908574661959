use std::collections::HashMap;

use encoding_rs::Encoding;
use log::debug;

use crate::error::DecodeError;

/// Associe les noms de charset MIME à leur décodeur de texte.
///
/// Construit une fois au démarrage puis passé au décodeur, rien de global.
#[derive(Debug, Clone, Default)]
pub struct CharsetRegistry {
    encodings: HashMap<String, &'static Encoding>,
}

impl CharsetRegistry {
    /// Registre vide : tout charset est inconnu, UTF-8 compris.
    pub fn empty() -> Self {
        Self::default()
    }

    /// UTF-8 et les anciens encodages courants des boîtes russes et occidentales.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.register("utf-8", encoding_rs::UTF_8);
        registry.register("utf8", encoding_rs::UTF_8);
        // ASCII est un sous-ensemble d'UTF-8
        registry.register("us-ascii", encoding_rs::UTF_8);
        registry.register("ascii", encoding_rs::UTF_8);

        registry.register("windows-1251", encoding_rs::WINDOWS_1251);
        registry.register("cp1251", encoding_rs::WINDOWS_1251);
        registry.register("koi8-r", encoding_rs::KOI8_R);
        registry.register("koi8-u", encoding_rs::KOI8_U);
        registry.register("iso-8859-5", encoding_rs::ISO_8859_5);
        registry.register("ibm866", encoding_rs::IBM866);
        registry.register("cp866", encoding_rs::IBM866);

        registry.register("windows-1252", encoding_rs::WINDOWS_1252);
        registry.register("iso-8859-1", encoding_rs::WINDOWS_1252);
        registry.register("latin1", encoding_rs::WINDOWS_1252);
        registry.register("iso-8859-15", encoding_rs::ISO_8859_15);

        registry
    }

    pub fn register(&mut self, label: &str, encoding: &'static Encoding) {
        self.encodings.insert(normalize(label), encoding);
    }

    pub fn lookup(&self, label: &str) -> Option<&'static Encoding> {
        self.encodings.get(&normalize(label)).copied()
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }

    /// Décode `bytes` comme du texte en `label`. Sans label, UTF-8 ; les
    /// séquences invalides deviennent U+FFFD.
    pub fn decode(&self, label: Option<&str>, bytes: &[u8]) -> Result<String, DecodeError> {
        let label = label.map(str::trim).filter(|l| !l.is_empty());

        let encoding = match label {
            None => encoding_rs::UTF_8,
            Some(label) => self
                .lookup(label)
                .ok_or_else(|| DecodeError::UnknownCharset(label.to_string()))?,
        };

        let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
        if had_errors {
            debug!("Séquences {} invalides remplacées au décodage", encoding.name());
        }

        Ok(text.into_owned())
    }
}

fn normalize(label: &str) -> String {
    label.trim().trim_matches('"').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVET_KOI8_R: &[u8] = &[0xD0, 0xD2, 0xC9, 0xD7, 0xC5, 0xD4];
    const PRIVET_WINDOWS_1251: &[u8] = &[0xEF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];

    #[test]
    fn test_decode_legacy_cyrillic() {
        let registry = CharsetRegistry::with_defaults();

        assert_eq!(registry.decode(Some("koi8-r"), PRIVET_KOI8_R).unwrap(), "привет");
        assert_eq!(
            registry.decode(Some("Windows-1251"), PRIVET_WINDOWS_1251).unwrap(),
            "привет"
        );
    }

    #[test]
    fn test_label_is_case_and_quote_insensitive() {
        let registry = CharsetRegistry::with_defaults();
        assert!(registry.lookup("\"KOI8-R\"").is_some());
        assert!(registry.lookup(" utf-8 ").is_some());
    }

    #[test]
    fn test_missing_label_is_utf8() {
        let registry = CharsetRegistry::with_defaults();
        assert_eq!(registry.decode(None, "héllo".as_bytes()).unwrap(), "héllo");
        assert_eq!(registry.decode(Some(""), b"plain").unwrap(), "plain");
    }

    #[test]
    fn test_unknown_charset_is_error() {
        let registry = CharsetRegistry::with_defaults();
        let err = registry.decode(Some("x-martian"), b"abc").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownCharset(label) if label == "x-martian"));
    }

    #[test]
    fn test_register_extends_registry() {
        let mut registry = CharsetRegistry::empty();
        assert!(registry.decode(Some("koi8-r"), PRIVET_KOI8_R).is_err());

        registry.register("koi8-r", encoding_rs::KOI8_R);
        assert_eq!(registry.decode(Some("koi8-r"), PRIVET_KOI8_R).unwrap(), "привет");
        assert_eq!(registry.len(), 1);
    }
}
