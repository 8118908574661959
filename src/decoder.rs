use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use mailparse::body::Body;
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};

use crate::charset::CharsetRegistry;
use crate::error::DecodeError;
use crate::models::{Attachment, Email, Envelope, RawMessage};

/// Étape de décodage qui a produit le corps du message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Structured,
    PlainText,
    Raw,
}

/// Transforme les messages récupérés en [`Email`].
///
/// Étapes, la première qui aboutit l'emporte :
/// 1. parcours de la structure MIME (en-têtes, parties text/html, pièces jointes)
/// 2. corps du message lu comme une seule partie texte UTF-8
/// 3. contenu brut non traité
///
/// Les étapes 2 et 3 ne servent que si la structure MIME est illisible : un
/// message dont toutes les parties sont des pièces jointes ou ont été écartées
/// reste à l'étape 1, avec un corps vide.
pub struct MessageDecoder {
    charsets: CharsetRegistry,
}

impl MessageDecoder {
    pub fn new(charsets: CharsetRegistry) -> Self {
        MessageDecoder { charsets }
    }

    pub fn charsets(&self) -> &CharsetRegistry {
        &self.charsets
    }

    pub fn decode(&self, raw: &RawMessage) -> Result<Email, DecodeError> {
        self.decode_with_stage(raw).map(|(email, _)| email)
    }

    pub fn decode_with_stage(&self, raw: &RawMessage) -> Result<(Email, DecodeStage), DecodeError> {
        let mut email = Email::new(raw.uid);
        email.size = raw.size;

        if let Some(envelope) = &raw.envelope {
            apply_envelope(&mut email, envelope);
        }

        let mut header_date = None;
        let mut structured = false;

        // 1. Décodage MIME structuré
        if let Some(full) = raw.full.as_deref() {
            match mailparse::parse_mail(full) {
                Ok(parsed) => {
                    header_date = apply_headers(&mut email, &parsed);
                    structured = self.walk_parts(&parsed, &mut email) > 0;
                }
                Err(e) => debug!("Message {} : structure MIME illisible : {}", raw.uid, e),
            }
        }

        let stage = if structured {
            if !email.has_content() {
                debug!(
                    "Message {} : aucune partie texte ({} pièce(s) jointe(s)), corps vide",
                    raw.uid,
                    email.attachments.len()
                );
            }
            DecodeStage::Structured
        } else if let Some(text) = plain_text_fallback(raw) {
            // 2. Corps entier comme une seule partie texte
            debug!("Message {} : repli sur le texte brut", raw.uid);
            email.body = text;
            DecodeStage::PlainText
        } else if let Some(payload) = raw_fallback(raw) {
            // 3. Contenu non traité
            debug!("Message {} : repli sur le contenu brut", raw.uid);
            email.body = payload;
            DecodeStage::Raw
        } else {
            return Err(DecodeError::Empty { uid: raw.uid });
        };

        email.received_at = raw
            .envelope
            .as_ref()
            .and_then(|env| env.date)
            .or(header_date)
            .or(raw.internal_date)
            .unwrap_or_else(Utc::now);

        Ok((email, stage))
    }

    /// Parcourt l'arbre MIME et renvoie le nombre de parties feuilles
    /// reconnues, qu'elles soient gardées, comptées comme pièce jointe ou
    /// écartées. Une partie multipart sans sous-partie ne compte pas.
    fn walk_parts(&self, part: &ParsedMail, email: &mut Email) -> usize {
        if !part.subparts.is_empty() {
            return part
                .subparts
                .iter()
                .map(|sub| self.walk_parts(sub, email))
                .sum();
        }

        let content_type = part.ctype.mimetype.to_lowercase();
        if content_type.starts_with("multipart/") {
            debug!("Partie {} sans sous-partie lisible", content_type);
            return 0;
        }

        let disposition = part.get_content_disposition();

        if disposition.disposition == DispositionType::Attachment {
            let filename = disposition
                .params
                .get("filename")
                .or_else(|| part.ctype.params.get("name"))
                .cloned();
            debug!("Pièce jointe ignorée {:?} ({})", filename, content_type);
            email.attachments.push(Attachment {
                filename,
                content_type,
                size: raw_part_body(part).len(),
            });
            return 1;
        }

        if content_type != "text/plain" && content_type != "text/html" {
            debug!("Partie inline {} ignorée", content_type);
            return 1;
        }

        let text = match self.decode_part(part) {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️  Partie {} du message {} écartée : {}", content_type, email.uid, e);
                return 1;
            }
        };

        if content_type == "text/plain" {
            email.body = text;
        } else {
            // Les liens suivent toujours la partie HTML retenue
            email.links = extract_links(&text);
            email.html = text;
        }
        1
    }

    fn decode_part(&self, part: &ParsedMail) -> Result<String, DecodeError> {
        let transfer_encoding = part
            .headers
            .get_first_value("Content-Transfer-Encoding")
            .unwrap_or_default();

        let bytes = decode_transfer_encoding(&raw_part_body(part), &transfer_encoding)?;
        self.charsets.decode(Some(part.ctype.charset.as_str()), &bytes)
    }
}

/// Octets encore encodés du corps d'une partie feuille.
fn raw_part_body(part: &ParsedMail) -> Vec<u8> {
    match part.get_body_encoded() {
        Body::Base64(body) | Body::QuotedPrintable(body) => body.get_raw().to_vec(),
        Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
        Body::Binary(body) => body.get_raw().to_vec(),
    }
}

/// Annule un Content-Transfer-Encoding.
///
/// Un base64 qui ne se décode pas est gardé tel quel comme texte. Un
/// quoted-printable cassé ou un encodage inconnu est une erreur pour la partie.
pub fn decode_transfer_encoding(body: &[u8], encoding: &str) -> Result<Vec<u8>, DecodeError> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "base64" => {
            let compact: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            match general_purpose::STANDARD.decode(&compact) {
                Ok(decoded) => Ok(decoded),
                Err(e) => {
                    debug!("Partie déclarée base64 mais invalide ({}), gardée telle quelle", e);
                    Ok(body.to_vec())
                }
            }
        }
        "quoted-printable" => decode_quoted_printable(body),
        "7bit" | "8bit" | "binary" | "" => Ok(body.to_vec()),
        other => Err(DecodeError::UnsupportedEncoding(other.to_string())),
    }
}

fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut result = Vec::with_capacity(data.len());
    let mut pos = 0;

    while pos < data.len() {
        let byte = data[pos];
        if byte != b'=' {
            result.push(byte);
            pos += 1;
            continue;
        }

        // Saut de ligne doux, éventuellement suivi d'espaces avant la fin de ligne
        let mut after = pos + 1;
        while after < data.len() && (data[after] == b' ' || data[after] == b'\t') {
            after += 1;
        }
        match data.get(after) {
            None => {
                pos = after;
                continue;
            }
            Some(b'\n') => {
                pos = after + 1;
                continue;
            }
            Some(b'\r') if data.get(after + 1) == Some(&b'\n') => {
                pos = after + 2;
                continue;
            }
            _ => {}
        }

        match (hex_value(data.get(pos + 1)), hex_value(data.get(pos + 2))) {
            (Some(high), Some(low)) => {
                result.push(high << 4 | low);
                pos += 3;
            }
            _ => {
                return Err(DecodeError::QuotedPrintable(format!(
                    "séquence d'échappement invalide à la position {}",
                    pos
                )))
            }
        }
    }

    Ok(result)
}

fn hex_value(byte: Option<&u8>) -> Option<u8> {
    byte.and_then(|b| (*b as char).to_digit(16)).map(|d| d as u8)
}

/// Récupère les valeurs `href="http..."` dans l'ordre du document.
///
/// Simple balayage du texte, le HTML n'est pas analysé.
pub fn extract_links(html: &str) -> Vec<String> {
    const MARKER: &str = "href=\"";

    let mut links = Vec::new();
    let mut rest = html;

    while let Some(start) = rest.find(MARKER) {
        rest = &rest[start + MARKER.len()..];
        let Some(end) = rest.find('"') else {
            break;
        };

        let link = &rest[..end];
        if link.starts_with("http") {
            links.push(link.to_string());
        }
        rest = &rest[end + 1..];
    }

    links
}

/// Décode les encoded-words RFC 2047 d'une valeur d'en-tête brute. Repli sur
/// un UTF-8 approximatif si la valeur est illisible.
pub fn decode_header_value(raw: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(raw);
    if !lossy.contains("=?") {
        return lossy.into_owned();
    }

    let synthetic = format!("X: {}", lossy);
    match mailparse::parse_header(synthetic.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => lossy.into_owned(),
    }
}

/// `Nom <boite@hote>` quand un nom est connu, sinon l'adresse seule.
pub fn format_address(name: Option<&str>, address: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{} <{}>", name, address),
        None => address.to_string(),
    }
}

fn apply_envelope(email: &mut Email, envelope: &Envelope) {
    email.message_id = envelope.message_id.clone();
    email.subject = envelope.subject.clone();
    email.from = envelope.from.first().cloned().unwrap_or_default();
    email.to = envelope.to.clone();
}

/// Copie les en-têtes de premier niveau et complète les champs laissés vides
/// par l'enveloppe. Renvoie l'en-tête `Date` s'il est lisible.
fn apply_headers(email: &mut Email, parsed: &ParsedMail) -> Option<DateTime<Utc>> {
    for header in &parsed.headers {
        email.headers.insert(&header.get_key(), &header.get_value());
    }

    if email.subject.is_empty() {
        email.subject = email.headers.get("Subject").unwrap_or_default().to_string();
    }
    if email.message_id.is_empty() {
        email.message_id = email.headers.get("Message-ID").unwrap_or_default().to_string();
    }
    if email.from.is_empty() {
        if let Some(from) = email.headers.get("From").map(parse_address_list) {
            email.from = from.into_iter().next().unwrap_or_default();
        }
    }
    if email.to.is_empty() {
        if let Some(to) = email.headers.get("To").map(parse_address_list) {
            email.to = to;
        }
    }

    email
        .headers
        .get("Date")
        .and_then(|value| mailparse::dateparse(value).ok())
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
}

fn parse_address_list(value: &str) -> Vec<String> {
    match mailparse::addrparse(value) {
        Ok(list) => list
            .into_inner()
            .into_iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![format_address(info.display_name.as_deref(), &info.addr)],
                MailAddr::Group(group) => group
                    .addrs
                    .iter()
                    .map(|info| format_address(info.display_name.as_deref(), &info.addr))
                    .collect(),
            })
            .collect(),
        Err(_) if !value.trim().is_empty() => vec![value.trim().to_string()],
        Err(_) => Vec::new(),
    }
}

fn plain_text_fallback(raw: &RawMessage) -> Option<String> {
    let bytes = match (&raw.text, &raw.full) {
        (Some(text), _) => text.as_slice(),
        (None, Some(full)) => strip_header_block(full),
        (None, None) => return None,
    };

    let text = std::str::from_utf8(bytes).ok()?;
    (!text.trim().is_empty()).then(|| text.to_string())
}

fn raw_fallback(raw: &RawMessage) -> Option<String> {
    let bytes = raw.full.as_deref().or(raw.text.as_deref())?;
    let text = String::from_utf8_lossy(bytes);
    (!text.trim().is_empty()).then(|| text.into_owned())
}

/// Corps d'un message dont les en-têtes s'arrêtent à la première ligne vide,
/// ou tout le message s'il n'y en a pas.
fn strip_header_block(message: &[u8]) -> &[u8] {
    let crlf = find(message, b"\r\n\r\n").map(|i| i + 4);
    let lf = find(message, b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => &message[a.min(b)..],
        (Some(a), None) | (None, Some(a)) => &message[a..],
        (None, None) => message,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
