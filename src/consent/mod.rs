//! # Módulo de Consent - Dicionários de Cookie Banners
//!
//! Dicionários multilíngues de cookie-consent, compartilhados por dois
//! consumidores:
//!
//! - o **script de init do browser** (dismiss automático de banners);
//! - o **classificador de steps que falham em runtime** (decidir se um
//!   step quebrado era só um banner transiente).
//!
//! ## Para leigos:
//!
//! Metade da web europeia abre com um banner de cookies por cima de
//! tudo. Um teste gravado ontem clica no banner; hoje o banner não
//! existe mais e o step quebra. Este módulo concentra o conhecimento
//! de "isso parece um banner de consent" num lugar só: textos de botão
//! por idioma, seletores de vendors de CMP e marcadores de contexto.
//!
//! Os conjuntos de palavras casam por fronteira de palavra (regex),
//! case-insensitive; os textos de dismiss casam por igualdade EXATA
//! após trim + lowercase.

use once_cell::sync::Lazy;
use regex::Regex;

/// Textos exatos de botão de aceitar/dispensar, curados por idioma
/// (en/nl/de/fr).
///
/// O match é exato após trim + lowercase. É isso que mantém sósias
/// como "Okidoki" ou "Accept and subscribe" fora do balde de dismiss.
pub const DISMISS_TEXTS: &[&str] = &[
    // Inglês
    "accept",
    "accept all",
    "accept all cookies",
    "accept cookies",
    "allow all",
    "allow all cookies",
    "i agree",
    "agree",
    "agree and close",
    "got it",
    "understood",
    // Holandês
    "akkoord",
    "accepteren",
    "alles accepteren",
    "alle cookies accepteren",
    "cookies accepteren",
    "ik ga akkoord",
    "toestaan",
    "alles toestaan",
    // Alemão
    "akzeptieren",
    "alle akzeptieren",
    "alles akzeptieren",
    "alle cookies akzeptieren",
    "zustimmen",
    "einverstanden",
    "verstanden",
    // Francês
    "accepter",
    "tout accepter",
    "accepter tout",
    "j'accepte",
    "accepter et fermer",
    "accepter les cookies",
];

/// Seletores de botão de aceitar de vendors de CMP conhecidos.
pub const CMP_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll",
    "#CybotCookiebotDialogBodyButtonAccept",
    "#didomi-notice-agree-button",
    ".fc-cta-consent",
    ".qc-cmp2-summary-buttons button[mode=primary]",
    "#truste-consent-button",
    "#sp-cc-accept",
    ".cc-allow",
    ".cky-btn-accept",
    "[data-testid=uc-accept-all-button]",
    "#cmpwelcomebtnyes",
];

/// Marcadores de container cuja presença conta como evidência de
/// contexto de consent.
pub const CMP_MARKERS: &[&str] = &[
    "#onetrust-banner-sdk",
    "#CybotCookiebotDialog",
    "#didomi-host",
    ".fc-consent-root",
    ".qc-cmp2-container",
    "#usercentrics-root",
    "#truste-consent-track",
    ".cky-consent-container",
    "#sp_message_container",
];

/// Hosts que só servem interstitials de consent.
pub const CONSENT_HOSTS: &[&str] = &[
    "consent.google.com",
    "consent.youtube.com",
    "consentcdn.cookiebot.com",
    "cmp.quantcast.com",
];

/// Fragmentos de path que marcam interstitials de consent em hosts
/// first-party.
pub const CONSENT_PATHS: &[&str] = &["/consent", "/cookiewall", "/privacy-gate"];

// Conjuntos de palavras casados por fronteira de palavra,
// case-insensitive.

static TRANSIENT_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(cookie|cookies|consent|gdpr|avg|privacy|privacybeleid|banner|popup|pop-up|overlay|dialog|melding|hinweis|datenschutz|zustimmung|toestemming|bandeau|t[ée]moins)\b",
    )
    .expect("valid transient-context regex")
});

static DISMISS_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(accept|agree|allow|dismiss|close|akkoord|accepteren|sluiten|toestaan|weigeren|akzeptieren|zustimmen|schlie[ßs]en|erlauben|ablehnen|accepter|fermer|autoriser|refuser)\b",
    )
    .expect("valid dismiss-verb regex")
});

static CONTENT_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(news|nieuws|nachrichten|article|artikel|weather|weer|wetter|m[ée]t[ée]o|sport|video|blog|story|read|lees|lesen|lire|update|vluchten|verkeer)\b",
    )
    .expect("valid content-keyword regex")
});

static BUSINESS_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(checkout|payment|pay|order|billing|invoice|subscribe|cart|bestellen|betalen|afrekenen|winkelwagen|kaufen|zahlung|bestellung|warenkorb|commander|paiement|panier|facture)\b",
    )
    .expect("valid business-verb regex")
});

/// Hit exato do dicionário para um label de botão de aceitar/dispensar.
pub fn is_dismiss_text(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    DISMISS_TEXTS.contains(&normalized.as_str())
}

/// True quando o valor do seletor é (ou embute) um botão de aceitar
/// de CMP conhecido.
pub fn is_cmp_selector(selector: &str) -> bool {
    CMP_SELECTORS.iter().any(|s| selector.contains(s))
}

/// True quando a URL aponta para um interstitial de consent.
pub fn is_consent_url(url: &str) -> bool {
    let lowered = url.to_lowercase();
    CONSENT_HOSTS.iter().any(|h| lowered.contains(h))
        || CONSENT_PATHS.iter().any(|p| lowered.contains(p))
}

/// Evidência fraca: o texto fala de cookies/consent/banners.
pub fn has_transient_context(text: &str) -> bool {
    TRANSIENT_CONTEXT_RE.is_match(text)
}

/// O texto carrega um verbo de dismiss (aceitar/fechar/concordar,
/// qualquer idioma).
pub fn has_dismiss_verb(text: &str) -> bool {
    DISMISS_VERB_RE.is_match(text)
}

/// O texto parece um link de conteúdo (vocabulário de notícia/clima/
/// artigo).
pub fn has_content_keyword(text: &str) -> bool {
    CONTENT_KEYWORD_RE.is_match(text)
}

/// O texto carrega intenção de negócio (vocabulário de checkout/
/// pagamento/pedido).
pub fn has_business_intent(text: &str) -> bool {
    BUSINESS_VERB_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dismiss_dictionary_covers_all_languages() {
        for text in ["Accept all", "Akkoord", "Alle akzeptieren", "Tout accepter"] {
            assert!(is_dismiss_text(text), "esperava hit para {text:?}");
        }
    }

    #[test]
    fn dismiss_dictionary_rejects_false_positive_controls() {
        // Conjunto de controle: lookalikes que NUNCA podem virar dismiss.
        for text in [
            "Okidoki",
            "Accept and subscribe",
            "Accept terms and create account",
            "Akkoord met levering",
        ] {
            assert!(!is_dismiss_text(text), "falso positivo para {text:?}");
        }
    }

    #[test]
    fn cmp_selector_matches_embedded() {
        assert!(is_cmp_selector("#onetrust-accept-btn-handler"));
        assert!(is_cmp_selector("div.banner #didomi-notice-agree-button"));
        assert!(!is_cmp_selector("#submit"));
    }

    #[test]
    fn transient_context_needs_word_boundary() {
        assert!(has_transient_context("Wij gebruiken cookies"));
        assert!(has_transient_context("Datenschutz-Einstellungen"));
        assert!(!has_transient_context("cookiecutter template engine"));
    }

    #[test]
    fn dismiss_verb_does_not_match_inside_words() {
        assert!(has_dismiss_verb("Accept the cookie policy"));
        assert!(has_dismiss_verb("Alles accepteren"));
        assert!(!has_dismiss_verb("Okidoki"));
    }

    #[test]
    fn business_and_content_keywords() {
        assert!(has_business_intent("Proceed to checkout"));
        assert!(has_business_intent("Naar betalen"));
        assert!(has_content_keyword("Schiphol vluchten winterweer update"));
        assert!(!has_business_intent("Read the article"));
    }

    #[test]
    fn consent_urls() {
        assert!(is_consent_url("https://consent.google.com/ml?continue=x"));
        assert!(is_consent_url("https://site.example/consent?return=/home"));
        assert!(!is_consent_url("https://site.example/products"));
    }
}
