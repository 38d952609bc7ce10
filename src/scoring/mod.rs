//! # Scorer de Candidatos em Runtime
//!
//! Sonda cada candidato contra a página viva e produz o score final
//! que decide adoção. Três componentes:
//!
//! - **base**: prior de qualidade do tipo de seletor
//!   (role-engine > test-id > id > texto único > caminho CSS > cadeia
//!   CSS longa > xpath);
//! - **unicidade**: 1.0 sse exatamente um match, 0.5 até três, 0.2
//!   acima disso, 0.0 sem match;
//! - **visibilidade**: o primeiro match está visível?
//!
//! ## Regra de adoção
//!
//! Um candidato não-atual é adotado sse o score final excede o do
//! atual em pelo menos [`ADOPT_MARGIN`] **e** ele resolve unicamente.
//! Empate de score usa ordem de inserção (decisão registrada no
//! DESIGN; mudar isso exige atualizar a propriedade de adoção nos
//! testes).
//!
//! Toda sondagem é read-only e serializada na única página, no estado
//! "pausado" logo após o step anterior executar.

use tracing::debug;

use crate::browser::{Browser, LocatorProbe};
use crate::candidates::CandidateTarget;
use crate::locator::{self, LocatorOp};
use crate::protocol::{Target, TargetKind};

// ============================================================================
// CONSTANTES
// ============================================================================

/// Margem mínima de score para trocar o target de um step.
pub const ADOPT_MARGIN: f64 = 0.15;

const WEIGHT_BASE: f64 = 0.45;
const WEIGHT_UNIQUENESS: f64 = 0.35;
const WEIGHT_VISIBILITY: f64 = 0.20;

// ============================================================================
// QUALIDADE BASE
// ============================================================================

/// Prior de qualidade do seletor, só pela forma (sem olhar a página).
pub fn base_quality(target: &Target) -> f64 {
    match target.kind {
        TargetKind::RoleEngine => 0.90,
        TargetKind::LocatorExpression => expression_quality(&target.value),
        TargetKind::TextSelector => 0.70,
        TargetKind::Css => css_quality(&target.value),
        TargetKind::PlaywrightSelector => 0.60,
        TargetKind::Internal => 0.50,
        TargetKind::Xpath => 0.30,
    }
}

/// Expressões herdam o prior da fábrica raiz.
fn expression_quality(value: &str) -> f64 {
    match locator::compile(value) {
        Ok(plan) => match plan.ops.first() {
            Some(LocatorOp::Role { .. }) => 0.90,
            Some(LocatorOp::TestId(_)) => 0.85,
            Some(LocatorOp::Label(_)) | Some(LocatorOp::Placeholder(_)) | Some(LocatorOp::Title(_)) => 0.75,
            Some(LocatorOp::Text(_)) | Some(LocatorOp::AltText(_)) => 0.70,
            Some(LocatorOp::Css(css)) => css_quality(css),
            _ => 0.60,
        },
        Err(_) => 0.30,
    }
}

/// CSS ancorado em id pontua alto; cadeias longas pontuam baixo.
fn css_quality(value: &str) -> f64 {
    let trimmed = value.trim();
    let segments = trimmed.split('>').count();
    if trimmed.starts_with('#') && !trimmed.contains(' ') {
        0.80
    } else if segments > 2 || trimmed.len() > 60 {
        0.40
    } else {
        0.55
    }
}

// ============================================================================
// SCORE FINAL
// ============================================================================

/// Um candidato com o resultado da sondagem e os componentes do score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: CandidateTarget,
    pub probe: LocatorProbe,
    pub base: f64,
    pub uniqueness: f64,
    pub visibility: f64,
    pub final_score: f64,
}

fn uniqueness_component(match_count: usize) -> f64 {
    match match_count {
        0 => 0.0,
        1 => 1.0,
        2 | 3 => 0.5,
        _ => 0.2,
    }
}

fn combine(base: f64, uniqueness: f64, visibility: f64, match_count: usize) -> f64 {
    if match_count == 0 {
        return 0.0;
    }
    WEIGHT_BASE * base + WEIGHT_UNIQUENESS * uniqueness + WEIGHT_VISIBILITY * visibility
}

/// Sonda e pontua todos os candidatos, em ordem, serialmente.
///
/// Erros de sondagem individuais não derrubam o pipeline: o candidato
/// fica com probe zerada (score 0) e o run segue.
pub async fn score_all(
    browser: &mut dyn Browser,
    candidates: &[CandidateTarget],
) -> Vec<ScoredCandidate> {
    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let probe = match browser.resolve_target(&candidate.target).await {
            Ok(probe) => probe,
            Err(e) => {
                debug!(target = %candidate.target.value, error = %e, "sondagem falhou");
                LocatorProbe::default()
            }
        };
        let base = base_quality(&candidate.target);
        let uniqueness = uniqueness_component(probe.match_count);
        let visibility = if probe.first_visible { 1.0 } else { 0.0 };
        let final_score = combine(base, uniqueness, visibility, probe.match_count);
        scored.push(ScoredCandidate {
            candidate: candidate.clone(),
            probe,
            base,
            uniqueness,
            visibility,
            final_score,
        });
    }
    scored
}

// ============================================================================
// AVALIAÇÃO / ADOÇÃO
// ============================================================================

/// Resultado da avaliação de um step: qual candidato recomendar e se
/// a regra de adoção permite trocá-lo de fato.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Índice do melhor candidato (pode ser 0, o atual).
    pub best_index: usize,
    /// A troca passa na regra de adoção?
    pub adoptable: bool,
}

/// Avalia os candidatos pontuados. `scored[0]` é sempre o atual.
///
/// Melhor = maior score final, estável por ordem de inserção (o
/// primeiro vence em empate exato).
pub fn evaluate(scored: &[ScoredCandidate]) -> Option<Evaluation> {
    if scored.is_empty() {
        return None;
    }
    let mut best_index = 0usize;
    for (i, candidate) in scored.iter().enumerate().skip(1) {
        if candidate.final_score > scored[best_index].final_score {
            best_index = i;
        }
    }
    let adoptable = best_index != 0
        && scored[best_index].probe.match_count == 1
        && scored[best_index].final_score >= scored[0].final_score + ADOPT_MARGIN;
    Some(Evaluation { best_index, adoptable })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeElement, ScriptedBrowser};
    use crate::browser::Browser as _;
    use crate::candidates::CandidateOrigin;
    use crate::protocol::TargetSource;
    use std::time::Duration;

    fn candidate(value: &str, kind: TargetKind) -> CandidateTarget {
        CandidateTarget {
            target: Target::new(value, kind, TargetSource::Derived),
            origin: CandidateOrigin::Derived,
            reason_codes: vec![],
        }
    }

    #[test]
    fn base_quality_ordering_follows_priors() {
        let role = base_quality(&Target::new("button \"Go\"", TargetKind::RoleEngine, TargetSource::Derived));
        let testid = base_quality(&Target::new(
            "getByTestId('go')",
            TargetKind::LocatorExpression,
            TargetSource::Derived,
        ));
        let id_css = base_quality(&Target::new("#go", TargetKind::Css, TargetSource::Derived));
        let text = base_quality(&Target::new("Go", TargetKind::TextSelector, TargetSource::Derived));
        let path = base_quality(&Target::new("form button", TargetKind::Css, TargetSource::Derived));
        let long_chain = base_quality(&Target::new(
            "body > div > form > fieldset > button",
            TargetKind::Css,
            TargetSource::Derived,
        ));
        let xpath = base_quality(&Target::new("//button[1]", TargetKind::Xpath, TargetSource::Derived));
        assert!(role > testid && testid > id_css && id_css > text);
        assert!(text > path && path > long_chain && long_chain > xpath);
    }

    #[test]
    fn zero_matches_scores_zero() {
        assert_eq!(combine(0.9, 0.0, 0.0, 0), 0.0);
    }

    async fn two_button_browser() -> ScriptedBrowser {
        let mut browser = ScriptedBrowser::single_page(
            "https://a.example.com/",
            vec![
                FakeElement::new("go", "button", "Inloggen").with_id("go").with_css(".btn"),
                FakeElement::new("other", "button", "Registreren").with_css(".btn"),
            ],
        );
        browser
            .navigate("https://a.example.com/", None, Duration::from_secs(1))
            .await
            .unwrap();
        browser
    }

    #[tokio::test]
    async fn score_all_reflects_uniqueness_and_visibility() {
        let mut browser = two_button_browser().await;
        let scored = score_all(
            &mut browser,
            &[candidate(".btn", TargetKind::Css), candidate("#go", TargetKind::Css)],
        )
        .await;
        assert_eq!(scored[0].probe.match_count, 2);
        assert_eq!(scored[0].uniqueness, 0.5);
        assert_eq!(scored[1].probe.match_count, 1);
        assert_eq!(scored[1].uniqueness, 1.0);
        assert!(scored[1].final_score > scored[0].final_score);
    }

    #[tokio::test]
    async fn adoption_requires_margin_and_uniqueness() {
        let mut browser = two_button_browser().await;
        // Atual ambíguo (.btn), candidato único e de tipo melhor.
        let scored = score_all(
            &mut browser,
            &[
                candidate(".btn", TargetKind::Css),
                candidate("button \"Inloggen\"", TargetKind::RoleEngine),
            ],
        )
        .await;
        let eval = evaluate(&scored).unwrap();
        assert_eq!(eval.best_index, 1);
        assert!(eval.adoptable);

        // Atual já único: margem de 0.15 não é vencida por outro único
        // de prior próximo.
        let scored = score_all(
            &mut browser,
            &[
                candidate("#go", TargetKind::Css),
                candidate("button \"Inloggen\"", TargetKind::RoleEngine),
            ],
        )
        .await;
        let eval = evaluate(&scored).unwrap();
        assert!(!eval.adoptable, "margem de {ADOPT_MARGIN} não atingida");
    }

    #[tokio::test]
    async fn ambiguous_candidate_never_adopted() {
        let mut browser = two_button_browser().await;
        let scored = score_all(
            &mut browser,
            &[
                candidate("#missing", TargetKind::Css),
                candidate(".btn", TargetKind::Css),
            ],
        )
        .await;
        let eval = evaluate(&scored).unwrap();
        assert_eq!(eval.best_index, 1);
        // Score maior, mas dois matches: a regra barra.
        assert!(!eval.adoptable);
    }

    #[tokio::test]
    async fn tie_prefers_insertion_order() {
        let mut browser = two_button_browser().await;
        let scored = score_all(
            &mut browser,
            &[
                candidate("#go", TargetKind::Css),
                candidate("#go", TargetKind::Css),
            ],
        )
        .await;
        let eval = evaluate(&scored).unwrap();
        assert_eq!(eval.best_index, 0, "empate exato fica com a inserção mais cedo");
    }
}
