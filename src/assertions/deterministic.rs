//! # Gerador Determinístico de Assertions (C11)
//!
//! Deriva uma pós-condição por step qualificado, só da action+target:
//!
//! - `fill`/`select` → `assertValue` com o dado que o step escreveu;
//! - `check` → `assertChecked(true)`; `uncheck` → `assertChecked(false)`;
//! - `click`/`press`/`hover` → coverage fallback `assertVisible` com
//!   confiança 0.76, EXCETO click em role=link com nome dinâmico
//!   (manchete longa, fragmento de hora): alvo de navegação dinâmica
//!   não ganha fallback, e o skip vai para a lista de pulos.
//!
//! Quando o selector pass adotou um reparo, o step runtime já carrega
//! o target reparado, então o candidato herda o reparo de graça.

use crate::errors::ImproveError;
use crate::index_map::IndexMap;
use crate::locator::repair::{has_date_time_fragment, has_dynamic_keyword, is_long_text};
use crate::locator::{target_accessible_text, target_role};
use crate::protocol::{ApplyStatus, AssertionCandidate, CandidateSource, Step};

use super::{ASSERT_CHECKED_CONFIDENCE, ASSERT_VALUE_CONFIDENCE, COVERAGE_FALLBACK_CONFIDENCE};

/// Um fallback deliberadamente não emitido.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSkip {
    /// Índice original do step.
    pub index: usize,
    /// Razão estável para o diagnóstico.
    pub reason: String,
}

/// Saída do gerador determinístico.
#[derive(Debug, Clone, Default)]
pub struct DeterministicOutcome {
    pub candidates: Vec<AssertionCandidate>,
    pub skipped_fallbacks: Vec<FallbackSkip>,
}

fn candidate(
    index: usize,
    after: &Step,
    step: Step,
    confidence: f64,
    rationale: &str,
    coverage_fallback: bool,
) -> AssertionCandidate {
    AssertionCandidate {
        index,
        after_action: after.action().to_string(),
        candidate: step,
        confidence,
        rationale: rationale.to_string(),
        coverage_fallback: coverage_fallback.then_some(true),
        stability_score: confidence,
        volatility_flags: vec![],
        candidate_source: CandidateSource::Deterministic,
        apply_status: ApplyStatus::NotRequested,
        apply_message: None,
    }
}

/// Click em link cuja accessible name parece manchete dinâmica: o
/// click navega para conteúdo volátil e um assertVisible do link não
/// prova nada na página de destino.
fn is_dynamic_navigation_click(step: &Step) -> bool {
    if !matches!(step, Step::Click { .. }) {
        return false;
    }
    let Some(target) = step.target() else { return false };
    if target_role(target).as_deref() != Some("link") {
        return false;
    }
    let Some(text) = target_accessible_text(target) else {
        return false;
    };
    is_long_text(&text) || has_date_time_fragment(&text) || has_dynamic_keyword(&text)
}

/// Gera os candidatos determinísticos para os steps runtime.
pub fn generate(
    runtime_steps: &[Step],
    index_map: &IndexMap,
) -> Result<DeterministicOutcome, ImproveError> {
    let mut outcome = DeterministicOutcome::default();

    for (runtime_index, step) in runtime_steps.iter().enumerate() {
        if !step.is_coverage() {
            continue;
        }
        let original_index = index_map.to_original(runtime_index)?;
        let target = step.target().expect("step de cobertura tem target").clone();

        match step {
            Step::Fill { text, .. } => {
                outcome.candidates.push(candidate(
                    original_index,
                    step,
                    Step::AssertValue { target, value: text.clone(), description: None },
                    ASSERT_VALUE_CONFIDENCE,
                    "valor final escrito pelo fill",
                    false,
                ));
            }
            Step::Select { value, .. } => {
                outcome.candidates.push(candidate(
                    original_index,
                    step,
                    Step::AssertValue { target, value: value.clone(), description: None },
                    ASSERT_VALUE_CONFIDENCE,
                    "opção selecionada pelo select",
                    false,
                ));
            }
            Step::Check { .. } => {
                outcome.candidates.push(candidate(
                    original_index,
                    step,
                    Step::AssertChecked { target, checked: true, description: None },
                    ASSERT_CHECKED_CONFIDENCE,
                    "estado após check",
                    false,
                ));
            }
            Step::Uncheck { .. } => {
                outcome.candidates.push(candidate(
                    original_index,
                    step,
                    Step::AssertChecked { target, checked: false, description: None },
                    ASSERT_CHECKED_CONFIDENCE,
                    "estado após uncheck",
                    false,
                ));
            }
            Step::Click { .. } | Step::Press { .. } | Step::Hover { .. } => {
                if is_dynamic_navigation_click(step) {
                    outcome.skipped_fallbacks.push(FallbackSkip {
                        index: original_index,
                        reason: "click em link de navegação com nome dinâmico".into(),
                    });
                    continue;
                }
                outcome.candidates.push(candidate(
                    original_index,
                    step,
                    Step::AssertVisible { target, description: None },
                    COVERAGE_FALLBACK_CONFIDENCE,
                    "coverage fallback: o alvo continua visível após a interação",
                    true,
                ));
            }
            _ => {}
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Target, TargetKind, TargetSource};

    fn css(value: &str) -> Target {
        Target::new(value, TargetKind::Css, TargetSource::CodegenJsonl)
    }

    #[test]
    fn fill_produces_assert_value_with_written_text() {
        let steps = vec![
            Step::Navigate { url: "/".into(), description: None },
            Step::Fill { target: css("#name"), text: "Alice".into(), description: None },
        ];
        let outcome = generate(&steps, &IndexMap::identity(2)).unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        let c = &outcome.candidates[0];
        assert_eq!(c.index, 1);
        assert_eq!(c.after_action, "fill");
        assert_eq!(c.confidence, ASSERT_VALUE_CONFIDENCE);
        assert!(c.coverage_fallback.is_none());
        match &c.candidate {
            Step::AssertValue { target, value, .. } => {
                assert_eq!(target.value, "#name");
                assert_eq!(value, "Alice");
            }
            other => panic!("esperava assertValue, veio {other:?}"),
        }
    }

    #[test]
    fn check_and_uncheck_produce_assert_checked() {
        let steps = vec![
            Step::Check { target: css("#tos"), description: None },
            Step::Uncheck { target: css("#news"), description: None },
        ];
        let outcome = generate(&steps, &IndexMap::identity(2)).unwrap();
        assert_eq!(outcome.candidates.len(), 2);
        assert!(matches!(
            outcome.candidates[0].candidate,
            Step::AssertChecked { checked: true, .. }
        ));
        assert!(matches!(
            outcome.candidates[1].candidate,
            Step::AssertChecked { checked: false, .. }
        ));
    }

    #[test]
    fn click_gets_coverage_fallback() {
        let steps = vec![Step::Click { target: css("#go"), description: None }];
        let outcome = generate(&steps, &IndexMap::identity(1)).unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        let c = &outcome.candidates[0];
        assert_eq!(c.confidence, COVERAGE_FALLBACK_CONFIDENCE);
        assert_eq!(c.coverage_fallback, Some(true));
        assert!(matches!(c.candidate, Step::AssertVisible { .. }));
    }

    #[test]
    fn dynamic_link_click_skips_fallback_and_records_reason() {
        let steps = vec![Step::Click {
            target: Target::new(
                "getByRole('link', { name: 'Schiphol vluchten winterweer update 12:30' })",
                TargetKind::LocatorExpression,
                TargetSource::CodegenJsonl,
            ),
            description: None,
        }];
        let outcome = generate(&steps, &IndexMap::identity(1)).unwrap();
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.skipped_fallbacks.len(), 1);
        assert_eq!(outcome.skipped_fallbacks[0].index, 0);
    }

    #[test]
    fn stable_link_click_still_gets_fallback() {
        let steps = vec![Step::Click {
            target: Target::new(
                "getByRole('link', { name: 'Contact' })",
                TargetKind::LocatorExpression,
                TargetSource::CodegenJsonl,
            ),
            description: None,
        }];
        let outcome = generate(&steps, &IndexMap::identity(1)).unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert!(outcome.skipped_fallbacks.is_empty());
    }

    #[test]
    fn indexes_are_original_via_map() {
        // Original: [nav, cookie(click, removido), fill] → runtime [nav, fill]
        let runtime = vec![
            Step::Navigate { url: "/".into(), description: None },
            Step::Fill { target: css("#name"), text: "A".into(), description: None },
        ];
        let map = IndexMap::after_remove_stale(3, &[1]);
        let outcome = generate(&runtime, &map).unwrap();
        assert_eq!(outcome.candidates[0].index, 2);
    }
}
