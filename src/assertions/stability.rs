//! # Avaliador de Estabilidade (C13)
//!
//! Atribui a cada candidato um `stability_score` ∈ [0,1]: a confiança
//! menos uma penalidade por flag de volatilidade detectada: e as
//! próprias flags. Também aplica o **smart snapshot cap**: por step
//! fonte, só os N candidatos de snapshot mais estáveis seguem no
//! pipeline; o excedente vira `skipped_policy` forçado.

use std::collections::HashMap;

use crate::limits::ExecutionLimits;
use crate::locator::repair::volatility_flags;
use crate::locator::{target_accessible_text, target_has_exact_true};
use crate::protocol::{ApplyStatus, AssertionCandidate, CandidateSource, VolatilityFlag};

// Penalidade por flag. Texto longo pesa mais: manchetes inteiras são o
// caso clássico de assertion que quebra amanhã.
fn penalty(flag: VolatilityFlag) -> f64 {
    match flag {
        VolatilityFlag::ContainsNumericFragment => 0.08,
        VolatilityFlag::ContainsDateOrTimeFragment => 0.10,
        VolatilityFlag::ContainsLongText => 0.12,
        VolatilityFlag::ContainsDynamicKeyword => 0.10,
        VolatilityFlag::ExactTrue => 0.05,
    }
}

/// Texto observável do candidato: o escalar afirmado mais o texto
/// acessível do alvo.
fn observable_text(candidate: &AssertionCandidate) -> String {
    let mut parts = Vec::new();
    if let Some(scalar) = candidate.candidate.value_scalar() {
        parts.push(scalar);
    }
    if let Some(target) = candidate.candidate.target() {
        if let Some(text) = target_accessible_text(target) {
            parts.push(text);
        }
    }
    parts.join(" ")
}

/// Avalia estabilidade de todos os candidatos, in place.
pub fn evaluate(candidates: &mut [AssertionCandidate]) {
    for candidate in candidates.iter_mut() {
        let text = observable_text(candidate);
        let exact = candidate
            .candidate
            .target()
            .map(target_has_exact_true)
            .unwrap_or(false);
        let flags = volatility_flags(&text, exact);
        let total_penalty: f64 = flags.iter().map(|&f| penalty(f)).sum();
        candidate.volatility_flags = flags;
        candidate.stability_score = (candidate.confidence - total_penalty).clamp(0.0, 1.0);
    }
}

/// Aplica o smart snapshot cap. Retorna quantos candidatos viraram
/// overflow (para o diagnóstico do engine).
pub fn apply_snapshot_cap(
    candidates: &mut [AssertionCandidate],
    limits: &ExecutionLimits,
) -> usize {
    let cap = limits.max_snapshot_candidates_per_step;
    let mut overflow = 0usize;

    // Agrupa os índices dos candidatos de snapshot por step fonte.
    let mut by_step: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, candidate) in candidates.iter().enumerate() {
        if matches!(
            candidate.candidate_source,
            CandidateSource::SnapshotNative | CandidateSource::SnapshotCli
        ) {
            by_step.entry(candidate.index).or_default().push(i);
        }
    }

    for (_, mut indices) in by_step {
        if indices.len() <= cap {
            continue;
        }
        // Mais estáveis primeiro; empate fica na ordem de emissão.
        indices.sort_by(|&a, &b| {
            candidates[b]
                .stability_score
                .partial_cmp(&candidates[a].stability_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for &i in &indices[cap..] {
            candidates[i].apply_status = ApplyStatus::SkippedPolicy;
            candidates[i].apply_message =
                Some(format!("smart snapshot cap: acima dos {cap} mais estáveis do step"));
            overflow += 1;
        }
    }

    overflow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Step, Target, TargetKind, TargetSource};

    fn snapshot_candidate(index: usize, name: &str, confidence: f64) -> AssertionCandidate {
        AssertionCandidate {
            index,
            after_action: "click".into(),
            candidate: Step::AssertVisible {
                target: Target::new(
                    format!("status \"{name}\""),
                    TargetKind::RoleEngine,
                    TargetSource::Derived,
                ),
                description: None,
            },
            confidence,
            rationale: "teste".into(),
            coverage_fallback: None,
            stability_score: confidence,
            volatility_flags: vec![],
            candidate_source: CandidateSource::SnapshotNative,
            apply_status: ApplyStatus::NotRequested,
            apply_message: None,
        }
    }

    #[test]
    fn stable_text_keeps_confidence() {
        let mut candidates = vec![snapshot_candidate(0, "Opgeslagen", 0.9)];
        evaluate(&mut candidates);
        assert!(candidates[0].volatility_flags.is_empty());
        assert_eq!(candidates[0].stability_score, 0.9);
    }

    #[test]
    fn volatile_text_is_penalized_with_flags() {
        let mut candidates = vec![snapshot_candidate(0, "Update 12:30 vandaag", 0.9)];
        evaluate(&mut candidates);
        let flags = &candidates[0].volatility_flags;
        assert!(flags.contains(&VolatilityFlag::ContainsNumericFragment));
        assert!(flags.contains(&VolatilityFlag::ContainsDateOrTimeFragment));
        assert!(flags.contains(&VolatilityFlag::ContainsDynamicKeyword));
        assert!(candidates[0].stability_score < 0.7);
    }

    #[test]
    fn exact_true_flag_comes_from_target_expression() {
        let mut candidates = vec![AssertionCandidate {
            candidate: Step::AssertVisible {
                target: Target::new(
                    "getByRole('link', { name: 'Home', exact: true })",
                    TargetKind::LocatorExpression,
                    TargetSource::Derived,
                ),
                description: None,
            },
            ..snapshot_candidate(0, "x", 0.9)
        }];
        evaluate(&mut candidates);
        assert!(candidates[0]
            .volatility_flags
            .contains(&VolatilityFlag::ExactTrue));
    }

    #[test]
    fn snapshot_cap_marks_least_stable_as_policy_overflow() {
        let mut candidates = vec![
            snapshot_candidate(3, "Opgeslagen", 0.90),
            snapshot_candidate(3, "Welkom terug", 0.82),
            snapshot_candidate(3, "Menu", 0.80),
            snapshot_candidate(7, "Andere step", 0.85),
        ];
        evaluate(&mut candidates);
        let overflow = apply_snapshot_cap(&mut candidates, &ExecutionLimits::default());
        assert_eq!(overflow, 1);
        // O menos estável do step 3 transborda; o step 7 não é afetado.
        assert_eq!(candidates[2].apply_status, ApplyStatus::SkippedPolicy);
        assert!(candidates[2].apply_message.as_ref().unwrap().contains("snapshot cap"));
        assert_eq!(candidates[0].apply_status, ApplyStatus::NotRequested);
        assert_eq!(candidates[3].apply_status, ApplyStatus::NotRequested);
    }

    #[test]
    fn deterministic_candidates_do_not_count_against_cap() {
        let mut det = snapshot_candidate(0, "x", 0.9);
        det.candidate_source = CandidateSource::Deterministic;
        let mut candidates = vec![
            det,
            snapshot_candidate(0, "a", 0.9),
            snapshot_candidate(0, "b", 0.8),
        ];
        let overflow = apply_snapshot_cap(&mut candidates, &ExecutionLimits::default());
        assert_eq!(overflow, 0);
    }
}
