//! # Policy Engine de Apply (C14)
//!
//! Decide quais candidatos merecem tentativa de apply no replay. Três
//! perfis nomeados:
//!
//! | Policy     | Confiança mín. | Threshold extra p/ texto de snapshot | Cap por step | Filtro de texto volátil |
//! |------------|----------------|--------------------------------------|--------------|-------------------------|
//! | reliable   | 0.80           | 0.90                                 | 1            | ligado                  |
//! | balanced   | 0.75           | 0.80                                 | 2            | ligado                  |
//! | aggressive | 0.70           | 0.70                                 | 3            | desligado               |
//!
//! Além dos thresholds, a policy suprime coverage fallbacks de
//! qualquer step que já tenha candidato não-fallback vivo. O cap por
//! step é aplicado na validação (C15), onde se sabe quem de fato
//! passou.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::protocol::{ApplyStatus, AssertionCandidate, CandidateSource, Step, VolatilityFlag};

// ============================================================================
// PERFIS
// ============================================================================

/// Perfil de apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyPolicy {
    Reliable,
    #[default]
    Balanced,
    Aggressive,
}

impl ApplyPolicy {
    /// Confiança mínima para qualquer candidato.
    pub fn min_confidence(self) -> f64 {
        match self {
            Self::Reliable => 0.80,
            Self::Balanced => 0.75,
            Self::Aggressive => 0.70,
        }
    }

    /// Threshold extra para assertText vindo de snapshot.
    pub fn snapshot_text_threshold(self) -> f64 {
        match self {
            Self::Reliable => 0.90,
            Self::Balanced => 0.80,
            Self::Aggressive => 0.70,
        }
    }

    /// Máximo de candidatos aplicados por step fonte.
    pub fn per_step_cap(self) -> usize {
        match self {
            Self::Reliable => 1,
            Self::Balanced => 2,
            Self::Aggressive => 3,
        }
    }

    /// Filtro duro de texto volátil.
    pub fn volatile_text_filter(self) -> bool {
        !matches!(self, Self::Aggressive)
    }
}

impl fmt::Display for ApplyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reliable => write!(f, "reliable"),
            Self::Balanced => write!(f, "balanced"),
            Self::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for ApplyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reliable" => Ok(Self::Reliable),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(format!(
                "policy desconhecida '{other}' (use reliable, balanced ou aggressive)"
            )),
        }
    }
}

// ============================================================================
// APLICAÇÃO DA POLICY
// ============================================================================

/// Flags que contam como "texto volátil" para o filtro duro.
/// `exact_true` fica de fora: é um problema de seletor, não de texto.
const VOLATILE_TEXT_FLAGS: &[VolatilityFlag] = &[
    VolatilityFlag::ContainsNumericFragment,
    VolatilityFlag::ContainsDateOrTimeFragment,
    VolatilityFlag::ContainsLongText,
    VolatilityFlag::ContainsDynamicKeyword,
];

/// Resultado agregado da passada de policy, para diagnósticos.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub suppressed_fallbacks: usize,
    pub low_confidence: usize,
    pub volatile_filtered: usize,
}

/// Aplica a policy in place. Candidatos que sobrevivem continuam
/// `NotRequested` (o validator decide o desfecho final); os barrados
/// ganham seu status de skip aqui.
pub fn apply(candidates: &mut [AssertionCandidate], policy: ApplyPolicy) -> PolicyOutcome {
    let mut outcome = PolicyOutcome::default();

    // Steps com pelo menos um candidato não-fallback ainda vivo.
    let steps_with_primary: HashSet<usize> = candidates
        .iter()
        .filter(|c| c.apply_status == ApplyStatus::NotRequested && !c.is_fallback())
        .map(|c| c.index)
        .collect();

    for candidate in candidates.iter_mut() {
        // O smart snapshot cap (C13) pode já ter decidido.
        if candidate.apply_status != ApplyStatus::NotRequested {
            continue;
        }

        // Supressão de coverage fallback.
        if candidate.is_fallback() && steps_with_primary.contains(&candidate.index) {
            candidate.apply_status = ApplyStatus::SkippedPolicy;
            candidate.apply_message =
                Some("coverage fallback suprimido: o step tem candidato não-fallback".into());
            outcome.suppressed_fallbacks += 1;
            continue;
        }

        // Confiança mínima do perfil.
        if candidate.confidence < policy.min_confidence() {
            candidate.apply_status = ApplyStatus::SkippedLowConfidence;
            candidate.apply_message = Some(format!(
                "confiança {:.2} abaixo do mínimo {:.2} da policy {policy}",
                candidate.confidence,
                policy.min_confidence()
            ));
            outcome.low_confidence += 1;
            continue;
        }

        // Threshold extra para texto de snapshot.
        let is_snapshot_text = matches!(
            candidate.candidate_source,
            CandidateSource::SnapshotNative | CandidateSource::SnapshotCli
        ) && matches!(candidate.candidate, Step::AssertText { .. });
        if is_snapshot_text && candidate.confidence < policy.snapshot_text_threshold() {
            candidate.apply_status = ApplyStatus::SkippedLowConfidence;
            candidate.apply_message = Some(format!(
                "assertText de snapshot exige {:.2} na policy {policy}",
                policy.snapshot_text_threshold()
            ));
            outcome.low_confidence += 1;
            continue;
        }

        // Filtro duro de texto volátil.
        if policy.volatile_text_filter()
            && candidate
                .volatility_flags
                .iter()
                .any(|f| VOLATILE_TEXT_FLAGS.contains(f))
        {
            candidate.apply_status = ApplyStatus::SkippedPolicy;
            candidate.apply_message =
                Some(format!("texto volátil barrado pela policy {policy}"));
            outcome.volatile_filtered += 1;
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Target, TargetKind, TargetSource};

    fn candidate(
        index: usize,
        confidence: f64,
        fallback: bool,
        source: CandidateSource,
    ) -> AssertionCandidate {
        AssertionCandidate {
            index,
            after_action: "click".into(),
            candidate: Step::AssertVisible {
                target: Target::new("#x", TargetKind::Css, TargetSource::Derived),
                description: None,
            },
            confidence,
            rationale: "teste".into(),
            coverage_fallback: fallback.then_some(true),
            stability_score: confidence,
            volatility_flags: vec![],
            candidate_source: source,
            apply_status: ApplyStatus::NotRequested,
            apply_message: None,
        }
    }

    #[test]
    fn profiles_match_the_table() {
        assert_eq!(ApplyPolicy::Reliable.min_confidence(), 0.80);
        assert_eq!(ApplyPolicy::Reliable.snapshot_text_threshold(), 0.90);
        assert_eq!(ApplyPolicy::Reliable.per_step_cap(), 1);
        assert!(ApplyPolicy::Reliable.volatile_text_filter());

        assert_eq!(ApplyPolicy::Balanced.min_confidence(), 0.75);
        assert_eq!(ApplyPolicy::Balanced.per_step_cap(), 2);

        assert_eq!(ApplyPolicy::Aggressive.min_confidence(), 0.70);
        assert_eq!(ApplyPolicy::Aggressive.per_step_cap(), 3);
        assert!(!ApplyPolicy::Aggressive.volatile_text_filter());
    }

    #[test]
    fn parse_round_trip() {
        for name in ["reliable", "balanced", "aggressive"] {
            let policy: ApplyPolicy = name.parse().unwrap();
            assert_eq!(policy.to_string(), name);
        }
        assert!("strict".parse::<ApplyPolicy>().is_err());
    }

    #[test]
    fn low_confidence_is_skipped_under_reliable() {
        let mut candidates = vec![candidate(0, 0.76, true, CandidateSource::Deterministic)];
        let outcome = apply(&mut candidates, ApplyPolicy::Reliable);
        assert_eq!(candidates[0].apply_status, ApplyStatus::SkippedLowConfidence);
        assert_eq!(outcome.low_confidence, 1);
    }

    #[test]
    fn fallback_suppressed_when_primary_exists() {
        let mut candidates = vec![
            candidate(2, 0.95, false, CandidateSource::Deterministic),
            candidate(2, 0.86, true, CandidateSource::SnapshotNative),
        ];
        let outcome = apply(&mut candidates, ApplyPolicy::Balanced);
        assert_eq!(candidates[0].apply_status, ApplyStatus::NotRequested);
        assert_eq!(candidates[1].apply_status, ApplyStatus::SkippedPolicy);
        assert_eq!(outcome.suppressed_fallbacks, 1);
    }

    #[test]
    fn fallback_survives_alone() {
        let mut candidates = vec![candidate(1, 0.76, true, CandidateSource::Deterministic)];
        apply(&mut candidates, ApplyPolicy::Aggressive);
        assert_eq!(candidates[0].apply_status, ApplyStatus::NotRequested);
    }

    #[test]
    fn snapshot_text_has_extra_threshold() {
        let mut text_candidate = candidate(0, 0.82, false, CandidateSource::SnapshotNative);
        text_candidate.candidate = Step::AssertText {
            target: Target::new("status \"Ok\"", TargetKind::RoleEngine, TargetSource::Derived),
            text: "Ok".into(),
            description: None,
        };
        let mut candidates = vec![text_candidate.clone()];
        apply(&mut candidates, ApplyPolicy::Reliable);
        assert_eq!(candidates[0].apply_status, ApplyStatus::SkippedLowConfidence);

        // Na balanced, 0.82 ≥ 0.80 e passa.
        let mut candidates = vec![text_candidate];
        apply(&mut candidates, ApplyPolicy::Balanced);
        assert_eq!(candidates[0].apply_status, ApplyStatus::NotRequested);
    }

    #[test]
    fn volatile_filter_respects_profile() {
        let mut volatile = candidate(0, 0.9, false, CandidateSource::SnapshotNative);
        volatile.volatility_flags = vec![VolatilityFlag::ContainsDateOrTimeFragment];

        let mut candidates = vec![volatile.clone()];
        apply(&mut candidates, ApplyPolicy::Reliable);
        assert_eq!(candidates[0].apply_status, ApplyStatus::SkippedPolicy);

        let mut candidates = vec![volatile];
        apply(&mut candidates, ApplyPolicy::Aggressive);
        assert_eq!(candidates[0].apply_status, ApplyStatus::NotRequested);
    }

    #[test]
    fn exact_true_alone_does_not_trip_volatile_filter() {
        let mut with_exact = candidate(0, 0.9, false, CandidateSource::Deterministic);
        with_exact.volatility_flags = vec![VolatilityFlag::ExactTrue];
        let mut candidates = vec![with_exact];
        apply(&mut candidates, ApplyPolicy::Reliable);
        assert_eq!(candidates[0].apply_status, ApplyStatus::NotRequested);
    }
}
