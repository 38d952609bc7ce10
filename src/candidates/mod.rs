//! # Gerador de Candidatos de Seletor
//!
//! Para um step interagente, enumera os targets alternativos que o
//! scorer vai sondar contra a página viva. A ordem de enumeração é
//! DETERMINÍSTICA (runs reprodutíveis) e sempre a mesma:
//!
//! 1. **current**: o target existente, sempre primeiro;
//! 2. **derived**: até K alternativas derivadas dos fatos do elemento
//!    que o target atual resolve: role+nome acessível, label,
//!    placeholder, title, texto, test id, CSS ancorado em id, caminho
//!    CSS mínimo;
//! 3. **repair**: variantes do reparador de locator expressions,
//!    quando a expressão carrega sinais dinâmicos.
//!
//! Quando o target atual não resolve nada, só o atual e as variantes
//! de reparo sobram (não há elemento para derivar fatos).

use tracing::debug;

use crate::browser::{Browser, ElementDescriptor};
use crate::limits::ExecutionLimits;
use crate::locator::repair::{self, RepairOutcome, LONG_TEXT_THRESHOLD};
use crate::locator::{Arg, Call, LocatorExpr, Value};
use crate::protocol::{Step, Target, TargetKind, TargetSource};

// ============================================================================
// TIPOS
// ============================================================================

/// De onde um candidato veio, para logging e tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    /// O target que já estava no arquivo.
    Current,
    /// Derivado dos fatos do elemento atual.
    Derived,
    /// Variante do reparador de expressões.
    Repair,
}

/// Um target candidato com a explicação de por que existe.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTarget {
    pub target: Target,
    pub origin: CandidateOrigin,
    pub reason_codes: Vec<String>,
}

/// Resultado da enumeração para um step.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    /// Candidatos na ordem de sondagem.
    pub candidates: Vec<CandidateTarget>,
    /// Detalhe de shape não suportado pelo reparador, se houve.
    /// Vira diagnóstico info no relatório.
    pub unsupported_shape: Option<String>,
}

// ============================================================================
// GERAÇÃO
// ============================================================================

fn expression(call: &str, value: &str) -> String {
    LocatorExpr {
        root: Call {
            name: call.to_string(),
            args: vec![Arg::Value(Value::Str(value.to_string()))],
        },
        chain: vec![],
    }
    .to_string()
}

fn derived(value: String, kind: TargetKind, reason: &str) -> CandidateTarget {
    CandidateTarget {
        target: Target::new(value, kind, TargetSource::Derived),
        origin: CandidateOrigin::Derived,
        reason_codes: vec![reason.to_string()],
    }
}

/// Deriva alternativas dos fatos do elemento, na ordem canônica.
fn derive_from_descriptor(descriptor: &ElementDescriptor) -> Vec<CandidateTarget> {
    let mut out = Vec::new();

    if let (Some(role), Some(name)) = (&descriptor.role, &descriptor.accessible_name) {
        if !name.is_empty() && name.chars().count() < LONG_TEXT_THRESHOLD {
            out.push(derived(
                format!("{role} \"{name}\""),
                TargetKind::RoleEngine,
                "derived_role_name",
            ));
        }
    }
    if let Some(label) = &descriptor.label {
        if !label.is_empty() {
            out.push(derived(
                expression("getByLabel", label),
                TargetKind::LocatorExpression,
                "derived_label",
            ));
        }
    }
    if let Some(placeholder) = &descriptor.placeholder {
        if !placeholder.is_empty() {
            out.push(derived(
                expression("getByPlaceholder", placeholder),
                TargetKind::LocatorExpression,
                "derived_placeholder",
            ));
        }
    }
    if let Some(title) = &descriptor.title {
        if !title.is_empty() {
            out.push(derived(
                expression("getByTitle", title),
                TargetKind::LocatorExpression,
                "derived_title",
            ));
        }
    }
    if let Some(text) = &descriptor.text {
        if !text.is_empty() && text.chars().count() < LONG_TEXT_THRESHOLD {
            out.push(derived(text.clone(), TargetKind::TextSelector, "derived_text"));
        }
    }
    if let Some(test_id) = &descriptor.test_id {
        if !test_id.is_empty() {
            out.push(derived(
                expression("getByTestId", test_id),
                TargetKind::LocatorExpression,
                "derived_test_id",
            ));
        }
    }
    if let Some(id) = &descriptor.id {
        if !id.is_empty() {
            out.push(derived(format!("#{id}"), TargetKind::Css, "derived_id_css"));
        }
    }
    if let Some(css_path) = &descriptor.css_path {
        if !css_path.is_empty() {
            out.push(derived(css_path.clone(), TargetKind::Css, "derived_css_path"));
        }
    }

    out
}

/// Enumera os candidatos de um step interagente.
///
/// Navigates e assertions nunca chegam aqui (o selector pass filtra).
pub async fn generate(
    browser: &mut dyn Browser,
    step: &Step,
    limits: &ExecutionLimits,
) -> GenerationOutcome {
    let Some(current) = step.target() else {
        return GenerationOutcome::default();
    };

    let mut outcome = GenerationOutcome::default();
    outcome.candidates.push(CandidateTarget {
        target: current.clone(),
        origin: CandidateOrigin::Current,
        reason_codes: vec!["current".to_string()],
    });

    // Fatos do elemento atual → derivados. Se o target não resolve
    // (é exatamente o caso que queremos consertar), não há fatos.
    match browser.describe_target(current).await {
        Ok(Some(descriptor)) => {
            outcome.candidates.extend(derive_from_descriptor(&descriptor));
        }
        Ok(None) => {
            debug!(target = %current.value, "target atual não resolve; sem derivados");
        }
        Err(e) => {
            debug!(target = %current.value, error = %e, "describe falhou; sem derivados");
        }
    }

    // Variantes do reparador.
    match repair::analyze(current) {
        RepairOutcome::Repaired { signals, variants } => {
            let signal_codes = signals.reason_codes();
            for variant in variants {
                let mut reason_codes = signal_codes.clone();
                reason_codes.push(variant.reason_code.to_string());
                outcome.candidates.push(CandidateTarget {
                    target: Target::new(
                        variant.expression,
                        TargetKind::LocatorExpression,
                        TargetSource::Derived,
                    ),
                    origin: CandidateOrigin::Repair,
                    reason_codes,
                });
            }
        }
        RepairOutcome::UnsupportedShape { detail } => {
            // O caminho CSS derivado acima já serve de fallback de
            // back-conversion; aqui só registramos o shape, e apenas
            // quando o fallback por seletor resolvido está habilitado.
            if !repair::resolved_fallback_enabled() {
                outcome
                    .candidates
                    .retain(|c| !c.reason_codes.iter().any(|r| r == "derived_css_path"));
            }
            outcome.unsupported_shape = Some(detail);
        }
        RepairOutcome::NotApplicable | RepairOutcome::NoDynamicSignals => {}
    }

    // Dedup por (kind, value), preservando a primeira ocorrência.
    let mut seen: Vec<(TargetKind, String)> = Vec::new();
    outcome.candidates.retain(|candidate| {
        let key = (candidate.target.kind, candidate.target.value.clone());
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });

    outcome.candidates.truncate(limits.max_candidates_per_step);
    outcome
}
