//! # Limpeza: Assertions Stale e Steps que Falham em Runtime
//!
//! Dois detectores moram aqui:
//!
//! - o detector de **assertions stale** roda ANTES do selector pass e
//!   marca assertions pré-existentes que já não fazem sentido;
//! - o classificador de **steps que falharam em runtime** decide, para
//!   cada step não-navigate que quebrou durante o pass, entre *remove*
//!   (banner de cookie, dismissal transiente) e *retain*.
//!
//! ## A tabela de decisão do classificador (ordem importa!)
//!
//! 1. navigate nunca é removido;
//! 2. step que é o único contexto de uma assertion sobrevivente nunca
//!    é removido;
//! 3. evidência FORTE remove: seletor de CMP conhecido, ou nome
//!    acessível batendo EXATO no dicionário multilíngue de dismiss;
//! 4. salvaguarda de link de conteúdo retém (role=link + palavra de
//!    conteúdo);
//! 5. salvaguarda de intenção de negócio retém (checkout, payment,
//!    order, billing...);
//! 6. evidência fraca remove: marcador de contexto transiente (cookie,
//!    consent, gdpr, banner, popup...) combinado com verbo de dismiss
//!    ou cue de role=button;
//! 7. default: retém.
//!
//! A ordem forte → salvaguardas → fraca é deliberada: um hint fraco
//! nunca passa por cima de uma salvaguarda de conteúdo. Reordenar
//! exige atualizar a matriz de testes deste módulo.

use crate::consent;
use crate::locator;
use crate::protocol::Step;

// ============================================================================
// ASSERTIONS STALE (C8)
// ============================================================================

/// Uma assertion pré-existente detectada como stale.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleAssertion {
    /// Índice original da assertion.
    pub index: usize,
    /// Por que ela está stale (vai para o diagnóstico).
    pub reason: String,
}

/// Varre as assertions pré-existentes do teste.
///
/// Duas regras (decisão registrada no DESIGN):
/// - **escrita contradita**: assertValue/assertChecked cujo alvo foi
///   escrito por um fill/select/check/uncheck anterior com um dado
///   DIFERENTE do afirmado: a assertion não tem como passar;
/// - **visibilidade vácua**: assertVisible imediatamente seguido de
///   uma interação no mesmo alvo: a interação já prova visibilidade.
pub fn find_stale_assertions(steps: &[Step]) -> Vec<StaleAssertion> {
    let mut stale = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        if !step.is_assertion() {
            continue;
        }

        if let Some(reason) = contradicted_write(steps, index) {
            stale.push(StaleAssertion { index, reason });
            continue;
        }

        if let Some(reason) = vacuous_visibility(steps, index) {
            stale.push(StaleAssertion { index, reason });
        }
    }

    stale
}

fn contradicted_write(steps: &[Step], index: usize) -> Option<String> {
    let assertion = &steps[index];
    let target = assertion.target()?;

    let expected: String = match assertion {
        Step::AssertValue { value, .. } => value.clone(),
        Step::AssertChecked { checked, .. } => checked.to_string(),
        _ => return None,
    };

    // Procura a escrita mais próxima antes da assertion no mesmo alvo.
    for prior in steps[..index].iter().rev() {
        let Some(prior_target) = prior.target() else { continue };
        if !prior_target.equivalent_ignoring_source(target) {
            continue;
        }
        let written: Option<String> = match prior {
            Step::Fill { text, .. } => Some(text.clone()),
            Step::Select { value, .. } => Some(value.clone()),
            Step::Check { .. } => Some("true".to_string()),
            Step::Uncheck { .. } => Some("false".to_string()),
            _ => continue,
        };
        return match written {
            Some(written) if written != expected => Some(format!(
                "afirma '{expected}' mas o step anterior escreveu '{written}' no mesmo alvo"
            )),
            _ => None,
        };
    }
    None
}

fn vacuous_visibility(steps: &[Step], index: usize) -> Option<String> {
    let Step::AssertVisible { target, .. } = &steps[index] else {
        return None;
    };
    let next = steps.get(index + 1)?;
    if !next.is_coverage() {
        return None;
    }
    let next_target = next.target()?;
    if next_target.equivalent_ignoring_source(target) {
        Some(format!(
            "vácua: o step seguinte ({}) interage com o mesmo alvo",
            next.action()
        ))
    } else {
        None
    }
}

// ============================================================================
// CLASSIFICADOR DE FALHAS DE RUNTIME (C9)
// ============================================================================

/// Decisão do classificador para um step que falhou.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDecision {
    /// Remover o step do teste.
    Remove { reason: String },
    /// Manter o step (e deixar a falha registrada no relatório).
    Retain { reason: String },
}

impl FailureDecision {
    pub fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

/// Texto "humano" do step: descrição + o que dá para extrair do target.
fn step_text(step: &Step) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(target) = step.target() {
        if let Some(text) = locator::target_accessible_text(target) {
            parts.push(text);
        }
        if let Some(warning) = &target.warning {
            parts.push(warning.clone());
        }
    }
    if let Step::Navigate { description: Some(d), .. }
    | Step::Click { description: Some(d), .. }
    | Step::Fill { description: Some(d), .. }
    | Step::Press { description: Some(d), .. }
    | Step::Hover { description: Some(d), .. }
    | Step::Check { description: Some(d), .. }
    | Step::Uncheck { description: Some(d), .. }
    | Step::Select { description: Some(d), .. } = step
    {
        parts.push(d.clone());
    }
    parts.join(" ")
}

/// Role do alvo, quando o target o expõe.
fn step_role(step: &Step) -> Option<String> {
    step.target().and_then(locator::target_role)
}

/// Classifica um step que falhou durante o selector pass.
///
/// `protects_surviving_assertion` = o step é o único contexto de uma
/// assertion que sobreviveu à limpeza (regra 2: nunca remover).
pub fn classify_runtime_failure(
    step: &Step,
    protects_surviving_assertion: bool,
) -> FailureDecision {
    // Regra 1: navegação nunca é removida.
    if matches!(step, Step::Navigate { .. }) {
        return FailureDecision::Retain {
            reason: "steps de navegação nunca são removidos".into(),
        };
    }

    // Regra 2: contexto de assertion sobrevivente.
    if protects_surviving_assertion {
        return FailureDecision::Retain {
            reason: "único contexto de uma assertion sobrevivente".into(),
        };
    }

    let text = step_text(step);
    let role = step_role(step);
    let target_value = step.target().map(|t| t.value.as_str()).unwrap_or("");

    // Regra 3: evidência forte.
    if consent::is_cmp_selector(target_value) {
        return FailureDecision::Remove {
            reason: format!("seletor de CMP conhecido: {target_value}"),
        };
    }
    if consent::is_dismiss_text(&text) {
        return FailureDecision::Remove {
            reason: format!("texto de dismiss do dicionário multilíngue: '{}'", text.trim()),
        };
    }

    // Regra 4: salvaguarda de link de conteúdo.
    if role.as_deref() == Some("link") && consent::has_content_keyword(&text) {
        return FailureDecision::Retain {
            reason: "link de conteúdo plausível (role=link + palavra de conteúdo)".into(),
        };
    }

    // Regra 5: salvaguarda de intenção de negócio.
    if consent::has_business_intent(&text) {
        return FailureDecision::Retain {
            reason: "intenção de negócio no texto (checkout/payment/order)".into(),
        };
    }

    // Regra 6: evidência fraca: contexto transiente + cue de dismiss.
    let transient = consent::has_transient_context(&text)
        || consent::has_transient_context(target_value);
    if transient && (consent::has_dismiss_verb(&text) || role.as_deref() == Some("button")) {
        return FailureDecision::Remove {
            reason: "contexto transiente com cue de dismiss".into(),
        };
    }

    // Regra 7: default.
    FailureDecision::Retain {
        reason: "sem evidência de step transiente".into(),
    }
}
