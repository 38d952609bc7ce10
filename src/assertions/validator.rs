//! # Validador de Assertions por Replay (C15)
//!
//! Re-executa o teste mutado step a step numa página limpa e roda cada
//! candidato selecionado inline no seu ponto de inserção, em modo
//! analysis:
//!
//! - sucesso → `applied`;
//! - falha → `skipped_runtime_failure` com a mensagem original e
//!   diagnóstico warn;
//! - cap por step atingido → `skipped_policy` para os restantes;
//! - equivalente a assertion adjacente pré-existente →
//!   `skipped_existing` (compara value, kind e framePath, tolera
//!   proveniência diferente).
//!
//! Falha dura do próprio step durante o replay marca todos os
//! candidatos restantes daquele step em diante como
//! `skipped_runtime_failure` e aborta o replay.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::browser::{Browser, ExecMode};
use crate::errors::{diag, ImproveError};
use crate::index_map::IndexMap;
use crate::limits::ExecutionLimits;
use crate::protocol::{ApplyStatus, AssertionCandidate, Diagnostic, Step};

use super::policy::ApplyPolicy;

/// Resultado do replay de validação.
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    /// Assertions aprovadas: (índice runtime do step fonte, assertion),
    /// na ordem de aplicação.
    pub applied: Vec<(usize, Step)>,
    /// Diagnósticos emitidos durante o replay.
    pub diagnostics: Vec<Diagnostic>,
    /// Step runtime onde o replay abortou, se abortou.
    pub aborted_at: Option<usize>,
}

/// Assertion pré-existente adjacente ao step fonte equivalente ao
/// candidato?
fn has_adjacent_equivalent(runtime_steps: &[Step], source: usize, candidate: &Step) -> bool {
    runtime_steps
        .iter()
        .skip(source + 1)
        .take_while(|s| s.is_assertion())
        .any(|existing| candidate.assertion_equivalent(existing))
}

/// Replay completo com execução inline dos candidatos.
pub async fn validate(
    browser: &mut dyn Browser,
    runtime_steps: &[Step],
    candidates: &mut [AssertionCandidate],
    policy: ApplyPolicy,
    limits: &ExecutionLimits,
    base_url: Option<&str>,
    index_map: &IndexMap,
) -> Result<ReplayOutcome, ImproveError> {
    let mut outcome = ReplayOutcome::default();

    // Candidatos vivos agrupados pela posição runtime do step fonte.
    let mut by_runtime: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, candidate) in candidates.iter_mut().enumerate() {
        if candidate.apply_status != ApplyStatus::NotRequested {
            continue;
        }
        match index_map.to_runtime(candidate.index) {
            Some(runtime) => by_runtime.entry(runtime).or_default().push(i),
            None => {
                candidate.apply_status = ApplyStatus::SkippedRuntimeFailure;
                candidate.apply_message =
                    Some("o step fonte foi removido antes da validação".into());
            }
        }
    }

    browser.reset().await.map_err(|e| ImproveError::Browser { message: e.to_string() })?;

    for (runtime_index, step) in runtime_steps.iter().enumerate() {
        if let Err(e) = browser
            .execute_step(step, ExecMode::Playback, limits.step_timeout, base_url)
            .await
        {
            warn!(step = runtime_index, error = %e, "replay abortado");
            outcome.diagnostics.push(Diagnostic::warn(
                diag::ASSERTION_RUNTIME_FAILURE,
                format!("replay falhou no step {runtime_index} ({}): {e}", step.action()),
            ));
            let message = format!("replay abortou no step {runtime_index}: {e}");
            for (&runtime, indices) in by_runtime.iter() {
                if runtime < runtime_index {
                    continue;
                }
                for &i in indices {
                    if candidates[i].apply_status == ApplyStatus::NotRequested {
                        candidates[i].apply_status = ApplyStatus::SkippedRuntimeFailure;
                        candidates[i].apply_message = Some(message.clone());
                    }
                }
            }
            outcome.aborted_at = Some(runtime_index);
            break;
        }

        match browser.wait_for_network_idle(limits.network_idle_timeout).await {
            Ok(true) => outcome.diagnostics.push(Diagnostic::warn(
                diag::NETWORK_IDLE_TIMED_OUT,
                format!("network idle estourou o timeout após o step {runtime_index}"),
            )),
            Ok(false) => {}
            Err(e) => outcome.diagnostics.push(Diagnostic::warn(
                diag::NETWORK_IDLE_FAILED,
                format!("espera por network idle falhou após o step {runtime_index}: {e}"),
            )),
        }

        let Some(indices) = by_runtime.get(&runtime_index) else {
            continue;
        };
        let mut applied_here = 0usize;

        for &i in indices {
            if candidates[i].apply_status != ApplyStatus::NotRequested {
                continue;
            }

            if has_adjacent_equivalent(runtime_steps, runtime_index, &candidates[i].candidate) {
                candidates[i].apply_status = ApplyStatus::SkippedExisting;
                candidates[i].apply_message =
                    Some("assertion equivalente já existe adjacente ao step".into());
                continue;
            }

            if applied_here >= policy.per_step_cap() {
                candidates[i].apply_status = ApplyStatus::SkippedPolicy;
                candidates[i].apply_message = Some(format!(
                    "cap de {} assertion(s) por step da policy atingido",
                    policy.per_step_cap()
                ));
                continue;
            }

            let assertion = candidates[i].candidate.clone();
            match browser
                .execute_step(&assertion, ExecMode::Analysis, limits.step_timeout, base_url)
                .await
            {
                Ok(()) => {
                    candidates[i].apply_status = ApplyStatus::Applied;
                    applied_here += 1;
                    info!(
                        step = runtime_index,
                        action = candidates[i].candidate.action(),
                        "assertion validada inline"
                    );
                    outcome.diagnostics.push(Diagnostic::info(
                        diag::ASSERTION_APPLIED,
                        format!(
                            "{} aplicada após o step {runtime_index}",
                            candidates[i].candidate.action()
                        ),
                    ));
                    outcome
                        .applied
                        .push((runtime_index, candidates[i].candidate.clone()));
                }
                Err(e) => {
                    candidates[i].apply_status = ApplyStatus::SkippedRuntimeFailure;
                    candidates[i].apply_message = Some(e.to_string());
                    outcome.diagnostics.push(Diagnostic::warn(
                        diag::ASSERTION_RUNTIME_FAILURE,
                        format!(
                            "{} falhou inline após o step {runtime_index}: {e}",
                            candidates[i].candidate.action()
                        ),
                    ));
                }
            }
        }
    }

    Ok(outcome)
}

/// Insere as assertions aplicadas logo após seus steps fonte,
/// preservando a ordem de aplicação dentro do mesmo step.
pub fn insert_applied(runtime_steps: &[Step], applied: &[(usize, Step)]) -> Vec<Step> {
    let mut out = Vec::with_capacity(runtime_steps.len() + applied.len());
    for (i, step) in runtime_steps.iter().enumerate() {
        out.push(step.clone());
        for (source, assertion) in applied {
            if *source == i {
                out.push(assertion.clone());
            }
        }
    }
    out
}
