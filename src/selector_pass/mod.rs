//! # Selector Pass (C7)
//!
//! Executa o teste step a step no browser e, para cada step
//! interagente, roda a análise de seletor ANTES de executar:
//!
//! 1. captura pré-snapshot (se o modo snapshot nativo foi pedido);
//! 2. enumera candidatos (atual + derivados + reparos), pontua todos
//!    contra a página pausada e registra um [`StepFinding`] com os
//!    scores velho/recomendado;
//! 3. se `apply_selectors` e a regra de adoção aceita, troca o target
//!    do step antes de executar;
//! 4. executa em modo playback; falha vira runtime-failing step e o
//!    pipeline continua (navigate que falha aborta o pass);
//! 5. espera network idle (timeout é warning, não erro);
//! 6. captura pós-snapshot.
//!
//! Steps de navigate nunca são re-targeted; assertions pré-existentes
//! são executadas mas não re-pontuadas aqui: se falham, viram
//! diagnóstico (uma assertion nunca é "runtime-failing step" para o
//! classificador).

use tracing::{debug, info, warn};

use crate::browser::{Browser, ExecMode};
use crate::candidates;
use crate::errors::{diag, ImproveError};
use crate::index_map::IndexMap;
use crate::limits::ExecutionLimits;
use crate::protocol::{Diagnostic, Step, StepFinding, StepSnapshot};
use crate::scoring;

/// Opções do pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorPassOptions {
    /// Troca targets no array de steps quando a adoção aceita.
    pub apply_selectors: bool,
    /// Captura snapshots pré/pós por step.
    pub capture_snapshots: bool,
}

/// Resultado do pass.
#[derive(Debug, Default)]
pub struct SelectorPassOutcome {
    /// Steps runtime, possivelmente re-targeted (mesmo comprimento da
    /// entrada).
    pub steps: Vec<Step>,
    /// Um finding por step interagente, indexado pelo índice ORIGINAL.
    pub findings: Vec<StepFinding>,
    /// Snapshots por índice runtime (vazio sem captura).
    pub snapshots: Vec<StepSnapshot>,
    /// Índices RUNTIME dos steps que falharam em playback.
    pub failed_runtime: Vec<usize>,
    /// Diagnósticos emitidos durante o pass.
    pub diagnostics: Vec<Diagnostic>,
    /// O pass abortou numa navegação que falhou?
    pub navigation_aborted: bool,
}

/// Roda o pass completo sobre os steps runtime.
pub async fn run(
    browser: &mut dyn Browser,
    mut steps: Vec<Step>,
    index_map: &IndexMap,
    base_url: Option<&str>,
    limits: &ExecutionLimits,
    options: SelectorPassOptions,
) -> Result<SelectorPassOutcome, ImproveError> {
    let mut outcome = SelectorPassOutcome::default();

    for runtime_index in 0..steps.len() {
        let original_index = index_map.to_original(runtime_index)?;

        let pre = if options.capture_snapshots {
            match browser.snapshot().await {
                Ok(tree) => Some(tree),
                Err(e) => {
                    debug!(step = runtime_index, error = %e, "pré-snapshot falhou");
                    None
                }
            }
        } else {
            None
        };

        // Análise de seletor, só para steps interagentes.
        if steps[runtime_index].is_coverage() {
            let generation = candidates::generate(browser, &steps[runtime_index], limits).await;
            if let Some(detail) = &generation.unsupported_shape {
                outcome.diagnostics.push(Diagnostic::info(
                    diag::REPAIR_UNSUPPORTED_SHAPE,
                    format!("step {original_index}: {detail}"),
                ));
            }

            let scored = scoring::score_all(browser, &generation.candidates).await;
            if let Some(evaluation) = scoring::evaluate(&scored) {
                let current = &scored[0];
                let best = &scored[evaluation.best_index];
                let changed = options.apply_selectors && evaluation.adoptable;

                let mut reason_codes = best.candidate.reason_codes.clone();
                if evaluation.best_index == 0 {
                    reason_codes = vec!["current_is_best".to_string()];
                }

                outcome.findings.push(StepFinding {
                    index: original_index,
                    action: steps[runtime_index].action().to_string(),
                    old_target: current.candidate.target.clone(),
                    recommended_target: best.candidate.target.clone(),
                    old_score: current.final_score,
                    recommended_score: best.final_score,
                    confidence_delta: best.final_score - current.final_score,
                    reason_codes,
                    changed,
                });

                if changed {
                    info!(
                        step = original_index,
                        old = %current.candidate.target.value,
                        new = %best.candidate.target.value,
                        "seletor adotado"
                    );
                    outcome.diagnostics.push(Diagnostic::info(
                        diag::SELECTOR_ADOPTED,
                        format!(
                            "step {original_index}: '{}' → '{}'",
                            current.candidate.target.value, best.candidate.target.value
                        ),
                    ));
                    let new_target = best.candidate.target.clone();
                    steps[runtime_index] = steps[runtime_index].clone().with_target(new_target);
                } else if evaluation.best_index != 0 {
                    outcome.diagnostics.push(Diagnostic::info(
                        diag::SELECTOR_KEPT,
                        format!(
                            "step {original_index}: recomendado '{}' não adotado (margem ou apply off)",
                            best.candidate.target.value
                        ),
                    ));
                }
            }
        }

        // Execução playback.
        let step = steps[runtime_index].clone();
        if let Err(e) = browser
            .execute_step(&step, ExecMode::Playback, limits.step_timeout, base_url)
            .await
        {
            if matches!(step, Step::Navigate { .. }) {
                warn!(step = runtime_index, error = %e, "navegação falhou; pass abortado");
                outcome.diagnostics.push(Diagnostic::error(
                    diag::NAVIGATION_STEP_FAILED,
                    format!("navegação do step {original_index} falhou: {e}"),
                ));
                outcome.failed_runtime.push(runtime_index);
                outcome.navigation_aborted = true;
                if let Some(pre) = pre {
                    outcome.snapshots.push(StepSnapshot {
                        runtime_index,
                        pre: Some(pre),
                        post: None,
                    });
                }
                break;
            }
            if step.is_assertion() {
                // Assertion pré-existente que falhou: registra e segue;
                // nunca entra na lista do classificador.
                outcome.diagnostics.push(Diagnostic::warn(
                    diag::ASSERTION_RUNTIME_FAILURE,
                    format!("assertion pré-existente no step {original_index} falhou: {e}"),
                ));
            } else {
                warn!(step = runtime_index, error = %e, "step falhou em runtime");
                outcome.failed_runtime.push(runtime_index);
            }
        }

        // Network idle: timeout é warning, erro duro também só avisa.
        match browser.wait_for_network_idle(limits.network_idle_timeout).await {
            Ok(true) => outcome.diagnostics.push(Diagnostic::warn(
                diag::NETWORK_IDLE_TIMED_OUT,
                format!("network idle estourou o timeout após o step {original_index}"),
            )),
            Ok(false) => {}
            Err(e) => outcome.diagnostics.push(Diagnostic::warn(
                diag::NETWORK_IDLE_FAILED,
                format!("espera por network idle falhou após o step {original_index}: {e}"),
            )),
        }

        if options.capture_snapshots {
            let post = match browser.snapshot().await {
                Ok(tree) => Some(tree),
                Err(e) => {
                    debug!(step = runtime_index, error = %e, "pós-snapshot falhou");
                    None
                }
            };
            outcome.snapshots.push(StepSnapshot { runtime_index, pre, post });
        }
    }

    outcome.steps = steps;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeElement, ScriptedBrowser};
    use crate::protocol::{Target, TargetKind, TargetSource};

    fn css(value: &str) -> Target {
        Target::new(value, TargetKind::Css, TargetSource::CodegenJsonl)
    }

    fn app_browser() -> ScriptedBrowser {
        ScriptedBrowser::single_page(
            "https://app.example.com/login",
            vec![
                FakeElement::new("name", "textbox", "Naam")
                    .with_id("name")
                    .with_css(".field"),
                FakeElement::new("email", "textbox", "E-mail")
                    .with_id("email")
                    .with_css(".field"),
                FakeElement::new("go", "button", "Inloggen").with_id("go"),
            ],
        )
    }

    fn nav() -> Step {
        Step::Navigate { url: "https://app.example.com/login".into(), description: None }
    }

    #[tokio::test]
    async fn records_findings_with_original_indexes() {
        let mut browser = app_browser();
        let steps = vec![
            nav(),
            Step::Fill { target: css("#name"), text: "Alice".into(), description: None },
            Step::Click { target: css("#go"), description: None },
        ];
        let outcome = run(
            &mut browser,
            steps,
            &IndexMap::identity(3),
            None,
            &ExecutionLimits::default(),
            SelectorPassOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.findings.len(), 2);
        assert_eq!(outcome.findings[0].index, 1);
        assert_eq!(outcome.findings[1].index, 2);
        assert!(outcome.failed_runtime.is_empty());
        // Sem apply, nada muda.
        assert!(outcome.findings.iter().all(|f| !f.changed));
    }

    #[tokio::test]
    async fn ambiguous_selector_is_retargeted_before_execution() {
        let mut browser = app_browser();
        // ".field" resolve dois campos; o derivado role "Naam" é único.
        let steps = vec![
            nav(),
            Step::Fill { target: css(".field"), text: "Alice".into(), description: None },
        ];
        let outcome = run(
            &mut browser,
            steps,
            &IndexMap::identity(2),
            None,
            &ExecutionLimits::default(),
            SelectorPassOptions { apply_selectors: true, capture_snapshots: false },
        )
        .await
        .unwrap();

        let finding = &outcome.findings[0];
        assert!(finding.changed);
        assert!(finding.confidence_delta >= crate::scoring::ADOPT_MARGIN);
        assert_ne!(outcome.steps[1].target().unwrap().value, ".field");
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.code == diag::SELECTOR_ADOPTED));
        // O fill executou com o target novo.
        assert!(browser.executed.iter().any(|e| e.starts_with("fill ")));
    }

    #[tokio::test]
    async fn failed_step_is_recorded_and_pass_continues() {
        let mut browser = app_browser().fail_on("#go");
        let steps = vec![
            nav(),
            Step::Click { target: css("#go"), description: None },
            Step::Fill { target: css("#name"), text: "Bob".into(), description: None },
        ];
        let outcome = run(
            &mut browser,
            steps,
            &IndexMap::identity(3),
            None,
            &ExecutionLimits::default(),
            SelectorPassOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.failed_runtime, vec![1]);
        // O fill depois da falha ainda executou.
        assert!(browser.executed.iter().any(|e| e == "fill #name"));
    }

    #[tokio::test]
    async fn failed_navigation_aborts_the_pass() {
        let mut browser = app_browser();
        let steps = vec![
            Step::Navigate { url: "https://nowhere.example.com/".into(), description: None },
            Step::Click { target: css("#go"), description: None },
        ];
        let outcome = run(
            &mut browser,
            steps,
            &IndexMap::identity(2),
            None,
            &ExecutionLimits::default(),
            SelectorPassOptions::default(),
        )
        .await
        .unwrap();

        assert!(outcome.navigation_aborted);
        assert_eq!(outcome.failed_runtime, vec![0]);
        assert!(outcome.findings.is_empty());
        assert!(browser.executed.is_empty());
    }

    #[tokio::test]
    async fn snapshots_are_captured_per_step() {
        let mut browser = app_browser();
        let steps = vec![
            nav(),
            Step::Fill { target: css("#name"), text: "Alice".into(), description: None },
        ];
        let outcome = run(
            &mut browser,
            steps,
            &IndexMap::identity(2),
            None,
            &ExecutionLimits::default(),
            SelectorPassOptions { apply_selectors: false, capture_snapshots: true },
        )
        .await
        .unwrap();

        assert_eq!(outcome.snapshots.len(), 2);
        assert_eq!(outcome.snapshots[1].runtime_index, 1);
        // O pós-snapshot do fill mostra o value escrito.
        let post = outcome.snapshots[1].post.as_ref().unwrap();
        assert!(post.contains("Alice"));
    }

    #[tokio::test]
    async fn failed_existing_assertion_is_diagnostic_not_failure() {
        let mut browser = app_browser();
        let steps = vec![
            nav(),
            Step::AssertText {
                target: css("#go"),
                text: "Uitloggen".into(),
                description: None,
            },
        ];
        let outcome = run(
            &mut browser,
            steps,
            &IndexMap::identity(2),
            None,
            &ExecutionLimits::default(),
            SelectorPassOptions::default(),
        )
        .await
        .unwrap();

        assert!(outcome.failed_runtime.is_empty());
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.code == diag::ASSERTION_RUNTIME_FAILURE));
    }

    #[tokio::test]
    async fn network_idle_timeout_is_warning() {
        let mut browser = app_browser();
        browser.idle_outcomes.push_back(Ok(true));
        let steps = vec![nav()];
        let outcome = run(
            &mut browser,
            steps,
            &IndexMap::identity(1),
            None,
            &ExecutionLimits::default(),
            SelectorPassOptions::default(),
        )
        .await
        .unwrap();
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.code == diag::NETWORK_IDLE_TIMED_OUT));
    }
}
