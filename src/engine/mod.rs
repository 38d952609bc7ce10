//! # Engine de Improve - Orquestração do Pipeline
//!
//! Este módulo é o contrato de entrada do improve. Ele amarra os
//! estágios na ordem fixa:
//!
//! ```text
//! loader → validation → limites → stale cleanup → selector pass
//!   → classificador de falhas + index map → geradores de assertion
//!   → estabilidade → policy → validação por replay → relatório
//! ```
//!
//! ## Regras de orquestração que valem a pena decorar:
//!
//! - `applyAssertions=true` com `assertions=none` é rebaixado para
//!   false, com diagnóstico (o usuário pediu uma contradição);
//! - problemas por-step NUNCA derrubam o run; só schema, ambiente e
//!   invariantes internos abortam;
//! - cancelamento externo interrompe no próximo ponto de awaitable,
//!   fecha o browser e NÃO escreve nada;
//! - as escritas (relatório + YAML) acontecem exatamente uma vez, no
//!   fim; se falharem, o resultado em memória ainda é devolvido ao
//!   chamador para logging.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::assertions::policy::{self, ApplyPolicy};
use crate::assertions::{deterministic, snapshot as snapshot_gen, stability, validator};
use crate::browser::chromium::ChromiumBrowser;
use crate::browser::{Browser, BrowserError};
use crate::cleanup;
use crate::errors::{diag, ImproveError};
use crate::index_map::{remap_snapshot_indexes, IndexMap};
use crate::limits::{self, ExecutionLimits};
use crate::loader;
use crate::protocol::{CandidateSource, Diagnostic, Report, Step, TestFile};
use crate::report::{self, SummaryInputs};
use crate::selector_pass::{self, SelectorPassOptions};
use crate::validation;

// ============================================================================
// OPÇÕES E RESULTADO
// ============================================================================

/// O que fazer com assertions neste run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssertionMode {
    /// Nenhum candidato é gerado.
    None,
    /// Candidatos são gerados (e aplicados se applyAssertions).
    #[default]
    Candidates,
}

impl FromStr for AssertionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "candidates" => Ok(Self::Candidates),
            other => Err(format!("modo de assertions desconhecido '{other}' (use none ou candidates)")),
        }
    }
}

/// Fonte dos candidatos de assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssertionSource {
    #[default]
    Deterministic,
    SnapshotNative,
    SnapshotCli,
}

impl AssertionSource {
    fn is_snapshot(self) -> bool {
        matches!(self, Self::SnapshotNative | Self::SnapshotCli)
    }

    fn candidate_source(self) -> CandidateSource {
        match self {
            Self::Deterministic => CandidateSource::Deterministic,
            Self::SnapshotNative => CandidateSource::SnapshotNative,
            Self::SnapshotCli => CandidateSource::SnapshotCli,
        }
    }
}

impl fmt::Display for AssertionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deterministic => write!(f, "deterministic"),
            Self::SnapshotNative => write!(f, "snapshot-native"),
            Self::SnapshotCli => write!(f, "snapshot-cli"),
        }
    }
}

impl FromStr for AssertionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deterministic" => Ok(Self::Deterministic),
            "snapshot-native" => Ok(Self::SnapshotNative),
            "snapshot-cli" => Ok(Self::SnapshotCli),
            other => Err(format!(
                "fonte de assertions desconhecida '{other}' (use deterministic, snapshot-native ou snapshot-cli)"
            )),
        }
    }
}

/// Contrato de entrada do improve.
#[derive(Debug, Clone)]
pub struct ImproveOptions {
    pub test_file: PathBuf,
    pub apply_selectors: bool,
    pub apply_assertions: bool,
    pub assertions: AssertionMode,
    pub assertion_source: AssertionSource,
    pub assertion_policy: ApplyPolicy,
    pub report_path: Option<PathBuf>,
    pub run_id: String,
}

/// Saída do improve.
#[derive(Debug)]
pub struct ImproveOutcome {
    pub report_path: PathBuf,
    /// Caminho do YAML reescrito, quando houve escrita.
    pub output_path: Option<PathBuf>,
    pub report: Report,
}

/// Sinal de cancelamento cooperativo. O engine checa entre estágios e
/// aborta sem escrever nada.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self) -> Result<(), ImproveError> {
        if self.is_cancelled() {
            Err(ImproveError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// ENTRADA COM BROWSER REAL
// ============================================================================

/// Roda o improve lançando um Chromium headless.
pub async fn improve(
    options: ImproveOptions,
    cancel: CancelFlag,
) -> Result<ImproveOutcome, ImproveError> {
    let mut browser = ChromiumBrowser::launch().await.map_err(map_browser_error)?;
    let result =
        improve_with_browser(&mut browser, options, &ExecutionLimits::from_env(), cancel).await;
    if let Err(e) = browser.close().await {
        warn!(error = %e, "falha ao fechar o browser no fim do run");
    }
    result
}

fn map_browser_error(error: BrowserError) -> ImproveError {
    match error {
        BrowserError::ChromiumNotInstalled { hint } => ImproveError::ChromiumNotInstalled { hint },
        other => ImproveError::Browser { message: other.to_string() },
    }
}

// ============================================================================
// O PIPELINE
// ============================================================================

/// Pipeline completo sobre um facade já lançado. É o ponto de entrada
/// testável: os testes injetam o browser roteirizado aqui.
pub async fn improve_with_browser(
    browser: &mut dyn Browser,
    mut options: ImproveOptions,
    limits: &ExecutionLimits,
    cancel: CancelFlag,
) -> Result<ImproveOutcome, ImproveError> {
    info!(test_file = %options.test_file.display(), run_id = %options.run_id, "improve iniciando");
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    // 1. Carrega e valida o arquivo.
    let test = loader::test_from_file(&options.test_file)?;
    if let Err(errors) = validation::validate_test(&test) {
        return Err(ImproveError::Validation {
            issues: errors.iter().map(|e| e.to_string()).collect(),
        });
    }

    // 1.5. Limites de execução, antes de abrir qualquer página.
    let limit_result = limits::validate_limits(test.steps.len(), limits);
    if !limit_result.passed {
        let issues = limit_result.violations.iter().map(|v| v.message.clone()).collect();
        return Err(ImproveError::Validation { issues });
    }

    // 2. Downgrade de contradição: apply sem candidatos.
    if options.apply_assertions && options.assertions == AssertionMode::None {
        options.apply_assertions = false;
        diagnostics.push(Diagnostic::warn(
            diag::ASSERTION_APPLY_DOWNGRADED,
            "applyAssertions=true com assertions=none: rebaixado para applyAssertions=false",
        ));
    }

    cancel.checkpoint()?;

    // 3. Limpeza de assertions stale.
    let write_pass = options.apply_selectors || options.apply_assertions;
    let stale = cleanup::find_stale_assertions(&test.steps);
    let (mut runtime_steps, mut index_map, stale_removed) = if write_pass && !stale.is_empty() {
        let stale_indexes: Vec<usize> = stale.iter().map(|s| s.index).collect();
        for s in &stale {
            diagnostics.push(Diagnostic::info(
                diag::STALE_ASSERTION_REMOVED,
                format!("assertion stale no step {}: {}", s.index, s.reason),
            ));
        }
        let steps: Vec<Step> = test
            .steps
            .iter()
            .enumerate()
            .filter(|(i, _)| !stale_indexes.contains(i))
            .map(|(_, s)| s.clone())
            .collect();
        let map = IndexMap::after_remove_stale(test.steps.len(), &stale_indexes);
        (steps, map, stale.len())
    } else {
        for s in &stale {
            diagnostics.push(Diagnostic::info(
                diag::STALE_ASSERTION_DETECTED,
                format!("assertion stale no step {}: {} (run sem escrita, nada removido)", s.index, s.reason),
            ));
        }
        (test.steps.clone(), IndexMap::identity(test.steps.len()), 0)
    };

    // 4. Selector pass.
    let capture_snapshots =
        options.assertions == AssertionMode::Candidates && options.assertion_source.is_snapshot();
    let pass = selector_pass::run(
        browser,
        runtime_steps,
        &index_map,
        test.base_url.as_deref(),
        limits,
        SelectorPassOptions {
            apply_selectors: options.apply_selectors,
            capture_snapshots,
        },
    )
    .await?;
    runtime_steps = pass.steps;
    let mut findings = pass.findings;
    let mut snapshots = pass.snapshots;
    diagnostics.extend(pass.diagnostics);

    cancel.checkpoint()?;

    // 5. Classificador de steps que falharam + remapeamento.
    let mut removed_runtime: Vec<usize> = Vec::new();
    for &runtime_index in &pass.failed_runtime {
        let step = &runtime_steps[runtime_index];
        let protects = runtime_steps
            .get(runtime_index + 1)
            .map(Step::is_assertion)
            .unwrap_or(false);
        let original_index = index_map.to_original(runtime_index)?;
        match cleanup::classify_runtime_failure(step, protects) {
            cleanup::FailureDecision::Remove { reason } => {
                diagnostics.push(Diagnostic::warn(
                    diag::RUNTIME_FAILING_STEP_REMOVED,
                    format!("step {original_index} removido: {reason}"),
                ));
                removed_runtime.push(runtime_index);
            }
            cleanup::FailureDecision::Retain { reason } => {
                diagnostics.push(Diagnostic::warn(
                    diag::RUNTIME_FAILING_STEP_RETAINED,
                    format!("step {original_index} mantido apesar da falha: {reason}"),
                ));
            }
        }
    }
    if !removed_runtime.is_empty() {
        let removed_originals: Vec<usize> = removed_runtime
            .iter()
            .map(|&r| index_map.to_original(r))
            .collect::<Result<_, _>>()?;
        findings.retain(|f| !removed_originals.contains(&f.index));
        let mut sorted = removed_runtime.clone();
        sorted.sort_unstable();
        for &r in sorted.iter().rev() {
            runtime_steps.remove(r);
        }
        index_map.remove_runtime_indexes(&removed_runtime)?;
        snapshots = remap_snapshot_indexes(snapshots, &removed_runtime);
    }
    index_map.verify(test.steps.len())?;

    cancel.checkpoint()?;

    // 6. Geração de candidatos de assertion.
    let mut candidates = Vec::new();
    let mut skipped_fallbacks = Vec::new();
    if options.assertions == AssertionMode::Candidates {
        let det = deterministic::generate(&runtime_steps, &index_map)?;
        candidates.extend(det.candidates);
        skipped_fallbacks = det.skipped_fallbacks;

        if options.assertion_source.is_snapshot() {
            let source = options.assertion_source.candidate_source();
            candidates.extend(snapshot_gen::generate_delta(
                &runtime_steps,
                &snapshots,
                &index_map,
                source,
            )?);

            // Inventário: só para steps de cobertura sem candidato
            // não-fallback.
            for (runtime_index, step) in runtime_steps.iter().enumerate() {
                if !step.is_coverage() {
                    continue;
                }
                let original_index = index_map.to_original(runtime_index)?;
                let has_primary = candidates
                    .iter()
                    .any(|c| c.index == original_index && !c.is_fallback());
                if has_primary {
                    continue;
                }
                let Some(post) = snapshots
                    .iter()
                    .find(|s| s.runtime_index == runtime_index)
                    .and_then(|s| s.post.as_deref())
                else {
                    continue;
                };
                candidates.extend(snapshot_gen::generate_inventory(
                    step,
                    runtime_index,
                    post,
                    &index_map,
                    source,
                )?);
            }
        }

        candidates = snapshot_gen::dedup(candidates);
    }
    for skip in &skipped_fallbacks {
        diagnostics.push(Diagnostic::info(
            diag::DYNAMIC_LINK_FALLBACK_SKIPPED,
            format!("step {}: fallback não emitido: {}", skip.index, skip.reason),
        ));
    }

    // 7. Estabilidade + smart snapshot cap.
    stability::evaluate(&mut candidates);
    let overflow = stability::apply_snapshot_cap(&mut candidates, limits);
    if overflow > 0 {
        diagnostics.push(Diagnostic::info(
            diag::SNAPSHOT_CAP_OVERFLOW,
            format!("{overflow} candidato(s) de snapshot acima do cap viraram skipped_policy"),
        ));
    }

    // 8. Policy.
    let policy_outcome = policy::apply(&mut candidates, options.assertion_policy);
    if policy_outcome.suppressed_fallbacks > 0 {
        diagnostics.push(Diagnostic::info(
            diag::COVERAGE_FALLBACK_SUPPRESSED,
            format!(
                "{} coverage fallback(s) suprimidos por step com candidato primário",
                policy_outcome.suppressed_fallbacks
            ),
        ));
    }

    cancel.checkpoint()?;

    // 9. Validação por replay (só quando apply foi pedido).
    let final_steps = if options.apply_assertions && !candidates.is_empty() {
        let replay = validator::validate(
            browser,
            &runtime_steps,
            &mut candidates,
            options.assertion_policy,
            limits,
            test.base_url.as_deref(),
            &index_map,
        )
        .await?;
        diagnostics.extend(replay.diagnostics);
        validator::insert_applied(&runtime_steps, &replay.applied)
    } else {
        runtime_steps.clone()
    };

    cancel.checkpoint()?;

    // 10. Sumário + relatório.
    let coverage_steps: Vec<usize> = runtime_steps
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_coverage())
        .map(|(i, _)| index_map.to_original(i))
        .collect::<Result<_, _>>()?;
    let summary = report::compute_summary(&SummaryInputs {
        total_steps: test.steps.len(),
        coverage_steps: &coverage_steps,
        findings: &findings,
        candidates: &candidates,
        stale_assertions_removed: stale_removed,
        runtime_failing_steps_removed: removed_runtime.len(),
    });

    let selectors_changed = summary.selectors_changed;
    let applied_assertions = summary.applied_assertions;
    let report_path = options
        .report_path
        .clone()
        .unwrap_or_else(|| report::default_report_path(&options.test_file));

    diagnostics.push(Diagnostic::info(
        diag::REPORT_WRITTEN,
        format!("relatório em {}", report_path.display()),
    ));

    let must_rewrite = write_pass
        && (selectors_changed > 0
            || applied_assertions > 0
            || stale_removed > 0
            || !removed_runtime.is_empty());
    if must_rewrite {
        diagnostics.push(Diagnostic::info(
            diag::TEST_REWRITTEN,
            format!("teste reescrito em {}", options.test_file.display()),
        ));
    }

    let report = Report {
        test_file: options.test_file.display().to_string(),
        generated_at: Utc::now().to_rfc3339(),
        provider: options.assertion_source.to_string(),
        run_id: options.run_id.clone(),
        summary,
        step_findings: findings,
        assertion_candidates: candidates,
        diagnostics,
    };

    // 11. Escritas, exatamente uma vez, no fim. Falha de escrita não
    // descarta o resultado em memória: o chamador ainda loga tudo.
    if let Err(e) = report::write_report(&report, &report_path) {
        error!(error = %e, path = %report_path.display(), "falha ao escrever o relatório");
    }

    let output_path = if must_rewrite {
        let mutated = TestFile {
            name: test.name.clone(),
            description: test.description.clone(),
            base_url: test.base_url.clone(),
            steps: final_steps,
        };
        match report::write_test_yaml(&mutated, &options.test_file) {
            Ok(()) => Some(options.test_file.clone()),
            Err(e) => {
                error!(error = %e, "falha ao reescrever o teste");
                None
            }
        }
    } else {
        None
    };

    info!(
        changed = selectors_changed,
        applied = applied_assertions,
        removed = removed_runtime.len(),
        "improve concluído"
    );

    Ok(ImproveOutcome { report_path, output_path, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeElement, ScriptedBrowser};
    use crate::protocol::ApplyStatus;
    use pretty_assertions::assert_eq;

    const BASE: &str = "https://app.example.com/login";

    fn write_test(dir: &tempfile::TempDir, yaml: &str) -> PathBuf {
        let path = dir.path().join("login.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn options(path: &std::path::Path) -> ImproveOptions {
        ImproveOptions {
            test_file: path.to_path_buf(),
            apply_selectors: false,
            apply_assertions: false,
            assertions: AssertionMode::Candidates,
            assertion_source: AssertionSource::Deterministic,
            assertion_policy: ApplyPolicy::Reliable,
            report_path: None,
            run_id: "run-test".into(),
        }
    }

    fn login_browser() -> ScriptedBrowser {
        ScriptedBrowser::single_page(
            BASE,
            vec![
                FakeElement::new("name", "textbox", "Naam").with_id("name"),
                FakeElement::new("go", "button", "Inloggen").with_id("go"),
            ],
        )
    }

    const LOGIN_YAML: &str = r##"
name: "Login"
baseUrl: "https://app.example.com"
steps:
  - action: "navigate"
    url: "https://app.example.com/login"
  - action: "fill"
    target: { value: "#name", kind: "css", source: "codegen-jsonl" }
    text: "Alice"
  - action: "click"
    target: { value: "#go", kind: "css", source: "codegen-jsonl" }
"##;

    #[tokio::test]
    async fn deterministic_assert_value_is_inserted_when_applying() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test(&dir, LOGIN_YAML);
        let mut browser = login_browser();
        let mut opts = options(&path);
        opts.apply_assertions = true;

        let outcome = improve_with_browser(
            &mut browser,
            opts,
            &ExecutionLimits::default(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.summary.applied_assertions, 1);
        let applied: Vec<_> = outcome
            .report
            .assertion_candidates
            .iter()
            .filter(|c| c.apply_status == ApplyStatus::Applied)
            .collect();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].candidate.action(), "assertValue");

        // O YAML reescrito tem a assertion logo após o fill.
        let rewritten = loader::test_from_file(&path).unwrap();
        assert_eq!(rewritten.steps.len(), 4);
        assert_eq!(rewritten.steps[2].action(), "assertValue");
        assert!(outcome.output_path.is_some());
        assert!(outcome.report_path.exists());
    }

    #[tokio::test]
    async fn no_apply_run_leaves_yaml_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test(&dir, LOGIN_YAML);
        let before = std::fs::read_to_string(&path).unwrap();
        let mut browser = login_browser();

        let outcome = improve_with_browser(
            &mut browser,
            options(&path),
            &ExecutionLimits::default(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(outcome.output_path.is_none());
        // Candidatos existem mas ficaram not_requested/skipped.
        assert!(outcome.report.summary.applied_assertions == 0);
        assert!(outcome.report.summary.assertion_candidates_total > 0);
        assert!(outcome
            .report
            .assertion_candidates
            .iter()
            .all(|c| c.apply_status != ApplyStatus::Applied));
    }

    #[tokio::test]
    async fn apply_without_candidates_downgrades_with_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test(&dir, LOGIN_YAML);
        let mut browser = login_browser();
        let mut opts = options(&path);
        opts.apply_assertions = true;
        opts.assertions = AssertionMode::None;

        let outcome = improve_with_browser(
            &mut browser,
            opts,
            &ExecutionLimits::default(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

        assert!(outcome
            .report
            .diagnostics
            .iter()
            .any(|d| d.code == diag::ASSERTION_APPLY_DOWNGRADED));
        assert_eq!(outcome.report.summary.assertion_candidates_total, 0);
        assert!(outcome.output_path.is_none());
    }

    #[tokio::test]
    async fn failing_cookie_step_is_removed_and_indexes_survive() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r##"
name: "Cookie flow"
steps:
  - action: "navigate"
    url: "https://app.example.com/login"
  - action: "click"
    target: { value: "getByRole('button', { name: 'Akkoord' })", kind: "locatorExpression", source: "codegen-jsonl" }
  - action: "fill"
    target: { value: "#name", kind: "css", source: "codegen-jsonl" }
    text: "Alice"
"##;
        let path = write_test(&dir, yaml);
        let mut browser = login_browser().fail_on("getByRole('button', { name: 'Akkoord' })");
        let mut opts = options(&path);
        opts.apply_selectors = true;

        let outcome = improve_with_browser(
            &mut browser,
            opts,
            &ExecutionLimits::default(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.report.summary.runtime_failing_steps_removed, 1);
        assert!(outcome
            .report
            .diagnostics
            .iter()
            .any(|d| d.code == diag::RUNTIME_FAILING_STEP_REMOVED));
        // O fill sobrevivente mantém o índice ORIGINAL (2) no relatório.
        assert!(outcome.report.step_findings.iter().any(|f| f.index == 2));
        assert!(outcome.report.step_findings.iter().all(|f| f.index != 1));
        // E o YAML reescrito perdeu o step do cookie.
        let rewritten = loader::test_from_file(&path).unwrap();
        assert_eq!(rewritten.steps.len(), 2);
        assert!(!loader::test_to_yaml(&rewritten).contains("Akkoord"));
    }

    #[tokio::test]
    async fn duplicate_adjacent_assertion_is_skipped_existing() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r##"
name: "Dup"
steps:
  - action: "navigate"
    url: "https://app.example.com/login"
  - action: "click"
    target: { value: "#go", kind: "css", source: "codegen-jsonl" }
  - action: "assertVisible"
    target: { value: "#go", kind: "css", source: "manual" }
"##;
        let path = write_test(&dir, yaml);
        let mut browser = login_browser();
        let mut opts = options(&path);
        opts.apply_assertions = true;
        opts.assertion_policy = ApplyPolicy::Aggressive;

        let outcome = improve_with_browser(
            &mut browser,
            opts,
            &ExecutionLimits::default(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

        let statuses: Vec<ApplyStatus> = outcome
            .report
            .assertion_candidates
            .iter()
            .filter(|c| c.index == 1)
            .map(|c| c.apply_status)
            .collect();
        assert!(statuses.contains(&ApplyStatus::SkippedExisting), "{statuses:?}");
        // Só uma assertVisible #go no YAML final.
        let rewritten = loader::test_from_file(&path).unwrap();
        let count = rewritten
            .steps
            .iter()
            .filter(|s| s.action() == "assertVisible" && s.target().unwrap().value == "#go")
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn cancelled_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test(&dir, LOGIN_YAML);
        let mut browser = login_browser();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = improve_with_browser(
            &mut browser,
            options(&path),
            &ExecutionLimits::default(),
            cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ImproveError::Cancelled));
        assert!(!report::default_report_path(&path).exists());
    }

    #[tokio::test]
    async fn invalid_test_is_fatal_with_all_issues() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
name: ""
steps:
  - action: "click"
    target: { value: "", kind: "css", source: "manual" }
"#;
        let path = write_test(&dir, yaml);
        let mut browser = login_browser();
        let err = improve_with_browser(
            &mut browser,
            options(&path),
            &ExecutionLimits::default(),
            CancelFlag::new(),
        )
        .await
        .unwrap_err();
        let ImproveError::Validation { issues } = err else {
            panic!("esperava Validation");
        };
        assert_eq!(issues.len(), 2);
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test(&dir, LOGIN_YAML);
        let mut opts = options(&path);
        opts.apply_selectors = true;
        opts.apply_assertions = true;

        let mut browser = login_browser();
        let first = improve_with_browser(
            &mut browser,
            opts.clone(),
            &ExecutionLimits::default(),
            CancelFlag::new(),
        )
        .await
        .unwrap();
        let after_first = std::fs::read_to_string(&path).unwrap();

        let mut browser = login_browser();
        let second = improve_with_browser(
            &mut browser,
            opts,
            &ExecutionLimits::default(),
            CancelFlag::new(),
        )
        .await
        .unwrap();
        let after_second = std::fs::read_to_string(&path).unwrap();

        // Nenhuma mutação adicional no segundo run.
        assert_eq!(after_first, after_second);
        assert_eq!(second.report.summary.applied_assertions, 0);
        assert!(first.report.summary.applied_assertions > 0);
        assert!(second
            .report
            .assertion_candidates
            .iter()
            .all(|c| c.apply_status != ApplyStatus::Applied));
    }
}
