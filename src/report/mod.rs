//! # Montador de Relatório (C16)
//!
//! Agrega findings, candidatos, métricas de cobertura e diagnósticos
//! no relatório final, valida contra o schema embutido e escreve em
//! disco. Escritas são atômicas no nível de arquivo (write + rename):
//! um crash no meio nunca deixa um relatório pela metade.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::ImproveError;
use crate::loader;
use crate::protocol::{
    ApplyStatus, AssertionCandidate, Report, StepFinding, Summary, TestFile,
};
use crate::validation;

// ============================================================================
// SUMÁRIO
// ============================================================================

/// Entradas para o cômputo do sumário.
pub struct SummaryInputs<'a> {
    /// Steps no arquivo original.
    pub total_steps: usize,
    /// Índices ORIGINAIS dos steps de cobertura sobreviventes.
    pub coverage_steps: &'a [usize],
    pub findings: &'a [StepFinding],
    pub candidates: &'a [AssertionCandidate],
    pub stale_assertions_removed: usize,
    pub runtime_failing_steps_removed: usize,
}

/// Computa os contadores agregados.
///
/// Garante por construção a monotonicidade de cobertura:
/// `with_applied ≤ with_candidates ≤ total`.
pub fn compute_summary(inputs: &SummaryInputs<'_>) -> Summary {
    let count_status = |status: ApplyStatus| {
        inputs
            .candidates
            .iter()
            .filter(|c| c.apply_status == status)
            .count()
    };

    let with_candidates = inputs
        .coverage_steps
        .iter()
        .filter(|&&idx| inputs.candidates.iter().any(|c| c.index == idx))
        .count();
    let with_applied = inputs
        .coverage_steps
        .iter()
        .filter(|&&idx| {
            inputs
                .candidates
                .iter()
                .any(|c| c.index == idx && c.apply_status == ApplyStatus::Applied)
        })
        .count();

    Summary {
        total_steps: inputs.total_steps,
        interacting_steps: inputs.findings.len(),
        selectors_changed: inputs.findings.iter().filter(|f| f.changed).count(),
        selectors_unchanged: inputs.findings.iter().filter(|f| !f.changed).count(),
        stale_assertions_removed: inputs.stale_assertions_removed,
        runtime_failing_steps_removed: inputs.runtime_failing_steps_removed,
        assertion_candidates_total: inputs.candidates.len(),
        applied_assertions: count_status(ApplyStatus::Applied),
        skipped_low_confidence: count_status(ApplyStatus::SkippedLowConfidence),
        skipped_runtime_failure: count_status(ApplyStatus::SkippedRuntimeFailure),
        skipped_policy: count_status(ApplyStatus::SkippedPolicy),
        skipped_existing: count_status(ApplyStatus::SkippedExisting),
        not_requested: count_status(ApplyStatus::NotRequested),
        assertion_coverage_steps_total: inputs.coverage_steps.len(),
        assertion_coverage_steps_with_candidates: with_candidates,
        assertion_coverage_steps_with_applied: with_applied,
    }
}

// ============================================================================
// CAMINHOS E ESCRITA
// ============================================================================

/// Caminho default do relatório: ao lado do teste, extensão trocada
/// por `.improve-report.json`.
pub fn default_report_path(test_file: &Path) -> PathBuf {
    let stem = test_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "test".to_string());
    test_file.with_file_name(format!("{stem}.improve-report.json"))
}

/// Escrita atômica: escreve num arquivo temporário ao lado e renomeia.
fn write_atomic(path: &Path, content: &str) -> Result<(), ImproveError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Valida o relatório contra o schema e escreve em disco.
pub fn write_report(report: &Report, path: &Path) -> Result<(), ImproveError> {
    if let Err(issues) = validation::validate_report(report) {
        return Err(ImproveError::ReportSchema { issues });
    }
    let json = serde_json::to_string_pretty(report).map_err(|e| ImproveError::Invariant {
        name: "report_serialization".into(),
        message: e.to_string(),
    })?;
    write_atomic(path, &json)?;
    info!(path = %path.display(), "relatório escrito");
    Ok(())
}

/// Escreve o YAML mutado por cima do arquivo de teste, atomicamente.
pub fn write_test_yaml(test: &TestFile, path: &Path) -> Result<(), ImproveError> {
    let yaml = loader::test_to_yaml(test);
    write_atomic(path, &yaml)?;
    info!(path = %path.display(), "teste reescrito");
    Ok(())
}
