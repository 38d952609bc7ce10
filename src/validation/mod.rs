//! # Módulo de Validação de Testes e Relatórios
//!
//! Este módulo valida o arquivo de teste antes da execução e o
//! relatório final antes da escrita.
//!
//! ## Para leigos:
//!
//! Antes de gastar minutos dirigindo um browser de verdade, conferimos
//! se o arquivo de teste faz sentido. E antes de escrever o relatório,
//! conferimos que ele segue o schema que as ferramentas downstream
//! esperam.
//!
//! ## Filosofia: coletar TUDO
//!
//! A validação não para no primeiro problema. Ela percorre o arquivo
//! inteiro e devolve a lista completa, com o caminho de cada ofensa
//! (`steps[3].target.value`), para o usuário corrigir tudo de uma vez.

use once_cell::sync::Lazy;
use serde_json::json;
use thiserror::Error;

use crate::locator;
use crate::protocol::{Report, Step, TargetKind, TestFile};

// ============================================================================
// ERROS DE VALIDAÇÃO
// ============================================================================

/// Problemas encontrados em um arquivo de teste.
///
/// Cada variante carrega o caminho/índice da ofensa para a mensagem
/// apontar o lugar exato no YAML.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Teste sem nenhum step.
    #[error("steps: teste vazio, nenhum step definido")]
    EmptyTest,

    /// Nome do teste vazio.
    #[error("name: não pode ser vazio")]
    EmptyName,

    /// baseUrl presente mas não absoluta.
    #[error("baseUrl: '{url}' não é uma URL absoluta")]
    BaseUrlNotAbsolute { url: String },

    /// URL de navigate vazia.
    #[error("steps[{index}].url: não pode ser vazia")]
    EmptyUrl { index: usize },

    /// Target com value vazio (invariante do modelo).
    #[error("steps[{index}].target.value: não pode ser vazio")]
    EmptyTargetValue { index: usize },

    /// Tecla vazia em press.
    #[error("steps[{index}].key: não pode ser vazia")]
    EmptyKey { index: usize },

    /// locatorExpression fora da gramática restrita.
    #[error("steps[{index}].target.value: {detail}")]
    InvalidLocatorExpression { index: usize, detail: String },

    /// Confiança gravada fora de [0,1].
    #[error("steps[{index}].target.confidence: {value} fora de [0,1]")]
    ConfidenceOutOfRange { index: usize, value: f64 },
}

/// Resultado da validação: ou tudo certo, ou a lista completa.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// VALIDAÇÃO DO ARQUIVO DE TESTE
// ============================================================================

/// Valida um teste carregado. Coleta todos os problemas.
pub fn validate_test(test: &TestFile) -> ValidationResult {
    let mut errors = Vec::new();

    if test.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    if let Some(base_url) = &test.base_url {
        if url::Url::parse(base_url).is_err() {
            errors.push(ValidationError::BaseUrlNotAbsolute { url: base_url.clone() });
        }
    }

    if test.steps.is_empty() {
        errors.push(ValidationError::EmptyTest);
        return Err(errors);
    }

    for (index, step) in test.steps.iter().enumerate() {
        validate_step(index, step, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_step(index: usize, step: &Step, errors: &mut Vec<ValidationError>) {
    if let Step::Navigate { url, .. } = step {
        if url.trim().is_empty() {
            errors.push(ValidationError::EmptyUrl { index });
        }
        return;
    }

    if let Step::Press { key, .. } = step {
        if key.trim().is_empty() {
            errors.push(ValidationError::EmptyKey { index });
        }
    }

    let Some(target) = step.target() else { return };

    if target.value.trim().is_empty() {
        errors.push(ValidationError::EmptyTargetValue { index });
        return;
    }

    // Invariante: expressões de locator precisam passar pelo parser
    // restrito JÁ NA VALIDAÇÃO, não só na hora de resolver. Um arquivo
    // com `process.exit(1)` nunca chega perto do browser.
    if target.kind == TargetKind::LocatorExpression {
        if let Err(err) = locator::compile(&target.value) {
            errors.push(ValidationError::InvalidLocatorExpression {
                index,
                detail: err.to_string(),
            });
        }
    }

    if let Some(confidence) = target.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            errors.push(ValidationError::ConfidenceOutOfRange { index, value: confidence });
        }
    }
}

// ============================================================================
// SCHEMA DO RELATÓRIO
// ============================================================================

/// Schema draft-07 embutido do relatório de improve.
///
/// Mantido em sincronia com `protocol::Report`. Mudança aqui é mudança
/// de contrato com as ferramentas que consomem o relatório.
fn report_schema() -> serde_json::Value {
    let target = json!({
        "type": "object",
        "required": ["value", "kind", "source"],
        "properties": {
            "value": { "type": "string", "minLength": 1 },
            "kind": { "enum": [
                "css", "xpath", "text-selector", "role-engine",
                "locatorExpression", "internal", "playwrightSelector"
            ] },
            "source": { "enum": ["manual", "codegen-jsonl", "codegen-fallback", "derived"] },
            "framePath": { "type": "array", "items": { "type": "string" } },
            "raw": { "type": "string" },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "warning": { "type": "string" }
        }
    });

    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": [
            "testFile", "generatedAt", "provider", "runId", "summary",
            "stepFindings", "assertionCandidates", "diagnostics"
        ],
        "additionalProperties": false,
        "properties": {
            "testFile": { "type": "string" },
            "generatedAt": { "type": "string" },
            "provider": { "type": "string" },
            "runId": { "type": "string" },
            "summary": {
                "type": "object",
                "required": [
                    "totalSteps", "interactingSteps", "selectorsChanged",
                    "selectorsUnchanged", "staleAssertionsRemoved",
                    "runtimeFailingStepsRemoved", "assertionCandidatesTotal",
                    "appliedAssertions", "skippedLowConfidence",
                    "skippedRuntimeFailure", "skippedPolicy", "skippedExisting",
                    "notRequested", "assertionCoverageStepsTotal",
                    "assertionCoverageStepsWithCandidates",
                    "assertionCoverageStepsWithApplied"
                ],
                "additionalProperties": false,
                "properties": {
                    "totalSteps": { "type": "integer", "minimum": 0 },
                    "interactingSteps": { "type": "integer", "minimum": 0 },
                    "selectorsChanged": { "type": "integer", "minimum": 0 },
                    "selectorsUnchanged": { "type": "integer", "minimum": 0 },
                    "staleAssertionsRemoved": { "type": "integer", "minimum": 0 },
                    "runtimeFailingStepsRemoved": { "type": "integer", "minimum": 0 },
                    "assertionCandidatesTotal": { "type": "integer", "minimum": 0 },
                    "appliedAssertions": { "type": "integer", "minimum": 0 },
                    "skippedLowConfidence": { "type": "integer", "minimum": 0 },
                    "skippedRuntimeFailure": { "type": "integer", "minimum": 0 },
                    "skippedPolicy": { "type": "integer", "minimum": 0 },
                    "skippedExisting": { "type": "integer", "minimum": 0 },
                    "notRequested": { "type": "integer", "minimum": 0 },
                    "assertionCoverageStepsTotal": { "type": "integer", "minimum": 0 },
                    "assertionCoverageStepsWithCandidates": { "type": "integer", "minimum": 0 },
                    "assertionCoverageStepsWithApplied": { "type": "integer", "minimum": 0 }
                }
            },
            "stepFindings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": [
                        "index", "action", "oldTarget", "recommendedTarget",
                        "oldScore", "recommendedScore", "confidenceDelta",
                        "reasonCodes", "changed"
                    ],
                    "properties": {
                        "index": { "type": "integer", "minimum": 0 },
                        "action": { "type": "string" },
                        "oldTarget": target,
                        "recommendedTarget": target,
                        "oldScore": { "type": "number" },
                        "recommendedScore": { "type": "number" },
                        "confidenceDelta": { "type": "number" },
                        "reasonCodes": { "type": "array", "items": { "type": "string" } },
                        "changed": { "type": "boolean" }
                    }
                }
            },
            "assertionCandidates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": [
                        "index", "afterAction", "candidate", "confidence",
                        "rationale", "stabilityScore", "volatilityFlags",
                        "candidateSource", "applyStatus"
                    ],
                    "properties": {
                        "index": { "type": "integer", "minimum": 0 },
                        "afterAction": { "type": "string" },
                        "candidate": { "type": "object" },
                        "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                        "rationale": { "type": "string" },
                        "coverageFallback": { "type": "boolean" },
                        "stabilityScore": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                        "volatilityFlags": {
                            "type": "array",
                            "items": { "enum": [
                                "contains_numeric_fragment",
                                "contains_date_or_time_fragment",
                                "contains_long_text",
                                "contains_dynamic_keyword",
                                "exact_true"
                            ] }
                        },
                        "candidateSource": { "enum": ["deterministic", "snapshot_native", "snapshot_cli"] },
                        "applyStatus": { "enum": [
                            "applied", "skipped_low_confidence",
                            "skipped_runtime_failure", "skipped_policy",
                            "skipped_existing", "not_requested"
                        ] },
                        "applyMessage": { "type": "string" }
                    }
                }
            },
            "diagnostics": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["code", "level", "message"],
                    "properties": {
                        "code": { "type": "string" },
                        "level": { "enum": ["info", "warn", "error"] },
                        "message": { "type": "string" }
                    }
                }
            }
        }
    })
}

static COMPILED_REPORT_SCHEMA: Lazy<jsonschema::JSONSchema> = Lazy::new(|| {
    jsonschema::JSONSchema::compile(&report_schema()).expect("embedded report schema compiles")
});

/// Valida o relatório final contra o schema embutido.
///
/// Retorna a lista de violações com o caminho da instância, ou `Ok`.
pub fn validate_report(report: &Report) -> Result<(), Vec<String>> {
    let instance = match serde_json::to_value(report) {
        Ok(value) => value,
        Err(e) => return Err(vec![format!("relatório não serializa: {e}")]),
    };
    let result = COMPILED_REPORT_SCHEMA.validate(&instance);
    match result {
        Ok(()) => Ok(()),
        Err(errors) => Err(errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect()),
    }
}
