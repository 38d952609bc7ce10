//! # Módulo de Limites de Execução
//!
//! Define guard rails para proteger o improve contra testes malformados
//! ou patológicos (milhares de steps, páginas que nunca aquietam).
//!
//! ## Por que isso é importante?
//!
//! 1. **Recursos controlados**: cada candidato é uma sondagem real no
//!    browser; um teste gigante viraria horas de execução
//! 2. **Previsibilidade**: sabe-se quanto tempo/recursos serão usados
//! 3. **Debug facilitado**: testes problemáticos falham cedo, antes de
//!    abrir o browser
//!
//! ## Limites configuráveis:
//!
//! | Limite                          | Padrão | Descrição                          |
//! |---------------------------------|--------|------------------------------------|
//! | max_steps                       | 200    | Máximo de steps por teste          |
//! | max_candidates_per_step         | 12     | Candidatos sondados por step       |
//! | max_snapshot_candidates_per_step| 2      | Smart cap de candidatos de snapshot|
//! | step_timeout_ms                 | 10000  | Timeout de cada chamada de browser |
//! | network_idle_timeout_ms         | 2500   | Timeout da espera por network-idle |

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// LIMITES PADRÃO (CONSTANTES)
// ============================================================================

/// Número máximo de steps permitidos em um teste.
pub const DEFAULT_MAX_STEPS: usize = 200;

/// Máximo de candidatos (atual + derivados + reparos) sondados por step.
pub const DEFAULT_MAX_CANDIDATES_PER_STEP: usize = 12;

/// Smart snapshot cap: candidatos de snapshot retidos por step fonte.
/// O excedente vira `skipped_policy` forçado.
pub const DEFAULT_MAX_SNAPSHOT_CANDIDATES_PER_STEP: usize = 2;

/// Timeout padrão de toda chamada ao browser, em milissegundos.
pub const DEFAULT_RUNTIME_TIMEOUT_MS: u64 = 10_000;

/// Timeout da espera por network-idle (mais curto que o de step).
pub const DEFAULT_NETWORK_IDLE_TIMEOUT_MS: u64 = 2_500;

// ============================================================================
// ESTRUTURA DE LIMITES
// ============================================================================

/// Configuração de limites de um run de improve.
///
/// Pode ser carregada de variáveis de ambiente ou construída à mão.
/// Todos os campos têm valores padrão seguros.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Número máximo de steps no teste.
    /// Se excedido, o teste é rejeitado antes do browser abrir.
    pub max_steps: usize,

    /// Máximo de candidatos sondados por step interagente.
    pub max_candidates_per_step: usize,

    /// Smart cap de candidatos de snapshot por step fonte.
    pub max_snapshot_candidates_per_step: usize,

    /// Timeout de cada chamada ao browser.
    pub step_timeout: Duration,

    /// Timeout da espera por network-idle.
    pub network_idle_timeout: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_candidates_per_step: DEFAULT_MAX_CANDIDATES_PER_STEP,
            max_snapshot_candidates_per_step: DEFAULT_MAX_SNAPSHOT_CANDIDATES_PER_STEP,
            step_timeout: Duration::from_millis(DEFAULT_RUNTIME_TIMEOUT_MS),
            network_idle_timeout: Duration::from_millis(DEFAULT_NETWORK_IDLE_TIMEOUT_MS),
        }
    }
}

impl ExecutionLimits {
    /// Cria limites a partir de variáveis de ambiente.
    ///
    /// Variáveis suportadas:
    /// - `IMPROVER_MAX_STEPS`
    /// - `IMPROVER_MAX_CANDIDATES_PER_STEP`
    /// - `IMPROVER_MAX_SNAPSHOT_CANDIDATES_PER_STEP`
    /// - `IMPROVER_STEP_TIMEOUT_MS`
    /// - `IMPROVER_NETWORK_IDLE_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Ok(val) = std::env::var("IMPROVER_MAX_STEPS") {
            if let Ok(n) = val.parse() {
                limits.max_steps = n;
            }
        }

        if let Ok(val) = std::env::var("IMPROVER_MAX_CANDIDATES_PER_STEP") {
            if let Ok(n) = val.parse() {
                limits.max_candidates_per_step = n;
            }
        }

        if let Ok(val) = std::env::var("IMPROVER_MAX_SNAPSHOT_CANDIDATES_PER_STEP") {
            if let Ok(n) = val.parse() {
                limits.max_snapshot_candidates_per_step = n;
            }
        }

        if let Ok(val) = std::env::var("IMPROVER_STEP_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                limits.step_timeout = Duration::from_millis(n);
            }
        }

        if let Ok(val) = std::env::var("IMPROVER_NETWORK_IDLE_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                limits.network_idle_timeout = Duration::from_millis(n);
            }
        }

        limits
    }

    /// Limites restritivos para testes.
    pub fn strict() -> Self {
        Self {
            max_steps: 10,
            max_candidates_per_step: 4,
            max_snapshot_candidates_per_step: 1,
            step_timeout: Duration::from_secs(2),
            network_idle_timeout: Duration::from_millis(250),
        }
    }
}

// ============================================================================
// VALIDAÇÃO DE LIMITES
// ============================================================================

/// Resultado da validação de limites.
#[derive(Debug)]
pub struct LimitValidationResult {
    pub passed: bool,
    pub violations: Vec<LimitViolation>,
}

/// Violação de limite detectada.
#[derive(Debug, Clone)]
pub struct LimitViolation {
    /// Nome do limite violado.
    pub limit_name: String,
    /// Valor máximo permitido.
    pub limit_value: String,
    /// Valor encontrado no teste.
    pub actual_value: String,
    /// Mensagem descritiva.
    pub message: String,
}

/// Valida se um teste está dentro dos limites.
pub fn validate_limits(step_count: usize, limits: &ExecutionLimits) -> LimitValidationResult {
    let mut violations = Vec::new();

    if step_count > limits.max_steps {
        violations.push(LimitViolation {
            limit_name: "max_steps".to_string(),
            limit_value: limits.max_steps.to_string(),
            actual_value: step_count.to_string(),
            message: format!(
                "teste tem {} steps, máximo permitido é {}",
                step_count, limits.max_steps
            ),
        });
    }

    LimitValidationResult {
        passed: violations.is_empty(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.max_steps, 200);
        assert_eq!(limits.max_candidates_per_step, 12);
        assert_eq!(limits.max_snapshot_candidates_per_step, 2);
        assert_eq!(limits.step_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn test_validate_limits_ok() {
        let limits = ExecutionLimits::default();
        let result = validate_limits(50, &limits);
        assert!(result.passed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_validate_limits_steps_exceeded() {
        let limits = ExecutionLimits::default();
        let result = validate_limits(500, &limits);
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].limit_name, "max_steps");
    }

    #[test]
    fn test_strict_limits_are_tighter() {
        let strict = ExecutionLimits::strict();
        let default = ExecutionLimits::default();
        assert!(strict.max_steps < default.max_steps);
        assert!(strict.step_timeout < default.step_timeout);
    }
}
