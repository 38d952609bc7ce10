//! # Módulo de Códigos de Erro Estruturados
//!
//! Define códigos de erro padronizados para melhor UX e integração
//! com sistemas externos (CI/CD, dashboards, alertas).
//!
//! ## Para todos entenderem:
//!
//! Quando algo dá errado durante um improve, este módulo fornece
//! códigos únicos que identificam exatamente o que aconteceu.
//!
//! ## Categorias de Erro
//!
//! | Faixa  | Categoria       | Descrição                             |
//! |--------|-----------------|---------------------------------------|
//! | E1xxx  | Validação       | Erro no arquivo de teste ou relatório |
//! | E2xxx  | Browser         | Erro ao dirigir o browser headless    |
//! | E3xxx  | Assertion       | Candidato de assertion não validou    |
//! | E4xxx  | Configuração    | Problema de setup/ambiente            |
//! | E5xxx  | Interno         | Bug no próprio engine                 |
//!
//! ## Política de propagação (importante!)
//!
//! O engine nunca aborta por problemas de step individual. Apenas três
//! categorias são fatais: erros de schema (E1xxx no arquivo), erros de
//! ambiente (E2002, E4xxx) e violações de invariante interno (E5xxx).
//! Todo o resto vira diagnóstico no relatório e o pipeline continua.

use std::fmt;
use thiserror::Error;

// ============================================================================
// CÓDIGO DE ERRO
// ============================================================================

/// Código de erro estruturado com categoria e número.
///
/// O código é um número de 4 dígitos onde:
/// - Primeiro dígito: categoria (1-5)
/// - Últimos 3 dígitos: erro específico (001-999)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // ========================================================================
    // E1xxx: Validação/Schema
    // ========================================================================
    // Erros que acontecem antes de abrir o browser.
    // Problema está no arquivo de teste (ou no relatório final).

    /// Teste sem nenhum step definido.
    pub const EMPTY_TEST: Self = Self(1001);

    /// Action desconhecida no step.
    /// Causa: action não é navigate/click/fill/press/hover/check/uncheck/
    /// select nem uma das quatro assertions.
    pub const UNKNOWN_ACTION: Self = Self(1002);

    /// Campo obrigatório ausente (url, target, text, key, value, checked).
    pub const MISSING_FIELD: Self = Self(1003);

    /// Chave deprecated presente (`optional`, `llm`, `improveProvider`).
    /// O erro inclui orientação de migração.
    pub const DEPRECATED_KEY: Self = Self(1004);

    /// Chave desconhecida na raiz do documento.
    /// Em steps chaves extras são toleradas; na raiz não.
    pub const UNKNOWN_ROOT_KEY: Self = Self(1005);

    /// Target com `value` vazio.
    pub const EMPTY_TARGET_VALUE: Self = Self(1006);

    /// Expressão de locator fora da gramática restrita.
    pub const INVALID_LOCATOR_EXPRESSION: Self = Self(1007);

    /// YAML com sintaxe inválida.
    pub const INVALID_TEST_FORMAT: Self = Self(1008);

    /// Relatório final não passou no schema JSON embutido.
    pub const INVALID_REPORT: Self = Self(1009);

    // ========================================================================
    // E2xxx: Browser/Runtime
    // ========================================================================
    // Erros ao dirigir o Chromium headless via CDP.

    /// Falha ao lançar o browser.
    pub const BROWSER_LAUNCH_FAILED: Self = Self(2001);

    /// Chromium não está instalado na máquina.
    /// Fatal, com dica de remediação.
    pub const CHROMIUM_NOT_INSTALLED: Self = Self(2002);

    /// Navegação falhou (DNS, timeout, aborto).
    pub const NAVIGATION_FAILED: Self = Self(2003);

    /// URL relativa sem baseUrl e sem página atual absoluta.
    pub const RELATIVE_NAVIGATION_UNRESOLVABLE: Self = Self(2004);

    /// Step falhou durante a execução playback.
    /// Não é fatal: vira runtime-failing step e o classificador decide.
    pub const STEP_EXECUTION_FAILED: Self = Self(2005);

    /// Espera por network-idle falhou com erro duro (timeout NÃO é erro).
    pub const NETWORK_IDLE_FAILED: Self = Self(2006);

    /// Expressão de locator rejeitada pelo interpretador restrito.
    /// Causa: acesso computado, chamada arbitrária ou function literal.
    pub const UNSAFE_LOCATOR_EXPRESSION: Self = Self(2007);

    /// Captura de snapshot da árvore de acessibilidade falhou.
    pub const SNAPSHOT_FAILED: Self = Self(2008);

    // ========================================================================
    // E3xxx: Validação de Assertions
    // ========================================================================
    // Candidato executado inline durante o replay não passou.
    // Nunca fatal: candidato vira skipped_runtime_failure.

    /// assertVisible falhou no replay.
    pub const ASSERTION_VISIBLE_FAILED: Self = Self(3001);

    /// assertText falhou no replay.
    pub const ASSERTION_TEXT_FAILED: Self = Self(3002);

    /// assertValue falhou no replay.
    pub const ASSERTION_VALUE_FAILED: Self = Self(3003);

    /// assertChecked falhou no replay.
    pub const ASSERTION_CHECKED_FAILED: Self = Self(3004);

    /// Target da assertion não resolveu para nenhum elemento.
    pub const ASSERTION_TARGET_UNRESOLVED: Self = Self(3005);

    // ========================================================================
    // E4xxx: Configuração/Ambiente
    // ========================================================================

    /// Arquivo de teste não encontrado.
    pub const TEST_FILE_NOT_FOUND: Self = Self(4001);

    /// Escrita do relatório ou do YAML reescrito falhou.
    pub const OUTPUT_WRITE_FAILED: Self = Self(4002);

    /// Teste excede os limites de execução configurados.
    pub const LIMITS_EXCEEDED: Self = Self(4003);

    /// Erro de permissão ao acessar arquivo.
    pub const FILE_PERMISSION_ERROR: Self = Self(4004);

    // ========================================================================
    // E5xxx: Erros Internos
    // ========================================================================
    // Bugs no próprio engine. Se você ver esses, reporte!

    /// Erro interno inesperado.
    pub const INTERNAL_ERROR: Self = Self(5001);

    /// Bijeção runtime↔original quebrou após uma mutação.
    pub const INDEX_MAP_VIOLATION: Self = Self(5002);

    /// Erro de serialização interna.
    pub const SERIALIZATION_ERROR: Self = Self(5003);

    // ========================================================================
    // MÉTODOS
    // ========================================================================

    /// Retorna o código numérico.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Retorna o código formatado com prefixo "E".
    ///
    /// Exemplo: ErrorCode::EMPTY_TEST.formatted() == "E1001"
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    /// Retorna a categoria do erro baseado no primeiro dígito.
    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Validation,
            2 => ErrorCategory::Browser,
            3 => ErrorCategory::Assertion,
            4 => ErrorCategory::Configuration,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Retorna uma descrição curta do erro.
    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "Teste vazio",
            1002 => "Action desconhecida",
            1003 => "Campo obrigatório ausente",
            1004 => "Chave deprecated",
            1005 => "Chave desconhecida na raiz",
            1006 => "Target com value vazio",
            1007 => "Expressão de locator inválida",
            1008 => "Formato de teste inválido",
            1009 => "Relatório inválido",
            2001 => "Falha ao lançar o browser",
            2002 => "Chromium não instalado",
            2003 => "Navegação falhou",
            2004 => "URL relativa não resolvível",
            2005 => "Step falhou em runtime",
            2006 => "Espera por network-idle falhou",
            2007 => "Expressão de locator insegura",
            2008 => "Snapshot falhou",
            3001 => "assertVisible falhou",
            3002 => "assertText falhou",
            3003 => "assertValue falhou",
            3004 => "assertChecked falhou",
            3005 => "Target da assertion não resolveu",
            4001 => "Arquivo de teste não encontrado",
            4002 => "Escrita de saída falhou",
            4003 => "Limites de execução excedidos",
            4004 => "Erro de permissão",
            5001 => "Erro interno",
            5002 => "Bijeção de índices violada",
            5003 => "Erro de serialização",
            _ => "Erro desconhecido",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// CATEGORIA DE ERRO
// ============================================================================

/// Categoria de erro baseada no primeiro dígito do código.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Erros de validação/schema (E1xxx).
    Validation,
    /// Erros do browser headless (E2xxx).
    Browser,
    /// Erros de validação de assertion (E3xxx).
    Assertion,
    /// Erros de configuração/ambiente (E4xxx).
    Configuration,
    /// Erros internos (E5xxx).
    Internal,
    /// Categoria desconhecida.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "Validação"),
            Self::Browser => write!(f, "Browser"),
            Self::Assertion => write!(f, "Assertion"),
            Self::Configuration => write!(f, "Configuração"),
            Self::Internal => write!(f, "Interno"),
            Self::Unknown => write!(f, "Desconhecido"),
        }
    }
}

// ============================================================================
// ERRO DE DOMÍNIO DO ENGINE
// ============================================================================

/// Erro de domínio propagado pelo engine.
///
/// Apenas as variantes fatais chegam até aqui: problemas por-step viram
/// diagnósticos no relatório e o pipeline continua (ver política no topo
/// do módulo).
#[derive(Debug, Error)]
pub enum ImproveError {
    /// Erro acionável pelo usuário (arquivo errado, flag inválida).
    #[error("{message}")]
    User { message: String },

    /// O arquivo de teste não passou na validação de schema.
    /// Carrega TODOS os problemas encontrados, não só o primeiro.
    #[error("arquivo de teste inválido ({} problema(s))", issues.len())]
    Validation { issues: Vec<String> },

    /// Chromium não está instalado.
    #[error("Chromium não instalado: {hint}")]
    ChromiumNotInstalled { hint: String },

    /// Falha ambiental do browser (launch, protocolo CDP).
    #[error("browser: {message}")]
    Browser { message: String },

    /// O relatório final não passou no schema embutido.
    #[error("relatório inválido ({} problema(s))", issues.len())]
    ReportSchema { issues: Vec<String> },

    /// Execução cancelada por sinal externo.
    /// Nenhuma escrita parcial acontece.
    #[error("execução cancelada")]
    Cancelled,

    /// Invariante interno violado. O nome do invariante vai na mensagem.
    #[error("invariante violado [{name}]: {message}")]
    Invariant { name: String, message: String },

    /// Erro de I/O em arquivo.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl ImproveError {
    /// Cria um erro de invariante nomeado (sempre fatal).
    pub fn invariant(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invariant {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Código estruturado correspondente, para logs e exit paths.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::User { .. } => ErrorCode::TEST_FILE_NOT_FOUND,
            Self::Validation { .. } => ErrorCode::INVALID_TEST_FORMAT,
            Self::ChromiumNotInstalled { .. } => ErrorCode::CHROMIUM_NOT_INSTALLED,
            Self::Browser { .. } => ErrorCode::BROWSER_LAUNCH_FAILED,
            Self::ReportSchema { .. } => ErrorCode::INVALID_REPORT,
            Self::Cancelled => ErrorCode::INTERNAL_ERROR,
            Self::Invariant { .. } => ErrorCode::INDEX_MAP_VIOLATION,
            Self::Io(_) => ErrorCode::OUTPUT_WRITE_FAILED,
        }
    }
}

// ============================================================================
// CATÁLOGO DE DIAGNÓSTICOS
// ============================================================================

/// Códigos estáveis de diagnóstico emitidos no relatório.
///
/// Toda decisão que muta a saída (adoção de seletor, apply/skip de
/// assertion, remoção de step) emite um diagnóstico com um destes códigos.
/// Testes externos dependem deles; não renomear sem migração.
pub mod diag {
    /// Seletor recomendado foi adotado no lugar do original.
    pub const SELECTOR_ADOPTED: &str = "selector_adopted";
    /// Seletor recomendado existia mas não venceu a margem de adoção.
    pub const SELECTOR_KEPT: &str = "selector_kept";
    /// Assertion pré-existente detectada como stale e removida.
    pub const STALE_ASSERTION_REMOVED: &str = "stale_assertion_removed";
    /// Assertion stale detectada em run sem escrita (nada removido).
    pub const STALE_ASSERTION_DETECTED: &str = "stale_assertion_detected";
    /// Step que falhou em runtime foi removido (heurística cookie-consent).
    pub const RUNTIME_FAILING_STEP_REMOVED: &str = "runtime_failing_step_removed";
    /// Step que falhou em runtime foi mantido (salvaguarda de conteúdo).
    pub const RUNTIME_FAILING_STEP_RETAINED: &str = "runtime_failing_step_retained";
    /// Espera por network-idle estourou o timeout (warning, segue o jogo).
    pub const NETWORK_IDLE_TIMED_OUT: &str = "runtime_network_idle_wait_timed_out";
    /// Espera por network-idle falhou com erro duro.
    pub const NETWORK_IDLE_FAILED: &str = "runtime_network_idle_wait_failed";
    /// Candidato de assertion aplicado com sucesso no replay.
    pub const ASSERTION_APPLIED: &str = "assertion_applied";
    /// Candidato falhou no replay inline.
    pub const ASSERTION_RUNTIME_FAILURE: &str = "assertion_skipped_runtime_failure";
    /// applyAssertions=true com assertions=none: rebaixado para false.
    pub const ASSERTION_APPLY_DOWNGRADED: &str = "assertion_apply_downgraded";
    /// Coverage fallback suprimido por existir candidato não-fallback.
    pub const COVERAGE_FALLBACK_SUPPRESSED: &str = "coverage_fallback_suppressed";
    /// Fallback determinístico pulado: click em link dinâmico de navegação.
    pub const DYNAMIC_LINK_FALLBACK_SKIPPED: &str = "dynamic_link_fallback_skipped";
    /// Expressão com shape não suportado pelo reparador (info).
    pub const REPAIR_UNSUPPORTED_SHAPE: &str = "locator_repair_unsupported_shape";
    /// Overflow do smart snapshot cap virou skipped_policy forçado.
    pub const SNAPSHOT_CAP_OVERFLOW: &str = "snapshot_candidate_cap_overflow";
    /// Relatório escrito em disco.
    pub const REPORT_WRITTEN: &str = "report_written";
    /// YAML do teste reescrito em disco.
    pub const TEST_REWRITTEN: &str = "test_rewritten";
    /// Step de navigate falhou; pipeline abortou o pass de seletores.
    pub const NAVIGATION_STEP_FAILED: &str = "navigation_step_failed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_formatting() {
        assert_eq!(ErrorCode::EMPTY_TEST.formatted(), "E1001");
        assert_eq!(ErrorCode::CHROMIUM_NOT_INSTALLED.formatted(), "E2002");
        assert_eq!(ErrorCode::ASSERTION_VALUE_FAILED.formatted(), "E3003");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::EMPTY_TEST.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::NAVIGATION_FAILED.category(), ErrorCategory::Browser);
        assert_eq!(ErrorCode::ASSERTION_TEXT_FAILED.category(), ErrorCategory::Assertion);
        assert_eq!(ErrorCode::LIMITS_EXCEEDED.category(), ErrorCategory::Configuration);
        assert_eq!(ErrorCode::INDEX_MAP_VIOLATION.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_invariant_error_names_the_invariant() {
        let err = ImproveError::invariant("index_bijection", "runtime 3 sem original");
        let msg = err.to_string();
        assert!(msg.contains("index_bijection"));
        assert!(msg.contains("runtime 3"));
    }

    #[test]
    fn test_validation_error_counts_issues() {
        let err = ImproveError::Validation {
            issues: vec!["steps[0]: url ausente".into(), "steps[2]: target vazio".into()],
        };
        assert!(err.to_string().contains("2 problema(s)"));
        assert_eq!(err.code(), ErrorCode::INVALID_TEST_FORMAT);
    }
}
