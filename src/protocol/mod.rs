//! # Módulo de Protocolo - Estruturas de Dados do Teste
//!
//! Este módulo define todas as **estruturas de dados** que representam
//! um teste end-to-end gravado e o relatório produzido pelo improve.
//!
//! ## O que é um teste gravado?
//!
//! É um arquivo YAML com uma sequência declarativa de steps de browser:
//!
//! ```yaml
//! name: "Login Flow"
//! baseUrl: "https://app.example.com"
//! steps:
//!   - action: "navigate"
//!     url: "/login"
//!   - action: "fill"
//!     target: { value: "#name", kind: "css", source: "codegen-jsonl" }
//!     text: "Alice"
//!   - action: "assertValue"
//!     target: { value: "#name", kind: "css", source: "codegen-jsonl" }
//!     value: "Alice"
//! ```
//!
//! ## Hierarquia de Tipos:
//!
//! ```text
//! TestFile
//! └── Step[] (tagged por `action`)
//!     └── Target (referência estruturada a um elemento DOM)
//!
//! Report
//! ├── Summary (contadores agregados)
//! ├── StepFinding[] (análise de seletor por step)
//! ├── AssertionCandidate[] (assertions sintetizadas)
//! └── Diagnostic[] (decisões com código estável)
//! ```
//!
//! Referências cíclicas entre finding/step/candidate são evitadas
//! guardando apenas índices; o index mapper é a fonte de verdade.

use serde::{Deserialize, Serialize};

// ============================================================================
// TARGET: REFERÊNCIA ESTRUTURADA A UM ELEMENTO
// ============================================================================

/// Tipo do payload de um [`Target`].
///
/// A ordem aqui também é a ordem de prioridade de qualidade usada no
/// scorer (role-engine melhor, xpath pior).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    /// Locator do engine de roles de acessibilidade.
    #[serde(rename = "role-engine")]
    RoleEngine,
    /// Expressão restrita de chamadas de fábrica de locator.
    #[serde(rename = "locatorExpression")]
    LocatorExpression,
    /// Seletor no dialeto do player (text=, role=).
    #[serde(rename = "playwrightSelector")]
    PlaywrightSelector,
    /// Seletor de texto puro.
    #[serde(rename = "text-selector")]
    TextSelector,
    /// Seletor CSS.
    #[serde(rename = "css")]
    Css,
    /// Expressão XPath.
    #[serde(rename = "xpath")]
    Xpath,
    /// Referência interna do gravador.
    #[serde(rename = "internal")]
    Internal,
}

/// Proveniência de um [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSource {
    /// Escrito à mão pelo usuário.
    #[serde(rename = "manual")]
    Manual,
    /// Emitido pelo codegen principal (JSONL).
    #[serde(rename = "codegen-jsonl")]
    CodegenJsonl,
    /// Emitido pelo fallback do codegen.
    #[serde(rename = "codegen-fallback")]
    CodegenFallback,
    /// Derivado pelo próprio improve (candidato adotado).
    #[serde(rename = "derived")]
    Derived,
}

/// Referência nomeada a um elemento DOM.
///
/// Distinto de uma string de seletor crua: carrega tipo, proveniência
/// e, opcionalmente, o caminho de frames do mais externo ao mais interno.
///
/// Invariantes (checados em `validation`):
/// - `value` nunca é vazio;
/// - `kind == LocatorExpression` ⇒ `value` é uma cadeia pontuada restrita
///   cuja raiz é uma fábrica de locator da allowlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Payload do seletor.
    pub value: String,
    /// Tipo do payload.
    pub kind: TargetKind,
    /// Proveniência.
    pub source: TargetSource,
    /// Caminho de frames, do mais externo ao mais interno.
    #[serde(rename = "framePath", default, skip_serializing_if = "Option::is_none")]
    pub frame_path: Option<Vec<String>>,
    /// Forma crua original, quando o gravador a preservou.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Confiança atribuída na gravação, em [0,1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Aviso herdado da gravação.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Target {
    /// Cria um target mínimo.
    pub fn new(value: impl Into<String>, kind: TargetKind, source: TargetSource) -> Self {
        Self {
            value: value.into(),
            kind,
            source,
            frame_path: None,
            raw: None,
            confidence: None,
            warning: None,
        }
    }

    /// Compara dois targets ignorando a proveniência.
    ///
    /// Usado pelo check de assertion duplicada adjacente: `value`, `kind`
    /// e `framePath` contam; `source`, `raw`, `confidence` e `warning`
    /// não. Um framePath ausente é igual a um framePath vazio.
    pub fn equivalent_ignoring_source(&self, other: &Self) -> bool {
        let empty: Vec<String> = Vec::new();
        let mine = self.frame_path.as_deref().unwrap_or(&empty);
        let theirs = other.frame_path.as_deref().unwrap_or(&empty);
        self.value == other.value && self.kind == other.kind && mine == theirs
    }
}

// ============================================================================
// STEP: VARIANTE TAGGED POR ACTION
// ============================================================================

/// Um step declarativo do teste.
///
/// Tagged por `action` no YAML. Todo site que despacha por action usa
/// `match` exaustivo; adicionar uma variante quebra a compilação em todos
/// os pontos de despacho, de propósito.
///
/// Chaves desconhecidas dentro de um step são toleradas na leitura
/// (steps gravados por versões mais novas); chaves desconhecidas na raiz
/// do documento são rejeitadas (ver `loader`/`validation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Step {
    /// Navega para uma URL absoluta ou relativa ao baseUrl.
    Navigate {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Clica no elemento.
    Click {
        target: Target,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Preenche um campo com texto.
    Fill {
        target: Target,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Pressiona uma tecla com o elemento focado.
    Press {
        target: Target,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Passa o mouse sobre o elemento.
    Hover {
        target: Target,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Marca um checkbox.
    Check {
        target: Target,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Desmarca um checkbox.
    Uncheck {
        target: Target,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Seleciona uma opção de um select.
    Select {
        target: Target,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Afirma que o elemento está visível.
    AssertVisible {
        target: Target,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Afirma que o elemento contém o texto.
    AssertText {
        target: Target,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Afirma o value atual de um campo.
    AssertValue {
        target: Target,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Afirma o estado checked de um checkbox.
    AssertChecked {
        target: Target,
        checked: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl Step {
    /// Nome da action como aparece no YAML.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Click { .. } => "click",
            Self::Fill { .. } => "fill",
            Self::Press { .. } => "press",
            Self::Hover { .. } => "hover",
            Self::Check { .. } => "check",
            Self::Uncheck { .. } => "uncheck",
            Self::Select { .. } => "select",
            Self::AssertVisible { .. } => "assertVisible",
            Self::AssertText { .. } => "assertText",
            Self::AssertValue { .. } => "assertValue",
            Self::AssertChecked { .. } => "assertChecked",
        }
    }

    /// Target do step, se a action tiver um (todas menos navigate).
    pub fn target(&self) -> Option<&Target> {
        match self {
            Self::Navigate { .. } => None,
            Self::Click { target, .. }
            | Self::Fill { target, .. }
            | Self::Press { target, .. }
            | Self::Hover { target, .. }
            | Self::Check { target, .. }
            | Self::Uncheck { target, .. }
            | Self::Select { target, .. }
            | Self::AssertVisible { target, .. }
            | Self::AssertText { target, .. }
            | Self::AssertValue { target, .. }
            | Self::AssertChecked { target, .. } => Some(target),
        }
    }

    /// Target mutável, mesma regra de [`Step::target`].
    pub fn target_mut(&mut self) -> Option<&mut Target> {
        match self {
            Self::Navigate { .. } => None,
            Self::Click { target, .. }
            | Self::Fill { target, .. }
            | Self::Press { target, .. }
            | Self::Hover { target, .. }
            | Self::Check { target, .. }
            | Self::Uncheck { target, .. }
            | Self::Select { target, .. }
            | Self::AssertVisible { target, .. }
            | Self::AssertText { target, .. }
            | Self::AssertValue { target, .. }
            | Self::AssertChecked { target, .. } => Some(target),
        }
    }

    /// True para as quatro actions de assertion.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Self::AssertVisible { .. }
                | Self::AssertText { .. }
                | Self::AssertValue { .. }
                | Self::AssertChecked { .. }
        )
    }

    /// True para steps de cobertura: {click, press, hover, fill, select,
    /// check, uncheck}. São os steps que interagem com a página e que o
    /// pipeline de assertions quer cobrir com pós-condições.
    pub fn is_coverage(&self) -> bool {
        matches!(
            self,
            Self::Click { .. }
                | Self::Press { .. }
                | Self::Hover { .. }
                | Self::Fill { .. }
                | Self::Select { .. }
                | Self::Check { .. }
                | Self::Uncheck { .. }
        )
    }

    /// Escalar de dados do step (text/key/value/checked), normalizado
    /// para string. Usado no dedup de candidatos e no check de
    /// assertion duplicada.
    pub fn value_scalar(&self) -> Option<String> {
        match self {
            Self::Fill { text, .. } | Self::AssertText { text, .. } => Some(text.clone()),
            Self::Press { key, .. } => Some(key.clone()),
            Self::Select { value, .. } | Self::AssertValue { value, .. } => Some(value.clone()),
            Self::AssertChecked { checked, .. } => Some(checked.to_string()),
            _ => None,
        }
    }

    /// Substitui o target do step, preservando o resto.
    /// No-op em navigate (navigates nunca são re-targeted).
    pub fn with_target(mut self, new_target: Target) -> Self {
        if let Some(slot) = self.target_mut() {
            *slot = new_target;
        }
        self
    }

    /// Duas assertions são equivalentes quando a action e o escalar de
    /// dados batem e os targets são iguais ignorando proveniência.
    pub fn assertion_equivalent(&self, other: &Self) -> bool {
        if !self.is_assertion() || !other.is_assertion() {
            return false;
        }
        if self.action() != other.action() || self.value_scalar() != other.value_scalar() {
            return false;
        }
        match (self.target(), other.target()) {
            (Some(a), Some(b)) => a.equivalent_ignoring_source(b),
            _ => false,
        }
    }
}

// ============================================================================
// ARQUIVO DE TESTE
// ============================================================================

/// Documento de teste como lido do YAML.
///
/// `deny_unknown_fields` vale só para a raiz: steps toleram chaves
/// extras, a raiz não.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestFile {
    /// Nome legível do teste.
    pub name: String,
    /// Descrição opcional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// URL base para navegações relativas.
    #[serde(rename = "baseUrl", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sequência de steps.
    pub steps: Vec<Step>,
}

// ============================================================================
// RESULTADOS DA ANÁLISE DE SELETORES
// ============================================================================

/// Uma linha por step interagente resumindo a análise de seletor.
///
/// `index` é sempre o índice ORIGINAL do step como escrito em disco,
/// mesmo depois de remoções (ver `index_map`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFinding {
    /// Índice original do step.
    pub index: usize,
    /// Action do step.
    pub action: String,
    /// Target como estava no arquivo.
    pub old_target: Target,
    /// Melhor target encontrado (pode ser o próprio old_target).
    pub recommended_target: Target,
    /// Score final do target original.
    pub old_score: f64,
    /// Score final do recomendado.
    pub recommended_score: f64,
    /// recommended_score - old_score.
    pub confidence_delta: f64,
    /// Por que o recomendado foi gerado/escolhido.
    pub reason_codes: Vec<String>,
    /// True sse o target foi efetivamente substituído no YAML.
    pub changed: bool,
}

// ============================================================================
// CANDIDATOS DE ASSERTION
// ============================================================================

/// Origem de um candidato de assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Derivado deterministicamente da action+target do step.
    Deterministic,
    /// Derivado de snapshots nativos da árvore de acessibilidade.
    SnapshotNative,
    /// Derivado de snapshots capturados via CLI externa.
    SnapshotCli,
}

/// Desfecho de um candidato ao fim do run.
///
/// Todo candidato carrega exatamente um status (invariante de
/// completude do relatório).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    /// Validado inline no replay e inserido no YAML.
    Applied,
    /// Confiança abaixo do mínimo da policy.
    SkippedLowConfidence,
    /// Falhou ao executar inline durante o replay.
    SkippedRuntimeFailure,
    /// Barrado pela policy (cap por step, filtro de volatilidade,
    /// supressão de fallback, overflow do snapshot cap).
    SkippedPolicy,
    /// Assertion equivalente já existe adjacente ao step fonte.
    SkippedExisting,
    /// Apply não foi pedido neste run.
    NotRequested,
}

/// Flag de volatilidade detectada no conteúdo de um candidato.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityFlag {
    /// Fragmento numérico com 2+ dígitos.
    ContainsNumericFragment,
    /// Fragmento de data ou hora.
    ContainsDateOrTimeFragment,
    /// Texto com 48+ caracteres.
    ContainsLongText,
    /// Palavra-chave de domínio volátil (clima, notícia, hora).
    ContainsDynamicKeyword,
    /// Locator original carregava `exact: true`.
    ExactTrue,
}

/// Um candidato de pós-condição sintetizado para um step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionCandidate {
    /// Índice ORIGINAL do step que o candidato segue.
    pub index: usize,
    /// Action do step fonte.
    pub after_action: String,
    /// O step de assertion proposto.
    pub candidate: Step,
    /// Confiança em [0,1].
    pub confidence: f64,
    /// Explicação curta de onde o candidato veio.
    pub rationale: String,
    /// True quando é um assertVisible de cobertura, emitido só para o
    /// step não ficar sem pós-condição.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_fallback: Option<bool>,
    /// Confiança menos penalidades de volatilidade, em [0,1].
    pub stability_score: f64,
    /// Flags de volatilidade detectadas.
    pub volatility_flags: Vec<VolatilityFlag>,
    /// Pipeline que gerou o candidato.
    pub candidate_source: CandidateSource,
    /// Desfecho do candidato.
    pub apply_status: ApplyStatus,
    /// Mensagem associada ao desfecho (erro de runtime, razão de skip).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_message: Option<String>,
}

impl AssertionCandidate {
    /// True quando o candidato é um coverage fallback.
    pub fn is_fallback(&self) -> bool {
        self.coverage_fallback.unwrap_or(false)
    }

    /// Chave de dedup: (step, action, target.value, escalar auxiliar).
    pub fn dedup_key(&self) -> (usize, String, String, Option<String>) {
        (
            self.index,
            self.candidate.action().to_string(),
            self.candidate
                .target()
                .map(|t| t.value.clone())
                .unwrap_or_default(),
            self.candidate.value_scalar(),
        )
    }
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Snapshots pré/pós da árvore de acessibilidade para um step runtime.
///
/// Chaveado por índice RUNTIME (posição no array atual de steps);
/// o index mapper remapeia quando steps são removidos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSnapshot {
    /// Índice runtime do step no momento da captura.
    pub runtime_index: usize,
    /// Árvore antes do step executar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<String>,
    /// Árvore depois do step executar (e do network idle).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
}

// ============================================================================
// DIAGNÓSTICOS
// ============================================================================

/// Severidade de um diagnóstico.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Info,
    Warn,
    Error,
}

/// Uma decisão registrada no relatório, com código estável.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Código estável (ver `errors::diag`).
    pub code: String,
    /// Severidade.
    pub level: DiagnosticLevel,
    /// Mensagem legível.
    pub message: String,
}

impl Diagnostic {
    pub fn info(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            level: DiagnosticLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            level: DiagnosticLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            level: DiagnosticLevel::Error,
            message: message.into(),
        }
    }
}

// ============================================================================
// SUMÁRIO E RELATÓRIO
// ============================================================================

/// Contadores agregados do run.
///
/// Invariante de monotonicidade de cobertura:
/// `with_applied ≤ with_candidates ≤ total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Steps no arquivo original.
    pub total_steps: usize,
    /// Steps interagentes analisados.
    pub interacting_steps: usize,
    /// Findings com changed=true.
    pub selectors_changed: usize,
    /// Findings com changed=false.
    pub selectors_unchanged: usize,
    /// Assertions pré-existentes removidas como stale.
    pub stale_assertions_removed: usize,
    /// Steps removidos pelo classificador de falhas de runtime.
    pub runtime_failing_steps_removed: usize,
    /// Total de candidatos de assertion emitidos.
    pub assertion_candidates_total: usize,
    /// Candidatos com status applied.
    pub applied_assertions: usize,
    /// Candidatos skipped_low_confidence.
    pub skipped_low_confidence: usize,
    /// Candidatos skipped_runtime_failure.
    pub skipped_runtime_failure: usize,
    /// Candidatos skipped_policy.
    pub skipped_policy: usize,
    /// Candidatos skipped_existing.
    pub skipped_existing: usize,
    /// Candidatos not_requested.
    pub not_requested: usize,
    /// Steps de cobertura no teste.
    pub assertion_coverage_steps_total: usize,
    /// Steps de cobertura com pelo menos um candidato.
    pub assertion_coverage_steps_with_candidates: usize,
    /// Steps de cobertura com pelo menos um candidato applied.
    pub assertion_coverage_steps_with_applied: usize,
}

/// Relatório final do improve, validado contra o schema embutido
/// antes de ser escrito.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Caminho do arquivo de teste analisado.
    pub test_file: String,
    /// Timestamp RFC3339 da geração.
    pub generated_at: String,
    /// Tag da configuração de fontes de candidato.
    pub provider: String,
    /// ID único deste run.
    pub run_id: String,
    /// Contadores agregados.
    pub summary: Summary,
    /// Uma linha por step interagente.
    pub step_findings: Vec<StepFinding>,
    /// Candidatos de assertion com seus desfechos.
    pub assertion_candidates: Vec<AssertionCandidate>,
    /// Decisões registradas durante o run.
    pub diagnostics: Vec<Diagnostic>,
}
