//! # Browser Facade - A Fronteira com o Chromium
//!
//! O engine nunca fala CDP diretamente: tudo passa pelo trait
//! [`Browser`], que expõe exatamente as operações que o pipeline
//! precisa e nada mais.
//!
//! ## Contrato (os pontos que importam):
//!
//! - `execute_step` em modo `Playback` realiza a ação visível (click,
//!   fill, navigate); em modo `Analysis` só realiza observações seguras
//!   (asserts e resolução) e pode ser chamado durante sondagem de
//!   candidatos sem mutar o estado da aplicação.
//! - `resolve_target` avalia locator expressions com SEGURANÇA: a
//!   expressão passa pelo interpretador restrito de `locator`; qualquer
//!   coisa fora da allowlist falha com erro descritivo.
//! - `navigate` resolve URLs relativas contra o `base_url` explícito se
//!   houver, senão contra a URL da página atual; se nenhum dos dois
//!   der uma URL absoluta, falha com `RelativeNavigationUnresolvable`.
//! - `wait_for_network_idle` retorna **true no timeout** (não é erro) e
//!   false no sucesso; erro duro só em falha que não seja timeout.
//!
//! A implementação real é [`chromium::ChromiumBrowser`]; os testes do
//! pipeline usam o double roteirizado em `fake`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::locator::{self, LocatorError, LocatorOp, ResolutionPlan, TextMatch};
use crate::protocol::{Step, Target, TargetKind};

pub mod chromium;
#[cfg(test)]
pub mod fake;

// ============================================================================
// TIPOS DO CONTRATO
// ============================================================================

/// Modo de execução de um step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Realiza a ação visível ao usuário.
    Playback,
    /// Só observações seguras (asserts, resolução).
    Analysis,
}

/// Resultado de sondar um target sem tocar na página.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocatorProbe {
    /// Quantos elementos o target resolve.
    pub match_count: usize,
    /// O primeiro match está visível?
    pub first_visible: bool,
}

/// Fatos sobre o elemento que um target resolve hoje.
///
/// O gerador de candidatos usa isso para derivar alternativas
/// (role+nome, label, placeholder, testid, CSS ancorado em id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementDescriptor {
    pub role: Option<String>,
    pub accessible_name: Option<String>,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub test_id: Option<String>,
    pub id: Option<String>,
    /// Caminho CSS mínimo calculado pela página.
    pub css_path: Option<String>,
}

/// Erros do facade. `StepFailed`/`AssertionFailed` são locais (o
/// pipeline continua); o resto sobe conforme a taxonomia do engine.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Chromium não encontrado: {hint}")]
    ChromiumNotInstalled { hint: String },

    #[error("falha ao lançar o browser: {0}")]
    Launch(String),

    #[error("navegação relativa não resolvível: '{url}' sem baseUrl e sem página atual absoluta")]
    RelativeNavigationUnresolvable { url: String },

    #[error("navegação falhou: {0}")]
    Navigation(String),

    #[error("locator rejeitado: {0}")]
    UnsafeLocator(#[from] LocatorError),

    #[error("step falhou: {0}")]
    StepFailed(String),

    #[error("assertion falhou: {0}")]
    AssertionFailed(String),

    #[error("snapshot falhou: {0}")]
    Snapshot(String),

    #[error("network idle falhou: {0}")]
    NetworkIdle(String),

    #[error("protocolo CDP: {0}")]
    Protocol(String),
}

// ============================================================================
// O TRAIT
// ============================================================================

/// O contrato que o pipeline consome. Uma página por facade; todas as
/// chamadas são serializadas pelo chamador (modelo cooperativo).
#[async_trait]
pub trait Browser: Send {
    /// Navega, resolvendo URL relativa contra base explícita ou página
    /// atual.
    async fn navigate(
        &mut self,
        url: &str,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    /// Executa um step no modo pedido.
    async fn execute_step(
        &mut self,
        step: &Step,
        mode: ExecMode,
        timeout: Duration,
        base_url: Option<&str>,
    ) -> Result<(), BrowserError>;

    /// Sonda um target: quantos matches, primeiro visível. Read-only.
    async fn resolve_target(&mut self, target: &Target) -> Result<LocatorProbe, BrowserError>;

    /// Descreve o elemento que o target resolve (primeiro match), ou
    /// None quando não resolve nada. Read-only.
    async fn describe_target(
        &mut self,
        target: &Target,
    ) -> Result<Option<ElementDescriptor>, BrowserError>;

    /// Serialização textual estável da árvore de acessibilidade.
    async fn snapshot(&mut self) -> Result<String, BrowserError>;

    /// Espera a rede aquietar. Ok(true) = timeout (warning), Ok(false)
    /// = sucesso, Err = falha dura.
    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<bool, BrowserError>;

    /// Volta o facade para o estado de início de replay (página limpa).
    async fn reset(&mut self) -> Result<(), BrowserError>;

    /// Fecha o browser e libera recursos.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

// ============================================================================
// COMPILAÇÃO TARGET → PLANO
// ============================================================================

/// Compila qualquer [`Target`] no plano de resolução comum às duas
/// implementações do facade.
///
/// É aqui que a "avaliação dinâmica" de locator expressions acontece:
/// via parser restrito, nunca via eval.
pub fn target_plan(target: &Target) -> Result<ResolutionPlan, BrowserError> {
    let ops = match target.kind {
        TargetKind::Css | TargetKind::Internal => vec![LocatorOp::Css(target.value.clone())],
        TargetKind::Xpath => vec![LocatorOp::Xpath(target.value.clone())],
        TargetKind::TextSelector => {
            vec![LocatorOp::Text(TextMatch::Substring(target.value.clone()))]
        }
        TargetKind::RoleEngine => vec![parse_role_engine(&target.value)?],
        TargetKind::PlaywrightSelector => vec![parse_player_selector(&target.value)],
        TargetKind::LocatorExpression => return Ok(locator::compile(&target.value)?),
    };
    Ok(ResolutionPlan { ops })
}

/// Formato do role-engine: `role` ou `role "nome acessível"`.
fn parse_role_engine(value: &str) -> Result<LocatorOp, BrowserError> {
    let trimmed = value.trim();
    if let Some((role, rest)) = trimmed.split_once(' ') {
        let name = rest.trim();
        let name = name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .unwrap_or(name);
        if role.is_empty() || name.is_empty() {
            return Err(BrowserError::UnsafeLocator(LocatorError::InvalidArguments {
                call: "role-engine".into(),
                detail: format!("valor malformado: {value:?}"),
            }));
        }
        Ok(LocatorOp::Role {
            role: role.to_string(),
            name: Some(TextMatch::Exact(name.to_string())),
        })
    } else if trimmed.is_empty() {
        Err(BrowserError::UnsafeLocator(LocatorError::Empty))
    } else {
        Ok(LocatorOp::Role { role: trimmed.to_string(), name: None })
    }
}

/// Dialeto do player: `text=...`, `xpath=...`, senão CSS.
fn parse_player_selector(value: &str) -> LocatorOp {
    if let Some(text) = value.strip_prefix("text=") {
        LocatorOp::Text(TextMatch::Substring(text.to_string()))
    } else if let Some(xpath) = value.strip_prefix("xpath=") {
        LocatorOp::Xpath(xpath.to_string())
    } else {
        LocatorOp::Css(value.to_string())
    }
}

// ============================================================================
// RESOLUÇÃO DE URL
// ============================================================================

/// Resolve a URL de navegação: absoluta passa direto; relativa junta
/// com o base explícito, senão com a página atual.
pub fn resolve_url(
    url: &str,
    base_url: Option<&str>,
    current_url: Option<&str>,
) -> Result<String, BrowserError> {
    if let Ok(absolute) = url::Url::parse(url) {
        return Ok(absolute.to_string());
    }
    for base in [base_url, current_url].into_iter().flatten() {
        if let Ok(base) = url::Url::parse(base) {
            if let Ok(joined) = base.join(url) {
                return Ok(joined.to_string());
            }
        }
    }
    Err(BrowserError::RelativeNavigationUnresolvable { url: url.to_string() })
}
