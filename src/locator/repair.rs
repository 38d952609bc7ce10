//! # Reparador de Locator Expressions
//!
//! Detecta sinais de texto dinâmico em expressões de locator e emite
//! variantes reparadas mais robustas.
//!
//! ## O problema que isso resolve:
//!
//! O codegen grava o que vê. Em páginas de notícia/clima isso produz
//! locators como:
//!
//! ```text
//! getByRole('link', { name: 'Schiphol vluchten winterweer update 12:30', exact: true })
//! ```
//!
//! Na próxima execução a manchete mudou e o teste quebra. O reparador
//! reconhece os sinais (exact:true, texto longo, fragmento numérico,
//! data/hora, palavra-chave volátil) e propõe, NESTA ordem:
//!
//! 1. a mesma expressão sem `exact: true`;
//! 2. o name trocado por um regex do prefixo estável;
//! 3. o role sem name, refinado por `filter({ hasText: /prefixo/i })`.
//!
//! A ordem é fixa para que runs sejam reprodutíveis.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{escape_regex, parse, Arg, Call, LocatorError, LocatorExpr, ObjectLit, Value};
use crate::protocol::{Target, TargetKind, VolatilityFlag};

/// Texto com este tamanho ou mais é considerado volátil por si só.
pub const LONG_TEXT_THRESHOLD: usize = 48;

// ============================================================================
// DETECTORES DE SINAL
// ============================================================================

static NUMERIC_FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{2,}").expect("valid numeric-fragment regex"));

static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \b\d{1,2}[:.]\d{2}\b                                   # 12:30, 9.05
        | \b\d{1,2}[-/]\d{1,2}(?:[-/]\d{2,4})?\b               # 12/03, 1-2-2026
        | \b\d{4}-\d{2}-\d{2}\b                                # 2026-01-31
        | \b(jan|feb|mrt|apr|mei|jun|jul|aug|sep|okt|nov|dec
            |january|february|march|april|may|june|july|august
            |september|october|november|december
            |januari|februari|maart|juni|juli|augustus|oktober
            |m[äa]rz|dezember|janvier|f[ée]vrier|mars|avril|juin
            |juillet|ao[ûu]t|septembre|octobre|novembre|d[ée]cembre)\b",
    )
    .expect("valid date-time regex")
});

static DYNAMIC_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(update|live|breaking|latest|laatste|vandaag|today|heute|aujourd'hui|nu|now|net\s+binnen|weer|weather|wetter|m[ée]t[ée]o|nieuws|news|nachrichten|uur|uhr|min|sec|file|files|vertraging)\b",
    )
    .expect("valid dynamic-keyword regex")
});

/// Dígitos em sequência de 2+ caracteres.
pub fn has_numeric_fragment(text: &str) -> bool {
    NUMERIC_FRAGMENT_RE.is_match(text)
}

/// Fragmento de data ou hora (12:30, 12/03, nomes de mês).
pub fn has_date_time_fragment(text: &str) -> bool {
    DATE_TIME_RE.is_match(text)
}

/// Palavra-chave de domínio volátil (clima, notícia, marcadores de tempo).
pub fn has_dynamic_keyword(text: &str) -> bool {
    DYNAMIC_KEYWORD_RE.is_match(text)
}

/// Texto longo o bastante para ser manchete/copy dinâmica.
pub fn is_long_text(text: &str) -> bool {
    text.chars().count() >= LONG_TEXT_THRESHOLD
}

/// Flags de volatilidade de um texto, na ordem canônica do relatório.
pub fn volatility_flags(text: &str, exact_true: bool) -> Vec<VolatilityFlag> {
    let mut flags = Vec::new();
    if has_numeric_fragment(text) {
        flags.push(VolatilityFlag::ContainsNumericFragment);
    }
    if has_date_time_fragment(text) {
        flags.push(VolatilityFlag::ContainsDateOrTimeFragment);
    }
    if is_long_text(text) {
        flags.push(VolatilityFlag::ContainsLongText);
    }
    if has_dynamic_keyword(text) {
        flags.push(VolatilityFlag::ContainsDynamicKeyword);
    }
    if exact_true {
        flags.push(VolatilityFlag::ExactTrue);
    }
    flags
}

// ============================================================================
// SINAIS AGREGADOS
// ============================================================================

/// Sinais dinâmicos detectados em uma expressão.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicSignals {
    pub exact_true: bool,
    pub long_text: bool,
    pub numeric_fragment: bool,
    pub date_time_fragment: bool,
    pub dynamic_keyword: bool,
}

impl DynamicSignals {
    /// Analisa o texto acessível + flag exact.
    pub fn detect(text: &str, exact_true: bool) -> Self {
        Self {
            exact_true,
            long_text: is_long_text(text),
            numeric_fragment: has_numeric_fragment(text),
            date_time_fragment: has_date_time_fragment(text),
            dynamic_keyword: has_dynamic_keyword(text),
        }
    }

    /// Pelo menos um sinal presente.
    pub fn any(&self) -> bool {
        self.exact_true
            || self.long_text
            || self.numeric_fragment
            || self.date_time_fragment
            || self.dynamic_keyword
    }

    /// Reason codes estáveis, na ordem canônica.
    pub fn reason_codes(&self) -> Vec<String> {
        let mut codes = Vec::new();
        if self.exact_true {
            codes.push("locator_dynamic_exact".to_string());
        }
        if self.long_text {
            codes.push("locator_dynamic_long_text".to_string());
        }
        if self.numeric_fragment {
            codes.push("locator_dynamic_numeric".to_string());
        }
        if self.date_time_fragment {
            codes.push("locator_dynamic_date_time".to_string());
        }
        if self.dynamic_keyword {
            codes.push("locator_dynamic_keyword".to_string());
        }
        codes
    }
}

// ============================================================================
// RESULTADO DO REPARO
// ============================================================================

/// Uma variante reparada, pronta para virar target candidato.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedVariant {
    /// Nova expressão canônica.
    pub expression: String,
    /// Reason code estável da transformação.
    pub reason_code: &'static str,
}

/// Desfecho da análise de reparo de um target.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// Target não é uma locator expression (nada a fazer aqui).
    NotApplicable,
    /// Expressão parseou mas o shape não é reparável.
    /// Vira diagnóstico info, nenhum candidato emitido.
    UnsupportedShape { detail: String },
    /// Expressão saudável: nenhum sinal dinâmico.
    NoDynamicSignals,
    /// Sinais detectados; variantes na ordem de preferência.
    Repaired {
        signals: DynamicSignals,
        variants: Vec<RepairedVariant>,
    },
}

/// O fallback de back-conversion via seletor resolvido pode ser
/// desligado por ambiente (API privada do player).
pub fn resolved_fallback_enabled() -> bool {
    std::env::var("IMPROVER_DISABLE_RESOLVED_FALLBACK")
        .map(|v| v != "1")
        .unwrap_or(true)
}

// ============================================================================
// ANÁLISE
// ============================================================================

/// Shape suportado: raiz getByRole com name string, ou getByText string,
/// sem cadeia (a cadeia já é um refinamento manual de alguém).
enum Shape {
    RoleWithName { role: String, name: String, exact: bool },
    Text { text: String, exact: bool },
}

fn classify_shape(expr: &LocatorExpr) -> Result<Shape, String> {
    if !expr.chain.is_empty() {
        return Err("expressão já carrega refinadores encadeados".to_string());
    }
    let call = &expr.root;
    match call.name.as_str() {
        "getByRole" => {
            let role = match call.args.first() {
                Some(Arg::Value(Value::Str(role))) => role.clone(),
                _ => return Err("getByRole sem role string".to_string()),
            };
            let options = call.args.iter().find_map(|a| match a {
                Arg::Object(obj) => Some(obj),
                Arg::Value(_) => None,
            });
            let name = match options.and_then(|o| o.get("name")) {
                Some(Value::Str(name)) => name.clone(),
                Some(Value::Regex { .. }) => {
                    return Err("name já é regex; nada a reparar".to_string())
                }
                _ => return Err("getByRole sem name acessível".to_string()),
            };
            let exact = options
                .and_then(|o| o.get("exact"))
                .map(|v| *v == Value::Bool(true))
                .unwrap_or(false);
            Ok(Shape::RoleWithName { role, name, exact })
        }
        "getByText" => match call.args.first() {
            Some(Arg::Value(Value::Str(text))) => {
                let exact = call
                    .args
                    .iter()
                    .find_map(|a| match a {
                        Arg::Object(obj) => obj.get("exact").cloned(),
                        Arg::Value(_) => None,
                    })
                    .map(|v| v == Value::Bool(true))
                    .unwrap_or(false);
                Ok(Shape::Text { text: text.clone(), exact })
            }
            _ => Err("getByText sem texto literal".to_string()),
        },
        other => Err(format!("raiz '{other}' não tem estratégia de reparo")),
    }
}

/// Prefixo estável de um texto dinâmico: as palavras iniciais sem
/// dígitos nem palavras-chave voláteis. Sempre não-vazio (cai para a
/// primeira palavra se tudo for volátil).
fn stable_prefix(text: &str) -> String {
    let mut kept = Vec::new();
    for word in text.split_whitespace() {
        if has_numeric_fragment(word)
            || has_date_time_fragment(word)
            || has_dynamic_keyword(word)
        {
            break;
        }
        kept.push(word);
        if kept.len() >= 4 {
            break;
        }
    }
    if kept.is_empty() {
        text.split_whitespace().next().unwrap_or(text).to_string()
    } else {
        kept.join(" ")
    }
}

fn role_expr(role: &str, name: Option<Value>, extra: Option<(&str, Value)>) -> String {
    let mut entries = Vec::new();
    if let Some(name) = name {
        entries.push(("name".to_string(), name));
    }
    if let Some((key, value)) = extra {
        entries.push((key.to_string(), value));
    }
    let mut args = vec![Arg::Value(Value::Str(role.to_string()))];
    if !entries.is_empty() {
        args.push(Arg::Object(ObjectLit { entries }));
    }
    LocatorExpr {
        root: Call { name: "getByRole".into(), args },
        chain: vec![],
    }
    .to_string()
}

/// Analisa o target e, se couber, emite as variantes reparadas.
///
/// Nunca falha: problemas de parse viram `UnsupportedShape` com o erro
/// do parser como detalhe (o improve segue com os outros candidatos).
pub fn analyze(target: &Target) -> RepairOutcome {
    if target.kind != TargetKind::LocatorExpression {
        return RepairOutcome::NotApplicable;
    }
    let expr = match parse(&target.value) {
        Ok(expr) => expr,
        Err(err @ LocatorError::UnsupportedRoot { .. })
        | Err(err @ LocatorError::UnknownMember { .. })
        | Err(err @ LocatorError::ComputedAccess)
        | Err(err @ LocatorError::FunctionLiteral) => {
            return RepairOutcome::UnsupportedShape { detail: err.to_string() }
        }
        Err(err) => return RepairOutcome::UnsupportedShape { detail: err.to_string() },
    };

    let shape = match classify_shape(&expr) {
        Ok(shape) => shape,
        Err(detail) => return RepairOutcome::UnsupportedShape { detail },
    };

    match shape {
        Shape::RoleWithName { role, name, exact } => {
            let signals = DynamicSignals::detect(&name, exact);
            if !signals.any() {
                return RepairOutcome::NoDynamicSignals;
            }
            let prefix = stable_prefix(&name);
            let name_regex = Value::Regex {
                pattern: escape_regex(&prefix),
                flags: "i".to_string(),
            };

            let mut variants = Vec::new();
            if exact {
                variants.push(RepairedVariant {
                    expression: role_expr(&role, Some(Value::Str(name.clone())), None),
                    reason_code: "repair_remove_exact",
                });
            }
            variants.push(RepairedVariant {
                expression: role_expr(&role, Some(name_regex.clone()), None),
                reason_code: "repair_regex_name",
            });
            variants.push(RepairedVariant {
                expression: format!(
                    "{}.filter({{ hasText: {} }})",
                    role_expr(&role, None, None),
                    name_regex
                ),
                reason_code: "repair_regex_filter_has_text",
            });
            RepairOutcome::Repaired { signals, variants }
        }
        Shape::Text { text, exact } => {
            let signals = DynamicSignals::detect(&text, exact);
            if !signals.any() {
                return RepairOutcome::NoDynamicSignals;
            }
            let prefix = stable_prefix(&text);
            let regex = Value::Regex {
                pattern: escape_regex(&prefix),
                flags: "i".to_string(),
            };
            let mut variants = Vec::new();
            if exact {
                variants.push(RepairedVariant {
                    expression: format!("getByText({})", Value::Str(text.clone())),
                    reason_code: "repair_remove_exact",
                });
            }
            variants.push(RepairedVariant {
                expression: format!("getByText({regex})"),
                reason_code: "repair_regex_name",
            });
            RepairOutcome::Repaired { signals, variants }
        }
    }
}
