//! # Módulo de Locator - Interpretador Restrito de Expressões
//!
//! Uma *locator expression* é uma cadeia pontuada de chamadas de fábrica
//! de locator, como o codegen grava:
//!
//! ```text
//! getByRole('link', { name: 'Schiphol vluchten', exact: true })
//! getByText('Welkom').filter({ hasText: /update/i }).first()
//! ```
//!
//! ## Por que um interpretador restrito?
//!
//! A versão ingênua seria avaliar a expressão como JavaScript na página.
//! Isso é uma porta de entrada para execução arbitrária de código vindo
//! de um arquivo YAML. Aqui a avaliação "dinâmica" é re-arquitetada como
//! um parser + interpretador sobre uma allowlist fixa de métodos:
//!
//! - as únicas raízes permitidas são as fábricas de locator conhecidas;
//! - só acesso pontuado simples é aceito;
//! - acesso computado (`a[b]`), chamadas arbitrárias (`process.exit(1)`)
//!   e function literals (`() => ...`) falham com erro descritivo.
//!
//! O resultado do parse vira um [`ResolutionPlan`]: uma sequência de
//! operações tipadas que o browser facade compila para a consulta real.

use std::fmt;
use thiserror::Error;

pub mod repair;

// ============================================================================
// ALLOWLIST
// ============================================================================

/// Fábricas de locator aceitas como raiz da cadeia.
pub const ALLOWED_ROOTS: &[&str] = &[
    "getByRole",
    "getByText",
    "getByLabel",
    "getByPlaceholder",
    "getByTestId",
    "getByTitle",
    "getByAltText",
    "locator",
];

/// Membros aceitos depois da raiz (fábricas aninhadas + refinadores).
pub const ALLOWED_CHAIN: &[&str] = &[
    "getByRole",
    "getByText",
    "getByLabel",
    "getByPlaceholder",
    "getByTestId",
    "getByTitle",
    "getByAltText",
    "locator",
    "filter",
    "first",
    "last",
    "nth",
];

// ============================================================================
// ERROS
// ============================================================================

/// Erros do parser/interpretador de locator expressions.
///
/// As mensagens são descritivas de propósito: aparecem em diagnósticos
/// e precisam dizer ao usuário o que exatamente foi rejeitado.
#[derive(Debug, Error, PartialEq)]
pub enum LocatorError {
    #[error("expressão vazia")]
    Empty,

    #[error("raiz '{name}' não é uma fábrica de locator permitida")]
    UnsupportedRoot { name: String },

    #[error("membro '{name}' não está na allowlist de métodos")]
    UnknownMember { name: String },

    #[error("acesso computado ('[') não é permitido em locator expressions")]
    ComputedAccess,

    #[error("function literals não são permitidos em locator expressions")]
    FunctionLiteral,

    #[error("string não terminada na posição {at}")]
    UnterminatedString { at: usize },

    #[error("token inesperado '{found}' na posição {at}")]
    UnexpectedToken { found: String, at: usize },

    #[error("argumentos inválidos para '{call}': {detail}")]
    InvalidArguments { call: String, detail: String },
}

// ============================================================================
// AST
// ============================================================================

/// Como um texto deve casar com o conteúdo acessível de um elemento.
#[derive(Debug, Clone, PartialEq)]
pub enum TextMatch {
    /// Igualdade exata (após normalização de espaços).
    Exact(String),
    /// Substring, case-insensitive (comportamento default dos engines).
    Substring(String),
    /// Expressão regular com flags estilo JS (só 'i' é interpretada).
    Regex { pattern: String, flags: String },
}

impl TextMatch {
    /// Texto literal carregado pelo match, quando houver.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Self::Exact(s) | Self::Substring(s) => Some(s),
            Self::Regex { .. } => None,
        }
    }

    /// Avalia o match contra um texto, do jeito que o engine de roles
    /// avaliaria (normalização de whitespace antes de comparar).
    pub fn matches(&self, haystack: &str) -> bool {
        let hay = normalize_ws(haystack);
        match self {
            Self::Exact(want) => hay == normalize_ws(want),
            Self::Substring(want) => hay.to_lowercase().contains(&normalize_ws(want).to_lowercase()),
            Self::Regex { pattern, flags } => {
                let expr = if flags.contains('i') {
                    format!("(?i){pattern}")
                } else {
                    pattern.clone()
                };
                regex::Regex::new(&expr).map(|re| re.is_match(&hay)).unwrap_or(false)
            }
        }
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uma operação tipada do plano de resolução.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorOp {
    /// getByRole(role, { name?, exact? })
    Role { role: String, name: Option<TextMatch> },
    /// getByText(texto | regex, { exact? })
    Text(TextMatch),
    /// getByLabel(texto | regex, { exact? })
    Label(TextMatch),
    /// getByPlaceholder(texto | regex, { exact? })
    Placeholder(TextMatch),
    /// getByTestId(id)
    TestId(String),
    /// getByTitle(texto | regex, { exact? })
    Title(TextMatch),
    /// getByAltText(texto | regex, { exact? })
    AltText(TextMatch),
    /// locator(css)
    Css(String),
    /// Expressão XPath. Nunca sai do parser (a gramática não tem
    /// xpath); existe para o facade compilar targets kind=xpath no
    /// mesmo plano.
    Xpath(String),
    /// filter({ hasText })
    Filter { has_text: TextMatch },
    /// first()
    First,
    /// last()
    Last,
    /// nth(n)
    Nth(usize),
}

/// Plano de resolução: as operações na ordem da cadeia.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionPlan {
    pub ops: Vec<LocatorOp>,
}

// Representação sintática crua, antes do type-check.

/// Valor escalar aceito em argumentos.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    Regex { pattern: String, flags: String },
}

/// Objeto literal com ordem de chaves preservada.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectLit {
    pub entries: Vec<(String, Value)>,
}

impl ObjectLit {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Argumento de chamada: escalar ou objeto de opções.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Object(ObjectLit),
}

/// Uma chamada `nome(args...)` da cadeia.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

/// Expressão completa: raiz + cadeia de refinadores.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorExpr {
    pub root: Call,
    pub chain: Vec<Call>,
}

impl LocatorExpr {
    /// Todas as chamadas, raiz primeiro.
    pub fn calls(&self) -> impl Iterator<Item = &Call> {
        std::iter::once(&self.root).chain(self.chain.iter())
    }
}

// ============================================================================
// TOKENIZER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Regex { pattern: String, flags: String },
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    Dot,
    Comma,
    Colon,
    Arrow,
    Eof,
}

struct Tokenizer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src: src.as_bytes(), pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Result<(Token, usize), LocatorError> {
        self.skip_ws();
        let at = self.pos;
        if self.pos >= self.src.len() {
            return Ok((Token::Eof, at));
        }
        let c = self.src[self.pos];
        match c {
            b'(' => {
                self.pos += 1;
                Ok((Token::LParen, at))
            }
            b')' => {
                self.pos += 1;
                Ok((Token::RParen, at))
            }
            b'{' => {
                self.pos += 1;
                Ok((Token::LBrace, at))
            }
            b'}' => {
                self.pos += 1;
                Ok((Token::RBrace, at))
            }
            // Acesso computado é sempre rejeitado; reportado no parser.
            b'[' => {
                self.pos += 1;
                Ok((Token::LBracket, at))
            }
            b'.' => {
                self.pos += 1;
                Ok((Token::Dot, at))
            }
            b',' => {
                self.pos += 1;
                Ok((Token::Comma, at))
            }
            b':' => {
                self.pos += 1;
                Ok((Token::Colon, at))
            }
            b'=' => {
                // O único lugar onde '=' aparece seria um arrow function.
                if self.src.get(self.pos + 1) == Some(&b'>') {
                    self.pos += 2;
                    Ok((Token::Arrow, at))
                } else {
                    self.pos += 1;
                    Err(LocatorError::UnexpectedToken { found: "=".into(), at })
                }
            }
            b'\'' | b'"' => self.read_string(c),
            b'/' => self.read_regex(),
            b'0'..=b'9' => self.read_number(),
            c if c.is_ascii_alphabetic() || c == b'_' || c == b'$' => self.read_ident(),
            other => Err(LocatorError::UnexpectedToken {
                found: (other as char).to_string(),
                at,
            }),
        }
    }

    fn read_string(&mut self, quote: u8) -> Result<(Token, usize), LocatorError> {
        let at = self.pos;
        self.pos += 1;
        let mut out = String::new();
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c == b'\\' && self.pos + 1 < self.src.len() {
                let next = self.src[self.pos + 1];
                out.push(match next {
                    b'n' => '\n',
                    b't' => '\t',
                    other => other as char,
                });
                self.pos += 2;
                continue;
            }
            if c == quote {
                self.pos += 1;
                return Ok((Token::Str(out), at));
            }
            // Strings gravadas podem carregar UTF-8; copia byte a byte e
            // revalida no final seria frágil, então decodifica incremental.
            let rest = &self.src[self.pos..];
            let s = std::str::from_utf8(rest).map_err(|_| LocatorError::UnterminatedString { at })?;
            let ch = s.chars().next().ok_or(LocatorError::UnterminatedString { at })?;
            out.push(ch);
            self.pos += ch.len_utf8();
        }
        Err(LocatorError::UnterminatedString { at })
    }

    fn read_regex(&mut self) -> Result<(Token, usize), LocatorError> {
        let at = self.pos;
        self.pos += 1;
        let mut pattern = String::new();
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c == b'\\' && self.pos + 1 < self.src.len() {
                pattern.push('\\');
                pattern.push(self.src[self.pos + 1] as char);
                self.pos += 2;
                continue;
            }
            if c == b'/' {
                self.pos += 1;
                let mut flags = String::new();
                while self.pos < self.src.len() && self.src[self.pos].is_ascii_alphabetic() {
                    flags.push(self.src[self.pos] as char);
                    self.pos += 1;
                }
                return Ok((Token::Regex { pattern, flags }, at));
            }
            let rest = &self.src[self.pos..];
            let s = std::str::from_utf8(rest).map_err(|_| LocatorError::UnterminatedString { at })?;
            let ch = s.chars().next().ok_or(LocatorError::UnterminatedString { at })?;
            pattern.push(ch);
            self.pos += ch.len_utf8();
        }
        Err(LocatorError::UnterminatedString { at })
    }

    fn read_number(&mut self) -> Result<(Token, usize), LocatorError> {
        let at = self.pos;
        let start = self.pos;
        while self.pos < self.src.len()
            && (self.src[self.pos].is_ascii_digit() || self.src[self.pos] == b'.')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map(|n| (Token::Num(n), at))
            .map_err(|_| LocatorError::UnexpectedToken { found: text.to_string(), at })
    }

    fn read_ident(&mut self) -> Result<(Token, usize), LocatorError> {
        let at = self.pos;
        let start = self.pos;
        while self.pos < self.src.len()
            && (self.src[self.pos].is_ascii_alphanumeric()
                || self.src[self.pos] == b'_'
                || self.src[self.pos] == b'$')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("").to_string();
        Ok((Token::Ident(text), at))
    }
}

// ============================================================================
// PARSER
// ============================================================================

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    _src: &'a str,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, LocatorError> {
        let mut tokenizer = Tokenizer::new(src);
        let mut tokens = Vec::new();
        loop {
            let (tok, at) = tokenizer.next_token()?;
            let done = tok == Token::Eof;
            tokens.push((tok, at));
            if done {
                break;
            }
        }
        Ok(Self { tokens, pos: 0, _src: src })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn at(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token, label: &str) -> Result<(), LocatorError> {
        if *self.peek() == want {
            self.bump();
            Ok(())
        } else {
            Err(LocatorError::UnexpectedToken {
                found: format!("{:?} (esperava {label})", self.peek()),
                at: self.at(),
            })
        }
    }

    fn parse_expr(&mut self) -> Result<LocatorExpr, LocatorError> {
        // Prefixo opcional `page.`: o codegen às vezes grava com ele.
        let mut root_name = self.parse_ident()?;
        if root_name == "page" {
            self.expect(Token::Dot, "'.'")?;
            root_name = self.parse_ident()?;
        }
        if !ALLOWED_ROOTS.contains(&root_name.as_str()) {
            return Err(LocatorError::UnsupportedRoot { name: root_name });
        }
        let root = self.parse_call_after_name(root_name)?;

        let mut chain = Vec::new();
        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump();
                    let name = self.parse_ident()?;
                    if !ALLOWED_CHAIN.contains(&name.as_str()) {
                        return Err(LocatorError::UnknownMember { name });
                    }
                    chain.push(self.parse_call_after_name(name)?);
                }
                Token::LBracket => return Err(LocatorError::ComputedAccess),
                Token::Eof => break,
                other => {
                    return Err(LocatorError::UnexpectedToken {
                        found: format!("{other:?}"),
                        at: self.at(),
                    })
                }
            }
        }
        Ok(LocatorExpr { root, chain })
    }

    fn parse_ident(&mut self) -> Result<String, LocatorError> {
        match self.bump() {
            Token::Ident(name) => Ok(name),
            Token::LBracket => Err(LocatorError::ComputedAccess),
            Token::Arrow => Err(LocatorError::FunctionLiteral),
            other => Err(LocatorError::UnexpectedToken {
                found: format!("{other:?}"),
                at: self.at(),
            }),
        }
    }

    fn parse_call_after_name(&mut self, name: String) -> Result<Call, LocatorError> {
        // Membro sem '(' é acesso a propriedade; não existe na gramática.
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if *self.peek() != Token::RParen {
            loop {
                args.push(self.parse_arg()?);
                if *self.peek() == Token::Comma {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok(Call { name, args })
    }

    fn parse_arg(&mut self) -> Result<Arg, LocatorError> {
        match self.peek() {
            Token::LBrace => Ok(Arg::Object(self.parse_object()?)),
            _ => Ok(Arg::Value(self.parse_value()?)),
        }
    }

    fn parse_object(&mut self) -> Result<ObjectLit, LocatorError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut entries = Vec::new();
        if *self.peek() != Token::RBrace {
            loop {
                let key = self.parse_ident()?;
                self.expect(Token::Colon, "':'")?;
                let value = self.parse_value()?;
                entries.push((key, value));
                if *self.peek() == Token::Comma {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RBrace, "'}'")?;
        Ok(ObjectLit { entries })
    }

    fn parse_value(&mut self) -> Result<Value, LocatorError> {
        match self.bump() {
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Num(n) => Ok(Value::Num(n)),
            Token::Regex { pattern, flags } => Ok(Value::Regex { pattern, flags }),
            Token::Ident(word) if word == "true" => Ok(Value::Bool(true)),
            Token::Ident(word) if word == "false" => Ok(Value::Bool(false)),
            // `function` e arrows em posição de valor são os dois jeitos
            // de contrabandear código; ambos têm erro dedicado.
            Token::Ident(word) if word == "function" => Err(LocatorError::FunctionLiteral),
            Token::Arrow => Err(LocatorError::FunctionLiteral),
            Token::LBracket => Err(LocatorError::ComputedAccess),
            Token::LParen => {
                // `(` em posição de valor: ou arrow `() => ...` ou grupo;
                // nenhum dos dois é permitido.
                Err(LocatorError::FunctionLiteral)
            }
            other => Err(LocatorError::UnexpectedToken {
                found: format!("{other:?}"),
                at: self.at(),
            }),
        }
    }
}

/// Parseia uma locator expression na gramática restrita.
pub fn parse(src: &str) -> Result<LocatorExpr, LocatorError> {
    let trimmed = src.trim();
    if trimmed.is_empty() {
        return Err(LocatorError::Empty);
    }
    let mut parser = Parser::new(trimmed)?;
    parser.parse_expr()
}

// ============================================================================
// TYPE-CHECK → PLANO DE RESOLUÇÃO
// ============================================================================

fn text_match_from(value: &Value, exact: bool, call: &str) -> Result<TextMatch, LocatorError> {
    match value {
        Value::Str(s) => Ok(if exact {
            TextMatch::Exact(s.clone())
        } else {
            TextMatch::Substring(s.clone())
        }),
        Value::Regex { pattern, flags } => Ok(TextMatch::Regex {
            pattern: pattern.clone(),
            flags: flags.clone(),
        }),
        other => Err(LocatorError::InvalidArguments {
            call: call.to_string(),
            detail: format!("esperava string ou regex, recebeu {other:?}"),
        }),
    }
}

fn options_of(call: &Call) -> Option<&ObjectLit> {
    call.args.iter().find_map(|a| match a {
        Arg::Object(obj) => Some(obj),
        Arg::Value(_) => None,
    })
}

fn first_value(call: &Call) -> Option<&Value> {
    call.args.iter().find_map(|a| match a {
        Arg::Value(v) => Some(v),
        Arg::Object(_) => None,
    })
}

fn exact_flag(call: &Call) -> bool {
    options_of(call)
        .and_then(|o| o.get("exact"))
        .map(|v| *v == Value::Bool(true))
        .unwrap_or(false)
}

fn plan_call(call: &Call) -> Result<LocatorOp, LocatorError> {
    let name = call.name.as_str();
    match name {
        "getByRole" => {
            let role = match first_value(call) {
                Some(Value::Str(role)) => role.clone(),
                _ => {
                    return Err(LocatorError::InvalidArguments {
                        call: name.into(),
                        detail: "primeiro argumento deve ser o role (string)".into(),
                    })
                }
            };
            let exact = exact_flag(call);
            let accessible_name = options_of(call)
                .and_then(|o| o.get("name"))
                .map(|v| text_match_from(v, exact, name))
                .transpose()?;
            Ok(LocatorOp::Role { role, name: accessible_name })
        }
        "getByText" | "getByLabel" | "getByPlaceholder" | "getByTitle" | "getByAltText" => {
            let value = first_value(call).ok_or_else(|| LocatorError::InvalidArguments {
                call: name.into(),
                detail: "argumento de texto ausente".into(),
            })?;
            let matcher = text_match_from(value, exact_flag(call), name)?;
            Ok(match name {
                "getByText" => LocatorOp::Text(matcher),
                "getByLabel" => LocatorOp::Label(matcher),
                "getByPlaceholder" => LocatorOp::Placeholder(matcher),
                "getByTitle" => LocatorOp::Title(matcher),
                _ => LocatorOp::AltText(matcher),
            })
        }
        "getByTestId" => match first_value(call) {
            Some(Value::Str(id)) => Ok(LocatorOp::TestId(id.clone())),
            _ => Err(LocatorError::InvalidArguments {
                call: name.into(),
                detail: "test id deve ser string".into(),
            }),
        },
        "locator" => match first_value(call) {
            Some(Value::Str(css)) => Ok(LocatorOp::Css(css.clone())),
            _ => Err(LocatorError::InvalidArguments {
                call: name.into(),
                detail: "seletor deve ser string".into(),
            }),
        },
        "filter" => {
            let has_text = options_of(call)
                .and_then(|o| o.get("hasText"))
                .ok_or_else(|| LocatorError::InvalidArguments {
                    call: name.into(),
                    detail: "filter exige { hasText }".into(),
                })?;
            Ok(LocatorOp::Filter {
                has_text: text_match_from(has_text, false, name)?,
            })
        }
        "first" => Ok(LocatorOp::First),
        "last" => Ok(LocatorOp::Last),
        "nth" => match first_value(call) {
            Some(Value::Num(n)) if *n >= 0.0 => Ok(LocatorOp::Nth(*n as usize)),
            _ => Err(LocatorError::InvalidArguments {
                call: name.into(),
                detail: "nth exige índice não-negativo".into(),
            }),
        },
        other => Err(LocatorError::UnknownMember { name: other.into() }),
    }
}

impl LocatorExpr {
    /// Type-checka a expressão e produz o plano de resolução.
    pub fn plan(&self) -> Result<ResolutionPlan, LocatorError> {
        let ops = self.calls().map(plan_call).collect::<Result<Vec<_>, _>>()?;
        Ok(ResolutionPlan { ops })
    }
}

/// Parse + plan em um passo: a forma que o browser facade consome.
pub fn compile(src: &str) -> Result<ResolutionPlan, LocatorError> {
    parse(src)?.plan()
}

// ============================================================================
// RENDER (VOLTA PARA TEXTO CANÔNICO)
// ============================================================================

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", quote(s)),
            Self::Num(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Bool(b) => write!(f, "{b}"),
            Self::Regex { pattern, flags } => write!(f, "/{pattern}/{flags}"),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                Arg::Value(v) => write!(f, "{v}")?,
                Arg::Object(obj) => {
                    write!(f, "{{ ")?;
                    for (j, (key, value)) in obj.entries.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{key}: {value}")?;
                    }
                    write!(f, " }}")?;
                }
            }
        }
        write!(f, ")")
    }
}

impl fmt::Display for LocatorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for call in &self.chain {
            write!(f, ".{call}")?;
        }
        Ok(())
    }
}

// ============================================================================
// FATOS DE UM TARGET
// ============================================================================

/// Role do alvo, quando o tipo de target o expõe (role-engine ou
/// expressão com getByRole).
pub fn target_role(target: &crate::protocol::Target) -> Option<String> {
    match target.kind {
        crate::protocol::TargetKind::RoleEngine => {
            let value = target.value.trim();
            Some(value.split_whitespace().next().unwrap_or(value).to_string())
        }
        crate::protocol::TargetKind::LocatorExpression => match compile(&target.value) {
            Ok(plan) => plan.ops.iter().find_map(|op| match op {
                LocatorOp::Role { role, .. } => Some(role.clone()),
                _ => None,
            }),
            Err(_) => None,
        },
        _ => None,
    }
}

/// Texto acessível literal carregado pelo target, quando houver
/// (nome de role, texto de getByText/label/filter, text-selector).
pub fn target_accessible_text(target: &crate::protocol::Target) -> Option<String> {
    match target.kind {
        crate::protocol::TargetKind::TextSelector => Some(target.value.clone()),
        crate::protocol::TargetKind::RoleEngine => target
            .value
            .split_once(' ')
            .map(|(_, name)| name.trim().trim_matches('"').to_string())
            .filter(|name| !name.is_empty()),
        crate::protocol::TargetKind::LocatorExpression => {
            let plan = compile(&target.value).ok()?;
            let mut parts = Vec::new();
            for op in &plan.ops {
                match op {
                    LocatorOp::Role { name: Some(m), .. }
                    | LocatorOp::Text(m)
                    | LocatorOp::Label(m)
                    | LocatorOp::Placeholder(m)
                    | LocatorOp::Title(m)
                    | LocatorOp::AltText(m)
                    | LocatorOp::Filter { has_text: m } => {
                        if let Some(text) = m.literal() {
                            parts.push(text.to_string());
                        }
                    }
                    _ => {}
                }
            }
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        _ => None,
    }
}

/// True quando a expressão do target carrega `exact: true`.
pub fn target_has_exact_true(target: &crate::protocol::Target) -> bool {
    target.kind == crate::protocol::TargetKind::LocatorExpression
        && parse(&target.value)
            .ok()
            .map(|expr| {
                expr.calls().any(|call| {
                    call.args.iter().any(|arg| match arg {
                        Arg::Object(obj) => obj.get("exact") == Some(&Value::Bool(true)),
                        Arg::Value(_) => false,
                    })
                })
            })
            .unwrap_or(false)
}

/// Escapa metacaracteres para embutir texto literal em um regex.
pub fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\^$.|?*+()[]{}/".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_with_options() {
        let expr = parse("getByRole('link', { name: 'Vluchten update', exact: true })").unwrap();
        assert_eq!(expr.root.name, "getByRole");
        let plan = expr.plan().unwrap();
        assert_eq!(
            plan.ops,
            vec![LocatorOp::Role {
                role: "link".into(),
                name: Some(TextMatch::Exact("Vluchten update".into())),
            }]
        );
    }

    #[test]
    fn parses_chain_with_filter_and_nth() {
        let plan = compile("getByText('Welkom').filter({ hasText: /update/i }).nth(2)").unwrap();
        assert_eq!(plan.ops.len(), 3);
        assert_eq!(plan.ops[2], LocatorOp::Nth(2));
        match &plan.ops[1] {
            LocatorOp::Filter { has_text: TextMatch::Regex { pattern, flags } } => {
                assert_eq!(pattern, "update");
                assert_eq!(flags, "i");
            }
            other => panic!("esperava filter, veio {other:?}"),
        }
    }

    #[test]
    fn accepts_page_prefix() {
        let expr = parse("page.getByTestId('submit-button')").unwrap();
        assert_eq!(expr.plan().unwrap().ops, vec![LocatorOp::TestId("submit-button".into())]);
    }

    #[test]
    fn rejects_process_exit() {
        let err = parse("process.exit(1)").unwrap_err();
        assert_eq!(err, LocatorError::UnsupportedRoot { name: "process".into() });
    }

    #[test]
    fn rejects_computed_access() {
        let err = parse("getByRole('link')[0]").unwrap_err();
        assert_eq!(err, LocatorError::ComputedAccess);
    }

    #[test]
    fn rejects_function_literals() {
        let err = parse("getByText('x').filter({ hasText: () => true })").unwrap_err();
        assert_eq!(err, LocatorError::FunctionLiteral);
        let err = parse("getByText(function() {})").unwrap_err();
        assert_eq!(err, LocatorError::FunctionLiteral);
    }

    #[test]
    fn rejects_unknown_members() {
        let err = parse("getByRole('link').evaluate('x')").unwrap_err();
        assert_eq!(err, LocatorError::UnknownMember { name: "evaluate".into() });
    }

    #[test]
    fn render_round_trips_canonical_form() {
        let src = "getByRole('link', { name: 'Update 12:30', exact: true }).first()";
        let expr = parse(src).unwrap();
        assert_eq!(expr.to_string(), src);
    }

    #[test]
    fn render_quotes_and_escapes() {
        let expr = parse("getByText('it\\'s here')").unwrap();
        assert_eq!(expr.to_string(), "getByText('it\\'s here')");
    }

    #[test]
    fn text_match_semantics() {
        assert!(TextMatch::Substring("welkom".into()).matches("  Welkom   terug "));
        assert!(TextMatch::Exact("Welkom terug".into()).matches("Welkom  terug"));
        assert!(!TextMatch::Exact("Welkom".into()).matches("Welkom terug"));
        assert!(TextMatch::Regex { pattern: "upd.te".into(), flags: "i".into() }.matches("UPDATE"));
    }

    #[test]
    fn escape_regex_covers_metacharacters() {
        assert_eq!(escape_regex("a.b*c"), "a\\.b\\*c");
        assert_eq!(escape_regex("12:30"), "12:30");
    }
}
