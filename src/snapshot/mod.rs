//! # Módulo de Snapshot - Árvore de Acessibilidade Textual
//!
//! O browser facade serializa a árvore de acessibilidade em um formato
//! textual estável, uma linha por nó, indentação de 2 espaços por nível:
//!
//! ```text
//! - banner
//!   - link "Home"
//!   - button "Alles accepteren"
//! - main
//!   - heading "Welkom terug" [level=1]
//!   - textbox "Naam": "Alice"
//! ```
//!
//! Este módulo parseia esse formato de volta para nós estruturados,
//! computa o delta estrutural entre dois snapshots (nós presentes no
//! pós mas não no pré) e classifica saliência para o gerador de
//! inventário.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Um nó parseado do snapshot textual.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    /// Profundidade na árvore (0 = raiz).
    pub depth: usize,
    /// Role de acessibilidade (heading, button, link, ...).
    pub role: String,
    /// Nome acessível; vazio quando o nó não tem nome.
    pub name: String,
    /// Value associado (campos de formulário).
    pub value: Option<String>,
}

impl SnapshotNode {
    /// Chave estrutural usada no delta: role + nome + value.
    fn key(&self) -> (String, String, Option<String>) {
        (self.role.clone(), self.name.clone(), self.value.clone())
    }
}

static NODE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    // `  - role "name" [attrs]: "value"`: name, attrs e value opcionais.
    Regex::new(r#"^(?P<indent>\s*)-\s+(?P<role>[A-Za-z][A-Za-z0-9_-]*)(?:\s+"(?P<name>(?:[^"\\]|\\.)*)")?(?:\s+\[[^\]]*\])?(?::\s+"(?P<value>(?:[^"\\]|\\.)*)")?\s*:?\s*$"#)
        .expect("valid snapshot line regex")
});

fn unescape(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// Parseia um snapshot textual em nós. Linhas fora do formato são
/// ignoradas em silêncio (tolerância a formatos futuros).
pub fn parse(snapshot: &str) -> Vec<SnapshotNode> {
    let mut nodes = Vec::new();
    for line in snapshot.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(caps) = NODE_LINE_RE.captures(line) else {
            continue;
        };
        let indent = caps.name("indent").map(|m| m.as_str().len()).unwrap_or(0);
        nodes.push(SnapshotNode {
            depth: indent / 2,
            role: caps["role"].to_string(),
            name: caps.name("name").map(|m| unescape(m.as_str())).unwrap_or_default(),
            value: caps.name("value").map(|m| unescape(m.as_str())),
        });
    }
    nodes
}

/// Delta estrutural: nós do pós-snapshot sem correspondente no pré.
///
/// Comparação por multiconjunto de chaves (role, nome, value): um nó
/// que aparece duas vezes no pós e uma no pré conta uma vez no delta.
/// A ordem do pós é preservada.
pub fn delta(pre: &str, post: &str) -> Vec<SnapshotNode> {
    let mut seen: HashMap<(String, String, Option<String>), usize> = HashMap::new();
    for node in parse(pre) {
        *seen.entry(node.key()).or_insert(0) += 1;
    }
    let mut added = Vec::new();
    for node in parse(post) {
        match seen.get_mut(&node.key()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => added.push(node),
        }
    }
    added
}

/// Roles salientes para o gerador de inventário, em ordem de
/// preferência. Heading primeiro: é o que usuários de verdade olham
/// para saber se a ação funcionou.
const SALIENT_ROLES: &[&str] = &["heading", "status", "alert", "dialog", "navigation"];

/// Posição de saliência do role, menor é melhor. None = não saliente.
pub fn salience_rank(role: &str) -> Option<usize> {
    SALIENT_ROLES.iter().position(|r| *r == role)
}

/// Texto composto só de dígitos e pontuação numérica (contadores,
/// badges). Inútil como assertion: muda a cada visita.
pub fn is_purely_numeric(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ':' | '%' | '+' | '-' | ' '))
        && trimmed.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PRE: &str = r#"
- banner
  - link "Home"
- main
  - textbox "Naam": "Alice"
"#;

    const POST: &str = r#"
- banner
  - link "Home"
- main
  - textbox "Naam": "Alice"
  - heading "Welkom Alice" [level=1]
  - status "Opgeslagen"
"#;

    #[test]
    fn parses_roles_names_and_values() {
        let nodes = parse(POST);
        assert_eq!(nodes.len(), 6);
        assert_eq!(nodes[0].role, "banner");
        assert_eq!(nodes[0].depth, 0);
        assert_eq!(nodes[1].role, "link");
        assert_eq!(nodes[1].name, "Home");
        assert_eq!(nodes[1].depth, 1);
        assert_eq!(nodes[3].value.as_deref(), Some("Alice"));
        assert_eq!(nodes[4].name, "Welkom Alice");
    }

    #[test]
    fn delta_returns_only_new_nodes_in_order() {
        let added = delta(PRE, POST);
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].role, "heading");
        assert_eq!(added[0].name, "Welkom Alice");
        assert_eq!(added[1].role, "status");
    }

    #[test]
    fn delta_is_multiset_aware() {
        let pre = "- listitem \"x\"\n";
        let post = "- listitem \"x\"\n- listitem \"x\"\n";
        let added = delta(pre, post);
        assert_eq!(added.len(), 1);
    }

    #[test]
    fn identical_snapshots_have_empty_delta() {
        assert!(delta(POST, POST).is_empty());
    }

    #[test]
    fn salience_ordering() {
        assert_eq!(salience_rank("heading"), Some(0));
        assert_eq!(salience_rank("navigation"), Some(4));
        assert_eq!(salience_rank("paragraph"), None);
    }

    #[test]
    fn purely_numeric_detection() {
        assert!(is_purely_numeric("1.234"));
        assert!(is_purely_numeric("12:30"));
        assert!(is_purely_numeric(" 42 "));
        assert!(!is_purely_numeric("42 resultaten"));
        assert!(!is_purely_numeric(""));
        assert!(!is_purely_numeric("--"));
    }
}
