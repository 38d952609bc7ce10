// Module: Loader
// Reads test YAML into the domain model and writes it back in a
// deterministic, fully quoted form.

use std::fs;
use std::path::Path;

use crate::errors::ImproveError;
use crate::protocol::{Step, Target, TargetKind, TargetSource, TestFile};

/// Root keys accepted on the document. Everything else is rejected:
/// steps tolerate unknown keys, the root does not.
const ROOT_KEYS: &[&str] = &["name", "description", "baseUrl", "steps"];

/// Keys removed from the format. Each carries migration guidance.
const DEPRECATED_KEYS: &[(&str, &str)] = &[
    ("optional", "remova a chave; steps opcionais viraram remoção automática pelo classificador de falhas de runtime"),
    ("llm", "remova a chave; a seleção de provider saiu do arquivo de teste"),
    ("improveProvider", "remova a chave; use a flag --assertion-source do improve"),
];

/// Loads and parses a test file from disk.
pub fn test_from_file<P: AsRef<Path>>(path: P) -> Result<TestFile, ImproveError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ImproveError::User {
                message: format!("arquivo de teste não encontrado: {}", path.display()),
            }
        } else {
            ImproveError::Io(e)
        }
    })?;
    test_from_yaml(&content)
}

/// Parses test YAML. Collects every deprecated/unknown-key problem
/// before failing so the user fixes the file in one round.
pub fn test_from_yaml(text: &str) -> Result<TestFile, ImproveError> {
    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| ImproveError::Validation {
        issues: vec![format!("YAML inválido: {e}")],
    })?;

    let mut issues = Vec::new();
    prescan(&value, &mut issues);
    if !issues.is_empty() {
        return Err(ImproveError::Validation { issues });
    }

    serde_yaml::from_value(value).map_err(|e| ImproveError::Validation {
        issues: vec![format!("estrutura inválida: {e}")],
    })
}

/// Rejects deprecated keys (with migration guidance) and unknown root
/// keys before handing the document to serde.
fn prescan(value: &serde_yaml::Value, issues: &mut Vec<String>) {
    let Some(root) = value.as_mapping() else {
        issues.push("raiz do documento deve ser um mapping".to_string());
        return;
    };

    for key in root.keys() {
        let Some(key) = key.as_str() else { continue };
        if let Some((_, guidance)) = DEPRECATED_KEYS.iter().find(|(k, _)| *k == key) {
            issues.push(format!("chave deprecated '{key}' na raiz: {guidance}"));
        } else if !ROOT_KEYS.contains(&key) {
            issues.push(format!("chave desconhecida '{key}' na raiz do documento"));
        }
    }

    let Some(steps) = root.get("steps").and_then(|s| s.as_sequence()) else {
        return;
    };
    for (i, step) in steps.iter().enumerate() {
        let Some(map) = step.as_mapping() else { continue };
        for key in map.keys() {
            let Some(key) = key.as_str() else { continue };
            if let Some((_, guidance)) = DEPRECATED_KEYS.iter().find(|(k, _)| *k == key) {
                issues.push(format!("steps[{i}]: chave deprecated '{key}': {guidance}"));
            }
            // Outras chaves extras em steps são toleradas em silêncio.
        }
    }
}

// ---------------------------------------------------------------------------
// Deterministic writer
// ---------------------------------------------------------------------------
// Key order is fixed (name, description?, baseUrl?, steps; inside a step:
// action, url/target, data scalar, description), every string is quoted,
// and arrays keep their order. Width stays under 120 because scalars are
// never folded. serde_yaml's emitter guarantees none of this, so the
// writer is explicit.

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn kind_str(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::RoleEngine => "role-engine",
        TargetKind::LocatorExpression => "locatorExpression",
        TargetKind::PlaywrightSelector => "playwrightSelector",
        TargetKind::TextSelector => "text-selector",
        TargetKind::Css => "css",
        TargetKind::Xpath => "xpath",
        TargetKind::Internal => "internal",
    }
}

fn source_str(source: TargetSource) -> &'static str {
    match source {
        TargetSource::Manual => "manual",
        TargetSource::CodegenJsonl => "codegen-jsonl",
        TargetSource::CodegenFallback => "codegen-fallback",
        TargetSource::Derived => "derived",
    }
}

fn push_target(out: &mut String, target: &Target, indent: &str) {
    out.push_str(&format!("{indent}target:\n"));
    let inner = format!("{indent}  ");
    out.push_str(&format!("{inner}value: {}\n", quote(&target.value)));
    out.push_str(&format!("{inner}kind: {}\n", quote(kind_str(target.kind))));
    out.push_str(&format!("{inner}source: {}\n", quote(source_str(target.source))));
    if let Some(frames) = &target.frame_path {
        if !frames.is_empty() {
            out.push_str(&format!("{inner}framePath:\n"));
            for frame in frames {
                out.push_str(&format!("{inner}  - {}\n", quote(frame)));
            }
        }
    }
    if let Some(raw) = &target.raw {
        out.push_str(&format!("{inner}raw: {}\n", quote(raw)));
    }
    if let Some(confidence) = target.confidence {
        out.push_str(&format!("{inner}confidence: {confidence}\n"));
    }
    if let Some(warning) = &target.warning {
        out.push_str(&format!("{inner}warning: {}\n", quote(warning)));
    }
}

fn push_step(out: &mut String, step: &Step) {
    const HEAD: &str = "  - ";
    const BODY: &str = "    ";
    out.push_str(&format!("{HEAD}action: {}\n", quote(step.action())));

    let description = match step {
        Step::Navigate { url, description } => {
            out.push_str(&format!("{BODY}url: {}\n", quote(url)));
            description
        }
        Step::Click { target, description }
        | Step::Hover { target, description }
        | Step::Check { target, description }
        | Step::Uncheck { target, description }
        | Step::AssertVisible { target, description } => {
            push_target(out, target, BODY);
            description
        }
        Step::Fill { target, text, description } | Step::AssertText { target, text, description } => {
            push_target(out, target, BODY);
            out.push_str(&format!("{BODY}text: {}\n", quote(text)));
            description
        }
        Step::Press { target, key, description } => {
            push_target(out, target, BODY);
            out.push_str(&format!("{BODY}key: {}\n", quote(key)));
            description
        }
        Step::Select { target, value, description }
        | Step::AssertValue { target, value, description } => {
            push_target(out, target, BODY);
            out.push_str(&format!("{BODY}value: {}\n", quote(value)));
            description
        }
        Step::AssertChecked { target, checked, description } => {
            push_target(out, target, BODY);
            out.push_str(&format!("{BODY}checked: {checked}\n"));
            description
        }
    };

    if let Some(description) = description {
        out.push_str(&format!("{BODY}description: {}\n", quote(description)));
    }
}

/// Serializes the test in canonical form.
pub fn test_to_yaml(test: &TestFile) -> String {
    let mut out = String::new();
    out.push_str(&format!("name: {}\n", quote(&test.name)));
    if let Some(description) = &test.description {
        out.push_str(&format!("description: {}\n", quote(description)));
    }
    if let Some(base_url) = &test.base_url {
        out.push_str(&format!("baseUrl: {}\n", quote(base_url)));
    }
    out.push_str("steps:\n");
    for step in &test.steps {
        push_step(&mut out, step);
    }
    out
}
