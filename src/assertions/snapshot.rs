//! # Gerador de Assertions por Snapshot (C12)
//!
//! Dois modos sobre a árvore de acessibilidade:
//!
//! - **delta (C12a)**: nós presentes no pós-snapshot mas não no pré
//!   viram candidatos: `assertVisible` para roles salientes,
//!   `assertText` para o resto. Exclui nós cujo texto é o nome do
//!   próprio alvo acionado (tautologia) ou puramente numérico
//!   (contador).
//! - **inventário (C12b)**: só para steps de cobertura que ficaram sem
//!   candidato não-fallback: pega até dois nós salientes estáveis do
//!   pós-snapshot (heading, status, navigation, dialog), confiança
//!   0.79, marcados coverage_fallback.
//!
//! Todos os candidatos passam por dedup por
//! (step, action, target.value, escalar auxiliar) no chamador.

use crate::errors::ImproveError;
use crate::index_map::IndexMap;
use crate::locator::target_accessible_text;
use crate::protocol::{
    ApplyStatus, AssertionCandidate, CandidateSource, Step, StepSnapshot, Target, TargetKind,
    TargetSource,
};
use crate::snapshot::{self, SnapshotNode};

use super::{INVENTORY_CONFIDENCE, SNAPSHOT_TEXT_CONFIDENCE, SNAPSHOT_VISIBLE_CONFIDENCE};

fn role_engine_target(node: &SnapshotNode) -> Target {
    Target::new(
        format!("{} \"{}\"", node.role, node.name),
        TargetKind::RoleEngine,
        TargetSource::Derived,
    )
}

fn base_candidate(
    index: usize,
    after: &Step,
    step: Step,
    confidence: f64,
    rationale: String,
    source: CandidateSource,
    coverage_fallback: bool,
) -> AssertionCandidate {
    AssertionCandidate {
        index,
        after_action: after.action().to_string(),
        candidate: step,
        confidence,
        rationale,
        coverage_fallback: coverage_fallback.then_some(true),
        stability_score: confidence,
        volatility_flags: vec![],
        candidate_source: source,
        apply_status: ApplyStatus::NotRequested,
        apply_message: None,
    }
}

/// Um nó serve de assertion quando tem nome, o nome não é numérico
/// puro e não repete o nome do alvo acionado.
fn node_is_stable(node: &SnapshotNode, acted_name: Option<&str>) -> bool {
    if node.name.is_empty() || snapshot::is_purely_numeric(&node.name) {
        return false;
    }
    match acted_name {
        Some(acted) => !node.name.eq_ignore_ascii_case(acted),
        None => true,
    }
}

/// Gera candidatos a partir dos deltas pré/pós de cada step de
/// cobertura que tem snapshot.
pub fn generate_delta(
    runtime_steps: &[Step],
    snapshots: &[StepSnapshot],
    index_map: &IndexMap,
    source: CandidateSource,
) -> Result<Vec<AssertionCandidate>, ImproveError> {
    let mut candidates = Vec::new();

    for snap in snapshots {
        let Some(step) = runtime_steps.get(snap.runtime_index) else {
            return Err(ImproveError::invariant(
                "snapshot_index",
                format!("snapshot aponta runtime {} fora do array", snap.runtime_index),
            ));
        };
        if !step.is_coverage() {
            continue;
        }
        let (Some(pre), Some(post)) = (&snap.pre, &snap.post) else {
            continue;
        };
        let original_index = index_map.to_original(snap.runtime_index)?;
        let acted_name = step.target().and_then(target_accessible_text);

        for node in snapshot::delta(pre, post) {
            if !node_is_stable(&node, acted_name.as_deref()) {
                continue;
            }
            let target = role_engine_target(&node);
            if snapshot::salience_rank(&node.role).is_some() {
                candidates.push(base_candidate(
                    original_index,
                    step,
                    Step::AssertVisible { target, description: None },
                    SNAPSHOT_VISIBLE_CONFIDENCE,
                    format!("nó {} \"{}\" surgiu após a interação", node.role, node.name),
                    source,
                    false,
                ));
            } else {
                candidates.push(base_candidate(
                    original_index,
                    step,
                    Step::AssertText {
                        target,
                        text: node.name.clone(),
                        description: None,
                    },
                    SNAPSHOT_TEXT_CONFIDENCE,
                    format!("texto \"{}\" surgiu após a interação", node.name),
                    source,
                    false,
                ));
            }
        }
    }

    Ok(candidates)
}

/// Inventário de cobertura: até dois nós salientes do pós-snapshot,
/// para steps que ficaram sem candidato não-fallback.
pub fn generate_inventory(
    step: &Step,
    runtime_index: usize,
    post: &str,
    index_map: &IndexMap,
    source: CandidateSource,
) -> Result<Vec<AssertionCandidate>, ImproveError> {
    let original_index = index_map.to_original(runtime_index)?;
    let acted_name = step.target().and_then(target_accessible_text);

    let mut salient: Vec<SnapshotNode> = snapshot::parse(post)
        .into_iter()
        .filter(|node| snapshot::salience_rank(&node.role).is_some())
        .filter(|node| node_is_stable(node, acted_name.as_deref()))
        .collect();
    // Ordena por saliência, estável na ordem do documento.
    salient.sort_by_key(|node| snapshot::salience_rank(&node.role).unwrap_or(usize::MAX));
    salient.truncate(2);

    Ok(salient
        .into_iter()
        .map(|node| {
            base_candidate(
                original_index,
                step,
                Step::AssertVisible { target: role_engine_target(&node), description: None },
                INVENTORY_CONFIDENCE,
                format!("inventário: nó saliente {} \"{}\" no pós-estado", node.role, node.name),
                source,
                true,
            )
        })
        .collect())
}

/// Dedup por (step, action, target.value, escalar auxiliar),
/// preservando a primeira ocorrência.
pub fn dedup(candidates: Vec<AssertionCandidate>) -> Vec<AssertionCandidate> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for candidate in candidates {
        let key = candidate.dedup_key();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(candidate);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TargetSource;

    fn click(value: &str) -> Step {
        Step::Click {
            target: Target::new(value, TargetKind::Css, TargetSource::Manual),
            description: None,
        }
    }

    const PRE: &str = "- banner\n  - link \"Home\"\n";
    const POST: &str = "- banner\n  - link \"Home\"\n- heading \"Welkom Alice\"\n- paragraph \"Je bent ingelogd\"\n- status \"3\"\n";

    fn snap(runtime_index: usize, pre: &str, post: &str) -> StepSnapshot {
        StepSnapshot {
            runtime_index,
            pre: Some(pre.to_string()),
            post: Some(post.to_string()),
        }
    }

    #[test]
    fn delta_emits_visible_for_salient_and_text_for_rest() {
        let steps = vec![click("#go")];
        let candidates = generate_delta(
            &steps,
            &[snap(0, PRE, POST)],
            &IndexMap::identity(1),
            CandidateSource::SnapshotNative,
        )
        .unwrap();
        // heading → assertVisible; paragraph → assertText; status "3" é
        // numérico puro e cai fora.
        assert_eq!(candidates.len(), 2);
        assert!(matches!(candidates[0].candidate, Step::AssertVisible { .. }));
        assert_eq!(candidates[0].confidence, SNAPSHOT_VISIBLE_CONFIDENCE);
        assert_eq!(
            candidates[0].candidate.target().unwrap().value,
            "heading \"Welkom Alice\""
        );
        assert!(matches!(candidates[1].candidate, Step::AssertText { .. }));
        assert_eq!(candidates[1].confidence, SNAPSHOT_TEXT_CONFIDENCE);
        assert_eq!(candidates[1].candidate_source, CandidateSource::SnapshotNative);
    }

    #[test]
    fn delta_excludes_acted_target_name() {
        let steps = vec![Step::Click {
            target: Target::new(
                "getByRole('button', { name: 'Welkom Alice' })",
                TargetKind::LocatorExpression,
                TargetSource::Manual,
            ),
            description: None,
        }];
        let candidates = generate_delta(
            &steps,
            &[snap(0, PRE, POST)],
            &IndexMap::identity(1),
            CandidateSource::SnapshotNative,
        )
        .unwrap();
        assert!(candidates
            .iter()
            .all(|c| c.candidate.target().unwrap().value != "heading \"Welkom Alice\""));
    }

    #[test]
    fn non_coverage_steps_are_ignored() {
        let steps = vec![Step::Navigate { url: "/".into(), description: None }];
        let candidates = generate_delta(
            &steps,
            &[snap(0, PRE, POST)],
            &IndexMap::identity(1),
            CandidateSource::SnapshotNative,
        )
        .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn inventory_picks_two_salient_by_rank() {
        let post = "- navigation \"Hoofdmenu\"\n- heading \"Overzicht\"\n- status \"Opgeslagen\"\n";
        let step = click("#save");
        let candidates = generate_inventory(
            &step,
            0,
            post,
            &IndexMap::identity(1),
            CandidateSource::SnapshotNative,
        )
        .unwrap();
        assert_eq!(candidates.len(), 2);
        // heading (rank 0) vence navigation (rank 4); status (rank 1) em
        // segundo.
        assert_eq!(candidates[0].candidate.target().unwrap().value, "heading \"Overzicht\"");
        assert_eq!(candidates[1].candidate.target().unwrap().value, "status \"Opgeslagen\"");
        assert!(candidates.iter().all(|c| c.coverage_fallback == Some(true)));
        assert!(candidates.iter().all(|c| c.confidence == INVENTORY_CONFIDENCE));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let steps = vec![click("#go")];
        let mut candidates = generate_delta(
            &steps,
            &[snap(0, PRE, POST)],
            &IndexMap::identity(1),
            CandidateSource::SnapshotNative,
        )
        .unwrap();
        let duplicated = candidates.clone();
        candidates.extend(duplicated);
        let deduped = dedup(candidates);
        assert_eq!(deduped.len(), 2);
    }
}
