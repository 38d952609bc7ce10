//! # Módulo de Index Map - Bijeção runtime ↔ original
//!
//! Fonte única de verdade para a bijeção runtimeIndex ↔ originalIndex.
//!
//! ## Por que isso existe?
//!
//! Findings, candidatos e snapshots guardam SÓ índices (nada de
//! referências cíclicas entre structs). Quando o array de steps muta
//! (remoção de assertions stale, remoção de steps que falharam), este
//! mapa é reconstruído e tudo é remapeado através dele.
//!
//! Quebrar a bijeção é violação de invariante FATAL, não erro
//! recuperável: um relatório com índice errado é pior que nenhum
//! relatório.

use crate::errors::ImproveError;
use crate::protocol::StepSnapshot;

/// Injeção runtimeIndex → originalIndex. Densa sobre o array runtime
/// atual de steps; a inversa é total na imagem.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMap {
    runtime_to_original: Vec<usize>,
}

impl IndexMap {
    /// Mapa identidade sobre `len` steps (nenhuma remoção ainda).
    pub fn identity(len: usize) -> Self {
        Self { runtime_to_original: (0..len).collect() }
    }

    /// Constrói o mapa inicial após a remoção de assertions stale.
    /// `stale` carrega os índices ORIGINAIS que caíram.
    pub fn after_remove_stale(original_len: usize, stale: &[usize]) -> Self {
        let runtime_to_original = (0..original_len)
            .filter(|i| !stale.contains(i))
            .collect();
        Self { runtime_to_original }
    }

    /// Steps vivos no momento.
    pub fn len(&self) -> usize {
        self.runtime_to_original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtime_to_original.is_empty()
    }

    /// Mapeia um índice runtime de volta ao índice original do arquivo.
    pub fn to_original(&self, runtime: usize) -> Result<usize, ImproveError> {
        self.runtime_to_original.get(runtime).copied().ok_or_else(|| {
            ImproveError::invariant(
                "index_bijection",
                format!(
                    "runtime {} fora do mapa (len {})",
                    runtime,
                    self.runtime_to_original.len()
                ),
            )
        })
    }

    /// Mapeia um índice original para a posição runtime atual, se o
    /// step sobreviveu.
    pub fn to_runtime(&self, original: usize) -> Option<usize> {
        self.runtime_to_original.iter().position(|&o| o == original)
    }

    /// Aplica uma remoção de steps que falharam: tira os índices
    /// RUNTIME removidos, em ordem reversa para as posições anteriores
    /// continuarem válidas.
    pub fn remove_runtime_indexes(&mut self, removed: &[usize]) -> Result<(), ImproveError> {
        let mut sorted: Vec<usize> = removed.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for &runtime in sorted.iter().rev() {
            if runtime >= self.runtime_to_original.len() {
                return Err(ImproveError::invariant(
                    "index_bijection",
                    format!("remoção de runtime {} além do mapa", runtime),
                ));
            }
            self.runtime_to_original.remove(runtime);
        }
        Ok(())
    }

    /// Checa o invariante da bijeção: originais estritamente
    /// crescentes, todos dentro dos limites do arquivo original.
    pub fn verify(&self, original_len: usize) -> Result<(), ImproveError> {
        for window in self.runtime_to_original.windows(2) {
            if window[0] >= window[1] {
                return Err(ImproveError::invariant(
                    "index_bijection",
                    format!("originais fora de ordem: {} depois de {}", window[1], window[0]),
                ));
            }
        }
        if let Some(&max) = self.runtime_to_original.last() {
            if max >= original_len {
                return Err(ImproveError::invariant(
                    "index_bijection",
                    format!("original {} além do arquivo ({} steps)", max, original_len),
                ));
            }
        }
        Ok(())
    }
}

/// Remapeia os índices runtime dos snapshots após uma remoção: cada
/// índice sobrevivente desce pelo número de remoções antes dele;
/// snapshots de steps removidos caem.
pub fn remap_snapshot_indexes(
    snapshots: Vec<StepSnapshot>,
    removed_runtime: &[usize],
) -> Vec<StepSnapshot> {
    let mut sorted: Vec<usize> = removed_runtime.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    snapshots
        .into_iter()
        .filter(|s| !sorted.contains(&s.runtime_index))
        .map(|mut s| {
            let shift = sorted.iter().filter(|&&r| r < s.runtime_index).count();
            s.runtime_index -= shift;
            s
        })
        .collect()
}
