use crate::error::{TrajError, TrajResult};

/// Atom selection used to subset coordinates before metric evaluation.
///
/// An empty mask selects every atom of the trajectory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomMask {
    pub indices: Vec<u32>,
}

impl AtomMask {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_indices(indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.indices.is_empty()
    }

    /// Resolves the mask against a concrete atom count.
    pub fn resolve(&self, n_atoms: usize) -> TrajResult<ResolvedMask> {
        if self.indices.is_empty() {
            return Ok(ResolvedMask {
                indices: (0..n_atoms).collect(),
            });
        }
        let mut indices = Vec::with_capacity(self.indices.len());
        for &idx in &self.indices {
            let atom = idx as usize;
            if atom >= n_atoms {
                return Err(TrajError::InvalidSelection(format!(
                    "mask index {idx} out of bounds for trajectory with {n_atoms} atoms"
                )));
            }
            indices.push(atom);
        }
        indices.sort_unstable();
        indices.dedup();
        Ok(ResolvedMask { indices })
    }
}

/// Sorted, deduplicated atom indices valid for one atom count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMask {
    indices: Vec<usize>,
}

impl ResolvedMask {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn gather(&self, frame: &[[f32; 4]]) -> Vec<[f32; 4]> {
        self.indices.iter().map(|&i| frame[i]).collect()
    }
}
