//! Partitioning strategies over a [`DistanceMatrix`].
//!
//! Every strategy labels the matrix's frames `0..n_frames()` with contiguous
//! cluster ids starting at 0; density-based clustering may also emit
//! [`NOISE`]. Ids are local to the retained frames; the projector maps them
//! back onto the full trajectory.

mod dbscan;
mod hierarchical;
mod kmeans;

use crate::config::AlgorithmConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::pairwise::DistanceMatrix;
use crate::streaming::StreamEmitter;

pub const NOISE: i32 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub labels: Vec<i32>,
    pub n_clusters: usize,
    pub iterations: usize,
    pub converged: bool,
}

impl Assignment {
    pub(crate) fn single(n_frames: usize) -> Self {
        Self {
            labels: vec![0; n_frames],
            n_clusters: 1,
            iterations: 0,
            converged: true,
        }
    }
}

pub trait ClusterAlgorithm {
    fn name(&self) -> &'static str;
    /// Matrix-sized scratch copies `assign` allocates on top of the input.
    fn working_matrices(&self) -> usize {
        0
    }
    fn assign(
        &self,
        distances: &DistanceMatrix,
        emitter: &StreamEmitter,
    ) -> ClusterResult<Assignment>;
}

impl AlgorithmConfig {
    pub fn assigner(&self) -> &dyn ClusterAlgorithm {
        match self {
            AlgorithmConfig::Kmeans(p) => p,
            AlgorithmConfig::Hierarchical(p) => p,
            AlgorithmConfig::Dbscan(p) => p,
        }
    }
}

pub(crate) fn check_frames(name: &str, n_frames: usize) -> ClusterResult<()> {
    if n_frames == 0 {
        return Err(ClusterError::EmptyInput(format!(
            "{name} clustering received no frames"
        )));
    }
    Ok(())
}

pub(crate) fn check_cluster_count(
    name: &str,
    n_clusters: usize,
    n_frames: usize,
) -> ClusterResult<()> {
    if n_clusters == 0 || n_clusters > n_frames {
        return Err(ClusterError::InvalidParameter(format!(
            "{name} requested {n_clusters} clusters for {n_frames} frames"
        )));
    }
    Ok(())
}

/// Member minimizing the summed distance to the other members; ties go to
/// the lowest frame index.
pub fn medoid(members: &[usize], distances: &DistanceMatrix) -> Option<usize> {
    let mut best = None;
    let mut best_sum = f64::INFINITY;
    for &candidate in members {
        let mut sum = 0.0f64;
        for &other in members {
            sum += distances.get(candidate, other);
        }
        if sum < best_sum || (sum == best_sum && best.map_or(true, |b| candidate < b)) {
            best_sum = sum;
            best = Some(candidate);
        }
    }
    best
}

/// Groups frame indices by label; noise is skipped.
pub fn members_by_cluster(labels: &[i32], n_clusters: usize) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); n_clusters];
    for (frame, &label) in labels.iter().enumerate() {
        if label >= 0 {
            members[label as usize].push(frame);
        }
    }
    members
}
