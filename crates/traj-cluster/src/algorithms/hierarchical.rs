//! Bottom-up agglomerative clustering with Lance-Williams distance updates.
//!
//! Each merge scans every active pair, so a run costs O(n^3) time in the
//! number of retained frames and needs a second matrix-sized working copy.
//! Large trajectories should be sieved before using this mode.

use log::debug;

use super::{check_cluster_count, check_frames, Assignment, ClusterAlgorithm};
use crate::config::{HierarchicalParams, Linkage};
use crate::error::ClusterResult;
use crate::pairwise::{tri_index, DistanceMatrix};
use crate::streaming::StreamEmitter;

impl ClusterAlgorithm for HierarchicalParams {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    fn working_matrices(&self) -> usize {
        1
    }

    fn assign(
        &self,
        distances: &DistanceMatrix,
        _emitter: &StreamEmitter,
    ) -> ClusterResult<Assignment> {
        let n = distances.n_frames();
        check_frames("hierarchical", n)?;
        if let Some(k) = self.n_clusters {
            check_cluster_count("hierarchical", k, n)?;
        }
        if n == 1 {
            return Ok(Assignment::single(1));
        }
        let target = self.n_clusters.unwrap_or(1);
        let (labels, n_clusters, merges) =
            agglomerate(distances, target, self.epsilon, self.linkage)?;
        debug!("hierarchical: {merges} merges left {n_clusters} clusters");
        Ok(Assignment {
            labels,
            n_clusters,
            iterations: merges,
            converged: true,
        })
    }
}

/// Merges the closest pair of active clusters until `target` remain or the
/// closest pair is farther apart than `epsilon`.
///
/// Slot `i` absorbs slot `j` for the chosen pair `(i, j)`, `i < j`; equal
/// distances resolve to the lexicographically lowest pair. Linkage updates
/// are written in place into one `f32` copy of the matrix.
fn agglomerate(
    distances: &DistanceMatrix,
    target: usize,
    epsilon: Option<f64>,
    linkage: Linkage,
) -> ClusterResult<(Vec<i32>, usize, usize)> {
    let n = distances.n_frames();
    let mut tri = distances.working_copy()?;
    let mut active = vec![true; n];
    let mut sizes = vec![1usize; n];
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut remaining = n;
    let mut merges = 0usize;

    while remaining > target.max(1) {
        let mut best: Option<(usize, usize)> = None;
        let mut best_dist = f64::INFINITY;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                let d = tri[tri_index(i, j, n)] as f64;
                if d < best_dist {
                    best_dist = d;
                    best = Some((i, j));
                }
            }
        }
        let Some((i, j)) = best else { break };
        if epsilon.map_or(false, |eps| best_dist > eps) {
            break;
        }

        let (ni, nj) = (sizes[i] as f64, sizes[j] as f64);
        for k in 0..n {
            if !active[k] || k == i || k == j {
                continue;
            }
            let dik = tri[tri_index(i, k, n)] as f64;
            let djk = tri[tri_index(j, k, n)] as f64;
            let merged = match linkage {
                Linkage::Single => dik.min(djk),
                Linkage::Complete => dik.max(djk),
                Linkage::Average => (ni * dik + nj * djk) / (ni + nj),
            };
            tri[tri_index(i, k, n)] = merged as f32;
        }
        active[j] = false;
        sizes[i] += sizes[j];
        let absorbed = std::mem::take(&mut members[j]);
        members[i].extend(absorbed);
        remaining -= 1;
        merges += 1;
    }

    let mut labels = vec![0i32; n];
    let mut next = 0i32;
    for slot in 0..n {
        if !active[slot] {
            continue;
        }
        for &frame in &members[slot] {
            labels[frame] = next;
        }
        next += 1;
    }
    Ok((labels, next as usize, merges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::tests::line_matrix;

    fn run(points: &[f64], params: HierarchicalParams) -> Assignment {
        params
            .assign(&line_matrix(points), &StreamEmitter::disabled())
            .unwrap()
    }

    #[test]
    fn two_groups_split_cleanly() {
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average] {
            let out = run(
                &[0.0, 10.0, 0.5, 10.4, 1.0],
                HierarchicalParams::new(2, linkage),
            );
            assert_eq!(out.labels, vec![0, 1, 0, 1, 0]);
            assert_eq!(out.n_clusters, 2);
            assert_eq!(out.iterations, 3);
        }
    }

    #[test]
    fn single_linkage_chains_while_complete_does_not() {
        // Evenly spaced chain with one wider gap before the last point.
        let points = [0.0, 1.0, 2.0, 3.0, 4.5];
        let single = run(&points, HierarchicalParams::new(2, Linkage::Single));
        assert_eq!(single.labels, vec![0, 0, 0, 0, 1]);
        let complete = run(&points, HierarchicalParams::new(2, Linkage::Complete));
        assert_eq!(complete.labels, vec![0, 0, 1, 1, 1]);
    }

    #[test]
    fn epsilon_stops_merging() {
        let out = run(
            &[0.0, 0.1, 5.0, 5.1, 20.0],
            HierarchicalParams {
                n_clusters: None,
                epsilon: Some(1.0),
                linkage: Linkage::Average,
            },
        );
        assert_eq!(out.labels, vec![0, 0, 1, 1, 2]);
        assert_eq!(out.n_clusters, 3);
    }

    #[test]
    fn cluster_count_wins_when_reached_before_epsilon() {
        let out = run(
            &[0.0, 0.1, 0.2, 0.3],
            HierarchicalParams {
                n_clusters: Some(3),
                epsilon: Some(10.0),
                linkage: Linkage::Single,
            },
        );
        assert_eq!(out.n_clusters, 3);
        assert_eq!(out.iterations, 1);
    }

    #[test]
    fn merging_leaves_the_input_matrix_untouched() {
        let d = line_matrix(&[0.0, 0.5, 4.0, 9.0]);
        let snapshot = |d: &DistanceMatrix| -> Vec<f64> {
            (0..4)
                .flat_map(|i| (0..4).map(move |j| (i, j)))
                .map(|(i, j)| d.get(i, j))
                .collect()
        };
        let before = snapshot(&d);
        let out = HierarchicalParams::new(1, Linkage::Average)
            .assign(&d, &StreamEmitter::disabled())
            .unwrap();
        assert_eq!(out.n_clusters, 1);
        assert_eq!(snapshot(&d), before);
    }

    #[test]
    fn ties_merge_the_lowest_pair_first() {
        let out = run(&[0.0, 1.0, 2.0], HierarchicalParams::new(2, Linkage::Single));
        assert_eq!(out.labels, vec![0, 0, 1]);
    }
}
