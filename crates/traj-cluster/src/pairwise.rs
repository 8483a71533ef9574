//! Packed upper-triangular store of pairwise frame distances.

use rayon::prelude::*;

use crate::error::{ClusterError, ClusterResult};
use crate::metric::FrameMetric;

pub(crate) fn tri_pairs_len(n: usize) -> usize {
    n.saturating_mul(n.saturating_sub(1)) / 2
}

pub(crate) fn tri_index(i: usize, j: usize, n: usize) -> usize {
    let (a, b) = if i < j { (i, j) } else { (j, i) };
    let row_offset = a * (2 * n - a - 1) / 2;
    row_offset + (b - a - 1)
}

/// Bytes needed by a dense matrix over `n_frames` frames.
pub fn required_bytes(n_frames: usize) -> usize {
    tri_pairs_len(n_frames).saturating_mul(std::mem::size_of::<f32>())
}

/// Dissimilarities between retained frames, indexed `0..n_frames()` in the
/// order the frames were retained.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    n: usize,
    tri: Vec<f32>,
}

impl DistanceMatrix {
    /// Computes every pair among `frames` (indices into `metric`).
    ///
    /// Rows are filled in parallel; each slot is written exactly once.
    pub fn compute(
        metric: &dyn FrameMetric,
        frames: &[usize],
        memory_budget_bytes: Option<usize>,
    ) -> ClusterResult<Self> {
        let n = frames.len();
        let mut tri = allocate(n, memory_budget_bytes)?;
        let mut rows: Vec<(usize, &mut [f32])> = Vec::with_capacity(n);
        let mut rest = tri.as_mut_slice();
        for i in 0..n {
            let (row, tail) = std::mem::take(&mut rest).split_at_mut(n - 1 - i);
            rows.push((i, row));
            rest = tail;
        }
        rows.into_par_iter().for_each(|(i, row)| {
            for (offset, slot) in row.iter_mut().enumerate() {
                let j = i + 1 + offset;
                *slot = metric.distance(frames[i], frames[j]) as f32;
            }
        });
        Ok(Self { n, tri })
    }

    pub fn from_fn<F>(n: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut tri = vec![0.0f32; tri_pairs_len(n)];
        for i in 0..n {
            for j in (i + 1)..n {
                tri[tri_index(i, j, n)] = f(i, j) as f32;
            }
        }
        Self { n, tri }
    }

    pub fn n_frames(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            0.0
        } else {
            self.tri[tri_index(i, j, self.n)] as f64
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.tri.len() * std::mem::size_of::<f32>()
    }

    /// Owned copy of the packed distances for algorithms that rewrite them.
    /// Allocation failure is reported instead of aborting.
    pub(crate) fn working_copy(&self) -> ClusterResult<Vec<f32>> {
        let mut tri = reserve(self.n)?;
        tri.extend_from_slice(&self.tri);
        Ok(tri)
    }

    /// Frames within `eps` of `point`, excluding `point`, ascending.
    pub fn neighbors_within(&self, point: usize, eps: f64, out: &mut Vec<usize>) {
        out.clear();
        for j in 0..self.n {
            if j != point && self.get(point, j) <= eps {
                out.push(j);
            }
        }
    }
}

/// Fails when `copies` dense matrices over `n_frames` frames exceed the
/// budget.
pub(crate) fn check_budget(
    n_frames: usize,
    copies: usize,
    memory_budget_bytes: Option<usize>,
) -> ClusterResult<()> {
    let bytes = required_bytes(n_frames).saturating_mul(copies);
    match memory_budget_bytes {
        Some(limit) if bytes > limit => Err(ClusterError::OutOfMemory {
            n_frames,
            required_bytes: bytes,
            budget_bytes: Some(limit),
        }),
        _ => Ok(()),
    }
}

fn reserve(n: usize) -> ClusterResult<Vec<f32>> {
    let len = tri_pairs_len(n);
    let mut tri = Vec::new();
    tri.try_reserve_exact(len)
        .map_err(|_| ClusterError::OutOfMemory {
            n_frames: n,
            required_bytes: required_bytes(n),
            budget_bytes: None,
        })?;
    Ok(tri)
}

fn allocate(n: usize, memory_budget_bytes: Option<usize>) -> ClusterResult<Vec<f32>> {
    check_budget(n, 1, memory_budget_bytes)?;
    let mut tri = reserve(n)?;
    tri.resize(tri_pairs_len(n), 0.0f32);
    Ok(tri)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LineMetric(Vec<f64>);

    impl FrameMetric for LineMetric {
        fn name(&self) -> &'static str {
            "line"
        }

        fn n_frames(&self) -> usize {
            self.0.len()
        }

        fn distance(&self, a: usize, b: usize) -> f64 {
            (self.0[a] - self.0[b]).abs()
        }
    }

    #[test]
    fn tri_index_covers_every_slot_once() {
        let n = 7;
        let mut seen = vec![false; tri_pairs_len(n)];
        for i in 0..n {
            for j in (i + 1)..n {
                let k = tri_index(i, j, n);
                assert_eq!(k, tri_index(j, i, n));
                assert!(!seen[k]);
                seen[k] = true;
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn compute_uses_retained_frame_ids() {
        let metric = LineMetric(vec![0.0, 10.0, 1.0, 3.0]);
        let d = DistanceMatrix::compute(&metric, &[0, 2, 3], None).unwrap();
        assert_eq!(d.n_frames(), 3);
        assert_eq!(d.get(0, 1), 1.0);
        assert_eq!(d.get(2, 0), 3.0);
        assert_eq!(d.get(1, 2), 2.0);
        assert_eq!(d.get(1, 1), 0.0);
        assert_eq!(d.size_bytes(), 12);
    }

    #[test]
    fn compute_handles_tiny_inputs() {
        let metric = LineMetric(vec![4.0]);
        assert_eq!(DistanceMatrix::compute(&metric, &[0], None).unwrap().n_frames(), 1);
        assert_eq!(DistanceMatrix::compute(&metric, &[], None).unwrap().n_frames(), 0);
    }

    #[test]
    fn memory_budget_rejects_large_matrix() {
        let metric = LineMetric(vec![0.0, 1.0, 2.0, 3.0]);
        let err = DistanceMatrix::compute(&metric, &[0, 1, 2, 3], Some(8)).unwrap_err();
        match err {
            ClusterError::OutOfMemory {
                n_frames,
                required_bytes,
                budget_bytes,
            } => {
                assert_eq!(n_frames, 4);
                assert_eq!(required_bytes, 24);
                assert_eq!(budget_bytes, Some(8));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(DistanceMatrix::compute(&metric, &[0, 1, 2, 3], Some(24)).is_ok());
    }

    #[test]
    fn budget_counts_every_matrix_copy() {
        assert!(check_budget(4, 1, Some(24)).is_ok());
        match check_budget(4, 2, Some(24)).unwrap_err() {
            ClusterError::OutOfMemory {
                required_bytes,
                budget_bytes,
                ..
            } => {
                assert_eq!(required_bytes, 48);
                assert_eq!(budget_bytes, Some(24));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(check_budget(4, 2, None).is_ok());
    }

    #[test]
    fn working_copy_matches_the_matrix() {
        let d = DistanceMatrix::from_fn(5, |i, j| (i * 10 + j) as f64);
        let copy = d.working_copy().unwrap();
        assert_eq!(copy.len(), tri_pairs_len(5));
        assert_eq!(copy[tri_index(1, 3, 5)], 13.0);
        assert_eq!(d.size_bytes(), copy.len() * std::mem::size_of::<f32>());
    }

    #[test]
    fn neighbors_within_excludes_self() {
        let d = DistanceMatrix::from_fn(4, |i, j| (i as f64 - j as f64).abs());
        let mut out = Vec::new();
        d.neighbors_within(1, 1.0, &mut out);
        assert_eq!(out, vec![0, 2]);
    }
}
