//! Frame-to-frame dissimilarity metrics.
//!
//! A metric is prepared once per invocation from the frame source and the
//! resolved mask; afterwards `distance(i, j)` only reads prepared data, so a
//! prepared metric can be shared across worker threads.

use std::sync::OnceLock;

use rayon::prelude::*;
use traj_core::{kabsch_rmsd_centered, rmsd_nofit, CenteredCoords, FrameSource, ResolvedMask};

use crate::config::MetricKind;
use crate::error::{ClusterError, ClusterResult};

pub trait FrameMetric: Sync {
    fn name(&self) -> &'static str;
    fn n_frames(&self) -> usize;
    /// Dissimilarity between frames `a` and `b` of the prepared source.
    fn distance(&self, a: usize, b: usize) -> f64;

    /// Distances from `frame` to each of `targets`, in order.
    ///
    /// Used for frames outside the distance matrix: implementations must not
    /// retain per-frame state for `frame`.
    fn distances_to(&self, frame: usize, targets: &[usize]) -> Vec<f64> {
        targets.iter().map(|&t| self.distance(frame, t)).collect()
    }
}

impl MetricKind {
    /// Gathers masked coordinates for every frame and builds the metric.
    pub fn prepare(
        &self,
        source: &dyn FrameSource,
        mask: &ResolvedMask,
    ) -> ClusterResult<Box<dyn FrameMetric>> {
        check_mask(*self, mask)?;
        let n_frames = source.n_frames();
        let masked: Vec<Vec<[f32; 4]>> = (0..n_frames)
            .into_par_iter()
            .map(|i| mask.gather(source.frame(i)))
            .collect();
        Ok(match self {
            MetricKind::Rmsd => Box::new(RmsdMetric::new(&masked)),
            MetricKind::RmsdNoFit => Box::new(NoFitMetric { frames: masked }),
            MetricKind::Dme => Box::new(DmeMetric::new(masked)),
        })
    }
}

fn check_mask(kind: MetricKind, mask: &ResolvedMask) -> ClusterResult<()> {
    if mask.len() < 2 {
        return Err(ClusterError::InvalidMask(format!(
            "{} metric needs at least 2 atoms but the mask selects {}",
            kind.as_str(),
            mask.len()
        )));
    }
    Ok(())
}

/// Evaluates `kind` between two raw frames restricted to `mask`.
pub fn pair_distance(
    kind: MetricKind,
    a: &[[f32; 4]],
    b: &[[f32; 4]],
    mask: &ResolvedMask,
) -> ClusterResult<f64> {
    check_mask(kind, mask)?;
    let xa = mask.gather(a);
    let xb = mask.gather(b);
    Ok(match kind {
        MetricKind::Rmsd => kabsch_rmsd_centered(
            &CenteredCoords::from_coords(&xa),
            &CenteredCoords::from_coords(&xb),
        ),
        MetricKind::RmsdNoFit => rmsd_nofit(&xa, &xb),
        MetricKind::Dme => {
            dme_from_pairs(&pair_distances_compact(&xa), &pair_distances_compact(&xb))
        }
    })
}

pub struct RmsdMetric {
    frames: Vec<CenteredCoords>,
}

impl RmsdMetric {
    pub fn new(frames: &[Vec<[f32; 4]>]) -> Self {
        Self {
            frames: frames.iter().map(|f| CenteredCoords::from_coords(f)).collect(),
        }
    }
}

impl FrameMetric for RmsdMetric {
    fn name(&self) -> &'static str {
        "rmsd"
    }

    fn n_frames(&self) -> usize {
        self.frames.len()
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        if a == b {
            return 0.0;
        }
        // Evaluate in a fixed order so d(a, b) and d(b, a) are bit-identical.
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        kabsch_rmsd_centered(&self.frames[lo], &self.frames[hi])
    }
}

pub struct NoFitMetric {
    frames: Vec<Vec<[f32; 4]>>,
}

impl FrameMetric for NoFitMetric {
    fn name(&self) -> &'static str {
        "rmsd_no_fit"
    }

    fn n_frames(&self) -> usize {
        self.frames.len()
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        if a == b {
            return 0.0;
        }
        rmsd_nofit(&self.frames[a], &self.frames[b])
    }
}

/// Distance-matrix error with a lazily filled per-frame cache of
/// intramolecular pair distances.
///
/// Only frames reached through `distance` are cached; in a clustering run
/// those are the retained frames.
pub struct DmeMetric {
    frames: Vec<Vec<[f32; 4]>>,
    cache: Vec<OnceLock<Vec<f64>>>,
}

impl DmeMetric {
    pub fn new(frames: Vec<Vec<[f32; 4]>>) -> Self {
        let cache = (0..frames.len()).map(|_| OnceLock::new()).collect();
        Self { frames, cache }
    }

    fn internal(&self, frame: usize) -> &[f64] {
        self.cache[frame].get_or_init(|| pair_distances_compact(&self.frames[frame]))
    }

    pub fn cached_frames(&self) -> usize {
        self.cache.iter().filter(|c| c.get().is_some()).count()
    }
}

impl FrameMetric for DmeMetric {
    fn name(&self) -> &'static str {
        "dme"
    }

    fn n_frames(&self) -> usize {
        self.frames.len()
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        if a == b {
            return 0.0;
        }
        dme_from_pairs(self.internal(a), self.internal(b))
    }

    fn distances_to(&self, frame: usize, targets: &[usize]) -> Vec<f64> {
        let transient;
        let own: &[f64] = match self.cache[frame].get() {
            Some(cached) => cached,
            None => {
                transient = pair_distances_compact(&self.frames[frame]);
                &transient
            }
        };
        targets
            .iter()
            .map(|&t| {
                if t == frame {
                    0.0
                } else {
                    dme_from_pairs(own, self.internal(t))
                }
            })
            .collect()
    }
}

fn pair_distances_compact(coords: &[[f32; 4]]) -> Vec<f64> {
    let n = coords.len();
    let mut out = Vec::with_capacity(n.saturating_mul(n.saturating_sub(1)) / 2);
    for i in 0..n {
        let a = coords[i];
        for b in coords.iter().skip(i + 1) {
            let dx = a[0] as f64 - b[0] as f64;
            let dy = a[1] as f64 - b[1] as f64;
            let dz = a[2] as f64 - b[2] as f64;
            out.push((dx * dx + dy * dy + dz * dz).sqrt());
        }
    }
    out
}

fn dme_from_pairs(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let diff = x - y;
        sum += diff * diff;
    }
    (sum / a.len() as f64).sqrt()
}
