use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::config::{SieveConfig, SieveStrategy};
use crate::error::{ClusterError, ClusterResult};

/// Frames retained for the dense matrix, ascending.
///
/// Membership depends only on `n_frames` and the sieve parameters, so the
/// same seed and size always reproduce the same set.
pub fn select_frames(n_frames: usize, sieve: &SieveConfig) -> ClusterResult<Vec<usize>> {
    if !sieve.enabled || sieve.size >= n_frames {
        return Ok((0..n_frames).collect());
    }
    if sieve.size == 0 {
        return Err(ClusterError::InvalidParameter(
            "sieve size must be > 0 when the sieve is enabled".into(),
        ));
    }
    let mut frames = match sieve.strategy {
        SieveStrategy::Random => {
            let mut rng = StdRng::seed_from_u64(sieve.seed);
            index::sample(&mut rng, n_frames, sieve.size).into_vec()
        }
        SieveStrategy::Stride => (0..sieve.size)
            .map(|i| i * n_frames / sieve.size)
            .collect(),
    };
    frames.sort_unstable();
    Ok(frames)
}

/// Complement of `retained` within `0..n_frames`. `retained` must be sorted.
pub fn excluded_frames(n_frames: usize, retained: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(n_frames.saturating_sub(retained.len()));
    let mut cursor = 0usize;
    for frame in 0..n_frames {
        if cursor < retained.len() && retained[cursor] == frame {
            cursor += 1;
        } else {
            out.push(frame);
        }
    }
    out
}
