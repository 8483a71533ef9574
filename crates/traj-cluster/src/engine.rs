//! Single-invocation clustering pipeline.
//!
//! frames -> metric -> sieve -> distance matrix -> assignment -> projection
//! -> summary. The distance matrix lives only inside one call.

use std::time::Instant;

use log::{debug, info};
use traj_core::{FrameSource, FrameSubset};

use crate::algorithms::NOISE;
use crate::config::{AlgorithmConfig, ClusterConfig, MetricKind, SieveStrategy};
use crate::error::{ClusterError, ClusterResult};
use crate::pairwise::{check_budget, DistanceMatrix};
use crate::projection::{average_structures, project};
use crate::sieve::select_frames;
use crate::streaming::{
    duration_ms, ClusterCompleteEvent, ClusterPhase, ClusterStartedEvent, PhaseCompleteEvent,
    PhaseStartedEvent, StreamEmitter,
};
use crate::summary::{
    lifetimes, population_vs_time, silhouette, summarize, ClusterLifetime, ClusterSummary,
    PopulationNorm, Silhouette,
};

/// Result of one clustering invocation.
///
/// Frame indices refer to the clustered input: positions within
/// `frame_indices` when the config restricts frames, input frames otherwise.
#[derive(Debug, Clone)]
pub struct ClusteringOutput {
    /// One id per frame; `-1` marks noise.
    pub labels: Vec<i32>,
    pub n_clusters: usize,
    /// Medoid frame of each cluster.
    pub centroids: Vec<usize>,
    pub sizes: Vec<usize>,
    pub method: &'static str,
    pub metric: MetricKind,
    pub n_frames: usize,
    /// Input frame of each clustered position, when `frame_indices` was set.
    pub frame_map: Option<Vec<usize>>,
    /// Frames that entered the distance matrix, ascending.
    pub sieve_frames: Vec<usize>,
    pub sieve_seed: Option<u64>,
    pub iterations: usize,
    pub converged: bool,
    pub summaries: Vec<ClusterSummary>,
    pub silhouette: Option<Silhouette>,
    pub averages: Option<Vec<Vec<[f32; 4]>>>,
}

impl ClusteringOutput {
    pub fn n_noise(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// Input frame index for clustered position `pos`.
    pub fn source_frame(&self, pos: usize) -> usize {
        match &self.frame_map {
            Some(map) => map[pos],
            None => pos,
        }
    }

    pub fn members(&self, cluster_id: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == cluster_id as i32)
            .map(|(i, _)| i)
            .collect()
    }

    /// Cumulative population of every cluster after each clustered frame.
    pub fn population_vs_time(&self, norm: PopulationNorm) -> Vec<Vec<f64>> {
        population_vs_time(&self.labels, self.n_clusters, norm)
    }

    pub fn lifetimes(&self) -> Vec<ClusterLifetime> {
        lifetimes(&self.labels, self.n_clusters)
    }
}

pub fn cluster(
    frames: &dyn FrameSource,
    config: &ClusterConfig,
) -> ClusterResult<ClusteringOutput> {
    cluster_with_emitter(frames, config, &StreamEmitter::disabled())
}

/// Runs [`cluster`] while streaming progress events through `emitter`.
///
/// On failure an `error` event is emitted before the error is returned.
pub fn cluster_with_emitter(
    frames: &dyn FrameSource,
    config: &ClusterConfig,
    emitter: &StreamEmitter,
) -> ClusterResult<ClusteringOutput> {
    let result = config.validate().and_then(|_| match config.n_threads {
        Some(n_threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .map_err(|e| {
                    ClusterError::InvalidParameter(format!(
                        "failed to build a pool with {n_threads} threads: {e}"
                    ))
                })?;
            pool.install(|| run(frames, config, emitter))
        }
        None => run(frames, config, emitter),
    });
    if let Err(err) = &result {
        emitter.emit_error(err.code(), &err.to_string());
    }
    result
}

fn run(
    frames: &dyn FrameSource,
    config: &ClusterConfig,
    emitter: &StreamEmitter,
) -> ClusterResult<ClusteringOutput> {
    let start = Instant::now();
    match &config.frame_indices {
        Some(indices) => {
            let subset = FrameSubset::from_signed(frames, indices);
            let frame_map = subset.source_indices().to_vec();
            debug!(
                "frame_indices selected {} of {} frames",
                frame_map.len(),
                frames.n_frames()
            );
            let mut output = run_on(&subset, config, emitter, start)?;
            output.frame_map = Some(frame_map);
            Ok(output)
        }
        None => run_on(frames, config, emitter, start),
    }
}

fn run_on(
    source: &dyn FrameSource,
    config: &ClusterConfig,
    emitter: &StreamEmitter,
    start: Instant,
) -> ClusterResult<ClusteringOutput> {
    let n_frames = source.n_frames();
    if n_frames == 0 {
        return Err(ClusterError::EmptyInput(
            "trajectory has no frames to cluster".into(),
        ));
    }
    let algorithm = config.algorithm.assigner();
    let mask = config.atom_mask().resolve(source.n_atoms())?;
    let retained = select_frames(n_frames, &config.sieve)?;
    config.validate_for_frames(retained.len())?;
    check_budget(
        retained.len(),
        1 + algorithm.working_matrices(),
        config.memory_budget_bytes,
    )?;
    let sieve_seed = sieved_seed(config, n_frames);

    emitter.emit_cluster_started(&ClusterStartedEvent {
        method: algorithm.name().to_string(),
        metric: config.metric.as_str().to_string(),
        n_frames,
        n_retained: retained.len(),
        n_mask_atoms: mask.len(),
        sieve_seed,
    });
    info!(
        "clustering {} frames ({} retained) with {} / {} over {} atoms",
        n_frames,
        retained.len(),
        algorithm.name(),
        config.metric.as_str(),
        mask.len()
    );

    let metric = timed(emitter, ClusterPhase::Prepare, Some(n_frames), || {
        config.metric.prepare(source, &mask)
    })?;
    let distances = timed(
        emitter,
        ClusterPhase::DistanceMatrix,
        Some(retained.len()),
        || DistanceMatrix::compute(metric.as_ref(), &retained, config.memory_budget_bytes),
    )?;
    debug!("distance matrix holds {} bytes", distances.size_bytes());

    let assignment = timed(emitter, ClusterPhase::Assign, Some(retained.len()), || {
        algorithm.assign(&distances, emitter)
    })?;

    let noise_cutoff = match &config.algorithm {
        AlgorithmConfig::Dbscan(p) => Some(p.eps),
        _ => None,
    };
    let projection = timed(emitter, ClusterPhase::Project, Some(n_frames), || {
        Ok(project(
            &assignment,
            &distances,
            &retained,
            metric.as_ref(),
            noise_cutoff,
        ))
    })?;

    let (summaries, sil, averages) =
        timed(emitter, ClusterPhase::Summarize, Some(projection.n_clusters), || {
            let summaries = summarize(&projection, &distances);
            let sil = config
                .silhouette
                .then(|| silhouette(&projection, &distances));
            let averages = if config.average_structures {
                let fit = config.metric == MetricKind::Rmsd;
                Some(average_structures(source, &mask, &projection, fit)?)
            } else {
                None
            };
            Ok((summaries, sil, averages))
        })?;
    drop(distances);

    let output = ClusteringOutput {
        labels: projection.labels,
        n_clusters: projection.n_clusters,
        centroids: projection.centroids,
        sizes: projection.sizes,
        method: algorithm.name(),
        metric: config.metric,
        n_frames,
        frame_map: None,
        sieve_frames: retained,
        sieve_seed,
        iterations: assignment.iterations,
        converged: assignment.converged,
        summaries,
        silhouette: sil,
        averages,
    };
    let elapsed_ms = duration_ms(start.elapsed());
    emitter.emit_cluster_complete(&ClusterCompleteEvent {
        n_clusters: output.n_clusters,
        n_noise: output.n_noise(),
        iterations: output.iterations,
        converged: output.converged,
        elapsed_ms,
    });
    info!(
        "found {} clusters ({} noise frames) in {} ms",
        output.n_clusters,
        output.n_noise(),
        elapsed_ms
    );
    Ok(output)
}

/// Seed of a random sieve that actually dropped frames.
fn sieved_seed(config: &ClusterConfig, n_frames: usize) -> Option<u64> {
    let sieve = &config.sieve;
    let active = sieve.enabled && sieve.size < n_frames;
    (active && sieve.strategy == SieveStrategy::Random).then_some(sieve.seed)
}

fn timed<T>(
    emitter: &StreamEmitter,
    phase: ClusterPhase,
    n_items: Option<usize>,
    f: impl FnOnce() -> ClusterResult<T>,
) -> ClusterResult<T> {
    emitter.emit_phase_started(&PhaseStartedEvent { phase, n_items });
    let start = Instant::now();
    let out = f()?;
    let elapsed_ms = duration_ms(start.elapsed());
    debug!("{} finished in {} ms", phase.as_str(), elapsed_ms);
    emitter.emit_phase_complete(&PhaseCompleteEvent { phase, elapsed_ms });
    Ok(out)
}
