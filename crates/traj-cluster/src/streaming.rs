//! NDJSON progress events for clustering runs.
//!
//! Events are written to stderr, one JSON object per line, so callers can
//! follow long runs without touching stdout.
//!
//! Event types:
//!   - cluster_started: input sizes and chosen method/metric
//!   - phase_started / phase_complete: prepare, distance_matrix, assign, project, summarize
//!   - kmeans_iteration: per-iteration label churn and total medoid distance
//!   - cluster_complete: final cluster count and convergence
//!   - error: failure envelope

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClusterStartedEvent {
    pub method: String,
    pub metric: String,
    pub n_frames: usize,
    pub n_retained: usize,
    pub n_mask_atoms: usize,
    pub sieve_seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Prepare,
    DistanceMatrix,
    Assign,
    Project,
    Summarize,
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::DistanceMatrix => "distance_matrix",
            Self::Assign => "assign",
            Self::Project => "project",
            Self::Summarize => "summarize",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseStartedEvent {
    pub phase: ClusterPhase,
    pub n_items: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct KmeansIterationEvent {
    pub iteration: usize,
    pub max_iterations: usize,
    pub changed: usize,
    pub cost: f64,
}

#[derive(Debug, Clone)]
pub struct PhaseCompleteEvent {
    pub phase: ClusterPhase,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ClusterCompleteEvent {
    pub n_clusters: usize,
    pub n_noise: usize,
    pub iterations: usize,
    pub converged: bool,
    pub elapsed_ms: u64,
}

/// Streaming emitter for NDJSON events.
#[derive(Debug, Clone, Copy)]
pub struct StreamEmitter {
    enabled: bool,
}

impl StreamEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn emit_json(&self, json: &str) {
        if self.enabled {
            eprintln!("{}", json);
        }
    }

    pub fn emit_cluster_started(&self, event: &ClusterStartedEvent) {
        if self.enabled {
            self.emit_json(&cluster_started_json(event));
        }
    }

    pub fn emit_phase_started(&self, event: &PhaseStartedEvent) {
        if self.enabled {
            self.emit_json(&phase_started_json(event));
        }
    }

    pub fn emit_kmeans_iteration(&self, event: &KmeansIterationEvent) {
        if self.enabled {
            self.emit_json(&kmeans_iteration_json(event));
        }
    }

    pub fn emit_phase_complete(&self, event: &PhaseCompleteEvent) {
        if self.enabled {
            self.emit_json(&phase_complete_json(event));
        }
    }

    pub fn emit_cluster_complete(&self, event: &ClusterCompleteEvent) {
        if self.enabled {
            self.emit_json(&cluster_complete_json(event));
        }
    }

    pub fn emit_error(&self, code: &str, message: &str) {
        if !self.enabled {
            return;
        }
        let code = serde_json::to_string(code).unwrap_or("\"unknown\"".to_string());
        let message = serde_json::to_string(message).unwrap_or("\"Unknown error\"".to_string());
        let json = format!(r#"{{"event":"error","code":{},"message":{}}}"#, code, message);
        self.emit_json(&json);
    }
}

pub(crate) fn cluster_started_json(event: &ClusterStartedEvent) -> String {
    let method = serde_json::to_string(&event.method).unwrap_or("\"\"".to_string());
    let metric = serde_json::to_string(&event.metric).unwrap_or("\"\"".to_string());
    let seed = event
        .sieve_seed
        .map(|s| s.to_string())
        .unwrap_or("null".to_string());
    format!(
        r#"{{"event":"cluster_started","method":{},"metric":{},"n_frames":{},"n_retained":{},"n_mask_atoms":{},"sieve_seed":{}}}"#,
        method, metric, event.n_frames, event.n_retained, event.n_mask_atoms, seed
    )
}

pub(crate) fn phase_started_json(event: &PhaseStartedEvent) -> String {
    let n_items = event
        .n_items
        .map(|n| n.to_string())
        .unwrap_or("null".to_string());
    format!(
        r#"{{"event":"phase_started","phase":"{}","n_items":{}}}"#,
        event.phase.as_str(),
        n_items
    )
}

pub(crate) fn kmeans_iteration_json(event: &KmeansIterationEvent) -> String {
    let progress_pct = if event.max_iterations > 0 {
        event.iteration as f64 / event.max_iterations as f64 * 100.0
    } else {
        0.0
    };
    let cost = if event.cost.is_finite() {
        format!("{:.6e}", event.cost)
    } else {
        "null".to_string()
    };
    format!(
        r#"{{"event":"kmeans_iteration","iteration":{},"max_iterations":{},"changed":{},"cost":{},"progress_pct":{:.1}}}"#,
        event.iteration, event.max_iterations, event.changed, cost, progress_pct
    )
}

pub(crate) fn phase_complete_json(event: &PhaseCompleteEvent) -> String {
    format!(
        r#"{{"event":"phase_complete","phase":"{}","elapsed_ms":{}}}"#,
        event.phase.as_str(),
        event.elapsed_ms
    )
}

pub(crate) fn cluster_complete_json(event: &ClusterCompleteEvent) -> String {
    format!(
        r#"{{"event":"cluster_complete","n_clusters":{},"n_noise":{},"iterations":{},"converged":{},"elapsed_ms":{}}}"#,
        event.n_clusters, event.n_noise, event.iterations, event.converged, event.elapsed_ms
    )
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}
