use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use traj_core::AtomMask;

use crate::error::{ClusterError, ClusterResult};

/// Typed description of one clustering invocation.
///
/// Parameters are checked eagerly by [`ClusterConfig::validate`]; checks that
/// depend on the number of retained frames run once the sieve is known.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClusterConfig {
    /// Atom indices used by the metric. Empty selects all atoms.
    #[serde(default)]
    pub mask: Vec<u32>,
    pub algorithm: AlgorithmConfig,
    #[serde(default)]
    pub metric: MetricKind,
    #[serde(default)]
    pub sieve: SieveConfig,
    #[serde(default)]
    pub memory_budget_bytes: Option<usize>,
    /// Restrict clustering to these frames (negative values count from the end).
    #[serde(default)]
    pub frame_indices: Option<Vec<i64>>,
    #[serde(default)]
    pub n_threads: Option<usize>,
    #[serde(default)]
    pub average_structures: bool,
    #[serde(default)]
    pub silhouette: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    Kmeans(KmeansParams),
    Hierarchical(HierarchicalParams),
    Dbscan(DbscanParams),
}

impl AlgorithmConfig {
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmConfig::Kmeans(_) => "kmeans",
            AlgorithmConfig::Hierarchical(_) => "hierarchical",
            AlgorithmConfig::Dbscan(_) => "dbscan",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KmeansParams {
    pub n_clusters: usize,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default)]
    pub init: KmeansInit,
    /// Stop once the total distance to medoids improves by no more than this.
    #[serde(default)]
    pub tol: f64,
}

impl KmeansParams {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: default_max_iter(),
            init: KmeansInit::default(),
            tol: 0.0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.init = KmeansInit::RandomPoint { seed };
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn systematic(mut self) -> Self {
        self.init = KmeansInit::Systematic;
        self
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KmeansInit {
    RandomPoint { seed: u64 },
    /// Farthest-point seeding starting from the first retained frame.
    Systematic,
}

impl Default for KmeansInit {
    fn default() -> Self {
        KmeansInit::RandomPoint { seed: 1 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HierarchicalParams {
    #[serde(default)]
    pub n_clusters: Option<usize>,
    /// Stop merging once the closest pair of clusters is farther apart than this.
    #[serde(default)]
    pub epsilon: Option<f64>,
    #[serde(default)]
    pub linkage: Linkage,
}

impl HierarchicalParams {
    pub fn new(n_clusters: usize, linkage: Linkage) -> Self {
        Self {
            n_clusters: Some(n_clusters),
            epsilon: None,
            linkage,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    Single,
    Complete,
    #[default]
    Average,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DbscanParams {
    pub eps: f64,
    #[serde(default = "default_min_neighbors")]
    pub min_neighbors: usize,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    #[serde(alias = "rms")]
    Rmsd,
    #[serde(alias = "nofit")]
    RmsdNoFit,
    Dme,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Rmsd => "rmsd",
            MetricKind::RmsdNoFit => "rmsd_no_fit",
            MetricKind::Dme => "dme",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SieveStrategy {
    #[default]
    Random,
    Stride,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SieveConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Number of frames kept for the dense matrix.
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub strategy: SieveStrategy,
}

impl SieveConfig {
    pub fn random(size: usize, seed: u64) -> Self {
        Self {
            enabled: true,
            size,
            seed,
            strategy: SieveStrategy::Random,
        }
    }

    pub fn stride(size: usize) -> Self {
        Self {
            enabled: true,
            size,
            seed: 0,
            strategy: SieveStrategy::Stride,
        }
    }
}

fn default_max_iter() -> usize {
    100
}

fn default_min_neighbors() -> usize {
    5
}

impl ClusterConfig {
    pub fn new(algorithm: AlgorithmConfig) -> Self {
        Self {
            mask: Vec::new(),
            algorithm,
            metric: MetricKind::default(),
            sieve: SieveConfig::default(),
            memory_budget_bytes: None,
            frame_indices: None,
            n_threads: None,
            average_structures: false,
            silhouette: false,
        }
    }

    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_mask(mut self, mask: Vec<u32>) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_sieve(mut self, sieve: SieveConfig) -> Self {
        self.sieve = sieve;
        self
    }

    pub fn with_memory_budget_bytes(mut self, bytes: Option<usize>) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    pub fn with_frame_indices(mut self, frame_indices: Vec<i64>) -> Self {
        self.frame_indices = Some(frame_indices);
        self
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    pub fn with_average_structures(mut self, enabled: bool) -> Self {
        self.average_structures = enabled;
        self
    }

    pub fn with_silhouette(mut self, enabled: bool) -> Self {
        self.silhouette = enabled;
        self
    }

    pub fn atom_mask(&self) -> AtomMask {
        AtomMask::from_indices(self.mask.iter().copied())
    }

    pub fn validate(&self) -> ClusterResult<()> {
        match &self.algorithm {
            AlgorithmConfig::Kmeans(p) => {
                if p.n_clusters == 0 {
                    return Err(ClusterError::InvalidParameter(
                        "kmeans n_clusters must be > 0".into(),
                    ));
                }
                if p.max_iter == 0 {
                    return Err(ClusterError::InvalidParameter(
                        "kmeans max_iter must be > 0".into(),
                    ));
                }
                if !p.tol.is_finite() || p.tol < 0.0 {
                    return Err(ClusterError::InvalidParameter(format!(
                        "kmeans tol must be a finite value >= 0 (got {})",
                        p.tol
                    )));
                }
            }
            AlgorithmConfig::Hierarchical(p) => {
                if p.n_clusters.is_none() && p.epsilon.is_none() {
                    return Err(ClusterError::InvalidParameter(
                        "hierarchical clustering needs n_clusters and/or epsilon".into(),
                    ));
                }
                if p.n_clusters == Some(0) {
                    return Err(ClusterError::InvalidParameter(
                        "hierarchical n_clusters must be > 0".into(),
                    ));
                }
                if let Some(eps) = p.epsilon {
                    if !eps.is_finite() || eps < 0.0 {
                        return Err(ClusterError::InvalidParameter(format!(
                            "hierarchical epsilon must be a finite value >= 0 (got {eps})"
                        )));
                    }
                }
            }
            AlgorithmConfig::Dbscan(p) => {
                if !p.eps.is_finite() || p.eps <= 0.0 {
                    return Err(ClusterError::InvalidParameter(format!(
                        "dbscan eps must be > 0 (got {})",
                        p.eps
                    )));
                }
                if p.min_neighbors == 0 {
                    return Err(ClusterError::InvalidParameter(
                        "dbscan min_neighbors must be > 0".into(),
                    ));
                }
            }
        }
        if self.sieve.enabled && self.sieve.size == 0 {
            return Err(ClusterError::InvalidParameter(
                "sieve size must be > 0 when the sieve is enabled".into(),
            ));
        }
        if self.n_threads == Some(0) {
            return Err(ClusterError::InvalidParameter(
                "n_threads must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Checks that depend on how many frames survive the sieve.
    pub fn validate_for_frames(&self, n_retained: usize) -> ClusterResult<()> {
        if n_retained == 0 {
            return Err(ClusterError::EmptyInput(format!(
                "{} clustering received no frames",
                self.algorithm.name()
            )));
        }
        let requested = match &self.algorithm {
            AlgorithmConfig::Kmeans(p) => Some(p.n_clusters),
            AlgorithmConfig::Hierarchical(p) => p.n_clusters,
            AlgorithmConfig::Dbscan(_) => None,
        };
        if let Some(k) = requested {
            if k > n_retained {
                return Err(ClusterError::InvalidParameter(format!(
                    "{} requested {k} clusters but only {n_retained} frames are retained",
                    self.algorithm.name()
                )));
            }
        }
        if let AlgorithmConfig::Dbscan(p) = &self.algorithm {
            if n_retained > 1 && p.min_neighbors >= n_retained {
                return Err(ClusterError::InvalidParameter(format!(
                    "dbscan min_neighbors={} can never be met with {n_retained} retained frames",
                    p.min_neighbors
                )));
            }
        }
        Ok(())
    }
}

/// Loads a config from JSON, or YAML when the extension is `.yaml`/`.yml`.
pub fn load_config(path: &Path) -> ClusterResult<ClusterConfig> {
    let content = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let cfg: ClusterConfig = if ext == "yaml" || ext == "yml" {
        serde_yaml::from_str(&content)
            .map_err(|e| ClusterError::Config(format!("yaml parse error: {e}")))?
    } else {
        serde_json::from_str(&content)
            .map_err(|e| ClusterError::Config(format!("json parse error: {e}")))?
    };
    cfg.validate()?;
    Ok(cfg)
}
