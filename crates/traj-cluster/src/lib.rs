//! Partitioning of trajectory frames into groups of similar conformations.
//!
//! [`cluster`] runs one invocation end to end: masked pairwise metric,
//! optional sieve, dense distance matrix, assignment, projection of sieved
//! frames and per-cluster summary. Results can be handed to any
//! [`ResultSink`].

#![forbid(unsafe_code)]

pub mod algorithms;
pub mod config;
pub mod engine;
pub mod error;
pub mod metric;
pub mod pairwise;
pub mod projection;
pub mod sieve;
pub mod sink;
pub mod streaming;
pub mod summary;

pub use algorithms::{Assignment, ClusterAlgorithm, NOISE};
pub use config::{
    load_config, AlgorithmConfig, ClusterConfig, DbscanParams, HierarchicalParams, KmeansInit,
    KmeansParams, Linkage, MetricKind, SieveConfig, SieveStrategy,
};
pub use engine::{cluster, cluster_with_emitter, ClusteringOutput};
pub use error::{ClusterError, ClusterResult};
pub use metric::{pair_distance, FrameMetric};
pub use pairwise::DistanceMatrix;
pub use sink::{emit_to_sink, ResultSink, TextSummarySink};
pub use streaming::StreamEmitter;
pub use summary::{ClusterLifetime, ClusterSummary, PopulationNorm, Silhouette};
