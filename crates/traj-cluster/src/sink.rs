//! Delivery of clustering results to callers' storage.

use std::io::Write;

use traj_core::FrameSource;

use crate::engine::ClusteringOutput;
use crate::error::{ClusterError, ClusterResult};

/// Receives the artifacts of a clustering run. Only `record_labels` is
/// mandatory; structure and summary writers default to no-ops.
pub trait ResultSink {
    /// One cluster id per clustered frame, `-1` for noise.
    fn record_labels(&mut self, labels: &[i32]) -> ClusterResult<()>;

    /// Coordinates of the centroid frame `frame` (an input frame index).
    fn write_representative(
        &mut self,
        _cluster_id: usize,
        _frame: usize,
        _coords: &[[f32; 4]],
    ) -> ClusterResult<()> {
        Ok(())
    }

    fn write_average(&mut self, _cluster_id: usize, _coords: &[[f32; 4]]) -> ClusterResult<()> {
        Ok(())
    }

    fn write_summary(&mut self, _output: &ClusteringOutput) -> ClusterResult<()> {
        Ok(())
    }
}

/// Feeds `output` to `sink`: labels, then centroid structures read from
/// `frames`, then averages (when computed), then the summary.
pub fn emit_to_sink(
    output: &ClusteringOutput,
    frames: &dyn FrameSource,
    sink: &mut dyn ResultSink,
) -> ClusterResult<()> {
    sink.record_labels(&output.labels)?;
    for (cluster_id, &centroid) in output.centroids.iter().enumerate() {
        let frame = output.source_frame(centroid);
        if frame >= frames.n_frames() {
            return Err(ClusterError::InvalidParameter(format!(
                "centroid frame {frame} of cluster {cluster_id} is outside a source with {} frames",
                frames.n_frames()
            )));
        }
        sink.write_representative(cluster_id, frame, frames.frame(frame))?;
    }
    if let Some(averages) = &output.averages {
        for (cluster_id, coords) in averages.iter().enumerate() {
            sink.write_average(cluster_id, coords)?;
        }
    }
    sink.write_summary(output)
}

/// Plain-text report: a header, one row per cluster and, optionally, the
/// per-frame label table.
pub struct TextSummarySink<W: Write> {
    out: W,
    with_labels: bool,
    labels: Vec<i32>,
}

impl<W: Write> TextSummarySink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            with_labels: false,
            labels: Vec::new(),
        }
    }

    pub fn with_labels(mut self, enabled: bool) -> Self {
        self.with_labels = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultSink for TextSummarySink<W> {
    fn record_labels(&mut self, labels: &[i32]) -> ClusterResult<()> {
        if self.with_labels {
            self.labels = labels.to_vec();
        }
        Ok(())
    }

    fn write_summary(&mut self, output: &ClusteringOutput) -> ClusterResult<()> {
        let w = &mut self.out;
        writeln!(
            w,
            "#Clustering: {} clusters, {} frames, {} noise",
            output.n_clusters,
            output.n_frames,
            output.n_noise()
        )?;
        writeln!(
            w,
            "#Algorithm: {}  Metric: {}  Iterations: {}  Converged: {}",
            output.method,
            output.metric.as_str(),
            output.iterations,
            output.converged
        )?;
        if output.sieve_frames.len() < output.n_frames {
            match output.sieve_seed {
                Some(seed) => writeln!(
                    w,
                    "#Sieve: {} frames, seed {}",
                    output.sieve_frames.len(),
                    seed
                )?,
                None => writeln!(w, "#Sieve: {} frames, stride", output.sieve_frames.len())?,
            }
        }
        let sil = output.silhouette.as_ref();
        write!(
            w,
            "#{:>7} {:>8} {:>8} {:>10} {:>10} {:>8} {:>8} {:>10}",
            "Cluster", "Frames", "Frac", "AvgDist", "Stdev", "Centroid", "Nearest", "NearDist"
        )?;
        if sil.is_some() {
            write!(w, " {:>8}", "Sil")?;
        }
        writeln!(w)?;
        for s in &output.summaries {
            write!(
                w,
                "{:>8} {:>8} {:>8.3} {:>10.4} {:>10.4} {:>8} {:>8} {:>10}",
                s.cluster_id,
                s.population,
                s.fraction,
                s.avg_distance,
                s.stdev_distance,
                output.source_frame(s.centroid),
                s.nearest_cluster
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".into()),
                s.nearest_distance
                    .map(|d| format!("{d:.4}"))
                    .unwrap_or_else(|| "-".into()),
            )?;
            if let Some(sil) = sil {
                write!(w, " {:>8.4}", sil.per_cluster[s.cluster_id])?;
            }
            writeln!(w)?;
        }
        if let Some(sil) = sil {
            writeln!(w, "#Silhouette: {:.4}", sil.overall)?;
        }
        if self.with_labels {
            writeln!(w, "#{:>7} {:>8}", "Frame", "Cluster")?;
            for (pos, &label) in self.labels.iter().enumerate() {
                writeln!(w, "{:>8} {:>8}", output.source_frame(pos), label)?;
            }
        }
        w.flush()?;
        Ok(())
    }
}
