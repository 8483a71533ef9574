//! Per-cluster statistics over the retained frames.

use rayon::prelude::*;
use serde::Serialize;

use crate::algorithms::members_by_cluster;
use crate::pairwise::DistanceMatrix;
use crate::projection::Projection;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    /// Frames in the cluster after projection.
    pub population: usize,
    /// `population` over all input frames, noise included.
    pub fraction: f64,
    pub centroid: usize,
    /// Mean of intra-cluster pair distances among retained members.
    pub avg_distance: f64,
    pub stdev_distance: f64,
    /// Closest other cluster by centroid-to-centroid distance.
    pub nearest_cluster: Option<usize>,
    pub nearest_distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Silhouette {
    pub per_cluster: Vec<f64>,
    pub overall: f64,
}

pub fn summarize(projection: &Projection, distances: &DistanceMatrix) -> Vec<ClusterSummary> {
    let k = projection.n_clusters;
    let n_total = projection.labels.len().max(1) as f64;
    let members = members_by_cluster(&projection.retained_labels, k);
    (0..k)
        .map(|c| {
            let (avg_distance, stdev_distance) = intra_stats(&members[c], distances);
            let here = projection.local_centroids[c];
            let mut nearest: Option<(usize, f64)> = None;
            for (other, &there) in projection.local_centroids.iter().enumerate() {
                if other == c {
                    continue;
                }
                let d = distances.get(here, there);
                if nearest.map_or(true, |(_, best)| d < best) {
                    nearest = Some((other, d));
                }
            }
            ClusterSummary {
                cluster_id: c,
                population: projection.sizes[c],
                fraction: projection.sizes[c] as f64 / n_total,
                centroid: projection.centroids[c],
                avg_distance,
                stdev_distance,
                nearest_cluster: nearest.map(|(id, _)| id),
                nearest_distance: nearest.map(|(_, d)| d),
            }
        })
        .collect()
}

fn intra_stats(members: &[usize], distances: &DistanceMatrix) -> (f64, f64) {
    if members.len() < 2 {
        return (0.0, 0.0);
    }
    let mut values = Vec::with_capacity(members.len() * (members.len() - 1) / 2);
    for (a, &i) in members.iter().enumerate() {
        for &j in &members[a + 1..] {
            values.push(distances.get(i, j));
        }
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    (mean, var.sqrt())
}

/// Silhouette over retained, non-noise frames.
///
/// A frame alone in its cluster scores 0, as does every frame when there is
/// only one cluster.
pub fn silhouette(projection: &Projection, distances: &DistanceMatrix) -> Silhouette {
    let k = projection.n_clusters;
    let labels = &projection.retained_labels;
    let members = members_by_cluster(labels, k);
    let scores: Vec<(usize, f64)> = (0..labels.len())
        .into_par_iter()
        .filter(|&i| labels[i] >= 0)
        .map(|i| {
            let own = labels[i] as usize;
            (own, frame_silhouette(i, own, &members, distances))
        })
        .collect();

    let mut sums = vec![0.0f64; k];
    let mut counts = vec![0usize; k];
    for &(c, s) in &scores {
        sums[c] += s;
        counts[c] += 1;
    }
    let per_cluster = sums
        .iter()
        .zip(counts.iter())
        .map(|(&s, &n)| if n > 0 { s / n as f64 } else { 0.0 })
        .collect();
    let overall = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|&(_, s)| s).sum::<f64>() / scores.len() as f64
    };
    Silhouette {
        per_cluster,
        overall,
    }
}

fn frame_silhouette(
    frame: usize,
    own: usize,
    members: &[Vec<usize>],
    distances: &DistanceMatrix,
) -> f64 {
    if members[own].len() < 2 {
        return 0.0;
    }
    let mean_to = |group: &[usize]| -> f64 {
        let sum: f64 = group.iter().map(|&j| distances.get(frame, j)).sum();
        sum / group.len() as f64
    };
    let n_own = members[own].len() as f64;
    let a = mean_to(&members[own]) * n_own / (n_own - 1.0);
    let b = members
        .iter()
        .enumerate()
        .filter(|(c, group)| *c != own && !group.is_empty())
        .map(|(_, group)| mean_to(group))
        .fold(f64::INFINITY, f64::min);
    if !b.is_finite() {
        return 0.0;
    }
    let denom = a.max(b);
    if denom > 0.0 {
        (b - a) / denom
    } else {
        0.0
    }
}

/// Scaling applied to cumulative cluster populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopulationNorm {
    /// Raw frame counts.
    #[default]
    None,
    /// Divided by the cluster's final population.
    Population,
    /// Divided by the number of frames seen so far.
    Frame,
}

/// `series[c][f]` is the population of cluster `c` over frames `0..=f`.
pub fn population_vs_time(
    labels: &[i32],
    n_clusters: usize,
    norm: PopulationNorm,
) -> Vec<Vec<f64>> {
    let mut series = vec![Vec::with_capacity(labels.len()); n_clusters];
    let mut counts = vec![0usize; n_clusters];
    for (frame, &label) in labels.iter().enumerate() {
        if label >= 0 {
            counts[label as usize] += 1;
        }
        for (c, values) in series.iter_mut().enumerate() {
            let value = counts[c] as f64;
            values.push(match norm {
                PopulationNorm::Frame => value / (frame + 1) as f64,
                _ => value,
            });
        }
    }
    if norm == PopulationNorm::Population {
        for (values, &total) in series.iter_mut().zip(counts.iter()) {
            if total > 0 {
                let inv = 1.0 / total as f64;
                values.iter_mut().for_each(|v| *v *= inv);
            }
        }
    }
    series
}

/// Runs of consecutive frames spent in one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterLifetime {
    pub cluster_id: usize,
    pub n_runs: usize,
    pub longest_run: usize,
    pub mean_run: f64,
}

pub fn lifetimes(labels: &[i32], n_clusters: usize) -> Vec<ClusterLifetime> {
    let mut runs: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
    let mut current: Option<(usize, usize)> = None;
    for &label in labels {
        let cluster = (label >= 0).then_some(label as usize);
        current = match (current, cluster) {
            (Some((c, len)), Some(next)) if c == next => Some((c, len + 1)),
            (prev, next) => {
                if let Some((c, len)) = prev {
                    runs[c].push(len);
                }
                next.map(|c| (c, 1))
            }
        };
    }
    if let Some((c, len)) = current {
        runs[c].push(len);
    }
    runs.into_iter()
        .enumerate()
        .map(|(cluster_id, lens)| ClusterLifetime {
            cluster_id,
            n_runs: lens.len(),
            longest_run: lens.iter().copied().max().unwrap_or(0),
            mean_run: if lens.is_empty() {
                0.0
            } else {
                lens.iter().sum::<usize>() as f64 / lens.len() as f64
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::NOISE;

    fn line_projection(
        points: &[f64],
        labels: Vec<i32>,
        centroids: Vec<usize>,
    ) -> (Projection, DistanceMatrix) {
        let d = DistanceMatrix::from_fn(points.len(), |i, j| (points[i] - points[j]).abs());
        let n_clusters = centroids.len();
        let mut sizes = vec![0usize; n_clusters];
        for &l in &labels {
            if l >= 0 {
                sizes[l as usize] += 1;
            }
        }
        let p = Projection {
            labels: labels.clone(),
            n_clusters,
            centroids: centroids.clone(),
            local_centroids: centroids,
            sizes,
            retained_labels: labels,
        };
        (p, d)
    }

    #[test]
    fn summary_reports_spread_and_nearest_cluster() {
        let (p, d) = line_projection(
            &[0.0, 1.0, 2.0, 10.0, 12.0],
            vec![0, 0, 0, 1, 1],
            vec![1, 3],
        );
        let s = summarize(&p, &d);
        assert_eq!(s.len(), 2);
        assert_eq!(s[0].population, 3);
        assert!((s[0].fraction - 0.6).abs() < 1e-12);
        // Pairs 1, 2, 1.
        assert!((s[0].avg_distance - 4.0 / 3.0).abs() < 1e-6);
        let expected_sd = ((2.0 * (1.0f64 / 3.0).powi(2) + (2.0f64 / 3.0).powi(2)) / 3.0).sqrt();
        assert!((s[0].stdev_distance - expected_sd).abs() < 1e-6);
        assert_eq!(s[0].nearest_cluster, Some(1));
        assert!((s[0].nearest_distance.unwrap() - 9.0).abs() < 1e-6);
        assert!((s[1].avg_distance - 2.0).abs() < 1e-6);
        assert_eq!(s[1].stdev_distance, 0.0);
    }

    #[test]
    fn single_cluster_has_no_neighbour() {
        let (p, d) = line_projection(&[0.0, 1.0], vec![0, 0], vec![0]);
        let s = summarize(&p, &d);
        assert_eq!(s[0].nearest_cluster, None);
        assert_eq!(s[0].nearest_distance, None);
    }

    #[test]
    fn fraction_counts_noise_frames() {
        let (p, d) = line_projection(&[0.0, 0.1, 50.0, 0.2], vec![0, 0, NOISE, 0], vec![1]);
        let s = summarize(&p, &d);
        assert!((s[0].fraction - 0.75).abs() < 1e-12);
    }

    #[test]
    fn silhouette_is_high_for_separated_groups() {
        let (p, d) = line_projection(&[0.0, 0.1, 10.0, 10.1], vec![0, 0, 1, 1], vec![0, 2]);
        let sil = silhouette(&p, &d);
        assert!(sil.overall > 0.95);
        assert_eq!(sil.per_cluster.len(), 2);
        assert!(sil.per_cluster.iter().all(|&s| s > 0.95));
    }

    #[test]
    fn silhouette_handles_singletons_and_noise() {
        let (p, d) = line_projection(&[0.0, 5.0, 5.5, 99.0], vec![0, 1, 1, NOISE], vec![0, 1]);
        let sil = silhouette(&p, &d);
        assert_eq!(sil.per_cluster[0], 0.0);
        // a = 0.5, b = 5.0 or 5.5.
        let expected = ((1.0 - 0.5 / 5.0) + (1.0 - 0.5 / 5.5)) / 2.0;
        assert!((sil.per_cluster[1] - expected).abs() < 1e-6);
        assert!((sil.overall - expected * 2.0 / 3.0).abs() < 1e-6);

        let (p, d) = line_projection(&[0.0, 1.0], vec![0, 0], vec![0]);
        assert_eq!(silhouette(&p, &d).overall, 0.0);
    }

    #[test]
    fn cumulative_population_with_each_normalization() {
        let labels = [0, 1, 1, NOISE, 0, 1];
        let raw = population_vs_time(&labels, 2, PopulationNorm::None);
        assert_eq!(raw[0], vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
        assert_eq!(raw[1], vec![0.0, 1.0, 2.0, 2.0, 2.0, 3.0]);

        let by_pop = population_vs_time(&labels, 2, PopulationNorm::Population);
        assert_eq!(by_pop[0], vec![0.5, 0.5, 0.5, 0.5, 1.0, 1.0]);
        assert!((by_pop[1][1] - 1.0 / 3.0).abs() < 1e-12);
        assert!((by_pop[1][5] - 1.0).abs() < 1e-12);

        let by_frame = population_vs_time(&labels, 2, PopulationNorm::Frame);
        assert_eq!(by_frame[1][2], 2.0 / 3.0);
        assert_eq!(by_frame[0][3], 0.25);
    }

    #[test]
    fn lifetimes_count_contiguous_runs() {
        let labels = [1, 1, 0, 0, 0, NOISE, 0, 1, 1, 1];
        let life = lifetimes(&labels, 3);
        assert_eq!(life[0].n_runs, 2);
        assert_eq!(life[0].longest_run, 3);
        assert_eq!(life[0].mean_run, 2.0);
        assert_eq!(life[1].n_runs, 2);
        assert_eq!(life[1].longest_run, 3);
        assert_eq!(life[1].mean_run, 2.5);
        assert_eq!(life[2].n_runs, 0);
        assert_eq!(life[2].mean_run, 0.0);
    }
}
