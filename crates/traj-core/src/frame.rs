use crate::error::{TrajError, TrajResult};

/// Random-access view over an ordered sequence of frames.
///
/// Frames are addressed by their position in trajectory read order and are
/// never mutated through this trait. Implementations must be `Sync` so that
/// metric evaluation can fan out across worker threads.
pub trait FrameSource: Sync {
    fn n_atoms(&self) -> usize;
    fn n_frames(&self) -> usize;
    /// Coordinates of frame `index`, `n_atoms` entries of `[x, y, z, w]`.
    fn frame(&self, index: usize) -> &[[f32; 4]];
}

/// Contiguous block of frames sharing one atom count.
#[derive(Debug, Clone, Default)]
pub struct FrameChunk {
    pub n_atoms: usize,
    pub n_frames: usize,
    pub coords: Vec<[f32; 4]>,
}

impl FrameChunk {
    pub fn from_frames(frames: &[Vec<[f32; 4]>]) -> TrajResult<Self> {
        let n_atoms = frames.first().map(|f| f.len()).unwrap_or(0);
        let mut builder = FrameChunkBuilder::new(n_atoms, frames.len());
        for (idx, frame) in frames.iter().enumerate() {
            if frame.len() != n_atoms {
                return Err(TrajError::Mismatch(format!(
                    "frame {idx} has {} atoms, expected {n_atoms}",
                    frame.len()
                )));
            }
            builder.start_frame().copy_from_slice(frame);
        }
        builder.finish_take()
    }
}

impl FrameSource for FrameChunk {
    fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    fn n_frames(&self) -> usize {
        self.n_frames
    }

    fn frame(&self, index: usize) -> &[[f32; 4]] {
        let start = index * self.n_atoms;
        &self.coords[start..start + self.n_atoms]
    }
}

#[derive(Debug)]
pub struct FrameChunkBuilder {
    n_atoms: usize,
    n_frames: usize,
    coords_buf: Vec<[f32; 4]>,
}

impl FrameChunkBuilder {
    pub fn new(n_atoms: usize, max_frames: usize) -> Self {
        Self {
            n_atoms,
            n_frames: 0,
            coords_buf: Vec::with_capacity(n_atoms * max_frames),
        }
    }

    pub fn reset(&mut self, n_atoms: usize, max_frames: usize) {
        self.n_atoms = n_atoms;
        self.n_frames = 0;
        self.coords_buf.clear();
        self.coords_buf.reserve(n_atoms * max_frames);
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn start_frame(&mut self) -> &mut [[f32; 4]] {
        let frame_index = self.n_frames;
        self.n_frames += 1;
        let start = frame_index * self.n_atoms;
        let end = start + self.n_atoms;
        if self.coords_buf.len() < end {
            self.coords_buf.resize(end, [0.0; 4]);
        }
        &mut self.coords_buf[start..end]
    }

    pub fn finish_take(&mut self) -> TrajResult<FrameChunk> {
        let n_frames = self.n_frames;
        if self.coords_buf.len() != n_frames * self.n_atoms {
            return Err(TrajError::Parse("frame chunk buffer size mismatch".into()));
        }
        let coords = std::mem::take(&mut self.coords_buf);
        self.n_frames = 0;
        Ok(FrameChunk {
            n_atoms: self.n_atoms,
            n_frames,
            coords,
        })
    }
}

/// Maps signed frame indices onto `0..n_frames`.
///
/// A negative index counts back from the last frame. Indices that land
/// outside the trajectory are skipped; repeats and ordering are kept.
pub fn normalize_frame_indices(frame_indices: &[i64], n_frames: usize) -> Vec<usize> {
    let len = i64::try_from(n_frames).unwrap_or(i64::MAX);
    frame_indices
        .iter()
        .filter_map(|&raw| {
            let resolved = if raw < 0 { raw + len } else { raw };
            (0..len).contains(&resolved).then_some(resolved as usize)
        })
        .collect()
}

/// A [`FrameSource`] restricted to a list of frames of another source.
///
/// Position `k` of the subset maps to frame `indices[k]` of the parent.
pub struct FrameSubset<'a> {
    inner: &'a dyn FrameSource,
    indices: Vec<usize>,
}

impl<'a> FrameSubset<'a> {
    pub fn new(inner: &'a dyn FrameSource, indices: Vec<usize>) -> TrajResult<Self> {
        let n_frames = inner.n_frames();
        if let Some(&bad) = indices.iter().find(|&&idx| idx >= n_frames) {
            return Err(TrajError::Mismatch(format!(
                "frame index {bad} out of bounds for trajectory with {n_frames} frames"
            )));
        }
        Ok(Self { inner, indices })
    }

    pub fn from_signed(inner: &'a dyn FrameSource, frame_indices: &[i64]) -> Self {
        let indices = normalize_frame_indices(frame_indices, inner.n_frames());
        Self { inner, indices }
    }

    pub fn source_indices(&self) -> &[usize] {
        &self.indices
    }
}

impl FrameSource for FrameSubset<'_> {
    fn n_atoms(&self) -> usize {
        self.inner.n_atoms()
    }

    fn n_frames(&self) -> usize {
        self.indices.len()
    }

    fn frame(&self, index: usize) -> &[[f32; 4]] {
        self.inner.frame(self.indices[index])
    }
}
