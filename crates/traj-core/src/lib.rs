#![forbid(unsafe_code)]

pub mod error;
pub mod frame;
pub mod geom;
pub mod mask;

pub use error::{TrajError, TrajResult};
pub use frame::{normalize_frame_indices, FrameChunk, FrameChunkBuilder, FrameSource, FrameSubset};
pub use geom::{
    centroid, kabsch_rmsd, kabsch_rmsd_centered, rmsd_nofit, superpose, CenteredCoords,
    Superposition,
};
pub use mask::{AtomMask, ResolvedMask};
