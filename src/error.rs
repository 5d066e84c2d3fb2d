use thiserror::Error;

/// Every failure the pipeline can report. Input, geometry and solver errors
/// are recoverable: the caller can fix the geometry and recompute.
#[derive(Debug, Error)]
pub enum ChladniError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Degenerate geometry error: triangle ({}, {}, {}) {reason}", .triangle[0], .triangle[1], .triangle[2])]
    DegenerateGeometry { triangle: [usize; 3], reason: String },
    #[error("Degenerate geometry error: {0}")]
    DegenerateMesh(String),
    #[error("Mesher error: {0}")]
    Mesher(String),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Post Processor error: {0}")]
    PostProcessor(String),
}

impl ChladniError {
    /// True for the errors a user can recover from by editing the geometry
    /// or the meshing parameters and recomputing.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ChladniError::BackendUnavailable(_))
    }
}
