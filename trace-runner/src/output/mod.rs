//! Output post-processing
//!
//! Streaming output never passes through here; the supervisor connects the
//! tracer's stdout to its destination directly. In flame graph mode the
//! captured samples are rendered and the image is written as one artifact.

pub mod artifact;
pub mod flamegraph;

pub use artifact::{write_artifact, Artifact};
pub use flamegraph::{FlameGraph, FlameGraphConfig};

use crate::domain::{OutputDestination, PipelineError};

/// File name used for flame graphs written into a directory
pub const FLAMEGRAPH_FILE_NAME: &str = "flamegraph.svg";
/// File name used for streamed output written into a directory
pub const STREAM_FILE_NAME: &str = "trace.txt";

/// Flame graph post-processing for captured tracer output
#[derive(Debug, Clone)]
pub struct OutputPipeline {
    flamegraph: FlameGraph,
}

impl OutputPipeline {
    #[must_use]
    pub fn new(config: FlameGraphConfig) -> Self {
        Self { flamegraph: FlameGraph::new(config) }
    }

    /// Render `raw` stack samples and write the image to `destination`.
    ///
    /// Nothing is written when either stage fails.
    ///
    /// # Errors
    /// Returns the first stage or write failure.
    pub async fn finish(
        &self,
        raw: &[u8],
        destination: &OutputDestination,
    ) -> Result<Artifact, PipelineError> {
        let image = self.flamegraph.generate(raw).await?;
        write_artifact(&image, destination, FLAMEGRAPH_FILE_NAME).await
    }
}
