use thiserror::Error;

/// Error taxonomy for a scout run.
///
/// `Launch` and `Write` are fatal to the whole run. `Navigation` and
/// `Extraction` are contained at the keyword boundary by the orchestrator:
/// the keyword's result stays empty or partial and the run moves on.
/// A manual-login timeout is *not* an error and never surfaces here.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("artifact write failed: {0}")]
    Write(String),

    #[error("run aborted by operator")]
    Aborted,
}

impl ScoutError {
    /// `true` for errors the orchestrator absorbs at the keyword boundary.
    pub fn is_keyword_scoped(&self) -> bool {
        matches!(
            self,
            ScoutError::Navigation { .. } | ScoutError::Extraction(_)
        )
    }
}
