use thiserror::Error as ThisError;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Failures at the boundary with the external classification service.
///
/// The classifier client retries every variant except `Exhausted`, which is what the caller sees
/// once the retry budget is spent.
#[derive(Debug, ThisError)]
pub enum ClassifyError {
    #[error("request to the classification service failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("classification service returned status {status}: {body}")]
    Service { status: u16, body: String },

    #[error("unable to parse the classification response: {reason}")]
    Parse { reason: String },

    #[error("classification failed after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<ClassifyError>,
    },
}

impl ClassifyError {
    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}
