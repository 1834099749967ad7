use thiserror::Error as ThisError;

pub mod params;
pub mod registry;
pub mod runner;

pub use params::{Fingerprint, Invocation, ParamMap, ParamSpec};
pub use registry::JobRegistry;
pub use runner::{SimOutput, SimRunner};

/// Everything that can go wrong between receiving a request and answering
/// it. `Clone` because concurrent requests attached to the same in-flight
/// run all observe the same failure.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// A required parameter is absent, null, empty or zero. Raised before
    /// any fingerprinting or process work.
    #[error("missing parameter: {0}")]
    MissingParameter(String),
    /// The executable could not be started or awaited.
    #[error("failed to run simulation: {0}")]
    Spawn(String),
    /// The process exited non-zero; the message is its stderr.
    #[error("{}", stderr)]
    Simulation { stderr: String },
    /// The process exited zero but its output had no parsable JSON line;
    /// the message is the raw stdout, kept for diagnosis.
    #[error("{}", stdout)]
    MalformedOutput { stdout: String },
    #[error("simulation timed out after {}s", .0.as_secs())]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
