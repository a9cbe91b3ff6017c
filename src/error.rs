/// Failures surfaced by the probe. Missing local documents are not here:
/// they are logged and skipped during provisioning.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0} environment variable is required")]
    MissingCredential(&'static str),

    #[error("provisioning failed: {0:#}")]
    Provisioning(anyhow::Error),

    #[error("assistant response timeout on run {run_id} after {attempts} polls")]
    RunTimeout { run_id: String, attempts: u32 },

    #[error("assistant run {run_id} failed: {message}")]
    RunFailed { run_id: String, message: String },

    #[error("assistant run {run_id} was cancelled")]
    RunCancelled { run_id: String },

    #[error("assistant run {run_id} stopped with status {status}")]
    UnexpectedRunStatus { run_id: String, status: String },

    #[error("assistant service error: {0:#}")]
    Service(#[from] anyhow::Error),
}
