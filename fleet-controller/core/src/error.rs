/// A failure to apply configuration to a proxy pod.
///
/// These errors are recorded as pod status rather than ending the agent's
/// connection.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// The agent reported that it could not apply a request.
    #[error("msg: {message}; error: {error}")]
    Agent { message: String, error: String },

    /// The agent's stream failed while a request was outstanding.
    #[error("{0}")]
    Connection(String),

    /// The pod was rejected before any configuration was sent.
    #[error("{0}")]
    Validation(String),

    #[error("{}", join_messages(.0))]
    Joined(Vec<ApplyError>),
}

// === impl ApplyError ===

impl ApplyError {
    /// Joins all present errors. A single error is returned as-is.
    pub fn join(errors: impl IntoIterator<Item = Option<ApplyError>>) -> Option<Self> {
        let mut errors = errors.into_iter().flatten().collect::<Vec<_>>();
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Joined(errors)),
        }
    }
}

fn join_messages(errors: &[ApplyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
