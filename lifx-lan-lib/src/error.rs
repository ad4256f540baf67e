use crate::probe::ProbeError;

/// Failures surfaced to callers of the directory and the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The label was not present after a full network probe.
    #[error("No LIFX device found with label: {label}")]
    NotFound { label: String },

    /// Arguments were rejected before any network I/O.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// A probe call made on behalf of one label failed.
    #[error("Device '{label}': {source}")]
    Device {
        label: String,
        #[source]
        source: ProbeError,
    },

    /// A probe call not tied to any label (a bare enumeration) failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Attaches the label a probe failure happened for.
    pub(crate) fn for_label(self, label: &str) -> Self {
        match self {
            Error::Probe(source) => Error::Device {
                label: label.to_string(),
                source,
            },
            other => other,
        }
    }

    /// The label this error concerns, when one is known.
    pub fn label(&self) -> Option<&str> {
        match self {
            Error::NotFound { label } | Error::Device { label, .. } => Some(label),
            Error::Validation(_) | Error::Probe(_) => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
