use thiserror::Error;

/// Errors raised while turning a provider payload into a canonical record.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A mandatory member is missing or has the wrong shape. This points at a
    /// change in the provider contract and must reach the caller.
    #[error("Malformed observation: {0}")]
    MalformedObservation(String),
}

impl NormalizeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        NormalizeError::MalformedObservation(reason.into())
    }
}

impl From<serde_json::Error> for NormalizeError {
    fn from(err: serde_json::Error) -> Self {
        NormalizeError::MalformedObservation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_errors_become_malformed_observations() {
        let err = serde_json::from_str::<u8>("\"nope\"").unwrap_err();
        let err = NormalizeError::from(err);

        assert!(matches!(err, NormalizeError::MalformedObservation(_)));
        assert!(err.to_string().starts_with("Malformed observation"));
    }
}
