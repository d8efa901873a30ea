// Adapter-level error kinds and their HTTP mapping

use thiserror::Error;

use crate::gateway::GatewayFailure;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Missing or placeholder credentials. Raised before any gateway call.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("gateway error: {code} : {detail}")]
    Gateway { code: String, detail: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl AdapterError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AdapterError::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AdapterError::InvalidState(msg.into())
    }

    /// Map adapter error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AdapterError::Configuration(_) => 500,
            AdapterError::Gateway { .. } => 502,
            AdapterError::Validation(_) => 400,
            AdapterError::InvalidState(_) => 409,
            AdapterError::NotFound(_) => 404,
            AdapterError::Storage(_) => 500,
        }
    }
}

impl From<GatewayFailure> for AdapterError {
    fn from(f: GatewayFailure) -> Self {
        let first = f.first();
        AdapterError::Gateway {
            code: first.code,
            detail: first.detail,
        }
    }
}

impl From<anyhow::Error> for AdapterError {
    fn from(e: anyhow::Error) -> Self {
        AdapterError::Storage(format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayErrorDetail;

    #[test]
    fn test_gateway_failure_uses_first_error() {
        let failure = GatewayFailure {
            errors: vec![
                GatewayErrorDetail::new("CARD_DECLINED", "Card was declined"),
                GatewayErrorDetail::new("GENERIC_DECLINE", "ignored"),
            ],
        };
        let err = AdapterError::from(failure);
        assert_eq!(err.to_string(), "gateway error: CARD_DECLINED : Card was declined");
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AdapterError::validation("x").status_code(), 400);
        assert_eq!(AdapterError::invalid_state("x").status_code(), 409);
        assert_eq!(AdapterError::Configuration("x".into()).status_code(), 500);
    }
}
