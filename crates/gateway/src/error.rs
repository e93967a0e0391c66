use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    thiserror::Error,
    wabridge_sessions::SessionError,
};

/// Error returned by HTTP handlers, rendered as `{error, code}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    Timeout(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Provider(_) => "PROVIDER",
            Self::Timeout(_) => "TIMEOUT",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::NotFound(_) => Self::NotFound(message),
            SessionError::NotReady { .. } | SessionError::Conflict(_) => Self::Conflict(message),
            SessionError::Provider(_) => Self::Provider(message),
            SessionError::Timeout { .. } => Self::Timeout(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string(), "code": self.code() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration, wabridge_sessions::SessionState};

    #[test]
    fn session_errors_map_to_statuses() {
        let cases = [
            (SessionError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (
                SessionError::NotReady {
                    user_id: "a".into(),
                    state: SessionState::Initializing,
                },
                StatusCode::CONFLICT,
            ),
            (
                SessionError::Timeout {
                    operation: "connect",
                    timeout: Duration::from_secs(1),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn renders_code() {
        let resp = ApiError::Validation("bad".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
