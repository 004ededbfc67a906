use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Missing ?target=…")]
    MissingTarget,

    #[error("Invalid target")]
    InvalidTarget(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MissingTarget => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidTarget(ref target) => {
                log::debug!("unusable target {target:?}");
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        }
        .into_response()
    }
}
