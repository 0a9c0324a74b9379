pub mod logs;
pub mod metrics;
pub mod send_details;
pub mod status;

pub use logs::logs_handler;
pub use metrics::metrics_handler;
pub use send_details::send_details_handler;
pub use status::status_page_handler;

use actix_web::{error::QueryPayloadError, http::StatusCode, web, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Renders malformed query strings as [`ApiError::InvalidQuery`] JSON bodies.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err: QueryPayloadError, _req: &HttpRequest| {
        ApiError::InvalidQuery(err.to_string()).into()
    })
}
