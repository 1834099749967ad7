use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Sim(#[from] sim::Error),
    #[error("{}", msg)]
    Custom { status: StatusCode, msg: String },
}

impl Error {
    pub fn custom<T: std::fmt::Display>(status: StatusCode, msg: T) -> Self {
        Error::Custom {
            status,
            msg: msg.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Sim(sim::Error::MissingParameter(_)) => StatusCode::BAD_REQUEST,
            Error::Sim(sim::Error::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Error::Sim(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Custom { status, .. } => *status,
        }
    }

    // Diagnostics go out as plain text; the UI shows them verbatim.
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}
