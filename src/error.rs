use actix_web::{http::StatusCode, ResponseError};
use log::error;
use sea_orm::{DbErr, TransactionError};
use thiserror::Error;

use crate::response::response_from_error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("please login first")]
    NeedLogin,
    #[error("system_exception")]
    System,
}

impl AppError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn need_login() -> Self {
        Self::NeedLogin
    }

    pub fn system_exception() -> Self {
        Self::System
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) => 1,
            Self::NotFound(_) => 2,
            Self::NeedLogin => 3,
            Self::Forbidden(_) => 5,
            Self::System => 99,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NeedLogin => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::System => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        response_from_error(self)
    }
}

/// Logs a storage failure and hides its details from the caller.
pub fn db_error(err: DbErr) -> AppError {
    error!("database error: {}", err);
    AppError::system_exception()
}

pub fn map_tx_error(err: TransactionError<AppError>) -> AppError {
    match err {
        TransactionError::Connection(e) => db_error(e),
        TransactionError::Transaction(app) => app,
    }
}
