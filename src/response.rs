use actix_web::{error::JsonPayloadError, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::error::AppError;

#[derive(Serialize)]
pub struct ResponseDto<T: Serialize> {
    pub data: Option<T>,
    pub code: i32,
    pub msg: String,
}

impl<T: Serialize> ResponseDto<T> {
    pub fn success(data: Option<T>) -> Self {
        Self {
            data,
            code: 0,
            msg: "".to_string(),
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        JsonPayloadError::ContentType => AppError::invalid_request("content type must be application/json"),
        JsonPayloadError::Deserialize(e) => AppError::invalid_request(format!("invalid request body: {}", e)),
        _ => AppError::invalid_request("invalid request body"),
    };
    app_err.into()
}

pub fn response_from_error(err: &AppError) -> HttpResponse {
    HttpResponse::build(err.status_code()).json(ResponseDto::<()> {
        data: None,
        code: err.code(),
        msg: err.to_string(),
    })
}
