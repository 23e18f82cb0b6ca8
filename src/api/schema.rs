use crate::model::core::User;
use crate::model::util::{FieldErrors, FormError, ServiceError};
use log::error;
use poem_openapi::types::multipart::Upload;
use poem_openapi::{Multipart, Object};
use poem_openapi::{payload::Json, ApiResponse, Tags};
use serde::{Deserialize, Serialize};

#[derive(Tags)]
pub enum ApiTags {
    Auth,
    Subs,
    Posts,
    Users,
    Votes,
    AiResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct ErrorMessage {
    error: String,
}

impl ErrorMessage {
    pub fn new(error: &str) -> Self {
        ErrorMessage {
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Object)]
pub struct SuccessMessage {
    success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Object)]
pub struct LoginResult {
    pub user: User,
    pub token: String,
}

/// The form of `/api/subs/:name/upload`.
#[derive(Debug, Multipart)]
pub struct UploadImagePayload {
    /// `image` or `banner`.
    #[oai(rename = "type")]
    pub kind: String,
    pub file: Upload,
}

const INTERNAL_ERROR: &str = "Something went wrong";

/// How an error from the model layer is reported to the client.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Form(FieldErrors),
    NotFound(String),
    Forbidden(String),
    Unavailable(String),
    Upstream(String),
    Internal,
}

pub fn classify(e: &anyhow::Error) -> ErrorKind {
    if let Some(form) = e.downcast_ref::<FormError>() {
        return ErrorKind::Form(form.errors.clone());
    }

    match e.downcast_ref::<ServiceError>() {
        Some(ServiceError::Invalid { field, msg }) => {
            let mut errors = FieldErrors::new();
            errors.insert(field.clone(), msg.clone());
            ErrorKind::Form(errors)
        }
        Some(ServiceError::NotFound { .. }) => ErrorKind::NotFound(e.to_string()),
        Some(ServiceError::Forbidden { .. }) => ErrorKind::Forbidden(e.to_string()),
        Some(ServiceError::Unavailable { .. }) => ErrorKind::Unavailable(e.to_string()),
        Some(ServiceError::Upstream { .. }) => ErrorKind::Upstream(e.to_string()),
        None => {
            error!("Unexpected error: {:?}", e);
            ErrorKind::Internal
        }
    }
}

#[derive(ApiResponse)]
pub enum RecordResponse<
    T: poem_openapi::types::Type
        + poem_openapi::types::ParseFromJSON
        + poem_openapi::types::ToJSON
        + Send
        + Sync,
> {
    #[oai(status = 200)]
    Ok(Json<T>),

    #[oai(status = 400)]
    BadRequest(Json<FieldErrors>),

    #[oai(status = 401)]
    Unauthorized(Json<ErrorMessage>),

    #[oai(status = 403)]
    Forbidden(Json<ErrorMessage>),

    #[oai(status = 404)]
    NotFound(Json<ErrorMessage>),

    #[oai(status = 500)]
    InternalError(Json<ErrorMessage>),
}

impl<
        T: poem_openapi::types::Type
            + poem_openapi::types::ParseFromJSON
            + poem_openapi::types::ToJSON
            + Send
            + Sync,
    > RecordResponse<T>
{
    pub fn ok(record: T) -> Self {
        Self::Ok(Json(record))
    }

    pub fn bad_request(errors: FieldErrors) -> Self {
        Self::BadRequest(Json(errors))
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized(Json(ErrorMessage::new("Unauthenticated")))
    }

    pub fn not_found(msg: &str) -> Self {
        Self::NotFound(Json(ErrorMessage::new(msg)))
    }

    pub fn internal_error() -> Self {
        Self::InternalError(Json(ErrorMessage::new(INTERNAL_ERROR)))
    }

    pub fn from_error(e: anyhow::Error) -> Self {
        match classify(&e) {
            ErrorKind::Form(errors) => Self::bad_request(errors),
            ErrorKind::NotFound(msg) => Self::not_found(&msg),
            ErrorKind::Forbidden(msg) => Self::Forbidden(Json(ErrorMessage::new(&msg))),
            ErrorKind::Unavailable(_) | ErrorKind::Upstream(_) | ErrorKind::Internal => {
                Self::internal_error()
            }
        }
    }
}

#[derive(ApiResponse)]
pub enum DeleteResponse {
    #[oai(status = 204)]
    NoContent,

    #[oai(status = 403)]
    Forbidden(Json<ErrorMessage>),

    #[oai(status = 404)]
    NotFound(Json<ErrorMessage>),

    #[oai(status = 500)]
    InternalError(Json<ErrorMessage>),
}

impl DeleteResponse {
    pub fn from_error(e: anyhow::Error) -> Self {
        match classify(&e) {
            ErrorKind::NotFound(msg) => Self::NotFound(Json(ErrorMessage::new(&msg))),
            ErrorKind::Forbidden(msg) => Self::Forbidden(Json(ErrorMessage::new(&msg))),
            _ => Self::InternalError(Json(ErrorMessage::new(INTERNAL_ERROR))),
        }
    }
}

#[derive(ApiResponse)]
pub enum LoginResponse {
    #[oai(status = 200)]
    Ok(Json<LoginResult>, #[oai(header = "Set-Cookie")] String),

    #[oai(status = 400)]
    BadRequest(Json<FieldErrors>),

    #[oai(status = 401)]
    Unauthorized(Json<FieldErrors>),

    #[oai(status = 404)]
    NotFound(Json<FieldErrors>),

    #[oai(status = 500)]
    InternalError(Json<ErrorMessage>),
}

impl LoginResponse {
    pub fn ok(user: User, token: String, cookie: String) -> Self {
        Self::Ok(Json(LoginResult { user, token }), cookie)
    }

    pub fn internal_error() -> Self {
        Self::InternalError(Json(ErrorMessage::new(INTERNAL_ERROR)))
    }
}

#[derive(ApiResponse)]
pub enum LogoutResponse {
    #[oai(status = 200)]
    Ok(Json<SuccessMessage>, #[oai(header = "Set-Cookie")] String),
}

impl LogoutResponse {
    pub fn ok(cookie: String) -> Self {
        Self::Ok(Json(SuccessMessage { success: true }), cookie)
    }
}

#[derive(ApiResponse)]
pub enum AiAnswerResponse {
    #[oai(status = 200)]
    Ok(Json<String>),

    #[oai(status = 400)]
    BadRequest(Json<FieldErrors>),

    #[oai(status = 404)]
    NotFound(Json<ErrorMessage>),

    #[oai(status = 500)]
    InternalError(Json<ErrorMessage>),

    #[oai(status = 502)]
    BadGateway(Json<ErrorMessage>),

    #[oai(status = 503)]
    ServiceUnavailable(Json<ErrorMessage>),
}

impl AiAnswerResponse {
    pub fn from_error(e: anyhow::Error) -> Self {
        match classify(&e) {
            ErrorKind::Form(errors) => Self::BadRequest(Json(errors)),
            ErrorKind::NotFound(msg) => Self::NotFound(Json(ErrorMessage::new(&msg))),
            ErrorKind::Unavailable(msg) => Self::ServiceUnavailable(Json(ErrorMessage::new(&msg))),
            ErrorKind::Upstream(msg) => Self::BadGateway(Json(ErrorMessage::new(&msg))),
            ErrorKind::Forbidden(_) | ErrorKind::Internal => {
                Self::InternalError(Json(ErrorMessage::new(INTERNAL_ERROR)))
            }
        }
    }
}
