use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::Value;

use crate::moderation::ModerationError;
use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Field-level form failures plus the submitted values, so the client can
/// show the form again with what the user typed.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FormErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub values: Value,
}

impl FormErrors {
    pub fn new(values: impl Serialize) -> Self {
        Self { fields: BTreeMap::new(), values: serde_json::to_value(values).unwrap_or(Value::Null) }
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields.entry(field.to_owned()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Folds `validator` output in, using each rule's message or its code.
    pub fn merge(&mut self, errs: &validator::ValidationErrors) {
        for (field, list) in errs.field_errors() {
            for e in list.iter() {
                let msg = e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| default_message(e));
                self.add(field.as_ref(), msg);
            }
        }
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() { Ok(()) } else { Err(ApiError::Validation(self)) }
    }
}

fn default_message(e: &validator::ValidationError) -> String {
    match e.code.as_ref() {
        "length" => "Ensure this value has a valid length.".into(),
        "url" => "Enter a valid URL.".into(),
        "regex" => "Enter a valid value.".into(),
        other => format!("Invalid value ({other})."),
    }
}

#[derive(Debug, Serialize)]
struct ValidationBody<'a> {
    error: &'static str,
    fields: &'a BTreeMap<String, Vec<String>>,
    values: &'a Value,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("forbidden")] Forbidden,
    #[error("unauthorized")] Unauthorized,
    #[error("validation")] Validation(FormErrors),
    #[error("conflict")] Conflict,
    #[error("bad request")] BadRequest,
    #[error("service unavailable")] ServiceUnavailable,
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Internal(_) => ApiError::Internal,
        }
    }
}

impl From<ModerationError> for ApiError {
    fn from(e: ModerationError) -> Self {
        match e {
            ModerationError::NotFound => ApiError::NotFound,
            ModerationError::Forbidden => ApiError::Forbidden,
            ModerationError::Repo(e) => e.into(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut resp = HttpResponse::build(self.status_code());
        match self {
            ApiError::Validation(form) => resp.json(ValidationBody {
                error: "validation",
                fields: &form.fields,
                values: &form.values,
            }),
            other => resp.json(ApiErrorBody { error: other.to_string() }),
        }
    }
}
