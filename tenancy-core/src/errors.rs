//! # Errors
//!
//! Every fallible path in the core returns `anyhow::Result`. Failures the
//! tenancy layer raises itself are [`TenancyError`]s inside that
//! `anyhow::Error`; anything else (a store going away, say) is left as is
//! and surfaces as `GeneralError` once [`TenancyError::normalize`]d.
//!
//! The JSON shape follows Feathers: `{name, message, code, className}` plus
//! optional `data` and `errors`.

use std::fmt;

use anyhow::Error as AnyError;
use serde_json::{json, Map, Value};

pub type TenancyResult<T> = std::result::Result<T, AnyError>;

/// The failure kinds tenancy produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    NotFound,
    /// A field failed validation; `errors` names the field.
    Unprocessable,
    GeneralError,
}

impl ErrorKind {
    /// `(code, name, className)`
    const fn parts(self) -> (u16, &'static str, &'static str) {
        match self {
            ErrorKind::BadRequest => (400, "BadRequest", "bad-request"),
            ErrorKind::Forbidden => (403, "Forbidden", "forbidden"),
            ErrorKind::NotFound => (404, "NotFound", "not-found"),
            ErrorKind::Unprocessable => (422, "Unprocessable", "unprocessable"),
            ErrorKind::GeneralError => (500, "GeneralError", "general-error"),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.parts().0
    }

    pub fn name(&self) -> &'static str {
        self.parts().1
    }

    pub fn class_name(&self) -> &'static str {
        self.parts().2
    }
}

#[derive(Debug)]
pub struct TenancyError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
    /// Per-field messages, `{ "<field>": ["<message>"] }`.
    pub errors: Option<Value>,
    source: Option<AnyError>,
}

impl TenancyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            errors: None,
            source: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }

    /// `Unprocessable`, with the message also listed under `field`.
    pub fn invalid_field(field: &str, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let mut errors = Map::new();
        errors.insert(field.to_string(), json!([msg.clone()]));
        Self::new(ErrorKind::Unprocessable, msg).with_errors(Value::Object(errors))
    }

    pub fn tenant_undetermined(global: &str) -> Self {
        Self::general_error(format!("Could not determine tenant for global \"{global}\""))
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    pub fn from_anyhow(err: &AnyError) -> Option<&TenancyError> {
        err.chain().find_map(|e| e.downcast_ref::<TenancyError>())
    }

    /// The `TenancyError` inside `err`, or a `GeneralError` wrapping it.
    pub fn normalize(err: AnyError) -> TenancyError {
        match err.downcast::<TenancyError>() {
            Ok(tenancy) => tenancy,
            Err(other) => {
                let mut general = TenancyError::general_error(other.to_string());
                general.source = Some(other);
                general
            }
        }
    }

    /// Copy without the wrapped cause.
    pub fn sanitize_for_client(&self) -> TenancyError {
        TenancyError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            errors: self.errors.clone(),
            source: None,
        }
    }

    pub fn to_json(&self) -> Value {
        let (code, name, class_name) = self.kind.parts();
        let mut body = Map::new();
        body.insert("name".into(), name.into());
        body.insert("message".into(), self.message.clone().into());
        body.insert("code".into(), code.into());
        body.insert("className".into(), class_name.into());
        if let Some(data) = &self.data {
            body.insert("data".into(), data.clone());
        }
        if let Some(errors) = &self.errors {
            body.insert("errors".into(), errors.clone());
        }
        Value::Object(body)
    }
}

impl fmt::Display for TenancyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message)
    }
}

impl std::error::Error for TenancyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// `return Err(TenancyError::<ctor>(..).into_anyhow())`, with optional formatting.
#[macro_export]
macro_rules! bail_tenancy {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::TenancyError::$ctor($msg).into_anyhow())
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::TenancyError::$ctor(format!($fmt, $($arg)*)).into_anyhow())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_violation_payload() {
        let err = TenancyError::invalid_field("slug", "Slug is required");
        assert_eq!(err.code(), 422);
        assert_eq!(
            err.to_json(),
            json!({
                "name": "Unprocessable",
                "message": "Slug is required",
                "code": 422,
                "className": "unprocessable",
                "errors": { "slug": ["Slug is required"] }
            })
        );
    }

    #[test]
    fn foreign_errors_normalize_to_general() {
        let err = TenancyError::normalize(anyhow::anyhow!("connection refused"));
        assert_eq!(err.kind, ErrorKind::GeneralError);
        assert_eq!(err.message, "connection refused");

        let kept = TenancyError::normalize(TenancyError::forbidden("no").into_anyhow());
        assert_eq!(kept.kind, ErrorKind::Forbidden);
    }

    #[test]
    fn found_through_context() {
        let err = TenancyError::not_found("gone").into_anyhow().context("loading tenant");
        assert_eq!(TenancyError::from_anyhow(&err).map(|e| e.kind), Some(ErrorKind::NotFound));
    }
}
