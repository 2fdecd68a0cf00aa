//! Response envelopes: a payload tagged with the HTTP status that produced it.
//!
//! Generated request functions return a value whose payload type depends on
//! its status code. [`ResponseEnvelope`] is the generic two-family form;
//! per-operation enums can implement [`Envelope`] directly so every declared
//! status gets its own variant.

mod unwrap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RequestError;

pub use unwrap::{
    extract, extract_many, extract_or, flat_map_many, is_error, is_success, reduce_many,
    sum_total,
};

/// Status codes treated as success.
pub const SUCCESS_STATUSES: [u16; 3] = [200, 201, 204];

/// Check whether a status code belongs to the success family.
pub fn is_success_status(status: u16) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// Success-family status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuccessStatus {
    /// 200
    Ok,
    /// 201
    Created,
    /// 204
    NoContent,
}

impl SuccessStatus {
    /// Numeric status code.
    pub fn code(self) -> u16 {
        match self {
            SuccessStatus::Ok => 200,
            SuccessStatus::Created => 201,
            SuccessStatus::NoContent => 204,
        }
    }

    /// Map a status code into the success family.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(SuccessStatus::Ok),
            201 => Some(SuccessStatus::Created),
            204 => Some(SuccessStatus::NoContent),
            _ => None,
        }
    }
}

/// Error-family status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStatus {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 422
    UnprocessableEntity,
    /// 500
    InternalServerError,
    /// Any other 3xx, 4xx or 5xx code.
    Other(u16),
}

impl FailureStatus {
    /// Numeric status code.
    pub fn code(self) -> u16 {
        match self {
            FailureStatus::BadRequest => 400,
            FailureStatus::Unauthorized => 401,
            FailureStatus::Forbidden => 403,
            FailureStatus::NotFound => 404,
            FailureStatus::UnprocessableEntity => 422,
            FailureStatus::InternalServerError => 500,
            FailureStatus::Other(code) => code,
        }
    }

    /// Map a status code into the error family.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            400 => Some(FailureStatus::BadRequest),
            401 => Some(FailureStatus::Unauthorized),
            403 => Some(FailureStatus::Forbidden),
            404 => Some(FailureStatus::NotFound),
            422 => Some(FailureStatus::UnprocessableEntity),
            500 => Some(FailureStatus::InternalServerError),
            300..=599 => Some(FailureStatus::Other(code)),
            _ => None,
        }
    }
}

/// An envelope narrowed to one status family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Narrowed<S, F> {
    /// Success-family payload.
    Success(S),
    /// Error-family payload.
    Failure(F),
}

impl<S, F> Narrowed<S, F> {
    /// The success payload, if any.
    pub fn success(self) -> Option<S> {
        match self {
            Narrowed::Success(data) => Some(data),
            Narrowed::Failure(_) => None,
        }
    }

    /// The error payload, if any.
    pub fn failure(self) -> Option<F> {
        match self {
            Narrowed::Success(_) => None,
            Narrowed::Failure(data) => Some(data),
        }
    }
}

/// A response value whose payload type is determined by its status code.
pub trait Envelope {
    /// Payload of the success family.
    type Success;
    /// Payload of the error family.
    type Failure;

    /// The HTTP status code.
    fn status(&self) -> u16;

    /// Borrow the payload, narrowed to its family.
    fn narrow(&self) -> Narrowed<&Self::Success, &Self::Failure>;

    /// Take the payload, narrowed to its family.
    fn into_narrowed(self) -> Narrowed<Self::Success, Self::Failure>
    where
        Self: Sized;

    /// Whether the status is in the success family.
    fn is_success(&self) -> bool {
        self.success().is_some()
    }

    /// Borrow the success payload. `None` for every error-family status.
    fn success(&self) -> Option<&Self::Success> {
        if !is_success_status(self.status()) {
            return None;
        }
        self.narrow().success()
    }

    /// Take the success payload. `None` for every error-family status.
    fn into_success(self) -> Option<Self::Success>
    where
        Self: Sized,
    {
        if !is_success_status(self.status()) {
            return None;
        }
        self.into_narrowed().success()
    }
}

/// Generic envelope with one success and one error payload type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEnvelope<S, F> {
    /// 200, 201 or 204.
    Success {
        /// Status code.
        status: SuccessStatus,
        /// Success payload.
        data: S,
    },
    /// Any error-family status.
    Failure {
        /// Status code.
        status: FailureStatus,
        /// Error payload.
        data: F,
    },
}

impl<S, F> ResponseEnvelope<S, F> {
    /// A `200 OK` envelope.
    pub fn ok(data: S) -> Self {
        ResponseEnvelope::Success {
            status: SuccessStatus::Ok,
            data,
        }
    }

    /// A `201 Created` envelope.
    pub fn created(data: S) -> Self {
        ResponseEnvelope::Success {
            status: SuccessStatus::Created,
            data,
        }
    }

    /// An error-family envelope.
    pub fn failure(status: FailureStatus, data: F) -> Self {
        ResponseEnvelope::Failure { status, data }
    }
}

impl<S: DeserializeOwned, F: DeserializeOwned> ResponseEnvelope<S, F> {
    /// Decode a raw response.
    ///
    /// An empty body decodes as JSON `null`, so `S = ()` covers `204 No Content`.
    pub fn from_response(status: u16, body: &[u8]) -> Result<Self, RequestError> {
        if let Some(status) = SuccessStatus::from_code(status) {
            return Ok(ResponseEnvelope::Success {
                status,
                data: decode_body(body)?,
            });
        }
        if let Some(status) = FailureStatus::from_code(status) {
            return Ok(ResponseEnvelope::Failure {
                status,
                data: decode_body(body)?,
            });
        }
        Err(RequestError::UnexpectedStatus(status))
    }
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RequestError> {
    let decoded = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_slice(body)
    };
    decoded.map_err(|err| RequestError::Decode(err.to_string()))
}

impl<S, F> Envelope for ResponseEnvelope<S, F> {
    type Success = S;
    type Failure = F;

    fn status(&self) -> u16 {
        match self {
            ResponseEnvelope::Success { status, .. } => status.code(),
            ResponseEnvelope::Failure { status, .. } => status.code(),
        }
    }

    fn narrow(&self) -> Narrowed<&S, &F> {
        match self {
            ResponseEnvelope::Success { data, .. } => Narrowed::Success(data),
            ResponseEnvelope::Failure { data, .. } => Narrowed::Failure(data),
        }
    }

    fn into_narrowed(self) -> Narrowed<S, F> {
        match self {
            ResponseEnvelope::Success { data, .. } => Narrowed::Success(data),
            ResponseEnvelope::Failure { data, .. } => Narrowed::Failure(data),
        }
    }
}
