//! Error handling.

use arrow::error::ArrowError;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_smithy_types::byte_stream::error::Error as ByteStreamError;
use axum::{
    extract::rejection::JsonRejection,
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDateTime;
use parquet::errors::ParquetError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

/// Channel stats server error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum ChannelStatsError {
    /// Error decoding Arrow data from a data file
    #[error("failed to read data file")]
    Arrow(#[from] ArrowError),

    /// A requested channel is not a column of the data file
    #[error("Channel_id {channel_id} is not available")]
    ChannelNotAvailable { channel_id: String },

    /// Start date later than end date
    #[error("Start_date {start} greater than end_date {end}")]
    DateRangeOrder {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    /// Upload request without any data
    #[error("upload payload is empty")]
    EmptyUpload,

    /// End date provided without a start date
    #[error("Cannot provide end_date without start_date")]
    EndDateWithoutStartDate,

    /// No object stored for the file identifier
    #[error("data file {file_id} not found")]
    FileNotFound { file_id: String },

    /// Insufficient memory to process request
    #[error("Insufficient memory to process request ({requested} > {total})")]
    InsufficientMemory { requested: usize, total: usize },

    /// Requested channel type is not one of the known channel types
    #[error("Requested invalid channel type: {channel_type}")]
    InvalidChannelType { channel_type: String },

    /// Date that could not be parsed
    #[error("Invalid {field}: {value}")]
    InvalidDate { field: &'static str, value: String },

    /// Data file without a timestamp column to index by
    #[error("data file has no time index column")]
    MissingTimeIndex,

    /// Error decoding Parquet data
    #[error("failed to read data file")]
    Parquet(#[from] ParquetError),

    /// Error deserialising request data
    #[error("request data is not valid")]
    RequestDataJsonRejection(#[from] JsonRejection),

    /// Error validating request data (single error)
    #[error("request data is not valid")]
    RequestDataValidationSingle(#[from] validator::ValidationError),

    /// Error validating request data (multiple errors)
    #[error("request data is not valid")]
    RequestDataValidation(#[from] validator::ValidationErrors),

    /// Error reading object data from S3
    #[error("error receiving object from S3 storage")]
    S3ByteStream(#[from] ByteStreamError),

    /// Missing Content-Length header in S3 response.
    #[error("S3 response missing Content-Length header")]
    S3ContentLengthMissing,

    /// Error while retrieving an object from S3
    #[error("error retrieving object from S3 storage")]
    S3GetObject(#[from] SdkError<GetObjectError>),

    /// Error while checking for an object in S3
    #[error("error checking object in S3 storage")]
    S3HeadObject(#[from] SdkError<HeadObjectError>),

    /// Error while storing an object in S3
    #[error("error storing object in S3 storage")]
    S3PutObject(#[from] SdkError<PutObjectError>),

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),
}

impl IntoResponse for ChannelStatsError {
    /// Convert from a `ChannelStatsError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// Body of error response
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorBody {
    /// Main error message
    message: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorBody {
    /// Return a new ErrorBody
    ///
    /// # Arguments
    ///
    /// * `error`: The error that occurred
    fn new<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorBody { message, caused_by }
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Response body
    error: ErrorBody,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. This will be formatted into a suitable `ErrorBody`
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: ErrorBody::new(error),
        }
    }

    /// Return a 400 bad request ErrorResponse
    fn bad_request<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// Return a 401 unauthorised ErrorResponse
    fn unauthorised<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::UNAUTHORIZED, error)
    }

    /// Return a 404 not found ErrorResponse
    fn not_found<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    /// Return a 422 unprocessable entity ErrorResponse
    fn unprocessable_entity<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, error)
    }

    /// Return a 500 internal server error ErrorResponse
    fn internal_server_error<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    /// Tailor the response to a generic S3 SDK error.
    ///
    /// Service errors are classified by their S3 error code, since many end up as unhandled
    /// variants of the operation-specific error type.
    fn from_sdk_error<E>(sdk_error: &SdkError<E>, error: &ChannelStatsError) -> Self
    where
        E: ProvideErrorMetadata,
    {
        match sdk_error {
            SdkError::ConstructionFailure(_)
            | SdkError::DispatchFailure(_)
            | SdkError::ResponseError(_)
            | SdkError::TimeoutError(_) => Self::internal_server_error(error),

            SdkError::ServiceError(service_error) => match service_error.err().code() {
                // Not found
                Some("NoSuchKey") | Some("NotFound") => Self::not_found(error),

                // Bad request
                Some("NoSuchBucket") => Self::bad_request(error),

                // Unauthorised
                Some("InvalidAccessKeyId")
                | Some("SignatureDoesNotMatch")
                | Some("AccessDenied") => Self::unauthorised(error),

                // Internal server error
                _ => Self::internal_server_error(error),
            },

            // The enum is marked as non-exhaustive
            _ => Self::internal_server_error(error),
        }
    }
}

impl From<ChannelStatsError> for ErrorResponse {
    /// Convert from a `ChannelStatsError` into an `ErrorResponse`.
    fn from(error: ChannelStatsError) -> Self {
        let response = match &error {
            // Bad request
            ChannelStatsError::EmptyUpload
            | ChannelStatsError::InsufficientMemory {
                requested: _,
                total: _,
            }
            | ChannelStatsError::RequestDataJsonRejection(_)
            | ChannelStatsError::S3ContentLengthMissing => Self::bad_request(&error),

            // Not found
            ChannelStatsError::ChannelNotAvailable { channel_id: _ }
            | ChannelStatsError::FileNotFound { file_id: _ } => Self::not_found(&error),

            // Unprocessable entity
            ChannelStatsError::Arrow(_)
            | ChannelStatsError::DateRangeOrder { start: _, end: _ }
            | ChannelStatsError::EndDateWithoutStartDate
            | ChannelStatsError::InvalidChannelType { channel_type: _ }
            | ChannelStatsError::InvalidDate { field: _, value: _ }
            | ChannelStatsError::MissingTimeIndex
            | ChannelStatsError::Parquet(_)
            | ChannelStatsError::RequestDataValidationSingle(_)
            | ChannelStatsError::RequestDataValidation(_) => Self::unprocessable_entity(&error),

            // Internal server error
            ChannelStatsError::TryFromInt(_)
            | ChannelStatsError::S3ByteStream(_)
            | ChannelStatsError::SemaphoreAcquireError(_) => Self::internal_server_error(&error),

            ChannelStatsError::S3GetObject(sdk_error) => {
                match sdk_error {
                    // This is a more specific ServiceError variant, with GetObjectError as the
                    // inner error.
                    SdkError::ServiceError(get_obj_error) => match get_obj_error.err() {
                        GetObjectError::NoSuchKey(_) => Self::not_found(&error),
                        GetObjectError::InvalidObjectState(_) => Self::bad_request(&error),
                        _ => Self::from_sdk_error(sdk_error, &error),
                    },
                    _ => Self::from_sdk_error(sdk_error, &error),
                }
            }
            ChannelStatsError::S3HeadObject(sdk_error) => Self::from_sdk_error(sdk_error, &error),
            ChannelStatsError::S3PutObject(sdk_error) => Self::from_sdk_error(sdk_error, &error),
        };

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
