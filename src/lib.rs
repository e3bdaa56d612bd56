//! This crate provides a channel statistics server for meteorological mast data. Clients upload
//! Parquet data files holding time-indexed sensor channels, then list the channels of a file by
//! type and compute the mean and standard deviation of channels over a date range.
//!
//! Data files are stored in an S3-compatible object store, keyed by the MD5 digest of their
//! contents, so uploading the same file twice stores it once.
//!
//! The server is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [AWS SDK for S3](aws-sdk-s3) is used to interact with S3-compatible object stores.
//! * [Parquet](parquet) and [Arrow](arrow) decode data files.
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used in numerical
//!   computation.

pub mod app;
pub mod app_state;
pub mod channels;
pub mod cli;
pub mod dataset;
pub mod date_range;
pub mod error;
pub mod file_store;
pub mod metrics;
pub mod models;
pub mod object_store;
pub mod query_params;
pub mod resource_manager;
pub mod s3_client;
pub mod server;
pub mod statistics;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod validated_json;
