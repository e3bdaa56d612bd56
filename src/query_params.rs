//! Axum extractor for query strings with repeated keys

use crate::error::ChannelStatsError;
use crate::models::{ChannelRequest, StatsRequest};

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;
use validator::Validate;

/// Decoded query string parameters, in order of appearance.
///
/// Unlike axum's `Query` extractor, a key may appear more than once, as in
/// `?channel_id=vel32&channel_id=std32`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(pub Vec<(String, String)>);

#[async_trait]
impl<S> FromRequestParts<S> for QueryParams
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    /// Extract `QueryParams` from the request URI.
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::parse(parts.uri.query().unwrap_or_default()))
    }
}

impl QueryParams {
    /// Parse a URL-encoded query string.
    pub fn parse(query: &str) -> Self {
        Self(
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        )
    }

    /// Returns the first value of a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }

    /// Returns every value of a key.
    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Build a validated channel listing request.
    ///
    /// # Arguments
    ///
    /// * `file_id`: File identifier from the path. The `file_id` parameter is used if `None`.
    pub fn channel_request(
        &self,
        file_id: Option<String>,
    ) -> Result<ChannelRequest, ChannelStatsError> {
        let request = ChannelRequest {
            file_id: self.file_id(file_id),
            channel_list: Some(self.get_all("channel_type")),
        };
        request.validate()?;
        Ok(request)
    }

    /// Build a validated statistics request.
    ///
    /// # Arguments
    ///
    /// * `file_id`: File identifier from the path. The `file_id` parameter is used if `None`.
    pub fn stats_request(
        &self,
        file_id: Option<String>,
    ) -> Result<StatsRequest, ChannelStatsError> {
        let request = StatsRequest {
            file_id: self.file_id(file_id),
            channel_ids: Some(self.get_all("channel_id")),
            date_range: Some(vec![
                self.get("start_date").map(str::to_string),
                self.get("end_date").map(str::to_string),
            ]),
        };
        request.validate()?;
        Ok(request)
    }

    fn file_id(&self, file_id: Option<String>) -> String {
        file_id
            .or_else(|| self.get("file_id").map(str::to_string))
            .unwrap_or_default()
    }
}
