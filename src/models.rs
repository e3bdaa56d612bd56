//! Request and response data types and associated functions and methods

use crate::error::ChannelStatsError;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use strum_macros::Display;
use validator::{Validate, ValidationError};

/// Channel types available in a data file
///
/// Each channel (column) name of a data file starts with the name of its type.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum ChannelType {
    /// Wind velocity
    Vel,
    /// Standard deviation of wind velocity
    Std,
    /// Detrended standard deviation of wind velocity
    StdDtr,
    /// Temperature
    Temp,
    /// Humidity
    Hum,
    /// Pressure
    Press,
    /// Wind direction
    Dir,
    /// Standard deviation of wind direction
    Sdir,
}

impl ChannelType {
    /// All channel types, in listing order.
    pub const ALL: [ChannelType; 8] = [
        Self::Vel,
        Self::Std,
        Self::StdDtr,
        Self::Temp,
        Self::Hum,
        Self::Press,
        Self::Dir,
        Self::Sdir,
    ];

    /// Returns the name of the channel type as used in requests and responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vel => "vel",
            Self::Std => "std",
            Self::StdDtr => "std_dtr",
            Self::Temp => "temp",
            Self::Hum => "hum",
            Self::Press => "press",
            Self::Dir => "dir",
            Self::Sdir => "sdir",
        }
    }
}

impl FromStr for ChannelType {
    type Err = ChannelStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|channel_type| channel_type.as_str() == s)
            .ok_or_else(|| ChannelStatsError::InvalidChannelType {
                channel_type: s.to_string(),
            })
    }
}

/// Remove duplicates from a list, keeping the first occurrence of each item.
fn dedup_ordered<T: PartialEq>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut unique = Vec::new();
    for item in items {
        if !unique.contains(&item) {
            unique.push(item)
        }
    }
    unique
}

/// Validate a file identifier: a lowercase hex MD5 digest.
pub fn validate_file_id(file_id: &str) -> Result<(), ValidationError> {
    let is_digest = file_id.len() == 32
        && file_id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !is_digest {
        let mut error =
            ValidationError::new("file_id must be a 32 character lowercase hex MD5 digest");
        error.add_param("file_id".into(), &file_id);
        return Err(error);
    }
    Ok(())
}

/// Request data for channel listing
#[derive(Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct ChannelRequest {
    /// Identifier of the data file
    #[validate(custom = "validate_file_id")]
    pub file_id: String,
    /// Channel types to list. All types are listed if omitted or empty.
    #[serde(default)]
    pub channel_list: Option<Vec<String>>,
}

impl ChannelRequest {
    /// Returns the requested channel types without duplicates.
    ///
    /// Fails if any requested type is not a known [ChannelType].
    pub fn channel_types(&self) -> Result<Vec<ChannelType>, ChannelStatsError> {
        let channel_types = self
            .channel_list
            .iter()
            .flatten()
            .map(|name| name.parse())
            .collect::<Result<Vec<ChannelType>, _>>()?;
        Ok(dedup_ordered(channel_types))
    }
}

/// Request data for channel statistics
#[derive(Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct StatsRequest {
    /// Identifier of the data file
    #[validate(custom = "validate_file_id")]
    pub file_id: String,
    /// Channels to compute statistics for. All channels are used if omitted or empty.
    #[serde(default)]
    pub channel_ids: Option<Vec<String>>,
    /// Start and end dates in YYYY-MM-DD format. Either may be null.
    #[serde(default)]
    #[validate(length(max = 2, message = "Malformed date range, length larger than two"))]
    pub date_range: Option<Vec<Option<String>>>,
}

impl StatsRequest {
    /// Returns the requested channel identifiers without duplicates.
    pub fn channel_ids(&self) -> Vec<String> {
        dedup_ordered(self.channel_ids.iter().flatten().cloned())
    }

    /// Returns the start date string, if provided.
    pub fn start_date(&self) -> Option<&str> {
        self.date_range
            .as_ref()
            .and_then(|range| range.first())
            .and_then(|date| date.as_deref())
    }

    /// Returns the end date string, if provided.
    pub fn end_date(&self) -> Option<&str> {
        self.date_range
            .as_ref()
            .and_then(|range| range.get(1))
            .and_then(|date| date.as_deref())
    }
}

/// Channel names grouped by channel type
///
/// Types that were not requested are omitted from the serialised response.
#[derive(Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Channels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vel: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dtr: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hum: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub press: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdir: Option<Vec<String>>,
}

impl Channels {
    /// Returns a mutable reference to the entry for a channel type.
    pub fn entry(&mut self, channel_type: ChannelType) -> &mut Option<Vec<String>> {
        match channel_type {
            ChannelType::Vel => &mut self.vel,
            ChannelType::Std => &mut self.std,
            ChannelType::StdDtr => &mut self.std_dtr,
            ChannelType::Temp => &mut self.temp,
            ChannelType::Hum => &mut self.hum,
            ChannelType::Press => &mut self.press,
            ChannelType::Dir => &mut self.dir,
            ChannelType::Sdir => &mut self.sdir,
        }
    }
}

/// Statistics of a single channel
///
/// Values are `None` when there is too little data to compute them.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Stats {
    /// Channel mean
    pub mean: Option<f64>,
    /// Channel sample standard deviation
    pub std: Option<f64>,
}

/// Statistics keyed by channel name
pub type ChannelStats = BTreeMap<String, Stats>;

/// Response to an upload request
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct FileId {
    /// Identifier of the data file
    pub file_id: String,
    /// True if the file was written to storage, false if it already existed
    pub stored: bool,
}
