//! Decoding of Parquet data files into time-indexed numeric channels.
//!
//! A data file is a table with one time index column and any number of channel columns. The
//! index column is the first column listed in the pandas `index_columns` metadata, if that
//! column holds timestamps or dates, and otherwise the first column that does. Every other
//! numeric column is a channel. Non-numeric columns are ignored.

use crate::date_range::DateRange;
use crate::error::ChannelStatsError;

use arrow::array::{Array, ArrayRef, ArrowPrimitiveType, AsArray, PrimitiveArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Float64Type, Schema, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use arrow::temporal_conversions::{
    date32_to_datetime, date64_to_datetime, timestamp_ms_to_datetime, timestamp_ns_to_datetime,
    timestamp_s_to_datetime, timestamp_us_to_datetime,
};
use bytes::Bytes;
use chrono::NaiveDateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;

/// Schema metadata key under which pandas describes a DataFrame.
const PANDAS_METADATA_KEY: &str = "pandas";

/// The part of pandas schema metadata that locates the index.
#[derive(Deserialize)]
struct PandasMetadata {
    #[serde(default)]
    index_columns: Vec<serde_json::Value>,
}

/// A numeric channel of a data file.
///
/// Missing values are stored as NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    name: String,
    values: Vec<f64>,
}

impl Channel {
    /// Returns the channel (column) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the channel values, one per row.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// A decoded data file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    index: Vec<Option<NaiveDateTime>>,
    channels: Vec<Channel>,
}

impl Dataset {
    /// Decode a Parquet data file.
    ///
    /// # Arguments
    ///
    /// * `data`: Contents of the Parquet file
    #[tracing::instrument(level = "DEBUG", skip(data), fields(size = data.len()))]
    pub fn from_parquet(data: Bytes) -> Result<Self, ChannelStatsError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
        let schema = builder.schema().clone();
        let index_column = find_index_column(&schema)?;
        let channel_columns = channel_columns(&schema, index_column);
        let mut index = Vec::new();
        let mut channels: Vec<Channel> = channel_columns
            .iter()
            .map(|&column| Channel {
                name: schema.field(column).name().clone(),
                values: Vec::new(),
            })
            .collect();
        for batch in builder.build()? {
            let batch = batch?;
            index.extend(to_datetimes(batch.column(index_column))?);
            for (channel, &column) in channels.iter_mut().zip(channel_columns.iter()) {
                let values = cast(batch.column(column), &DataType::Float64)?;
                channel.values.extend(
                    values
                        .as_primitive::<Float64Type>()
                        .iter()
                        .map(|value| value.unwrap_or(f64::NAN)),
                );
            }
        }
        Ok(Self { index, channels })
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns whether the data file has no rows.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the time index, with `None` for null index values.
    pub fn index(&self) -> &[Option<NaiveDateTime>] {
        &self.index
    }

    /// Returns all channels, in column order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Returns the channel names, in column order.
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(Channel::name).collect()
    }

    /// Returns the named channels, in the requested order.
    ///
    /// All channels are returned if `channel_ids` is empty.
    pub fn select_channels(
        &self,
        channel_ids: &[String],
    ) -> Result<Vec<&Channel>, ChannelStatsError> {
        if channel_ids.is_empty() {
            return Ok(self.channels.iter().collect());
        }
        channel_ids
            .iter()
            .map(|channel_id| {
                self.channels
                    .iter()
                    .find(|channel| channel.name == *channel_id)
                    .ok_or_else(|| ChannelStatsError::ChannelNotAvailable {
                        channel_id: channel_id.clone(),
                    })
            })
            .collect()
    }

    /// Returns the positions of rows whose index lies within a date range.
    pub fn rows_in(&self, range: &DateRange) -> Vec<usize> {
        self.index
            .iter()
            .enumerate()
            .filter(|(_, value)| range.contains(**value))
            .map(|(row, _)| row)
            .collect()
    }
}

/// Read the channel names of a Parquet data file without decoding its rows.
#[tracing::instrument(level = "DEBUG", skip(data), fields(size = data.len()))]
pub fn read_channel_names(data: Bytes) -> Result<Vec<String>, ChannelStatsError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema = builder.schema();
    let index_column = find_index_column(schema)?;
    Ok(channel_columns(schema, index_column)
        .into_iter()
        .map(|column| schema.field(column).name().clone())
        .collect())
}

/// Check that a Parquet data file has a time index column, without decoding its rows.
///
/// Returns the number of rows in the file.
#[tracing::instrument(level = "DEBUG", skip(data), fields(size = data.len()))]
pub fn check_data_file(data: Bytes) -> Result<i64, ChannelStatsError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    find_index_column(builder.schema())?;
    Ok(builder.metadata().file_metadata().num_rows())
}

/// Returns whether a column type can serve as a time index.
fn is_time_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
    )
}

/// Locate the time index column of a schema.
fn find_index_column(schema: &Schema) -> Result<usize, ChannelStatsError> {
    let pandas_index = schema
        .metadata()
        .get(PANDAS_METADATA_KEY)
        .and_then(|json| serde_json::from_str::<PandasMetadata>(json).ok())
        .and_then(|metadata| {
            // Range indexes are described by an object rather than a column name.
            metadata
                .index_columns
                .into_iter()
                .next()
                .and_then(|column| column.as_str().map(str::to_string))
        })
        .and_then(|name| schema.index_of(&name).ok())
        .filter(|&column| is_time_type(schema.field(column).data_type()));
    pandas_index
        .or_else(|| {
            schema
                .fields()
                .iter()
                .position(|field| is_time_type(field.data_type()))
        })
        .ok_or(ChannelStatsError::MissingTimeIndex)
}

/// Returns the positions of the numeric columns other than the index.
fn channel_columns(schema: &Schema, index_column: usize) -> Vec<usize> {
    schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(column, field)| *column != index_column && field.data_type().is_numeric())
        .map(|(column, _)| column)
        .collect()
}

fn convert<T, F>(array: &PrimitiveArray<T>, to_datetime: F) -> Vec<Option<NaiveDateTime>>
where
    T: ArrowPrimitiveType,
    F: Fn(T::Native) -> Option<NaiveDateTime>,
{
    array
        .iter()
        .map(|value| value.and_then(&to_datetime))
        .collect()
}

/// Convert a time index column to naive datetimes.
///
/// Timezone-aware timestamps are converted in UTC.
fn to_datetimes(array: &ArrayRef) -> Result<Vec<Option<NaiveDateTime>>, ChannelStatsError> {
    let datetimes = match array.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => convert(
            array.as_primitive::<TimestampSecondType>(),
            timestamp_s_to_datetime,
        ),
        DataType::Timestamp(TimeUnit::Millisecond, _) => convert(
            array.as_primitive::<TimestampMillisecondType>(),
            timestamp_ms_to_datetime,
        ),
        DataType::Timestamp(TimeUnit::Microsecond, _) => convert(
            array.as_primitive::<TimestampMicrosecondType>(),
            timestamp_us_to_datetime,
        ),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => convert(
            array.as_primitive::<TimestampNanosecondType>(),
            timestamp_ns_to_datetime,
        ),
        DataType::Date32 => convert(array.as_primitive::<Date32Type>(), date32_to_datetime),
        DataType::Date64 => convert(array.as_primitive::<Date64Type>(), date64_to_datetime),
        _ => return Err(ChannelStatsError::MissingTimeIndex),
    };
    Ok(datetimes)
}
