use crate::models::*;

use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use std::collections::HashMap;
use std::sync::Arc;

/// File identifier used in requests that do not touch storage.
pub(crate) const TEST_FILE_ID: &str = "9c750d0955a60f00557b488b713f9320";

/// Channel columns of the test data file, in column order.
pub(crate) const TEST_CHANNEL_NAMES: [&str; 15] = [
    "vel58.3",
    "std58.3",
    "std58.3_detrend",
    "temp56.8",
    "hum56.8",
    "press56.8",
    "dir56.3",
    "sdir56.3",
    "vel47.5",
    "std47.5",
    "std47.5_detrend",
    "vel32",
    "std32",
    "std32_detrend",
    "temp10",
];

/// Number of rows in the test data file, one per day from 2019-05-25.
pub(crate) const TEST_ROWS: usize = 10;

/// Create a ChannelRequest object with only required fields set.
pub(crate) fn get_test_channel_request() -> ChannelRequest {
    ChannelRequest {
        file_id: TEST_FILE_ID.to_string(),
        channel_list: None,
    }
}

/// Create a StatsRequest object with only required fields set.
pub(crate) fn get_test_stats_request() -> StatsRequest {
    StatsRequest {
        file_id: TEST_FILE_ID.to_string(),
        channel_ids: None,
        date_range: None,
    }
}

/// Create a StatsRequest object with all fields set.
pub(crate) fn get_test_stats_request_optional() -> StatsRequest {
    StatsRequest {
        file_id: TEST_FILE_ID.to_string(),
        channel_ids: Some(vec!["vel58.3".to_string()]),
        date_range: Some(vec![
            Some("2019-05-01".to_string()),
            Some("2019-07-01".to_string()),
        ]),
    }
}

/// Nanoseconds since the epoch at midnight of a date.
pub(crate) fn epoch_nanos(y: i32, m: u32, d: u32) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
    (date - epoch).num_seconds() * 1_000_000_000
}

/// Write a Parquet file with a nanosecond timestamp index and float channel columns.
///
/// # Arguments
///
/// * `index`: Index values in nanoseconds since the epoch
/// * `channels`: Channel names and values
/// * `pandas_index`: Whether to describe the index in pandas metadata and place it last, as
///   pandas does
pub(crate) fn write_parquet(
    index: Vec<Option<i64>>,
    channels: Vec<(&str, Vec<Option<f64>>)>,
    pandas_index: bool,
) -> Bytes {
    let index_field = Field::new(
        "timestamp",
        DataType::Timestamp(TimeUnit::Nanosecond, None),
        true,
    );
    let index_column: ArrayRef = Arc::new(TimestampNanosecondArray::from(index));
    let mut fields = Vec::new();
    let mut columns = Vec::new();
    if !pandas_index {
        fields.push(index_field.clone());
        columns.push(index_column.clone());
    }
    for (name, values) in channels {
        fields.push(Field::new(name, DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(values)) as ArrayRef);
    }
    let mut metadata = HashMap::new();
    if pandas_index {
        fields.push(index_field);
        columns.push(index_column);
        metadata.insert(
            "pandas".to_string(),
            r#"{"index_columns": ["timestamp"], "column_indexes": [], "columns": []}"#.to_string(),
        );
    }
    let schema = Arc::new(Schema::new(fields).with_metadata(metadata));
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    Bytes::from(buffer)
}

/// The test data file.
///
/// Rows are daily from 2019-05-25. Channel `j` holds `i + j` in row `i`, so `vel58.3` holds
/// 0 to 9. A non-numeric `station` column is also included.
pub(crate) fn get_test_parquet() -> Bytes {
    let index: Vec<Option<i64>> = (0..TEST_ROWS)
        .map(|i| Some(epoch_nanos(2019, 5, 25) + i as i64 * 86_400 * 1_000_000_000))
        .collect();
    let mut fields = vec![Field::new(
        "timestamp",
        DataType::Timestamp(TimeUnit::Nanosecond, None),
        true,
    )];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(TimestampNanosecondArray::from(index))];
    for (j, name) in TEST_CHANNEL_NAMES.iter().enumerate() {
        let values: Vec<f64> = (0..TEST_ROWS).map(|i| (i + j) as f64).collect();
        fields.push(Field::new(*name, DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(values)));
    }
    fields.push(Field::new("station", DataType::Utf8, true));
    columns.push(Arc::new(StringArray::from(vec!["north"; TEST_ROWS])));
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    Bytes::from(buffer)
}

/// A data file holding a single channel and no time index column.
pub(crate) fn get_test_parquet_without_index() -> Bytes {
    let schema = Arc::new(Schema::new(vec![Field::new(
        "vel58.3",
        DataType::Float64,
        true,
    )]));
    let column: ArrayRef = Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0]));
    let batch = RecordBatch::try_new(schema.clone(), vec![column]).unwrap();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    Bytes::from(buffer)
}
