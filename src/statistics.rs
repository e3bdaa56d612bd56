//! Per-channel summary statistics.

use crate::dataset::Dataset;
use crate::date_range::DateRange;
use crate::error::ChannelStatsError;
use crate::models::{ChannelStats, Stats};

use ndarray::Array1;

/// Compute the mean and sample standard deviation of a series.
///
/// NaN values are treated as missing and skipped. The mean is `None` for a series with no
/// values, and the standard deviation is `None` for fewer than two values.
pub fn series_stats<I>(values: I) -> Stats
where
    I: IntoIterator<Item = f64>,
{
    let values: Array1<f64> = values.into_iter().filter(|value| !value.is_nan()).collect();
    let std = if values.len() > 1 {
        Some(values.std(1.0))
    } else {
        None
    };
    Stats {
        mean: values.mean(),
        std,
    }
}

/// Compute statistics of channels over the rows of a date range.
///
/// # Arguments
///
/// * `dataset`: Decoded data file
/// * `channel_ids`: Channels to include. All channels are included if empty.
/// * `range`: Range of the time index to include
#[tracing::instrument(level = "DEBUG", skip(dataset))]
pub fn compute_stats(
    dataset: &Dataset,
    channel_ids: &[String],
    range: &DateRange,
) -> Result<ChannelStats, ChannelStatsError> {
    let channels = dataset.select_channels(channel_ids)?;
    let rows = dataset.rows_in(range);
    Ok(channels
        .into_iter()
        .map(|channel| {
            let values = channel.values();
            let stats = series_stats(rows.iter().map(|&row| values[row]));
            (channel.name().to_string(), stats)
        })
        .collect())
}
