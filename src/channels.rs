//! Classification of data file columns into channel types.

use crate::models::{ChannelType, Channels};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Column name patterns, indexed by ChannelType discriminant.
    static ref CHANNEL_TYPE_PATTERNS: [Regex; 8] = [
        Regex::new(r"^vel[0-9]*.[0-9]*").unwrap(),
        Regex::new(r"^std[0-9]*.[0-9]*$").unwrap(),
        Regex::new(r"^std[0-9]*.[0-9]*_detrend$").unwrap(),
        Regex::new(r"^temp[0-9]*.[0-9]*").unwrap(),
        Regex::new(r"^hum[0-9]*.[0-9]*").unwrap(),
        Regex::new(r"^press[0-9]*.[0-9]*").unwrap(),
        Regex::new(r"^dir[0-9]*.[0-9]*").unwrap(),
        Regex::new(r"sdir").unwrap(),
    ];
}

/// Returns the regular expression matching column names of a channel type.
fn pattern(channel_type: ChannelType) -> &'static Regex {
    &CHANNEL_TYPE_PATTERNS[channel_type as usize]
}

/// Returns the channel names of a given type, in column order.
///
/// # Arguments
///
/// * `channel_type`: Type of channel to match
/// * `names`: Column names of a data file
pub fn channels_of_type<'a, I>(channel_type: ChannelType, names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let re = pattern(channel_type);
    names
        .into_iter()
        .filter(|name| re.is_match(name))
        .map(str::to_string)
        .collect()
}

/// Group column names by channel type.
///
/// If `channel_types` is empty every channel type is listed, otherwise only the requested ones.
/// Listed types with no matching columns map to an empty list.
///
/// # Arguments
///
/// * `names`: Column names of a data file
/// * `channel_types`: Requested channel types
pub fn sort_channels(names: &[&str], channel_types: &[ChannelType]) -> Channels {
    let channel_types = if channel_types.is_empty() {
        &ChannelType::ALL[..]
    } else {
        channel_types
    };
    let mut channels = Channels::default();
    for channel_type in channel_types {
        *channels.entry(*channel_type) =
            Some(channels_of_type(*channel_type, names.iter().copied()));
    }
    channels
}
