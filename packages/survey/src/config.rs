//! Runtime settings of the survey service.

use std::time::Duration;

use chrono::{FixedOffset, Offset as _, Utc};
use survey_map_codec::map_link::LinkStyle;

use crate::SurveyError;

/// Default dataset cache lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Default UTC offset in hours (America/Costa_Rica has no DST).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -6;

/// Settings read from `SURVEY_CACHE_TTL_SECS`, `SURVEY_UTC_OFFSET_HOURS`
/// and `SURVEY_LINK_STYLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurveyConfig {
    /// How long a fetched dataset is served from cache.
    pub cache_ttl: Duration,
    /// Zone used to stamp submissions.
    pub utc_offset: FixedOffset,
    /// How new map links are written.
    pub link_style: LinkStyle,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            utc_offset: offset_from_hours(DEFAULT_UTC_OFFSET_HOURS)
                .unwrap_or_else(|| Utc.fix()),
            link_style: LinkStyle::default(),
        }
    }
}

fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

impl SurveyConfig {
    /// Reads the settings from the environment, using defaults for unset
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Config`] if a variable is set to a value that
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, SurveyError> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("SURVEY_CACHE_TTL_SECS") {
            let secs = value.trim().parse::<u64>().map_err(|e| SurveyError::Config {
                message: format!("SURVEY_CACHE_TTL_SECS='{value}': {e}"),
            })?;
            config.cache_ttl = Duration::from_secs(secs);
        }

        if let Ok(value) = std::env::var("SURVEY_UTC_OFFSET_HOURS") {
            config.utc_offset = value
                .trim()
                .parse::<i32>()
                .ok()
                .and_then(offset_from_hours)
                .ok_or_else(|| SurveyError::Config {
                    message: format!("SURVEY_UTC_OFFSET_HOURS='{value}' is not a valid offset"),
                })?;
        }

        if let Ok(value) = std::env::var("SURVEY_LINK_STYLE") {
            config.link_style = value
                .parse()
                .map_err(|message| SurveyError::Config { message })?;
        }

        Ok(config)
    }
}
