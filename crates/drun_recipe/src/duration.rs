//! Serde support for timeout values: either an integer number of seconds
//! or a humantime string such as `"100ms"` or `"2h"`.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

pub fn opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    Option::<Raw>::deserialize(deserializer)?
        .map(|raw| match raw {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(&text).map_err(serde::de::Error::custom),
        })
        .transpose()
}
