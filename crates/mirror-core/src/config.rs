use std::{env, fs, path::Path, time::Duration};

use tracing::warn;

use crate::{domain::ChannelId, errors::Error, Result};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(800);
pub const DEFAULT_EMBED_LINK_HOPS: u8 = 1;
pub const DEFAULT_HEALTH_PORT: u16 = 3000;

/// Typed configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub source_channels: Vec<ChannelId>,
    pub target_channel: ChannelId,

    // Media
    pub max_upload_bytes: usize,
    pub fetch_delay: Duration,
    pub embed_link_hops: u8,

    // Health
    pub health_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let discord_token = lookup("DISCORD_TOKEN").unwrap_or_default();
        if discord_token.trim().is_empty() {
            return Err(Error::Config(
                "DISCORD_TOKEN environment variable is required".to_string(),
            ));
        }

        let target_raw = lookup("TARGET_CHANNEL").unwrap_or_default();
        if target_raw.trim().is_empty() {
            return Err(Error::Config(
                "TARGET_CHANNEL environment variable is required".to_string(),
            ));
        }
        let target_channel = target_raw
            .trim()
            .parse::<u64>()
            .map(ChannelId)
            .map_err(|_| Error::Config(format!("TARGET_CHANNEL is not a channel id: {target_raw}")))?;

        let source_channels = parse_csv_channels(lookup("SOURCE_CHANNELS"));
        if source_channels.is_empty() {
            warn!("SOURCE_CHANNELS is empty; nothing will be mirrored");
        }

        let max_upload_bytes =
            parse_num::<usize>(&lookup, "MAX_UPLOAD_BYTES").unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let fetch_delay = parse_num::<u64>(&lookup, "UPLOAD_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_FETCH_DELAY);
        let embed_link_hops =
            parse_num::<u8>(&lookup, "EMBED_LINK_HOPS").unwrap_or(DEFAULT_EMBED_LINK_HOPS);
        let health_port = parse_num::<u16>(&lookup, "PORT").unwrap_or(DEFAULT_HEALTH_PORT);

        Ok(Self {
            discord_token: discord_token.trim().to_string(),
            source_channels,
            target_channel,
            max_upload_bytes,
            fetch_delay,
            embed_link_hops,
            health_port,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_num<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = raw.trim().parse::<T>().ok();
    if parsed.is_none() {
        warn!(key, value = %raw, "ignoring unparsable setting, using default");
    }
    parsed
}

fn parse_csv_channels(v: Option<String>) -> Vec<ChannelId> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<u64>() {
            Ok(id) => Some(ChannelId(id)),
            Err(_) => {
                warn!(entry = s, "skipping invalid SOURCE_CHANNELS entry");
                None
            }
        })
        .collect()
}
