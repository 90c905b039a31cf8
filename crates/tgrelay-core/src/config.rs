use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, forward::RetryPolicy, Result};

/// Typed configuration for the relay.
///
/// Built once at startup and shared as `Arc<Config>`. Switching bot
/// credentials means loading a new `Config` and building a new platform
/// adapter from it.
#[derive(Clone, Debug)]
pub struct Config {
    // Platform
    pub telegram_bot_token: Option<String>,

    // Persisted state
    pub data_dir: PathBuf,
    pub session_file: PathBuf,
    pub replacements_file: PathBuf,
    pub chats_file: PathBuf,

    // Forwarding loop
    pub poll_interval: Duration,
    pub fetch_max_retries: usize,
    pub fetch_backoff_initial: Duration,
    pub fetch_backoff_max: Duration,

    // Telegram adapter
    pub history_limit: usize,
    pub throttle_global: Duration,
    pub throttle_per_chat: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load from the process environment, reading `.env` first.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(|key| env::var(key).ok());
        fs::create_dir_all(&cfg.data_dir)?;
        Ok(cfg)
    }

    /// Build from an arbitrary key lookup. Unknown or unparsable values fall
    /// back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").map(|s| s.trim().to_string());

        let data_dir = get("TGRELAY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let in_data_dir = |key: &str, default: &str| {
            let p = get(key).map(PathBuf::from).unwrap_or_else(|| default.into());
            if p.is_absolute() {
                p
            } else {
                data_dir.join(p)
            }
        };
        let session_file = in_data_dir("SESSION_FILE", "last_used_chats.txt");
        let replacements_file = in_data_dir("REPLACEMENTS_FILE", "replacements.json");
        let chats_file = in_data_dir("CHATS_FILE", "chats.txt");

        let millis = |key: &str, default: u64| {
            Duration::from_millis(get(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default))
        };
        let count = |key: &str, default: usize| {
            get(key)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(default)
        };

        // Polling cadence (parity with the legacy fixed 5s delay).
        let poll_interval = millis("POLL_INTERVAL_MS", 5_000);
        let fetch_max_retries = count("FETCH_MAX_RETRIES", 3);
        let fetch_backoff_initial = millis("FETCH_BACKOFF_INITIAL_MS", 1_000);
        let fetch_backoff_max = millis("FETCH_BACKOFF_MAX_MS", 30_000);

        let history_limit = count("HISTORY_LIMIT", 1_000).max(1);
        let throttle_global = millis("THROTTLE_GLOBAL_MS", 40);
        let throttle_per_chat = millis("THROTTLE_PER_CHAT_MS", 1_050);

        Self {
            telegram_bot_token,
            data_dir,
            session_file,
            replacements_file,
            chats_file,
            poll_interval,
            fetch_max_retries,
            fetch_backoff_initial,
            fetch_backoff_max,
            history_limit,
            throttle_global,
            throttle_per_chat,
        }
    }

    /// The bot token, required only by commands that talk to the platform.
    pub fn bot_token(&self) -> Result<&str> {
        self.telegram_bot_token.as_deref().ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.fetch_max_retries,
            initial_backoff: self.fetch_backoff_initial,
            multiplier: 2,
            max_backoff: self.fetch_backoff_max,
        }
    }
}

/// Split a comma separated list into trimmed, lowercased, non-empty entries.
pub fn parse_csv_lower(v: Option<&str>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
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

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
