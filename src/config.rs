//! Run parameters read from the process environment.
//!
//! Rank and size are not configured here: they belong to the transport
//! (`MPI_COMM_WORLD` for multi-process runs, the universe size for threads).
//!
//! # Environment Variables
//!
//! | Setting | Variable | Default |
//! |---------|----------|---------|
//! | grid side (in-process runs) | `TORUS_SIDE` | `2` |
//! | bytes sent to each neighbor | `TORUS_CHUNK_BYTES` | `8` |
//! | rounds | `TORUS_ROUNDS` | `1` |
//! | send completion | `TORUS_SEND_MODE` (`buffered`, `synchronous`) | `buffered` |
//! | message limit | `TORUS_MAX_MESSAGE_BYTES` | none |

use crate::error::ConfigError;
use crate::local::SendMode;
use std::env;
use std::str::FromStr;

pub(crate) const DEFAULT_SIDE: usize = 2;
pub(crate) const DEFAULT_CHUNK_LEN: usize = 8;

/// Parameters of an exchange run.
///
/// # Example
///
/// ```
/// use torus_exchange::{ExchangeConfig, SendMode};
///
/// let vars = [("TORUS_SIDE", "3"), ("TORUS_SEND_MODE", "synchronous")];
/// let config = ExchangeConfig::from_lookup(|key| {
///     vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
/// })?;
///
/// assert_eq!(config.size(), 9);
/// assert_eq!(config.send_mode, SendMode::Synchronous);
/// # Ok::<(), torus_exchange::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Grid side for in-process runs
    pub side: usize,
    /// Bytes each participant sends to each neighbor
    pub chunk_len: usize,
    /// Number of rounds to run
    pub rounds: usize,
    /// When in-process sends complete
    pub send_mode: SendMode,
    /// Largest payload a transport accepts
    pub max_message_len: Option<usize>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            side: DEFAULT_SIDE,
            chunk_len: DEFAULT_CHUNK_LEN,
            rounds: 1,
            send_mode: SendMode::Buffered,
            max_message_len: None,
        }
    }
}

impl ExchangeConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let send_mode = match lookup("TORUS_SEND_MODE") {
            None => defaults.send_mode,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "buffered" => SendMode::Buffered,
                "synchronous" | "sync" => SendMode::Synchronous,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "TORUS_SEND_MODE",
                        value,
                    });
                }
            },
        };
        Ok(ExchangeConfig {
            side: positive(&lookup, "TORUS_SIDE")?.unwrap_or(defaults.side),
            chunk_len: positive(&lookup, "TORUS_CHUNK_BYTES")?.unwrap_or(defaults.chunk_len),
            rounds: positive(&lookup, "TORUS_ROUNDS")?.unwrap_or(defaults.rounds),
            send_mode,
            max_message_len: optional(&lookup, "TORUS_MAX_MESSAGE_BYTES")?,
        })
    }

    /// Number of participants in an in-process run.
    pub fn size(&self) -> usize {
        self.side * self.side
    }

    /// Bytes of output each participant needs.
    pub fn output_len(&self) -> usize {
        4 * self.chunk_len
    }
}

fn optional<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value })
        })
        .transpose()
}

fn positive<F>(lookup: &F, key: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, key)? {
        Some(0) => Err(ConfigError::Zero(key)),
        other => Ok(other),
    }
}
