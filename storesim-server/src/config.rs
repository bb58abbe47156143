//! Configuration for the storesim runner.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags of the `run` subcommand
//! 2. Environment variables (prefixed with `SS__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `SS__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `SS__HTTP_ADDR=0.0.0.0:9090` sets the HTTP server address
//! - `SS__WORKLOAD__THREADS=32` sets the number of workload threads
//! - `SS__WORKLOAD__READ_RATIO=0.8` sets the share of read operations
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! http_addr: 0.0.0.0:9090
//!
//! workload:
//!   threads: 32
//!   read_ratio: 0.8
//!   write_ratio: 0.15
//!   delete_ratio: 0.05
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use storesim_core::Configuration;
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "SS__";

/// Parameters of the synthetic workload.
///
/// Used in: [`Config::workload`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Workload {
    /// Number of worker threads executing operations.
    ///
    /// Must be at least `1`.
    ///
    /// # Default
    ///
    /// `16`
    ///
    /// # Environment Variable
    ///
    /// `SS__WORKLOAD__THREADS`
    pub threads: usize,

    /// Advisory number of keys the workload aims for.
    ///
    /// This is reported, but does not limit the workload.
    ///
    /// # Default
    ///
    /// `50000000`
    ///
    /// # Environment Variable
    ///
    /// `SS__WORKLOAD__TARGET_KEYS`
    pub target_keys: u64,

    /// Share of read operations.
    ///
    /// The three ratios must sum to `1.0`, otherwise startup fails.
    ///
    /// # Default
    ///
    /// `0.6`
    pub read_ratio: f64,

    /// Share of write operations.
    ///
    /// # Default
    ///
    /// `0.3`
    pub write_ratio: f64,

    /// Share of delete operations.
    ///
    /// # Default
    ///
    /// `0.1`
    pub delete_ratio: f64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            threads: 16,
            target_keys: 50_000_000,
            read_ratio: 0.6,
            write_ratio: 0.3,
            delete_ratio: 0.1,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
///
/// The runtime serves HTTP requests and the snapshot poller. Workload threads are not part of it.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the server runtime.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `SS__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// Log output format.
///
/// Used in: [`Logging::format`]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty printing on a TTY, simplified output otherwise.
    Auto,

    /// Multi-line, colored output for humans.
    Pretty,

    /// Single-line output without colors.
    Simplified,

    /// Newline-delimited JSON objects.
    Json,
}

/// Error returned when parsing an unknown [`LogFormat`].
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// `RUST_LOG` takes precedence over this setting when it is set.
    ///
    /// # Default
    ///
    /// `info`
    ///
    /// # Environment Variable
    ///
    /// `SS__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Output format, see [`LogFormat`].
    ///
    /// # Default
    ///
    /// `auto`
    ///
    /// # Environment Variable
    ///
    /// `SS__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the storesim runner.
///
/// Configuration is loaded with [`Config::load`], see the [module docs](self) for the supported
/// sources.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Socket address for the HTTP endpoints.
    ///
    /// # Default
    ///
    /// `0.0.0.0:9090`
    ///
    /// # Environment Variable
    ///
    /// `SS__HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// Directory for the runner state file.
    ///
    /// The number of live keys and the key allocator are saved here on shutdown and restored on
    /// the next start. The directory is created if it does not exist.
    ///
    /// # Default
    ///
    /// `data`
    ///
    /// # Environment Variable
    ///
    /// `SS__DATA_DIR`
    pub data_dir: PathBuf,

    /// Parameters of the synthetic workload.
    pub workload: Workload,

    /// Interval between statistics printed to the console.
    ///
    /// # Default
    ///
    /// `5s`
    #[serde(with = "humantime_serde")]
    pub console_interval: Duration,

    /// Maximum time to wait for workload threads to exit on shutdown.
    ///
    /// # Default
    ///
    /// `10s`
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Configuration of the async runtime.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            data_dir: PathBuf::from("data"),
            workload: Workload::default(),
            console_interval: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(10),
            runtime: Runtime::default(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided in `args`)
    /// 3. Environment variables (prefixed with `SS__`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Builds and validates the core workload configuration.
    ///
    /// Fails if there are no workload threads or if the operation ratios do not sum to `1.0`.
    pub fn workload_configuration(&self) -> Result<Configuration> {
        let Workload {
            threads,
            target_keys,
            read_ratio,
            write_ratio,
            delete_ratio,
        } = self.workload;

        if threads == 0 {
            anyhow::bail!("invalid configuration: at least one workload thread is required");
        }

        let configuration =
            Configuration::defaults(threads, target_keys, read_ratio, write_ratio, delete_ratio);
        configuration.validate()?;

        Ok(configuration)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.http_addr, SocketAddr::from(([0, 0, 0, 0], 9090)));
            assert_eq!(config.data_dir, Path::new("data"));
            assert_eq!(config.workload.threads, 16);
            assert_eq!(config.workload.target_keys, 50_000_000);
            assert_eq!(config.console_interval, Duration::from_secs(5));
            assert_eq!(config.logging.level, LevelFilter::INFO);
            assert_eq!(config.logging.format, LogFormat::Auto);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SS__HTTP_ADDR", "127.0.0.1:9999");
            jail.set_env("SS__WORKLOAD__THREADS", "4");
            jail.set_env("SS__WORKLOAD__READ_RATIO", "0.5");
            jail.set_env("SS__WORKLOAD__WRITE_RATIO", "0.5");
            jail.set_env("SS__WORKLOAD__DELETE_RATIO", "0");
            jail.set_env("SS__STOP_TIMEOUT", "3s");
            jail.set_env("SS__LOGGING__LEVEL", "debug");
            jail.set_env("SS__LOGGING__FORMAT", "json");

            let config = Config::load(None).unwrap();

            assert_eq!(config.http_addr, SocketAddr::from(([127, 0, 0, 1], 9999)));
            assert_eq!(config.workload.threads, 4);
            assert_eq!(config.workload.read_ratio, 0.5);
            assert_eq!(config.workload.delete_ratio, 0.0);
            // Unset fields keep their defaults.
            assert_eq!(config.workload.target_keys, 50_000_000);
            assert_eq!(config.stop_timeout, Duration::from_secs(3));
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            data_dir: /var/lib/storesim
            console_interval: 10s
            workload:
                threads: 8
                read_ratio: 0.8
                write_ratio: 0.15
                delete_ratio: 0.05
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.data_dir, Path::new("/var/lib/storesim"));
            assert_eq!(config.console_interval, Duration::from_secs(10));
            assert_eq!(config.workload.threads, 8);
            assert_eq!(config.workload.read_ratio, 0.8);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            workload:
                threads: 8
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("SS__WORKLOAD__THREADS", "2");

            let config = Config::load(Some(tempfile.path())).unwrap();
            // Env should overwrite the yaml config
            assert_eq!(config.workload.threads, 2);

            Ok(())
        });
    }

    #[test]
    fn workload_configuration_validates() {
        let mut config = Config::default();
        let workload = config.workload_configuration().unwrap();
        assert_eq!(workload.threads(), 16);
        assert_eq!(workload.read_ratio(), 0.6);

        config.workload.delete_ratio = 0.3;
        config.workload.read_ratio = 0.5;
        let err = config.workload_configuration().unwrap_err();
        assert!(err.to_string().contains("must sum to 1.0"));

        let mut config = Config::default();
        config.workload.threads = 0;
        assert!(config.workload_configuration().is_err());
    }

    #[test]
    fn parse_log_format() {
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Auto);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
