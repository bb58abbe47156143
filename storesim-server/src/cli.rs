use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;

use crate::config::Config;
use crate::{healthcheck, observability, web};

/// Storage workload simulator.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Healthcheck(HealthcheckCommand),
    Version(VersionCommand),
}

/// run the workload and serve statistics over HTTP
///
/// Flags given here take precedence over the configuration file and environment variables.
#[derive(Debug, Default, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// directory for the runner state file
    #[argh(option)]
    dir: Option<PathBuf>,

    /// number of workload threads
    #[argh(option)]
    threads: Option<usize>,

    /// advisory number of keys to aim for
    #[argh(option)]
    target_keys: Option<u64>,

    /// share of read operations
    #[argh(option)]
    read_ratio: Option<f64>,

    /// share of write operations
    #[argh(option)]
    write_ratio: Option<f64>,

    /// share of delete operations
    #[argh(option)]
    delete_ratio: Option<f64>,

    /// port of the HTTP endpoints
    #[argh(option)]
    metrics_port: Option<u16>,
}

impl RunCommand {
    /// Overrides configuration values with the flags that were given.
    fn apply(self, config: &mut Config) {
        if let Some(dir) = self.dir {
            config.data_dir = dir;
        }
        if let Some(threads) = self.threads {
            config.workload.threads = threads;
        }
        if let Some(target_keys) = self.target_keys {
            config.workload.target_keys = target_keys;
        }
        if let Some(read_ratio) = self.read_ratio {
            config.workload.read_ratio = read_ratio;
        }
        if let Some(write_ratio) = self.write_ratio {
            config.workload.write_ratio = write_ratio;
        }
        if let Some(delete_ratio) = self.delete_ratio {
            config.workload.delete_ratio = delete_ratio;
        }
        if let Some(port) = self.metrics_port {
            config.http_addr.set_port(port);
        }
    }
}

/// perform a healthcheck against the running storesim runner
///
/// This command checks if the runner is available on the configured host and port. This is used
/// for Docker healthchecks.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "healthcheck")]
struct HealthcheckCommand {}

/// print the storesim version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let mut args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("storesim {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Command::Run(ref mut run) = args.command {
        std::mem::take(run).apply(&mut config);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads)
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(_) => web::server(config).await,
            Command::Healthcheck(HealthcheckCommand {}) => healthcheck::healthcheck(config).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::Path;

    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::from_args(
            &["storesim"],
            &[
                "run",
                "--dir",
                "/tmp/storesim",
                "--threads",
                "4",
                "--read-ratio",
                "0.5",
                "--write-ratio",
                "0.5",
                "--delete-ratio",
                "0",
                "--metrics-port",
                "9999",
            ],
        )
        .unwrap();

        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };

        let mut config = Config::default();
        run.apply(&mut config);

        assert_eq!(config.data_dir, Path::new("/tmp/storesim"));
        assert_eq!(config.workload.threads, 4);
        assert_eq!(config.workload.read_ratio, 0.5);
        assert_eq!(config.workload.write_ratio, 0.5);
        assert_eq!(config.workload.delete_ratio, 0.0);
        // Not given on the command line.
        assert_eq!(config.workload.target_keys, 50_000_000);
        assert_eq!(config.http_addr, SocketAddr::from(([0, 0, 0, 0], 9999)));
    }

    #[test]
    fn config_flag_before_subcommand() {
        let args = Args::from_args(&["storesim"], &["-c", "storesim.yml", "healthcheck"]).unwrap();
        assert_eq!(args.config.as_deref(), Some(Path::new("storesim.yml")));
        assert!(matches!(args.command, Command::Healthcheck(_)));
    }
}
