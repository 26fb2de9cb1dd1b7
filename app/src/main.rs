use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use clap::Parser;
use common::config::Config;
use eyre::{Context, Result};
use tracing::{debug, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod run;

const DEFAULT_CONFIG: &str = include_str!("../default-report.yaml");
const LOCAL_CONFIG: &str = "report.yaml";
const MODULES: &[&str] = &["perf_report", "common", "plot_common", "worker_scaling", "net_io"];

/// Render measurement tables into chart reports
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Report configuration; `report.yaml` when present, the built-in one otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Extra tracing directive, e.g. `plot_common=debug`
    #[arg(short, long)]
    log: Vec<String>,
    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let _guard = init_tracing(&args)?;

    worker_scaling::init();
    net_io::init();

    let config = load_config(args.config.as_deref())?;
    if let Err(err) = run::run(&config) {
        error!("{err:#?}");
        return Err(err);
    }
    Ok(())
}

fn init_tracing(args: &Cli) -> Result<Option<WorkerGuard>> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let mut env_filter = EnvFilter::new(format!("perf_report={log_level}"));
    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }
    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("log file {} has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (
                Some(layer().with_ansi(false).with_writer(non_blocking)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .init();
    Ok(guard)
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let (source, text) = match path {
        Some(path) => (
            path.display().to_string(),
            read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?,
        ),
        None if Path::new(LOCAL_CONFIG).exists() => (
            LOCAL_CONFIG.to_owned(),
            read_to_string(LOCAL_CONFIG).wrap_err_with(|| format!("reading {LOCAL_CONFIG}"))?,
        ),
        None => ("built-in configuration".to_owned(), DEFAULT_CONFIG.to_owned()),
    };
    debug!("Using {source}");
    let config: Config =
        serde_yml::from_str(&text).wrap_err_with(|| format!("ConfigError: parsing {source}"))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_configuration_parses() {
        worker_scaling::init();
        net_io::init();
        let config: Config = serde_yml::from_str(DEFAULT_CONFIG).unwrap();
        let names = config.reports.iter().map(|r| r.name()).collect::<Vec<_>>();
        assert_eq!(names, ["worker-scaling", "net-io"]);
    }

    #[test]
    fn cli_takes_no_required_arguments() {
        let cli = Cli::try_parse_from(["perf-report"]).unwrap();
        assert!(cli.config.is_none());
        let cli = Cli::try_parse_from(["perf-report", "-l", "plot_common=debug", "-c", "r.yaml"])
            .unwrap();
        assert_eq!(cli.log, ["plot_common=debug"]);
        assert_eq!(cli.config, Some(PathBuf::from("r.yaml")));
    }
}
