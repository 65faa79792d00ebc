// src/main.rs
mod app;
mod cert;
mod config;
mod error;
mod kubeconfig;
mod utils;

use app::{BootstrapReport, CancelToken, Certificates};
use cert::{CertificateOperations, CertificateVerifier, VerificationReport};
use config::{ClusterConfig, PkiPaths};
use error::{PkiError, Result};
use utils::logging::{FileLogger, Logger, MultiLogger, TracingLogger};

use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Bootstrap the control-plane PKI", long_about = None)]
pub struct Args {
    #[arg(short, long, default_value = "cluster_config.json")]
    pub config: String,
    #[arg(long, default_value = "/var/lib/mke/pki")]
    pub cert_root: String,
    #[arg(short, long)]
    pub debug: bool,
    #[arg(long)]
    pub log_file: Option<String>,
    /// Give up (between steps) after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create or reuse every CA, certificate, kubeconfig and the service-account keypair.
    Run,
    /// Check on-disk material against the catalog without changing anything.
    Verify,
}

#[derive(Debug, Clone)]
struct LogOptions {
    debug: bool,
    log_file: Option<String>,
}

fn make_logger(opts: &LogOptions) -> Result<Box<dyn Logger>> {
    let mut logger = MultiLogger::new().with(Box::new(TracingLogger));
    if let Some(path) = &opts.log_file {
        logger = logger.with(Box::new(FileLogger::open(path, opts.debug)?));
    }
    Ok(Box::new(logger))
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Runs blocking work on the blocking pool. Ctrl-C and the timeout both trip the
/// cancel token; the work notices it at its next step boundary.
async fn run_blocking<T, F>(cancel: CancelToken, timeout: Option<Duration>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(work);

    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current step");
            interrupt.cancel();
        }
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!("bootstrap exceeded {:?}, stopping after the current step", limit);
                cancel.cancel();
                handle.await
            }
        },
        None => handle.await,
    };
    watcher.abort();

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(PkiError::Cancelled {
            step: "runtime shutdown".to_string(),
        }),
    }
}

fn log_bootstrap(report: &BootstrapReport) {
    for outcome in &report.outcomes {
        tracing::info!(artifact = %outcome.artifact, state = %outcome.state, "artifact ready");
    }
}

fn log_verification(report: &VerificationReport) {
    for artifact in &report.artifacts {
        match &artifact.fingerprint {
            Some(fp) => tracing::info!(artifact = %artifact.name, sha256 = %fp, "verified"),
            None => tracing::info!(artifact = %artifact.name, "verified"),
        }
    }
}

async fn execute(args: Args) -> Result<()> {
    let config = ClusterConfig::load_from_file(&expand(&args.config))?;
    let paths = PkiPaths::new(expand(&args.cert_root));
    let log_opts = LogOptions {
        debug: args.debug,
        log_file: args.log_file.as_deref().map(|p| expand(p).to_string_lossy().into_owned()),
    };
    let timeout = args.timeout.map(Duration::from_secs);
    let cancel = CancelToken::new();

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let token = cancel.clone();
            let report = run_blocking(cancel, timeout, move || {
                let ops = CertificateOperations::new(make_logger(&log_opts)?, paths.clone());
                let mut certs = Certificates::new(ops, config, paths, make_logger(&log_opts)?);
                let report = certs.run(&token)?;
                certs.stop()?;
                Ok(report)
            })
            .await?;
            log_bootstrap(&report);
        }
        Command::Verify => {
            let report = run_blocking(cancel, timeout, move || {
                let mut logger = make_logger(&log_opts)?;
                CertificateVerifier::new(&paths, &config, logger.as_mut()).verify_all()
            })
            .await?;
            log_verification(&report);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match execute(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_run() {
        let args = Args::try_parse_from(["kube-pki-bootstrap"]).unwrap();
        assert_eq!(args.command, None);
        assert_eq!(args.cert_root, "/var/lib/mke/pki");
        assert_eq!(args.config, "cluster_config.json");
    }

    #[test]
    fn parses_verify_with_options() {
        let args = Args::try_parse_from([
            "kube-pki-bootstrap",
            "--cert-root",
            "/tmp/pki",
            "--timeout",
            "30",
            "-d",
            "verify",
        ])
        .unwrap();
        assert_eq!(args.command, Some(Command::Verify));
        assert_eq!(args.timeout, Some(30));
        assert!(args.debug);
    }

    #[tokio::test]
    async fn timeout_cancels_between_steps() {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let result: Result<()> = run_blocking(cancel, Some(Duration::from_millis(10)), move || {
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(PkiError::Cancelled {
                step: "next".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(PkiError::Cancelled { .. })));
    }
}
