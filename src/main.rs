//! Outpost - graded health monitor for remote services
//!
//! Probes configured services on their own intervals, grades their health
//! on a six-level scale, alerts when one goes down and can run a remote
//! remediation command over SSH.

mod api;
mod cli;
mod error;
mod manifest;
mod monitor;
mod registry;
mod sickbay;
mod vox;
mod warden;

#[cfg(test)]
mod testutil;

use cli::{Cli, Commands};
use error::{Error, Result};
use registry::Registry;
use sickbay::probe::{self, HttpProber, Prober, RetryOutcome};
use warden::{Scheduler, Shutdown, Warden};

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
        }

        Commands::Check => {
            let config = manifest::load(&cli.config)?;

            println!("Configuration OK: {}", cli.config.display());
            println!(
                "Probe mode: {}, timeout {}s, status API on {}",
                config.config.probe_mode, config.config.probe_timeout, config.config.listen
            );
            println!();
            println!("{:<20} {:<40} {:<10} {:<12}", "SERVICE", "URL", "INTERVAL", "REMEDIATION");
            println!("{}", "-".repeat(84));
            for service in &config.services {
                let url = if service.url.is_empty() {
                    "(not scheduled)"
                } else {
                    service.url.as_str()
                };
                let remediation = match &service.remediation {
                    Some(cmd) if cmd.is_complete() => cmd.address(),
                    Some(_) => "incomplete".to_string(),
                    None => "-".to_string(),
                };
                println!(
                    "{:<20} {:<40} {:<10} {:<12}",
                    service.name,
                    url,
                    format!("{}s", service.effective_interval().as_secs()),
                    remediation
                );
            }
        }

        Commands::Probe { url, retries, timeout } => {
            let prober = HttpProber::new(Duration::from_secs(timeout));

            let ok = match retries {
                None => prober.check_blocking(&url),
                Some(max_retries) => {
                    let rt = tokio::runtime::Runtime::new()?;
                    let outcome = rt.block_on(async {
                        let (_trigger, mut shutdown) = Shutdown::channel();
                        probe::probe_with_retry(&prober, &url, max_retries, &mut shutdown).await
                    });
                    match outcome {
                        RetryOutcome::Succeeded { attempts } => {
                            println!("{} passed after {} attempt(s)", url, attempts);
                            true
                        }
                        RetryOutcome::Exhausted { attempts } | RetryOutcome::Cancelled { attempts } => {
                            println!("{} failed after {} attempt(s)", url, attempts);
                            false
                        }
                    }
                }
            };

            if !ok {
                println!("{}: unhealthy", url);
                std::process::exit(1);
            }
            println!("{}: healthy", url);
        }

        Commands::Status { addr, json } => {
            let list = api::fetch_status(&addr)?;

            if json {
                let out = serde_json::to_string_pretty(&list)
                    .map_err(|e| Error::Http(e.to_string()))?;
                println!("{}", out);
                return Ok(());
            }

            if list.data_list.is_empty() {
                println!("No services registered.");
                return Ok(());
            }

            println!("{:<20} {:<12} {:<6} {:<12}", "SERVICE", "STATUS", "LEVEL", "LAST CHECK");
            println!("{}", "-".repeat(53));
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            for service in &list.data_list {
                let last_check = match service.last_checked_at {
                    Some(secs) => format!("{}s ago", now.saturating_sub(secs)),
                    None => "never".to_string(),
                };
                println!(
                    "{:<20} {} {:<6} {:<12}",
                    service.name,
                    service.status.colored(12),
                    service.level,
                    last_check
                );
            }
            println!("\n{} service(s)", list.total);
        }

        Commands::Run { listen } => {
            let config = manifest::load(&cli.config)?;
            let listen = listen.unwrap_or_else(|| config.config.listen.clone());

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let scheduler: Arc<dyn Scheduler> = Arc::new(Warden::new());
                let prober: Arc<dyn Prober> =
                    Arc::new(HttpProber::new(config.config.probe_timeout()));

                let monitor = monitor::Monitor::new(
                    Registry::new(),
                    scheduler,
                    vox::from_config(&config.config.alert),
                )
                .with_prober(prober)
                .with_mode(config.config.probe_mode)
                .with_holds(config.config.healthy_hold(), config.config.down_hold());

                let listener = tokio::net::TcpListener::bind(&listen).await?;
                monitor.start(&config.services)?;

                let (trigger, shutdown) = Shutdown::channel();
                let server = tokio::spawn(api::serve(listener, monitor.clone(), shutdown));

                info!("outpost running, press Ctrl+C to stop");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C, shutting down");
                }

                info!("shutting down");
                trigger.trigger();
                monitor.shutdown().await;

                server.await.map_err(|e| Error::Api(e.to_string()))?
            })?;
        }
    }

    Ok(())
}
