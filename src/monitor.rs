//! Health monitor
//!
//! Glues the pieces together: each configured service gets a `Checker` in
//! the registry and a scheduled task whose tick probes the service, moves
//! its status and fires alerts and remediation once it is `Down`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::manifest::ServiceDef;
use crate::registry::{Registry, ServiceStatus};
use crate::sickbay::checker::Checker;
use crate::sickbay::probe::{probe_with_retry, HttpProber, ProbeMode, Prober, RetryOutcome};
use crate::sickbay::recovery::{Remediator, SshRemediator};
use crate::sickbay::status::HealthStatus;
use crate::vox::AlertDispatcher;
use crate::warden::{Scheduler, Shutdown, Task};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Leveled mode: the status after recording the probe
    Recorded(HealthStatus),
    /// Bounded-retry mode: a probe succeeded
    Passed { attempts: u32 },
    /// Bounded-retry mode: every attempt failed
    Exhausted { attempts: u32 },
    /// Shutdown interrupted the tick
    Cancelled,
}

/// Health monitor
#[derive(Clone)]
pub struct Monitor {
    registry: Registry,
    scheduler: Arc<dyn Scheduler>,
    alerts: Arc<dyn AlertDispatcher>,
    prober: Arc<dyn Prober>,
    remediator: Arc<dyn Remediator>,
    mode: ProbeMode,
    healthy_hold: Duration,
    down_hold: Duration,
}

impl Monitor {
    /// Create a monitor probing over HTTP and remediating over SSH
    pub fn new(
        registry: Registry,
        scheduler: Arc<dyn Scheduler>,
        alerts: Arc<dyn AlertDispatcher>,
    ) -> Self {
        Self {
            registry,
            scheduler,
            alerts,
            prober: Arc::new(HttpProber::default()),
            remediator: Arc::new(SshRemediator::new()),
            mode: ProbeMode::default(),
            healthy_hold: Duration::ZERO,
            down_hold: Duration::ZERO,
        }
    }

    /// Replace the prober
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// Set the probing policy
    pub fn with_mode(mut self, mode: ProbeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the pauses taken after a healthy-on-healthy tick and after a down alert
    pub fn with_holds(mut self, healthy_hold: Duration, down_hold: Duration) -> Self {
        self.healthy_hold = healthy_hold;
        self.down_hold = down_hold;
        self
    }

    /// Register every service and schedule the ones with a URL
    ///
    /// Returns the number of scheduled services. Fails only on a duplicate
    /// name, in which case services registered before it stay registered.
    pub fn start(&self, services: &[ServiceDef]) -> Result<usize> {
        let mut scheduled = 0;

        for def in services {
            let checker = Arc::new(Checker::from_def(def));
            self.registry.insert(Arc::clone(&checker))?;

            if !checker.is_schedulable() {
                warn!(service = %checker.name(), "service has no url, registered but not scheduled");
                continue;
            }

            self.schedule(checker);
            scheduled += 1;
        }

        info!(
            services = services.len(),
            scheduled,
            mode = %self.mode,
            "monitor started"
        );
        Ok(scheduled)
    }

    /// Schedule ticks for a checker at its interval
    pub fn schedule(&self, checker: Arc<Checker>) {
        let monitor = self.clone();
        let target = Arc::clone(&checker);
        let task: Task = Arc::new(move |shutdown| {
            let monitor = monitor.clone();
            let checker = Arc::clone(&target);
            Box::pin(async move {
                monitor.tick(&checker, shutdown).await;
                Ok(())
            })
        });

        debug!(service = %checker.name(), interval = ?checker.interval(), "scheduling service");
        self.scheduler.start(checker.name(), checker.interval(), task);
    }

    /// Run one check for `checker`
    pub async fn tick(&self, checker: &Checker, mut shutdown: Shutdown) -> TickOutcome {
        match self.mode {
            ProbeMode::Leveled => self.leveled_tick(checker, &mut shutdown).await,
            ProbeMode::BoundedRetry => self.bounded_tick(checker, &mut shutdown).await,
        }
    }

    async fn leveled_tick(&self, checker: &Checker, shutdown: &mut Shutdown) -> TickOutcome {
        let before = checker.status();
        let ok = self.prober.check(checker.url()).await;
        let status = if ok {
            checker.record_success()
        } else {
            checker.record_failure()
        };

        if status != before {
            info!(service = %checker.name(), from = %before, to = %status, "status changed");
        } else {
            debug!(service = %checker.name(), %status, "status unchanged");
        }

        if status.is_down() {
            self.alert(&down_message(checker.name())).await;

            match checker.remediation() {
                Some(command) if command.is_complete() => {
                    info!(service = %checker.name(), host = %command.host, "running remediation");
                    if let Err(e) = self.remediator.remediate(command).await {
                        error!(service = %checker.name(), error = %e, "remediation failed");
                    }
                }
                Some(_) => {
                    debug!(service = %checker.name(), "remediation descriptor incomplete, skipping");
                }
                None => {}
            }

            if !self.hold(self.down_hold, shutdown).await {
                return TickOutcome::Cancelled;
            }
        } else if ok
            && before == HealthStatus::Healthy
            && !self.hold(self.healthy_hold, shutdown).await
        {
            return TickOutcome::Cancelled;
        }

        TickOutcome::Recorded(status)
    }

    async fn bounded_tick(&self, checker: &Checker, shutdown: &mut Shutdown) -> TickOutcome {
        let outcome = probe_with_retry(
            self.prober.as_ref(),
            checker.url(),
            checker.max_retries(),
            shutdown,
        )
        .await;

        match outcome {
            RetryOutcome::Succeeded { attempts } => {
                checker.touch();
                debug!(service = %checker.name(), attempts, "probe passed");
                TickOutcome::Passed { attempts }
            }
            RetryOutcome::Exhausted { attempts } => {
                checker.touch();
                warn!(service = %checker.name(), attempts, "probe failed after all retries");
                self.alert(&exhausted_message(checker.name(), attempts)).await;
                TickOutcome::Exhausted { attempts }
            }
            RetryOutcome::Cancelled { attempts } => {
                debug!(service = %checker.name(), attempts, "probe cancelled by shutdown");
                TickOutcome::Cancelled
            }
        }
    }

    async fn alert(&self, message: &str) {
        if let Err(e) = self.alerts.send_message(message).await {
            warn!(error = %e, "failed to send alert");
        }
    }

    /// Sleep for a hold duration; `false` if shutdown cut it short
    async fn hold(&self, duration: Duration, shutdown: &mut Shutdown) -> bool {
        if duration.is_zero() {
            return true;
        }
        shutdown.sleep(duration).await
    }

    /// Current status of every registered service, sorted by name
    pub fn get_all(&self) -> Vec<ServiceStatus> {
        self.registry.snapshot()
    }

    /// Stop every scheduled service, waiting for in-flight ticks
    pub async fn shutdown(&self) {
        self.scheduler.stop_all().await;
        info!("monitor stopped");
    }
}

fn down_message(name: &str) -> String {
    format!(
        "Warning: health checks for {} keep failing, current status: down. Please take action.",
        name
    )
}

fn exhausted_message(name: &str, attempts: u32) -> String {
    format!(
        "Warning: {} failed its health check after {} attempts. Please take action.",
        name, attempts
    )
}

#[cfg(test)]
impl Monitor {
    /// Replace the remediator
    pub fn with_remediator(mut self, remediator: Arc<dyn Remediator>) -> Self {
        self.remediator = remediator;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
