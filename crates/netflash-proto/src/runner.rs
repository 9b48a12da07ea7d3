//! Continuous runner
//!
//! Waits for a board, lets it settle, runs one session, cools down, and goes
//! back to waiting. A failed session is logged and the loop carries on with
//! the next board. Shutdown is observed while waiting for a board and during
//! the settle and cooldown pauses; a session in progress runs to its end.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use netflash_core::{FatalError, FlashError, MacAddress};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::NetflashConfig;
use crate::engine::{Flasher, SessionReport};
use crate::provider::ProviderRegistry;
use crate::transfer::ProgressObserver;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Pause after discovery; the board's network stack needs time to settle
    pub settle_delay: Duration,
    /// Pause after a session so a rebooting board is not picked up again
    pub cooldown_delay: Duration,
    /// Skip a board identical to the one served just before, whether that
    /// session succeeded or aborted
    pub skip_duplicates: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(7),
            cooldown_delay: Duration::from_secs(10),
            skip_duplicates: true,
        }
    }
}

/// Tally of a run that was stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: u32,
    pub aborted: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Flash a single board, then stop
    Once,
    /// Flash boards until interrupted
    Forever,
}

#[derive(Debug)]
pub enum RunOutcome {
    Flashed(Box<SessionReport>),
    Stopped(RunSummary),
}

/// Sequences sessions across boards, one at a time
pub struct Runner {
    transport: Arc<dyn Transport>,
    flasher: Flasher,
    options: RunnerOptions,
    last_flashed: Option<MacAddress>,
}

impl Runner {
    pub fn new(transport: Arc<dyn Transport>, flasher: Flasher, options: RunnerOptions) -> Self {
        Self {
            transport,
            flasher,
            options,
            last_flashed: None,
        }
    }

    /// Flash one board. `None` if `shutdown` fired before the session began.
    pub async fn flash_once<F>(
        &mut self,
        observer: &mut dyn ProgressObserver,
        shutdown: F,
    ) -> Result<Option<SessionReport>, FlashError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let board = tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(None),
            found = self.transport.discover() => found.map_err(FatalError::from)?,
        };
        info!(board = %board, "Device found");

        if pause(self.options.settle_delay, shutdown.as_mut()).await {
            return Ok(None);
        }

        let outcome = self.flasher.run(&board, observer).await;
        self.last_flashed = Some(board.mac);
        Ok(Some(outcome?))
    }

    /// Flash boards until `shutdown` resolves
    ///
    /// Only a transport that can no longer discover boards ends the loop with
    /// an error.
    pub async fn flash_until_stopped<F>(
        &mut self,
        observer: &mut dyn ProgressObserver,
        shutdown: F,
    ) -> Result<RunSummary, FatalError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        loop {
            let board = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                found = self.transport.discover() => found?,
            };

            if self.options.skip_duplicates && self.last_flashed == Some(board.mac) {
                debug!(board = %board.mac, "Skipping board flashed just before");
                summary.skipped += 1;
                continue;
            }

            info!(board = %board, "Device found");
            if pause(self.options.settle_delay, shutdown.as_mut()).await {
                break;
            }

            match self.flasher.run(&board, observer).await {
                Ok(report) => {
                    summary.succeeded += 1;
                    debug!(session = %report.session_id, files = report.files.len(), "Session complete");
                }
                Err(e) => {
                    summary.aborted += 1;
                    error!(board = %board.mac, error = %e, "Flashing failed");
                }
            }
            self.last_flashed = Some(board.mac);

            if pause(self.options.cooldown_delay, shutdown.as_mut()).await {
                break;
            }
        }

        info!(
            succeeded = summary.succeeded,
            aborted = summary.aborted,
            skipped = summary.skipped,
            "Runner stopped"
        );
        Ok(summary)
    }
}

/// Sleep for `delay`; true if `shutdown` fired first
async fn pause<F>(delay: Duration, shutdown: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = shutdown => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

/// Build the provider, run in `mode`, and close the transport on every exit
pub async fn serve<F>(
    config: &NetflashConfig,
    transport: Arc<dyn Transport>,
    registry: &ProviderRegistry,
    mode: RunMode,
    observer: &mut dyn ProgressObserver,
    shutdown: F,
) -> Result<RunOutcome, FlashError>
where
    F: Future<Output = ()>,
{
    let result = run_with(config, transport.clone(), registry, mode, observer, shutdown).await;
    transport.close().await;
    result
}

async fn run_with<F>(
    config: &NetflashConfig,
    transport: Arc<dyn Transport>,
    registry: &ProviderRegistry,
    mode: RunMode,
    observer: &mut dyn ProgressObserver,
    shutdown: F,
) -> Result<RunOutcome, FlashError>
where
    F: Future<Output = ()>,
{
    let provider = registry.build(&config.provider)?;
    info!(provider = provider.name(), "File provider loaded");

    let flasher = Flasher::new(transport.clone(), provider).with_options(config.transfer.options());
    let mut runner = Runner::new(transport, flasher, config.runner.options());

    match mode {
        RunMode::Once => match runner.flash_once(observer, shutdown).await? {
            Some(report) => Ok(RunOutcome::Flashed(Box::new(report))),
            None => {
                warn!("Interrupted before a board was flashed");
                Ok(RunOutcome::Stopped(RunSummary::default()))
            }
        },
        RunMode::Forever => Ok(RunOutcome::Stopped(
            runner.flash_until_stopped(observer, shutdown).await?,
        )),
    }
}
