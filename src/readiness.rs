//! Page readiness detection
//!
//! After navigation the product page settles into one of two terminal
//! states: the title is rendered ([`Readiness::Ready`]) or the site shows its
//! not-found marker ([`Readiness::NotFound`]). Anything else (slow loads,
//! captcha walls) keeps the detector polling. Every `escalate_every` failed
//! attempts it hands control to an [`Escalation`] so an operator can clear a
//! captcha; after `cap` attempts it gives up with [`Error::PageStuck`].

use std::time::Duration;

use async_trait::async_trait;

use crate::accessor::ProductPage;
use crate::error::{Error, Result};
use crate::ArchiveConfig;

/// Terminal outcome of a readiness wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Title rendered; carries its trimmed text
    Ready(String),
    /// The page reports that the product does not exist
    NotFound,
}

/// Detector state
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Polling,
    AwaitingHuman,
    Ready(String),
    NotFound,
}

/// Called when the detector suspects a wall only a human can clear
#[async_trait]
pub trait Escalation: Send + Sync {
    /// Block until the operator is done. `attempt` is the number of failed
    /// attempts so far. Return [`Error::EscalationAborted`] to stop.
    async fn escalate(&self, attempt: u32) -> Result<()>;
}

/// Prompts on the terminal and waits for Enter
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl Escalation for TerminalPrompt {
    async fn escalate(&self, attempt: u32) -> Result<()> {
        tracing::info!("Prompting for user input before retrying...");

        let line = tokio::task::spawn_blocking(|| {
            eprint!("You likely need to solve a captcha. Press Enter to continue retrying (q to quit)... ");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|n| (n, line))
        })
        .await
        .map_err(|e| Error::transport(format!("Prompt task failed: {}", e)))??;

        match line {
            (0, _) => Err(Error::EscalationAborted { attempt }),
            (_, input) if input.trim().eq_ignore_ascii_case("q") => {
                Err(Error::EscalationAborted { attempt })
            }
            _ => Ok(()),
        }
    }
}

/// Logs and keeps polling; for unattended runs
#[derive(Debug, Clone, Copy, Default)]
pub struct Unattended;

#[async_trait]
impl Escalation for Unattended {
    async fn escalate(&self, attempt: u32) -> Result<()> {
        tracing::warn!(
            "Page still not ready after {} attempts and nobody is watching; continuing",
            attempt
        );
        Ok(())
    }
}

/// Polls a page until it is ready or confirmed missing
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    pub probe_timeout: Duration,
    pub probe_pause: Duration,
    pub cap: u32,
    pub escalate_every: u32,
}

impl ReadinessDetector {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            probe_timeout: config.probe_timeout,
            probe_pause: config.probe_pause,
            cap: config.readiness_cap,
            escalate_every: config.escalate_every,
        }
    }

    fn should_escalate(&self, attempts: u32) -> bool {
        self.escalate_every > 0 && attempts % self.escalate_every == 0
    }

    /// Drive the state machine to a terminal state.
    ///
    /// Counters start from zero on every call.
    pub async fn wait(
        &self,
        page: &dyn ProductPage,
        escalation: &dyn Escalation,
    ) -> Result<Readiness> {
        let mut attempts = 0u32;
        let mut phase = Phase::Polling;

        loop {
            phase = match phase {
                Phase::Ready(title) => return Ok(Readiness::Ready(title)),
                Phase::NotFound => return Ok(Readiness::NotFound),
                Phase::AwaitingHuman => {
                    escalation.escalate(attempts).await?;
                    Phase::Polling
                }
                Phase::Polling => {
                    if attempts >= self.cap {
                        return Err(Error::PageStuck { attempts });
                    }
                    self.poll_once(page, &mut attempts).await?
                }
            };
        }
    }

    async fn poll_once(&self, page: &dyn ProductPage, attempts: &mut u32) -> Result<Phase> {
        if let Some(title) = page.probe_title(self.probe_timeout).await? {
            return Ok(Phase::Ready(title.trim().to_string()));
        }
        tracing::warn!(
            "Attempt {}: product title not found yet",
            *attempts + 1
        );
        tokio::time::sleep(self.probe_pause).await;

        if page.probe_not_found(self.probe_timeout).await? {
            return Ok(Phase::NotFound);
        }

        *attempts += 1;
        tracing::warn!(
            "Might be stuck on a slow-loading page, or it's waiting for a captcha. Retrying ({}/{})...",
            attempts,
            self.cap
        );

        if self.should_escalate(*attempts) {
            Ok(Phase::AwaitingHuman)
        } else {
            Ok(Phase::Polling)
        }
    }
}
