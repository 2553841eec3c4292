//! Transaction status polling after an STK push.
//!
//! A poll loop runs until PesaPal reports a terminal status, the caller
//! cancels, or the time budget runs out. Individual poll failures are logged
//! and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{StatusReport, TransactionStatus};
use crate::payments::Gateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay before each status call, including the first.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(180),
        }
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(StatusReport),
    Failed(StatusReport),
    /// Budget exhausted; `last` is the most recent status seen, if any.
    TimedOut { last: Option<TransactionStatus> },
    Cancelled,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Completed(_))
    }

    pub fn status_message(&self) -> String {
        match self {
            PollOutcome::Completed(_) => "Payment completed successfully".to_string(),
            PollOutcome::Failed(report) => match report
                .raw
                .get("description")
                .and_then(|d| d.as_str())
                .filter(|d| !d.is_empty())
            {
                Some(reason) => format!("Payment failed: {}", reason),
                None => "Payment failed. Please try again.".to_string(),
            },
            PollOutcome::TimedOut { .. } => {
                "Payment not confirmed yet. Check your M-PESA messages before trying again."
                    .to_string()
            }
            PollOutcome::Cancelled => "Payment status check cancelled".to_string(),
        }
    }
}

/// Polls `GetTransactionStatus` until something final happens.
///
/// `cancel` flips to `true` (or its sender is dropped) when the caller walks
/// away. A 401 from PesaPal swaps `token` for a freshly requested one.
pub async fn poll_until_terminal(
    gateway: &dyn Gateway,
    token: &str,
    order_tracking_id: &str,
    settings: PollSettings,
    cancel: &mut watch::Receiver<bool>,
) -> PollOutcome {
    let mut token = token.to_string();
    let mut last: Option<TransactionStatus> = None;
    let mut attempt: u32 = 0;

    let polling = async {
        loop {
            if *cancel.borrow() {
                return PollOutcome::Cancelled;
            }

            tokio::select! {
                _ = tokio::time::sleep(settings.interval) => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return PollOutcome::Cancelled;
                    }
                    continue;
                }
            }

            attempt += 1;
            match gateway.transaction_status(&token, order_tracking_id).await {
                Ok(report) => {
                    tracing::debug!(
                        "Poll #{} for order {}: {}",
                        attempt,
                        order_tracking_id,
                        report.status
                    );
                    if report.status.is_terminal() {
                        return match report.status {
                            TransactionStatus::Completed => PollOutcome::Completed(report),
                            _ => PollOutcome::Failed(report),
                        };
                    }
                    last = Some(report.status);
                }
                // Tokens live five minutes; a long budget outlives the one we started with.
                Err(e) if e.status() == Some(401) => {
                    tracing::info!(
                        "Token rejected while polling order {}, requesting a new one",
                        order_tracking_id
                    );
                    match gateway.request_token().await {
                        Ok(fresh) => token = fresh.token,
                        Err(e) => tracing::warn!(
                            "Token refresh for order {} failed, retrying: {}",
                            order_tracking_id,
                            e
                        ),
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Poll #{} for order {} failed, retrying: {}",
                        attempt,
                        order_tracking_id,
                        e
                    );
                }
            }
        }
    };

    let result = tokio::time::timeout(settings.timeout, polling).await;
    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(
                "Gave up polling order {} after {:?} ({} polls)",
                order_tracking_id,
                settings.timeout,
                attempt
            );
            PollOutcome::TimedOut { last }
        }
    }
}

/// Owns a background poll loop.
///
/// Dropping the handle cancels the loop, so a caller that goes away never
/// leaves polling running behind it.
#[derive(Debug)]
pub struct PollHandle {
    order_tracking_id: String,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    pub fn spawn(
        gateway: Arc<dyn Gateway>,
        token: String,
        order_tracking_id: String,
        settings: PollSettings,
    ) -> Self {
        let (cancel, mut cancelled) = watch::channel(false);
        let id = order_tracking_id.clone();

        let task = tokio::spawn(async move {
            poll_until_terminal(gateway.as_ref(), &token, &id, settings, &mut cancelled).await
        });

        Self {
            order_tracking_id,
            cancel,
            task: Some(task),
        }
    }

    pub fn order_tracking_id(&self) -> &str {
        &self.order_tracking_id
    }

    /// Asks the loop to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Waits for the loop to end.
    pub async fn wait(mut self) -> PollOutcome {
        let Some(task) = self.task.take() else {
            return PollOutcome::Cancelled;
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Poll task for order {} died: {}", self.order_tracking_id, e);
                PollOutcome::Cancelled
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}
