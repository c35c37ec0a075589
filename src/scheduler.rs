//! Background refresh loops.
//!
//! Each loop owns one [`Updatable`] (and with it one HTTP session), refreshes
//! it on a fixed interval and publishes results to its own [`Mailbox`]. The
//! [`Supervisor`] restarts a loop that panics.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::alerts::{self, AlertStatus};
use crate::arrivals::{self, ArrivalProjection};
use crate::config::{BoardConfig, StopConfig};
use crate::fetch::{FeedClient, FeedSource, FetchError, HttpSource};
use crate::mailbox::Mailbox;
use crate::parser::parse_feed;
use crate::gtfs_rt::FeedMessage;

/// Something a background loop can refresh.
///
/// `Ok(None)` means no fresh data this round; the previous value stays on
/// screen. `Err` is logged by the loop, which tries again next interval.
#[async_trait]
pub trait Updatable: Send {
    type Output: Send + Sync + 'static;

    async fn refresh(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Output>, FetchError>;
}

/// Fetches and decodes one feed, or explains why there is nothing to use.
async fn fetch_feed<S: FeedSource>(
    client: &FeedClient<S>,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Option<FeedMessage>, FetchError> {
    let Some(bytes) = client.fetch(url, cancel).await? else {
        return Ok(None);
    };
    match parse_feed(&bytes) {
        Ok(feed) => Ok(Some(feed)),
        Err(e) => {
            warn!(error = %e, bytes = bytes.len(), "Discarding undecodable feed");
            Ok(None)
        }
    }
}

/// Trip updates → [`ArrivalProjection`].
pub struct ArrivalUpdater<S = HttpSource> {
    client: FeedClient<S>,
    url: String,
    stops: Vec<StopConfig>,
    max_rows: usize,
    clock: fn() -> DateTime<Utc>,
}

impl<S: FeedSource> ArrivalUpdater<S> {
    pub fn new(client: FeedClient<S>, url: String, stops: Vec<StopConfig>, max_rows: usize) -> Self {
        Self {
            client,
            url,
            stops,
            max_rows,
            clock: Utc::now,
        }
    }

    pub fn from_config(config: &BoardConfig, client: FeedClient<S>) -> Self {
        Self::new(
            client,
            config.trip_update_url.clone(),
            config.stops.clone(),
            config.max_rows,
        )
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl<S: FeedSource + 'static> Updatable for ArrivalUpdater<S> {
    type Output = ArrivalProjection;

    #[tracing::instrument(name = "refresh_arrivals", skip_all)]
    async fn refresh(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<ArrivalProjection>, FetchError> {
        let Some(feed) = fetch_feed(&self.client, &self.url, cancel).await? else {
            warn!("Trip status fetch did not return any data");
            return Ok(None);
        };

        let current_time = (self.clock)();
        let projection = arrivals::project(&feed, &self.stops, current_time, self.max_rows);
        debug!(
            entities = feed.entity.len(),
            directions = projection.len(),
            has_arrivals = projection.has_arrivals(),
            "Arrivals projected"
        );
        Ok(Some(projection))
    }
}

/// Service alerts → [`AlertStatus`].
pub struct AlertUpdater<S = HttpSource> {
    client: FeedClient<S>,
    url: String,
    informed_ids: HashSet<String>,
    language: String,
    active_only: bool,
    clock: fn() -> DateTime<Utc>,
}

impl<S: FeedSource> AlertUpdater<S> {
    pub fn new(
        client: FeedClient<S>,
        url: String,
        informed_ids: HashSet<String>,
        language: String,
        active_only: bool,
    ) -> Self {
        Self {
            client,
            url,
            informed_ids,
            language,
            active_only,
            clock: Utc::now,
        }
    }

    pub fn from_config(config: &BoardConfig, client: FeedClient<S>) -> Self {
        Self::new(
            client,
            config.service_alerts_url.clone(),
            config.informed_ids(),
            config.language.clone(),
            config.alerts_active_only,
        )
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl<S: FeedSource + 'static> Updatable for AlertUpdater<S> {
    type Output = AlertStatus;

    #[tracing::instrument(name = "refresh_alerts", skip_all)]
    async fn refresh(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<AlertStatus>, FetchError> {
        let Some(feed) = fetch_feed(&self.client, &self.url, cancel).await? else {
            warn!("Service alert fetch did not return any data");
            return Ok(None);
        };

        let status = if self.active_only {
            alerts::select_at(&feed, &self.informed_ids, &self.language, (self.clock)())
        } else {
            alerts::select(&feed, &self.informed_ids, &self.language)
        };
        debug!(has_alert = !status.is_empty(), "Alerts selected");
        Ok(Some(status))
    }
}

/// Refreshes `updater` every `interval` until `cancel` fires.
///
/// A failed refresh is logged and the loop carries on at the next interval.
pub async fn run_update_loop<U: Updatable>(
    name: &'static str,
    mut updater: U,
    interval: Duration,
    mailbox: Mailbox<U::Output>,
    cancel: CancellationToken,
) {
    info!(name, interval_secs = interval.as_secs(), "Update loop started");

    while !cancel.is_cancelled() {
        match updater.refresh(&cancel).await {
            Ok(Some(output)) => {
                mailbox.publish(output);
                debug!(name, "Published update");
            }
            Ok(None) => debug!(name, "No fresh data, keeping previous"),
            Err(e) => error!(name, error = %e, "Refresh failed, retrying next interval"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(name, "Update loop stopped");
}

/// What the supervisor does with a loop that panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub restart_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Stopped because of cancellation.
    Stopped,
    /// Exhausted its restarts; the supervisor cancelled everything.
    GaveUp,
}

/// Owns the background loops and the shared cancellation token.
pub struct Supervisor {
    cancel: CancellationToken,
    policy: RestartPolicy,
    loops: Vec<(&'static str, JoinHandle<LoopExit>)>,
}

impl Supervisor {
    pub fn new(cancel: CancellationToken, policy: RestartPolicy) -> Self {
        Self {
            cancel,
            policy,
            loops: Vec::new(),
        }
    }

    /// Starts a loop named `name` with `updater`. If the loop panics, `rebuild`
    /// makes a fresh updater (and with it a fresh session) for the restart.
    pub fn spawn<U, F>(
        &mut self,
        name: &'static str,
        interval: Duration,
        mailbox: Mailbox<U::Output>,
        updater: U,
        rebuild: F,
    ) where
        U: Updatable + 'static,
        F: Fn() -> anyhow::Result<U> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let policy = self.policy.clone();
        let span = tracing::info_span!("update_loop", name);

        let handle = tokio::spawn(
            async move {
                let mut next = Ok(updater);
                let mut restarts = 0u32;
                loop {
                    let failure = match next {
                        Ok(updater) => {
                            let run = tokio::spawn(
                                run_update_loop(name, updater, interval, mailbox.clone(), cancel.clone())
                                    .in_current_span(),
                            );
                            match run.await {
                                Ok(()) => return LoopExit::Stopped,
                                Err(join_error) => format!("update loop panicked: {join_error}"),
                            }
                        }
                        Err(e) => format!("cannot build updater: {e:#}"),
                    };

                    if cancel.is_cancelled() {
                        return LoopExit::Stopped;
                    }
                    if restarts >= policy.max_restarts {
                        error!(restarts, error = %failure, "Update loop keeps failing, shutting down");
                        cancel.cancel();
                        return LoopExit::GaveUp;
                    }

                    restarts += 1;
                    warn!(
                        restarts,
                        delay_secs = policy.restart_delay.as_secs(),
                        error = %failure,
                        "Restarting update loop"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return LoopExit::Stopped,
                        _ = tokio::time::sleep(policy.restart_delay) => {}
                    }
                    next = rebuild();
                }
            }
            .instrument(span),
        );

        self.loops.push((name, handle));
    }

    /// Cancels every loop and joins each, waiting at most `timeout` per loop.
    ///
    /// Returns `true` if all loops stopped cleanly.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.cancel.cancel();

        let mut clean = true;
        for (name, mut handle) in self.loops {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(LoopExit::Stopped)) => info!(name, "Update loop joined"),
                Ok(Ok(LoopExit::GaveUp)) => {
                    error!(name, "Update loop gave up after repeated failures");
                    clean = false;
                }
                Ok(Err(join_error)) => {
                    error!(name, error = %join_error, "Update loop supervisor panicked");
                    clean = false;
                }
                Err(_) => {
                    warn!(name, timeout_secs = timeout.as_secs(), "Update loop did not stop in time");
                    handle.abort();
                    clean = false;
                }
            }
        }
        clean
    }
}
