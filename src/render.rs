//! Render-side of the pipeline: the cached board and the frame loop.
//!
//! Nothing here touches the network. Each frame polls both mailboxes without
//! blocking and hands the board to a [`Renderer`].

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::alerts::AlertStatus;
use crate::arrivals::ArrivalProjection;
use crate::mailbox::{Latest, Mailbox};

/// Latest values the renderer draws from.
#[derive(Debug)]
pub struct Board {
    arrivals: Latest<ArrivalProjection>,
    alert: Latest<AlertStatus>,
}

impl Board {
    pub fn new(arrivals: &Mailbox<ArrivalProjection>, alerts: &Mailbox<AlertStatus>) -> Self {
        Self {
            arrivals: arrivals.subscribe(),
            alert: alerts.subscribe(),
        }
    }

    pub fn latest_arrivals(&self) -> Option<&ArrivalProjection> {
        self.arrivals.get()
    }

    pub fn latest_alert(&self) -> Option<&AlertStatus> {
        self.alert.get()
    }

    /// Polls both mailboxes. Returns `true` if either cached value changed.
    pub fn refresh(&mut self) -> bool {
        let arrivals_changed = self.arrivals.refresh();
        let alert_changed = self.alert.refresh();
        arrivals_changed || alert_changed
    }
}

/// Draws a [`Board`]. Display drivers implement this.
pub trait Renderer {
    /// Called once per frame; `changed` is `true` when the board has new data.
    fn draw(&mut self, board: &Board, changed: bool) -> anyhow::Result<()>;

    /// `true` once the display asked to close, e.g. a window-close event.
    fn close_requested(&self) -> bool {
        false
    }
}

pub struct RenderLoop<R> {
    board: Board,
    renderer: R,
    frame_interval: Duration,
}

impl<R: Renderer> RenderLoop<R> {
    pub fn new(
        renderer: R,
        arrivals: Mailbox<ArrivalProjection>,
        alerts: Mailbox<AlertStatus>,
        frame_rate: u32,
    ) -> Self {
        Self {
            board: Board::new(&arrivals, &alerts),
            renderer,
            frame_interval: Duration::from_secs(1) / frame_rate.max(1),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// One frame: poll, then draw. Returns whether the board changed.
    pub fn frame(&mut self) -> anyhow::Result<bool> {
        let changed = self.board.refresh();
        self.renderer.draw(&self.board, changed)?;
        Ok(changed)
    }

    /// Draws frames until `cancel` fires or the renderer asks to close.
    ///
    /// A close request or a draw failure cancels `cancel` so the background
    /// loops stop as well.
    pub async fn run(&mut self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(frame_ms = self.frame_interval.as_millis() as u64, "Render loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.frame() {
                error!(error = %e, "Renderer failed");
                cancel.cancel();
                return Err(e);
            }

            if self.renderer.close_requested() {
                info!("Renderer requested close");
                cancel.cancel();
                break;
            }
        }

        info!("Render loop stopped");
        Ok(())
    }
}

/// Headless renderer that writes the board to the log whenever it changes.
#[derive(Debug, Default)]
pub struct LogRenderer {
    frames: u64,
}

impl LogRenderer {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for LogRenderer {
    fn draw(&mut self, board: &Board, changed: bool) -> anyhow::Result<()> {
        self.frames += 1;
        if !changed {
            return Ok(());
        }

        if let Some(arrivals) = board.latest_arrivals() {
            for (direction, labels) in arrivals.iter() {
                let rows: Vec<String> = labels
                    .iter()
                    .map(|label| label.text().unwrap_or_else(|| "now".to_string()))
                    .collect();
                info!(direction, arrivals = %rows.join(", "), "Departures");
            }
        }
        match board.latest_alert().and_then(AlertStatus::message) {
            Some(message) => info!(alert = message, "Service alert"),
            None => debug!("No service alerts"),
        }
        Ok(())
    }
}
