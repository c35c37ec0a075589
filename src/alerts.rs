//! Service alert selection for the configured stops and routes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gtfs_rt::{Alert, FeedMessage};

/// The combined alert text currently worth showing, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AlertStatus(Option<String>);

impl AlertStatus {
    pub fn new(message: impl Into<String>) -> Self {
        Self(Some(message.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn message(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// Joins the `language` descriptions of every alert that names one of
/// `informed_ids` as a route or stop.
///
/// Identical texts are kept once; distinct texts are joined with a single
/// space in the order their alerts appear in the feed.
pub fn select(feed: &FeedMessage, informed_ids: &HashSet<String>, language: &str) -> AlertStatus {
    combine(alerts(feed), informed_ids, language)
}

/// [`select`] restricted to alerts whose active period covers `now`.
pub fn select_at(
    feed: &FeedMessage,
    informed_ids: &HashSet<String>,
    language: &str,
    now: DateTime<Utc>,
) -> AlertStatus {
    combine(
        alerts(feed).filter(|alert| is_active(alert, now)),
        informed_ids,
        language,
    )
}

/// An alert without active periods is always active. A missing bound is open.
pub fn is_active(alert: &Alert, now: DateTime<Utc>) -> bool {
    if alert.active_period.is_empty() {
        return true;
    }
    let now = u64::try_from(now.timestamp()).unwrap_or(0);

    alert.active_period.iter().any(|period| {
        // 0 is used by some producers for an open bound
        let start = period.start.filter(|&t| t > 0);
        let end = period.end.filter(|&t| t > 0);
        start.is_none_or(|start| start <= now) && end.is_none_or(|end| now <= end)
    })
}

fn alerts(feed: &FeedMessage) -> impl Iterator<Item = &Alert> {
    feed.entity.iter().filter_map(|entity| entity.alert.as_ref())
}

fn combine<'a>(
    alerts: impl Iterator<Item = &'a Alert>,
    informed_ids: &HashSet<String>,
    language: &str,
) -> AlertStatus {
    let language = language.trim_matches('"');
    let mut messages: Vec<&str> = Vec::new();

    for alert in alerts {
        if let Some(text) = message_for(alert, informed_ids, language) {
            if !text.is_empty() && !messages.contains(&text) {
                messages.push(text);
            }
        }
    }

    if messages.is_empty() {
        AlertStatus::none()
    } else {
        AlertStatus::new(messages.join(" "))
    }
}

fn message_for<'a>(alert: &'a Alert, informed_ids: &HashSet<String>, language: &str) -> Option<&'a str> {
    let relevant = alert.informed_entity.iter().any(|informed| {
        let route = informed.route_id.as_deref().is_some_and(|id| informed_ids.contains(id));
        let stop = informed.stop_id.as_deref().is_some_and(|id| informed_ids.contains(id));
        route || stop
    });
    if !relevant {
        return None;
    }

    alert
        .description_text
        .as_ref()?
        .translation
        .iter()
        .find(|translation| translation.language() == language)
        .map(|translation| translation.text.as_str())
}
