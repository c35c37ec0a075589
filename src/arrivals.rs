//! Projection of trip updates onto the configured stops.
//!
//! Every cycle takes one `current_time` and uses it for both the "still in
//! the future" filter and the wait computation, so the result is a pure
//! function of its inputs.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::config::StopConfig;
use crate::gtfs_rt::FeedMessage;
use crate::gtfs_rt::trip_descriptor::ScheduleRelationship as TripRelationship;
use crate::gtfs_rt::trip_update::StopTimeUpdate;
use crate::gtfs_rt::trip_update::stop_time_update::ScheduleRelationship as StopRelationship;

/// Wait until one arrival, in whole minutes.
///
/// A wait that truncates to zero minutes is [`WaitLabel::Due`], which has no
/// text of its own; the renderer decides how to show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "Option<String>")]
pub enum WaitLabel {
    Due,
    Minutes(i64),
}

impl WaitLabel {
    pub fn from_wait(wait: TimeDelta) -> Self {
        match wait.num_minutes() {
            0 => WaitLabel::Due,
            minutes => WaitLabel::Minutes(minutes),
        }
    }

    /// `"1 min"`, `"7 mins"`, or `None` when due.
    pub fn text(&self) -> Option<String> {
        match self {
            WaitLabel::Due => None,
            WaitLabel::Minutes(n) => Some(format!("{n} {}", if *n > 1 { "mins" } else { "min" })),
        }
    }
}

impl fmt::Display for WaitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text().as_deref().unwrap_or(""))
    }
}

impl From<WaitLabel> for Option<String> {
    fn from(label: WaitLabel) -> Self {
        label.text()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectionArrivals {
    pub direction_name: String,
    pub labels: Vec<WaitLabel>,
}

/// Upcoming arrivals per direction, in the order directions were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArrivalProjection {
    directions: Vec<DirectionArrivals>,
}

impl ArrivalProjection {
    pub fn get(&self, direction_name: &str) -> Option<&[WaitLabel]> {
        self.directions
            .iter()
            .find(|d| d.direction_name == direction_name)
            .map(|d| d.labels.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[WaitLabel])> {
        self.directions
            .iter()
            .map(|d| (d.direction_name.as_str(), d.labels.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    /// `true` if at least one direction has an upcoming arrival.
    pub fn has_arrivals(&self) -> bool {
        self.directions.iter().any(|d| !d.labels.is_empty())
    }
}

/// Collects the `max_rows` soonest future arrivals for every configured direction.
///
/// Only stop time updates whose `(stop_id, route_id)` pair is configured
/// contribute, and only if they arrive strictly after `current_time`.
/// Skipped stops, stops without data and cancelled trips are not arrivals.
pub fn project(
    feed: &FeedMessage,
    stops: &[StopConfig],
    current_time: DateTime<Utc>,
    max_rows: usize,
) -> ArrivalProjection {
    let mut order: Vec<&str> = Vec::new();
    let mut arrivals: HashMap<&str, Vec<DateTime<Utc>>> = HashMap::new();
    for stop in stops {
        let name = stop.direction_name.as_str();
        if !arrivals.contains_key(name) {
            order.push(name);
            arrivals.insert(name, Vec::new());
        }
    }

    for entity in &feed.entity {
        let Some(trip_update) = &entity.trip_update else {
            continue;
        };
        if trip_update.trip.schedule_relationship() == TripRelationship::Canceled {
            continue;
        }
        let route_id = trip_update.trip.route_id();

        for update in &trip_update.stop_time_update {
            let Some(arrival) = arrival_time(update) else {
                continue;
            };
            if arrival <= current_time {
                continue;
            }

            let stop_id = update.stop_id();
            for stop in stops.iter().filter(|s| s.matches(stop_id, route_id)) {
                if let Some(times) = arrivals.get_mut(stop.direction_name.as_str()) {
                    times.push(arrival);
                }
            }
        }
    }

    let directions = order
        .into_iter()
        .map(|name| {
            let mut times = arrivals.remove(name).unwrap_or_default();
            times.sort_unstable();
            let labels = times
                .into_iter()
                .take(max_rows)
                .map(|arrival| WaitLabel::from_wait(arrival - current_time))
                .collect();
            DirectionArrivals {
                direction_name: name.to_string(),
                labels,
            }
        })
        .collect();

    ArrivalProjection { directions }
}

fn arrival_time(update: &StopTimeUpdate) -> Option<DateTime<Utc>> {
    if matches!(
        update.schedule_relationship(),
        StopRelationship::Skipped | StopRelationship::NoData
    ) {
        return None;
    }
    let time = update.arrival.as_ref()?.time?;
    DateTime::from_timestamp(time, 0)
}
