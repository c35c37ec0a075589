//! One-shot board snapshots for diagnostics.
//!
//! Supports pretty-printing and JSON serialization.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::alerts::AlertStatus;
use crate::arrivals::ArrivalProjection;

/// Everything the board would show at `generated_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub arrivals: ArrivalProjection,
    pub alert: AlertStatus,
}

/// Logs a snapshot using Rust's debug pretty-print format.
pub fn print_pretty(snapshot: &Snapshot) {
    debug!("{:#?}", snapshot);
}

/// Renders a snapshot as pretty-printed JSON.
pub fn to_json(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Writes a snapshot as pretty-printed JSON to stdout.
pub fn print_json(snapshot: &Snapshot) -> Result<()> {
    println!("{}", to_json(snapshot)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::project;
    use crate::arrivals::tests::{NOW, feed, now, stop_time, trip};
    use crate::config::StopConfig;

    fn snapshot() -> Snapshot {
        let stops = vec![StopConfig::new("1541601", ["31M"], "Vuosaari")];
        let feed = feed(vec![trip("31M", vec![stop_time("1541601", NOW + 420)])]);
        Snapshot {
            generated_at: now(),
            arrivals: project(&feed, &stops, now(), 2),
            alert: AlertStatus::none(),
        }
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&snapshot());
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&snapshot()).unwrap()).unwrap();

        assert_eq!(json["generated_at"], "2023-11-14T22:13:20Z");
        assert_eq!(json["arrivals"]["directions"][0]["labels"][0], "7 mins");
        assert!(json["alert"].is_null());
    }
}
