//! Protobuf parser for GTFS Realtime feeds.

use prost::Message;
use thiserror::Error;
use tracing::warn;

use crate::gtfs_rt::FeedMessage;

#[derive(Debug, Error)]
#[error("malformed GTFS-RT feed: {0}")]
pub struct DecodeError(#[from] prost::DecodeError);

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, DecodeError> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Like [`parse_feed`], but a malformed payload becomes an empty feed.
pub fn decode_or_empty(bytes: &[u8]) -> FeedMessage {
    parse_feed(bytes).unwrap_or_else(|e| {
        warn!(error = %e, bytes = bytes.len(), "Discarding undecodable feed");
        FeedMessage::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{FeedEntity, FeedHeader, TripDescriptor, TripUpdate};

    #[test]
    fn test_parse_empty_bytes_returns_default_feed() {
        // An empty byte array decodes to a FeedMessage with default values
        let result = parse_feed(&[]);
        assert!(result.is_ok());
        let feed = result.unwrap();
        assert_eq!(feed.header.gtfs_realtime_version, "");
        assert!(feed.entity.is_empty());
    }

    #[test]
    fn test_parse_invalid_bytes() {
        let invalid_bytes = vec![0xFF, 0xFE, 0x00, 0x01];
        let result = parse_feed(&invalid_bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_or_empty_swallows_malformed_input() {
        let feed = decode_or_empty(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(feed.entity.is_empty());
    }

    #[test]
    fn test_parse_feed_with_trip_update() {
        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1234567890),
                incrementality: None,
                feed_version: None,
            },
            entity: vec![FeedEntity {
                id: "trip-1".to_string(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        route_id: Some("31M1".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        let encoded = feed.encode_to_vec();
        let parsed = decode_or_empty(&encoded);

        assert_eq!(parsed.header.timestamp, Some(1234567890));
        assert_eq!(parsed.entity.len(), 1);
        let trip = &parsed.entity[0].trip_update.as_ref().unwrap().trip;
        assert_eq!(trip.route_id(), "31M1");
    }
}
