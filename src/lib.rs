pub mod alerts;
pub mod arrivals;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod mailbox;
pub mod output;
pub mod parser;
pub mod render;
pub mod scheduler;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
