//! linkrtt - round-trip time monitoring between data centers
//!
//! Probes every ordered pair of a machine list, compares the measurements
//! with a stored baseline and reports links whose latency moved beyond the
//! baseline's historical spread.

pub mod baseline;
pub mod cli;
pub mod config;
pub mod deviation;
pub mod html_output;
pub mod machine;
pub mod matrix;
pub mod notify;
pub mod probe;
pub mod report;
pub mod run;
pub mod sample;
