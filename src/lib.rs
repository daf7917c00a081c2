//! Patient feedback sentiment scoring, trending issue detection and facility
//! insight reports.

pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod issues;
pub mod lexicon;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod sentiment;
pub mod store;
pub mod text;
