//! Pivot-style ("TD") reports of service-record spreadsheet exports.
//!
//! The pipeline is: load → normalize columns → classify billing status →
//! filter by month → detect phase columns → group and pivot → KPIs →
//! export. [`pipeline::build_report`] runs everything after loading as a
//! pure function of a [`types::Table`] and a [`config::ReportConfig`].
pub mod classify;
pub mod columns;
pub mod config;
pub mod error;
pub mod loader;
pub mod months;
pub mod output;
pub mod phases;
pub mod pipeline;
pub mod pivot;
pub mod reports;
pub mod types;
pub mod util;

pub use error::{ReportError, Result};
