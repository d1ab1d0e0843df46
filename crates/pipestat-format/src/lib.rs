//! pipestat-format: Pure tabular codecs (sans-IO)
//!
//! Decodes the wide observation table from CSV and encodes analysis
//! results as CSV tables or a plain-text report. Everything works on
//! in-memory bytes and strings; reading and writing files is left to the
//! caller.

pub mod error;
pub mod observations;
pub mod report;
pub mod tables;

pub use error::FormatError;
pub use observations::{IMAGE_COLUMN, PIPELINE_COLUMN, read_observations};
pub use report::{ReportStyle, render_report};
pub use tables::{posthoc_csv, posthoc_file_name, posthoc_file_names, skipped_csv, summary_csv};
