//! A Rust library for building student-school enrollment tables from registry
//! extracts, projecting them into co-attendance pair networks, and computing
//! co-infection statistics on those networks.

pub mod config;
pub mod enrollment;
pub mod error;
pub mod loader;
pub mod network;
pub mod pipeline;
pub mod sink;
pub mod stats;
pub mod utils;

// Re-export the most common types for easier use
// Configuration
pub use config::{
    DatasetProfile, EnrollmentFilterConfig, FieldEscape, OversizePolicy, PipelineConfig,
    ProjectionConfig, SinkConfig, StatsConfig,
};
pub use error::{NetworkError, Result};

// Core pipeline
pub use enrollment::{EnrollmentFilter, FilteredEnrollment, academic_year};
pub use loader::{DataFormat, LoadOptions, TableLoader, load_file};
pub use network::{PairProjector, ProjectionSummary, pair_count};
pub use pipeline::{RunSummary, build_bipartite, project_directory, project_file};
pub use sink::{DelimitedWriter, MemorySink, PairRow, PairSink};

// Arrow types
pub use arrow::record_batch::RecordBatch;
