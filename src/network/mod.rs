//! Co-attendance networks
//!
//! A bipartite student-school table is partitioned into groups of students who
//! share a school location, cohort and program; every group becomes the complete
//! set of student pairs among its members.

pub mod grouping;
pub mod parallel;
pub mod projector;

pub use grouping::{Cohort, GroupKey, GroupRef, Partition, is_defined_cohort};
pub use projector::{PairProjector, ProjectionSummary, pair_count};
