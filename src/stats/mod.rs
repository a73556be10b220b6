//! Co-infection statistics on pair tables
//!
//! Consumers of projected networks: pairs are joined with residences and infection
//! days, split by school relation and summarised per distance bucket.

pub mod analysis;
pub mod baseline;
pub mod confint;
pub mod distance;
pub mod geocode;
pub mod infection;
pub mod report;

pub use analysis::{
    FAMILY_LINK_TYPES, KinshipIndex, LinkColumns, MemberPair, Observer, PairCategory, PairColumns,
    PairObservation, read_member_pairs,
};
pub use baseline::baseline_pairs;
pub use confint::{Interval, proportion_interval};
pub use distance::{GridCell, Residence, pair_distance};
pub use geocode::{GeoLookup, ResidenceColumns};
pub use infection::{InfectionLookup, TestColumns, co_infected, not_infected};
pub use report::{StatsRow, StatsWriter, distance_buckets, export_report, summarize};
