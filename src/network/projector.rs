//! Projection of a bipartite table onto student pairs
//!
//! Every group of `n` distinct members yields exactly `n(n-1)/2` pair rows. Members
//! are taken in input order and pairs are emitted in lexicographic index order,
//! `(0,1), (0,2), ..., (1,2), ...`, so the first column set always refers to the
//! member that appears earlier in the table.

use std::time::Instant;

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::config::{OversizePolicy, ProjectionConfig};
use crate::error::{NetworkError, Result};
use crate::network::grouping::{GroupRef, Partition};
use crate::sink::{PairRow, PairSink};
use crate::utils::arrow::{TextColumns, require_columns};
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar, log_anomaly};

/// Number of unordered pairs among `n` members
#[must_use]
pub const fn pair_count(n: usize) -> u64 {
    let n = n as u64;
    if n < 2 { 0 } else { n * (n - 1) / 2 }
}

pub(crate) type Identity<'a> = SmallVec<[&'a str; 3]>;

/// Counts gathered while projecting one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionSummary {
    /// Cohorts that contained at least one group
    pub cohorts: usize,
    /// Groups that produced at least one pair
    pub groups_projected: usize,
    /// Groups with a single distinct member
    pub singleton_groups: usize,
    /// Groups above the pairing ceiling
    pub oversized_groups: usize,
    /// Groups whose cohort value is undefined
    pub skipped_cohort_groups: usize,
    /// Rows whose cohort value is undefined
    pub skipped_cohort_rows: usize,
    /// Repeated identities removed from groups
    pub duplicate_members: usize,
    /// Pair rows emitted
    pub pairs: u64,
}

impl ProjectionSummary {
    /// Add the counts of another projection
    pub fn merge(&mut self, other: &Self) {
        self.cohorts += other.cohorts;
        self.groups_projected += other.groups_projected;
        self.singleton_groups += other.singleton_groups;
        self.oversized_groups += other.oversized_groups;
        self.skipped_cohort_groups += other.skipped_cohort_groups;
        self.skipped_cohort_rows += other.skipped_cohort_rows;
        self.duplicate_members += other.duplicate_members;
        self.pairs += other.pairs;
    }

    pub(crate) fn record(&mut self, plan: &GroupPlan<'_>) {
        match plan {
            GroupPlan::Pairs { members, duplicates, .. } => {
                self.groups_projected += 1;
                self.duplicate_members += duplicates;
                self.pairs += pair_count(members.len());
            }
            GroupPlan::Singleton { duplicates } => {
                self.singleton_groups += 1;
                self.duplicate_members += duplicates;
            }
            GroupPlan::Oversized { duplicates, .. } => {
                self.oversized_groups += 1;
                self.duplicate_members += duplicates;
            }
        }
    }

    /// Log the counts at info level, anomalies at warn level
    pub fn log(&self) {
        log::info!(
            "Projected {} pairs from {} groups in {} cohorts",
            self.pairs,
            self.groups_projected,
            self.cohorts
        );
        log_anomaly(
            self.skipped_cohort_rows as u64,
            "rows skipped for an undefined cohort",
        );
        log_anomaly(self.oversized_groups as u64, "groups skipped above the size ceiling");
        log_anomaly(self.duplicate_members as u64, "repeated members removed from groups");
    }
}

/// What a group turns into once its members are known
pub(crate) enum GroupPlan<'a> {
    Pairs {
        key: SmallVec<[&'a str; 6]>,
        members: Vec<Identity<'a>>,
        duplicates: usize,
    },
    Singleton {
        duplicates: usize,
    },
    Oversized {
        duplicates: usize,
    },
}

impl GroupPlan<'_> {
    /// Emit every pair of the group to `sink`
    pub(crate) fn emit<S: PairSink>(&self, sink: &mut S) -> Result<()> {
        let GroupPlan::Pairs { key, members, .. } = self else {
            return Ok(());
        };
        for (a, b) in (0..members.len()).tuple_combinations() {
            sink.write_pair(&PairRow {
                key: key.as_slice(),
                first: members[a].as_slice(),
                second: members[b].as_slice(),
            })?;
        }
        sink.end_group()
    }
}

/// Projects bipartite tables into pair tables
#[derive(Debug, Clone, Copy)]
pub struct PairProjector<'c> {
    config: &'c ProjectionConfig,
}

impl<'c> PairProjector<'c> {
    pub fn new(config: &'c ProjectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &'c ProjectionConfig {
        self.config
    }

    /// Header of the pair table
    #[must_use]
    pub fn output_header(&self) -> Vec<String> {
        self.config.output_header()
    }

    /// Check that a bipartite table carries every column the projection reads
    pub fn validate_schema(&self, schema: &Schema) -> Result<()> {
        require_columns(schema, &self.config.required_columns(), "bipartite table")
    }

    pub(crate) fn identities(&self, batch: &RecordBatch) -> Result<TextColumns> {
        TextColumns::from_batch(batch, &self.config.identity_columns, "bipartite table")
    }

    /// Decide how a group is projected
    ///
    /// Members repeating an identity already seen in the group are dropped, so a
    /// student never pairs with itself.
    pub(crate) fn plan<'a>(
        &self,
        group: GroupRef<'a>,
        identities: &'a TextColumns,
    ) -> Result<GroupPlan<'a>> {
        let mut seen: FxHashSet<Identity<'a>> = FxHashSet::default();
        let mut members = Vec::with_capacity(group.len());
        for &row in group.members() {
            let identity: Identity<'a> = identity_of(identities, row);
            if seen.insert(identity.clone()) {
                members.push(identity);
            }
        }
        let duplicates = group.len() - members.len();

        if members.len() > self.config.max_group_size {
            let key = group.key();
            return match self.config.oversize_policy {
                OversizePolicy::Skip => {
                    log::warn!(
                        "Skipping group {key} with {} members (limit {})",
                        members.len(),
                        self.config.max_group_size
                    );
                    Ok(GroupPlan::Oversized { duplicates })
                }
                OversizePolicy::Abort => Err(NetworkError::GroupTooLarge {
                    key: key.to_string(),
                    size: members.len(),
                    limit: self.config.max_group_size,
                }),
            };
        }

        if members.len() < 2 {
            return Ok(GroupPlan::Singleton { duplicates });
        }

        Ok(GroupPlan::Pairs {
            key: group.key_values().collect(),
            members,
            duplicates,
        })
    }

    /// Project `batch` into `sink`, one group at a time
    ///
    /// Missing columns are reported before anything is written. The sink is
    /// notified at the end of every group that produced pairs.
    pub fn project<S: PairSink>(&self, batch: &RecordBatch, sink: &mut S) -> Result<ProjectionSummary> {
        self.validate_schema(batch.schema().as_ref())?;
        let partition = Partition::build(batch, self.config)?;
        let identities = self.identities(batch)?;

        let mut summary = ProjectionSummary {
            skipped_cohort_groups: partition.excluded_groups(),
            skipped_cohort_rows: partition.excluded_rows(),
            ..ProjectionSummary::default()
        };

        for cohort in partition.cohorts() {
            let start = Instant::now();
            log::info!("{} {}", self.config.year_column, cohort.value());
            log::debug!("Pairs for {} groups", cohort.num_groups());
            let pb = create_main_progress_bar(
                cohort.num_groups() as u64,
                Some(cohort.value()),
                self.config.show_progress,
            );

            let before = summary.pairs;
            for group in cohort.groups() {
                let plan = self.plan(group, &identities)?;
                plan.emit(sink)?;
                summary.record(&plan);
                pb.inc(1);
            }
            summary.cohorts += 1;

            finish_progress_bar(&pb, Some("done"));
            log::info!(
                "Cohort {} produced {} pairs in {:.2?}",
                cohort.value(),
                summary.pairs - before,
                start.elapsed()
            );
        }

        Ok(summary)
    }
}

pub(crate) fn identity_of<'a>(identities: &'a TextColumns, row: usize) -> Identity<'a> {
    identities.row(row).collect()
}
