//! Partitioning of a bipartite table into cohorts and groups
//!
//! Rows are ordered by cohort, then by group key, then by input position. A group is
//! a run of rows sharing both; a cohort is the run of groups sharing a cohort value.
//! Rows whose cohort is undefined never reach a group.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use arrow::record_batch::RecordBatch;
use smallvec::SmallVec;

use crate::config::ProjectionConfig;
use crate::error::Result;
use crate::utils::arrow::TextColumns;

/// Whether a cohort value can be projected
///
/// Blank values, a literal `0` and values containing any of `markers` (such as
/// `n.v.t.`, "not applicable") are undefined. Other spellings of zero are labels.
#[must_use]
pub fn is_defined_cohort(value: &str, markers: &[String]) -> bool {
    let value = value.trim();
    if value.is_empty() || value == "0" {
        return false;
    }
    !markers.iter().any(|m| value.contains(m.as_str()))
}

/// Owned group key, used for messages and errors
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub cohort: String,
    pub values: SmallVec<[String; 6]>,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({})", self.cohort, self.values.join(", "))
    }
}

/// Rows of a bipartite table arranged by cohort and group
#[derive(Debug)]
pub struct Partition {
    /// Column 0 is the cohort, the rest the group key
    keys: TextColumns,
    order: Vec<usize>,
    groups: Vec<Range<usize>>,
    cohorts: Vec<Range<usize>>,
    excluded_rows: usize,
    excluded_groups: usize,
}

impl Partition {
    /// Partition `batch` by the cohort and group columns of `config`
    pub fn build(batch: &RecordBatch, config: &ProjectionConfig) -> Result<Self> {
        let mut columns = Vec::with_capacity(config.group_columns.len() + 1);
        columns.push(config.year_column.clone());
        columns.extend(config.group_columns.iter().cloned());
        let keys = TextColumns::from_batch(batch, &columns, "group partition")?;

        let (mut order, mut excluded): (Vec<usize>, Vec<usize>) = (0..keys.num_rows())
            .partition(|&row| is_defined_cohort(keys.value(0, row), &config.undefined_cohort_markers));

        // Stable sorts keep input order inside every group
        order.sort_by(|&a, &b| compare_keys(&keys, a, b));
        excluded.sort_by(|&a, &b| compare_keys(&keys, a, b));

        let groups = runs(&order, |&a, &b| compare_keys(&keys, a, b).is_eq());
        let cohorts = runs(&groups, |a, b| {
            keys.value(0, order[a.start]) == keys.value(0, order[b.start])
        });
        let excluded_groups = runs(&excluded, |&a, &b| compare_keys(&keys, a, b).is_eq()).len();

        Ok(Self {
            keys,
            order,
            groups,
            cohorts,
            excluded_rows: excluded.len(),
            excluded_groups,
        })
    }

    /// Number of projectable groups
    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Rows left out because their cohort is undefined
    #[must_use]
    pub const fn excluded_rows(&self) -> usize {
        self.excluded_rows
    }

    /// Groups left out because their cohort is undefined
    #[must_use]
    pub const fn excluded_groups(&self) -> usize {
        self.excluded_groups
    }

    /// Cohorts in ascending order of their value
    pub fn cohorts(&self) -> impl Iterator<Item = Cohort<'_>> {
        self.cohorts.iter().map(move |range| Cohort {
            partition: self,
            groups: range.clone(),
        })
    }

    /// All groups, cohort by cohort
    pub fn groups(&self) -> impl Iterator<Item = GroupRef<'_>> {
        self.groups.iter().map(move |range| GroupRef {
            partition: self,
            members: &self.order[range.clone()],
        })
    }
}

fn compare_keys(keys: &TextColumns, a: usize, b: usize) -> Ordering {
    (0..keys.num_columns())
        .map(|col| keys.value(col, a).cmp(keys.value(col, b)))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Ranges of consecutive equal elements
fn runs<T>(items: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..=items.len() {
        if i == items.len() || !same(&items[start], &items[i]) {
            ranges.push(start..i);
            start = i;
        }
    }
    ranges
}

/// Groups sharing one cohort value
#[derive(Debug, Clone)]
pub struct Cohort<'p> {
    partition: &'p Partition,
    groups: Range<usize>,
}

impl<'p> Cohort<'p> {
    /// Cohort value
    #[must_use]
    pub fn value(&self) -> &'p str {
        let first = self.partition.groups[self.groups.start].start;
        self.partition.keys.value(0, self.partition.order[first])
    }

    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Rows in all groups of this cohort
    #[must_use]
    pub fn num_rows(&self) -> usize {
        let groups = &self.partition.groups[self.groups.clone()];
        groups.iter().map(|range| range.len()).sum()
    }

    pub fn groups(&self) -> impl Iterator<Item = GroupRef<'p>> + 'p {
        let partition = self.partition;
        partition.groups[self.groups.clone()]
            .iter()
            .map(move |range| GroupRef {
                partition,
                members: &partition.order[range.clone()],
            })
    }
}

/// Rows of one group, in input order
#[derive(Debug, Clone, Copy)]
pub struct GroupRef<'p> {
    partition: &'p Partition,
    members: &'p [usize],
}

impl<'p> GroupRef<'p> {
    /// Row indices of the members in the source batch
    #[must_use]
    pub const fn members(&self) -> &'p [usize] {
        self.members
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn cohort(&self) -> &'p str {
        self.partition.keys.value(0, self.members[0])
    }

    /// Group key values, in group column order
    pub fn key_values(&self) -> impl Iterator<Item = &'p str> + 'p {
        let keys = &self.partition.keys;
        let row = self.members[0];
        (1..keys.num_columns()).map(move |col| keys.value(col, row))
    }

    #[must_use]
    pub fn key(&self) -> GroupKey {
        GroupKey {
            cohort: self.cohort().to_string(),
            values: self.key_values().map(str::to_string).collect(),
        }
    }
}
