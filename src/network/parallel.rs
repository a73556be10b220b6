//! Parallel rendering of pair tables
//!
//! Groups are rendered to bytes on the rayon pool in windows of at most
//! `parallel_window` groups and `parallel_pair_budget` pair rows, then written in
//! group order by the calling thread. A group above the budget on its own is
//! streamed straight to the writer. The output is byte-identical to
//! [`PairProjector::project`] with the same writer.

use std::io::Write;
use std::ops::Range;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use rayon::prelude::*;

use crate::error::Result;
use crate::network::grouping::{GroupRef, Partition};
use crate::network::projector::{PairProjector, ProjectionSummary, pair_count};
use crate::sink::{DelimitedWriter, EncodedBuffer, PairSink};
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};

/// Groups handled together by [`PairProjector::project_parallel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Window {
    /// Groups rendered on the pool and buffered until the window is written
    Buffered(Range<usize>),
    /// One group written directly, without buffering
    Streamed(usize),
}

/// Split groups of the given member counts into windows
///
/// A buffered window holds at most `max_groups` groups whose pair counts sum to at
/// most `budget`. A group with more than `budget` pairs gets a streamed window.
pub(crate) fn pair_windows(sizes: &[usize], max_groups: usize, budget: u64) -> Vec<Window> {
    let mut windows = Vec::new();
    let mut start = 0;
    let mut pairs = 0u64;
    for (i, &size) in sizes.iter().enumerate() {
        let count = pair_count(size);
        if count > budget {
            if start < i {
                windows.push(Window::Buffered(start..i));
            }
            windows.push(Window::Streamed(i));
            start = i + 1;
            pairs = 0;
            continue;
        }
        if i > start && (i - start == max_groups || pairs + count > budget) {
            windows.push(Window::Buffered(start..i));
            start = i;
            pairs = 0;
        }
        pairs += count;
    }
    if start < sizes.len() {
        windows.push(Window::Buffered(start..sizes.len()));
    }
    windows
}

impl PairProjector<'_> {
    /// Project `batch` into `writer`, rendering groups in parallel
    ///
    /// If a group fails (for example above the ceiling with the abort policy),
    /// nothing of its window is written. Only one window's pairs are held in
    /// memory at a time.
    pub fn project_parallel<W: Write>(
        &self,
        batch: &RecordBatch,
        writer: &mut DelimitedWriter<W>,
    ) -> Result<ProjectionSummary> {
        self.validate_schema(batch.schema().as_ref())?;
        let config = self.config();
        let partition = Partition::build(batch, config)?;
        let identities = self.identities(batch)?;
        let encoder = *writer.encoder();

        let mut summary = ProjectionSummary {
            skipped_cohort_groups: partition.excluded_groups(),
            skipped_cohort_rows: partition.excluded_rows(),
            ..ProjectionSummary::default()
        };

        for cohort in partition.cohorts() {
            let start = Instant::now();
            log::info!("{} {}", config.year_column, cohort.value());
            let pb = create_main_progress_bar(
                cohort.num_groups() as u64,
                Some(cohort.value()),
                config.show_progress,
            );

            let groups: Vec<GroupRef<'_>> = cohort.groups().collect();
            let before = summary.pairs;
            let sizes: Vec<usize> = groups.iter().map(GroupRef::len).collect();
            for window in pair_windows(&sizes, config.parallel_window, config.parallel_pair_budget) {
                let range = match window {
                    Window::Streamed(index) => {
                        let plan = self.plan(groups[index], &identities)?;
                        plan.emit(writer)?;
                        summary.record(&plan);
                        pb.inc(1);
                        continue;
                    }
                    Window::Buffered(range) => range,
                };

                let rendered = groups[range.clone()]
                    .par_iter()
                    .map(|group| {
                        let plan = self.plan(*group, &identities)?;
                        let mut buffer = EncodedBuffer::new(encoder);
                        plan.emit(&mut buffer)?;
                        let mut delta = ProjectionSummary::default();
                        delta.record(&plan);
                        Ok((delta, buffer))
                    })
                    .collect::<Result<Vec<_>>>()?;

                for (delta, buffer) in rendered {
                    if buffer.rows() > 0 {
                        writer.write_encoded(buffer.bytes(), buffer.rows())?;
                        writer.end_group()?;
                    }
                    summary.merge(&delta);
                }
                pb.inc(range.len() as u64);
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

    /// Project into `writer`, in parallel when the configuration asks for it
    pub fn project_to_writer<W: Write>(
        &self,
        batch: &RecordBatch,
        writer: &mut DelimitedWriter<W>,
    ) -> Result<ProjectionSummary> {
        if self.config().parallel {
            self.project_parallel(batch, writer)
        } else {
            self.project(batch, writer)
        }
    }
}
