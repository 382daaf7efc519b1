//! Temporal aggregation of daily event indicators into weekly buckets
//!
//! Resamples encoded daily observations into per-region weekly rows by
//! summing indicator counts. Periods with no events produce no rows; gap
//! filling is deferred to the merge stage so the aggregator never
//! fabricates synthetic zero-rows.

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;
use tracing::debug;

/// One encoded daily observation: a canonical region, a date, and the
/// concatenated indicator counts for that day
#[derive(Debug, Clone)]
pub struct EncodedObservation {
    pub region: String,
    pub date: NaiveDate,
    pub counts: Vec<u32>,
}

/// One aggregated (region, period) row with summed indicator counts
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRow {
    pub region: String,

    /// Period label: the last day (Sunday) of the week containing the
    /// contributing observations
    pub period_end: NaiveDate,

    pub counts: Vec<u32>,
}

impl AggregatedRow {
    /// Calendar year of the period label, the join key against annual
    /// harvest records
    pub fn year(&self) -> i32 {
        self.period_end.year()
    }
}

/// The Sunday on or after the given date: the label of its weekly bucket
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let offset = 6 - i64::from(date.weekday().num_days_from_monday());
    date + Duration::days(offset)
}

/// Aggregate encoded daily observations into weekly per-region rows.
///
/// Output is sorted by (region, period) ascending. A region with a single
/// event on one day still produces exactly one row.
pub fn aggregate_weekly(
    observations: &[EncodedObservation],
    column_count: usize,
) -> Vec<AggregatedRow> {
    let mut buckets: BTreeMap<(String, NaiveDate), Vec<u32>> = BTreeMap::new();

    for observation in observations {
        debug_assert_eq!(observation.counts.len(), column_count);
        let key = (observation.region.clone(), week_ending(observation.date));
        let bucket = buckets.entry(key).or_insert_with(|| vec![0; column_count]);
        for (total, count) in bucket.iter_mut().zip(&observation.counts) {
            *total += count;
        }
    }

    debug!(
        "Aggregated {} daily observations into {} weekly rows",
        observations.len(),
        buckets.len()
    );

    buckets
        .into_iter()
        .map(|((region, period_end), counts)| AggregatedRow {
            region,
            period_end,
            counts,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn observation(region: &str, when: NaiveDate, counts: Vec<u32>) -> EncodedObservation {
        EncodedObservation {
            region: region.to_string(),
            date: when,
            counts,
        }
    }

    #[test]
    fn week_ending_labels_the_following_sunday() {
        // 2023-01-02 is a Monday; its bucket ends Sunday 2023-01-08
        assert_eq!(week_ending(date(2023, 1, 2)), date(2023, 1, 8));
        // Sundays label their own bucket
        assert_eq!(week_ending(date(2023, 1, 8)), date(2023, 1, 8));
    }

    #[test]
    fn events_within_a_week_are_summed() {
        let rows = aggregate_weekly(
            &[
                observation("Bandung", date(2023, 1, 2), vec![1, 0]),
                observation("Bandung", date(2023, 1, 4), vec![2, 1]),
            ],
            2,
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].period_end, date(2023, 1, 8));
        assert_eq!(rows[0].counts, vec![3, 1]);
    }

    #[test]
    fn single_event_produces_exactly_one_row() {
        let rows = aggregate_weekly(
            &[observation("Bogor", date(2023, 3, 15), vec![0, 1])],
            2,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].counts, vec![0, 1]);
    }

    #[test]
    fn output_is_sorted_by_region_then_period() {
        let rows = aggregate_weekly(
            &[
                observation("Bogor", date(2023, 1, 16), vec![1]),
                observation("Bandung", date(2023, 1, 23), vec![1]),
                observation("Bandung", date(2023, 1, 2), vec![1]),
            ],
            1,
        );

        let keys: Vec<(&str, NaiveDate)> = rows
            .iter()
            .map(|row| (row.region.as_str(), row.period_end))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Bandung", date(2023, 1, 8)),
                ("Bandung", date(2023, 1, 29)),
                ("Bogor", date(2023, 1, 22)),
            ]
        );
    }

    #[test]
    fn empty_periods_produce_no_rows() {
        let rows = aggregate_weekly(
            &[
                observation("Bandung", date(2023, 1, 2), vec![1]),
                observation("Bandung", date(2023, 3, 1), vec![1]),
            ],
            1,
        );
        // Weeks between the two events are absent, not zero-filled
        assert_eq!(rows.len(), 2);
    }
}
