//! Fixed-length sequence windowing over per-region feature histories
//!
//! Slices a scaled feature frame into strided, overlapping windows for
//! the sequence classifier. Windowing is performed within each region's
//! contiguous run, so no window ever mixes two regions' histories. A
//! region contributes `max(0, len - sequence_length)` windows at stride
//! 1: histories no longer than the sequence length yield nothing, which
//! callers must surface as an insufficient-data condition rather than an
//! empty classifier batch.

use crate::app::services::feature_matrix::FeatureFrame;
use chrono::NaiveDate;
use ndarray::Array2;

/// One classifier input window: `sequence_length` consecutive feature
/// rows from a single region, periods ascending
#[derive(Debug, Clone)]
pub struct SequenceWindow {
    /// Canonical region the window belongs to
    pub region: String,

    /// Period label of the window's final row
    pub period_end: NaiveDate,

    /// Window tensor, shape (sequence_length, feature_count)
    pub values: Array2<f64>,

    /// Training label: the label of the window's final row
    pub label: Option<u8>,
}

/// Lazy iterator of windows over a feature frame.
///
/// Deterministic on a fixed frame; finite; not restartable once
/// exhausted (build a new one from the frame to iterate again).
pub struct WindowIter<'a> {
    frame: &'a FeatureFrame,
    runs: Vec<(usize, usize)>,
    sequence_length: usize,
    stride: usize,
    run_index: usize,
    offset: usize,
}

impl<'a> WindowIter<'a> {
    fn new(frame: &'a FeatureFrame, sequence_length: usize, stride: usize) -> Self {
        Self {
            frame,
            runs: frame.region_runs(),
            sequence_length,
            stride: stride.max(1),
            run_index: 0,
            offset: 0,
        }
    }
}

impl Iterator for WindowIter<'_> {
    type Item = SequenceWindow;

    fn next(&mut self) -> Option<SequenceWindow> {
        loop {
            let (run_start, run_end) = *self.runs.get(self.run_index)?;
            let run_length = run_end - run_start;
            let window_count = run_length.saturating_sub(self.sequence_length);

            if self.offset >= window_count {
                self.run_index += 1;
                self.offset = 0;
                continue;
            }

            let start = run_start + self.offset;
            let last = start + self.sequence_length - 1;
            self.offset += self.stride;

            let values = Array2::from_shape_fn(
                (self.sequence_length, self.frame.width()),
                |(row, column)| self.frame.rows[start + row][column],
            );

            return Some(SequenceWindow {
                region: self.frame.regions[start].clone(),
                period_end: self.frame.periods[last],
                values,
                label: self
                    .frame
                    .labels
                    .as_ref()
                    .map(|labels| labels[last]),
            });
        }
    }
}

/// Window a frame lazily with the given sequence length and stride
pub fn window_frame(
    frame: &FeatureFrame,
    sequence_length: usize,
    stride: usize,
) -> WindowIter<'_> {
    WindowIter::new(frame, sequence_length, stride)
}

/// Eagerly collect every window of a frame
pub fn collect_windows(
    frame: &FeatureFrame,
    sequence_length: usize,
    stride: usize,
) -> Vec<SequenceWindow> {
    window_frame(frame, sequence_length, stride).collect()
}
