use std::fmt;

use crate::core::errors::{Result, TaskError};
use crate::progress::sink::{SharedProgressSink, TaskProgressSink};

/// Maps a virtual progress range onto a slice of a delegate's range.
///
/// Input at or below `virtual_start` reports exactly `actual_start`; input at
/// or above `virtual_end` reports exactly `actual_end`. Values in between are
/// scaled linearly and rounded to the nearest integer.
#[derive(Clone)]
pub struct ScalingTaskProgressSink {
    actual_start: i64,
    actual_end: i64,
    virtual_start: i64,
    virtual_end: i64,
    scale: f64,
    delegate: SharedProgressSink,
}

impl ScalingTaskProgressSink {
    pub fn new(
        actual_start: i64,
        actual_end: i64,
        virtual_start: i64,
        virtual_end: i64,
        delegate: SharedProgressSink,
    ) -> Result<Self> {
        if actual_end < actual_start {
            return Err(TaskError::invalid_argument(format!(
                "actual range is inverted: [{}, {}]",
                actual_start, actual_end
            )));
        }
        if virtual_end < virtual_start {
            return Err(TaskError::invalid_argument(format!(
                "virtual range is inverted: [{}, {}]",
                virtual_start, virtual_end
            )));
        }

        let virtual_span = virtual_end - virtual_start;
        let scale = if virtual_span == 0 {
            0.0
        } else {
            (actual_end - actual_start) as f64 / virtual_span as f64
        };

        Ok(Self {
            actual_start,
            actual_end,
            virtual_start,
            virtual_end,
            scale,
            delegate,
        })
    }

    /// Virtual range `[0, 100]`, so callers report plain percentages
    pub fn percentage(
        actual_start: i64,
        actual_end: i64,
        delegate: SharedProgressSink,
    ) -> Result<Self> {
        Self::new(actual_start, actual_end, 0, 100, delegate)
    }

    pub fn actual_range(&self) -> (i64, i64) {
        (self.actual_start, self.actual_end)
    }

    pub fn virtual_range(&self) -> (i64, i64) {
        (self.virtual_start, self.virtual_end)
    }

    /// The delegate-side value for a virtual progress value
    pub fn scale_progress(&self, task_progress: i64) -> i64 {
        if task_progress <= self.virtual_start {
            self.actual_start
        } else if task_progress >= self.virtual_end {
            self.actual_end
        } else {
            let offset = (task_progress - self.virtual_start) as f64 * self.scale;
            (self.actual_start + offset.round() as i64).min(self.actual_end)
        }
    }
}

impl TaskProgressSink for ScalingTaskProgressSink {
    fn make_progress(
        &self,
        task_progress: i64,
        current_sub_task: Option<&str>,
        message: Option<&str>,
    ) {
        self.delegate
            .make_progress(self.scale_progress(task_progress), current_sub_task, message);
    }
}

impl fmt::Debug for ScalingTaskProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalingTaskProgressSink")
            .field("actual", &(self.actual_start, self.actual_end))
            .field("virtual", &(self.virtual_start, self.virtual_end))
            .finish()
    }
}

/// Split `[actual_start, actual_end]` into `count` contiguous slices, each
/// taking `0..=100` percentages. The rounding remainder goes to the last slice.
pub fn create_percentage_sinks_for_range(
    actual_start: i64,
    actual_end: i64,
    count: usize,
    delegate: SharedProgressSink,
) -> Result<Vec<ScalingTaskProgressSink>> {
    if count == 0 {
        return Err(TaskError::invalid_argument("number of sinks must be greater than 0"));
    }
    if actual_end < actual_start {
        return Err(TaskError::invalid_argument(format!(
            "actual range is inverted: [{}, {}]",
            actual_start, actual_end
        )));
    }

    let per_sink = (actual_end - actual_start) / count as i64;
    let mut sinks = Vec::with_capacity(count);
    let mut start = actual_start;
    for _ in 0..count - 1 {
        sinks.push(ScalingTaskProgressSink::percentage(start, start + per_sink, delegate.clone())?);
        start += per_sink;
    }
    sinks.push(ScalingTaskProgressSink::percentage(start, actual_end, delegate)?);

    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::sink::null_sink;

    #[test]
    fn test_clamps_to_bounds() {
        let sink = ScalingTaskProgressSink::new(20, 40, 0, 100, null_sink()).unwrap();
        assert_eq!(sink.scale_progress(-5), 20);
        assert_eq!(sink.scale_progress(0), 20);
        assert_eq!(sink.scale_progress(50), 30);
        assert_eq!(sink.scale_progress(100), 40);
        assert_eq!(sink.scale_progress(250), 40);
    }

    #[test]
    fn test_end_is_exact_with_uneven_scale() {
        let sink = ScalingTaskProgressSink::new(0, 33, 0, 7, null_sink()).unwrap();
        assert_eq!(sink.scale_progress(7), 33);
        assert!(sink.scale_progress(6) <= 33);
    }

    #[test]
    fn test_empty_virtual_range() {
        let sink = ScalingTaskProgressSink::new(10, 90, 5, 5, null_sink()).unwrap();
        assert_eq!(sink.scale_progress(5), 10);
        assert_eq!(sink.scale_progress(6), 90);
    }

    #[test]
    fn test_rejects_inverted_ranges() {
        assert!(ScalingTaskProgressSink::new(10, 0, 0, 100, null_sink()).is_err());
        assert!(ScalingTaskProgressSink::new(0, 10, 100, 0, null_sink()).is_err());
        assert!(create_percentage_sinks_for_range(0, 100, 0, null_sink()).is_err());
    }

    #[test]
    fn test_split_remainder_goes_last() {
        let sinks = create_percentage_sinks_for_range(0, 10, 3, null_sink()).unwrap();
        let ranges: Vec<_> = sinks.iter().map(|s| s.actual_range()).collect();
        assert_eq!(ranges, vec![(0, 3), (3, 6), (6, 10)]);
    }
}
