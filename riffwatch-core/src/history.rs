//! Rolling accuracy history and the session streak watermark.

use crate::types::{History, Snapshot};

/// Owns the [`History`] window and the highest streak seen this session.
///
/// Only the polling loop writes to it. The watermark never decreases, even
/// when the source reports a lower highest streak or stops reporting one.
#[derive(Debug, Default, Clone)]
pub struct HistoryAggregator {
    history: History,
    highest_streak_ever: u32,
}

impl HistoryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an accuracy sample and return the resulting window.
    pub fn record(&mut self, accuracy: f64) -> History {
        self.history.push(accuracy);
        self.history.clone()
    }

    /// Raise the watermark to `reported` if it is higher.
    pub fn raise_watermark(&mut self, reported: u32) -> u32 {
        self.highest_streak_ever = self.highest_streak_ever.max(reported);
        self.highest_streak_ever
    }

    /// Fold an identified snapshot into both the window and the watermark.
    pub fn observe(&mut self, snapshot: &Snapshot) -> History {
        self.raise_watermark(snapshot.highest_streak);
        self.record(snapshot.accuracy)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn highest_streak_ever(&self) -> u32 {
        self.highest_streak_ever
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HISTORY_CAPACITY;

    #[test]
    fn record_keeps_last_ten_in_order() {
        let mut aggregator = HistoryAggregator::new();
        let samples: Vec<f64> = (1..=25).map(|i| i as f64 * 1.5).collect();

        let mut last = History::new();
        for sample in &samples {
            last = aggregator.record(*sample);
        }

        assert_eq!(last.len(), HISTORY_CAPACITY);
        assert_eq!(last.to_vec(), samples[samples.len() - HISTORY_CAPACITY..].to_vec());
        assert_eq!(aggregator.history(), &last);
    }

    #[test]
    fn record_below_capacity_keeps_everything() {
        let mut aggregator = HistoryAggregator::new();
        aggregator.record(50.0);
        let history = aggregator.record(60.0);
        assert_eq!(history.to_vec(), vec![50.0, 60.0]);
    }

    #[test]
    fn watermark_never_regresses() {
        let mut aggregator = HistoryAggregator::new();
        let reported = [5, 40, 12, 0, 39, 41, 3];

        let mut previous = 0;
        for value in reported {
            let current = aggregator.raise_watermark(value);
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(aggregator.highest_streak_ever(), 41);
    }

    #[test]
    fn observe_updates_both() {
        let mut aggregator = HistoryAggregator::new();
        let snapshot = Snapshot {
            song: "Crazy Train".to_string(),
            accuracy: 87.5,
            highest_streak: 40,
            ..Default::default()
        };
        let history = aggregator.observe(&snapshot);
        assert_eq!(history.latest(), Some(87.5));
        assert_eq!(aggregator.highest_streak_ever(), 40);

        let dropped = Snapshot {
            highest_streak: 2,
            ..snapshot
        };
        aggregator.observe(&dropped);
        assert_eq!(aggregator.highest_streak_ever(), 40);
    }
}
