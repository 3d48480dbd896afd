// Per-minute aggregates of a chat table: message volume and emotion mix.

use std::collections::BTreeMap;
use std::fmt;

use chatscope_common::{ChatTable, EMOTION_NAMES};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinuteBucket {
    pub minute: u64,
    pub messages: usize,
    pub emotions: BTreeMap<String, usize>,
}

/// Gaps are filled with empty minutes only when the timeline spans at most
/// this many minutes (a week); longer spans list occupied minutes only.
pub const MAX_FILLED_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmotionTimeline {
    /// Minutes that have at least one message, ascending.
    pub buckets: Vec<MinuteBucket>,
    /// Label counts over the whole table: the fixed emotions in their usual
    /// order, then any other labels alphabetically.
    pub totals: Vec<(String, usize)>,
    pub labeled: bool,
}

impl EmotionTimeline {
    pub fn from_table(table: &ChatTable) -> Self {
        let mut by_minute: BTreeMap<u64, MinuteBucket> = BTreeMap::new();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();

        for record in &table.records {
            let minute = record.minute();
            let bucket = by_minute.entry(minute).or_insert_with(|| MinuteBucket {
                minute,
                ..Default::default()
            });
            bucket.messages += 1;
            if let Some(emotion) = &record.emotion {
                *bucket.emotions.entry(emotion.clone()).or_default() += 1;
                *counts.entry(emotion.clone()).or_default() += 1;
            }
        }

        let mut totals: Vec<(String, usize)> = EMOTION_NAMES
            .iter()
            .map(|name| (name.to_string(), counts.remove(*name).unwrap_or(0)))
            .collect();
        totals.extend(counts);

        Self {
            buckets: by_minute.into_values().collect(),
            totals,
            labeled: table.is_labeled(),
        }
    }

    /// Every minute from 0 to the last message, empty ones included, when the
    /// span is at most `MAX_FILLED_MINUTES`; otherwise the occupied minutes.
    pub fn filled(&self) -> Vec<MinuteBucket> {
        let last = match self.buckets.last() {
            Some(bucket) if bucket.minute <= MAX_FILLED_MINUTES => bucket.minute,
            _ => return self.buckets.clone(),
        };

        let mut occupied = self.buckets.iter().peekable();
        (0..=last)
            .map(|minute| match occupied.next_if(|b| b.minute == minute) {
                Some(bucket) => bucket.clone(),
                None => MinuteBucket {
                    minute,
                    ..Default::default()
                },
            })
            .collect()
    }

    pub fn total_messages(&self) -> usize {
        self.buckets.iter().map(|b| b.messages).sum()
    }

    /// Minute with the most messages (earliest on ties).
    pub fn peak_minute(&self) -> Option<&MinuteBucket> {
        self.buckets
            .iter()
            .filter(|b| b.messages > 0)
            .max_by(|a, b| a.messages.cmp(&b.messages).then(b.minute.cmp(&a.minute)))
    }
}

impl fmt::Display for EmotionTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "messages: {}", self.total_messages())?;
        if let Some(peak) = self.peak_minute() {
            writeln!(f, "peak: minute {} ({} messages)", peak.minute, peak.messages)?;
        }

        if self.labeled {
            writeln!(f)?;
            for (label, count) in &self.totals {
                writeln!(f, "{label}\t{count}")?;
            }
        }

        writeln!(f)?;
        writeln!(f, "minute\tmessages")?;
        for bucket in self.filled() {
            write!(f, "{}\t{}", bucket.minute, bucket.messages)?;
            if self.labeled {
                for name in EMOTION_NAMES {
                    write!(f, "\t{}", bucket.emotions.get(name).copied().unwrap_or(0))?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
