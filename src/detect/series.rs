//! Per-metric grouping of raw samples.

use std::collections::HashMap;

use crate::detect::MetricSample;

/// The time-ordered samples of one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries<'a> {
    pub metric_name: &'a str,
    pub samples: Vec<&'a MetricSample>,
}

impl MetricSeries<'_> {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Partition samples by metric name.
///
/// Groups come out in first-seen order of their metric name. Within a group
/// samples are stably sorted by timestamp, so equal timestamps keep their
/// input order. Storage already hands samples over ordered by
/// `(metric_name, ts)`; the sort makes no assumption about that.
pub fn group_by_metric(samples: &[MetricSample]) -> Vec<MetricSeries<'_>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<MetricSeries<'_>> = Vec::new();

    for sample in samples {
        let slot = *index.entry(sample.metric_name.as_str()).or_insert_with(|| {
            groups.push(MetricSeries {
                metric_name: sample.metric_name.as_str(),
                samples: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].samples.push(sample);
    }

    for group in &mut groups {
        group.samples.sort_by_key(|s| s.ts);
    }

    groups
}
