//! Batch scanning and cross-batch aggregation
//!
//! Scans a decompressed log batch line by line, counts lines whose
//! terminating rule is in the configured allow-list, and merges per-batch
//! counts into the run-wide accumulator.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use thiserror::Error;

use crate::aggregation::decode::parse_log_line;
use crate::models::BlockCount;

/// Errors reading the decompressed log stream. Unlike a malformed line,
/// these abort the batch.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("log stream unreadable: {0}")]
    Io(#[from] std::io::Error),
}

/// Set of rule IDs whose matching log lines are counted.
///
/// Membership is exact and case-sensitive. Immutable for the duration of
/// a run.
#[derive(Debug, Clone, Default)]
pub struct RuleAllowList {
    ids: HashSet<String>,
}

impl RuleAllowList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleAllowList {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.ids.contains(rule_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Scan one decompressed batch and count filter-passing lines per client IP.
///
/// Empty lines are skipped silently. Lines that fail to parse are skipped
/// with a diagnostic; every other line either passes the rule filter and
/// increments its client IP's count, or is ignored. Only a read error on
/// the underlying stream aborts the batch.
pub fn aggregate_batch<R: BufRead>(
    reader: R,
    rules: &RuleAllowList,
) -> Result<HashMap<String, u64>, ScanError> {
    let mut counts: HashMap<String, u64> = HashMap::new();

    for line in reader.lines() {
        let line = line?;

        // Nothing in this line - probably just a newline.
        if line.is_empty() {
            continue;
        }

        let record = match parse_log_line(&line) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("skipping unparseable log line: {}", err);
                continue;
            }
        };

        if !rules.contains(&record.terminating_rule_id) {
            continue;
        }

        *counts.entry(record.http_request.client_ip).or_insert(0) += 1;
    }

    Ok(counts)
}

/// Merge one batch's counts into the run-wide accumulator.
///
/// An IP absent from the accumulator is inserted at the batch's full count;
/// an existing entry has the batch count added. Merging is commutative and
/// associative, so batches may be combined in any order or grouping.
pub fn merge_batch(global: &mut HashMap<String, BlockCount>, batch: HashMap<String, u64>) {
    for (ip, count) in batch {
        match global.entry(ip) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().count += count;
            }
            Entry::Vacant(entry) => {
                let ip = entry.key().clone();
                entry.insert(BlockCount { ip, count });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use proptest::prelude::*;
    use std::io::Cursor;
    use std::io::Write;

    use crate::aggregation::decode::open_batch;

    fn rules(ids: &[&str]) -> RuleAllowList {
        RuleAllowList::new(ids.iter().copied())
    }

    fn block_line(rule: &str, ip: &str) -> String {
        format!(
            r#"{{"action":"BLOCK","terminatingRuleId":"{}","httpRequest":{{"clientIp":"{}"}}}}"#,
            rule, ip
        )
    }

    fn gzip(content: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_counts_only_allowed_rules() {
        let batch = [
            block_line("RULE_A", "10.0.0.1"),
            block_line("RULE_B", "10.0.0.1"),
            block_line("RULE_A", "10.0.0.2"),
        ]
        .join("\n");

        let counts = aggregate_batch(Cursor::new(batch), &rules(&["RULE_A"])).unwrap();

        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get("10.0.0.1"), Some(&1));
        assert_eq!(counts.get("10.0.0.2"), Some(&1));
    }

    #[test]
    fn test_malformed_line_skipped_without_aborting() {
        let batch = [
            block_line("RULE_A", "1.2.3.4"),
            "{definitely not json".to_string(),
            block_line("RULE_A", "1.2.3.4"),
            block_line("RULE_A", "1.2.3.4"),
        ]
        .join("\n");

        let counts = aggregate_batch(Cursor::new(batch), &rules(&["RULE_A"])).unwrap();

        assert_eq!(counts.get("1.2.3.4"), Some(&3));
    }

    #[test]
    fn test_empty_lines_skipped_silently() {
        let batch = format!("\n\n{}\n\n", block_line("RULE_A", "1.2.3.4"));

        let counts = aggregate_batch(Cursor::new(batch), &rules(&["RULE_A"])).unwrap();

        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("1.2.3.4"), Some(&1));
    }

    #[test]
    fn test_unlisted_rule_never_counts() {
        let batch = (0..10)
            .map(|_| block_line("RULE_Z", "9.9.9.9"))
            .collect::<Vec<_>>()
            .join("\n");

        let counts = aggregate_batch(Cursor::new(batch), &rules(&["RULE_A"])).unwrap();

        assert!(counts.is_empty());
    }

    #[test]
    fn test_rule_match_is_case_sensitive() {
        let batch = block_line("rule_a", "9.9.9.9");

        let counts = aggregate_batch(Cursor::new(batch), &rules(&["RULE_A"])).unwrap();

        assert!(counts.is_empty());
    }

    #[test]
    fn test_empty_client_ip_is_a_valid_key() {
        let batch = r#"{"action":"BLOCK","terminatingRuleId":"RULE_A","httpRequest":{}}"#;

        let counts = aggregate_batch(Cursor::new(batch), &rules(&["RULE_A"])).unwrap();

        assert_eq!(counts.get(""), Some(&1));
    }

    #[test]
    fn test_truncated_stream_aborts_batch() {
        let mut bytes = gzip(&format!("{}\n", block_line("RULE_A", "1.2.3.4")).repeat(200));
        bytes.truncate(bytes.len() / 2);

        let reader = open_batch(bytes).unwrap();
        let result = aggregate_batch(reader, &rules(&["RULE_A"]));

        assert!(matches!(result, Err(ScanError::Io(_))));
    }

    #[test]
    fn test_merge_concrete_scenario() {
        let mut global = HashMap::new();

        let mut first = HashMap::new();
        first.insert("9.9.9.9".to_string(), 2);
        merge_batch(&mut global, first);

        let mut second = HashMap::new();
        second.insert("9.9.9.9".to_string(), 3);
        second.insert("8.8.8.8".to_string(), 1);
        merge_batch(&mut global, second);

        assert_eq!(global.get("9.9.9.9").map(|c| c.count), Some(5));
        assert_eq!(global.get("8.8.8.8").map(|c| c.count), Some(1));
    }

    #[test]
    fn test_merge_first_observation_keeps_batch_count() {
        let mut global = HashMap::new();

        let mut batch = HashMap::new();
        batch.insert("9.9.9.9".to_string(), 7);
        merge_batch(&mut global, batch);

        let entry = global.get("9.9.9.9").unwrap();
        assert_eq!(entry.ip, "9.9.9.9");
        assert_eq!(entry.count, 7);
    }

    fn ip(idx: usize) -> String {
        format!("10.0.0.{}", idx)
    }

    proptest! {
        #[test]
        fn prop_merge_commutative_and_associative(
            batches in proptest::collection::vec(
                proptest::collection::vec((0usize..5, 1u64..50), 0..8),
                0..6,
            ),
        ) {
            let batch_maps: Vec<HashMap<String, u64>> = batches
                .iter()
                .map(|batch| {
                    let mut map = HashMap::new();
                    for (idx, count) in batch {
                        *map.entry(ip(*idx)).or_insert(0) += count;
                    }
                    map
                })
                .collect();

            let mut expected: HashMap<String, u64> = HashMap::new();
            for map in &batch_maps {
                for (key, count) in map {
                    *expected.entry(key.clone()).or_insert(0) += count;
                }
            }

            let mut forward = HashMap::new();
            for map in batch_maps.clone() {
                merge_batch(&mut forward, map);
            }

            let mut reverse = HashMap::new();
            for map in batch_maps.clone().into_iter().rev() {
                merge_batch(&mut reverse, map);
            }

            // Grouping batches pairwise before folding must not change totals.
            let mut grouped = HashMap::new();
            for pair in batch_maps.chunks(2) {
                let mut partial: HashMap<String, BlockCount> = HashMap::new();
                for map in pair {
                    merge_batch(&mut partial, map.clone());
                }
                let partial_counts: HashMap<String, u64> =
                    partial.into_iter().map(|(key, c)| (key, c.count)).collect();
                merge_batch(&mut grouped, partial_counts);
            }

            prop_assert_eq!(forward.len(), expected.len());
            prop_assert_eq!(reverse.len(), expected.len());
            prop_assert_eq!(grouped.len(), expected.len());
            for (key, count) in &expected {
                prop_assert_eq!(forward.get(key).map(|c| c.count), Some(*count));
                prop_assert_eq!(reverse.get(key).map(|c| c.count), Some(*count));
                prop_assert_eq!(grouped.get(key).map(|c| c.count), Some(*count));
            }
        }
    }
}
