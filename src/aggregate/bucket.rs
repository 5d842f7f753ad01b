use crate::aggregate::rules::{Aggregation, FieldSource, MetricRule, MetricValue};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
enum Accumulator {
    Count(u64),
    Sum(f64),
    Mean { sum: f64, count: u64 },
    Union(BTreeSet<String>),
    Mode(BTreeMap<String, u64>),
    Area(f64),
}

impl Accumulator {
    fn empty(aggregation: &Aggregation) -> Self {
        match aggregation {
            Aggregation::Count => Accumulator::Count(0),
            Aggregation::Sum(_) => Accumulator::Sum(0.0),
            Aggregation::Mean(_) => Accumulator::Mean { sum: 0.0, count: 0 },
            Aggregation::Union(_) => Accumulator::Union(BTreeSet::new()),
            Aggregation::Mode(_) => Accumulator::Mode(BTreeMap::new()),
            Aggregation::AreaKm2 => Accumulator::Area(0.0),
        }
    }

    fn fold(&mut self, aggregation: &Aggregation, record: &dyn FieldSource, area_km2: f64) {
        match (self, aggregation) {
            (Accumulator::Count(n), _) => *n += 1,
            (Accumulator::Sum(total), Aggregation::Sum(cols)) => {
                *total += cols.iter().filter_map(|c| record.number(c)).sum::<f64>();
            }
            (Accumulator::Mean { sum, count }, Aggregation::Mean(col)) => {
                if let Some(v) = record.number(col).filter(|v| v.is_finite()) {
                    *sum += v;
                    *count += 1;
                }
            }
            (Accumulator::Union(set), Aggregation::Union(col)) => {
                if let Some(v) = record.text(col) {
                    set.insert(v);
                }
            }
            (Accumulator::Mode(counts), Aggregation::Mode(col)) => {
                if let Some(v) = record.text(col) {
                    *counts.entry(v).or_insert(0) += 1;
                }
            }
            (Accumulator::Area(total), _) => *total += area_km2,
            _ => {}
        }
    }

    fn merge(&mut self, other: Accumulator) {
        match (self, other) {
            (Accumulator::Count(a), Accumulator::Count(b)) => *a += b,
            (Accumulator::Sum(a), Accumulator::Sum(b)) => *a += b,
            (Accumulator::Mean { sum, count }, Accumulator::Mean { sum: s, count: c }) => {
                *sum += s;
                *count += c;
            }
            (Accumulator::Union(a), Accumulator::Union(b)) => a.extend(b),
            (Accumulator::Mode(a), Accumulator::Mode(b)) => {
                for (k, n) in b {
                    *a.entry(k).or_insert(0) += n;
                }
            }
            (Accumulator::Area(a), Accumulator::Area(b)) => *a += b,
            _ => {}
        }
    }

    fn finalize(&self) -> MetricValue {
        match self {
            Accumulator::Count(n) => MetricValue::Number(*n as f64),
            Accumulator::Sum(total) | Accumulator::Area(total) => MetricValue::Number(*total),
            Accumulator::Mean { count: 0, .. } => MetricValue::Null,
            Accumulator::Mean { sum, count } => MetricValue::Number(sum / *count as f64),
            Accumulator::Union(set) => MetricValue::List(set.iter().cloned().collect()),
            Accumulator::Mode(counts) => {
                // BTreeMap iterates in ascending key order, so a strict `>`
                // keeps the smallest value among equally frequent ones.
                let mut best: Option<(&String, u64)> = None;
                for (value, &n) in counts {
                    if best.is_none_or(|(_, m)| n > m) {
                        best = Some((value, n));
                    }
                }
                best.map_or(MetricValue::Null, |(v, _)| MetricValue::Text(v.clone()))
            }
        }
    }
}

/// Running accumulators for one `(cell, time bucket)` key.
///
/// Holds one accumulator per rule, positionally aligned with the rule
/// slice it was created from. Every method taking `rules` must be given
/// the same slice.
#[derive(Debug, Clone, PartialEq)]
pub struct CellBucket {
    accumulators: Vec<Accumulator>,
    contributions: u64,
}

impl CellBucket {
    pub fn new(rules: &[MetricRule]) -> Self {
        Self {
            accumulators: rules.iter().map(|r| Accumulator::empty(&r.aggregation)).collect(),
            contributions: 0,
        }
    }

    /// Folds one record. `area_km2` feeds `AreaKm2` rules and is ignored by the rest.
    pub fn fold(&mut self, rules: &[MetricRule], record: &dyn FieldSource, area_km2: f64) {
        for (acc, rule) in self.accumulators.iter_mut().zip(rules) {
            acc.fold(&rule.aggregation, record, area_km2);
        }
        self.contributions += 1;
    }

    /// Combines two partial buckets built from the same rules.
    pub fn merge(&mut self, other: CellBucket) {
        for (acc, o) in self.accumulators.iter_mut().zip(other.accumulators) {
            acc.merge(o);
        }
        self.contributions += other.contributions;
    }

    pub fn contributions(&self) -> u64 {
        self.contributions
    }

    pub fn is_empty(&self) -> bool {
        self.contributions == 0
    }

    pub fn finalize(&self, rules: &[MetricRule]) -> BTreeMap<String, MetricValue> {
        rules
            .iter()
            .zip(&self.accumulators)
            .map(|(rule, acc)| (rule.key.clone(), acc.finalize()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    fn record(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn rules() -> Vec<MetricRule> {
        vec![
            MetricRule::new("n", Aggregation::Count),
            MetricRule::new("total", Aggregation::sum_of(["a", "b"])),
            MetricRule::new("avg", Aggregation::mean("x")),
            MetricRule::new("labels", Aggregation::union("tag")),
            MetricRule::new("common", Aggregation::mode("tag")),
            MetricRule::new("area", Aggregation::AreaKm2),
        ]
    }

    #[test]
    fn test_fold_and_finalize() {
        let rules = rules();
        let mut bucket = CellBucket::new(&rules);
        bucket.fold(&rules, &record(json!({"a": 1, "b": 2, "x": 4.0, "tag": "q"})), 1.5);
        bucket.fold(&rules, &record(json!({"a": null, "b": 5, "tag": "p"})), 2.0);
        bucket.fold(&rules, &record(json!({"a": 3, "x": 2.0, "tag": "q"})), 0.5);

        let out = bucket.finalize(&rules);
        assert_eq!(out["n"], MetricValue::Number(3.0));
        assert_eq!(out["total"], MetricValue::Number(11.0));
        assert_eq!(out["avg"], MetricValue::Number(3.0));
        assert_eq!(out["labels"], MetricValue::List(vec!["p".into(), "q".into()]));
        assert_eq!(out["common"], MetricValue::Text("q".into()));
        assert_eq!(out["area"], MetricValue::Number(4.0));
        assert_eq!(bucket.contributions(), 3);
    }

    #[test]
    fn test_empty_bucket_defaults() {
        let rules = rules();
        let out = CellBucket::new(&rules).finalize(&rules);
        assert_eq!(out["n"], MetricValue::Number(0.0));
        assert_eq!(out["total"], MetricValue::Number(0.0));
        assert_eq!(out["avg"], MetricValue::Null);
        assert_eq!(out["labels"], MetricValue::List(vec![]));
        assert_eq!(out["common"], MetricValue::Null);
    }

    #[test]
    fn test_mode_tie_takes_smallest() {
        let rules = vec![MetricRule::new("m", Aggregation::mode("v"))];
        let mut bucket = CellBucket::new(&rules);
        for v in ["zeta", "alpha", "zeta", "alpha", "mid"] {
            bucket.fold(&rules, &record(json!({ "v": v })), 0.0);
        }
        assert_eq!(bucket.finalize(&rules)["m"], MetricValue::Text("alpha".into()));
    }

    #[test]
    fn test_merge_matches_sequential_fold() {
        let rules = rules();
        let records = [
            record(json!({"a": 1, "x": 1.0, "tag": "q"})),
            record(json!({"b": 2, "x": 3.0, "tag": "p"})),
            record(json!({"a": 4, "tag": "p"})),
        ];

        let mut sequential = CellBucket::new(&rules);
        for r in &records {
            sequential.fold(&rules, r, 1.0);
        }

        let mut left = CellBucket::new(&rules);
        left.fold(&rules, &records[0], 1.0);
        let mut right = CellBucket::new(&rules);
        right.fold(&rules, &records[1], 1.0);
        right.fold(&rules, &records[2], 1.0);
        left.merge(right);

        assert_eq!(left.finalize(&rules), sequential.finalize(&rules));
    }
}
