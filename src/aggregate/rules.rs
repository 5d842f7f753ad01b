use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// How one output metric folds the records contributing to a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Number of contributing records.
    Count,
    /// Sum of one or more numeric columns. Null or missing values add zero.
    Sum(Vec<String>),
    /// Mean of a numeric column over the records where it is present.
    Mean(String),
    /// Distinct values of a categorical column.
    Union(String),
    /// Most frequent value of a categorical column, ties going to the
    /// lexicographically smallest value.
    Mode(String),
    /// Geodesic area in km² of the overlap between cell and record.
    AreaKm2,
}

impl Aggregation {
    pub fn sum(column: impl Into<String>) -> Self {
        Aggregation::Sum(vec![column.into()])
    }

    pub fn sum_of<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Aggregation::Sum(columns.into_iter().map(Into::into).collect())
    }

    pub fn mean(column: impl Into<String>) -> Self {
        Aggregation::Mean(column.into())
    }

    pub fn union(column: impl Into<String>) -> Self {
        Aggregation::Union(column.into())
    }

    pub fn mode(column: impl Into<String>) -> Self {
        Aggregation::Mode(column.into())
    }

    /// Numeric columns this aggregation reads.
    pub fn numeric_columns(&self) -> Vec<&str> {
        match self {
            Aggregation::Sum(cols) => cols.iter().map(String::as_str).collect(),
            Aggregation::Mean(col) => vec![col.as_str()],
            _ => vec![],
        }
    }

    /// Categorical columns this aggregation reads.
    pub fn label_columns(&self) -> Vec<&str> {
        match self {
            Aggregation::Union(col) | Aggregation::Mode(col) => vec![col.as_str()],
            _ => vec![],
        }
    }
}

/// Human-readable description of an output metric, written to the
/// output metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescription {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MetricDescription {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            unit: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// One output metric: its key in `properties.metrics`, how it is folded,
/// and an optional description for the metadata block.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRule {
    pub key: String,
    pub aggregation: Aggregation,
    pub description: Option<MetricDescription>,
}

impl MetricRule {
    pub fn new(key: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            key: key.into(),
            aggregation,
            description: None,
        }
    }

    pub fn describe(mut self, description: MetricDescription) -> Self {
        self.description = Some(description);
        self
    }
}

/// Collects the descriptions of every described rule, keyed by metric key.
pub fn describe_rules(rules: &[MetricRule]) -> BTreeMap<String, MetricDescription> {
    rules
        .iter()
        .filter_map(|r| r.description.clone().map(|d| (r.key.clone(), d)))
        .collect()
}

/// Read access to the attributes of one contributing record.
pub trait FieldSource {
    /// Numeric value of `column`, `None` when absent, null or unparseable.
    fn number(&self, column: &str) -> Option<f64>;
    /// Categorical value of `column`, `None` when absent or null.
    fn text(&self, column: &str) -> Option<String>;
}

impl FieldSource for Map<String, Value> {
    fn number(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn text(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// A finalized metric value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
    Flag(bool),
    Null,
}

/// Largest integer an f64 holds exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Integral numbers serialize as JSON integers, other finite numbers as
    /// floats, and non-finite numbers as `null`.
    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Number(v) if v.fract() == 0.0 && v.abs() <= MAX_EXACT_INT => {
                Value::from(*v as i64)
            }
            MetricValue::Number(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::Text(s) => Value::String(s.clone()),
            MetricValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            MetricValue::Flag(b) => Value::Bool(*b),
            MetricValue::Null => Value::Null,
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => MetricValue::Null,
            Value::Bool(b) => MetricValue::Flag(*b),
            Value::Number(n) => n.as_f64().map_or(MetricValue::Null, MetricValue::Number),
            Value::String(s) => MetricValue::Text(s.clone()),
            Value::Array(items) => MetricValue::List(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Value::Object(_) => MetricValue::Text(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integral_numbers_serialize_as_integers() {
        assert_eq!(MetricValue::Number(3.0).to_json(), json!(3));
        assert_eq!(MetricValue::Number(2.5).to_json(), json!(2.5));
        assert_eq!(MetricValue::Number(f64::NAN).to_json(), Value::Null);
        assert_eq!(
            MetricValue::List(vec!["1".into(), "2".into()]).to_json(),
            json!(["1", "2"])
        );
    }

    #[test]
    fn test_json_properties_as_field_source() {
        let props = json!({"DI": 0.4, "DI2": "0.7", "LU": "Grazing", "code": 3, "empty": null});
        let props = props.as_object().cloned().unwrap_or_default();

        assert_eq!(props.number("DI"), Some(0.4));
        assert_eq!(props.number("DI2"), Some(0.7));
        assert_eq!(props.number("LU"), None);
        assert_eq!(props.number("empty"), None);
        assert_eq!(props.text("LU"), Some("Grazing".to_string()));
        assert_eq!(props.text("code"), Some("3".to_string()));
        assert_eq!(props.text("empty"), None);
        assert_eq!(props.text("missing"), None);
    }

    #[test]
    fn test_describe_rules_skips_undescribed() {
        let rules = vec![
            MetricRule::new("a", Aggregation::Count)
                .describe(MetricDescription::new("A", "first").unit("count")),
            MetricRule::new("b", Aggregation::Count),
        ];
        let described = describe_rules(&rules);
        assert_eq!(described.len(), 1);
        assert_eq!(described["a"].unit.as_deref(), Some("count"));
    }
}
