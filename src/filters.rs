//! Filter engine: converts UI filter state into predicates over records.
//!
//! Criteria AND together; a criterion carrying sub-rules ORs those
//! sub-rules instead (search across first OR last name). All comparisons
//! are case-insensitive on the stringified field value. Input order is
//! preserved, so filtering is deterministic and idempotent.

use serde::{Deserialize, Serialize};

use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Is => "is",
            FilterOp::IsNot => "is not",
            FilterOp::Contains => "contains",
            FilterOp::DoesNotContain => "does not contain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriterion {
    pub field: String,
    pub operator: FilterOp,
    pub value: String,
    /// Non-empty turns this criterion into an OR-group over its sub-rules;
    /// its own field/operator/value are then ignored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<FilterCriterion>,
}

impl FilterCriterion {
    pub fn new(field: impl Into<String>, operator: FilterOp, value: impl Into<String>) -> Self {
        FilterCriterion {
            field: field.into(),
            operator,
            value: value.into(),
            any_of: Vec::new(),
        }
    }

    /// OR-group: matches when any sub-rule matches.
    pub fn any(rules: Vec<FilterCriterion>) -> Self {
        FilterCriterion {
            field: String::new(),
            operator: FilterOp::Is,
            value: String::new(),
            any_of: rules,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !self.any_of.is_empty() {
            return self.any_of.iter().any(|rule| rule.matches(record));
        }
        // Null or missing fields fail every criterion referencing them,
        // including negated operators.
        let actual = match record.get(&self.field).and_then(|v| v.as_text()) {
            Some(text) => text.to_lowercase(),
            None => return false,
        };
        let wanted = self.value.to_lowercase();
        match self.operator {
            FilterOp::Is => actual == wanted,
            FilterOp::IsNot => actual != wanted,
            FilterOp::Contains => actual.contains(&wanted),
            FilterOp::DoesNotContain => !actual.contains(&wanted),
        }
    }
}

/// Apply the criteria list (logical AND) to an in-memory record collection.
/// Stable: surviving records keep their input order.
pub fn apply_filters(records: &[Record], criteria: &[FilterCriterion]) -> Vec<Record> {
    records
        .iter()
        .filter(|record| criteria.iter().all(|criterion| criterion.matches(record)))
        .cloned()
        .collect()
}
