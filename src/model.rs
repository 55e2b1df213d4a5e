//! Record and wire types shared across the pipeline.
//!
//! Raw proxy JSON is decoded exactly once, at ingestion, into the tagged
//! `FieldValue` union. Downstream code never touches `serde_json::Value`
//! for record fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::filters::FilterCriterion;

// =============================================================================
// Cycle
// =============================================================================

/// One of the three survey administration periods. Each has its own field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Cycle {
    One = 1,
    Two = 2,
    Three = 3,
}

impl Cycle {
    pub const ALL: [Cycle; 3] = [Cycle::One, Cycle::Two, Cycle::Three];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Cycle> {
        match v {
            1 => Some(Cycle::One),
            2 => Some(Cycle::Two),
            3 => Some(Cycle::Three),
            _ => None,
        }
    }
}

impl From<Cycle> for u8 {
    fn from(c: Cycle) -> u8 {
        c.as_u8()
    }
}

impl TryFrom<u8> for Cycle {
    type Error = String;

    fn try_from(v: u8) -> Result<Cycle, String> {
        Cycle::from_u8(v).ok_or_else(|| format!("cycle out of range: {}", v))
    }
}

// =============================================================================
// Field values (tagged union, decoded once at ingestion)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedItem {
    pub id: String,
    pub name: String,
}

/// Decoded shape of a single record field. Knack serves numbers as numbers
/// or numeric strings, connection fields as arrays of {id, name} objects,
/// and the occasional bare object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Connected(Vec<ConnectedItem>),
    Null,
}

impl FieldValue {
    pub fn decode(raw: &Value) -> FieldValue {
        match raw {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Text(b.to_string()),
            Value::Number(n) => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Null),
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(items) => {
                let connected = items.iter().map(Self::decode_connected_item).collect();
                FieldValue::Connected(connected)
            }
            Value::Object(map) => {
                if map.contains_key("id") || map.contains_key("name") {
                    FieldValue::Connected(vec![Self::decode_connected_item(raw)])
                } else if let Some(Value::String(email)) = map.get("email") {
                    FieldValue::Text(email.clone())
                } else {
                    FieldValue::Text(raw.to_string())
                }
            }
        }
    }

    fn decode_connected_item(raw: &Value) -> ConnectedItem {
        match raw {
            Value::String(s) => ConnectedItem { id: String::new(), name: s.clone() },
            Value::Object(map) => ConnectedItem {
                id: map.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: map.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            },
            other => ConnectedItem { id: String::new(), name: other.to_string() },
        }
    }

    /// Numeric view of this value. Numeric strings parse; everything else
    /// is treated as absent.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Stringified view used by the filter engine. `None` for Null - a
    /// missing value fails every criterion that references it.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Number(n) => {
                if n.fract() == 0.0 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(format!("{}", n))
                }
            }
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Connected(items) => {
                let names: Vec<&str> = items
                    .iter()
                    .map(|i| if i.name.is_empty() { i.id.as_str() } else { i.name.as_str() })
                    .collect();
                Some(names.join(", "))
            }
            FieldValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

// =============================================================================
// Records
// =============================================================================

/// One respondent's survey submission: opaque field ids mapped to decoded
/// values. Immutable after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Record {
        Record { id: id.into(), fields: BTreeMap::new() }
    }

    /// Decode one raw record object from the proxy.
    pub fn from_json(raw: &Value) -> Record {
        let mut record = Record::new("");
        if let Value::Object(map) = raw {
            for (key, value) in map {
                if key == "id" {
                    record.id = value.as_str().unwrap_or_default().to_string();
                } else {
                    record.fields.insert(key.clone(), FieldValue::decode(value));
                }
            }
        }
        record
    }

    pub fn with_field(mut self, field: impl Into<String>, value: FieldValue) -> Record {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(FieldValue::as_number)
    }

    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(FieldValue::as_text)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

// =============================================================================
// Dashboard scope
// =============================================================================

/// The data partition and filter state a dashboard load runs against.
/// Exactly one of `establishment_id` / `staff_admin_id` is set - they are
/// mutually exclusive selection modes, not additive.
#[derive(Debug, Clone)]
pub struct DashboardScope {
    pub cycle: Cycle,
    pub establishment_id: Option<String>,
    pub staff_admin_id: Option<String>,
    pub active_filters: Vec<FilterCriterion>,
}

impl DashboardScope {
    pub fn for_establishment(cycle: Cycle, establishment_id: impl Into<String>) -> DashboardScope {
        DashboardScope {
            cycle,
            establishment_id: Some(establishment_id.into()),
            staff_admin_id: None,
            active_filters: Vec::new(),
        }
    }

    pub fn for_staff_admin(cycle: Cycle, staff_admin_id: impl Into<String>) -> DashboardScope {
        DashboardScope {
            cycle,
            establishment_id: None,
            staff_admin_id: Some(staff_admin_id.into()),
            active_filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<FilterCriterion>) -> DashboardScope {
        self.active_filters = filters;
        self
    }

    /// Caller precondition from the gateway contract: exactly one selection
    /// mode must be present.
    pub fn validate(&self) -> ApiResult<()> {
        match (&self.establishment_id, &self.staff_admin_id) {
            (Some(_), Some(_)) => Err(ApiError::InvalidScope(
                "both establishment and staff-admin partitions set".to_string(),
            )),
            (None, None) => Err(ApiError::InvalidScope(
                "no data partition selected".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Cache identity: role id, establishment id and cycle. Filters are
    /// applied after the fetch and do not partition the batch.
    pub fn scope_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.staff_admin_id.as_deref().unwrap_or("-"),
            self.establishment_id.as_deref().unwrap_or("-"),
            self.cycle.as_u8()
        )
    }
}

// =============================================================================
// Proxy payloads
// =============================================================================

/// Decoded result of the batch endpoint. Everything a dashboard render
/// needs in one round trip.
#[derive(Debug, Clone)]
pub struct BatchPayload {
    pub vespa_results: Vec<Record>,
    pub national_benchmark: Option<Record>,
    pub filter_options: FilterOptions,
    pub school_eri: Option<SchoolEri>,
    pub national_eri: Option<NationalEri>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub courses: Vec<String>,
    #[serde(default)]
    pub year_groups: Vec<String>,
    #[serde(default)]
    pub faculties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolEri {
    #[serde(rename = "school_eri")]
    pub value: Option<f64>,
    #[serde(default)]
    pub response_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NationalEri {
    #[serde(rename = "national_eri")]
    pub value: Option<f64>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Establishment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstablishmentList {
    pub establishments: Vec<Establishment>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub source_object: String,
    #[serde(default)]
    pub partial: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionMappings {
    #[serde(default)]
    pub id_to_text: BTreeMap<String, String>,
    #[serde(default)]
    pub psychometric_details: Vec<PsychometricDetail>,
}

/// One psychometric questionnaire item: which record field carries its
/// score and which VESPA category it feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsychometricDetail {
    pub question_id: String,
    #[serde(default)]
    pub vespa_category: Option<String>,
    #[serde(default)]
    pub field_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterrogationQuestion {
    pub id: String,
    pub question: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cycle_round_trip() {
        for c in Cycle::ALL {
            assert_eq!(Cycle::from_u8(c.as_u8()), Some(c));
        }
        assert_eq!(Cycle::from_u8(0), None);
        assert_eq!(Cycle::from_u8(4), None);
    }

    #[test]
    fn test_decode_number_and_numeric_string() {
        assert_eq!(FieldValue::decode(&json!(7.5)).as_number(), Some(7.5));
        assert_eq!(FieldValue::decode(&json!("3.25")).as_number(), Some(3.25));
        assert_eq!(FieldValue::decode(&json!("n/a")).as_number(), None);
    }

    #[test]
    fn test_decode_connected_array() {
        let raw = json!([{"id": "abc", "name": "Group 12A"}, {"id": "def", "name": "Group 12B"}]);
        let value = FieldValue::decode(&raw);
        match &value {
            FieldValue::Connected(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].name, "Group 12A");
            }
            other => panic!("expected connected, got {:?}", other),
        }
        assert_eq!(value.as_text().as_deref(), Some("Group 12A, Group 12B"));
    }

    #[test]
    fn test_decode_bare_object_as_single_connection() {
        let raw = json!({"id": "xyz", "name": "Mr Holt"});
        match FieldValue::decode(&raw) {
            FieldValue::Connected(items) => assert_eq!(items[0].id, "xyz"),
            other => panic!("expected connected, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_email_object() {
        let raw = json!({"email": "head@school.example"});
        assert_eq!(
            FieldValue::decode(&raw).as_text().as_deref(),
            Some("head@school.example")
        );
    }

    #[test]
    fn test_null_has_no_text_view() {
        assert_eq!(FieldValue::decode(&json!(null)).as_text(), None);
        assert!(FieldValue::decode(&json!(null)).is_null());
    }

    #[test]
    fn test_record_from_json_captures_id_and_fields() {
        let raw = json!({"id": "rec1", "field_155": 6, "field_187": "Alice"});
        let record = Record::from_json(&raw);
        assert_eq!(record.id, "rec1");
        assert_eq!(record.number("field_155"), Some(6.0));
        assert_eq!(record.text("field_187").as_deref(), Some("Alice"));
        assert_eq!(record.field_count(), 2);
    }

    #[test]
    fn test_scope_validation_rejects_both_and_neither() {
        let mut scope = DashboardScope::for_establishment(Cycle::One, "est1");
        scope.staff_admin_id = Some("sa1".to_string());
        assert!(scope.validate().is_err());

        let mut scope = DashboardScope::for_staff_admin(Cycle::One, "sa1");
        scope.staff_admin_id = None;
        assert!(scope.validate().is_err());
    }

    #[test]
    fn test_scope_key_distinguishes_cycle_and_partition() {
        let a = DashboardScope::for_establishment(Cycle::One, "est1");
        let b = DashboardScope::for_establishment(Cycle::Two, "est1");
        let c = DashboardScope::for_establishment(Cycle::One, "est2");
        let d = DashboardScope::for_staff_admin(Cycle::One, "est1");
        assert_ne!(a.scope_key(), b.scope_key());
        assert_ne!(a.scope_key(), c.scope_key());
        assert_ne!(a.scope_key(), d.scope_key());
    }

    #[test]
    fn test_scope_key_ignores_filters() {
        let bare = DashboardScope::for_establishment(Cycle::One, "est1");
        let filtered = DashboardScope::for_establishment(Cycle::One, "est1").with_filters(vec![
            crate::filters::FilterCriterion::new("field_223", crate::filters::FilterOp::Is, "12A"),
        ]);
        assert_eq!(bare.scope_key(), filtered.scope_key());
    }
}
