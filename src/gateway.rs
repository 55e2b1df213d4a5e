//! Remote data gateway: thin wrapper over the backend proxy.
//!
//! No caching, no retry - failures propagate to the caller as typed
//! `ApiError`s and the caller decides the fallback. Non-success statuses
//! carry the proxy's `{message}` body when one parses, otherwise a
//! message synthesized from the status code.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::filters::FilterCriterion;
use crate::logging::{json_log, obj, v_num, v_str};
use crate::model::{
    BatchPayload, Cycle, DashboardScope, EstablishmentList, FilterOptions, InterrogationQuestion,
    NationalEri, QuestionMappings, Record, SchoolEri,
};

// =============================================================================
// Record queries
// =============================================================================

/// Parameters for the generic record endpoint (`GET /api/knack-data`).
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub object_key: String,
    pub filters: Vec<FilterCriterion>,
    pub rows_per_page: u32,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
    pub fields: Vec<String>,
}

impl RecordQuery {
    pub fn new(object_key: impl Into<String>) -> Self {
        RecordQuery {
            object_key: object_key.into(),
            filters: Vec::new(),
            rows_per_page: 1000,
            sort_field: None,
            sort_order: None,
            fields: Vec::new(),
        }
    }

    pub fn with_filter(mut self, criterion: FilterCriterion) -> Self {
        self.filters.push(criterion);
        self
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Registry lookup shape used by role resolution.
    pub fn matching_email(object_key: &str, email_field: &str, email: &str) -> Self {
        RecordQuery::new(object_key).with_filter(FilterCriterion::new(
            email_field,
            crate::filters::FilterOp::Is,
            email,
        ))
    }
}

/// Knack-style filter JSON for the wire: `{"match":"and","rules":[...]}`
/// with OR-groups nested one level down.
fn filters_to_wire(criteria: &[FilterCriterion]) -> Value {
    fn rule(criterion: &FilterCriterion) -> Value {
        if criterion.any_of.is_empty() {
            json!({
                "field": criterion.field,
                "operator": criterion.operator.as_str(),
                "value": criterion.value,
            })
        } else {
            json!({
                "match": "or",
                "rules": criterion.any_of.iter().map(rule).collect::<Vec<Value>>(),
            })
        }
    }
    json!({
        "match": "and",
        "rules": criteria.iter().map(rule).collect::<Vec<Value>>(),
    })
}

/// Synthesize the error message for a non-success response: the proxy's
/// `{message}` body when parseable, a status-code fallback otherwise.
fn error_message(status: u16, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => format!("HTTP {}", status),
    }
}

// =============================================================================
// API seam
// =============================================================================

/// The backend proxy surface the pipeline consumes. A trait so section
/// loaders and tests can run against a stub instead of the network.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn fetch_batch(&self, scope: &DashboardScope) -> ApiResult<BatchPayload>;
    async fn fetch_records(&self, query: &RecordQuery) -> ApiResult<Vec<Record>>;
    async fn fetch_establishments(&self) -> ApiResult<EstablishmentList>;
    async fn fetch_school_eri(&self, scope: &DashboardScope) -> ApiResult<SchoolEri>;
    async fn fetch_national_eri(&self, cycle: Cycle) -> ApiResult<NationalEri>;
    async fn fetch_question_mappings(&self) -> ApiResult<QuestionMappings>;
    async fn fetch_interrogation_questions(&self) -> ApiResult<Vec<InterrogationQuestion>>;
    async fn qla_chat(&self, query: &str, question_data: &Value) -> ApiResult<String>;
}

// =============================================================================
// Concrete proxy gateway
// =============================================================================

pub struct ProxyGateway {
    client: Client,
    base: Url,
    rows_per_page: u32,
}

#[derive(Deserialize)]
struct RecordsWire {
    #[serde(default)]
    records: Vec<Value>,
}

#[derive(Deserialize)]
struct BatchPayloadWire {
    #[serde(default, rename = "vespaResults")]
    vespa_results: Vec<Value>,
    #[serde(default, rename = "nationalBenchmark")]
    national_benchmark: Option<Value>,
    #[serde(default, rename = "filterOptions")]
    filter_options: FilterOptions,
    #[serde(default, rename = "schoolERI")]
    school_eri: Option<SchoolEri>,
    #[serde(default, rename = "nationalERI")]
    national_eri: Option<NationalEri>,
}

#[derive(Deserialize)]
struct QlaChatWire {
    answer: String,
}

impl ProxyGateway {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        let base = Url::parse(&cfg.proxy_base)?;
        Ok(ProxyGateway { client, base, rows_per_page: cfg.rows_per_page })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Network(format!("bad endpoint {}: {}", path, e)))
    }

    fn records_url(&self, query: &RecordQuery) -> ApiResult<Url> {
        let mut url = self.endpoint("/api/knack-data")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("objectKey", &query.object_key);
            if !query.filters.is_empty() {
                pairs.append_pair("filters", &filters_to_wire(&query.filters).to_string());
            }
            pairs.append_pair("rows_per_page", &query.rows_per_page.to_string());
            if let Some(sort_field) = &query.sort_field {
                pairs.append_pair("sort_field", sort_field);
            }
            if let Some(sort_order) = &query.sort_order {
                pairs.append_pair("sort_order", sort_order);
            }
            if !query.fields.is_empty() {
                pairs.append_pair("fields", &query.fields.join(","));
            }
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        let resp = self.client.get(url).send().await.map_err(ApiError::from_reqwest)?;
        Self::decode(resp).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(&self, url: Url, body: &Value) -> ApiResult<T> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        Self::decode(resp).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> ApiResult<T> {
        let status = resp.status();
        let body = resp.text().await.map_err(ApiError::from_reqwest)?;
        if !status.is_success() {
            let message = error_message(status.as_u16(), &body);
            json_log(
                "gateway",
                obj(&[
                    ("event", v_str("server_error")),
                    ("status", v_num(status.as_u16() as f64)),
                    ("message", v_str(&message)),
                ]),
            );
            return Err(ApiError::Server { status: status.as_u16(), message });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Query params shared by the scoped endpoints: cycle plus exactly one
    /// partition id. Scope validity is a caller precondition checked here.
    fn scope_pairs(url: &mut Url, scope: &DashboardScope) {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("cycle", &scope.cycle.as_u8().to_string());
        if let Some(est) = &scope.establishment_id {
            pairs.append_pair("establishmentId", est);
        }
        if let Some(sa) = &scope.staff_admin_id {
            pairs.append_pair("staffAdminId", sa);
        }
    }
}

#[async_trait]
impl DashboardApi for ProxyGateway {
    async fn fetch_batch(&self, scope: &DashboardScope) -> ApiResult<BatchPayload> {
        scope.validate()?;
        let url = self.endpoint("/api/dashboard-initial-data")?;
        let body = json!({
            "staffAdminId": scope.staff_admin_id,
            "establishmentId": scope.establishment_id,
            "cycle": scope.cycle.as_u8(),
        });
        let wire: BatchPayloadWire = self.post_json(url, &body).await?;
        json_log(
            "gateway",
            obj(&[
                ("event", v_str("batch_fetched")),
                ("scope", v_str(&scope.scope_key())),
                ("records", v_num(wire.vespa_results.len() as f64)),
            ]),
        );
        Ok(BatchPayload {
            vespa_results: wire.vespa_results.iter().map(Record::from_json).collect(),
            national_benchmark: wire.national_benchmark.as_ref().map(Record::from_json),
            filter_options: wire.filter_options,
            school_eri: wire.school_eri,
            national_eri: wire.national_eri,
        })
    }

    async fn fetch_records(&self, query: &RecordQuery) -> ApiResult<Vec<Record>> {
        let mut query = query.clone();
        if query.rows_per_page == 0 {
            query.rows_per_page = self.rows_per_page;
        }
        let url = self.records_url(&query)?;
        let wire: RecordsWire = self.get_json(url).await?;
        Ok(wire.records.iter().map(Record::from_json).collect())
    }

    async fn fetch_establishments(&self) -> ApiResult<EstablishmentList> {
        let url = self.endpoint("/api/establishments")?;
        self.get_json(url).await
    }

    async fn fetch_school_eri(&self, scope: &DashboardScope) -> ApiResult<SchoolEri> {
        scope.validate()?;
        let mut url = self.endpoint("/api/calculate-eri")?;
        Self::scope_pairs(&mut url, scope);
        self.get_json(url).await
    }

    async fn fetch_national_eri(&self, cycle: Cycle) -> ApiResult<NationalEri> {
        let mut url = self.endpoint("/api/national-eri")?;
        url.query_pairs_mut().append_pair("cycle", &cycle.as_u8().to_string());
        self.get_json(url).await
    }

    async fn fetch_question_mappings(&self) -> ApiResult<QuestionMappings> {
        let url = self.endpoint("/api/question-mappings")?;
        self.get_json(url).await
    }

    async fn fetch_interrogation_questions(&self) -> ApiResult<Vec<InterrogationQuestion>> {
        let url = self.endpoint("/api/interrogation-questions")?;
        self.get_json(url).await
    }

    async fn qla_chat(&self, query: &str, question_data: &Value) -> ApiResult<String> {
        let url = self.endpoint("/api/qla-chat")?;
        let body = json!({ "query": query, "questionData": question_data });
        let wire: QlaChatWire = self.post_json(url, &body).await?;
        Ok(wire.answer)
    }
}

// =============================================================================
// Tests
// =============================================================================
