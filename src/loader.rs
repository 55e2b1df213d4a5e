//! Dashboard orchestration: fetch → cache → filter → aggregate → present.
//!
//! `DashboardContext` owns the gateway handle, the single-slot batch
//! cache and the request-generation counter, and is passed explicitly to
//! everything that needs it - there are no global singletons. The batch
//! fetch completes and populates the cache before the three section loads
//! fan out; the sections then share the already-resolved payload and fail
//! independently of one another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::cache::BatchCache;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::fields::{self, Category};
use crate::filters::apply_filters;
use crate::gateway::DashboardApi;
use crate::logging::{json_log, obj, v_num, v_str};
use crate::model::{BatchPayload, DashboardScope, EstablishmentList, FilterOptions, Record};
use crate::present::{
    self, CommentsView, OverviewView, QlaView, MAX_SCORE,
};
use crate::stats;

// =============================================================================
// Section outcomes
// =============================================================================

/// Result of one section load. A failure is rendered inline in that
/// section only and never blocks its siblings.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome<T> {
    Ready { view: T },
    Failed { message: String },
}

impl<T> SectionOutcome<T> {
    fn fail(section: &str, err: &ApiError) -> SectionOutcome<T> {
        json_log(
            "loader",
            obj(&[
                ("event", v_str("section_failed")),
                ("section", v_str(section)),
                ("kind", v_str(err.kind())),
                ("message", v_str(&err.to_string())),
            ]),
        );
        SectionOutcome::Failed { message: err.to_string() }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SectionOutcome::Ready { .. })
    }

    pub fn view(&self) -> Option<&T> {
        match self {
            SectionOutcome::Ready { view } => Some(view),
            SectionOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub generation: u64,
    pub scope_key: String,
    pub cycle: u8,
    pub filtered_count: usize,
    pub filter_options: FilterOptions,
    pub overview: SectionOutcome<OverviewView>,
    pub qla: SectionOutcome<QlaView>,
    pub comments: SectionOutcome<CommentsView>,
}

// =============================================================================
// Context
// =============================================================================

pub struct DashboardContext {
    cfg: Config,
    api: Arc<dyn DashboardApi>,
    cache: Mutex<BatchCache>,
    generation: AtomicU64,
}

impl DashboardContext {
    pub fn new(cfg: Config, api: Arc<dyn DashboardApi>) -> Result<Self> {
        fields::validate()?;
        json_log(
            "loader",
            obj(&[
                ("event", v_str("context_init")),
                ("config_hash", v_str(&cfg.config_hash())),
                ("cache_ttl_secs", v_num(cfg.cache_ttl_secs as f64)),
            ]),
        );
        let cache = Mutex::new(BatchCache::new(cfg.cache_ttl_secs));
        Ok(DashboardContext { cfg, api, cache, generation: AtomicU64::new(0) })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Ticket for one load. Any result carrying an older ticket when it
    /// lands is stale and gets discarded instead of rendered.
    pub fn begin_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn generation_is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Cycle changes invalidate the batch unconditionally so the next load
    /// cannot render stale-cycle data.
    pub fn on_cycle_change(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        json_log("cache", obj(&[("event", v_str("cleared")), ("reason", v_str("cycle_change"))]));
    }

    async fn cached_batch(&self, scope: &DashboardScope) -> ApiResult<BatchPayload> {
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| ApiError::Network("batch cache lock poisoned".to_string()))?;
            if let Some(hit) = cache.get(scope, Instant::now()) {
                json_log(
                    "cache",
                    obj(&[("event", v_str("hit")), ("scope", v_str(&scope.scope_key()))]),
                );
                return Ok(hit.clone());
            }
        }
        json_log("cache", obj(&[("event", v_str("miss")), ("scope", v_str(&scope.scope_key()))]));
        let payload = self.api.fetch_batch(scope).await?;
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| ApiError::Network("batch cache lock poisoned".to_string()))?;
        cache.set(scope, payload.clone(), Instant::now());
        Ok(payload)
    }

    /// Full dashboard load for one scope. Returns `None` when a newer load
    /// superseded this one while it was in flight - the caller must not
    /// render a discarded result.
    pub async fn load_dashboard(&self, scope: &DashboardScope) -> Result<Option<DashboardView>> {
        scope.validate()?;
        let generation = self.begin_generation();
        json_log(
            "loader",
            obj(&[
                ("event", v_str("load_started")),
                ("scope", v_str(&scope.scope_key())),
                ("generation", v_num(generation as f64)),
            ]),
        );

        // The batch must be resolved before any section proceeds.
        let payload = self.cached_batch(scope).await?;
        let records = apply_filters(&payload.vespa_results, &scope.active_filters);

        // Independent fan-out over the shared payload; each section catches
        // its own failures.
        let (overview, qla, comments) = tokio::join!(
            self.load_overview(scope, &payload, &records),
            self.load_qla(&records),
            self.load_comments(scope, &records),
        );

        if !self.generation_is_current(generation) {
            json_log(
                "loader",
                obj(&[
                    ("event", v_str("stale_generation_discarded")),
                    ("generation", v_num(generation as f64)),
                    ("current", v_num(self.generation.load(Ordering::SeqCst) as f64)),
                ]),
            );
            return Ok(None);
        }

        json_log(
            "loader",
            obj(&[
                ("event", v_str("load_ready")),
                ("generation", v_num(generation as f64)),
                ("filtered_count", v_num(records.len() as f64)),
            ]),
        );
        Ok(Some(DashboardView {
            generation,
            scope_key: scope.scope_key(),
            cycle: scope.cycle.as_u8(),
            filtered_count: records.len(),
            filter_options: payload.filter_options.clone(),
            overview,
            qla,
            comments,
        }))
    }

    async fn load_overview(
        &self,
        scope: &DashboardScope,
        payload: &BatchPayload,
        records: &[Record],
    ) -> SectionOutcome<OverviewView> {
        let averages = stats::school_vespa_averages(records, scope.cycle);
        let field_map = fields::for_cycle(scope.cycle);

        let cards = averages
            .averages
            .iter()
            .enumerate()
            .map(|(i, average)| {
                let national = payload
                    .national_benchmark
                    .as_ref()
                    .and_then(|b| b.number(field_map.category_field(Category::ALL[i])));
                present::score_card(average, national)
            })
            .collect();

        let histograms = Category::ALL
            .iter()
            .map(|category| {
                let values = stats::category_values(records, scope.cycle, *category);
                let distribution = stats::score_distribution(&values, MAX_SCORE);
                present::histogram(category.as_str(), &distribution)
            })
            .collect();

        // The batch usually carries both ERI values; fall back to the
        // dedicated endpoints when it does not.
        let school_eri = match &payload.school_eri {
            Some(snapshot) => snapshot.clone(),
            None => match self.api.fetch_school_eri(scope).await {
                Ok(snapshot) => snapshot,
                Err(err) => return SectionOutcome::fail("overview", &err),
            },
        };
        let national_eri = match &payload.national_eri {
            Some(snapshot) => snapshot.clone(),
            None => match self.api.fetch_national_eri(scope.cycle).await {
                Ok(snapshot) => snapshot,
                Err(err) => return SectionOutcome::fail("overview", &err),
            },
        };

        SectionOutcome::Ready {
            view: OverviewView {
                cycle: scope.cycle.as_u8(),
                cards,
                histograms,
                eri: present::eri_gauge(Some(&school_eri), Some(&national_eri)),
                response_rate: present::response_rate(&averages),
            },
        }
    }

    async fn load_qla(&self, records: &[Record]) -> SectionOutcome<QlaView> {
        let mappings = match self.api.fetch_question_mappings().await {
            Ok(mappings) => mappings,
            Err(err) => return SectionOutcome::fail("qla", &err),
        };
        let scores = stats::question_breakdown(records, &mappings.psychometric_details);
        let ranking = present::question_ranking(&scores, &mappings.id_to_text, self.cfg.qla_top_n);
        // Suggested prompts are decoration; losing them is not a section
        // failure.
        let suggested = match self.api.fetch_interrogation_questions().await {
            Ok(questions) => questions,
            Err(err) => {
                json_log(
                    "loader",
                    obj(&[
                        ("event", v_str("suggested_questions_unavailable")),
                        ("kind", v_str(err.kind())),
                    ]),
                );
                Vec::new()
            }
        };
        SectionOutcome::Ready {
            view: QlaView { question_count: scores.len(), ranking, suggested },
        }
    }

    async fn load_comments(
        &self,
        scope: &DashboardScope,
        records: &[Record],
    ) -> SectionOutcome<CommentsView> {
        let comment_field = fields::for_cycle(scope.cycle).comment;
        let texts: Vec<String> = records
            .iter()
            .filter_map(|r| r.text(comment_field))
            .filter(|t| !t.trim().is_empty())
            .collect();
        let themes = stats::theme_counts(&texts, self.cfg.theme_top_n);
        SectionOutcome::Ready {
            view: CommentsView { themes, comment_count: texts.len() },
        }
    }

    /// Establishment list for the super-user selection step.
    pub async fn establishments(&self) -> ApiResult<EstablishmentList> {
        self.api.fetch_establishments().await
    }

    /// QLA chat passthrough: the proxy owns the model call.
    pub async fn ask_qla(&self, query: &str, question_data: &Value) -> ApiResult<String> {
        self.api.qla_chat(query, question_data).await
    }
}

// =============================================================================
// Tests
// =============================================================================
