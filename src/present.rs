//! Presentation layer: render-ready view models.
//!
//! Strictly a consumer of aggregation output - the only logic here is
//! picking a color band and formatting deltas. The band thresholds at
//! 2.0 / 3.0 / 4.0 are shared by every visualization.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{InterrogationQuestion, NationalEri, SchoolEri};
use crate::stats::{CategoryAverage, QuestionScore, SchoolAverages, ThemeCount};

pub const MAX_SCORE: u32 = 10;

// =============================================================================
// Score bands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Poor,
    Average,
    Good,
    Excellent,
}

pub fn band_for(score: f64) -> Band {
    if score < 2.0 {
        Band::Poor
    } else if score < 3.0 {
        Band::Average
    } else if score < 4.0 {
        Band::Good
    } else {
        Band::Excellent
    }
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Poor => "poor",
            Band::Average => "average",
            Band::Good => "good",
            Band::Excellent => "excellent",
        }
    }

    pub fn css_color(&self) -> &'static str {
        match self {
            Band::Poor => "#e74c3c",
            Band::Average => "#f39c12",
            Band::Good => "#3498db",
            Band::Excellent => "#2ecc71",
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Percentage delta of a school score against its national counterpart,
/// one decimal place. `None` when no meaningful national value exists.
pub fn delta_vs_national(score: f64, national: Option<f64>) -> Option<f64> {
    match national {
        Some(n) if n != 0.0 => Some(round1((score - n) / n * 100.0)),
        _ => None,
    }
}

// =============================================================================
// Score cards
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ScoreCard {
    pub category: &'static str,
    pub score: Option<f64>,
    pub band: Option<Band>,
    pub color: Option<&'static str>,
    pub count: usize,
    pub national: Option<f64>,
    pub delta_pct: Option<f64>,
}

pub fn score_card(average: &CategoryAverage, national: Option<f64>) -> ScoreCard {
    let band = average.mean.map(band_for);
    ScoreCard {
        category: average.category,
        score: average.mean,
        band,
        color: band.map(|b| b.css_color()),
        count: average.count,
        national,
        delta_pct: average.mean.and_then(|score| delta_vs_national(score, national)),
    }
}

// =============================================================================
// Histograms
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    pub score: u32,
    pub count: usize,
    pub band: Band,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramView {
    pub category: &'static str,
    pub buckets: Vec<HistogramBucket>,
}

pub fn histogram(category: &'static str, distribution: &[usize]) -> HistogramView {
    let buckets = distribution
        .iter()
        .enumerate()
        .map(|(i, count)| {
            let score = i as u32 + 1;
            HistogramBucket { score, count: *count, band: band_for(score as f64) }
        })
        .collect();
    HistogramView { category, buckets }
}

// =============================================================================
// ERI gauge
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EriGauge {
    pub school: Option<f64>,
    pub national: Option<f64>,
    pub response_count: u64,
    pub band: Option<Band>,
    pub delta_pct: Option<f64>,
    pub national_source: Option<String>,
}

pub fn eri_gauge(school: Option<&SchoolEri>, national: Option<&NationalEri>) -> EriGauge {
    let school_value = school.and_then(|s| s.value);
    let national_value = national.and_then(|n| n.value);
    EriGauge {
        school: school_value,
        national: national_value,
        response_count: school.map(|s| s.response_count).unwrap_or(0),
        band: school_value.map(band_for),
        delta_pct: school_value.and_then(|v| delta_vs_national(v, national_value)),
        national_source: national.map(|n| n.source.clone()).filter(|s| !s.is_empty()),
    }
}

// =============================================================================
// Question-level views
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub question_id: String,
    pub text: String,
    pub mean: f64,
    pub count: usize,
    pub band: Band,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionRanking {
    pub top: Vec<QuestionView>,
    pub bottom: Vec<QuestionView>,
}

/// Top/bottom N questions by mean score. Sorting is stable on question id
/// for equal means, so repeated renders agree.
pub fn question_ranking(
    scores: &[QuestionScore],
    id_to_text: &BTreeMap<String, String>,
    n: usize,
) -> QuestionRanking {
    let view = |score: &QuestionScore| QuestionView {
        question_id: score.question_id.clone(),
        text: id_to_text.get(&score.question_id).cloned().unwrap_or_default(),
        mean: score.mean,
        count: score.count,
        band: band_for(score.mean),
    };

    let mut ordered: Vec<&QuestionScore> = scores.iter().collect();
    ordered.sort_by(|a, b| {
        b.mean
            .partial_cmp(&a.mean)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.question_id.cmp(&b.question_id))
    });

    let top = ordered.iter().take(n).map(|s| view(s)).collect();
    let bottom = ordered.iter().rev().take(n).map(|s| view(s)).collect();
    QuestionRanking { top, bottom }
}

// =============================================================================
// Section views
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ResponseRate {
    pub valid_rows: usize,
    pub total_rows: usize,
    pub rate_pct: Option<f64>,
}

pub fn response_rate(averages: &SchoolAverages) -> ResponseRate {
    let rate_pct = if averages.total_rows > 0 {
        Some(round1(averages.valid_rows as f64 / averages.total_rows as f64 * 100.0))
    } else {
        None
    };
    ResponseRate {
        valid_rows: averages.valid_rows,
        total_rows: averages.total_rows,
        rate_pct,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewView {
    pub cycle: u8,
    pub cards: Vec<ScoreCard>,
    pub histograms: Vec<HistogramView>,
    pub eri: EriGauge,
    pub response_rate: ResponseRate,
}

#[derive(Debug, Clone, Serialize)]
pub struct QlaView {
    pub ranking: QuestionRanking,
    pub question_count: usize,
    /// Canned interrogation prompts offered next to the chat box.
    pub suggested: Vec<InterrogationQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentsView {
    pub themes: Vec<ThemeCount>,
    pub comment_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
