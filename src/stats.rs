//! Aggregation engine: descriptive statistics over numeric fields.
//!
//! Internal computation runs at full precision; rounding happens once at
//! the output boundary (2 decimal places, 3 for skewness).

use serde::Serialize;

use crate::fields::{self, Category};
use crate::model::{Cycle, PsychometricDetail, Record};

// =============================================================================
// Descriptive statistics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateResult {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentile_25: f64,
    pub percentile_50: f64,
    pub percentile_75: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub skewness: f64,
    pub count: usize,
}

/// Full descriptive statistics over a value sequence. `None` for empty
/// input - callers treat that as "no data", not an error.
pub fn calculate_statistics(values: &[f64]) -> Option<AggregateResult> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mean = values.iter().sum::<f64>() / n;
    // Population variance: divide by N, not N-1.
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    // Skewness is defined only for N > 2; a zero-spread sample has no
    // asymmetry, so the stdDev = 0 case is pinned to 0 as well.
    let skewness = if values.len() > 2 && std_dev > 0.0 {
        values.iter().map(|x| ((x - mean) / std_dev).powi(3)).sum::<f64>() / n
    } else {
        0.0
    };

    let half_width = 1.96 * std_dev / n.sqrt();

    Some(AggregateResult {
        mean: round2(mean),
        std_dev: round2(std_dev),
        min: round2(sorted[0]),
        max: round2(sorted[sorted.len() - 1]),
        percentile_25: round2(percentile(&sorted, 25.0)),
        percentile_50: round2(percentile(&sorted, 50.0)),
        percentile_75: round2(percentile(&sorted, 75.0)),
        ci_lower: round2(mean - half_width),
        ci_upper: round2(mean + half_width),
        skewness: round3(skewness),
        count: values.len(),
    })
}

/// Percentile by linear interpolation between order statistics:
/// index = p/100 × (N−1), interpolated between floor and ceil.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

// =============================================================================
// School VESPA averages
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CategoryAverage {
    pub category: &'static str,
    pub mean: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchoolAverages {
    pub cycle: u8,
    /// Rows whose overall field is present and numeric for this cycle.
    pub valid_rows: usize,
    pub total_rows: usize,
    pub averages: Vec<CategoryAverage>,
}

/// Per-category averages for one cycle. A record's overall field being
/// present and numeric is the row-validity gate: a record without it
/// contributes to no category, even with partial category data. Each
/// category keeps its own denominator - a valid row missing one category
/// field is excluded from that category's count only.
pub fn school_vespa_averages(records: &[Record], cycle: Cycle) -> SchoolAverages {
    let field_map = fields::for_cycle(cycle);
    let mut sums = [0.0f64; 6];
    let mut counts = [0usize; 6];
    let mut valid_rows = 0usize;

    for record in records {
        if record.number(field_map.overall).is_none() {
            continue;
        }
        valid_rows += 1;
        for (i, category) in Category::ALL.iter().enumerate() {
            if let Some(v) = record.number(field_map.category_field(*category)) {
                sums[i] += v;
                counts[i] += 1;
            }
        }
    }

    let averages = Category::ALL
        .iter()
        .enumerate()
        .map(|(i, category)| CategoryAverage {
            category: category.as_str(),
            mean: if counts[i] > 0 { Some(round2(sums[i] / counts[i] as f64)) } else { None },
            count: counts[i],
        })
        .collect();

    SchoolAverages {
        cycle: cycle.as_u8(),
        valid_rows,
        total_rows: records.len(),
        averages,
    }
}

/// Values of one category field across records that pass the overall gate.
/// Feeds the per-category histograms and statistics panels.
pub fn category_values(records: &[Record], cycle: Cycle, category: Category) -> Vec<f64> {
    let field_map = fields::for_cycle(cycle);
    records
        .iter()
        .filter(|r| r.number(field_map.overall).is_some())
        .filter_map(|r| r.number(field_map.category_field(category)))
        .collect()
}

/// Histogram input: counts per integer score bucket 1..=max_score, with
/// fractional values assigned to the nearest bucket.
pub fn score_distribution(values: &[f64], max_score: u32) -> Vec<usize> {
    let mut buckets = vec![0usize; max_score as usize];
    for v in values {
        let bucket = v.round();
        if bucket >= 1.0 && bucket <= max_score as f64 {
            buckets[bucket as usize - 1] += 1;
        }
    }
    buckets
}

// =============================================================================
// Question-level breakdown
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct QuestionScore {
    pub question_id: String,
    pub mean: f64,
    pub count: usize,
}

/// Mean score per psychometric question across the record set. Questions
/// with no mapped field or no numeric responses are omitted.
pub fn question_breakdown(records: &[Record], details: &[PsychometricDetail]) -> Vec<QuestionScore> {
    let mut scores = Vec::new();
    for detail in details {
        let Some(field_id) = detail.field_id.as_deref() else {
            continue;
        };
        let values: Vec<f64> = records.iter().filter_map(|r| r.number(field_id)).collect();
        if values.is_empty() {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        scores.push(QuestionScore {
            question_id: detail.question_id.clone(),
            mean: round2(mean),
            count: values.len(),
        });
    }
    scores
}

// =============================================================================
// Comment themes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeCount {
    pub word: String,
    pub count: usize,
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "have", "has", "had", "was", "were", "are",
    "but", "not", "you", "your", "they", "them", "their", "what", "when", "how", "more", "very",
    "would", "could", "should", "about", "because", "been", "being", "will", "than", "then",
    "there", "here", "just", "also", "some", "from", "into", "out", "can", "get", "got", "its",
];

/// Word-frequency themes over free-text comments: lowercased, stop-word
/// filtered, short tokens dropped. Ordering is deterministic: count
/// descending, then alphabetical.
pub fn theme_counts(texts: &[String], top_n: usize) -> Vec<ThemeCount> {
    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for text in texts {
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.len() < 3 || STOP_WORDS.contains(&token) {
                continue;
            }
            *counts.entry(token.to_string()).or_insert(0) += 1;
        }
    }
    let mut themes: Vec<ThemeCount> = counts
        .into_iter()
        .map(|(word, count)| ThemeCount { word, count })
        .collect();
    themes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    themes.truncate(top_n);
    themes
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;

    #[test]
    fn test_empty_input_yields_none() {
        assert!(calculate_statistics(&[]).is_none());
    }

    #[test]
    fn test_single_value() {
        let stats = calculate_statistics(&[5.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.percentile_25, 5.0);
        assert_eq!(stats.percentile_50, 5.0);
        assert_eq!(stats.percentile_75, 5.0);
        assert_eq!(stats.ci_lower, 5.0);
        assert_eq!(stats.ci_upper, 5.0);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_one_to_five() {
        let stats = calculate_statistics(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(stats.mean, 3.0);
        // Population variance = 2, std dev = sqrt(2) ≈ 1.4142 → 1.41
        assert_eq!(stats.std_dev, 1.41);
        assert_eq!(stats.percentile_50, 3.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.count, 5);
        // Symmetric input has no skew
        assert_eq!(stats.skewness, 0.0);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        // rank(25) = 0.75 → 1.0 + 0.75 * (2.0 - 1.0) = 1.75
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 25.0), 1.75);
        assert_eq!(percentile(&sorted, 50.0), 2.5);
        assert_eq!(percentile(&sorted, 75.0), 3.25);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 4.0);
    }

    #[test]
    fn test_sort_does_not_disturb_mean_of_unsorted_input() {
        let stats = calculate_statistics(&[5.0, 1.0, 3.0]).unwrap();
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
    }

    #[test]
    fn test_constant_sample_has_zero_skewness() {
        // stdDev = 0 must not produce NaN or infinity
        let stats = calculate_statistics(&[4.0, 4.0, 4.0, 4.0]).unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.skewness, 0.0);
        assert!(stats.skewness.is_finite());
    }

    #[test]
    fn test_skewness_zero_below_three_samples() {
        let stats = calculate_statistics(&[1.0, 9.0]).unwrap();
        assert_eq!(stats.skewness, 0.0);
    }

    #[test]
    fn test_right_skewed_sample_is_positive() {
        let stats = calculate_statistics(&[1.0, 1.0, 1.0, 1.0, 10.0]).unwrap();
        assert!(stats.skewness > 0.0, "skewness was {}", stats.skewness);
    }

    #[test]
    fn test_confidence_interval_brackets_mean() {
        let stats = calculate_statistics(&[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!(stats.ci_lower < stats.mean);
        assert!(stats.ci_upper > stats.mean);
        // Half-width = 1.96 * std / sqrt(N), symmetric around the mean
        let lower_gap = stats.mean - stats.ci_lower;
        let upper_gap = stats.ci_upper - stats.mean;
        assert!((lower_gap - upper_gap).abs() < 0.011);
    }

    fn survey_record(id: &str, cycle: Cycle, scores: &[(Category, f64)]) -> Record {
        let field_map = fields::for_cycle(cycle);
        let mut record = Record::new(id);
        for (category, score) in scores {
            record = record.with_field(
                field_map.category_field(*category),
                FieldValue::Number(*score),
            );
        }
        record
    }

    #[test]
    fn test_vespa_averages_overall_gate() {
        // r1 is fully valid; r2 has category data but no overall field and
        // must contribute to nothing.
        let r1 = survey_record(
            "r1",
            Cycle::One,
            &[(Category::Vision, 6.0), (Category::Overall, 5.0)],
        );
        let r2 = survey_record("r2", Cycle::One, &[(Category::Vision, 10.0)]);
        let averages = school_vespa_averages(&[r1, r2], Cycle::One);

        assert_eq!(averages.valid_rows, 1);
        assert_eq!(averages.total_rows, 2);
        let vision = &averages.averages[0];
        assert_eq!(vision.category, "vision");
        assert_eq!(vision.mean, Some(6.0));
        assert_eq!(vision.count, 1);
    }

    #[test]
    fn test_vespa_averages_per_category_denominator() {
        // Both rows pass the overall gate; only r1 carries a vision score.
        // Vision average must be 6.0 over count 1, not 3.0 over count 2.
        let r1 = survey_record(
            "r1",
            Cycle::One,
            &[(Category::Vision, 6.0), (Category::Overall, 5.0)],
        );
        let r2 = survey_record("r2", Cycle::One, &[(Category::Overall, 7.0)]);
        let averages = school_vespa_averages(&[r1, r2], Cycle::One);

        assert_eq!(averages.valid_rows, 2);
        let vision = &averages.averages[0];
        assert_eq!(vision.mean, Some(6.0));
        assert_eq!(vision.count, 1);
        let overall = &averages.averages[5];
        assert_eq!(overall.mean, Some(6.0));
        assert_eq!(overall.count, 2);
    }

    #[test]
    fn test_vespa_averages_rounding() {
        let r1 = survey_record(
            "r1",
            Cycle::One,
            &[(Category::Effort, 5.0), (Category::Overall, 5.0)],
        );
        let r2 = survey_record(
            "r2",
            Cycle::One,
            &[(Category::Effort, 6.0), (Category::Overall, 6.0)],
        );
        let r3 = survey_record(
            "r3",
            Cycle::One,
            &[(Category::Effort, 6.0), (Category::Overall, 6.0)],
        );
        let averages = school_vespa_averages(&[r1, r2, r3], Cycle::One);
        let effort = &averages.averages[1];
        // 17 / 3 = 5.666... → 5.67
        assert_eq!(effort.mean, Some(5.67));
    }

    #[test]
    fn test_vespa_averages_empty_input() {
        let averages = school_vespa_averages(&[], Cycle::Two);
        assert_eq!(averages.valid_rows, 0);
        assert!(averages.averages.iter().all(|a| a.mean.is_none()));
    }

    #[test]
    fn test_numeric_strings_count_as_scores() {
        let field_map = fields::for_cycle(Cycle::One);
        let record = Record::new("r1")
            .with_field(field_map.overall, FieldValue::Text("5".to_string()))
            .with_field(field_map.vision, FieldValue::Text("7".to_string()));
        let averages = school_vespa_averages(&[record], Cycle::One);
        assert_eq!(averages.valid_rows, 1);
        assert_eq!(averages.averages[0].mean, Some(7.0));
    }

    #[test]
    fn test_score_distribution_buckets() {
        let dist = score_distribution(&[1.0, 2.0, 2.0, 10.0, 10.4, 0.0, 11.0], 10);
        assert_eq!(dist.len(), 10);
        assert_eq!(dist[0], 1); // one score of 1
        assert_eq!(dist[1], 2); // two scores of 2
        assert_eq!(dist[9], 2); // 10.0 and 10.4 both land on 10
        assert_eq!(dist.iter().sum::<usize>(), 5); // 0.0 and 11.0 out of range
    }

    #[test]
    fn test_question_breakdown_skips_unmapped_and_empty() {
        let records = vec![
            Record::new("r1").with_field("field_794", FieldValue::Number(4.0)),
            Record::new("r2").with_field("field_794", FieldValue::Number(2.0)),
        ];
        let details = vec![
            PsychometricDetail {
                question_id: "q1".to_string(),
                vespa_category: Some("VISION".to_string()),
                field_id: Some("field_794".to_string()),
            },
            PsychometricDetail {
                question_id: "q2".to_string(),
                vespa_category: None,
                field_id: None,
            },
            PsychometricDetail {
                question_id: "q3".to_string(),
                vespa_category: None,
                field_id: Some("field_999".to_string()),
            },
        ];
        let scores = question_breakdown(&records, &details);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].question_id, "q1");
        assert_eq!(scores[0].mean, 3.0);
        assert_eq!(scores[0].count, 2);
    }

    #[test]
    fn test_theme_counts_filters_and_orders() {
        let texts = vec![
            "Revision timetable helped my revision".to_string(),
            "The timetable was good".to_string(),
        ];
        let themes = theme_counts(&texts, 10);
        assert_eq!(themes[0], ThemeCount { word: "revision".to_string(), count: 2 });
        assert_eq!(themes[1], ThemeCount { word: "timetable".to_string(), count: 2 });
        assert!(themes.iter().all(|t| t.word != "the" && t.word != "was" && t.word != "my"));
    }

    #[test]
    fn test_theme_counts_truncates() {
        let texts = vec!["alpha beta gamma delta epsilon".to_string()];
        let themes = theme_counts(&texts, 3);
        assert_eq!(themes.len(), 3);
    }
}
