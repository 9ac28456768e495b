use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::Utc;

use crate::config::ScoringThresholds;
use crate::models::{
    CertificationTier, GfcCompositeScore, GfcIndicator, GfcStatus, KpiAggregate, KpiReadings,
    KpiSnapshot, KpiStatus, PredictedRisk,
};

/// Health score weights: segregation, door-to-door, hygiene, processing.
const HEALTH_WEIGHTS: [f64; 4] = [0.3, 0.3, 0.2, 0.2];

/// Classifies a single reading. NaN fails both comparisons and lands on red.
pub fn classify(value: f64, thresholds: &ScoringThresholds) -> KpiStatus {
    if value >= thresholds.green {
        KpiStatus::Green
    } else if value >= thresholds.amber {
        KpiStatus::Amber
    } else {
        KpiStatus::Red
    }
}

pub fn worst_status<I>(statuses: I) -> KpiStatus
where
    I: IntoIterator<Item = KpiStatus>,
{
    statuses.into_iter().max().unwrap_or(KpiStatus::Green)
}

/// Worst of the four classifications; one failing metric is never masked.
pub fn overall_status(readings: &KpiReadings, thresholds: &ScoringThresholds) -> KpiStatus {
    worst_status(
        [
            readings.segregation_rate,
            readings.d2d_coverage_rate,
            readings.toilet_hygiene_score,
            readings.waste_processing_rate,
        ]
        .into_iter()
        .map(|value| classify(value, thresholds)),
    )
}

/// Mean rounded to the nearest integer, halves up. Empty input is 0.
pub fn average(values: &[f64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    round_half_up(mean)
}

fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn round_two_places(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn gfc_status(current_value: f64, target_value: f64) -> GfcStatus {
    if current_value >= target_value {
        GfcStatus::Pass
    } else {
        GfcStatus::Fail
    }
}

/// Percentage of target reached, clamped to 0..=100.
///
/// A non-positive target cannot form a ratio, so it is all-or-nothing.
pub fn attainment(current_value: f64, target_value: f64) -> f64 {
    if target_value <= 0.0 {
        return if current_value >= target_value { 100.0 } else { 0.0 };
    }
    (current_value / target_value * 100.0).max(0.0).min(100.0)
}

#[derive(Default)]
struct WeightedSum {
    score: f64,
    weight: f64,
}

impl WeightedSum {
    fn add(&mut self, contribution: f64, weight: f64) {
        self.score += contribution;
        self.weight += weight;
    }

    fn normalized(&self) -> f64 {
        if self.weight > 0.0 {
            round_two_places(self.score / self.weight)
        } else {
            0.0
        }
    }
}

pub fn gfc_composite(indicators: &[GfcIndicator]) -> GfcCompositeScore {
    let mut total = WeightedSum::default();
    let mut categories: BTreeMap<String, WeightedSum> = BTreeMap::new();

    for indicator in indicators {
        let weight = f64::from(indicator.weight);
        let contribution = attainment(indicator.current_value, indicator.target_value) * weight;

        total.add(contribution, weight);
        categories
            .entry(indicator.category.clone())
            .or_default()
            .add(contribution, weight);
    }

    GfcCompositeScore {
        total: total.normalized(),
        by_category: categories
            .into_iter()
            .map(|(category, sum)| (category, sum.normalized()))
            .collect(),
        last_calculated: Utc::now(),
    }
}

pub fn certification_tier(total: f64, thresholds: &ScoringThresholds) -> CertificationTier {
    if total >= thresholds.certification {
        CertificationTier::ThreeStar
    } else {
        CertificationTier::BelowThreeStar
    }
}

pub fn health_score(readings: &KpiReadings) -> i64 {
    let values = [
        readings.segregation_rate,
        readings.d2d_coverage_rate,
        readings.toilet_hygiene_score,
        readings.waste_processing_rate,
    ];
    let weighted: f64 = values
        .iter()
        .zip(HEALTH_WEIGHTS)
        .map(|(value, weight)| value * weight)
        .sum();
    round_half_up(weighted)
}

/// Risk follows the same cutoffs as the KPI classifier.
pub fn predicted_risk(health_score: i64, thresholds: &ScoringThresholds) -> PredictedRisk {
    match classify(health_score as f64, thresholds) {
        KpiStatus::Green => PredictedRisk::Low,
        KpiStatus::Amber => PredictedRisk::Medium,
        KpiStatus::Red => PredictedRisk::High,
    }
}

/// Aggregates the latest snapshot of each ward in scope.
///
/// Returns `None` when no ward has reported, so "no data" stays distinct
/// from a genuine score of zero.
pub fn aggregate(
    scope: &str,
    latest: &[KpiSnapshot],
    thresholds: &ScoringThresholds,
) -> Option<KpiAggregate> {
    if latest.is_empty() {
        return None;
    }

    let column = |pick: fn(&KpiReadings) -> f64| -> i64 {
        let values: Vec<f64> = latest.iter().map(|s| pick(&s.readings)).collect();
        average(&values)
    };

    let avg_segregation = column(|r| r.segregation_rate);
    let avg_d2d = column(|r| r.d2d_coverage_rate);
    let avg_hygiene = column(|r| r.toilet_hygiene_score);
    let avg_processing = column(|r| r.waste_processing_rate);

    let averages = KpiReadings {
        segregation_rate: avg_segregation as f64,
        d2d_coverage_rate: avg_d2d as f64,
        toilet_hygiene_score: avg_hygiene as f64,
        waste_processing_rate: avg_processing as f64,
    };
    let health_score = health_score(&averages);

    Some(KpiAggregate {
        scope: scope.to_string(),
        ward_count: latest.len(),
        avg_segregation,
        avg_d2d,
        avg_hygiene,
        avg_processing,
        overall_status: overall_status(&averages, thresholds),
        health_score,
        predicted_risk: predicted_risk(health_score, thresholds),
        last_updated: Utc::now(),
    })
}

#[derive(Debug, Clone)]
pub struct WardRanking {
    pub ward_id: String,
    pub health_score: i64,
    pub status: KpiStatus,
    pub predicted_risk: PredictedRisk,
}

/// Wards ordered best first by health score, ties broken by ward id.
pub fn rank_wards(latest: &[KpiSnapshot], thresholds: &ScoringThresholds) -> Vec<WardRanking> {
    let mut rankings: Vec<WardRanking> = latest
        .iter()
        .map(|snapshot| {
            let score = health_score(&snapshot.readings);
            WardRanking {
                ward_id: snapshot.ward_id.clone(),
                health_score: score,
                status: snapshot.status,
                predicted_risk: predicted_risk(score, thresholds),
            }
        })
        .collect();

    rankings.sort_by(|a, b| match b.health_score.cmp(&a.health_score) {
        Ordering::Equal => a.ward_id.cmp(&b.ward_id),
        other => other,
    });
    rankings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn thresholds() -> ScoringThresholds {
        ScoringThresholds::default()
    }

    fn readings(values: [f64; 4]) -> KpiReadings {
        KpiReadings {
            segregation_rate: values[0],
            d2d_coverage_rate: values[1],
            toilet_hygiene_score: values[2],
            waste_processing_rate: values[3],
        }
    }

    fn indicator(current: f64, target: f64, weight: u32, category: &str) -> GfcIndicator {
        GfcIndicator {
            id: Uuid::new_v4(),
            name: format!("{category} indicator"),
            category: category.to_string(),
            weight,
            current_value: current,
            target_value: target,
            unit: "percentage".to_string(),
            status: gfc_status(current, target),
            evidence_urls: Vec::new(),
            last_assessed: Utc::now(),
        }
    }

    fn snapshot(ward_id: &str, values: [f64; 4]) -> KpiSnapshot {
        let readings = readings(values);
        KpiSnapshot {
            id: Uuid::new_v4(),
            ward_id: ward_id.to_string(),
            zone_id: "Z1".to_string(),
            snapshot_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            readings,
            status: overall_status(&readings, &thresholds()),
            notes: String::new(),
            recorded_by: "system".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn classify_boundaries() {
        let t = thresholds();
        assert_eq!(classify(59.999, &t), KpiStatus::Red);
        assert_eq!(classify(60.0, &t), KpiStatus::Amber);
        assert_eq!(classify(84.999, &t), KpiStatus::Amber);
        assert_eq!(classify(85.0, &t), KpiStatus::Green);
    }

    #[test]
    fn classify_handles_out_of_range_values() {
        let t = thresholds();
        assert_eq!(classify(-10.0, &t), KpiStatus::Red);
        assert_eq!(classify(140.0, &t), KpiStatus::Green);
        assert_eq!(classify(f64::NAN, &t), KpiStatus::Red);
        assert_eq!(classify(f64::INFINITY, &t), KpiStatus::Green);
    }

    #[test]
    fn classify_uses_configured_cutoffs() {
        let t = ScoringThresholds {
            green: 80.0,
            amber: 50.0,
            ..ScoringThresholds::default()
        };
        assert_eq!(classify(82.0, &t), KpiStatus::Green);
        assert_eq!(classify(55.0, &t), KpiStatus::Amber);
        assert_eq!(classify(49.0, &t), KpiStatus::Red);
    }

    #[test]
    fn overall_status_worst_wins() {
        let t = thresholds();
        assert_eq!(overall_status(&readings([90.0, 95.0, 88.0, 100.0]), &t), KpiStatus::Green);
        assert_eq!(overall_status(&readings([90.0, 95.0, 70.0, 100.0]), &t), KpiStatus::Amber);
        assert_eq!(overall_status(&readings([90.0, 95.0, 70.0, 12.0]), &t), KpiStatus::Red);
    }

    #[test]
    fn overall_status_ignores_argument_order() {
        let t = thresholds();
        let mut orders = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let order = [a, b, c, d];
                        if (0..4).all(|i| order.contains(&i)) {
                            orders.push(order);
                        }
                    }
                }
            }
        }
        assert_eq!(orders.len(), 24);

        let mixes = [
            ([92.0, 61.0, 40.0, 85.0], KpiStatus::Red),
            ([70.0, 61.0, 84.0, 60.0], KpiStatus::Amber),
            ([85.0, 90.0, 99.0, 100.0], KpiStatus::Green),
        ];
        for (values, expected) in mixes {
            for &order in &orders {
                let permuted = order.map(|i| values[i]);
                assert_eq!(
                    overall_status(&readings(permuted), &t),
                    expected,
                    "{permuted:?}"
                );
            }
        }
    }

    #[test]
    fn worst_status_of_nothing_is_green() {
        assert_eq!(worst_status(Vec::new()), KpiStatus::Green);
    }

    #[test]
    fn average_cases() {
        assert_eq!(average(&[]), 0);
        assert_eq!(average(&[80.0]), 80);
        assert_eq!(average(&[70.0, 90.0]), 80);
        assert_eq!(average(&[70.0, 71.0]), 71);
        assert_eq!(average(&[70.0, 70.4]), 70);
    }

    #[test]
    fn gfc_composite_empty_is_zero() {
        let score = gfc_composite(&[]);
        assert_eq!(score.total, 0.0);
        assert!(score.by_category.is_empty());
    }

    #[test]
    fn gfc_composite_clamps_over_target() {
        let score = gfc_composite(&[
            indicator(90.0, 100.0, 2, "A"),
            indicator(110.0, 100.0, 1, "B"),
        ]);
        assert_eq!(score.total, 93.33);
        assert_eq!(score.by_category.get("A"), Some(&90.0));
        assert_eq!(score.by_category.get("B"), Some(&100.0));
    }

    #[test]
    fn gfc_composite_groups_categories() {
        let score = gfc_composite(&[
            indicator(50.0, 100.0, 1, "Collection"),
            indicator(100.0, 100.0, 3, "Collection"),
            indicator(-20.0, 100.0, 2, "Processing"),
        ]);
        assert_eq!(score.by_category.get("Collection"), Some(&87.5));
        assert_eq!(score.by_category.get("Processing"), Some(&0.0));
        assert_eq!(score.total, 58.33);
    }

    #[test]
    fn gfc_composite_zero_weight_is_zero() {
        let score = gfc_composite(&[indicator(90.0, 100.0, 0, "A")]);
        assert_eq!(score.total, 0.0);
        assert_eq!(score.by_category.get("A"), Some(&0.0));
    }

    #[test]
    fn attainment_with_non_positive_target() {
        assert_eq!(attainment(5.0, 0.0), 100.0);
        assert_eq!(attainment(0.0, 0.0), 100.0);
        assert_eq!(attainment(-1.0, 0.0), 0.0);
        assert_eq!(attainment(88.0, 80.0), 100.0);
    }

    #[test]
    fn gfc_status_passes_at_target() {
        assert_eq!(gfc_status(100.0, 100.0), GfcStatus::Pass);
        assert_eq!(gfc_status(99.9, 100.0), GfcStatus::Fail);
    }

    #[test]
    fn certification_cutoff() {
        let t = thresholds();
        assert_eq!(certification_tier(75.0, &t), CertificationTier::ThreeStar);
        assert_eq!(certification_tier(74.99, &t), CertificationTier::BelowThreeStar);
    }

    #[test]
    fn health_score_weights_kpis() {
        assert_eq!(health_score(&readings([80.0, 90.0, 70.0, 60.0])), 77);
        assert_eq!(health_score(&readings([100.0, 100.0, 100.0, 100.0])), 100);
    }

    #[test]
    fn risk_follows_classifier() {
        let t = thresholds();
        assert_eq!(predicted_risk(90, &t), PredictedRisk::Low);
        assert_eq!(predicted_risk(70, &t), PredictedRisk::Medium);
        assert_eq!(predicted_risk(30, &t), PredictedRisk::High);
    }

    #[test]
    fn aggregate_empty_is_none() {
        assert!(aggregate("city", &[], &thresholds()).is_none());
    }

    #[test]
    fn aggregate_averages_latest_snapshots() {
        let t = thresholds();
        let snapshots = vec![
            snapshot("W001", [90.0, 100.0, 80.0, 90.0]),
            snapshot("W002", [70.0, 100.0, 90.0, 100.0]),
        ];
        let aggregate = aggregate("Z1", &snapshots, &t).unwrap();
        assert_eq!(aggregate.ward_count, 2);
        assert_eq!(aggregate.avg_segregation, 80);
        assert_eq!(aggregate.avg_d2d, 100);
        assert_eq!(aggregate.avg_hygiene, 85);
        assert_eq!(aggregate.avg_processing, 95);
        assert_eq!(aggregate.overall_status, KpiStatus::Amber);
        assert_eq!(aggregate.health_score, 90);
        assert_eq!(aggregate.predicted_risk, PredictedRisk::Low);
    }

    #[test]
    fn snapshot_status_matches_per_metric_classification() {
        let t = thresholds();
        let snap = snapshot("W010", [88.0, 59.0, 90.0, 91.0]);
        let per_metric = [
            classify(snap.readings.segregation_rate, &t),
            classify(snap.readings.d2d_coverage_rate, &t),
            classify(snap.readings.toilet_hygiene_score, &t),
            classify(snap.readings.waste_processing_rate, &t),
        ];
        assert_eq!(worst_status(per_metric), snap.status);
        assert_eq!(snap.status, KpiStatus::Red);
    }

    #[test]
    fn rankings_order_best_first() {
        let t = thresholds();
        let snapshots = vec![
            snapshot("W003", [50.0, 50.0, 50.0, 50.0]),
            snapshot("W001", [95.0, 95.0, 95.0, 95.0]),
            snapshot("W002", [95.0, 95.0, 95.0, 95.0]),
        ];
        let ranked = rank_wards(&snapshots, &t);
        let ids: Vec<&str> = ranked.iter().map(|r| r.ward_id.as_str()).collect();
        assert_eq!(ids, vec!["W001", "W002", "W003"]);
        assert_eq!(ranked[2].predicted_risk, PredictedRisk::High);
    }
}
