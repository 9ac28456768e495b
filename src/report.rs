use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::config::ScoringThresholds;
use crate::models::{
    Alert, AlertTypeSummary, GfcIndicator, GfcStatus, KpiSnapshot, KpiTrend, PredictedRisk,
};
use crate::scoring;

pub fn summarize_alerts(alerts: &[Alert]) -> Vec<AlertTypeSummary> {
    let mut map: HashMap<String, (usize, usize)> = HashMap::new();

    for alert in alerts.iter().filter(|alert| !alert.is_resolved) {
        let entry = map.entry(alert.alert_type.clone()).or_insert((0, 0));
        entry.0 += 1;
        if alert.severity == "critical" {
            entry.1 += 1;
        }
    }

    let mut summaries: Vec<AlertTypeSummary> = map
        .into_iter()
        .map(|(alert_type, (open_count, critical_count))| AlertTypeSummary {
            alert_type,
            open_count,
            critical_count,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.open_count
            .cmp(&a.open_count)
            .then_with(|| a.alert_type.cmp(&b.alert_type))
    });
    summaries
}

pub struct ReportInput<'a> {
    pub scope: Option<&'a str>,
    pub since_days: i64,
    pub cutoff: NaiveDate,
    pub latest: &'a [KpiSnapshot],
    pub trends: &'a [KpiTrend],
    pub indicators: &'a [GfcIndicator],
    pub alerts: &'a [Alert],
}

pub fn build_report(input: &ReportInput<'_>, thresholds: &ScoringThresholds) -> String {
    let scope_label = input.scope.unwrap_or("city");
    let aggregate = scoring::aggregate(scope_label, input.latest, thresholds);
    let rankings = scoring::rank_wards(input.latest, thresholds);
    let gfc = scoring::gfc_composite(input.indicators);
    let alert_mix = summarize_alerts(input.alerts);

    let mut output = String::new();

    let _ = writeln!(output, "# Sanitation Monitoring Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} day window, snapshots since {})",
        scope_label, input.since_days, input.cutoff
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## KPI Overview");

    match &aggregate {
        None => {
            let _ = writeln!(output, "No KPI snapshots recorded for this scope.");
        }
        Some(aggregate) => {
            let _ = writeln!(
                output,
                "- Overall status: {} across {} wards",
                aggregate.overall_status, aggregate.ward_count
            );
            let _ = writeln!(output, "- Segregation: {}%", aggregate.avg_segregation);
            let _ = writeln!(output, "- Door-to-door coverage: {}%", aggregate.avg_d2d);
            let _ = writeln!(output, "- Toilet hygiene: {}", aggregate.avg_hygiene);
            let _ = writeln!(output, "- Waste processing: {}%", aggregate.avg_processing);
            let _ = writeln!(
                output,
                "- Health score: {} (predicted risk {})",
                aggregate.health_score, aggregate.predicted_risk
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Trend");

    if input.trends.is_empty() {
        let _ = writeln!(output, "No snapshots in this window.");
    } else {
        for trend in input.trends {
            let _ = writeln!(
                output,
                "- Week of {}: {} snapshots, segregation {:.1}, d2d {:.1}, hygiene {:.1}, processing {:.1}",
                trend.week_start,
                trend.snapshot_count,
                trend.avg_segregation,
                trend.avg_d2d,
                trend.avg_hygiene,
                trend.avg_processing
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Ward Leaderboard");

    if rankings.is_empty() {
        let _ = writeln!(output, "No wards have reported yet.");
    } else {
        for (rank, ward) in rankings.iter().take(3).enumerate() {
            let _ = writeln!(
                output,
                "{}. {} health score {} ({})",
                rank + 1,
                ward.ward_id,
                ward.health_score,
                ward.status
            );
        }

        let attention: Vec<_> = rankings
            .iter()
            .rev()
            .filter(|ward| ward.predicted_risk == PredictedRisk::High)
            .take(3)
            .collect();
        if !attention.is_empty() {
            let _ = writeln!(output);
            let _ = writeln!(output, "Critical attention required:");
            for ward in attention {
                let _ = writeln!(
                    output,
                    "- {} health score {} (risk {})",
                    ward.ward_id, ward.health_score, ward.predicted_risk
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## GFC Readiness");

    if input.indicators.is_empty() {
        let _ = writeln!(output, "No GFC indicators assessed.");
    } else {
        let _ = writeln!(
            output,
            "Composite score {:.2}/100: {} (3-star requires {})",
            gfc.total,
            scoring::certification_tier(gfc.total, thresholds),
            thresholds.certification
        );
        for (category, score) in &gfc.by_category {
            let _ = writeln!(output, "- {category}: {score:.2}");
        }
        let failing: Vec<&GfcIndicator> = input
            .indicators
            .iter()
            .filter(|indicator| indicator.status == GfcStatus::Fail)
            .collect();
        if !failing.is_empty() {
            let _ = writeln!(output);
            let _ = writeln!(output, "Indicators below target:");
            for indicator in failing {
                let _ = writeln!(
                    output,
                    "- {} ({}): {} of {}",
                    indicator.name,
                    indicator.category,
                    indicator.current_value,
                    indicator.target_value
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Alerts");

    if alert_mix.is_empty() {
        let _ = writeln!(output, "No open alerts.");
    } else {
        for summary in &alert_mix {
            let _ = writeln!(
                output,
                "- {}: {} open ({} critical)",
                summary.alert_type, summary.open_count, summary.critical_count
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KpiReadings, KpiStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn alert(alert_type: &str, severity: &str, is_resolved: bool) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            alert_type: alert_type.to_string(),
            severity: severity.to_string(),
            ward_id: "W001".to_string(),
            zone_id: "Z1".to_string(),
            title: format!("{alert_type} - W001"),
            description: String::new(),
            assigned_to: None,
            is_resolved,
            resolved_by: None,
            created_at: Utc::now(),
        }
    }

    fn snapshot(ward_id: &str, value: f64) -> KpiSnapshot {
        let readings = KpiReadings {
            segregation_rate: value,
            d2d_coverage_rate: value,
            toilet_hygiene_score: value,
            waste_processing_rate: value,
        };
        KpiSnapshot {
            id: Uuid::new_v4(),
            ward_id: ward_id.to_string(),
            zone_id: "Z1".to_string(),
            snapshot_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            readings,
            status: scoring::overall_status(&readings, &ScoringThresholds::default()),
            notes: String::new(),
            recorded_by: "system".to_string(),
            created_at: Utc::now(),
        }
    }

    fn indicator(name: &str, current: f64) -> GfcIndicator {
        GfcIndicator {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: "Collection".to_string(),
            weight: 1,
            current_value: current,
            target_value: 100.0,
            unit: "percentage".to_string(),
            status: scoring::gfc_status(current, 100.0),
            evidence_urls: Vec::new(),
            last_assessed: Utc::now(),
        }
    }

    #[test]
    fn summarizes_open_alerts_only() {
        let alerts = vec![
            alert("missed_route", "critical", false),
            alert("missed_route", "low", false),
            alert("kpi_breach", "critical", true),
            alert("hygiene_breach", "high", false),
        ];
        let summaries = summarize_alerts(&alerts);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].alert_type, "missed_route");
        assert_eq!(summaries[0].open_count, 2);
        assert_eq!(summaries[0].critical_count, 1);
        assert_eq!(summaries[1].alert_type, "hygiene_breach");
    }

    #[test]
    fn empty_report_says_so() {
        let input = ReportInput {
            scope: None,
            since_days: 30,
            cutoff: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            latest: &[],
            trends: &[],
            indicators: &[],
            alerts: &[],
        };
        let report = build_report(&input, &ScoringThresholds::default());
        assert!(report.starts_with("# Sanitation Monitoring Report"));
        assert!(report.contains("Generated for city (30 day window, snapshots since 2026-01-02)"));
        assert!(report.contains("No KPI snapshots recorded for this scope."));
        assert!(report.contains("No wards have reported yet."));
        assert!(report.contains("No GFC indicators assessed."));
        assert!(report.contains("No open alerts."));
    }

    #[test]
    fn populated_report_lists_sections() {
        let latest = vec![snapshot("W001", 92.0), snapshot("W002", 40.0)];
        let indicators = vec![indicator("Door-to-Door Collection", 70.0)];
        let alerts = vec![alert("vehicle_breakdown", "critical", false)];
        let input = ReportInput {
            scope: Some("Z1"),
            since_days: 14,
            cutoff: NaiveDate::from_ymd_opt(2026, 1, 18).unwrap(),
            latest: &latest,
            trends: &[],
            indicators: &indicators,
            alerts: &alerts,
        };
        let report = build_report(&input, &ScoringThresholds::default());

        assert!(report.contains("- Overall status: amber across 2 wards"));
        assert!(report.contains("1. W001 health score 92 (green)"));
        assert!(report.contains("- W002 health score 40 (risk high)"));
        assert!(report.contains("Composite score 70.00/100: below 3-star"));
        assert!(report.contains("- Door-to-Door Collection (Collection): 70 of 100"));
        assert!(report.contains("- vehicle_breakdown: 1 open (1 critical)"));
        assert_eq!(indicators[0].status, GfcStatus::Fail);
        assert_eq!(latest[1].status, KpiStatus::Red);
    }
}
