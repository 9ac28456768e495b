use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// RAG status. Variants are ordered by severity so `max` picks the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiStatus {
    Green,
    Amber,
    Red,
}

impl KpiStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KpiStatus::Green => "green",
            KpiStatus::Amber => "amber",
            KpiStatus::Red => "red",
        }
    }
}

impl fmt::Display for KpiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KpiStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "green" => Ok(KpiStatus::Green),
            "amber" => Ok(KpiStatus::Amber),
            "red" => Ok(KpiStatus::Red),
            other => bail!("unknown KPI status '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfcStatus {
    Pass,
    Fail,
}

impl GfcStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GfcStatus::Pass => "pass",
            GfcStatus::Fail => "fail",
        }
    }
}

impl FromStr for GfcStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pass" => Ok(GfcStatus::Pass),
            "fail" => Ok(GfcStatus::Fail),
            other => bail!("unknown GFC status '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictedRisk {
    Low,
    Medium,
    High,
}

impl fmt::Display for PredictedRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PredictedRisk::Low => "low",
            PredictedRisk::Medium => "medium",
            PredictedRisk::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificationTier {
    ThreeStar,
    BelowThreeStar,
}

impl fmt::Display for CertificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CertificationTier::ThreeStar => "3-star",
            CertificationTier::BelowThreeStar => "below 3-star",
        })
    }
}

/// The four metric readings shared by snapshots and aggregates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpiReadings {
    pub segregation_rate: f64,
    pub d2d_coverage_rate: f64,
    pub toilet_hygiene_score: f64,
    pub waste_processing_rate: f64,
}

#[derive(Debug, Clone)]
pub struct KpiSnapshot {
    pub id: Uuid,
    pub ward_id: String,
    pub zone_id: String,
    pub snapshot_date: NaiveDate,
    pub readings: KpiReadings,
    pub status: KpiStatus,
    pub notes: String,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

/// A snapshot as submitted; status is never accepted from the caller.
#[derive(Debug, Clone)]
pub struct NewKpiSnapshot {
    pub ward_id: String,
    pub snapshot_date: NaiveDate,
    pub readings: KpiReadings,
    pub notes: String,
    pub recorded_by: String,
    pub source_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KpiAggregate {
    pub scope: String,
    pub ward_count: usize,
    pub avg_segregation: i64,
    pub avg_d2d: i64,
    pub avg_hygiene: i64,
    pub avg_processing: i64,
    pub overall_status: KpiStatus,
    pub health_score: i64,
    pub predicted_risk: PredictedRisk,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GfcIndicator {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub weight: u32,
    pub current_value: f64,
    pub target_value: f64,
    pub unit: String,
    pub status: GfcStatus,
    pub evidence_urls: Vec<String>,
    pub last_assessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GfcCompositeScore {
    pub total: f64,
    pub by_category: BTreeMap<String, f64>,
    pub last_calculated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: String,
    pub severity: String,
    pub ward_id: String,
    pub zone_id: String,
    pub title: String,
    pub description: String,
    pub assigned_to: Option<String>,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub alert_type: String,
    pub severity: String,
    pub ward_id: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub zone_id: Option<String>,
    pub ward_id: Option<String>,
    pub severity: Option<String>,
    pub alert_type: Option<String>,
    pub include_resolved: bool,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub ward_id: String,
    pub zone_id: String,
    pub title: String,
    pub assigned_to: String,
    pub status: String,
    pub priority: String,
    pub due_date: NaiveDate,
    pub completion_notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub ward_id: String,
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    pub created_by: String,
    pub priority: String,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct Escalation {
    pub id: Uuid,
    pub ward_id: String,
    pub zone_id: String,
    pub subject: String,
    pub raised_by: String,
    pub status: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a citizen report. Variants are in workflow order; closed
/// reports (resolved or rejected) never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportStatus {
    Pending,
    Verified,
    Dispatched,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Verified => "verified",
            ReportStatus::Dispatched => "dispatched",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            ReportStatus::Pending | ReportStatus::Verified | ReportStatus::Dispatched
        )
    }

    /// Reports only move forward, and only while still active.
    pub fn can_move_to(self, next: ReportStatus) -> bool {
        self.is_active() && next > self
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ReportStatus::Pending),
            "verified" => Ok(ReportStatus::Verified),
            "dispatched" => Ok(ReportStatus::Dispatched),
            "resolved" => Ok(ReportStatus::Resolved),
            "rejected" => Ok(ReportStatus::Rejected),
            other => bail!("unknown report status '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CitizenReport {
    pub id: Uuid,
    pub report_type: String,
    pub description: String,
    pub ward_id: String,
    pub zone_id: String,
    pub address: String,
    pub reported_by: String,
    pub status: ReportStatus,
    pub resolution_notes: Option<String>,
    pub reported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCitizenReport {
    pub report_type: String,
    pub description: String,
    pub ward_id: String,
    pub address: String,
    pub reported_by: String,
}

#[derive(Debug, Clone)]
pub struct AlertTypeSummary {
    pub alert_type: String,
    pub open_count: usize,
    pub critical_count: usize,
}

#[derive(Debug, Clone)]
pub struct KpiTrend {
    pub week_start: NaiveDate,
    pub snapshot_count: i64,
    pub avg_segregation: f64,
    pub avg_d2d: f64,
    pub avg_hygiene: f64,
    pub avg_processing: f64,
}

pub const ALERT_TYPES: [&str; 7] = [
    "kpi_breach",
    "vehicle_breakdown",
    "missed_route",
    "hygiene_breach",
    "surge_forecast",
    "grievance_sla",
    "data_feed_failure",
];

pub const ALERT_SEVERITIES: [&str; 4] = ["critical", "high", "medium", "low"];
pub const TASK_STATUSES: [&str; 3] = ["open", "in_progress", "completed"];
pub const TASK_PRIORITIES: [&str; 3] = ["high", "medium", "low"];
pub const CITIZEN_REPORT_TYPES: [&str; 4] = [
    "garbage_overflow",
    "clogged_drain",
    "unauthorized_dump",
    "other",
];

pub struct Zone {
    pub id: &'static str,
    pub name: &'static str,
    pub first_ward: usize,
    pub last_ward: usize,
}

/// 100 wards split evenly across four zones.
pub const ZONES: [Zone; 4] = [
    Zone {
        id: "Z1",
        name: "North Zone",
        first_ward: 1,
        last_ward: 25,
    },
    Zone {
        id: "Z2",
        name: "South Zone",
        first_ward: 26,
        last_ward: 50,
    },
    Zone {
        id: "Z3",
        name: "East Zone",
        first_ward: 51,
        last_ward: 75,
    },
    Zone {
        id: "Z4",
        name: "West Zone",
        first_ward: 76,
        last_ward: 100,
    },
];

pub fn ward_id(number: usize) -> String {
    format!("W{number:03}")
}

pub fn find_zone(zone_id: &str) -> Option<&'static Zone> {
    ZONES.iter().find(|zone| zone.id == zone_id)
}

pub fn zone_for_ward(ward_id: &str) -> Option<&'static Zone> {
    let number: usize = ward_id.strip_prefix('W')?.parse().ok()?;
    ZONES
        .iter()
        .find(|zone| (zone.first_ward..=zone.last_ward).contains(&number))
}
