use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{Duration, NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

mod config;
mod db;
mod models;
mod report;
mod scoring;
mod telemetry;

use config::AppConfig;
use models::{
    AlertFilter, KpiReadings, NewAlert, NewCitizenReport, NewKpiSnapshot, NewTask, ReportStatus,
};

#[derive(Parser)]
#[command(name = "sanitation-monitor")]
#[command(about = "Ward sanitation KPI, alert and GFC readiness tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load zones, wards and a month of sample readings
    Seed,
    /// Import KPI snapshots from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Submit one ward's daily KPI readings
    Submit {
        #[arg(long)]
        ward: String,
        #[arg(long)]
        segregation: f64,
        #[arg(long)]
        d2d: f64,
        #[arg(long)]
        hygiene: f64,
        #[arg(long)]
        processing: f64,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value = "field")]
        recorded_by: String,
    },
    /// Show the city-wide or zone KPI aggregate
    Status {
        #[arg(long)]
        zone: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List a ward's snapshots within a window
    History {
        #[arg(long)]
        ward: String,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
    },
    /// Show the GFC composite score and certification tier
    Gfc {
        #[arg(long)]
        json: bool,
    },
    /// Record a new assessment for a GFC indicator
    UpdateIndicator {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        current: f64,
        #[arg(long)]
        target: Option<f64>,
    },
    /// Attach an evidence URL to a GFC indicator
    AddEvidence {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        url: String,
    },
    /// List alerts, unresolved only unless asked otherwise
    #[command(group(
        ArgGroup::new("scope")
            .args(["zone", "ward"])
            .multiple(false)
    ))]
    Alerts {
        #[arg(long)]
        zone: Option<String>,
        #[arg(long)]
        ward: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        #[arg(long = "type")]
        alert_type: Option<String>,
        #[arg(long)]
        include_resolved: bool,
    },
    /// Raise a new alert for a ward
    RaiseAlert {
        #[arg(long)]
        ward: String,
        #[arg(long = "type")]
        alert_type: String,
        #[arg(long)]
        severity: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    ResolveAlert {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        by: String,
    },
    AssignAlert {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        to: String,
    },
    /// List tasks ordered by priority and due date
    #[command(group(
        ArgGroup::new("scope")
            .args(["zone", "ward"])
            .multiple(false)
    ))]
    Tasks {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        ward: Option<String>,
        #[arg(long)]
        zone: Option<String>,
    },
    CreateTask {
        #[arg(long)]
        ward: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        assign_to: String,
        #[arg(long, default_value = "supervisor")]
        created_by: String,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long, default_value_t = 7)]
        due_in_days: i64,
    },
    UpdateTask {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        status: String,
        #[arg(long)]
        notes: Option<String>,
    },
    DeleteTask {
        #[arg(long)]
        id: Uuid,
    },
    /// File a citizen report; it starts out pending
    ReportIssue {
        #[arg(long)]
        ward: String,
        #[arg(long = "type")]
        report_type: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        address: String,
        #[arg(long, default_value = "citizen")]
        reported_by: String,
    },
    /// List citizen reports, newest first
    CitizenReports {
        #[arg(long)]
        ward: Option<String>,
        /// Only pending, verified and dispatched reports
        #[arg(long)]
        active: bool,
    },
    /// Move a citizen report forward in its workflow
    UpdateCitizenReport {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        status: ReportStatus,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List escalations, open only unless asked otherwise
    Escalations {
        #[arg(long)]
        all: bool,
    },
    ResolveEscalation {
        #[arg(long)]
        id: Uuid,
    },
    Notifications {
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        unread: bool,
    },
    MarkRead {
        #[arg(long)]
        id: Uuid,
    },
    MarkAllRead {
        #[arg(long)]
        recipient: String,
    },
    UnreadCount {
        #[arg(long)]
        recipient: String,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        zone: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn cutoff_date(since_days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(since_days.max(1))
}

fn check_zone(zone: Option<&str>) -> anyhow::Result<()> {
    if let Some(zone_id) = zone {
        if models::find_zone(zone_id).is_none() {
            bail!("unknown zone '{zone_id}'");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.log_level)?;
    let thresholds = config.thresholds;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    info!("connected to Postgres");

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, &thresholds).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv, &thresholds).await?;
            println!("Inserted {inserted} snapshots from {}.", csv.display());
        }
        Commands::Submit {
            ward,
            segregation,
            d2d,
            hygiene,
            processing,
            date,
            notes,
            recorded_by,
        } => {
            let snapshot = NewKpiSnapshot {
                ward_id: ward,
                snapshot_date: date.unwrap_or_else(|| Utc::now().date_naive()),
                readings: KpiReadings {
                    segregation_rate: segregation,
                    d2d_coverage_rate: d2d,
                    toilet_hygiene_score: hygiene,
                    waste_processing_rate: processing,
                },
                notes,
                recorded_by,
                source_key: None,
            };
            let (id, status) = db::insert_snapshot(&pool, &snapshot, &thresholds)
                .await?
                .context("snapshot was not stored")?;
            println!(
                "Stored snapshot {id} for {} on {}: status {status}.",
                snapshot.ward_id, snapshot.snapshot_date
            );
        }
        Commands::Status { zone, json } => {
            check_zone(zone.as_deref())?;
            let latest = db::fetch_latest_snapshots(&pool, zone.as_deref()).await?;
            let scope = zone.as_deref().unwrap_or("city");

            let Some(aggregate) = scoring::aggregate(scope, &latest, &thresholds) else {
                println!("No KPI snapshots recorded for {scope}.");
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&aggregate)?);
            } else {
                println!(
                    "{} status {} across {} wards",
                    aggregate.scope, aggregate.overall_status, aggregate.ward_count
                );
                println!("- segregation {}%", aggregate.avg_segregation);
                println!("- door-to-door coverage {}%", aggregate.avg_d2d);
                println!("- toilet hygiene {}", aggregate.avg_hygiene);
                println!("- waste processing {}%", aggregate.avg_processing);
                println!(
                    "- health score {} (predicted risk {})",
                    aggregate.health_score, aggregate.predicted_risk
                );
            }
        }
        Commands::History { ward, since_days } => {
            let snapshots =
                db::fetch_ward_history(&pool, &ward, cutoff_date(since_days)).await?;
            if snapshots.is_empty() {
                println!("No snapshots for {ward} in this window.");
                return Ok(());
            }
            for snapshot in &snapshots {
                let r = &snapshot.readings;
                println!(
                    "- {} {} ({}): segregation {}, d2d {}, hygiene {}, processing {}",
                    snapshot.snapshot_date,
                    snapshot.status,
                    snapshot.zone_id,
                    r.segregation_rate,
                    r.d2d_coverage_rate,
                    r.toilet_hygiene_score,
                    r.waste_processing_rate
                );
                println!(
                    "  {} recorded by {} at {}",
                    snapshot.id, snapshot.recorded_by, snapshot.created_at
                );
                if !snapshot.notes.is_empty() {
                    println!("  notes: {}", snapshot.notes);
                }
            }
        }
        Commands::Gfc { json } => {
            let indicators = db::fetch_indicators(&pool).await?;
            if indicators.is_empty() {
                println!("No GFC indicators assessed.");
                return Ok(());
            }
            let score = scoring::gfc_composite(&indicators);
            let tier = scoring::certification_tier(score.total, &thresholds);

            if json {
                let body = serde_json::json!({ "score": score, "tier": tier.to_string() });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("GFC composite score {:.2}/100 ({tier})", score.total);
                for (category, value) in &score.by_category {
                    println!("- {category}: {value:.2}");
                }
                for indicator in &indicators {
                    println!(
                        "  {} {} [{}] {} / {} {} weight {} ({} evidence, assessed {})",
                        indicator.id,
                        indicator.name,
                        indicator.status.as_str(),
                        indicator.current_value,
                        indicator.target_value,
                        indicator.unit,
                        indicator.weight,
                        indicator.evidence_urls.len(),
                        indicator.last_assessed
                    );
                }
            }
        }
        Commands::UpdateIndicator {
            id,
            current,
            target,
        } => {
            let indicator = db::update_indicator(&pool, id, current, target).await?;
            println!(
                "{} now {} of {}: {}.",
                indicator.name,
                indicator.current_value,
                indicator.target_value,
                indicator.status.as_str()
            );
        }
        Commands::AddEvidence { id, url } => {
            db::add_evidence(&pool, id, &url).await?;
            println!("Evidence attached to {id}.");
        }
        Commands::Alerts {
            zone,
            ward,
            severity,
            alert_type,
            include_resolved,
        } => {
            check_zone(zone.as_deref())?;
            let filter = AlertFilter {
                zone_id: zone,
                ward_id: ward,
                severity,
                alert_type,
                include_resolved,
            };
            let alerts = db::fetch_alerts(&pool, &filter).await?;
            if alerts.is_empty() {
                println!("No alerts match.");
                return Ok(());
            }
            for alert in &alerts {
                println!(
                    "- {} [{}] {} ({}, {}){}{}",
                    alert.id,
                    alert.severity,
                    alert.title,
                    alert.ward_id,
                    alert.zone_id,
                    alert
                        .assigned_to
                        .as_deref()
                        .map(|who| format!(" assigned to {who}"))
                        .unwrap_or_default(),
                    match (alert.is_resolved, alert.resolved_by.as_deref()) {
                        (true, Some(by)) => format!(" resolved by {by}"),
                        (true, None) => " resolved".to_string(),
                        (false, _) => String::new(),
                    }
                );
                if alert.description.is_empty() {
                    println!("  raised {}", alert.created_at);
                } else {
                    println!("  raised {}: {}", alert.created_at, alert.description);
                }
            }
        }
        Commands::RaiseAlert {
            ward,
            alert_type,
            severity,
            title,
            description,
        } => {
            let alert = NewAlert {
                alert_type,
                severity,
                ward_id: ward,
                title,
                description,
            };
            let id = db::create_alert(&pool, &alert).await?;
            println!("Raised alert {id}.");
        }
        Commands::ResolveAlert { id, by } => {
            db::resolve_alert(&pool, id, &by).await?;
            println!("Alert {id} resolved.");
        }
        Commands::AssignAlert { id, to } => {
            db::assign_alert(&pool, id, &to).await?;
            println!("Alert {id} assigned to {to}.");
        }
        Commands::Tasks { status, ward, zone } => {
            check_zone(zone.as_deref())?;
            let tasks =
                db::fetch_tasks(&pool, status.as_deref(), ward.as_deref(), zone.as_deref())
                    .await?;
            if tasks.is_empty() {
                println!("No tasks match.");
                return Ok(());
            }
            for task in &tasks {
                println!(
                    "- {} [{} / {}] {} ({}, {}) due {} for {}",
                    task.id,
                    task.priority,
                    task.status,
                    task.title,
                    task.ward_id,
                    task.zone_id,
                    task.due_date,
                    task.assigned_to
                );
                if let Some(notes) = &task.completion_notes {
                    println!("  notes: {notes} (updated {})", task.updated_at);
                }
            }
        }
        Commands::CreateTask {
            ward,
            title,
            description,
            assign_to,
            created_by,
            priority,
            due_in_days,
        } => {
            let task = NewTask {
                ward_id: ward,
                title,
                description,
                assigned_to: assign_to,
                created_by,
                priority,
                due_date: Utc::now().date_naive() + Duration::days(due_in_days.max(0)),
            };
            let id = db::create_task(&pool, &task).await?;
            println!("Created task {id}.");
        }
        Commands::UpdateTask { id, status, notes } => {
            db::update_task_status(&pool, id, &status, notes.as_deref()).await?;
            println!("Task {id} is now {status}.");
        }
        Commands::DeleteTask { id } => {
            db::delete_task(&pool, id).await?;
            println!("Task {id} deleted.");
        }
        Commands::ReportIssue {
            ward,
            report_type,
            description,
            address,
            reported_by,
        } => {
            let report = NewCitizenReport {
                report_type,
                description,
                ward_id: ward,
                address,
                reported_by,
            };
            let id = db::submit_citizen_report(&pool, &report).await?;
            println!("Filed citizen report {id} (pending).");
        }
        Commands::CitizenReports { ward, active } => {
            let reports = db::fetch_citizen_reports(&pool, ward.as_deref(), active).await?;
            if reports.is_empty() {
                println!("No citizen reports match.");
                return Ok(());
            }
            for report in &reports {
                println!(
                    "- {} [{}] {} ({}, {}) at {} by {} on {}",
                    report.id,
                    report.status,
                    report.report_type,
                    report.ward_id,
                    report.zone_id,
                    if report.address.is_empty() {
                        "-"
                    } else {
                        report.address.as_str()
                    },
                    report.reported_by,
                    report.reported_at
                );
                println!("  {}", report.description);
                if let Some(notes) = &report.resolution_notes {
                    println!("  notes: {notes} (updated {})", report.updated_at);
                }
            }
        }
        Commands::UpdateCitizenReport { id, status, notes } => {
            db::update_citizen_report_status(&pool, id, status, notes.as_deref()).await?;
            println!("Citizen report {id} is now {status}.");
        }
        Commands::Escalations { all } => {
            let escalations = db::fetch_escalations(&pool, !all).await?;
            if escalations.is_empty() {
                println!("No escalations.");
                return Ok(());
            }
            for escalation in &escalations {
                println!(
                    "- {} [{}] {} ({}, {}) raised by {} at {}",
                    escalation.id,
                    escalation.status,
                    escalation.subject,
                    escalation.ward_id,
                    escalation.zone_id,
                    escalation.raised_by,
                    escalation.raised_at
                );
            }
        }
        Commands::ResolveEscalation { id } => {
            db::resolve_escalation(&pool, id).await?;
            println!("Escalation {id} resolved.");
        }
        Commands::Notifications { recipient, unread } => {
            let notifications = db::fetch_notifications(&pool, &recipient, unread).await?;
            if notifications.is_empty() {
                println!("No notifications for {recipient}.");
                return Ok(());
            }
            for notification in &notifications {
                println!(
                    "- {} {} {} {}: {}",
                    notification.id,
                    notification.recipient,
                    if notification.is_read { "read" } else { "new" },
                    notification.created_at,
                    notification.message
                );
            }
        }
        Commands::MarkRead { id } => {
            db::mark_notification_read(&pool, id).await?;
            println!("Notification {id} marked read.");
        }
        Commands::MarkAllRead { recipient } => {
            let marked = db::mark_all_notifications_read(&pool, &recipient).await?;
            println!("Marked {marked} notifications read for {recipient}.");
        }
        Commands::UnreadCount { recipient } => {
            let unread = db::count_unread_notifications(&pool, &recipient).await?;
            println!("{recipient} has {unread} unread notifications.");
        }
        Commands::Report {
            zone,
            since_days,
            out,
        } => {
            check_zone(zone.as_deref())?;
            let since_date = cutoff_date(since_days);
            let latest = db::fetch_latest_snapshots(&pool, zone.as_deref()).await?;
            let trends = db::fetch_weekly_trends(&pool, since_date, zone.as_deref()).await?;
            let indicators = db::fetch_indicators(&pool).await?;
            let alerts = db::fetch_alerts(
                &pool,
                &AlertFilter {
                    zone_id: zone.clone(),
                    ..AlertFilter::default()
                },
            )
            .await?;

            let report = report::build_report(
                &report::ReportInput {
                    scope: zone.as_deref(),
                    since_days,
                    cutoff: since_date,
                    latest: &latest,
                    trends: &trends,
                    indicators: &indicators,
                    alerts: &alerts,
                },
                &thresholds,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cutoff_date_respects_since_days() {
        let cutoff = cutoff_date(14);
        let expected = Utc::now().date_naive() - Duration::days(14);
        assert_eq!(cutoff, expected);
        assert_eq!(cutoff_date(0), Utc::now().date_naive() - Duration::days(1));
    }

    #[test]
    fn parses_submit_command() {
        let cli = Cli::try_parse_from([
            "sanitation-monitor",
            "submit",
            "--ward",
            "W001",
            "--segregation",
            "91",
            "--d2d",
            "97",
            "--hygiene",
            "88",
            "--processing",
            "90",
            "--date",
            "2026-02-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit {
                ward,
                date,
                recorded_by,
                ..
            } => {
                assert_eq!(ward, "W001");
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 2, 1));
                assert_eq!(recorded_by, "field");
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn parses_citizen_report_commands() {
        let cli = Cli::try_parse_from([
            "sanitation-monitor",
            "report-issue",
            "--ward",
            "W004",
            "--type",
            "clogged_drain",
            "--description",
            "Drain blocked near the bus stand",
        ])
        .unwrap();
        match cli.command {
            Commands::ReportIssue {
                report_type,
                address,
                reported_by,
                ..
            } => {
                assert_eq!(report_type, "clogged_drain");
                assert_eq!(address, "");
                assert_eq!(reported_by, "citizen");
            }
            _ => panic!("expected report-issue"),
        }

        let cli = Cli::try_parse_from([
            "sanitation-monitor",
            "update-citizen-report",
            "--id",
            "6f2c1f7e-3f0a-4c1e-9b4a-2d0f5d8c9e11",
            "--status",
            "dispatched",
        ])
        .unwrap();
        match cli.command {
            Commands::UpdateCitizenReport { status, notes, .. } => {
                assert_eq!(status, ReportStatus::Dispatched);
                assert!(notes.is_none());
            }
            _ => panic!("expected update-citizen-report"),
        }
    }

    #[test]
    fn unknown_citizen_report_status_is_rejected() {
        let result = Cli::try_parse_from([
            "sanitation-monitor",
            "update-citizen-report",
            "--id",
            "6f2c1f7e-3f0a-4c1e-9b4a-2d0f5d8c9e11",
            "--status",
            "closed",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_notification_bulk_commands() {
        let cli =
            Cli::try_parse_from(["sanitation-monitor", "mark-all-read", "--recipient", "ward1"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::MarkAllRead { recipient } if recipient == "ward1"
        ));

        let cli =
            Cli::try_parse_from(["sanitation-monitor", "unread-count", "--recipient", "ward1"])
                .unwrap();
        assert!(matches!(cli.command, Commands::UnreadCount { .. }));
    }

    #[test]
    fn alerts_scope_is_exclusive() {
        let result = Cli::try_parse_from([
            "sanitation-monitor",
            "alerts",
            "--zone",
            "Z1",
            "--ward",
            "W001",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_zone_is_rejected() {
        assert!(check_zone(Some("Z9")).is_err());
        assert!(check_zone(Some("Z2")).is_ok());
        assert!(check_zone(None).is_ok());
    }
}
