use std::io::Read;

use anyhow::{bail, Context};
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScoringThresholds;
use crate::models::{
    self, Alert, AlertFilter, CitizenReport, Escalation, GfcIndicator, GfcStatus, KpiReadings,
    KpiSnapshot, KpiStatus, KpiTrend, NewAlert, NewCitizenReport, NewKpiSnapshot, NewTask,
    Notification, ReportStatus, Task, ALERT_SEVERITIES, ALERT_TYPES, CITIZEN_REPORT_TYPES,
    TASK_PRIORITIES, TASK_STATUSES, ZONES,
};
use crate::scoring;

const SNAPSHOT_COLUMNS: &str = "id, ward_id, zone_id, snapshot_date, segregation_rate, \
     d2d_coverage_rate, toilet_hygiene_score, waste_processing_rate, status, notes, \
     recorded_by, created_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("schema migrations applied");
    Ok(())
}

fn check_choice(field: &str, value: &str, allowed: &[&str]) -> anyhow::Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        bail!("{field} must be one of {}, got '{value}'", allowed.join(", "))
    }
}

fn zone_id_for(ward_id: &str) -> anyhow::Result<&'static str> {
    models::zone_for_ward(ward_id)
        .map(|zone| zone.id)
        .with_context(|| format!("unknown ward '{ward_id}'"))
}

/// Resolves the zone and derives the status for a snapshot about to be written.
///
/// Every snapshot write path goes through here, so a stored status is always
/// the overall status of the stored readings.
pub fn prepare_snapshot(
    snapshot: &NewKpiSnapshot,
    thresholds: &ScoringThresholds,
) -> anyhow::Result<(&'static str, KpiStatus)> {
    let zone_id = zone_id_for(&snapshot.ward_id)?;
    let readings = &snapshot.readings;
    for (name, value) in [
        ("segregation_rate", readings.segregation_rate),
        ("d2d_coverage_rate", readings.d2d_coverage_rate),
        ("toilet_hygiene_score", readings.toilet_hygiene_score),
        ("waste_processing_rate", readings.waste_processing_rate),
    ] {
        if !value.is_finite() {
            bail!("{name} for ward {} must be a finite number", snapshot.ward_id);
        }
    }
    Ok((zone_id, scoring::overall_status(readings, thresholds)))
}

/// Returns `None` when a snapshot with the same source key already exists.
pub async fn insert_snapshot(
    pool: &PgPool,
    snapshot: &NewKpiSnapshot,
    thresholds: &ScoringThresholds,
) -> anyhow::Result<Option<(Uuid, KpiStatus)>> {
    let (zone_id, status) = prepare_snapshot(snapshot, thresholds)?;
    let stored = store_snapshot(pool, snapshot, zone_id, status).await?;
    match stored {
        Some(id) => debug!(ward_id = %snapshot.ward_id, %status, %id, "snapshot stored"),
        None => debug!(ward_id = %snapshot.ward_id, "duplicate snapshot skipped"),
    }
    Ok(stored.map(|id| (id, status)))
}

async fn store_snapshot<'e, E: PgExecutor<'e>>(
    executor: E,
    snapshot: &NewKpiSnapshot,
    zone_id: &str,
    status: KpiStatus,
) -> anyhow::Result<Option<Uuid>> {
    let id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO sanitation.kpi_snapshots
        (id, ward_id, zone_id, snapshot_date, segregation_rate, d2d_coverage_rate,
         toilet_hygiene_score, waste_processing_rate, status, notes, recorded_by, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&snapshot.ward_id)
    .bind(zone_id)
    .bind(snapshot.snapshot_date)
    .bind(snapshot.readings.segregation_rate)
    .bind(snapshot.readings.d2d_coverage_rate)
    .bind(snapshot.readings.toilet_hygiene_score)
    .bind(snapshot.readings.waste_processing_rate)
    .bind(status.as_str())
    .bind(&snapshot.notes)
    .bind(&snapshot.recorded_by)
    .bind(snapshot.source_key.as_deref())
    .execute(executor)
    .await?;

    Ok((result.rows_affected() > 0).then_some(id))
}

fn snapshot_from_row(row: &PgRow) -> anyhow::Result<KpiSnapshot> {
    let status: String = row.get("status");
    Ok(KpiSnapshot {
        id: row.get("id"),
        ward_id: row.get("ward_id"),
        zone_id: row.get("zone_id"),
        snapshot_date: row.get("snapshot_date"),
        readings: KpiReadings {
            segregation_rate: row.get("segregation_rate"),
            d2d_coverage_rate: row.get("d2d_coverage_rate"),
            toilet_hygiene_score: row.get("toilet_hygiene_score"),
            waste_processing_rate: row.get("waste_processing_rate"),
        },
        status: status.parse()?,
        notes: row.get("notes"),
        recorded_by: row.get("recorded_by"),
        created_at: row.get("created_at"),
    })
}

/// Latest snapshot of every ward, optionally restricted to one zone.
pub async fn fetch_latest_snapshots(
    pool: &PgPool,
    zone_id: Option<&str>,
) -> anyhow::Result<Vec<KpiSnapshot>> {
    let query = format!(
        "SELECT DISTINCT ON (ward_id) {SNAPSHOT_COLUMNS} \
         FROM sanitation.kpi_snapshots \
         WHERE ($1::text IS NULL OR zone_id = $1) \
         ORDER BY ward_id, snapshot_date DESC, created_at DESC"
    );

    let rows = sqlx::query(&query).bind(zone_id).fetch_all(pool).await?;
    debug!(zone = ?zone_id, wards = rows.len(), "fetched latest snapshots");
    rows.iter().map(snapshot_from_row).collect()
}

pub async fn fetch_ward_history(
    pool: &PgPool,
    ward_id: &str,
    since_date: NaiveDate,
) -> anyhow::Result<Vec<KpiSnapshot>> {
    let query = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM sanitation.kpi_snapshots \
         WHERE ward_id = $1 AND snapshot_date >= $2 \
         ORDER BY snapshot_date DESC, created_at DESC"
    );

    let rows = sqlx::query(&query)
        .bind(ward_id)
        .bind(since_date)
        .fetch_all(pool)
        .await?;
    rows.iter().map(snapshot_from_row).collect()
}

pub async fn fetch_weekly_trends(
    pool: &PgPool,
    since_date: NaiveDate,
    zone_id: Option<&str>,
) -> anyhow::Result<Vec<KpiTrend>> {
    let rows = sqlx::query(
        r#"
        SELECT date_trunc('week', snapshot_date)::date AS week_start,
               COUNT(*) AS snapshot_count,
               AVG(segregation_rate) AS avg_segregation,
               AVG(d2d_coverage_rate) AS avg_d2d,
               AVG(toilet_hygiene_score) AS avg_hygiene,
               AVG(waste_processing_rate) AS avg_processing
        FROM sanitation.kpi_snapshots
        WHERE snapshot_date >= $1 AND ($2::text IS NULL OR zone_id = $2)
        GROUP BY week_start
        ORDER BY week_start
        "#,
    )
    .bind(since_date)
    .bind(zone_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| KpiTrend {
            week_start: row.get("week_start"),
            snapshot_count: row.get("snapshot_count"),
            avg_segregation: row.get("avg_segregation"),
            avg_d2d: row.get("avg_d2d"),
            avg_hygiene: row.get("avg_hygiene"),
            avg_processing: row.get("avg_processing"),
        })
        .collect())
}

#[derive(serde::Deserialize)]
struct SnapshotCsvRow {
    ward_id: String,
    snapshot_date: NaiveDate,
    segregation_rate: f64,
    d2d_coverage_rate: f64,
    toilet_hygiene_score: f64,
    waste_processing_rate: f64,
    #[serde(default)]
    notes: String,
    recorded_by: String,
    source_key: Option<String>,
}

pub fn read_snapshot_csv<R: Read>(reader: R) -> anyhow::Result<Vec<NewKpiSnapshot>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut snapshots = Vec::new();

    for (index, result) in reader.deserialize::<SnapshotCsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV row {}", index + 1))?;
        snapshots.push(NewKpiSnapshot {
            ward_id: row.ward_id,
            snapshot_date: row.snapshot_date,
            readings: KpiReadings {
                segregation_rate: row.segregation_rate,
                d2d_coverage_rate: row.d2d_coverage_rate,
                toilet_hygiene_score: row.toilet_hygiene_score,
                waste_processing_rate: row.waste_processing_rate,
            },
            notes: row.notes,
            recorded_by: row.recorded_by,
            source_key: row.source_key.filter(|key| !key.trim().is_empty()),
        });
    }

    Ok(snapshots)
}

/// A CSV row that passed validation, ready to be written.
#[derive(Debug)]
pub struct PreparedSnapshot {
    snapshot: NewKpiSnapshot,
    zone_id: &'static str,
    status: KpiStatus,
}

/// Validates every row before anything is written; one bad row rejects the file.
pub fn prepare_import(
    snapshots: Vec<NewKpiSnapshot>,
    thresholds: &ScoringThresholds,
) -> anyhow::Result<Vec<PreparedSnapshot>> {
    snapshots
        .into_iter()
        .enumerate()
        .map(|(index, mut snapshot)| {
            let (zone_id, status) = prepare_snapshot(&snapshot, thresholds)
                .with_context(|| format!("invalid CSV row {}", index + 1))?;
            if snapshot.source_key.is_none() {
                snapshot.source_key = Some(format!("import-{}", Uuid::new_v4()));
            }
            Ok(PreparedSnapshot {
                snapshot,
                zone_id,
                status,
            })
        })
        .collect()
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    thresholds: &ScoringThresholds,
) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let prepared = prepare_import(read_snapshot_csv(file)?, thresholds)?;
    let mut inserted = 0usize;

    let mut tx = pool.begin().await?;
    for row in &prepared {
        let snapshot = &row.snapshot;
        match store_snapshot(&mut *tx, snapshot, row.zone_id, row.status).await? {
            Some(_) => inserted += 1,
            None => warn!(
                ward_id = %snapshot.ward_id,
                source_key = snapshot.source_key.as_deref().unwrap_or_default(),
                "duplicate snapshot skipped"
            ),
        }
    }
    tx.commit().await?;

    info!(
        inserted,
        skipped = prepared.len() - inserted,
        path = %csv_path.display(),
        "snapshot import finished"
    );
    Ok(inserted)
}

fn indicator_from_row(row: &PgRow) -> anyhow::Result<GfcIndicator> {
    let weight: i32 = row.get("weight");
    let status: String = row.get("status");
    Ok(GfcIndicator {
        id: row.get("id"),
        name: row.get("indicator_name"),
        category: row.get("category"),
        weight: u32::try_from(weight).context("indicator weight must not be negative")?,
        current_value: row.get("current_value"),
        target_value: row.get("target_value"),
        unit: row.get("unit"),
        status: status.parse()?,
        evidence_urls: row.get("evidence_urls"),
        last_assessed: row.get("last_assessed"),
    })
}

pub async fn fetch_indicators(pool: &PgPool) -> anyhow::Result<Vec<GfcIndicator>> {
    let rows = sqlx::query(
        "SELECT id, indicator_name, category, weight, current_value, target_value, unit, \
         status, evidence_urls, last_assessed \
         FROM sanitation.gfc_indicators ORDER BY category, indicator_name",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(indicator_from_row).collect()
}

/// Pass/fail for an assessment about to be stored. Non-finite values would
/// compare as passing while attaining nothing, so they never reach the table.
pub fn assess_indicator(current_value: f64, target_value: f64) -> anyhow::Result<GfcStatus> {
    if !current_value.is_finite() {
        bail!("current value must be a finite number, got {current_value}");
    }
    if !target_value.is_finite() {
        bail!("target value must be a finite number, got {target_value}");
    }
    Ok(scoring::gfc_status(current_value, target_value))
}

/// Records a new assessment; the pass/fail status is always recomputed.
pub async fn update_indicator(
    pool: &PgPool,
    indicator_id: Uuid,
    current_value: f64,
    target_value: Option<f64>,
) -> anyhow::Result<GfcIndicator> {
    let existing_target: f64 = sqlx::query(
        "SELECT target_value FROM sanitation.gfc_indicators WHERE id = $1",
    )
    .bind(indicator_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("GFC indicator {indicator_id} not found"))?
    .get("target_value");

    let target_value = target_value.unwrap_or(existing_target);
    let status = assess_indicator(current_value, target_value)?;

    let row = sqlx::query(
        r#"
        UPDATE sanitation.gfc_indicators
        SET current_value = $2, target_value = $3, status = $4, last_assessed = now()
        WHERE id = $1
        RETURNING id, indicator_name, category, weight, current_value, target_value, unit,
                  status, evidence_urls, last_assessed
        "#,
    )
    .bind(indicator_id)
    .bind(current_value)
    .bind(target_value)
    .bind(status.as_str())
    .fetch_one(pool)
    .await?;

    info!(
        %indicator_id,
        current_value,
        target_value,
        status = status.as_str(),
        "indicator assessed"
    );
    indicator_from_row(&row)
}

pub async fn add_evidence(pool: &PgPool, indicator_id: Uuid, url: &str) -> anyhow::Result<()> {
    let result = sqlx::query(
        "UPDATE sanitation.gfc_indicators \
         SET evidence_urls = array_append(evidence_urls, $2) WHERE id = $1",
    )
    .bind(indicator_id)
    .bind(url)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("GFC indicator {indicator_id} not found");
    }
    info!(%indicator_id, "evidence attached");
    Ok(())
}

pub async fn create_alert(pool: &PgPool, alert: &NewAlert) -> anyhow::Result<Uuid> {
    insert_alert(pool, alert, None)
        .await?
        .context("alert insert was skipped")
}

async fn insert_alert(
    pool: &PgPool,
    alert: &NewAlert,
    source_key: Option<&str>,
) -> anyhow::Result<Option<Uuid>> {
    check_choice("alert type", &alert.alert_type, &ALERT_TYPES)?;
    check_choice("severity", &alert.severity, &ALERT_SEVERITIES)?;
    let zone_id = zone_id_for(&alert.ward_id)?;
    let id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO sanitation.alerts
        (id, alert_type, severity, ward_id, zone_id, title, description, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&alert.alert_type)
    .bind(&alert.severity)
    .bind(&alert.ward_id)
    .bind(zone_id)
    .bind(&alert.title)
    .bind(&alert.description)
    .bind(source_key)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    info!(%id, alert_type = %alert.alert_type, ward_id = %alert.ward_id, "alert raised");
    Ok(Some(id))
}

pub async fn fetch_alerts(pool: &PgPool, filter: &AlertFilter) -> anyhow::Result<Vec<Alert>> {
    let rows = sqlx::query(
        r#"
        SELECT id, alert_type, severity, ward_id, zone_id, title, description, assigned_to,
               is_resolved, resolved_by, created_at
        FROM sanitation.alerts
        WHERE ($1::text IS NULL OR zone_id = $1)
          AND ($2::text IS NULL OR ward_id = $2)
          AND ($3::text IS NULL OR severity = $3)
          AND ($4::text IS NULL OR alert_type = $4)
          AND ($5 OR NOT is_resolved)
        ORDER BY created_at DESC
        "#,
    )
    .bind(filter.zone_id.as_deref())
    .bind(filter.ward_id.as_deref())
    .bind(filter.severity.as_deref())
    .bind(filter.alert_type.as_deref())
    .bind(filter.include_resolved)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Alert {
            id: row.get("id"),
            alert_type: row.get("alert_type"),
            severity: row.get("severity"),
            ward_id: row.get("ward_id"),
            zone_id: row.get("zone_id"),
            title: row.get("title"),
            description: row.get("description"),
            assigned_to: row.get("assigned_to"),
            is_resolved: row.get("is_resolved"),
            resolved_by: row.get("resolved_by"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Resolution is one-way: an already resolved alert is never touched again.
pub async fn resolve_alert(pool: &PgPool, alert_id: Uuid, resolved_by: &str) -> anyhow::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE sanitation.alerts
        SET is_resolved = true, resolved_at = now(), resolved_by = $2
        WHERE id = $1 AND NOT is_resolved
        "#,
    )
    .bind(alert_id)
    .bind(resolved_by)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!(%alert_id, "resolve matched no open alert");
        bail!("alert {alert_id} not found or already resolved");
    }
    info!(%alert_id, resolved_by, "alert resolved");
    Ok(())
}

pub async fn assign_alert(pool: &PgPool, alert_id: Uuid, assigned_to: &str) -> anyhow::Result<()> {
    let result = sqlx::query("UPDATE sanitation.alerts SET assigned_to = $2 WHERE id = $1")
        .bind(alert_id)
        .bind(assigned_to)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        bail!("alert {alert_id} not found");
    }
    info!(%alert_id, assigned_to, "alert assigned");
    Ok(())
}

pub async fn create_task(pool: &PgPool, task: &NewTask) -> anyhow::Result<Uuid> {
    insert_task(pool, task, "open", None)
        .await?
        .context("task insert was skipped")
}

async fn insert_task(
    pool: &PgPool,
    task: &NewTask,
    status: &str,
    source_key: Option<&str>,
) -> anyhow::Result<Option<Uuid>> {
    check_choice("priority", &task.priority, &TASK_PRIORITIES)?;
    check_choice("status", status, &TASK_STATUSES)?;
    let zone_id = zone_id_for(&task.ward_id)?;
    let id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO sanitation.tasks
        (id, ward_id, zone_id, title, description, assigned_to, created_by, status, priority,
         due_date, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&task.ward_id)
    .bind(zone_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(&task.assigned_to)
    .bind(&task.created_by)
    .bind(status)
    .bind(&task.priority)
    .bind(task.due_date)
    .bind(source_key)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    info!(%id, ward_id = %task.ward_id, "task created");
    Ok(Some(id))
}

pub async fn fetch_tasks(
    pool: &PgPool,
    status: Option<&str>,
    ward_id: Option<&str>,
    zone_id: Option<&str>,
) -> anyhow::Result<Vec<Task>> {
    if let Some(value) = status {
        check_choice("status", value, &TASK_STATUSES)?;
    }

    let rows = sqlx::query(
        r#"
        SELECT id, ward_id, zone_id, title, assigned_to, status, priority, due_date,
               completion_notes, updated_at
        FROM sanitation.tasks
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::text IS NULL OR ward_id = $2)
          AND ($3::text IS NULL OR zone_id = $3)
        ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, due_date
        "#,
    )
    .bind(status)
    .bind(ward_id)
    .bind(zone_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Task {
            id: row.get("id"),
            ward_id: row.get("ward_id"),
            zone_id: row.get("zone_id"),
            title: row.get("title"),
            assigned_to: row.get("assigned_to"),
            status: row.get("status"),
            priority: row.get("priority"),
            due_date: row.get("due_date"),
            completion_notes: row.get("completion_notes"),
            updated_at: row.get("updated_at"),
        })
        .collect())
}

pub async fn update_task_status(
    pool: &PgPool,
    task_id: Uuid,
    status: &str,
    notes: Option<&str>,
) -> anyhow::Result<()> {
    check_choice("status", status, &TASK_STATUSES)?;

    let result = sqlx::query(
        r#"
        UPDATE sanitation.tasks
        SET status = $2, completion_notes = COALESCE($3, completion_notes), updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(task_id)
    .bind(status)
    .bind(notes)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("task {task_id} not found");
    }
    info!(%task_id, status, "task updated");
    Ok(())
}

pub async fn delete_task(pool: &PgPool, task_id: Uuid) -> anyhow::Result<()> {
    let result = sqlx::query("DELETE FROM sanitation.tasks WHERE id = $1")
        .bind(task_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        bail!("task {task_id} not found");
    }
    info!(%task_id, "task deleted");
    Ok(())
}

pub async fn fetch_escalations(pool: &PgPool, open_only: bool) -> anyhow::Result<Vec<Escalation>> {
    let rows = sqlx::query(
        r#"
        SELECT id, ward_id, zone_id, subject, raised_by, status, raised_at
        FROM sanitation.escalations
        WHERE (NOT $1 OR status = 'open')
        ORDER BY raised_at DESC
        "#,
    )
    .bind(open_only)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Escalation {
            id: row.get("id"),
            ward_id: row.get("ward_id"),
            zone_id: row.get("zone_id"),
            subject: row.get("subject"),
            raised_by: row.get("raised_by"),
            status: row.get("status"),
            raised_at: row.get("raised_at"),
        })
        .collect())
}

pub async fn resolve_escalation(pool: &PgPool, escalation_id: Uuid) -> anyhow::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE sanitation.escalations
        SET status = 'resolved', resolved_at = now()
        WHERE id = $1 AND status = 'open'
        "#,
    )
    .bind(escalation_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!(%escalation_id, "resolve matched no open escalation");
        bail!("escalation {escalation_id} not found or already resolved");
    }
    info!(%escalation_id, "escalation resolved");
    Ok(())
}

pub async fn fetch_notifications(
    pool: &PgPool,
    recipient: &str,
    unread_only: bool,
) -> anyhow::Result<Vec<Notification>> {
    let rows = sqlx::query(
        r#"
        SELECT id, recipient, message, is_read, created_at
        FROM sanitation.notifications
        WHERE recipient = $1 AND (NOT $2 OR NOT is_read)
        ORDER BY created_at DESC
        "#,
    )
    .bind(recipient)
    .bind(unread_only)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Notification {
            id: row.get("id"),
            recipient: row.get("recipient"),
            message: row.get("message"),
            is_read: row.get("is_read"),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub async fn mark_notification_read(pool: &PgPool, notification_id: Uuid) -> anyhow::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE sanitation.notifications
        SET is_read = true, read_at = now()
        WHERE id = $1 AND NOT is_read
        "#,
    )
    .bind(notification_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!(%notification_id, "mark-read matched no unread notification");
        bail!("notification {notification_id} not found or already read");
    }
    Ok(())
}

/// Returns how many notifications were flipped to read.
pub async fn mark_all_notifications_read(pool: &PgPool, recipient: &str) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE sanitation.notifications
        SET is_read = true, read_at = now()
        WHERE recipient = $1 AND NOT is_read
        "#,
    )
    .bind(recipient)
    .execute(pool)
    .await?;

    let marked = result.rows_affected();
    info!(recipient, marked, "notifications marked read");
    Ok(marked)
}

pub async fn count_unread_notifications(pool: &PgPool, recipient: &str) -> anyhow::Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS unread FROM sanitation.notifications \
         WHERE recipient = $1 AND NOT is_read",
    )
    .bind(recipient)
    .fetch_one(pool)
    .await?;
    Ok(row.get("unread"))
}

pub async fn submit_citizen_report(
    pool: &PgPool,
    report: &NewCitizenReport,
) -> anyhow::Result<Uuid> {
    insert_citizen_report(pool, report, None)
        .await?
        .context("citizen report insert was skipped")
}

/// New reports always start out pending.
async fn insert_citizen_report(
    pool: &PgPool,
    report: &NewCitizenReport,
    source_key: Option<&str>,
) -> anyhow::Result<Option<Uuid>> {
    check_choice("report type", &report.report_type, &CITIZEN_REPORT_TYPES)?;
    if report.description.trim().is_empty() {
        bail!("a citizen report needs a description");
    }
    let zone_id = zone_id_for(&report.ward_id)?;
    let id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO sanitation.citizen_reports
        (id, report_type, description, ward_id, zone_id, address, reported_by, status, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&report.report_type)
    .bind(&report.description)
    .bind(&report.ward_id)
    .bind(zone_id)
    .bind(&report.address)
    .bind(&report.reported_by)
    .bind(ReportStatus::Pending.as_str())
    .bind(source_key)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    info!(
        %id,
        report_type = %report.report_type,
        ward_id = %report.ward_id,
        "citizen report filed"
    );
    Ok(Some(id))
}

fn citizen_report_from_row(row: &PgRow) -> anyhow::Result<CitizenReport> {
    let status: String = row.get("status");
    Ok(CitizenReport {
        id: row.get("id"),
        report_type: row.get("report_type"),
        description: row.get("description"),
        ward_id: row.get("ward_id"),
        zone_id: row.get("zone_id"),
        address: row.get("address"),
        reported_by: row.get("reported_by"),
        status: status.parse()?,
        resolution_notes: row.get("resolution_notes"),
        reported_at: row.get("reported_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Newest first. `active_only` keeps pending, verified and dispatched reports.
pub async fn fetch_citizen_reports(
    pool: &PgPool,
    ward_id: Option<&str>,
    active_only: bool,
) -> anyhow::Result<Vec<CitizenReport>> {
    let rows = sqlx::query(
        r#"
        SELECT id, report_type, description, ward_id, zone_id, address, reported_by, status,
               resolution_notes, reported_at, updated_at
        FROM sanitation.citizen_reports
        WHERE ($1::text IS NULL OR ward_id = $1)
          AND (NOT $2 OR status IN ('pending', 'verified', 'dispatched'))
        ORDER BY reported_at DESC
        "#,
    )
    .bind(ward_id)
    .bind(active_only)
    .fetch_all(pool)
    .await?;
    rows.iter().map(citizen_report_from_row).collect()
}

pub fn check_report_transition(from: ReportStatus, to: ReportStatus) -> anyhow::Result<()> {
    if !from.is_active() {
        bail!("citizen report is already {from}");
    }
    if !from.can_move_to(to) {
        bail!("citizen report cannot move from {from} to {to}");
    }
    Ok(())
}

/// Moves a report forward. The update only matches the status that was
/// checked, so a concurrent change is reported instead of overwritten.
pub async fn update_citizen_report_status(
    pool: &PgPool,
    report_id: Uuid,
    status: ReportStatus,
    notes: Option<&str>,
) -> anyhow::Result<()> {
    let current: String = sqlx::query("SELECT status FROM sanitation.citizen_reports WHERE id = $1")
        .bind(report_id)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("citizen report {report_id} not found"))?
        .get("status");
    let current: ReportStatus = current.parse()?;
    check_report_transition(current, status)?;

    let result = sqlx::query(
        r#"
        UPDATE sanitation.citizen_reports
        SET status = $3, resolution_notes = COALESCE($4, resolution_notes), updated_at = now()
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(report_id)
    .bind(current.as_str())
    .bind(status.as_str())
    .bind(notes)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!(%report_id, expected = %current, "citizen report changed during update");
        bail!("citizen report {report_id} changed while updating, try again");
    }
    info!(%report_id, from = %current, to = %status, "citizen report updated");
    Ok(())
}

/// Deterministic readings for seed ward `ward` on day `day` of the window.
pub fn seed_readings(day: usize, ward: usize) -> KpiReadings {
    let spread = |offset: usize, low: usize, width: usize| -> f64 {
        (low + (day * 7 + ward * 13 + offset) % width) as f64
    };
    KpiReadings {
        segregation_rate: spread(0, 55, 41),
        d2d_coverage_rate: spread(5, 70, 31),
        toilet_hygiene_score: spread(11, 50, 46),
        waste_processing_rate: spread(17, 60, 41),
    }
}

pub async fn seed(pool: &PgPool, thresholds: &ScoringThresholds) -> anyhow::Result<()> {
    for zone in ZONES.iter() {
        sqlx::query(
            r#"
            INSERT INTO sanitation.zones (id, zone_name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET zone_name = EXCLUDED.zone_name
            "#,
        )
        .bind(zone.id)
        .bind(zone.name)
        .execute(pool)
        .await?;

        for number in zone.first_ward..=zone.last_ward {
            let ward_id = models::ward_id(number);
            sqlx::query(
                r#"
                INSERT INTO sanitation.wards (id, ward_name, zone_id, population, household_count)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&ward_id)
            .bind(format!("Ward {number:03}"))
            .bind(zone.id)
            .bind((5_000 + (number * 7_919) % 45_000) as i32)
            .bind((1_000 + (number * 2_903) % 9_000) as i32)
            .execute(pool)
            .await?;
        }
    }
    info!(zones = ZONES.len(), "zones and wards seeded");

    let today = Utc::now().date_naive();
    let mut snapshots = 0usize;
    for day in 0..30 {
        let date = today - Duration::days(29 - day as i64);
        for ward in 1..=10 {
            let ward_id = models::ward_id(ward);
            let snapshot = NewKpiSnapshot {
                source_key: Some(format!("seed-kpi-{ward_id}-{date}")),
                ward_id,
                snapshot_date: date,
                readings: seed_readings(day, ward),
                notes: format!("Daily KPI snapshot for {date}"),
                recorded_by: "system".to_string(),
            };
            if insert_snapshot(pool, &snapshot, thresholds).await?.is_some() {
                snapshots += 1;
            }
        }
    }
    info!(snapshots, "KPI snapshots seeded");

    for i in 0..15usize {
        let ward_id = models::ward_id(1 + (i * 3) % 10);
        let alert_type = ALERT_TYPES[i % 6];
        let alert = NewAlert {
            alert_type: alert_type.to_string(),
            severity: ALERT_SEVERITIES[(i * 5) % ALERT_SEVERITIES.len()].to_string(),
            title: format!("{} - {ward_id}", alert_type.replace('_', " ").to_uppercase()),
            description: format!("Alert description for {alert_type}"),
            ward_id,
        };
        let source_key = format!("seed-alert-{i:03}");
        if let Some(id) = insert_alert(pool, &alert, Some(&source_key)).await? {
            if i % 3 == 0 {
                resolve_alert(pool, id, "supervisor").await?;
            }
        }
    }

    for i in 0..20usize {
        let task = NewTask {
            ward_id: models::ward_id(1 + (i * 7) % 10),
            title: format!("Task {}", i + 1),
            description: format!("Description for task {}", i + 1),
            assigned_to: "worker1".to_string(),
            created_by: "supervisor".to_string(),
            priority: TASK_PRIORITIES[i % TASK_PRIORITIES.len()].to_string(),
            due_date: today + Duration::days(1 + (i as i64 * 11) % 30),
        };
        let status = TASK_STATUSES[(i / 2) % TASK_STATUSES.len()];
        insert_task(pool, &task, status, Some(&format!("seed-task-{i:03}"))).await?;
    }

    let indicators = [
        ("Source Segregation", "Segregation", 2, 82.0),
        ("Door-to-Door Collection", "Collection", 2, 94.0),
        ("Toilet Hygiene", "Sanitation", 2, 71.0),
        ("Waste Processing", "Processing", 2, 88.0),
        ("Community Participation", "Community", 1, 63.0),
        ("Staff Training", "Staffing", 1, 100.0),
    ];
    for (name, category, weight, current_value) in indicators {
        let target_value = 100.0;
        sqlx::query(
            r#"
            INSERT INTO sanitation.gfc_indicators
            (id, indicator_name, category, weight, current_value, target_value, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (indicator_name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(category)
        .bind(weight)
        .bind(current_value)
        .bind(target_value)
        .bind(scoring::gfc_status(current_value, target_value).as_str())
        .execute(pool)
        .await?;
    }

    let escalations = [
        ("W002", "Repeated missed pickups on market street", "citizen"),
        ("W005", "Community toilet without water supply", "ward1"),
        ("W009", "Overflowing secondary collection point", "north"),
    ];
    for (i, (ward_id, subject, raised_by)) in escalations.into_iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO sanitation.escalations
            (id, ward_id, zone_id, subject, raised_by, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ward_id)
        .bind(zone_id_for(ward_id)?)
        .bind(subject)
        .bind(raised_by)
        .bind(format!("seed-escalation-{i:03}"))
        .execute(pool)
        .await?;
    }

    let notifications = [
        ("commissioner1", "City health score report is ready"),
        ("zonal1", "Three open alerts in North Zone"),
        ("ward1", "New task assigned for W001"),
    ];
    for (i, (recipient, message)) in notifications.into_iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO sanitation.notifications (id, recipient, message, source_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(recipient)
        .bind(message)
        .bind(format!("seed-notification-{i:03}"))
        .execute(pool)
        .await?;
    }

    let citizen_reports = [
        ("garbage_overflow", "W003", "Market Road bin overflowing since morning", "Market Road"),
        ("clogged_drain", "W004", "Drain blocked near the bus stand", "Bus Stand"),
        ("unauthorized_dump", "W007", "Construction debris dumped on vacant plot", "Lake View"),
        ("other", "W010", "Street sweeping skipped for three days", "Temple Street"),
    ];
    for (i, (report_type, ward_id, description, address)) in
        citizen_reports.into_iter().enumerate()
    {
        let report = NewCitizenReport {
            report_type: report_type.to_string(),
            description: description.to_string(),
            ward_id: ward_id.to_string(),
            address: address.to_string(),
            reported_by: "citizen".to_string(),
        };
        insert_citizen_report(pool, &report, Some(&format!("seed-citizen-report-{i:03}"))).await?;
    }

    info!("seed finished");
    Ok(())
}
