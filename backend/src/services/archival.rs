//! Lot archival job
//!
//! Periodic sweep that ages out overdue active lots and moves
//! long-depleted/expired lots into history storage, one transaction per
//! lot so a single failure never aborts the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::TimeProvider;
use crate::error::{AppError, AppResult};
use shared::validation::validate_retention_days;

const DEFAULT_RETENTION_DAYS: i64 = 30;
const DEFAULT_BATCH_SIZE: i64 = 1000;

/// Archival service sweeping depleted/expired lots into history
#[derive(Clone)]
pub struct ArchivalService {
    db: PgPool,
    clock: Arc<dyn TimeProvider>,
    retention_days: i64,
    batch_size: i64,
}

/// Outcome of one archival sweep
#[derive(Debug, Serialize)]
pub struct ArchivalReport {
    /// Active lots past their expiration date marked EXPIRED
    pub expired_marked: u64,
    /// Lots copied to history and removed from the active ledger
    pub archived: u64,
    /// Lots that failed individually and were left for the next sweep
    pub skipped: u64,
}

impl ArchivalService {
    /// Create a new ArchivalService instance
    pub fn new(db: PgPool, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            db,
            clock,
            retention_days: DEFAULT_RETENTION_DAYS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the retention window (from configuration)
    pub fn with_retention_days(mut self, retention_days: i64) -> Self {
        self.retention_days = retention_days;
        self
    }

    /// Override the per-run batch bound (from configuration)
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run one sweep. `retention_days` overrides the configured window
    /// for this run only.
    pub async fn archive_lots(&self, retention_days: Option<i64>) -> AppResult<ArchivalReport> {
        let retention = retention_days.unwrap_or(self.retention_days);
        validate_retention_days(retention).map_err(|message| AppError::Validation {
            field: "retention_days".to_string(),
            message: message.to_string(),
            message_th: "จำนวนวันเก็บรักษาไม่ถูกต้อง".to_string(),
        })?;

        let now = self.clock.now();
        let today = self.clock.today();

        // Age out overdue active lots first so they enter the retention
        // window from this sweep onwards
        let expired_marked = sqlx::query(
            r#"
            UPDATE lots SET status = 'expired', updated_at = $2
            WHERE status = 'active' AND expiration_date IS NOT NULL AND expiration_date < $1
            "#,
        )
        .bind(today)
        .bind(now)
        .execute(&self.db)
        .await?
        .rows_affected();

        let cutoff = now - chrono::Duration::days(retention);

        // Lots with live reservations are never archived; a dangling
        // reservation row would be worse than a late sweep
        let lot_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM lots
            WHERE status IN ('depleted', 'expired')
              AND updated_at < $1
              AND reserved_quantity = 0
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(self.batch_size)
        .fetch_all(&self.db)
        .await?;

        let mut archived = 0u64;
        let mut skipped = 0u64;

        for lot_id in lot_ids {
            match self.archive_one(lot_id, now).await {
                Ok(()) => archived += 1,
                Err(err) => {
                    tracing::error!(lot = %lot_id, error = %err, "failed to archive lot, skipping");
                    skipped += 1;
                }
            }
        }

        tracing::info!(expired_marked, archived, skipped, "lot archival sweep finished");

        Ok(ArchivalReport {
            expired_marked,
            archived,
            skipped,
        })
    }

    async fn archive_one(&self, lot_id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        // Eligibility re-checked inside the transaction; a lot that was
        // touched since selection is simply left for the next sweep
        let copied = sqlx::query(
            r#"
            INSERT INTO lot_history (id, stock_position_id, warehouse_id, item_id,
                                     expiration_date, received_at, source_purchase_ref,
                                     unit_cost, current_quantity, reserved_quantity,
                                     available_quantity, status, location_id,
                                     created_at, updated_at, archived_at)
            SELECT id, stock_position_id, warehouse_id, item_id, expiration_date,
                   received_at, source_purchase_ref, unit_cost, current_quantity,
                   reserved_quantity, available_quantity, status, location_id,
                   created_at, updated_at, $2
            FROM lots
            WHERE id = $1 AND status IN ('depleted', 'expired') AND reserved_quantity = 0
            "#,
        )
        .bind(lot_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if copied.rows_affected() == 0 {
            return Err(AppError::NotFound("Lot".to_string()));
        }

        sqlx::query("DELETE FROM lot_buyer_restrictions WHERE lot_id = $1")
            .bind(lot_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM lots WHERE id = $1")
            .bind(lot_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(lot = %lot_id, "lot archived");
        Ok(())
    }
}
