//! Postgres-backed pharmacy store.
//!
//! Every quantity change is a conditional `UPDATE` executed inside the same
//! transaction as the movement records it belongs to:
//!
//! ```text
//! UPDATE batch_stocks
//!    SET current_quantity = current_quantity - $2, ...
//!  WHERE id = $1 AND current_quantity >= $2
//! RETURNING id
//! ```
//!
//! A zero-row result is classified (row missing vs. not enough on hand) and the
//! transaction rolled back, so a movement either lands at both levels with its
//! records or not at all. Rows touched by one transaction are updated in id
//! order to keep concurrent movements from deadlocking each other.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `Conflict` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | ColumnDecode / Decode | N/A | `Serialization` |
//! | Other | N/A | `Storage` |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use pharmastock_core::{
    BatchId, BatchestockId, DispensationId, DomainError, EntryId, ExitId, InstitutionId,
    ManufacturerId, MedicineId, MedicineStockId, MedicineVariantId, OperatorId, PatientId,
    PharmaceuticalFormId, StockId, UnitMeasureId,
};
use pharmastock_stock::{
    Batch, BatchProps, Batchestock, BatchestockProps, Dispensation, DispensationProps,
    MedicineEntry, MedicineEntryProps, MedicineExit, MedicineExitProps, MedicineStock,
    MedicineStockProps, MedicineVariant, MedicineVariantProps, Stock, StockProps,
};

use super::r#trait::{
    BatchStocksRepository, BatchesRepository, DispensationsRepository, EntryCommit, EntryFilter,
    ExitFilter, MedicinesEntriesRepository, MedicinesExitsRepository, MedicinesStockRepository,
    MedicinesVariantsRepository, Meta, MovementApplyError, Page, Pagination, RepositoryError,
    StockMovementStore, StocksRepository,
};
use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_pharmastock.sql");

const BATCH_STOCK_COLUMNS: &str =
    "id, stock_id, batch_id, medicine_id, current_quantity, last_move, created_at, updated_at";

const BATCH_COLUMNS: &str =
    "id, code, medicine_variant_id, manufacturer_id, expiration_date, manufacturing_date, created_at";

const EXIT_COLUMNS: &str = "e.id, e.batch_stock_id, e.medicine_stock_id, e.operator_id, e.quantity, \
     e.exit_type, e.exit_date, e.dispensation_id, e.created_at";

const ENTRY_COLUMNS: &str = "e.id, e.batch_stock_id, e.medicine_stock_id, e.operator_id, e.quantity, \
     e.entry_type, e.entry_date, e.created_at";

/// Medicine stock columns plus its ordered batch-stock references, selected
/// from a relation aliased `ms`.
const MEDICINE_STOCK_PROJECTION: &str = r#"
    SELECT
        ms.id,
        ms.medicine_variant_id,
        ms.stock_id,
        ms.current_quantity,
        ms.minimum_level,
        ms.last_move,
        ms.created_at,
        ms.updated_at,
        COALESCE(
            (SELECT array_agg(l.batch_stock_id ORDER BY l.position)
               FROM medicine_stock_batch_stocks l
              WHERE l.medicine_stock_id = ms.id),
            '{}'::uuid[]
        ) AS batch_stock_ids
"#;

/// Postgres implementation of every repository and of [`StockMovementStore`].
///
/// `Send + Sync`; all access goes through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresPharmaStore {
    pool: Arc<PgPool>,
}

impl PostgresPharmaStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool sized by `config`.
    #[instrument(skip(config), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, RepositoryError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn medicine_stock_where(
        &self,
        operation: &str,
        condition: &str,
        bind: Vec<Uuid>,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        let sql = format!("{MEDICINE_STOCK_PROJECTION} FROM medicine_stocks ms WHERE {condition}");
        let mut query = sqlx::query(&sql);
        for value in bind {
            query = query.bind(value);
        }
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(decode::<MedicineStockRow, _>).transpose()
    }
}

/// Commit on success, roll back on failure.
async fn finish<T>(
    tx: Transaction<'_, Postgres>,
    result: Result<T, MovementApplyError>,
) -> Result<T, MovementApplyError> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(value)
        }
        Err(err) => {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            Err(err)
        }
    }
}

/// Net quantity per row, ordered by id.
fn totals<K: Ord + Copy>(
    items: impl Iterator<Item = (K, i64, DateTime<Utc>)>,
) -> BTreeMap<K, (i64, DateTime<Utc>)> {
    let mut out: BTreeMap<K, (i64, DateTime<Utc>)> = BTreeMap::new();
    for (key, quantity, at) in items {
        let slot = out.entry(key).or_insert((0, at));
        slot.0 += quantity;
        slot.1 = slot.1.max(at);
    }
    out
}

async fn decrement_batch_stock(
    tx: &mut Transaction<'_, Postgres>,
    id: BatchestockId,
    quantity: i64,
    at: DateTime<Utc>,
) -> Result<(), MovementApplyError> {
    let updated = sqlx::query(
        r#"
        UPDATE batch_stocks
           SET current_quantity = current_quantity - $2, last_move = $3, updated_at = $3
         WHERE id = $1 AND current_quantity >= $2
        RETURNING id
        "#,
    )
    .bind(Uuid::from(id))
    .bind(quantity)
    .bind(at)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("decrement_batch_stock", e))?;
    if updated.is_some() {
        return Ok(());
    }

    let available: Option<i64> =
        sqlx::query_scalar("SELECT current_quantity FROM batch_stocks WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("classify_batch_stock", e))?;
    Err(match available {
        None => MovementApplyError::BatchStockMissing(id),
        Some(available) => MovementApplyError::InsufficientBatchQuantity {
            batchestock_id: id,
            requested: quantity,
            available,
        },
    })
}

async fn decrement_medicine_stock(
    tx: &mut Transaction<'_, Postgres>,
    id: MedicineStockId,
    quantity: i64,
    at: DateTime<Utc>,
) -> Result<(), MovementApplyError> {
    let updated = sqlx::query(
        r#"
        UPDATE medicine_stocks
           SET current_quantity = current_quantity - $2, last_move = $3, updated_at = $3
         WHERE id = $1 AND current_quantity >= $2
        RETURNING id
        "#,
    )
    .bind(Uuid::from(id))
    .bind(quantity)
    .bind(at)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("decrement_medicine_stock", e))?;
    if updated.is_some() {
        return Ok(());
    }

    let available: Option<i64> =
        sqlx::query_scalar("SELECT current_quantity FROM medicine_stocks WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("classify_medicine_stock", e))?;
    Err(match available {
        None => MovementApplyError::MedicineStockMissing(id),
        Some(available) => MovementApplyError::InsufficientAggregateQuantity {
            medicine_stock_id: id,
            requested: quantity,
            available,
        },
    })
}

async fn increment_batch_stock(
    tx: &mut Transaction<'_, Postgres>,
    id: BatchestockId,
    quantity: i64,
    at: DateTime<Utc>,
) -> Result<(), MovementApplyError> {
    sqlx::query(
        r#"
        UPDATE batch_stocks
           SET current_quantity = current_quantity + $2, last_move = $3, updated_at = $3
         WHERE id = $1
        RETURNING id
        "#,
    )
    .bind(Uuid::from(id))
    .bind(quantity)
    .bind(at)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("increment_batch_stock", e))?
    .map(|_| ())
    .ok_or(MovementApplyError::BatchStockMissing(id))
}

async fn increment_medicine_stock(
    tx: &mut Transaction<'_, Postgres>,
    id: MedicineStockId,
    quantity: i64,
    at: DateTime<Utc>,
) -> Result<(), MovementApplyError> {
    sqlx::query(
        r#"
        UPDATE medicine_stocks
           SET current_quantity = current_quantity + $2, last_move = $3, updated_at = $3
         WHERE id = $1
        RETURNING id
        "#,
    )
    .bind(Uuid::from(id))
    .bind(quantity)
    .bind(at)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("increment_medicine_stock", e))?
    .map(|_| ())
    .ok_or(MovementApplyError::MedicineStockMissing(id))
}

/// Fails unless the batch-stock is held where the medicine stock is.
async fn ensure_same_location(
    tx: &mut Transaction<'_, Postgres>,
    medicine_stock_id: MedicineStockId,
    batchestock_id: BatchestockId,
) -> Result<(), MovementApplyError> {
    let same: Option<bool> = sqlx::query_scalar(
        r#"
        SELECT bs.stock_id = ms.stock_id
          FROM batch_stocks bs, medicine_stocks ms
         WHERE bs.id = $1 AND ms.id = $2
        "#,
    )
    .bind(Uuid::from(batchestock_id))
    .bind(Uuid::from(medicine_stock_id))
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_batch_stock_location", e))?;
    match same {
        Some(true) => Ok(()),
        Some(false) => Err(MovementApplyError::BatchStockNotLinked {
            batchestock_id,
            medicine_stock_id,
        }),
        None => Err(MovementApplyError::BatchStockMissing(batchestock_id)),
    }
}

/// Fails unless the batch-stock is one of the medicine stock's batches.
async fn ensure_linked(
    tx: &mut Transaction<'_, Postgres>,
    medicine_stock_id: MedicineStockId,
    batchestock_id: BatchestockId,
) -> Result<(), MovementApplyError> {
    let linked: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT 1
          FROM medicine_stock_batch_stocks
         WHERE medicine_stock_id = $1 AND batch_stock_id = $2
        "#,
    )
    .bind(Uuid::from(medicine_stock_id))
    .bind(Uuid::from(batchestock_id))
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_batch_stock_link", e))?;
    linked
        .map(|_| ())
        .ok_or(MovementApplyError::BatchStockNotLinked {
            batchestock_id,
            medicine_stock_id,
        })
}

/// Decrement both levels for `exits` and record them.
async fn apply_exits(
    tx: &mut Transaction<'_, Postgres>,
    exits: &[MedicineExit],
) -> Result<(), MovementApplyError> {
    for exit in exits {
        ensure_linked(tx, exit.medicine_stock_id(), exit.batchestock_id()).await?;
    }
    let per_batch = totals(
        exits
            .iter()
            .map(|e| (e.batchestock_id(), e.quantity(), e.exit_date())),
    );
    for (id, (quantity, at)) in per_batch {
        decrement_batch_stock(tx, id, quantity, at).await?;
    }

    let per_aggregate = totals(
        exits
            .iter()
            .map(|e| (e.medicine_stock_id(), e.quantity(), e.exit_date())),
    );
    for (id, (quantity, at)) in per_aggregate {
        decrement_medicine_stock(tx, id, quantity, at).await?;
    }

    for exit in exits {
        insert_exit(&mut **tx, exit).await?;
    }
    Ok(())
}

async fn insert_stock<'e>(executor: impl PgExecutor<'e>, stock: &Stock) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO stocks (id, name, institution_id, status, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::from(stock.id_typed()))
    .bind(stock.name())
    .bind(Uuid::from(stock.institution_id()))
    .bind(stock.status())
    .bind(stock.created_at())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_stock", e))?;
    Ok(())
}

async fn insert_variant<'e>(
    executor: impl PgExecutor<'e>,
    variant: &MedicineVariant,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO medicine_variants
            (id, medicine_id, dosage, pharmaceutical_form_id, unit_measure_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::from(variant.id_typed()))
    .bind(Uuid::from(variant.medicine_id()))
    .bind(variant.dosage())
    .bind(Uuid::from(variant.pharmaceutical_form_id()))
    .bind(Uuid::from(variant.unit_measure_id()))
    .bind(variant.created_at())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_medicine_variant", e))?;
    Ok(())
}

async fn insert_batch<'e>(executor: impl PgExecutor<'e>, batch: &Batch) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO batches
            (id, code, medicine_variant_id, manufacturer_id, expiration_date, manufacturing_date, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(batch.id_typed()))
    .bind(batch.code())
    .bind(Uuid::from(batch.medicine_variant_id()))
    .bind(Uuid::from(batch.manufacturer_id()))
    .bind(batch.expiration_date())
    .bind(batch.manufacturing_date())
    .bind(batch.created_at())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_batch", e))?;
    Ok(())
}

async fn insert_batch_stock<'e>(
    executor: impl PgExecutor<'e>,
    batch_stock: &Batchestock,
) -> Result<(), RepositoryError> {
    sqlx::query(&format!(
        "INSERT INTO batch_stocks ({BATCH_STOCK_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    ))
    .bind(Uuid::from(batch_stock.id_typed()))
    .bind(Uuid::from(batch_stock.stock_id()))
    .bind(Uuid::from(batch_stock.batch_id()))
    .bind(Uuid::from(batch_stock.medicine_id()))
    .bind(batch_stock.quantity())
    .bind(batch_stock.last_move())
    .bind(batch_stock.created_at())
    .bind(batch_stock.updated_at())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_batch_stock", e))?;
    Ok(())
}

async fn insert_medicine_stock<'e>(
    executor: impl PgExecutor<'e>,
    medicine_stock: &MedicineStock,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO medicine_stocks
            (id, medicine_variant_id, stock_id, current_quantity, minimum_level,
             last_move, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::from(medicine_stock.id_typed()))
    .bind(Uuid::from(medicine_stock.medicine_variant_id()))
    .bind(Uuid::from(medicine_stock.stock_id()))
    .bind(medicine_stock.quantity())
    .bind(medicine_stock.minimum_level())
    .bind(medicine_stock.last_move())
    .bind(medicine_stock.created_at())
    .bind(medicine_stock.updated_at())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_medicine_stock", e))?;
    Ok(())
}

/// Append a batch-stock reference; linking twice is a no-op.
async fn link_batch_stock<'e>(
    executor: impl PgExecutor<'e>,
    medicine_stock_id: MedicineStockId,
    batch_stock_id: BatchestockId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO medicine_stock_batch_stocks (medicine_stock_id, batch_stock_id)
        VALUES ($1, $2)
        ON CONFLICT (medicine_stock_id, batch_stock_id) DO NOTHING
        "#,
    )
    .bind(Uuid::from(medicine_stock_id))
    .bind(Uuid::from(batch_stock_id))
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("link_batch_stock", e))?;
    Ok(())
}

async fn insert_exit<'e>(executor: impl PgExecutor<'e>, exit: &MedicineExit) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO medicine_exits
            (id, batch_stock_id, medicine_stock_id, operator_id, quantity, exit_type,
             exit_date, dispensation_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::from(exit.id_typed()))
    .bind(Uuid::from(exit.batchestock_id()))
    .bind(Uuid::from(exit.medicine_stock_id()))
    .bind(Uuid::from(exit.operator_id()))
    .bind(exit.quantity())
    .bind(exit.exit_type().as_str())
    .bind(exit.exit_date())
    .bind(exit.dispensation_id().map(Uuid::from))
    .bind(exit.created_at())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_exit", e))?;
    Ok(())
}

async fn insert_entry<'e>(executor: impl PgExecutor<'e>, entry: &MedicineEntry) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO medicine_entries
            (id, batch_stock_id, medicine_stock_id, operator_id, quantity, entry_type,
             entry_date, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::from(entry.id_typed()))
    .bind(Uuid::from(entry.batchestock_id()))
    .bind(Uuid::from(entry.medicine_stock_id()))
    .bind(Uuid::from(entry.operator_id()))
    .bind(entry.quantity())
    .bind(entry.entry_type().as_str())
    .bind(entry.entry_date())
    .bind(entry.created_at())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_entry", e))?;
    Ok(())
}

async fn insert_dispensation<'e>(
    executor: impl PgExecutor<'e>,
    dispensation: &Dispensation,
) -> Result<(), RepositoryError> {
    let exit_ids: Vec<Uuid> = dispensation.exit_ids().iter().copied().map(Uuid::from).collect();
    sqlx::query(
        r#"
        INSERT INTO dispensations
            (id, patient_id, operator_id, dispensation_date, exit_ids, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::from(dispensation.id_typed()))
    .bind(Uuid::from(dispensation.patient_id()))
    .bind(Uuid::from(dispensation.operator_id()))
    .bind(dispensation.dispensation_date())
    .bind(exit_ids)
    .bind(dispensation.created_at())
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_dispensation", e))?;
    Ok(())
}

fn page_of<T>(items: Vec<T>, pagination: Pagination, total: i64) -> Page<T> {
    Page {
        items,
        meta: Meta {
            page: pagination.page,
            total_count: u64::try_from(total).unwrap_or_default(),
        },
    }
}

fn limit_offset(pagination: Pagination) -> (i64, i64) {
    (pagination.limit() as i64, pagination.offset() as i64)
}

#[async_trait::async_trait]
impl StocksRepository for PostgresPharmaStore {
    #[instrument(skip(self, stock), fields(stock_id = %stock.id_typed()), err)]
    async fn create(&self, stock: &Stock) -> Result<(), RepositoryError> {
        insert_stock(&*self.pool, stock).await
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&self, id: StockId) -> Result<Option<Stock>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, institution_id, status, created_at FROM stocks WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_stock", e))?;
        row.as_ref().map(decode::<StockRow, _>).transpose()
    }
}

#[async_trait::async_trait]
impl MedicinesVariantsRepository for PostgresPharmaStore {
    #[instrument(skip(self, variant), fields(medicine_variant_id = %variant.id_typed()), err)]
    async fn create(&self, variant: &MedicineVariant) -> Result<(), RepositoryError> {
        insert_variant(&*self.pool, variant).await
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(
        &self,
        id: MedicineVariantId,
    ) -> Result<Option<MedicineVariant>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, medicine_id, dosage, pharmaceutical_form_id, unit_measure_id, created_at
              FROM medicine_variants
             WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_medicine_variant", e))?;
        row.as_ref().map(decode::<VariantRow, _>).transpose()
    }
}

#[async_trait::async_trait]
impl BatchesRepository for PostgresPharmaStore {
    #[instrument(skip(self, batch), fields(batch_id = %batch.id_typed()), err)]
    async fn create(&self, batch: &Batch) -> Result<(), RepositoryError> {
        insert_batch(&*self.pool, batch).await
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&self, id: BatchId) -> Result<Option<Batch>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_batch", e))?;
        row.as_ref().map(decode::<BatchRow, _>).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_code(
        &self,
        medicine_variant_id: MedicineVariantId,
        code: &str,
    ) -> Result<Option<Batch>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE medicine_variant_id = $1 AND LOWER(code) = LOWER($2)"
        ))
        .bind(Uuid::from(medicine_variant_id))
        .bind(code.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_batch_by_code", e))?;
        row.as_ref().map(decode::<BatchRow, _>).transpose()
    }
}

#[async_trait::async_trait]
impl BatchStocksRepository for PostgresPharmaStore {
    #[instrument(skip(self, batch_stock), fields(batchestock_id = %batch_stock.id_typed()), err)]
    async fn create(&self, batch_stock: &Batchestock) -> Result<(), RepositoryError> {
        insert_batch_stock(&*self.pool, batch_stock).await
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&self, id: BatchestockId) -> Result<Option<Batchestock>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_STOCK_COLUMNS} FROM batch_stocks WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_batch_stock", e))?;
        row.as_ref().map(decode::<BatchStockRow, _>).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_batch_id_and_stock_id(
        &self,
        batch_id: BatchId,
        stock_id: StockId,
    ) -> Result<Option<Batchestock>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_STOCK_COLUMNS} FROM batch_stocks WHERE batch_id = $1 AND stock_id = $2"
        ))
        .bind(Uuid::from(batch_id))
        .bind(Uuid::from(stock_id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_batch_stock_by_batch", e))?;
        row.as_ref().map(decode::<BatchStockRow, _>).transpose()
    }

    #[instrument(skip(self), err)]
    async fn replenish(
        &self,
        id: BatchestockId,
        quantity: i64,
    ) -> Result<Option<Batchestock>, RepositoryError> {
        ensure_positive(quantity)?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE batch_stocks
               SET current_quantity = current_quantity + $2, last_move = NOW(), updated_at = NOW()
             WHERE id = $1
            RETURNING {BATCH_STOCK_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(quantity)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("replenish_batch_stock", e))?;
        row.as_ref().map(decode::<BatchStockRow, _>).transpose()
    }

    #[instrument(skip(self), err)]
    async fn subtract(
        &self,
        id: BatchestockId,
        quantity: i64,
    ) -> Result<Option<Batchestock>, RepositoryError> {
        ensure_positive(quantity)?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE batch_stocks
               SET current_quantity = current_quantity - $2, last_move = NOW(), updated_at = NOW()
             WHERE id = $1 AND current_quantity >= $2
            RETURNING {BATCH_STOCK_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(quantity)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("subtract_batch_stock", e))?;
        match row {
            Some(row) => decode::<BatchStockRow, _>(&row).map(Some),
            None => match BatchStocksRepository::find_by_id(self, id).await? {
                None => Ok(None),
                Some(current) => Err(RepositoryError::Conflict(format!(
                    "batch stock {id} holds {}, cannot subtract {quantity}",
                    current.quantity()
                ))),
            },
        }
    }
}

#[async_trait::async_trait]
impl MedicinesStockRepository for PostgresPharmaStore {
    #[instrument(skip(self, medicine_stock), fields(medicine_stock_id = %medicine_stock.id_typed()), err)]
    async fn create(&self, medicine_stock: &MedicineStock) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;
        insert_medicine_stock(&mut *tx, medicine_stock).await?;
        for batch_stock_id in medicine_stock.batch_stock_ids() {
            link_batch_stock(&mut *tx, medicine_stock.id_typed(), *batch_stock_id).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(
        &self,
        id: MedicineStockId,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        self.medicine_stock_where("find_medicine_stock", "ms.id = $1", vec![id.into()])
            .await
    }

    #[instrument(skip(self), err)]
    async fn find_by_medicine_variant_id_and_stock_id(
        &self,
        medicine_variant_id: MedicineVariantId,
        stock_id: StockId,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        self.medicine_stock_where(
            "find_medicine_stock_by_variant",
            "ms.medicine_variant_id = $1 AND ms.stock_id = $2",
            vec![medicine_variant_id.into(), stock_id.into()],
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn add_batch_stock(
        &self,
        id: MedicineStockId,
        batch_stock_id: BatchestockId,
    ) -> Result<Option<()>, RepositoryError> {
        let exists: Option<Uuid> = sqlx::query_scalar(
            "UPDATE medicine_stocks SET updated_at = NOW() WHERE id = $1 RETURNING id",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("touch_medicine_stock", e))?;
        if exists.is_none() {
            return Ok(None);
        }
        link_batch_stock(&*self.pool, id, batch_stock_id).await?;
        Ok(Some(()))
    }

    #[instrument(skip(self), err)]
    async fn replenish(
        &self,
        id: MedicineStockId,
        quantity: i64,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        ensure_positive(quantity)?;
        let sql = format!(
            r#"
            WITH ms AS (
                UPDATE medicine_stocks
                   SET current_quantity = current_quantity + $2, last_move = NOW(), updated_at = NOW()
                 WHERE id = $1
                RETURNING *
            )
            {MEDICINE_STOCK_PROJECTION} FROM ms
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::from(id))
            .bind(quantity)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("replenish_medicine_stock", e))?;
        row.as_ref().map(decode::<MedicineStockRow, _>).transpose()
    }

    #[instrument(skip(self), err)]
    async fn subtract(
        &self,
        id: MedicineStockId,
        quantity: i64,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        ensure_positive(quantity)?;
        let sql = format!(
            r#"
            WITH ms AS (
                UPDATE medicine_stocks
                   SET current_quantity = current_quantity - $2, last_move = NOW(), updated_at = NOW()
                 WHERE id = $1 AND current_quantity >= $2
                RETURNING *
            )
            {MEDICINE_STOCK_PROJECTION} FROM ms
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::from(id))
            .bind(quantity)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("subtract_medicine_stock", e))?;
        match row {
            Some(row) => decode::<MedicineStockRow, _>(&row).map(Some),
            None => match MedicinesStockRepository::find_by_id(self, id).await? {
                None => Ok(None),
                Some(current) => Err(RepositoryError::Conflict(format!(
                    "medicine stock {id} holds {}, cannot subtract {quantity}",
                    current.quantity()
                ))),
            },
        }
    }

    #[instrument(skip(self), err)]
    async fn find_many(
        &self,
        stock_id: StockId,
        pagination: Pagination,
    ) -> Result<Page<MedicineStock>, RepositoryError> {
        let (limit, offset) = limit_offset(pagination);
        let sql = format!(
            "{MEDICINE_STOCK_PROJECTION} FROM medicine_stocks ms WHERE ms.stock_id = $1 \
             ORDER BY ms.created_at DESC, ms.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(Uuid::from(stock_id))
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_medicine_stocks", e))?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM medicine_stocks WHERE stock_id = $1")
            .bind(Uuid::from(stock_id))
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_medicine_stocks", e))?;

        let items = rows
            .iter()
            .map(decode::<MedicineStockRow, _>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(page_of(items, pagination, total))
    }
}

#[async_trait::async_trait]
impl MedicinesExitsRepository for PostgresPharmaStore {
    #[instrument(skip(self, exit), fields(exit_id = %exit.id_typed()), err)]
    async fn create(&self, exit: &MedicineExit) -> Result<(), RepositoryError> {
        insert_exit(&*self.pool, exit).await
    }

    #[instrument(skip(self), err)]
    async fn find_many(
        &self,
        filter: ExitFilter,
        pagination: Pagination,
    ) -> Result<Page<MedicineExit>, RepositoryError> {
        const FROM: &str = r#"
            FROM medicine_exits e
            JOIN medicine_stocks ms ON ms.id = e.medicine_stock_id
           WHERE ($1::uuid IS NULL OR ms.stock_id = $1)
             AND ($2::text IS NULL OR e.exit_type = $2)
        "#;
        let (limit, offset) = limit_offset(pagination);
        let stock_id = filter.stock_id.map(Uuid::from);
        let exit_type = filter.exit_type.map(|t| t.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {EXIT_COLUMNS} {FROM} ORDER BY e.exit_date DESC, e.id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(stock_id)
        .bind(exit_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_exits", e))?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {FROM}"))
            .bind(stock_id)
            .bind(exit_type)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_exits", e))?;

        let items = rows
            .iter()
            .map(decode::<ExitRow, _>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(page_of(items, pagination, total))
    }
}

#[async_trait::async_trait]
impl MedicinesEntriesRepository for PostgresPharmaStore {
    #[instrument(skip(self, entry), fields(entry_id = %entry.id_typed()), err)]
    async fn create(&self, entry: &MedicineEntry) -> Result<(), RepositoryError> {
        insert_entry(&*self.pool, entry).await
    }

    #[instrument(skip(self), err)]
    async fn find_many(
        &self,
        filter: EntryFilter,
        pagination: Pagination,
    ) -> Result<Page<MedicineEntry>, RepositoryError> {
        const FROM: &str = r#"
            FROM medicine_entries e
            JOIN medicine_stocks ms ON ms.id = e.medicine_stock_id
           WHERE ($1::uuid IS NULL OR ms.stock_id = $1)
        "#;
        let (limit, offset) = limit_offset(pagination);
        let stock_id = filter.stock_id.map(Uuid::from);

        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} {FROM} ORDER BY e.entry_date DESC, e.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(stock_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_entries", e))?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {FROM}"))
            .bind(stock_id)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_entries", e))?;

        let items = rows
            .iter()
            .map(decode::<EntryRow, _>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(page_of(items, pagination, total))
    }
}

#[async_trait::async_trait]
impl DispensationsRepository for PostgresPharmaStore {
    #[instrument(skip(self, dispensation), fields(dispensation_id = %dispensation.id_typed()), err)]
    async fn create(&self, dispensation: &Dispensation) -> Result<(), RepositoryError> {
        insert_dispensation(&*self.pool, dispensation).await
    }

    #[instrument(skip(self), err)]
    async fn find_many(
        &self,
        patient_id: Option<PatientId>,
        pagination: Pagination,
    ) -> Result<Page<Dispensation>, RepositoryError> {
        let (limit, offset) = limit_offset(pagination);
        let patient_id = patient_id.map(Uuid::from);

        let rows = sqlx::query(
            r#"
            SELECT id, patient_id, operator_id, dispensation_date, exit_ids, created_at
              FROM dispensations
             WHERE ($1::uuid IS NULL OR patient_id = $1)
             ORDER BY dispensation_date DESC, id DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(patient_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_dispensations", e))?;
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM dispensations WHERE ($1::uuid IS NULL OR patient_id = $1)",
        )
        .bind(patient_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_dispensations", e))?;

        let items = rows
            .iter()
            .map(decode::<DispensationRow, _>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(page_of(items, pagination, total))
    }
}

#[async_trait::async_trait]
impl StockMovementStore for PostgresPharmaStore {
    #[instrument(
        skip(self, exit),
        fields(
            exit_id = %exit.id_typed(),
            batchestock_id = %exit.batchestock_id(),
            quantity = exit.quantity()
        ),
        err
    )]
    async fn apply_exit(&self, exit: &MedicineExit) -> Result<(), MovementApplyError> {
        let mut tx = self.begin().await?;
        let result = apply_exits(&mut tx, std::slice::from_ref(exit)).await;
        finish(tx, result).await
    }

    #[instrument(
        skip(self, commit),
        fields(
            medicine_stock_id = %commit.medicine_stock_id,
            entries = commit.entries.len()
        ),
        err
    )]
    async fn apply_entry(&self, commit: &EntryCommit) -> Result<(), MovementApplyError> {
        let mut tx = self.begin().await?;
        let result = apply_entry_in(&mut tx, commit).await;
        finish(tx, result).await
    }

    #[instrument(
        skip(self, dispensation, exits),
        fields(dispensation_id = %dispensation.id_typed(), exits = exits.len()),
        err
    )]
    async fn apply_dispensation(
        &self,
        dispensation: &Dispensation,
        exits: &[MedicineExit],
    ) -> Result<(), MovementApplyError> {
        let mut tx = self.begin().await?;
        let result = apply_dispensation_in(&mut tx, dispensation, exits).await;
        finish(tx, result).await
    }
}

/// The dispensation row goes first; its exits reference it.
async fn apply_dispensation_in(
    tx: &mut Transaction<'_, Postgres>,
    dispensation: &Dispensation,
    exits: &[MedicineExit],
) -> Result<(), MovementApplyError> {
    insert_dispensation(&mut **tx, dispensation).await?;
    apply_exits(tx, exits).await
}

async fn apply_entry_in(
    tx: &mut Transaction<'_, Postgres>,
    commit: &EntryCommit,
) -> Result<(), MovementApplyError> {
    if let Some(medicine_stock) = &commit.new_medicine_stock {
        insert_medicine_stock(&mut **tx, medicine_stock).await?;
    }
    for batch in &commit.new_batches {
        insert_batch(&mut **tx, batch).await?;
    }
    for batch_stock in &commit.new_batch_stocks {
        insert_batch_stock(&mut **tx, batch_stock).await?;
    }
    // an existing batch-stock may predate its link
    for entry in &commit.entries {
        ensure_same_location(tx, entry.medicine_stock_id(), entry.batchestock_id()).await?;
        link_batch_stock(&mut **tx, entry.medicine_stock_id(), entry.batchestock_id()).await?;
    }

    let per_batch = totals(
        commit
            .entries
            .iter()
            .map(|e| (e.batchestock_id(), e.quantity(), e.entry_date())),
    );
    for (id, (quantity, at)) in per_batch {
        increment_batch_stock(tx, id, quantity, at).await?;
    }
    let per_aggregate = totals(
        commit
            .entries
            .iter()
            .map(|e| (e.medicine_stock_id(), e.quantity(), e.entry_date())),
    );
    for (id, (quantity, at)) in per_aggregate {
        increment_medicine_stock(tx, id, quantity, at).await?;
    }

    for entry in &commit.entries {
        insert_entry(&mut **tx, entry).await?;
    }
    Ok(())
}

fn ensure_positive(quantity: i64) -> Result<(), RepositoryError> {
    if quantity <= 0 {
        return Err(RepositoryError::Conflict(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

/// Map SQLx errors to RepositoryError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique, foreign key and check violations
                Some("23505") | Some("23503") | Some("23514") => RepositoryError::Conflict(msg),
                _ => RepositoryError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            RepositoryError::Unavailable(format!("{} in {}", err, operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::Serialization(format!("{} in {}", err, operation))
        }
        _ => RepositoryError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn invalid_row(err: DomainError) -> RepositoryError {
    RepositoryError::Serialization(format!("stored row violates domain rules: {err}"))
}

/// Decode a row through its row type into a domain entity.
fn decode<R, T>(row: &PgRow) -> Result<T, RepositoryError>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = RepositoryError>,
{
    let raw = R::from_row(row)
        .map_err(|e| RepositoryError::Serialization(format!("failed to decode row: {e}")))?;
    T::try_from(raw)
}

// SQLx row types

#[derive(Debug)]
struct StockRow {
    id: Uuid,
    name: String,
    institution_id: Uuid,
    status: bool,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            institution_id: row.try_get("institution_id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<StockRow> for Stock {
    type Error = RepositoryError;

    fn try_from(row: StockRow) -> Result<Self, Self::Error> {
        Stock::create(
            StockProps {
                name: row.name,
                institution_id: InstitutionId::from_uuid(row.institution_id),
                status: row.status,
                created_at: Some(row.created_at),
            },
            Some(StockId::from_uuid(row.id)),
        )
        .map_err(invalid_row)
    }
}

#[derive(Debug)]
struct VariantRow {
    id: Uuid,
    medicine_id: Uuid,
    dosage: String,
    pharmaceutical_form_id: Uuid,
    unit_measure_id: Uuid,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for VariantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(VariantRow {
            id: row.try_get("id")?,
            medicine_id: row.try_get("medicine_id")?,
            dosage: row.try_get("dosage")?,
            pharmaceutical_form_id: row.try_get("pharmaceutical_form_id")?,
            unit_measure_id: row.try_get("unit_measure_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<VariantRow> for MedicineVariant {
    type Error = RepositoryError;

    fn try_from(row: VariantRow) -> Result<Self, Self::Error> {
        MedicineVariant::create(
            MedicineVariantProps {
                medicine_id: MedicineId::from_uuid(row.medicine_id),
                dosage: row.dosage,
                pharmaceutical_form_id: PharmaceuticalFormId::from_uuid(row.pharmaceutical_form_id),
                unit_measure_id: UnitMeasureId::from_uuid(row.unit_measure_id),
                created_at: Some(row.created_at),
            },
            Some(MedicineVariantId::from_uuid(row.id)),
        )
        .map_err(invalid_row)
    }
}

#[derive(Debug)]
struct BatchRow {
    id: Uuid,
    code: String,
    medicine_variant_id: Uuid,
    manufacturer_id: Uuid,
    expiration_date: NaiveDate,
    manufacturing_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BatchRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BatchRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            medicine_variant_id: row.try_get("medicine_variant_id")?,
            manufacturer_id: row.try_get("manufacturer_id")?,
            expiration_date: row.try_get("expiration_date")?,
            manufacturing_date: row.try_get("manufacturing_date")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<BatchRow> for Batch {
    type Error = RepositoryError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        Batch::create(
            BatchProps {
                code: row.code,
                medicine_variant_id: MedicineVariantId::from_uuid(row.medicine_variant_id),
                manufacturer_id: ManufacturerId::from_uuid(row.manufacturer_id),
                expiration_date: row.expiration_date,
                manufacturing_date: row.manufacturing_date,
                created_at: Some(row.created_at),
            },
            Some(BatchId::from_uuid(row.id)),
        )
        .map_err(invalid_row)
    }
}

#[derive(Debug)]
struct BatchStockRow {
    id: Uuid,
    stock_id: Uuid,
    batch_id: Uuid,
    medicine_id: Uuid,
    current_quantity: i64,
    last_move: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for BatchStockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BatchStockRow {
            id: row.try_get("id")?,
            stock_id: row.try_get("stock_id")?,
            batch_id: row.try_get("batch_id")?,
            medicine_id: row.try_get("medicine_id")?,
            current_quantity: row.try_get("current_quantity")?,
            last_move: row.try_get("last_move")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<BatchStockRow> for Batchestock {
    type Error = RepositoryError;

    fn try_from(row: BatchStockRow) -> Result<Self, Self::Error> {
        Batchestock::create(
            BatchestockProps {
                stock_id: StockId::from_uuid(row.stock_id),
                batch_id: BatchId::from_uuid(row.batch_id),
                medicine_id: MedicineId::from_uuid(row.medicine_id),
                current_quantity: row.current_quantity,
                last_move: row.last_move,
                created_at: Some(row.created_at),
                updated_at: row.updated_at,
            },
            Some(BatchestockId::from_uuid(row.id)),
        )
        .map_err(invalid_row)
    }
}

#[derive(Debug)]
struct MedicineStockRow {
    id: Uuid,
    medicine_variant_id: Uuid,
    stock_id: Uuid,
    current_quantity: i64,
    minimum_level: Option<i64>,
    last_move: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    batch_stock_ids: Vec<Uuid>,
}

impl<'r> FromRow<'r, PgRow> for MedicineStockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MedicineStockRow {
            id: row.try_get("id")?,
            medicine_variant_id: row.try_get("medicine_variant_id")?,
            stock_id: row.try_get("stock_id")?,
            current_quantity: row.try_get("current_quantity")?,
            minimum_level: row.try_get("minimum_level")?,
            last_move: row.try_get("last_move")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            batch_stock_ids: row.try_get("batch_stock_ids")?,
        })
    }
}

impl TryFrom<MedicineStockRow> for MedicineStock {
    type Error = RepositoryError;

    fn try_from(row: MedicineStockRow) -> Result<Self, Self::Error> {
        MedicineStock::create(
            MedicineStockProps {
                medicine_variant_id: MedicineVariantId::from_uuid(row.medicine_variant_id),
                stock_id: StockId::from_uuid(row.stock_id),
                current_quantity: row.current_quantity,
                minimum_level: row.minimum_level,
                batch_stock_ids: row
                    .batch_stock_ids
                    .into_iter()
                    .map(BatchestockId::from_uuid)
                    .collect(),
                last_move: row.last_move,
                created_at: Some(row.created_at),
                updated_at: Some(row.updated_at),
            },
            Some(MedicineStockId::from_uuid(row.id)),
        )
        .map_err(invalid_row)
    }
}

#[derive(Debug)]
struct ExitRow {
    id: Uuid,
    batch_stock_id: Uuid,
    medicine_stock_id: Uuid,
    operator_id: Uuid,
    quantity: i64,
    exit_type: String,
    exit_date: DateTime<Utc>,
    dispensation_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ExitRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ExitRow {
            id: row.try_get("id")?,
            batch_stock_id: row.try_get("batch_stock_id")?,
            medicine_stock_id: row.try_get("medicine_stock_id")?,
            operator_id: row.try_get("operator_id")?,
            quantity: row.try_get("quantity")?,
            exit_type: row.try_get("exit_type")?,
            exit_date: row.try_get("exit_date")?,
            dispensation_id: row.try_get("dispensation_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ExitRow> for MedicineExit {
    type Error = RepositoryError;

    fn try_from(row: ExitRow) -> Result<Self, Self::Error> {
        MedicineExit::create(
            MedicineExitProps {
                batchestock_id: BatchestockId::from_uuid(row.batch_stock_id),
                medicine_stock_id: MedicineStockId::from_uuid(row.medicine_stock_id),
                operator_id: OperatorId::from_uuid(row.operator_id),
                quantity: row.quantity,
                exit_type: row.exit_type.parse().map_err(invalid_row)?,
                exit_date: Some(row.exit_date),
                dispensation_id: row.dispensation_id.map(DispensationId::from_uuid),
                created_at: Some(row.created_at),
            },
            Some(ExitId::from_uuid(row.id)),
        )
        .map_err(invalid_row)
    }
}

#[derive(Debug)]
struct EntryRow {
    id: Uuid,
    batch_stock_id: Uuid,
    medicine_stock_id: Uuid,
    operator_id: Uuid,
    quantity: i64,
    entry_type: String,
    entry_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            id: row.try_get("id")?,
            batch_stock_id: row.try_get("batch_stock_id")?,
            medicine_stock_id: row.try_get("medicine_stock_id")?,
            operator_id: row.try_get("operator_id")?,
            quantity: row.try_get("quantity")?,
            entry_type: row.try_get("entry_type")?,
            entry_date: row.try_get("entry_date")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<EntryRow> for MedicineEntry {
    type Error = RepositoryError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        MedicineEntry::create(
            MedicineEntryProps {
                batchestock_id: BatchestockId::from_uuid(row.batch_stock_id),
                medicine_stock_id: MedicineStockId::from_uuid(row.medicine_stock_id),
                operator_id: OperatorId::from_uuid(row.operator_id),
                quantity: row.quantity,
                entry_type: row.entry_type.parse().map_err(invalid_row)?,
                entry_date: Some(row.entry_date),
                created_at: Some(row.created_at),
            },
            Some(EntryId::from_uuid(row.id)),
        )
        .map_err(invalid_row)
    }
}

#[derive(Debug)]
struct DispensationRow {
    id: Uuid,
    patient_id: Uuid,
    operator_id: Uuid,
    dispensation_date: DateTime<Utc>,
    exit_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for DispensationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DispensationRow {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            operator_id: row.try_get("operator_id")?,
            dispensation_date: row.try_get("dispensation_date")?,
            exit_ids: row.try_get("exit_ids")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<DispensationRow> for Dispensation {
    type Error = RepositoryError;

    fn try_from(row: DispensationRow) -> Result<Self, Self::Error> {
        Dispensation::create(
            DispensationProps {
                patient_id: PatientId::from_uuid(row.patient_id),
                operator_id: OperatorId::from_uuid(row.operator_id),
                dispensation_date: Some(row.dispensation_date),
                exit_ids: row.exit_ids.into_iter().map(ExitId::from_uuid).collect(),
                created_at: Some(row.created_at),
            },
            Some(DispensationId::from_uuid(row.id)),
        )
        .map_err(invalid_row)
    }
}
