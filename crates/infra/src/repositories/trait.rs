use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pharmastock_core::{
    BatchId, BatchestockId, MedicineStockId, MedicineVariantId, PatientId, StockId,
};
use pharmastock_stock::{
    Batch, Batchestock, Dispensation, ExitType, MedicineEntry, MedicineExit, MedicineStock,
    MedicineVariant, Stock,
};

/// Storage-level failure.
///
/// These are **infrastructure errors** (outage, constraint clash, undecodable
/// row) as opposed to domain outcomes. "Absent" is never an error: lookups
/// return `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("storage error: {0}")]
    Storage(String),

    /// Write rejected by a uniqueness or quantity condition.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("failed to decode stored row: {0}")]
    Serialization(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a transactional movement apply. Nothing was written.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MovementApplyError {
    #[error("batch stock {0} disappeared before the movement was applied")]
    BatchStockMissing(BatchestockId),

    #[error("medicine stock {0} disappeared before the movement was applied")]
    MedicineStockMissing(MedicineStockId),

    #[error("batch stock {batchestock_id} is not part of medicine stock {medicine_stock_id}")]
    BatchStockNotLinked {
        batchestock_id: BatchestockId,
        medicine_stock_id: MedicineStockId,
    },

    #[error("batch stock {batchestock_id} holds {available}, movement needs {requested}")]
    InsufficientBatchQuantity {
        batchestock_id: BatchestockId,
        requested: i64,
        available: i64,
    },

    #[error("medicine stock {medicine_stock_id} holds {available}, movement needs {requested}")]
    InsufficientAggregateQuantity {
        medicine_stock_id: MedicineStockId,
        requested: i64,
        available: i64,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Page request (1-based page number).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// Out-of-range values are clamped to 1.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.limit()
    }

    pub fn limit(&self) -> usize {
        self.per_page.max(1) as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub page: u32,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: Meta,
}

impl<T> Page<T> {
    /// Slice an already ordered collection.
    pub fn from_sorted(all: Vec<T>, pagination: Pagination) -> Self {
        let total_count = all.len() as u64;
        let items = all
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit())
            .collect();
        Self {
            items,
            meta: Meta {
                page: pagination.page,
                total_count,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitFilter {
    pub stock_id: Option<StockId>,
    pub exit_type: Option<ExitType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub stock_id: Option<StockId>,
}

/// Everything a stock entry writes, applied as one unit.
///
/// New rows are inserted first (medicine stock, batches, zero-quantity
/// batch-stocks linked to the medicine stock), then every entry replenishes its
/// batch-stock and the aggregate and is recorded.
#[derive(Debug, Clone)]
pub struct EntryCommit {
    pub medicine_stock_id: MedicineStockId,
    pub new_medicine_stock: Option<MedicineStock>,
    pub new_batches: Vec<Batch>,
    pub new_batch_stocks: Vec<Batchestock>,
    pub entries: Vec<MedicineEntry>,
}

#[async_trait::async_trait]
pub trait StocksRepository: Send + Sync {
    async fn create(&self, stock: &Stock) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: StockId) -> Result<Option<Stock>, RepositoryError>;
}

#[async_trait::async_trait]
pub trait MedicinesVariantsRepository: Send + Sync {
    async fn create(&self, variant: &MedicineVariant) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: MedicineVariantId,
    ) -> Result<Option<MedicineVariant>, RepositoryError>;
}

#[async_trait::async_trait]
pub trait BatchesRepository: Send + Sync {
    async fn create(&self, batch: &Batch) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: BatchId) -> Result<Option<Batch>, RepositoryError>;

    /// Lot codes are unique per medicine variant (case-insensitive).
    async fn find_by_code(
        &self,
        medicine_variant_id: MedicineVariantId,
        code: &str,
    ) -> Result<Option<Batch>, RepositoryError>;
}

/// Batch-level quantities.
///
/// `replenish`/`subtract` are single-row conditional updates: `Ok(None)` when the
/// row is absent, `Err(Conflict)` when a subtract would go below zero.
#[async_trait::async_trait]
pub trait BatchStocksRepository: Send + Sync {
    async fn create(&self, batch_stock: &Batchestock) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: BatchestockId) -> Result<Option<Batchestock>, RepositoryError>;

    async fn find_by_batch_id_and_stock_id(
        &self,
        batch_id: BatchId,
        stock_id: StockId,
    ) -> Result<Option<Batchestock>, RepositoryError>;

    async fn replenish(
        &self,
        id: BatchestockId,
        quantity: i64,
    ) -> Result<Option<Batchestock>, RepositoryError>;

    async fn subtract(
        &self,
        id: BatchestockId,
        quantity: i64,
    ) -> Result<Option<Batchestock>, RepositoryError>;
}

/// Aggregate-level quantities. Same update semantics as [`BatchStocksRepository`].
#[async_trait::async_trait]
pub trait MedicinesStockRepository: Send + Sync {
    async fn create(&self, medicine_stock: &MedicineStock) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: MedicineStockId,
    ) -> Result<Option<MedicineStock>, RepositoryError>;

    async fn find_by_medicine_variant_id_and_stock_id(
        &self,
        medicine_variant_id: MedicineVariantId,
        stock_id: StockId,
    ) -> Result<Option<MedicineStock>, RepositoryError>;

    /// Link a batch-stock to the aggregate. `Ok(None)` when the aggregate is absent.
    async fn add_batch_stock(
        &self,
        id: MedicineStockId,
        batch_stock_id: BatchestockId,
    ) -> Result<Option<()>, RepositoryError>;

    async fn replenish(
        &self,
        id: MedicineStockId,
        quantity: i64,
    ) -> Result<Option<MedicineStock>, RepositoryError>;

    async fn subtract(
        &self,
        id: MedicineStockId,
        quantity: i64,
    ) -> Result<Option<MedicineStock>, RepositoryError>;

    /// Medicine stocks held at one location, newest first.
    async fn find_many(
        &self,
        stock_id: StockId,
        pagination: Pagination,
    ) -> Result<Page<MedicineStock>, RepositoryError>;
}

#[async_trait::async_trait]
pub trait MedicinesExitsRepository: Send + Sync {
    async fn create(&self, exit: &MedicineExit) -> Result<(), RepositoryError>;

    /// Exits newest first (by exit date).
    async fn find_many(
        &self,
        filter: ExitFilter,
        pagination: Pagination,
    ) -> Result<Page<MedicineExit>, RepositoryError>;
}

#[async_trait::async_trait]
pub trait MedicinesEntriesRepository: Send + Sync {
    async fn create(&self, entry: &MedicineEntry) -> Result<(), RepositoryError>;

    async fn find_many(
        &self,
        filter: EntryFilter,
        pagination: Pagination,
    ) -> Result<Page<MedicineEntry>, RepositoryError>;
}

#[async_trait::async_trait]
pub trait DispensationsRepository: Send + Sync {
    async fn create(&self, dispensation: &Dispensation) -> Result<(), RepositoryError>;

    async fn find_many(
        &self,
        patient_id: Option<PatientId>,
        pagination: Pagination,
    ) -> Result<Page<Dispensation>, RepositoryError>;
}

/// Transaction boundary for stock movements.
///
/// Each method applies every quantity change of one movement at both levels
/// (batch-stock and medicine stock) together with the movement records, or
/// applies nothing. Decrements are conditional on the stored quantity, so two
/// concurrent movements against the same batch-stock cannot both pass.
#[async_trait::async_trait]
pub trait StockMovementStore: Send + Sync {
    /// Subtract `exit.quantity()` from its batch-stock and medicine stock and
    /// record the exit.
    async fn apply_exit(&self, exit: &MedicineExit) -> Result<(), MovementApplyError>;

    async fn apply_entry(&self, commit: &EntryCommit) -> Result<(), MovementApplyError>;

    /// Apply every exit of the dispensation, then record the dispensation.
    async fn apply_dispensation(
        &self,
        dispensation: &Dispensation,
        exits: &[MedicineExit],
    ) -> Result<(), MovementApplyError>;
}

/// A backend providing every repository the movement flows need.
pub trait PharmaStore:
    StocksRepository
    + MedicinesVariantsRepository
    + BatchesRepository
    + BatchStocksRepository
    + MedicinesStockRepository
    + MedicinesExitsRepository
    + MedicinesEntriesRepository
    + DispensationsRepository
    + StockMovementStore
{
}

impl<T> PharmaStore for T where
    T: StocksRepository
        + MedicinesVariantsRepository
        + BatchesRepository
        + BatchStocksRepository
        + MedicinesStockRepository
        + MedicinesExitsRepository
        + MedicinesEntriesRepository
        + DispensationsRepository
        + StockMovementStore
{
}

#[async_trait::async_trait]
impl<S> StockMovementStore for Arc<S>
where
    S: StockMovementStore + ?Sized,
{
    async fn apply_exit(&self, exit: &MedicineExit) -> Result<(), MovementApplyError> {
        (**self).apply_exit(exit).await
    }

    async fn apply_entry(&self, commit: &EntryCommit) -> Result<(), MovementApplyError> {
        (**self).apply_entry(commit).await
    }

    async fn apply_dispensation(
        &self,
        dispensation: &Dispensation,
        exits: &[MedicineExit],
    ) -> Result<(), MovementApplyError> {
        (**self).apply_dispensation(dispensation, exits).await
    }
}
