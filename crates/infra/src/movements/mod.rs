//! Stock movement use-cases.
//!
//! Each use-case resolves the referenced entities through the repositories,
//! validates in a fixed order (first failure wins), and then hands the whole
//! movement to [`StockMovementStore`](crate::repositories::StockMovementStore),
//! which applies both quantity levels and the movement records as one unit.
//!
//! Expected rejections come back as [`MovementError`] values; only storage
//! failures carry the `Internal` kind.

use thiserror::Error;

use pharmastock_core::{
    BatchestockId, DomainError, MedicineId, MedicineStockId, MedicineVariantId, StockId,
};

use pharmastock_stock::{Batchestock, MedicineStock};

use crate::repositories::{MovementApplyError, RepositoryError};

pub mod dispense_medicine;
pub mod fetch_movements;
pub mod register_entry;
pub mod register_exit;

pub use dispense_medicine::{
    DispensationReceipt, DispenseMedicineRequest, DispenseMedicineUseCase,
    MovimentationBatchestock,
};
pub use fetch_movements::FetchMovementsUseCase;
pub use register_entry::{EntryBatch, EntryReceipt, RegisterEntryRequest, RegisterEntryUseCase};
pub use register_exit::{RegisterExitRequest, RegisterExitUseCase};

/// Coarse classification of a [`MovementError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Nothing to act on.
    NotFound,
    InvalidInput,
    /// The movement was attempted and rejected by a quantity rule.
    InvariantViolation,
    Internal,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MovementError {
    #[error("medicine variant {0} not found")]
    MedicineVariantNotFound(MedicineVariantId),

    #[error("no stock of medicine variant {medicine_variant_id} at stock {stock_id}")]
    MedicineStockNotExists {
        medicine_variant_id: MedicineVariantId,
        stock_id: StockId,
    },

    #[error("{0} not found")]
    ResourceNotFound(String),

    #[error("exit quantity must be greater than zero, got {0}")]
    InvalidExitQuantity(i64),

    #[error("entry quantity must be greater than zero, got {0}")]
    InvalidEntryQuantity(i64),

    #[error("dispensation quantity must be greater than zero, got {0}")]
    InvalidDispensationQuantity(i64),

    #[error(
        "insufficient quantity in stock for batch {batch_code} of medicine {medicine_id}: {quantity} requested"
    )]
    InsufficientQuantityBatchInStock {
        medicine_id: MedicineId,
        batch_code: String,
        quantity: i64,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A row passed validation but was gone when the movement was applied.
    #[error("stock mutation failed: {0}")]
    MutationFailed(String),

    /// The aggregate would go negative although the batch held enough.
    #[error("medicine stock {medicine_stock_id} holds {available}, below the {requested} taken from its batch")]
    AggregateOutOfSync {
        medicine_stock_id: MedicineStockId,
        requested: i64,
        available: i64,
    },

    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl MovementError {
    pub fn resource_not_found(what: impl std::fmt::Display) -> Self {
        Self::ResourceNotFound(what.to_string())
    }

    /// Stable, machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MedicineVariantNotFound(_) => "medicine_variant_not_found",
            Self::MedicineStockNotExists { .. } => "medicine_stock_not_exists",
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::InvalidExitQuantity(_) => "invalid_exit_quantity",
            Self::InvalidEntryQuantity(_) => "invalid_entry_quantity",
            Self::InvalidDispensationQuantity(_) => "invalid_dispensation_quantity",
            Self::InsufficientQuantityBatchInStock { .. } => "insufficient_quantity_batch_in_stock",
            Self::InvalidRequest(_) => "invalid_request",
            Self::MutationFailed(_) => "mutation_failed",
            Self::AggregateOutOfSync { .. } => "aggregate_out_of_sync",
            Self::Store(_) => "storage_failure",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MedicineVariantNotFound(_)
            | Self::MedicineStockNotExists { .. }
            | Self::ResourceNotFound(_) => ErrorKind::NotFound,
            Self::InvalidExitQuantity(_)
            | Self::InvalidEntryQuantity(_)
            | Self::InvalidDispensationQuantity(_)
            | Self::InvalidRequest(_) => ErrorKind::InvalidInput,
            Self::InsufficientQuantityBatchInStock { .. } | Self::AggregateOutOfSync { .. } => {
                ErrorKind::InvariantViolation
            }
            Self::MutationFailed(_) | Self::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<DomainError> for MovementError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::InvalidRequest(msg),
            DomainError::NotFound(what) => Self::ResourceNotFound(what),
            DomainError::InvariantViolation(msg) | DomainError::Conflict(msg) => {
                Self::MutationFailed(msg)
            }
            DomainError::InsufficientQuantity {
                requested,
                available,
            } => Self::MutationFailed(format!(
                "{requested} requested but only {available} available"
            )),
        }
    }
}

/// Context needed to report a lost race on batch quantity the same way the
/// up-front check does.
#[derive(Debug, Clone)]
pub(crate) struct BatchContext {
    pub batchestock_id: BatchestockId,
    pub medicine_id: MedicineId,
    pub batch_code: String,
}

/// A batch-stock counts towards a medicine stock only when it sits at the same
/// location and is one of its referenced batches.
pub(crate) fn held_by(medicine_stock: &MedicineStock, batch_stock: &Batchestock) -> bool {
    batch_stock.stock_id() == medicine_stock.stock_id()
        && medicine_stock
            .batch_stock_ids()
            .contains(&batch_stock.id_typed())
}

/// Translate a failed transactional apply.
pub(crate) fn apply_failure(err: MovementApplyError, batches: &[BatchContext]) -> MovementError {
    match err {
        MovementApplyError::InsufficientBatchQuantity {
            batchestock_id,
            requested,
            ..
        } => match batches.iter().find(|b| b.batchestock_id == batchestock_id) {
            Some(ctx) => MovementError::InsufficientQuantityBatchInStock {
                medicine_id: ctx.medicine_id,
                batch_code: ctx.batch_code.clone(),
                quantity: requested,
            },
            None => MovementError::MutationFailed(format!(
                "batch stock {batchestock_id} could not give {requested}"
            )),
        },
        MovementApplyError::InsufficientAggregateQuantity {
            medicine_stock_id,
            requested,
            available,
        } => MovementError::AggregateOutOfSync {
            medicine_stock_id,
            requested,
            available,
        },
        MovementApplyError::BatchStockMissing(id) => {
            MovementError::MutationFailed(format!("batch stock {id} vanished"))
        }
        MovementApplyError::MedicineStockMissing(id) => {
            MovementError::MutationFailed(format!("medicine stock {id} vanished"))
        }
        MovementApplyError::BatchStockNotLinked { batchestock_id, .. } => {
            MovementError::resource_not_found(format!("batch stock {batchestock_id}"))
        }
        MovementApplyError::Repository(e) => MovementError::Store(e),
    }
}

/// Log a rejected movement at `warn` (`error` for internal failures).
pub(crate) fn log_rejection(operation: &'static str, err: &MovementError) {
    match err.kind() {
        ErrorKind::Internal => {
            tracing::error!(operation, code = err.code(), error = %err, "movement failed")
        }
        _ => tracing::warn!(operation, code = err.code(), error = %err, "movement rejected"),
    }
}

#[cfg(test)]
pub(crate) mod test_support;
