use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use pharmastock_core::{BatchestockId, MedicineVariantId, OperatorId, StockId};
use pharmastock_stock::{ExitType, MedicineExit, MedicineExitProps};

use super::{BatchContext, MovementError, apply_failure, held_by, log_rejection};
use crate::repositories::{
    BatchStocksRepository, BatchesRepository, MedicinesStockRepository,
    MedicinesVariantsRepository, PharmaStore, StockMovementStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterExitRequest {
    pub medicine_variant_id: MedicineVariantId,
    pub stock_id: StockId,
    pub operator_id: OperatorId,
    pub batchestock_id: BatchestockId,
    pub quantity: i64,
    pub exit_type: ExitType,
    /// Defaults to now.
    #[serde(default)]
    pub exit_date: Option<DateTime<Utc>>,
}

/// Take units of one batch out of a stock location.
///
/// Validation order (first failure wins):
/// 1. medicine variant exists, else `MedicineVariantNotFound`
/// 2. the variant is stocked at the location, else `MedicineStockNotExists`
/// 3. the batch-stock exists and belongs to that medicine stock, else `ResourceNotFound`
/// 4. its batch exists, else `ResourceNotFound`
/// 5. `quantity > 0`, else `InvalidExitQuantity`
/// 6. `quantity` does not exceed the batch-stock, else `InsufficientQuantityBatchInStock`
///
/// On success both quantity levels drop by `quantity` and one exit record is
/// written, in a single store transaction.
pub struct RegisterExitUseCase {
    variants: Arc<dyn MedicinesVariantsRepository>,
    medicine_stocks: Arc<dyn MedicinesStockRepository>,
    batch_stocks: Arc<dyn BatchStocksRepository>,
    batches: Arc<dyn BatchesRepository>,
    movements: Arc<dyn StockMovementStore>,
}

impl RegisterExitUseCase {
    pub fn new(
        variants: Arc<dyn MedicinesVariantsRepository>,
        medicine_stocks: Arc<dyn MedicinesStockRepository>,
        batch_stocks: Arc<dyn BatchStocksRepository>,
        batches: Arc<dyn BatchesRepository>,
        movements: Arc<dyn StockMovementStore>,
    ) -> Self {
        Self {
            variants,
            medicine_stocks,
            batch_stocks,
            batches,
            movements,
        }
    }

    /// Wire every collaborator to one backend.
    pub fn from_store<S: PharmaStore + 'static>(store: Arc<S>) -> Self {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
        )
    }

    #[instrument(
        skip(self, request),
        fields(
            medicine_variant_id = %request.medicine_variant_id,
            stock_id = %request.stock_id,
            batchestock_id = %request.batchestock_id,
            quantity = request.quantity
        )
    )]
    pub async fn execute(&self, request: RegisterExitRequest) -> Result<(), MovementError> {
        self.register(request).await.inspect_err(|e| log_rejection("register_exit", e))
    }

    async fn register(&self, request: RegisterExitRequest) -> Result<(), MovementError> {
        let variant = self
            .variants
            .find_by_id(request.medicine_variant_id)
            .await?
            .ok_or(MovementError::MedicineVariantNotFound(request.medicine_variant_id))?;

        let medicine_stock = self
            .medicine_stocks
            .find_by_medicine_variant_id_and_stock_id(request.medicine_variant_id, request.stock_id)
            .await?
            .ok_or(MovementError::MedicineStockNotExists {
                medicine_variant_id: request.medicine_variant_id,
                stock_id: request.stock_id,
            })?;

        let batch_stock = self
            .batch_stocks
            .find_by_id(request.batchestock_id)
            .await?
            .filter(|bs| held_by(&medicine_stock, bs))
            .ok_or_else(|| {
                MovementError::resource_not_found(format!("batch stock {}", request.batchestock_id))
            })?;

        let batch = self
            .batches
            .find_by_id(batch_stock.batch_id())
            .await?
            .ok_or_else(|| {
                MovementError::resource_not_found(format!("batch {}", batch_stock.batch_id()))
            })?;

        if request.quantity <= 0 {
            return Err(MovementError::InvalidExitQuantity(request.quantity));
        }

        if request.quantity > batch_stock.quantity() {
            return Err(MovementError::InsufficientQuantityBatchInStock {
                medicine_id: variant.medicine_id(),
                batch_code: batch.code().to_string(),
                quantity: request.quantity,
            });
        }

        let exit = MedicineExit::create(
            MedicineExitProps {
                batchestock_id: batch_stock.id_typed(),
                medicine_stock_id: medicine_stock.id_typed(),
                operator_id: request.operator_id,
                quantity: request.quantity,
                exit_type: request.exit_type,
                exit_date: request.exit_date,
                dispensation_id: None,
                created_at: None,
            },
            None,
        )?;

        let context = BatchContext {
            batchestock_id: batch_stock.id_typed(),
            medicine_id: variant.medicine_id(),
            batch_code: batch.code().to_string(),
        };
        self.movements
            .apply_exit(&exit)
            .await
            .map_err(|e| apply_failure(e, std::slice::from_ref(&context)))?;

        tracing::info!(
            exit_id = %exit.id_typed(),
            exit_type = exit.exit_type().as_str(),
            "exit registered"
        );
        Ok(())
    }
}
