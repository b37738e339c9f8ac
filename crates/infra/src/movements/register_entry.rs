use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pharmastock_core::{
    BatchestockId, EntryId, ManufacturerId, MedicineStockId, MedicineVariantId, OperatorId,
    StockId,
};
use pharmastock_stock::{
    Batch, BatchProps, Batchestock, BatchestockProps, EntryType, MedicineEntry,
    MedicineEntryProps, MedicineStock, MedicineStockProps, MedicineVariant,
};

use super::{MovementError, apply_failure, log_rejection};
use crate::repositories::{
    BatchStocksRepository, BatchesRepository, EntryCommit, MedicinesStockRepository,
    MedicinesVariantsRepository, PharmaStore, StockMovementStore, StocksRepository,
};

/// One lot received in an entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntryBatch {
    pub code: String,
    pub manufacturer_id: ManufacturerId,
    pub expiration_date: NaiveDate,
    #[serde(default)]
    pub manufacturing_date: Option<NaiveDate>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterEntryRequest {
    pub medicine_variant_id: MedicineVariantId,
    pub stock_id: StockId,
    pub operator_id: OperatorId,
    pub entry_type: EntryType,
    #[serde(default)]
    pub entry_date: Option<DateTime<Utc>>,
    pub batches: Vec<EntryBatch>,
}

/// Rows touched by a registered entry, one `batchestock_ids`/`entry_ids`
/// element per requested lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReceipt {
    pub medicine_stock_id: MedicineStockId,
    pub batchestock_ids: Vec<BatchestockId>,
    pub entry_ids: Vec<EntryId>,
}

/// Receive one or more lots of a medicine variant into a stock location.
///
/// The medicine stock, the batches and their batch-stocks are created on first
/// receipt and reused afterwards; both quantity levels grow by each lot's
/// quantity.
pub struct RegisterEntryUseCase {
    variants: Arc<dyn MedicinesVariantsRepository>,
    stocks: Arc<dyn StocksRepository>,
    medicine_stocks: Arc<dyn MedicinesStockRepository>,
    batches: Arc<dyn BatchesRepository>,
    batch_stocks: Arc<dyn BatchStocksRepository>,
    movements: Arc<dyn StockMovementStore>,
}

impl RegisterEntryUseCase {
    pub fn new(
        variants: Arc<dyn MedicinesVariantsRepository>,
        stocks: Arc<dyn StocksRepository>,
        medicine_stocks: Arc<dyn MedicinesStockRepository>,
        batches: Arc<dyn BatchesRepository>,
        batch_stocks: Arc<dyn BatchStocksRepository>,
        movements: Arc<dyn StockMovementStore>,
    ) -> Self {
        Self {
            variants,
            stocks,
            medicine_stocks,
            batches,
            batch_stocks,
            movements,
        }
    }

    pub fn from_store<S: PharmaStore + 'static>(store: Arc<S>) -> Self {
        Self::new(
            store.clone(),
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
            batch_count = request.batches.len()
        )
    )]
    pub async fn execute(&self, request: RegisterEntryRequest) -> Result<EntryReceipt, MovementError> {
        self.register(request).await.inspect_err(|e| log_rejection("register_entry", e))
    }

    async fn register(&self, request: RegisterEntryRequest) -> Result<EntryReceipt, MovementError> {
        let variant = self
            .variants
            .find_by_id(request.medicine_variant_id)
            .await?
            .ok_or(MovementError::MedicineVariantNotFound(request.medicine_variant_id))?;

        self.stocks
            .find_by_id(request.stock_id)
            .await?
            .ok_or_else(|| MovementError::resource_not_found(format!("stock {}", request.stock_id)))?;

        if request.batches.is_empty() {
            return Err(MovementError::InvalidRequest(
                "an entry needs at least one batch".to_string(),
            ));
        }
        if let Some(line) = request.batches.iter().find(|b| b.quantity <= 0) {
            return Err(MovementError::InvalidEntryQuantity(line.quantity));
        }

        let existing = self
            .medicine_stocks
            .find_by_medicine_variant_id_and_stock_id(variant.id_typed(), request.stock_id)
            .await?;
        let (medicine_stock_id, new_medicine_stock) = match existing {
            Some(ms) => (ms.id_typed(), None),
            None => {
                let ms = MedicineStock::create(
                    MedicineStockProps::empty(variant.id_typed(), request.stock_id),
                    None,
                )?;
                (ms.id_typed(), Some(ms))
            }
        };

        let entry_date = request.entry_date.unwrap_or_else(Utc::now);
        let mut commit = EntryCommit {
            medicine_stock_id,
            new_medicine_stock,
            new_batches: Vec::new(),
            new_batch_stocks: Vec::new(),
            entries: Vec::with_capacity(request.batches.len()),
        };

        for line in &request.batches {
            let batch = self.resolve_batch(&variant, line, &mut commit).await?;
            let batchestock_id = self
                .resolve_batch_stock(&variant, &batch, request.stock_id, &mut commit)
                .await?;

            commit.entries.push(MedicineEntry::create(
                MedicineEntryProps {
                    batchestock_id,
                    medicine_stock_id,
                    operator_id: request.operator_id,
                    quantity: line.quantity,
                    entry_type: request.entry_type,
                    entry_date: Some(entry_date),
                    created_at: None,
                },
                None,
            )?);
        }

        self.movements
            .apply_entry(&commit)
            .await
            .map_err(|e| apply_failure(e, &[]))?;

        let receipt = EntryReceipt {
            medicine_stock_id,
            batchestock_ids: commit.entries.iter().map(|e| e.batchestock_id()).collect(),
            entry_ids: commit.entries.iter().map(|e| e.id_typed()).collect(),
        };
        tracing::info!(
            medicine_stock_id = %medicine_stock_id,
            entries = receipt.entry_ids.len(),
            new_batches = commit.new_batches.len(),
            "entry registered"
        );
        Ok(receipt)
    }

    /// Batch registered under this code for the variant, created if unknown.
    /// A known code must come with the lot's manufacturer and expiration date.
    async fn resolve_batch(
        &self,
        variant: &MedicineVariant,
        line: &EntryBatch,
        commit: &mut EntryCommit,
    ) -> Result<Batch, MovementError> {
        let code = line.code.trim();
        if let Some(batch) = commit
            .new_batches
            .iter()
            .find(|b| b.code().eq_ignore_ascii_case(code))
        {
            ensure_same_lot(batch, line)?;
            return Ok(batch.clone());
        }
        if let Some(batch) = self.batches.find_by_code(variant.id_typed(), code).await? {
            ensure_same_lot(&batch, line)?;
            return Ok(batch);
        }

        let batch = Batch::create(
            BatchProps {
                code: code.to_string(),
                medicine_variant_id: variant.id_typed(),
                manufacturer_id: line.manufacturer_id,
                expiration_date: line.expiration_date,
                manufacturing_date: line.manufacturing_date,
                created_at: None,
            },
            None,
        )?;
        commit.new_batches.push(batch.clone());
        Ok(batch)
    }

    async fn resolve_batch_stock(
        &self,
        variant: &MedicineVariant,
        batch: &Batch,
        stock_id: StockId,
        commit: &mut EntryCommit,
    ) -> Result<BatchestockId, MovementError> {
        if let Some(bs) = commit
            .new_batch_stocks
            .iter()
            .find(|bs| bs.batch_id() == batch.id_typed())
        {
            return Ok(bs.id_typed());
        }
        let batch_is_new = commit
            .new_batches
            .iter()
            .any(|b| b.id_typed() == batch.id_typed());
        if !batch_is_new {
            if let Some(bs) = self
                .batch_stocks
                .find_by_batch_id_and_stock_id(batch.id_typed(), stock_id)
                .await?
            {
                return Ok(bs.id_typed());
            }
        }

        let batch_stock = Batchestock::create(
            BatchestockProps {
                stock_id,
                batch_id: batch.id_typed(),
                medicine_id: variant.medicine_id(),
                current_quantity: 0,
                last_move: None,
                created_at: None,
                updated_at: None,
            },
            None,
        )?;
        let id = batch_stock.id_typed();
        commit.new_batch_stocks.push(batch_stock);
        Ok(id)
    }
}

fn ensure_same_lot(batch: &Batch, line: &EntryBatch) -> Result<(), MovementError> {
    if batch.manufacturer_id() != line.manufacturer_id
        || batch.expiration_date() != line.expiration_date
    {
        return Err(MovementError::InvalidRequest(format!(
            "batch {} is registered with another manufacturer or expiration date",
            batch.code()
        )));
    }
    Ok(())
}
