use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use pharmastock_core::{
    BatchestockId, DispensationId, ExitId, MedicineVariantId, OperatorId, PatientId, StockId,
};
use pharmastock_stock::{Dispensation, DispensationProps, ExitType, MedicineExit, MedicineExitProps};

use super::{BatchContext, MovementError, apply_failure, held_by, log_rejection};
use crate::repositories::{
    BatchStocksRepository, BatchesRepository, MedicinesStockRepository,
    MedicinesVariantsRepository, PharmaStore, StockMovementStore,
};

/// Quantity taken from one batch-stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MovimentationBatchestock {
    pub batchestock_id: BatchestockId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispenseMedicineRequest {
    pub patient_id: PatientId,
    pub operator_id: OperatorId,
    pub medicine_variant_id: MedicineVariantId,
    pub stock_id: StockId,
    pub batches_stocks: Vec<MovimentationBatchestock>,
    #[serde(default)]
    pub dispensation_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispensationReceipt {
    pub dispensation_id: DispensationId,
    pub exit_ids: Vec<ExitId>,
}

/// Hand a medicine to a patient, drawing from one or more batches.
///
/// Every listed batch becomes a `Dispensation` exit linked to the
/// dispensation record; all of them apply or none does.
pub struct DispenseMedicineUseCase {
    variants: Arc<dyn MedicinesVariantsRepository>,
    medicine_stocks: Arc<dyn MedicinesStockRepository>,
    batch_stocks: Arc<dyn BatchStocksRepository>,
    batches: Arc<dyn BatchesRepository>,
    movements: Arc<dyn StockMovementStore>,
}

impl DispenseMedicineUseCase {
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
            patient_id = %request.patient_id,
            medicine_variant_id = %request.medicine_variant_id,
            stock_id = %request.stock_id,
            batch_count = request.batches_stocks.len()
        )
    )]
    pub async fn execute(
        &self,
        request: DispenseMedicineRequest,
    ) -> Result<DispensationReceipt, MovementError> {
        self.dispense(request).await.inspect_err(|e| log_rejection("dispense_medicine", e))
    }

    async fn dispense(
        &self,
        request: DispenseMedicineRequest,
    ) -> Result<DispensationReceipt, MovementError> {
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

        if request.batches_stocks.is_empty() {
            return Err(MovementError::InvalidRequest(
                "a dispensation needs at least one batch".to_string(),
            ));
        }

        let dispensation_id = DispensationId::new();
        let dispensation_date = request.dispensation_date.unwrap_or_else(Utc::now);
        let mut requested: HashMap<BatchestockId, i64> = HashMap::new();
        let mut contexts: Vec<BatchContext> = Vec::with_capacity(request.batches_stocks.len());
        let mut exits: Vec<MedicineExit> = Vec::with_capacity(request.batches_stocks.len());

        for line in &request.batches_stocks {
            let batch_stock = self
                .batch_stocks
                .find_by_id(line.batchestock_id)
                .await?
                .filter(|bs| held_by(&medicine_stock, bs))
                .ok_or_else(|| {
                    MovementError::resource_not_found(format!("batch stock {}", line.batchestock_id))
                })?;

            let batch = self
                .batches
                .find_by_id(batch_stock.batch_id())
                .await?
                .ok_or_else(|| {
                    MovementError::resource_not_found(format!("batch {}", batch_stock.batch_id()))
                })?;

            if line.quantity <= 0 {
                return Err(MovementError::InvalidDispensationQuantity(line.quantity));
            }

            let total = requested.entry(line.batchestock_id).or_insert(0);
            *total += line.quantity;
            if *total > batch_stock.quantity() {
                return Err(MovementError::InsufficientQuantityBatchInStock {
                    medicine_id: variant.medicine_id(),
                    batch_code: batch.code().to_string(),
                    quantity: *total,
                });
            }

            exits.push(MedicineExit::create(
                MedicineExitProps {
                    batchestock_id: batch_stock.id_typed(),
                    medicine_stock_id: medicine_stock.id_typed(),
                    operator_id: request.operator_id,
                    quantity: line.quantity,
                    exit_type: ExitType::Dispensation,
                    exit_date: Some(dispensation_date),
                    dispensation_id: Some(dispensation_id),
                    created_at: None,
                },
                None,
            )?);
            contexts.push(BatchContext {
                batchestock_id: batch_stock.id_typed(),
                medicine_id: variant.medicine_id(),
                batch_code: batch.code().to_string(),
            });
        }

        let dispensation = Dispensation::create(
            DispensationProps {
                patient_id: request.patient_id,
                operator_id: request.operator_id,
                dispensation_date: Some(dispensation_date),
                exit_ids: exits.iter().map(|e| e.id_typed()).collect(),
                created_at: None,
            },
            Some(dispensation_id),
        )?;

        self.movements
            .apply_dispensation(&dispensation, &exits)
            .await
            .map_err(|e| apply_failure(e, &contexts))?;

        tracing::info!(
            dispensation_id = %dispensation_id,
            exits = exits.len(),
            "medicine dispensed"
        );
        Ok(DispensationReceipt {
            dispensation_id,
            exit_ids: dispensation.exit_ids().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movements::test_support::Fixture;
    use crate::repositories::{
        DispensationsRepository, ExitFilter, MedicinesExitsRepository, Pagination,
    };

    fn take(batchestock_id: BatchestockId, quantity: i64) -> MovimentationBatchestock {
        MovimentationBatchestock {
            batchestock_id,
            quantity,
        }
    }

    fn request(fx: &Fixture, lines: Vec<MovimentationBatchestock>) -> DispenseMedicineRequest {
        DispenseMedicineRequest {
            patient_id: PatientId::new(),
            operator_id: OperatorId::new(),
            medicine_variant_id: fx.variant.id_typed(),
            stock_id: fx.stock.id_typed(),
            batches_stocks: lines,
            dispensation_date: None,
        }
    }

    #[tokio::test]
    async fn dispensation_draws_from_every_listed_batch() {
        let fx = Fixture::seeded(10, 25).await;
        let (_, second) = fx.insert_batch("LOT-002", 15).await;
        let use_case = DispenseMedicineUseCase::from_store(fx.store.clone());
        let req = request(
            &fx,
            vec![take(fx.batch_stock.id_typed(), 4), take(second.id_typed(), 6)],
        );

        let receipt = use_case.execute(req.clone()).await.unwrap();

        assert_eq!(receipt.exit_ids.len(), 2);
        assert_eq!(fx.batch_quantity(fx.batch_stock.id_typed()).await, 6);
        assert_eq!(fx.batch_quantity(second.id_typed()).await, 9);
        assert_eq!(fx.aggregate_quantity().await, 15);

        let exits = MedicinesExitsRepository::find_many(
            &*fx.store,
            ExitFilter {
                stock_id: Some(fx.stock.id_typed()),
                exit_type: Some(ExitType::Dispensation),
            },
            Pagination::new(1, 10),
        )
        .await
        .unwrap();
        assert_eq!(exits.meta.total_count, 2);
        assert!(exits
            .items
            .iter()
            .all(|e| e.dispensation_id() == Some(receipt.dispensation_id)));

        let page = DispensationsRepository::find_many(&*fx.store, Some(req.patient_id), Pagination::new(1, 20))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].exit_ids(), receipt.exit_ids.as_slice());
    }

    #[tokio::test]
    async fn repeated_batch_is_checked_against_the_summed_quantity() {
        let fx = Fixture::seeded(5, 5).await;
        let use_case = DispenseMedicineUseCase::from_store(fx.store.clone());
        let id = fx.batch_stock.id_typed();

        let err = use_case
            .execute(request(&fx, vec![take(id, 3), take(id, 3)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MovementError::InsufficientQuantityBatchInStock { quantity: 6, .. }
        ));
        assert_eq!(fx.batch_quantity(id).await, 5);
        assert_eq!(fx.store.exit_count(), 0);
    }

    #[tokio::test]
    async fn later_batch_failure_leaves_earlier_batches_untouched() {
        let fx = Fixture::seeded(10, 12).await;
        let (_, second) = fx.insert_batch("LOT-002", 2).await;
        let use_case = DispenseMedicineUseCase::from_store(fx.store.clone());

        let err = use_case
            .execute(request(
                &fx,
                vec![take(fx.batch_stock.id_typed(), 4), take(second.id_typed(), 3)],
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MovementError::InsufficientQuantityBatchInStock { ref batch_code, .. } if batch_code == "LOT-002"
        ));
        assert_eq!(fx.batch_quantity(fx.batch_stock.id_typed()).await, 10);
        assert_eq!(fx.aggregate_quantity().await, 12);
    }

    #[tokio::test]
    async fn batch_stock_at_another_location_is_not_found() {
        let fx = Fixture::seeded(10, 10).await;
        let elsewhere = fx.unlinked_batch_stock(&fx.batch, StockId::new(), 7).await;
        let use_case = DispenseMedicineUseCase::from_store(fx.store.clone());

        let err = use_case
            .execute(request(
                &fx,
                vec![take(fx.batch_stock.id_typed(), 2), take(elsewhere.id_typed(), 4)],
            ))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            MovementError::ResourceNotFound(format!("batch stock {}", elsewhere.id_typed()))
        );
        assert_eq!(fx.batch_quantity(elsewhere.id_typed()).await, 7);
        assert_eq!(fx.batch_quantity(fx.batch_stock.id_typed()).await, 10);
        assert_eq!(fx.aggregate_quantity().await, 10);
        assert_eq!(fx.store.exit_count(), 0);
        fx.assert_reconciled().await;
    }

    #[tokio::test]
    async fn validation_precedence() {
        let fx = Fixture::seeded(10, 10).await;
        let use_case = DispenseMedicineUseCase::from_store(fx.store.clone());

        let mut req = request(&fx, vec![take(BatchestockId::new(), 0)]);
        req.medicine_variant_id = MedicineVariantId::new();
        assert!(matches!(
            use_case.execute(req).await.unwrap_err(),
            MovementError::MedicineVariantNotFound(_)
        ));

        let mut req = request(&fx, vec![]);
        req.stock_id = StockId::new();
        assert!(matches!(
            use_case.execute(req).await.unwrap_err(),
            MovementError::MedicineStockNotExists { .. }
        ));

        assert_eq!(
            use_case.execute(request(&fx, vec![])).await.unwrap_err().code(),
            "invalid_request"
        );

        let err = use_case
            .execute(request(&fx, vec![take(fx.batch_stock.id_typed(), 0), take(BatchestockId::new(), 1)]))
            .await
            .unwrap_err();
        assert_eq!(err, MovementError::InvalidDispensationQuantity(0));

        let err = use_case
            .execute(request(&fx, vec![take(fx.batch_stock.id_typed(), 1), take(BatchestockId::new(), 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "resource_not_found");
        assert_eq!(fx.batch_quantity(fx.batch_stock.id_typed()).await, 10);
    }
}
