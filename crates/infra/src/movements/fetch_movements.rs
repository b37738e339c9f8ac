use std::sync::Arc;

use tracing::instrument;

use pharmastock_core::{PatientId, StockId};
use pharmastock_stock::{Dispensation, ExitType, MedicineEntry, MedicineExit, MedicineStock};

use super::MovementError;
use crate::config::PaginationConfig;
use crate::repositories::{
    DispensationsRepository, EntryFilter, ExitFilter, MedicinesEntriesRepository,
    MedicinesExitsRepository, MedicinesStockRepository, Page, PharmaStore,
};

/// Paginated history and stock listings, newest first.
pub struct FetchMovementsUseCase {
    exits: Arc<dyn MedicinesExitsRepository>,
    entries: Arc<dyn MedicinesEntriesRepository>,
    dispensations: Arc<dyn DispensationsRepository>,
    medicine_stocks: Arc<dyn MedicinesStockRepository>,
    pages: PaginationConfig,
}

impl FetchMovementsUseCase {
    pub fn new(
        exits: Arc<dyn MedicinesExitsRepository>,
        entries: Arc<dyn MedicinesEntriesRepository>,
        dispensations: Arc<dyn DispensationsRepository>,
        medicine_stocks: Arc<dyn MedicinesStockRepository>,
        pages: PaginationConfig,
    ) -> Self {
        Self {
            exits,
            entries,
            dispensations,
            medicine_stocks,
            pages,
        }
    }

    pub fn from_store<S: PharmaStore + 'static>(store: Arc<S>, pages: PaginationConfig) -> Self {
        Self::new(store.clone(), store.clone(), store.clone(), store, pages)
    }

    #[instrument(skip(self))]
    pub async fn exits(
        &self,
        stock_id: Option<StockId>,
        exit_type: Option<ExitType>,
        page: u32,
    ) -> Result<Page<MedicineExit>, MovementError> {
        let filter = ExitFilter {
            stock_id,
            exit_type,
        };
        Ok(self.exits.find_many(filter, self.pages.exits(page)).await?)
    }

    #[instrument(skip(self))]
    pub async fn entries(
        &self,
        stock_id: Option<StockId>,
        page: u32,
    ) -> Result<Page<MedicineEntry>, MovementError> {
        Ok(self
            .entries
            .find_many(EntryFilter { stock_id }, self.pages.entries(page))
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn dispensations(
        &self,
        patient_id: Option<PatientId>,
        page: u32,
    ) -> Result<Page<Dispensation>, MovementError> {
        Ok(self
            .dispensations
            .find_many(patient_id, self.pages.dispensations(page))
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn medicine_stocks(
        &self,
        stock_id: StockId,
        page: u32,
    ) -> Result<Page<MedicineStock>, MovementError> {
        Ok(self
            .medicine_stocks
            .find_many(stock_id, self.pages.medicine_stocks(page))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movements::test_support::Fixture;
    use crate::movements::{
        DispenseMedicineRequest, DispenseMedicineUseCase, MovimentationBatchestock,
        RegisterExitRequest, RegisterExitUseCase,
    };
    use chrono::{Duration, Utc};
    use pharmastock_core::OperatorId;

    #[tokio::test]
    async fn exits_are_paged_newest_first_and_filtered_by_type() {
        let fx = Fixture::seeded(100, 100).await;
        let register = RegisterExitUseCase::from_store(fx.store.clone());
        let start = Utc::now() - Duration::days(30);
        for day in 0..12 {
            register
                .execute(RegisterExitRequest {
                    medicine_variant_id: fx.variant.id_typed(),
                    stock_id: fx.stock.id_typed(),
                    operator_id: OperatorId::new(),
                    batchestock_id: fx.batch_stock.id_typed(),
                    quantity: 1,
                    exit_type: if day == 11 { ExitType::Expiration } else { ExitType::Loss },
                    exit_date: Some(start + Duration::days(day)),
                })
                .await
                .unwrap();
        }

        let fetch = FetchMovementsUseCase::from_store(fx.store.clone(), PaginationConfig::default());

        let first = fetch.exits(Some(fx.stock.id_typed()), None, 1).await.unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.meta.total_count, 12);
        assert_eq!(first.items[0].exit_type(), ExitType::Expiration);
        assert!(first.items.windows(2).all(|w| w[0].exit_date() >= w[1].exit_date()));

        let second = fetch.exits(None, None, 2).await.unwrap();
        assert_eq!(second.items.len(), 2);

        let expired = fetch.exits(None, Some(ExitType::Expiration), 1).await.unwrap();
        assert_eq!(expired.meta.total_count, 1);

        let elsewhere = fetch.exits(Some(StockId::new()), None, 1).await.unwrap();
        assert!(elsewhere.items.is_empty());
    }

    #[tokio::test]
    async fn dispensations_filter_by_patient() {
        let fx = Fixture::seeded(10, 10).await;
        let dispense = DispenseMedicineUseCase::from_store(fx.store.clone());
        let patient = PatientId::new();
        for patient_id in [patient, PatientId::new(), patient] {
            dispense
                .execute(DispenseMedicineRequest {
                    patient_id,
                    operator_id: OperatorId::new(),
                    medicine_variant_id: fx.variant.id_typed(),
                    stock_id: fx.stock.id_typed(),
                    batches_stocks: vec![MovimentationBatchestock {
                        batchestock_id: fx.batch_stock.id_typed(),
                        quantity: 1,
                    }],
                    dispensation_date: None,
                })
                .await
                .unwrap();
        }

        let fetch = FetchMovementsUseCase::from_store(fx.store.clone(), PaginationConfig::default());
        assert_eq!(fetch.dispensations(Some(patient), 1).await.unwrap().meta.total_count, 2);
        assert_eq!(fetch.dispensations(None, 1).await.unwrap().items.len(), 3);

        let stocks = fetch.medicine_stocks(fx.stock.id_typed(), 1).await.unwrap();
        assert_eq!(stocks.items[0].quantity(), 7);
    }
}
