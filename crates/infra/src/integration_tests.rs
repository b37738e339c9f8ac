//! End-to-end movement flows over the in-memory store.
//!
//! Verifies:
//! - Entries, exits and dispensations keep the aggregate equal to the sum of
//!   its batch-stocks
//! - Concurrent exits on one batch never drive it negative

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use pharmastock_core::{
        InstitutionId, ManufacturerId, MedicineId, OperatorId, PatientId, PharmaceuticalFormId,
        UnitMeasureId,
    };
    use pharmastock_stock::{
        EntryType, ExitType, MedicineVariant, MedicineVariantProps, Stock, StockProps,
    };

    use crate::config::PaginationConfig;
    use crate::movements::{
        DispenseMedicineRequest, EntryBatch, MovementError, MovimentationBatchestock,
        RegisterEntryRequest, RegisterExitRequest,
    };
    use crate::repositories::{
        BatchStocksRepository, InMemoryPharmaStore, MedicinesStockRepository,
        MedicinesVariantsRepository, StocksRepository,
    };
    use crate::services::MovementServices;

    async fn catalog(store: &InMemoryPharmaStore) -> (MedicineVariant, Stock) {
        let variant = MedicineVariant::create(
            MedicineVariantProps {
                medicine_id: MedicineId::new(),
                dosage: "250mg/5ml".into(),
                pharmaceutical_form_id: PharmaceuticalFormId::new(),
                unit_measure_id: UnitMeasureId::new(),
                created_at: None,
            },
            None,
        )
        .unwrap();
        MedicinesVariantsRepository::create(store, &variant).await.unwrap();

        let stock = Stock::create(
            StockProps {
                name: "Pediatrics".into(),
                institution_id: InstitutionId::new(),
                status: true,
                created_at: None,
            },
            None,
        )
        .unwrap();
        StocksRepository::create(store, &stock).await.unwrap();
        (variant, stock)
    }

    fn lot(code: &str, quantity: i64) -> EntryBatch {
        EntryBatch {
            code: code.into(),
            manufacturer_id: ManufacturerId::new(),
            expiration_date: NaiveDate::from_ymd_opt(2031, 6, 30).unwrap(),
            manufacturing_date: NaiveDate::from_ymd_opt(2025, 6, 30),
            quantity,
        }
    }

    async fn assert_reconciled(store: &InMemoryPharmaStore, variant: &MedicineVariant, stock: &Stock) {
        let aggregate = store
            .find_by_medicine_variant_id_and_stock_id(variant.id_typed(), stock.id_typed())
            .await
            .unwrap()
            .unwrap();
        let mut batches = Vec::new();
        for id in aggregate.batch_stock_ids() {
            batches.push(
                BatchStocksRepository::find_by_id(store, *id)
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        aggregate.reconcile(&batches).unwrap();
    }

    #[tokio::test]
    async fn entry_exit_and_dispensation_keep_levels_in_sync() {
        let (services, store) = MovementServices::in_memory(PaginationConfig::default());
        let (variant, stock) = catalog(&store).await;
        let operator_id = OperatorId::new();

        let receipt = services
            .register_entry
            .execute(RegisterEntryRequest {
                medicine_variant_id: variant.id_typed(),
                stock_id: stock.id_typed(),
                operator_id,
                entry_type: EntryType::Purchase,
                entry_date: None,
                batches: vec![lot("A-17", 30), lot("B-02", 20)],
            })
            .await
            .unwrap();
        assert_reconciled(&store, &variant, &stock).await;

        services
            .register_exit
            .execute(RegisterExitRequest {
                medicine_variant_id: variant.id_typed(),
                stock_id: stock.id_typed(),
                operator_id,
                batchestock_id: receipt.batchestock_ids[0],
                quantity: 5,
                exit_type: ExitType::Expiration,
                exit_date: None,
            })
            .await
            .unwrap();

        let patient_id = PatientId::new();
        services
            .dispense
            .execute(DispenseMedicineRequest {
                patient_id,
                operator_id,
                medicine_variant_id: variant.id_typed(),
                stock_id: stock.id_typed(),
                batches_stocks: vec![
                    MovimentationBatchestock {
                        batchestock_id: receipt.batchestock_ids[0],
                        quantity: 10,
                    },
                    MovimentationBatchestock {
                        batchestock_id: receipt.batchestock_ids[1],
                        quantity: 8,
                    },
                ],
                dispensation_date: None,
            })
            .await
            .unwrap();

        assert_reconciled(&store, &variant, &stock).await;
        let aggregate = MedicinesStockRepository::find_by_id(&*store, receipt.medicine_stock_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aggregate.quantity(), 27);

        let exits = services
            .fetch
            .exits(Some(stock.id_typed()), None, 1)
            .await
            .unwrap();
        assert_eq!(exits.meta.total_count, 3);
        let entries = services.fetch.entries(None, 1).await.unwrap();
        assert_eq!(entries.meta.total_count, 2);
        let dispensations = services
            .fetch
            .dispensations(Some(patient_id), 1)
            .await
            .unwrap();
        assert_eq!(dispensations.items[0].exit_ids().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_exits_cannot_overdraw_a_batch() {
        let (services, store) = MovementServices::in_memory(PaginationConfig::default());
        let (variant, stock) = catalog(&store).await;
        let receipt = services
            .register_entry
            .execute(RegisterEntryRequest {
                medicine_variant_id: variant.id_typed(),
                stock_id: stock.id_typed(),
                operator_id: OperatorId::new(),
                entry_type: EntryType::Donation,
                entry_date: None,
                batches: vec![lot("C-9", 10)],
            })
            .await
            .unwrap();
        let batchestock_id = receipt.batchestock_ids[0];

        let services = Arc::new(services);
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let services = services.clone();
                let request = RegisterExitRequest {
                    medicine_variant_id: variant.id_typed(),
                    stock_id: stock.id_typed(),
                    operator_id: OperatorId::new(),
                    batchestock_id,
                    quantity: 6,
                    exit_type: ExitType::Loss,
                    exit_date: None,
                };
                tokio::spawn(async move { services.register_exit.execute(request).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| matches!(
            r,
            Err(MovementError::InsufficientQuantityBatchInStock { batch_code, .. }) if batch_code == "C-9"
        )));
        assert_eq!(
            BatchStocksRepository::find_by_id(&*store, batchestock_id)
                .await
                .unwrap()
                .unwrap()
                .quantity(),
            4
        );
        assert_eq!(store.exit_count(), 1);
        assert_reconciled(&store, &variant, &stock).await;
    }
}
