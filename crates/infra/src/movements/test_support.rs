//! Seeded in-memory store shared by the use-case tests.

use std::sync::Arc;

use chrono::NaiveDate;

use pharmastock_core::{
    BatchestockId, InstitutionId, ManufacturerId, MedicineId, PharmaceuticalFormId, StockId,
    UnitMeasureId,
};
use pharmastock_stock::{
    Batch, BatchProps, Batchestock, BatchestockProps, MedicineStock, MedicineStockProps,
    MedicineVariant, MedicineVariantProps, Stock, StockProps,
};

use crate::repositories::{
    BatchStocksRepository, BatchesRepository, InMemoryPharmaStore, MedicinesStockRepository,
    MedicinesVariantsRepository, StocksRepository,
};

pub(crate) struct Fixture {
    pub store: Arc<InMemoryPharmaStore>,
    pub variant: MedicineVariant,
    pub stock: Stock,
    pub batch: Batch,
    pub batch_stock: Batchestock,
    pub medicine_stock: MedicineStock,
}

pub(crate) fn expiring(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, 31).unwrap()
}

impl Fixture {
    /// One variant at one stock with a single batch holding `batch_quantity`
    /// and an aggregate of `aggregate_quantity`.
    pub async fn seeded(batch_quantity: i64, aggregate_quantity: i64) -> Self {
        let store = InMemoryPharmaStore::arc();

        let variant = MedicineVariant::create(
            MedicineVariantProps {
                medicine_id: MedicineId::new(),
                dosage: "500mg".into(),
                pharmaceutical_form_id: PharmaceuticalFormId::new(),
                unit_measure_id: UnitMeasureId::new(),
                created_at: None,
            },
            None,
        )
        .unwrap();
        MedicinesVariantsRepository::create(&*store, &variant).await.unwrap();

        let stock = Stock::create(
            StockProps {
                name: "Central pharmacy".into(),
                institution_id: InstitutionId::new(),
                status: true,
                created_at: None,
            },
            None,
        )
        .unwrap();
        StocksRepository::create(&*store, &stock).await.unwrap();

        let mut props = MedicineStockProps::empty(variant.id_typed(), stock.id_typed());
        props.current_quantity = aggregate_quantity;
        let medicine_stock = MedicineStock::create(props, None).unwrap();
        MedicinesStockRepository::create(&*store, &medicine_stock)
            .await
            .unwrap();

        let (batch, batch_stock) = insert_batch(
            &store,
            &variant,
            &stock,
            &medicine_stock,
            "LOT-001",
            batch_quantity,
        )
        .await;

        Self {
            store,
            variant,
            stock,
            batch,
            batch_stock,
            medicine_stock,
        }
    }

    /// Register another batch of the variant at the stock, linked to the
    /// aggregate. The aggregate quantity is left as is.
    pub async fn insert_batch(&self, code: &str, quantity: i64) -> (Batch, Batchestock) {
        insert_batch(
            &self.store,
            &self.variant,
            &self.stock,
            &self.medicine_stock,
            code,
            quantity,
        )
        .await
    }

    /// A batch of the variant with no batch-stock anywhere.
    pub async fn register_batch(&self, code: &str) -> Batch {
        register_batch(&self.store, &self.variant, code).await
    }

    /// A batch-stock of `batch` at `stock_id` that no medicine stock references.
    pub async fn unlinked_batch_stock(
        &self,
        batch: &Batch,
        stock_id: StockId,
        quantity: i64,
    ) -> Batchestock {
        let batch_stock = Batchestock::create(
            BatchestockProps {
                stock_id,
                batch_id: batch.id_typed(),
                medicine_id: self.variant.medicine_id(),
                current_quantity: quantity,
                last_move: None,
                created_at: None,
                updated_at: None,
            },
            None,
        )
        .unwrap();
        BatchStocksRepository::create(&*self.store, &batch_stock)
            .await
            .unwrap();
        batch_stock
    }

    pub async fn batch_quantity(&self, id: BatchestockId) -> i64 {
        BatchStocksRepository::find_by_id(&*self.store, id)
            .await
            .unwrap()
            .unwrap()
            .quantity()
    }

    /// Fails unless the seeded medicine stock equals the sum of its batches.
    pub async fn assert_reconciled(&self) {
        let aggregate =
            MedicinesStockRepository::find_by_id(&*self.store, self.medicine_stock.id_typed())
                .await
                .unwrap()
                .unwrap();
        let mut batches = Vec::new();
        for id in aggregate.batch_stock_ids() {
            batches.push(
                BatchStocksRepository::find_by_id(&*self.store, *id)
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        aggregate.reconcile(&batches).unwrap();
    }

    pub async fn aggregate_quantity(&self) -> i64 {
        MedicinesStockRepository::find_by_id(&*self.store, self.medicine_stock.id_typed())
            .await
            .unwrap()
            .unwrap()
            .quantity()
    }
}

async fn insert_batch(
    store: &InMemoryPharmaStore,
    variant: &MedicineVariant,
    stock: &Stock,
    medicine_stock: &MedicineStock,
    code: &str,
    quantity: i64,
) -> (Batch, Batchestock) {
    let batch = register_batch(store, variant, code).await;

    let batch_stock = Batchestock::create(
        BatchestockProps {
            stock_id: stock.id_typed(),
            batch_id: batch.id_typed(),
            medicine_id: variant.medicine_id(),
            current_quantity: quantity,
            last_move: None,
            created_at: None,
            updated_at: None,
        },
        None,
    )
    .unwrap();
    BatchStocksRepository::create(store, &batch_stock).await.unwrap();
    MedicinesStockRepository::add_batch_stock(store, medicine_stock.id_typed(), batch_stock.id_typed())
        .await
        .unwrap();
    (batch, batch_stock)
}

async fn register_batch(store: &InMemoryPharmaStore, variant: &MedicineVariant, code: &str) -> Batch {
    let batch = Batch::create(
        BatchProps {
            code: code.into(),
            medicine_variant_id: variant.id_typed(),
            manufacturer_id: ManufacturerId::new(),
            expiration_date: expiring(2030),
            manufacturing_date: None,
            created_at: None,
        },
        None,
    )
    .unwrap();
    BatchesRepository::create(store, &batch).await.unwrap();
    batch
}
