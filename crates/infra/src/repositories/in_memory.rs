use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use pharmastock_core::{
    BatchId, BatchestockId, DomainError, MedicineStockId, MedicineVariantId, PatientId, StockId,
};
use pharmastock_stock::{
    Batch, Batchestock, Dispensation, MedicineEntry, MedicineExit, MedicineStock, MedicineVariant,
    Stock,
};

use super::r#trait::{
    BatchStocksRepository, BatchesRepository, DispensationsRepository, EntryCommit, EntryFilter,
    ExitFilter, MedicinesEntriesRepository, MedicinesExitsRepository, MedicinesStockRepository,
    MedicinesVariantsRepository, MovementApplyError, Page, Pagination, RepositoryError,
    StockMovementStore, StocksRepository,
};

#[derive(Debug, Default)]
struct Tables {
    stocks: HashMap<StockId, Stock>,
    variants: HashMap<MedicineVariantId, MedicineVariant>,
    batches: HashMap<BatchId, Batch>,
    batch_stocks: HashMap<BatchestockId, Batchestock>,
    medicine_stocks: HashMap<MedicineStockId, MedicineStock>,
    exits: Vec<MedicineExit>,
    entries: Vec<MedicineEntry>,
    dispensations: Vec<Dispensation>,
}

impl Tables {
    fn stock_of(&self, medicine_stock_id: MedicineStockId) -> Option<StockId> {
        self.medicine_stocks
            .get(&medicine_stock_id)
            .map(|ms| ms.stock_id())
    }
}

/// In-memory backend implementing every repository.
///
/// Intended for tests/dev. All tables sit behind a single lock, so a
/// transactional apply validates its whole change set on copies and then
/// commits it while holding the write lock: concurrent movements are
/// serialized and a failed apply leaves every table untouched.
#[derive(Debug, Default)]
pub struct InMemoryPharmaStore {
    tables: RwLock<Tables>,
}

impl InMemoryPharmaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    #[cfg(test)]
    pub(crate) fn exit_count(&self) -> usize {
        self.read().map(|t| t.exits.len()).unwrap()
    }

    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.read().map(|t| t.entries.len()).unwrap()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, RepositoryError> {
        self.tables
            .read()
            .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, RepositoryError> {
        self.tables
            .write()
            .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))
    }
}

fn batch_subtract(
    batch_stock: &mut Batchestock,
    quantity: i64,
    at: DateTime<Utc>,
) -> Result<(), MovementApplyError> {
    batch_stock
        .subtract_at(quantity, at)
        .map_err(|e| match e {
            DomainError::InsufficientQuantity {
                requested,
                available,
            } => MovementApplyError::InsufficientBatchQuantity {
                batchestock_id: batch_stock.id_typed(),
                requested,
                available,
            },
            other => RepositoryError::Conflict(other.to_string()).into(),
        })
}

fn aggregate_subtract(
    medicine_stock: &mut MedicineStock,
    quantity: i64,
    at: DateTime<Utc>,
) -> Result<(), MovementApplyError> {
    medicine_stock
        .subtract_at(quantity, at)
        .map_err(|e| match e {
            DomainError::InsufficientQuantity {
                requested,
                available,
            } => MovementApplyError::InsufficientAggregateQuantity {
                medicine_stock_id: medicine_stock.id_typed(),
                requested,
                available,
            },
            other => RepositoryError::Conflict(other.to_string()).into(),
        })
}

fn conflict(e: DomainError) -> RepositoryError {
    RepositoryError::Conflict(e.to_string())
}

/// Working copies of the rows a transaction touches.
struct Overlay<'a> {
    tables: &'a Tables,
    batch_stocks: HashMap<BatchestockId, Batchestock>,
    medicine_stocks: HashMap<MedicineStockId, MedicineStock>,
}

impl<'a> Overlay<'a> {
    fn new(tables: &'a Tables) -> Self {
        Self {
            tables,
            batch_stocks: HashMap::new(),
            medicine_stocks: HashMap::new(),
        }
    }

    fn batch_stock(&mut self, id: BatchestockId) -> Result<&mut Batchestock, MovementApplyError> {
        if !self.batch_stocks.contains_key(&id) {
            let row = self
                .tables
                .batch_stocks
                .get(&id)
                .cloned()
                .ok_or(MovementApplyError::BatchStockMissing(id))?;
            self.batch_stocks.insert(id, row);
        }
        self.batch_stocks
            .get_mut(&id)
            .ok_or(MovementApplyError::BatchStockMissing(id))
    }

    fn medicine_stock(
        &mut self,
        id: MedicineStockId,
    ) -> Result<&mut MedicineStock, MovementApplyError> {
        if !self.medicine_stocks.contains_key(&id) {
            let row = self
                .tables
                .medicine_stocks
                .get(&id)
                .cloned()
                .ok_or(MovementApplyError::MedicineStockMissing(id))?;
            self.medicine_stocks.insert(id, row);
        }
        self.medicine_stocks
            .get_mut(&id)
            .ok_or(MovementApplyError::MedicineStockMissing(id))
    }

    fn subtract_exit(&mut self, exit: &MedicineExit) -> Result<(), MovementApplyError> {
        let linked = self
            .medicine_stock(exit.medicine_stock_id())?
            .batch_stock_ids()
            .contains(&exit.batchestock_id());
        if !linked {
            return Err(MovementApplyError::BatchStockNotLinked {
                batchestock_id: exit.batchestock_id(),
                medicine_stock_id: exit.medicine_stock_id(),
            });
        }
        batch_subtract(
            self.batch_stock(exit.batchestock_id())?,
            exit.quantity(),
            exit.exit_date(),
        )?;
        aggregate_subtract(
            self.medicine_stock(exit.medicine_stock_id())?,
            exit.quantity(),
            exit.exit_date(),
        )
    }

    fn into_changes(
        self,
    ) -> (
        HashMap<BatchestockId, Batchestock>,
        HashMap<MedicineStockId, MedicineStock>,
    ) {
        (self.batch_stocks, self.medicine_stocks)
    }
}

fn commit(
    tables: &mut Tables,
    batch_stocks: HashMap<BatchestockId, Batchestock>,
    medicine_stocks: HashMap<MedicineStockId, MedicineStock>,
) {
    tables.batch_stocks.extend(batch_stocks);
    tables.medicine_stocks.extend(medicine_stocks);
}

#[async_trait::async_trait]
impl StocksRepository for InMemoryPharmaStore {
    async fn create(&self, stock: &Stock) -> Result<(), RepositoryError> {
        let mut tables = self.write()?;
        if tables.stocks.contains_key(&stock.id_typed()) {
            return Err(RepositoryError::Conflict(format!(
                "stock {} already exists",
                stock.id_typed()
            )));
        }
        tables.stocks.insert(stock.id_typed(), stock.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: StockId) -> Result<Option<Stock>, RepositoryError> {
        Ok(self.read()?.stocks.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl MedicinesVariantsRepository for InMemoryPharmaStore {
    async fn create(&self, variant: &MedicineVariant) -> Result<(), RepositoryError> {
        let mut tables = self.write()?;
        if tables.variants.contains_key(&variant.id_typed()) {
            return Err(RepositoryError::Conflict(format!(
                "medicine variant {} already exists",
                variant.id_typed()
            )));
        }
        tables.variants.insert(variant.id_typed(), variant.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: MedicineVariantId,
    ) -> Result<Option<MedicineVariant>, RepositoryError> {
        Ok(self.read()?.variants.get(&id).cloned())
    }
}

fn ensure_batch_insertable(tables: &Tables, batch: &Batch) -> Result<(), RepositoryError> {
    if tables.batches.contains_key(&batch.id_typed()) {
        return Err(RepositoryError::Conflict(format!(
            "batch {} already exists",
            batch.id_typed()
        )));
    }
    let duplicate_code = tables.batches.values().any(|b| {
        b.medicine_variant_id() == batch.medicine_variant_id()
            && b.code().eq_ignore_ascii_case(batch.code())
    });
    if duplicate_code {
        return Err(RepositoryError::Conflict(format!(
            "batch code '{}' already registered for this medicine variant",
            batch.code()
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl BatchesRepository for InMemoryPharmaStore {
    async fn create(&self, batch: &Batch) -> Result<(), RepositoryError> {
        let mut tables = self.write()?;
        ensure_batch_insertable(&tables, batch)?;
        tables.batches.insert(batch.id_typed(), batch.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: BatchId) -> Result<Option<Batch>, RepositoryError> {
        Ok(self.read()?.batches.get(&id).cloned())
    }

    async fn find_by_code(
        &self,
        medicine_variant_id: MedicineVariantId,
        code: &str,
    ) -> Result<Option<Batch>, RepositoryError> {
        let code = code.trim();
        Ok(self
            .read()?
            .batches
            .values()
            .find(|b| {
                b.medicine_variant_id() == medicine_variant_id
                    && b.code().eq_ignore_ascii_case(code)
            })
            .cloned())
    }
}

fn ensure_batch_stock_insertable(
    tables: &Tables,
    batch_stock: &Batchestock,
) -> Result<(), RepositoryError> {
    let duplicate = tables.batch_stocks.contains_key(&batch_stock.id_typed())
        || tables.batch_stocks.values().any(|b| {
            b.batch_id() == batch_stock.batch_id() && b.stock_id() == batch_stock.stock_id()
        });
    if duplicate {
        return Err(RepositoryError::Conflict(format!(
            "batch {} is already held at stock {}",
            batch_stock.batch_id(),
            batch_stock.stock_id()
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl BatchStocksRepository for InMemoryPharmaStore {
    async fn create(&self, batch_stock: &Batchestock) -> Result<(), RepositoryError> {
        let mut tables = self.write()?;
        ensure_batch_stock_insertable(&tables, batch_stock)?;
        tables
            .batch_stocks
            .insert(batch_stock.id_typed(), batch_stock.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: BatchestockId) -> Result<Option<Batchestock>, RepositoryError> {
        Ok(self.read()?.batch_stocks.get(&id).cloned())
    }

    async fn find_by_batch_id_and_stock_id(
        &self,
        batch_id: BatchId,
        stock_id: StockId,
    ) -> Result<Option<Batchestock>, RepositoryError> {
        Ok(self
            .read()?
            .batch_stocks
            .values()
            .find(|b| b.batch_id() == batch_id && b.stock_id() == stock_id)
            .cloned())
    }

    async fn replenish(
        &self,
        id: BatchestockId,
        quantity: i64,
    ) -> Result<Option<Batchestock>, RepositoryError> {
        let mut tables = self.write()?;
        let Some(row) = tables.batch_stocks.get_mut(&id) else {
            return Ok(None);
        };
        row.replenish(quantity).map_err(conflict)?;
        Ok(Some(row.clone()))
    }

    async fn subtract(
        &self,
        id: BatchestockId,
        quantity: i64,
    ) -> Result<Option<Batchestock>, RepositoryError> {
        let mut tables = self.write()?;
        let Some(row) = tables.batch_stocks.get_mut(&id) else {
            return Ok(None);
        };
        row.subtract(quantity).map_err(conflict)?;
        Ok(Some(row.clone()))
    }
}

fn ensure_medicine_stock_insertable(
    tables: &Tables,
    medicine_stock: &MedicineStock,
) -> Result<(), RepositoryError> {
    let duplicate = tables.medicine_stocks.contains_key(&medicine_stock.id_typed())
        || tables.medicine_stocks.values().any(|m| {
            m.medicine_variant_id() == medicine_stock.medicine_variant_id()
                && m.stock_id() == medicine_stock.stock_id()
        });
    if duplicate {
        return Err(RepositoryError::Conflict(format!(
            "medicine variant {} already has a stock row at {}",
            medicine_stock.medicine_variant_id(),
            medicine_stock.stock_id()
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl MedicinesStockRepository for InMemoryPharmaStore {
    async fn create(&self, medicine_stock: &MedicineStock) -> Result<(), RepositoryError> {
        let mut tables = self.write()?;
        ensure_medicine_stock_insertable(&tables, medicine_stock)?;
        tables
            .medicine_stocks
            .insert(medicine_stock.id_typed(), medicine_stock.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: MedicineStockId,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        Ok(self.read()?.medicine_stocks.get(&id).cloned())
    }

    async fn find_by_medicine_variant_id_and_stock_id(
        &self,
        medicine_variant_id: MedicineVariantId,
        stock_id: StockId,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        Ok(self
            .read()?
            .medicine_stocks
            .values()
            .find(|m| m.medicine_variant_id() == medicine_variant_id && m.stock_id() == stock_id)
            .cloned())
    }

    async fn add_batch_stock(
        &self,
        id: MedicineStockId,
        batch_stock_id: BatchestockId,
    ) -> Result<Option<()>, RepositoryError> {
        let mut tables = self.write()?;
        let Some(row) = tables.medicine_stocks.get_mut(&id) else {
            return Ok(None);
        };
        row.add_batch_stock(batch_stock_id);
        Ok(Some(()))
    }

    async fn replenish(
        &self,
        id: MedicineStockId,
        quantity: i64,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        let mut tables = self.write()?;
        let Some(row) = tables.medicine_stocks.get_mut(&id) else {
            return Ok(None);
        };
        row.replenish(quantity).map_err(conflict)?;
        Ok(Some(row.clone()))
    }

    async fn subtract(
        &self,
        id: MedicineStockId,
        quantity: i64,
    ) -> Result<Option<MedicineStock>, RepositoryError> {
        let mut tables = self.write()?;
        let Some(row) = tables.medicine_stocks.get_mut(&id) else {
            return Ok(None);
        };
        row.subtract(quantity).map_err(conflict)?;
        Ok(Some(row.clone()))
    }

    async fn find_many(
        &self,
        stock_id: StockId,
        pagination: Pagination,
    ) -> Result<Page<MedicineStock>, RepositoryError> {
        let tables = self.read()?;
        let mut rows: Vec<MedicineStock> = tables
            .medicine_stocks
            .values()
            .filter(|m| m.stock_id() == stock_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(Page::from_sorted(rows, pagination))
    }
}

#[async_trait::async_trait]
impl MedicinesExitsRepository for InMemoryPharmaStore {
    async fn create(&self, exit: &MedicineExit) -> Result<(), RepositoryError> {
        self.write()?.exits.push(exit.clone());
        Ok(())
    }

    async fn find_many(
        &self,
        filter: ExitFilter,
        pagination: Pagination,
    ) -> Result<Page<MedicineExit>, RepositoryError> {
        let tables = self.read()?;
        let mut rows: Vec<MedicineExit> = tables
            .exits
            .iter()
            .filter(|e| filter.exit_type.is_none_or(|t| e.exit_type() == t))
            .filter(|e| {
                filter
                    .stock_id
                    .is_none_or(|s| tables.stock_of(e.medicine_stock_id()) == Some(s))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.exit_date().cmp(&a.exit_date()));
        Ok(Page::from_sorted(rows, pagination))
    }
}

#[async_trait::async_trait]
impl MedicinesEntriesRepository for InMemoryPharmaStore {
    async fn create(&self, entry: &MedicineEntry) -> Result<(), RepositoryError> {
        self.write()?.entries.push(entry.clone());
        Ok(())
    }

    async fn find_many(
        &self,
        filter: EntryFilter,
        pagination: Pagination,
    ) -> Result<Page<MedicineEntry>, RepositoryError> {
        let tables = self.read()?;
        let mut rows: Vec<MedicineEntry> = tables
            .entries
            .iter()
            .filter(|e| {
                filter
                    .stock_id
                    .is_none_or(|s| tables.stock_of(e.medicine_stock_id()) == Some(s))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.entry_date().cmp(&a.entry_date()));
        Ok(Page::from_sorted(rows, pagination))
    }
}

#[async_trait::async_trait]
impl DispensationsRepository for InMemoryPharmaStore {
    async fn create(&self, dispensation: &Dispensation) -> Result<(), RepositoryError> {
        self.write()?.dispensations.push(dispensation.clone());
        Ok(())
    }

    async fn find_many(
        &self,
        patient_id: Option<PatientId>,
        pagination: Pagination,
    ) -> Result<Page<Dispensation>, RepositoryError> {
        let tables = self.read()?;
        let mut rows: Vec<Dispensation> = tables
            .dispensations
            .iter()
            .filter(|d| patient_id.is_none_or(|p| d.patient_id() == p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.dispensation_date().cmp(&a.dispensation_date()));
        Ok(Page::from_sorted(rows, pagination))
    }
}

#[async_trait::async_trait]
impl StockMovementStore for InMemoryPharmaStore {
    async fn apply_exit(&self, exit: &MedicineExit) -> Result<(), MovementApplyError> {
        let mut tables = self.write()?;

        let mut overlay = Overlay::new(&tables);
        overlay.subtract_exit(exit)?;
        let (batch_stocks, medicine_stocks) = overlay.into_changes();

        commit(&mut tables, batch_stocks, medicine_stocks);
        tables.exits.push(exit.clone());
        Ok(())
    }

    async fn apply_entry(&self, entry: &EntryCommit) -> Result<(), MovementApplyError> {
        let mut tables = self.write()?;

        for batch in &entry.new_batches {
            ensure_batch_insertable(&tables, batch)?;
        }
        for batch_stock in &entry.new_batch_stocks {
            ensure_batch_stock_insertable(&tables, batch_stock)?;
        }

        let mut overlay = Overlay::new(&tables);
        if let Some(ms) = &entry.new_medicine_stock {
            ensure_medicine_stock_insertable(&tables, ms)?;
            overlay.medicine_stocks.insert(ms.id_typed(), ms.clone());
        }
        for batch_stock in &entry.new_batch_stocks {
            overlay
                .batch_stocks
                .insert(batch_stock.id_typed(), batch_stock.clone());
        }
        for record in &entry.entries {
            let batch_stock = overlay.batch_stock(record.batchestock_id())?;
            batch_stock
                .replenish_at(record.quantity(), record.entry_date())
                .map_err(conflict)?;
            let held_at = batch_stock.stock_id();

            let medicine_stock = overlay.medicine_stock(record.medicine_stock_id())?;
            if medicine_stock.stock_id() != held_at {
                return Err(MovementApplyError::BatchStockNotLinked {
                    batchestock_id: record.batchestock_id(),
                    medicine_stock_id: record.medicine_stock_id(),
                });
            }
            // an existing batch-stock may predate its link
            medicine_stock.add_batch_stock(record.batchestock_id());
            medicine_stock
                .replenish_at(record.quantity(), record.entry_date())
                .map_err(conflict)?;
        }
        let (batch_stocks, medicine_stocks) = overlay.into_changes();

        for batch in &entry.new_batches {
            tables.batches.insert(batch.id_typed(), batch.clone());
        }
        commit(&mut tables, batch_stocks, medicine_stocks);
        tables.entries.extend(entry.entries.iter().cloned());
        Ok(())
    }

    async fn apply_dispensation(
        &self,
        dispensation: &Dispensation,
        exits: &[MedicineExit],
    ) -> Result<(), MovementApplyError> {
        let mut tables = self.write()?;

        let mut overlay = Overlay::new(&tables);
        for exit in exits {
            overlay.subtract_exit(exit)?;
        }
        let (batch_stocks, medicine_stocks) = overlay.into_changes();

        commit(&mut tables, batch_stocks, medicine_stocks);
        tables.exits.extend(exits.iter().cloned());
        tables.dispensations.push(dispensation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pharmastock_core::{ManufacturerId, MedicineId, OperatorId};
    use pharmastock_stock::{BatchProps, BatchestockProps, ExitType, MedicineExitProps, MedicineStockProps};

    fn seeded(batch_qty: i64, aggregate_qty: i64) -> (InMemoryPharmaStore, Batchestock, MedicineStock) {
        let store = InMemoryPharmaStore::new();
        let stock_id = StockId::new();
        let bs = Batchestock::create(
            BatchestockProps {
                stock_id,
                batch_id: BatchId::new(),
                medicine_id: MedicineId::new(),
                current_quantity: batch_qty,
                last_move: None,
                created_at: None,
                updated_at: None,
            },
            None,
        )
        .unwrap();
        let mut props = MedicineStockProps::empty(MedicineVariantId::new(), stock_id);
        props.current_quantity = aggregate_qty;
        props.batch_stock_ids = vec![bs.id_typed()];
        let ms = MedicineStock::create(props, None).unwrap();
        {
            let mut t = store.tables.write().unwrap();
            t.batch_stocks.insert(bs.id_typed(), bs.clone());
            t.medicine_stocks.insert(ms.id_typed(), ms.clone());
        }
        (store, bs, ms)
    }

    fn exit(bs: &Batchestock, ms: &MedicineStock, quantity: i64) -> MedicineExit {
        MedicineExit::create(
            MedicineExitProps {
                batchestock_id: bs.id_typed(),
                medicine_stock_id: ms.id_typed(),
                operator_id: OperatorId::new(),
                quantity,
                exit_type: ExitType::Loss,
                exit_date: None,
                dispensation_id: None,
                created_at: None,
            },
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn apply_exit_decrements_both_levels_and_records() {
        let (store, bs, ms) = seeded(10, 50);
        store.apply_exit(&exit(&bs, &ms, 4)).await.unwrap();

        let bs_after = BatchStocksRepository::find_by_id(&store, bs.id_typed()).await.unwrap().unwrap();
        let ms_after = MedicinesStockRepository::find_by_id(&store, ms.id_typed()).await.unwrap().unwrap();
        assert_eq!(bs_after.quantity(), 6);
        assert_eq!(ms_after.quantity(), 46);
        assert_eq!(store.exit_count(), 1);
    }

    #[tokio::test]
    async fn aggregate_shortfall_rolls_back_batch_decrement() {
        let (store, bs, ms) = seeded(10, 3);
        let err = store.apply_exit(&exit(&bs, &ms, 4)).await.unwrap_err();
        assert!(matches!(
            err,
            MovementApplyError::InsufficientAggregateQuantity { requested: 4, available: 3, .. }
        ));

        let bs_after = BatchStocksRepository::find_by_id(&store, bs.id_typed()).await.unwrap().unwrap();
        assert_eq!(bs_after.quantity(), 10);
        assert_eq!(store.exit_count(), 0);
    }

    #[tokio::test]
    async fn dispensation_checks_cumulative_batch_quantity() {
        let (store, bs, ms) = seeded(5, 5);
        let exits = vec![exit(&bs, &ms, 3), exit(&bs, &ms, 3)];
        let dispensation = Dispensation::create(
            pharmastock_stock::DispensationProps {
                patient_id: PatientId::new(),
                operator_id: OperatorId::new(),
                dispensation_date: None,
                exit_ids: exits.iter().map(|e| e.id_typed()).collect(),
                created_at: None,
            },
            None,
        )
        .unwrap();

        let err = store.apply_dispensation(&dispensation, &exits).await.unwrap_err();
        assert!(matches!(
            err,
            MovementApplyError::InsufficientBatchQuantity { requested: 3, available: 2, .. }
        ));
        let page = DispensationsRepository::find_many(&store, None, Pagination::new(1, 20))
            .await
            .unwrap();
        assert_eq!(page.meta.total_count, 0);
    }

    #[tokio::test]
    async fn single_row_subtract_is_conditional() {
        let (store, bs, _ms) = seeded(2, 2);
        let err = BatchStocksRepository::subtract(&store, bs.id_typed(), 3).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(BatchStocksRepository::subtract(&store, BatchestockId::new(), 1)
            .await
            .unwrap()
            .is_none());
        let after = BatchStocksRepository::subtract(&store, bs.id_typed(), 2).await.unwrap().unwrap();
        assert_eq!(after.quantity(), 0);
    }

    #[tokio::test]
    async fn batch_codes_are_unique_per_variant_ignoring_case() {
        let store = InMemoryPharmaStore::new();
        let variant = MedicineVariantId::new();
        let make = |code: &str| {
            Batch::create(
                BatchProps {
                    code: code.to_string(),
                    medicine_variant_id: variant,
                    manufacturer_id: ManufacturerId::new(),
                    expiration_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
                    manufacturing_date: None,
                    created_at: None,
                },
                None,
            )
            .unwrap()
        };
        BatchesRepository::create(&store, &make("ab-1")).await.unwrap();
        assert!(BatchesRepository::create(&store, &make("AB-1")).await.is_err());
        assert!(store.find_by_code(variant, " Ab-1 ").await.unwrap().is_some());
    }
}
