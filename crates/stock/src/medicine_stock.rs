use chrono::{DateTime, Utc};

use pharmastock_core::{
    BatchestockId, DomainError, DomainResult, Entity, MedicineStockId, MedicineVariantId, StockId,
};

use crate::batch_stock::Batchestock;
use crate::quantity;

/// Construction input for [`MedicineStock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineStockProps {
    pub medicine_variant_id: MedicineVariantId,
    pub stock_id: StockId,
    pub current_quantity: i64,
    pub minimum_level: Option<i64>,
    pub batch_stock_ids: Vec<BatchestockId>,
    pub last_move: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MedicineStockProps {
    /// Props for a medicine variant received for the first time at a stock location.
    pub fn empty(medicine_variant_id: MedicineVariantId, stock_id: StockId) -> Self {
        Self {
            medicine_variant_id,
            stock_id,
            current_quantity: 0,
            minimum_level: None,
            batch_stock_ids: Vec::new(),
            last_move: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Aggregate on-hand quantity of one medicine variant at one stock location.
///
/// Holds its batch-stocks by reference. The aggregate quantity is expected to
/// equal the sum of those batch-stocks; [`MedicineStock::reconcile`] checks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineStock {
    id: MedicineStockId,
    medicine_variant_id: MedicineVariantId,
    stock_id: StockId,
    current_quantity: i64,
    minimum_level: Option<i64>,
    batch_stock_ids: Vec<BatchestockId>,
    last_move: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MedicineStock {
    pub fn create(props: MedicineStockProps, id: Option<MedicineStockId>) -> DomainResult<Self> {
        quantity::ensure_initial(props.current_quantity)?;
        if let Some(level) = props.minimum_level {
            ensure_minimum_level(level)?;
        }

        let created_at = props.created_at.unwrap_or_else(Utc::now);
        let mut batch_stock_ids: Vec<BatchestockId> = Vec::with_capacity(props.batch_stock_ids.len());
        for id in props.batch_stock_ids {
            if !batch_stock_ids.contains(&id) {
                batch_stock_ids.push(id);
            }
        }

        Ok(Self {
            id: id.unwrap_or_default(),
            medicine_variant_id: props.medicine_variant_id,
            stock_id: props.stock_id,
            current_quantity: props.current_quantity,
            minimum_level: props.minimum_level,
            batch_stock_ids,
            last_move: props.last_move,
            created_at,
            updated_at: props.updated_at.unwrap_or(created_at),
        })
    }

    pub fn id_typed(&self) -> MedicineStockId {
        self.id
    }

    pub fn medicine_variant_id(&self) -> MedicineVariantId {
        self.medicine_variant_id
    }

    pub fn stock_id(&self) -> StockId {
        self.stock_id
    }

    pub fn quantity(&self) -> i64 {
        self.current_quantity
    }

    pub fn minimum_level(&self) -> Option<i64> {
        self.minimum_level
    }

    pub fn set_minimum_level(&mut self, value: Option<i64>) -> DomainResult<()> {
        if let Some(level) = value {
            ensure_minimum_level(level)?;
        }
        self.minimum_level = value;
        self.touch(Utc::now());
        Ok(())
    }

    /// True when a reorder threshold is set and the quantity is below it.
    pub fn is_below_minimum(&self) -> bool {
        self.minimum_level
            .is_some_and(|level| self.current_quantity < level)
    }

    pub fn batch_stock_ids(&self) -> &[BatchestockId] {
        &self.batch_stock_ids
    }

    /// Reference a batch-stock from this aggregate. Adding the same id twice is a no-op.
    pub fn add_batch_stock(&mut self, batch_stock_id: BatchestockId) {
        if self.batch_stock_ids.contains(&batch_stock_id) {
            return;
        }
        self.batch_stock_ids.push(batch_stock_id);
        self.touch(Utc::now());
    }

    pub fn last_move(&self) -> Option<DateTime<Utc>> {
        self.last_move
    }

    pub fn set_last_move(&mut self, value: Option<DateTime<Utc>>) {
        self.last_move = value;
        self.touch(Utc::now());
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn replenish(&mut self, amount: i64) -> DomainResult<()> {
        self.replenish_at(amount, Utc::now())
    }

    pub fn replenish_at(&mut self, amount: i64, at: DateTime<Utc>) -> DomainResult<()> {
        self.current_quantity = quantity::replenished(self.current_quantity, amount)?;
        self.moved(at);
        Ok(())
    }

    pub fn subtract(&mut self, amount: i64) -> DomainResult<()> {
        self.subtract_at(amount, Utc::now())
    }

    pub fn subtract_at(&mut self, amount: i64, at: DateTime<Utc>) -> DomainResult<()> {
        self.current_quantity = quantity::subtracted(self.current_quantity, amount)?;
        self.moved(at);
        Ok(())
    }

    /// Verify the aggregate against its batch-stocks.
    ///
    /// Every referenced batch-stock must be present in `batches` and held at
    /// this stock location, and their quantities must add up to the aggregate.
    pub fn reconcile(&self, batches: &[Batchestock]) -> DomainResult<()> {
        let mut sum: i64 = 0;
        for id in &self.batch_stock_ids {
            let batch = batches
                .iter()
                .find(|b| b.id() == id)
                .ok_or_else(|| DomainError::invariant(format!("batch stock {id} not provided")))?;
            if batch.stock_id() != self.stock_id {
                return Err(DomainError::invariant(format!(
                    "batch stock {id} belongs to another stock location"
                )));
            }
            sum = sum
                .checked_add(batch.quantity())
                .ok_or_else(|| DomainError::invariant("quantity overflow"))?;
        }

        if sum != self.current_quantity {
            return Err(DomainError::invariant(format!(
                "medicine stock {} holds {} but its batches sum to {}",
                self.id, self.current_quantity, sum
            )));
        }
        Ok(())
    }

    fn moved(&mut self, at: DateTime<Utc>) {
        self.last_move = Some(at);
        self.touch(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

fn ensure_minimum_level(level: i64) -> DomainResult<()> {
    if level < 0 {
        return Err(DomainError::validation("minimum level cannot be negative"));
    }
    Ok(())
}

impl Entity for MedicineStock {
    type Id = MedicineStockId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_stock::BatchestockProps;
    use pharmastock_core::{BatchId, MedicineId};
    use proptest::prelude::*;

    fn medicine_stock(quantity: i64) -> MedicineStock {
        let mut props = MedicineStockProps::empty(MedicineVariantId::new(), StockId::new());
        props.current_quantity = quantity;
        MedicineStock::create(props, None).unwrap()
    }

    fn batch_at(stock_id: StockId, quantity: i64) -> Batchestock {
        Batchestock::create(
            BatchestockProps {
                stock_id,
                batch_id: BatchId::new(),
                medicine_id: MedicineId::new(),
                current_quantity: quantity,
                last_move: None,
                created_at: None,
                updated_at: None,
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn negative_initial_quantity_is_rejected() {
        let mut props = MedicineStockProps::empty(MedicineVariantId::new(), StockId::new());
        props.current_quantity = -5;
        assert!(matches!(
            MedicineStock::create(props, None),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn duplicated_batch_references_collapse_on_create() {
        let id = BatchestockId::new();
        let mut props = MedicineStockProps::empty(MedicineVariantId::new(), StockId::new());
        props.batch_stock_ids = vec![id, id];
        let ms = MedicineStock::create(props, None).unwrap();
        assert_eq!(ms.batch_stock_ids(), &[id]);
    }

    #[test]
    fn add_batch_stock_keeps_insertion_order_and_is_idempotent() {
        let mut ms = medicine_stock(0);
        let a = BatchestockId::new();
        let b = BatchestockId::new();
        ms.add_batch_stock(a);
        ms.add_batch_stock(b);
        ms.add_batch_stock(a);
        assert_eq!(ms.batch_stock_ids(), &[a, b]);
    }

    #[test]
    fn subtract_past_zero_is_rejected_and_state_kept() {
        let mut ms = medicine_stock(50);
        let before = ms.updated_at();
        assert_eq!(ms.subtract(51).unwrap_err(), DomainError::insufficient(51, 50));
        assert_eq!(ms.quantity(), 50);
        assert_eq!(ms.updated_at(), before);
    }

    #[test]
    fn below_minimum_only_when_threshold_set() {
        let mut ms = medicine_stock(5);
        assert!(!ms.is_below_minimum());
        ms.set_minimum_level(Some(6)).unwrap();
        assert!(ms.is_below_minimum());
        ms.replenish(1).unwrap();
        assert!(!ms.is_below_minimum());
        assert!(ms.set_minimum_level(Some(-1)).is_err());
    }

    #[test]
    fn reconcile_matches_sum_of_batches() {
        let mut ms = medicine_stock(0);
        let a = batch_at(ms.stock_id(), 4);
        let b = batch_at(ms.stock_id(), 6);
        ms.add_batch_stock(a.id_typed());
        ms.add_batch_stock(b.id_typed());
        ms.replenish(10).unwrap();
        ms.reconcile(&[a.clone(), b.clone()]).unwrap();

        ms.subtract(1).unwrap();
        assert!(matches!(
            ms.reconcile(&[a, b]),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn reconcile_requires_every_referenced_batch() {
        let mut ms = medicine_stock(0);
        let a = batch_at(ms.stock_id(), 0);
        ms.add_batch_stock(a.id_typed());
        ms.add_batch_stock(BatchestockId::new());
        assert!(ms.reconcile(&[a]).is_err());
    }

    #[test]
    fn reconcile_rejects_batches_from_other_locations() {
        let mut ms = medicine_stock(3);
        let foreign = batch_at(StockId::new(), 3);
        ms.add_batch_stock(foreign.id_typed());
        assert!(ms.reconcile(&[foreign]).is_err());
    }

    proptest! {
        /// Property: moving the same amounts through a batch-stock and its
        /// aggregate keeps the two levels equal.
        #[test]
        fn dual_level_movements_stay_consistent(
            initial in 0i64..1_000,
            amounts in prop::collection::vec((any::<bool>(), 1i64..200), 0..48)
        ) {
            let mut ms = medicine_stock(0);
            let mut bs = batch_at(ms.stock_id(), 0);
            ms.add_batch_stock(bs.id_typed());
            if initial > 0 {
                bs.replenish(initial).unwrap();
                ms.replenish(initial).unwrap();
            }

            for (is_entry, n) in amounts {
                if is_entry {
                    bs.replenish(n).unwrap();
                    ms.replenish(n).unwrap();
                } else if bs.subtract(n).is_ok() {
                    ms.subtract(n).unwrap();
                }
                prop_assert!(ms.quantity() >= 0);
                prop_assert!(ms.reconcile(std::slice::from_ref(&bs)).is_ok());
            }
        }
    }
}
