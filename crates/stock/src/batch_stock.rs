use chrono::{DateTime, Utc};

use pharmastock_core::{BatchId, BatchestockId, DomainResult, Entity, MedicineId, StockId};

use crate::quantity;

/// Construction input for [`Batchestock`].
///
/// `created_at` defaults to now when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchestockProps {
    pub stock_id: StockId,
    pub batch_id: BatchId,
    pub medicine_id: MedicineId,
    pub current_quantity: i64,
    pub last_move: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Quantity of one batch held at one stock location.
///
/// The quantity is only changed through [`Batchestock::replenish`] and
/// [`Batchestock::subtract`]; it can never become negative. A batch-stock that
/// reaches zero stays around as a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batchestock {
    id: BatchestockId,
    stock_id: StockId,
    batch_id: BatchId,
    medicine_id: MedicineId,
    current_quantity: i64,
    last_move: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl Batchestock {
    /// Build a batch-stock. A negative initial quantity is rejected.
    pub fn create(props: BatchestockProps, id: Option<BatchestockId>) -> DomainResult<Self> {
        quantity::ensure_initial(props.current_quantity)?;

        Ok(Self {
            id: id.unwrap_or_default(),
            stock_id: props.stock_id,
            batch_id: props.batch_id,
            medicine_id: props.medicine_id,
            current_quantity: props.current_quantity,
            last_move: props.last_move,
            created_at: props.created_at.unwrap_or_else(Utc::now),
            updated_at: props.updated_at,
        })
    }

    pub fn id_typed(&self) -> BatchestockId {
        self.id
    }

    pub fn stock_id(&self) -> StockId {
        self.stock_id
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn medicine_id(&self) -> MedicineId {
        self.medicine_id
    }

    pub fn quantity(&self) -> i64 {
        self.current_quantity
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

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn replenish(&mut self, amount: i64) -> DomainResult<()> {
        self.replenish_at(amount, Utc::now())
    }

    /// Add `amount` units, recording `at` as the last movement.
    pub fn replenish_at(&mut self, amount: i64, at: DateTime<Utc>) -> DomainResult<()> {
        self.current_quantity = quantity::replenished(self.current_quantity, amount)?;
        self.moved(at);
        Ok(())
    }

    pub fn subtract(&mut self, amount: i64) -> DomainResult<()> {
        self.subtract_at(amount, Utc::now())
    }

    /// Remove `amount` units, recording `at` as the last movement.
    ///
    /// Fails with `InsufficientQuantity` when `amount` exceeds the current
    /// quantity; the entity is left untouched in that case.
    pub fn subtract_at(&mut self, amount: i64, at: DateTime<Utc>) -> DomainResult<()> {
        self.current_quantity = quantity::subtracted(self.current_quantity, amount)?;
        self.moved(at);
        Ok(())
    }

    fn moved(&mut self, at: DateTime<Utc>) {
        self.last_move = Some(at);
        self.touch(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

impl Entity for Batchestock {
    type Id = BatchestockId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmastock_core::DomainError;
    use proptest::prelude::*;

    fn batch_stock(quantity: i64) -> DomainResult<Batchestock> {
        Batchestock::create(
            BatchestockProps {
                stock_id: StockId::new(),
                batch_id: BatchId::new(),
                medicine_id: MedicineId::new(),
                current_quantity: quantity,
                last_move: None,
                created_at: None,
                updated_at: None,
            },
            None,
        )
    }

    #[test]
    fn negative_initial_quantity_is_rejected() {
        let err = batch_stock(-1).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn zero_initial_quantity_is_allowed() {
        let bs = batch_stock(0).unwrap();
        assert_eq!(bs.quantity(), 0);
        assert!(bs.updated_at().is_none());
    }

    #[test]
    fn explicit_id_is_kept() {
        let id = BatchestockId::new();
        let bs = Batchestock::create(
            BatchestockProps {
                stock_id: StockId::new(),
                batch_id: BatchId::new(),
                medicine_id: MedicineId::new(),
                current_quantity: 3,
                last_move: None,
                created_at: None,
                updated_at: None,
            },
            Some(id),
        )
        .unwrap();
        assert_eq!(bs.id_typed(), id);
    }

    #[test]
    fn subtract_more_than_held_leaves_quantity_unchanged() {
        let mut bs = batch_stock(10).unwrap();
        let err = bs.subtract(15).unwrap_err();
        assert_eq!(err, DomainError::insufficient(15, 10));
        assert_eq!(bs.quantity(), 10);
        assert!(bs.last_move().is_none());
    }

    #[test]
    fn mutations_record_the_movement_instant() {
        let mut bs = batch_stock(10).unwrap();
        let at = Utc::now();
        bs.subtract_at(4, at).unwrap();
        assert_eq!(bs.quantity(), 6);
        assert_eq!(bs.last_move(), Some(at));
        assert_eq!(bs.updated_at(), Some(at));

        bs.replenish(2).unwrap();
        assert_eq!(bs.quantity(), 8);
    }

    #[test]
    fn setting_last_move_touches_updated_at() {
        let mut bs = batch_stock(1).unwrap();
        bs.set_last_move(None);
        assert!(bs.updated_at().is_some());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Replenish(i64),
        Subtract(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..500).prop_map(Op::Replenish),
            (1i64..500).prop_map(Op::Subtract),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever the sequence of movements, the quantity never goes
        /// negative and a rejected subtract changes nothing.
        #[test]
        fn quantity_never_goes_negative(
            initial in 0i64..1_000,
            ops in prop::collection::vec(op(), 0..64)
        ) {
            let mut bs = batch_stock(initial).unwrap();
            let mut expected = initial;

            for op in ops {
                match op {
                    Op::Replenish(n) => {
                        bs.replenish(n).unwrap();
                        expected += n;
                    }
                    Op::Subtract(n) => {
                        let before = bs.quantity();
                        match bs.subtract(n) {
                            Ok(()) => expected -= n,
                            Err(_) => prop_assert_eq!(bs.quantity(), before),
                        }
                    }
                }
                prop_assert!(bs.quantity() >= 0);
                prop_assert_eq!(bs.quantity(), expected);
            }
        }
    }
}
