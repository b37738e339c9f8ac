use chrono::{DateTime, Utc};

use pharmastock_core::{
    BatchestockId, DomainError, DomainResult, Entity, EntryId, MedicineStockId, OperatorId,
};

use crate::movement_type::EntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineEntryProps {
    pub batchestock_id: BatchestockId,
    pub medicine_stock_id: MedicineStockId,
    pub operator_id: OperatorId,
    pub quantity: i64,
    pub entry_type: EntryType,
    pub entry_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Historical fact: `quantity` units of one batch were received into one medicine stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineEntry {
    id: EntryId,
    batchestock_id: BatchestockId,
    medicine_stock_id: MedicineStockId,
    operator_id: OperatorId,
    quantity: i64,
    entry_type: EntryType,
    entry_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl MedicineEntry {
    pub fn create(props: MedicineEntryProps, id: Option<EntryId>) -> DomainResult<Self> {
        if props.quantity <= 0 {
            return Err(DomainError::validation("entry quantity must be positive"));
        }
        let created_at = props.created_at.unwrap_or_else(Utc::now);

        Ok(Self {
            id: id.unwrap_or_default(),
            batchestock_id: props.batchestock_id,
            medicine_stock_id: props.medicine_stock_id,
            operator_id: props.operator_id,
            quantity: props.quantity,
            entry_type: props.entry_type,
            entry_date: props.entry_date.unwrap_or(created_at),
            created_at,
        })
    }

    pub fn id_typed(&self) -> EntryId {
        self.id
    }

    pub fn batchestock_id(&self) -> BatchestockId {
        self.batchestock_id
    }

    pub fn medicine_stock_id(&self) -> MedicineStockId {
        self.medicine_stock_id
    }

    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn entry_date(&self) -> DateTime<Utc> {
        self.entry_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for MedicineEntry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
