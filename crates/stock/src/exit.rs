use chrono::{DateTime, Utc};

use pharmastock_core::{
    BatchestockId, DispensationId, DomainError, DomainResult, Entity, ExitId, MedicineStockId,
    OperatorId,
};

use crate::movement_type::ExitType;

/// Construction input for [`MedicineExit`]. `exit_date` defaults to now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineExitProps {
    pub batchestock_id: BatchestockId,
    pub medicine_stock_id: MedicineStockId,
    pub operator_id: OperatorId,
    pub quantity: i64,
    pub exit_type: ExitType,
    pub exit_date: Option<DateTime<Utc>>,
    pub dispensation_id: Option<DispensationId>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Historical fact: `quantity` units of one batch left one medicine stock.
///
/// Created once per exit and never mutated; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineExit {
    id: ExitId,
    batchestock_id: BatchestockId,
    medicine_stock_id: MedicineStockId,
    operator_id: OperatorId,
    quantity: i64,
    exit_type: ExitType,
    exit_date: DateTime<Utc>,
    dispensation_id: Option<DispensationId>,
    created_at: DateTime<Utc>,
}

impl MedicineExit {
    pub fn create(props: MedicineExitProps, id: Option<ExitId>) -> DomainResult<Self> {
        if props.quantity <= 0 {
            return Err(DomainError::validation("exit quantity must be positive"));
        }
        let created_at = props.created_at.unwrap_or_else(Utc::now);

        Ok(Self {
            id: id.unwrap_or_default(),
            batchestock_id: props.batchestock_id,
            medicine_stock_id: props.medicine_stock_id,
            operator_id: props.operator_id,
            quantity: props.quantity,
            exit_type: props.exit_type,
            exit_date: props.exit_date.unwrap_or(created_at),
            dispensation_id: props.dispensation_id,
            created_at,
        })
    }

    pub fn id_typed(&self) -> ExitId {
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

    pub fn exit_type(&self) -> ExitType {
        self.exit_type
    }

    pub fn exit_date(&self) -> DateTime<Utc> {
        self.exit_date
    }

    /// Set when the exit was produced by a dispensation to a patient.
    pub fn dispensation_id(&self) -> Option<DispensationId> {
        self.dispensation_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for MedicineExit {
    type Id = ExitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(quantity: i64) -> MedicineExitProps {
        MedicineExitProps {
            batchestock_id: BatchestockId::new(),
            medicine_stock_id: MedicineStockId::new(),
            operator_id: OperatorId::new(),
            quantity,
            exit_type: ExitType::Loss,
            exit_date: None,
            dispensation_id: None,
            created_at: None,
        }
    }

    #[test]
    fn exit_date_defaults_to_creation_time() {
        let exit = MedicineExit::create(props(4), None).unwrap();
        assert_eq!(exit.exit_date(), exit.created_at());
        assert_eq!(exit.quantity(), 4);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(MedicineExit::create(props(0), None).is_err());
        assert!(MedicineExit::create(props(-1), None).is_err());
    }
}
