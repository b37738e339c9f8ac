use chrono::{DateTime, NaiveDate, Utc};

use pharmastock_core::{BatchId, DomainError, DomainResult, Entity, ManufacturerId, MedicineVariantId};

/// Construction input for [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProps {
    pub code: String,
    pub medicine_variant_id: MedicineVariantId,
    pub manufacturer_id: ManufacturerId,
    pub expiration_date: NaiveDate,
    pub manufacturing_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A manufactured lot of a medicine variant, identified by its lot code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    id: BatchId,
    code: String,
    medicine_variant_id: MedicineVariantId,
    manufacturer_id: ManufacturerId,
    expiration_date: NaiveDate,
    manufacturing_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl Batch {
    pub fn create(props: BatchProps, id: Option<BatchId>) -> DomainResult<Self> {
        let code = props.code.trim().to_string();
        if code.is_empty() {
            return Err(DomainError::validation("batch code cannot be empty"));
        }
        if let Some(manufactured) = props.manufacturing_date {
            if manufactured > props.expiration_date {
                return Err(DomainError::validation(
                    "manufacturing date cannot be after expiration date",
                ));
            }
        }

        Ok(Self {
            id: id.unwrap_or_default(),
            code,
            medicine_variant_id: props.medicine_variant_id,
            manufacturer_id: props.manufacturer_id,
            expiration_date: props.expiration_date,
            manufacturing_date: props.manufacturing_date,
            created_at: props.created_at.unwrap_or_else(Utc::now),
        })
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    /// Human-readable lot code.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn medicine_variant_id(&self) -> MedicineVariantId {
        self.medicine_variant_id
    }

    pub fn manufacturer_id(&self) -> ManufacturerId {
        self.manufacturer_id
    }

    pub fn expiration_date(&self) -> NaiveDate {
        self.expiration_date
    }

    pub fn manufacturing_date(&self) -> Option<NaiveDate> {
        self.manufacturing_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// A batch is usable through its expiration day.
    pub fn is_expired_at(&self, date: NaiveDate) -> bool {
        self.expiration_date < date
    }
}

impl Entity for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(code: &str) -> BatchProps {
        BatchProps {
            code: code.to_string(),
            medicine_variant_id: MedicineVariantId::new(),
            manufacturer_id: ManufacturerId::new(),
            expiration_date: NaiveDate::from_ymd_opt(2027, 3, 31).unwrap(),
            manufacturing_date: NaiveDate::from_ymd_opt(2025, 3, 31),
            created_at: None,
        }
    }

    #[test]
    fn code_is_trimmed_and_required() {
        assert_eq!(Batch::create(props("  L-001 "), None).unwrap().code(), "L-001");
        assert!(Batch::create(props("   "), None).is_err());
    }

    #[test]
    fn manufacturing_after_expiration_is_rejected() {
        let mut p = props("L-002");
        p.manufacturing_date = NaiveDate::from_ymd_opt(2028, 1, 1);
        assert!(matches!(Batch::create(p, None), Err(DomainError::Validation(_))));
    }

    #[test]
    fn expiration_day_is_still_valid() {
        let batch = Batch::create(props("L-003"), None).unwrap();
        assert!(!batch.is_expired_at(NaiveDate::from_ymd_opt(2027, 3, 31).unwrap()));
        assert!(batch.is_expired_at(NaiveDate::from_ymd_opt(2027, 4, 1).unwrap()));
    }
}
