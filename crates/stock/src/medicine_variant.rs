use chrono::{DateTime, Utc};

use pharmastock_core::{
    DomainError, DomainResult, Entity, MedicineId, MedicineVariantId, PharmaceuticalFormId,
    UnitMeasureId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineVariantProps {
    pub medicine_id: MedicineId,
    pub dosage: String,
    pub pharmaceutical_form_id: PharmaceuticalFormId,
    pub unit_measure_id: UnitMeasureId,
    pub created_at: Option<DateTime<Utc>>,
}

/// A specific formulation / dosage / unit combination of a medicine.
///
/// Reference data: the movement flows only read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineVariant {
    id: MedicineVariantId,
    medicine_id: MedicineId,
    dosage: String,
    pharmaceutical_form_id: PharmaceuticalFormId,
    unit_measure_id: UnitMeasureId,
    created_at: DateTime<Utc>,
}

impl MedicineVariant {
    pub fn create(props: MedicineVariantProps, id: Option<MedicineVariantId>) -> DomainResult<Self> {
        if props.dosage.trim().is_empty() {
            return Err(DomainError::validation("dosage cannot be empty"));
        }

        Ok(Self {
            id: id.unwrap_or_default(),
            medicine_id: props.medicine_id,
            dosage: props.dosage.trim().to_string(),
            pharmaceutical_form_id: props.pharmaceutical_form_id,
            unit_measure_id: props.unit_measure_id,
            created_at: props.created_at.unwrap_or_else(Utc::now),
        })
    }

    pub fn id_typed(&self) -> MedicineVariantId {
        self.id
    }

    pub fn medicine_id(&self) -> MedicineId {
        self.medicine_id
    }

    pub fn dosage(&self) -> &str {
        &self.dosage
    }

    pub fn pharmaceutical_form_id(&self) -> PharmaceuticalFormId {
        self.pharmaceutical_form_id
    }

    pub fn unit_measure_id(&self) -> UnitMeasureId {
        self.unit_measure_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for MedicineVariant {
    type Id = MedicineVariantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
