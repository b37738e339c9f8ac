use chrono::{DateTime, Utc};

use pharmastock_core::{
    DispensationId, DomainError, DomainResult, Entity, ExitId, OperatorId, PatientId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispensationProps {
    pub patient_id: PatientId,
    pub operator_id: OperatorId,
    pub dispensation_date: Option<DateTime<Utc>>,
    pub exit_ids: Vec<ExitId>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Medicine handed to a patient.
///
/// The quantities live on the per-batch exits (`ExitType::Dispensation`)
/// recorded together with it; this record links them to the patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispensation {
    id: DispensationId,
    patient_id: PatientId,
    operator_id: OperatorId,
    dispensation_date: DateTime<Utc>,
    exit_ids: Vec<ExitId>,
    created_at: DateTime<Utc>,
}

impl Dispensation {
    pub fn create(props: DispensationProps, id: Option<DispensationId>) -> DomainResult<Self> {
        if props.exit_ids.is_empty() {
            return Err(DomainError::validation(
                "a dispensation must reference at least one exit",
            ));
        }
        let created_at = props.created_at.unwrap_or_else(Utc::now);

        Ok(Self {
            id: id.unwrap_or_default(),
            patient_id: props.patient_id,
            operator_id: props.operator_id,
            dispensation_date: props.dispensation_date.unwrap_or(created_at),
            exit_ids: props.exit_ids,
            created_at,
        })
    }

    pub fn id_typed(&self) -> DispensationId {
        self.id
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }

    pub fn dispensation_date(&self) -> DateTime<Utc> {
        self.dispensation_date
    }

    pub fn exit_ids(&self) -> &[ExitId] {
        &self.exit_ids
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Dispensation {
    type Id = DispensationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_at_least_one_exit() {
        let props = DispensationProps {
            patient_id: PatientId::new(),
            operator_id: OperatorId::new(),
            dispensation_date: None,
            exit_ids: vec![],
            created_at: None,
        };
        assert!(Dispensation::create(props, None).is_err());
    }
}
