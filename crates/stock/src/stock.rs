use chrono::{DateTime, Utc};

use pharmastock_core::{DomainError, DomainResult, Entity, InstitutionId, StockId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockProps {
    pub name: String,
    pub institution_id: InstitutionId,
    pub status: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Stock location: an institution-owned place where inventory is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stock {
    id: StockId,
    name: String,
    institution_id: InstitutionId,
    status: bool,
    created_at: DateTime<Utc>,
}

impl Stock {
    pub fn create(props: StockProps, id: Option<StockId>) -> DomainResult<Self> {
        let name = props.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("stock name cannot be empty"));
        }

        Ok(Self {
            id: id.unwrap_or_default(),
            name,
            institution_id: props.institution_id,
            status: props.status,
            created_at: props.created_at.unwrap_or_else(Utc::now),
        })
    }

    pub fn id_typed(&self) -> StockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn institution_id(&self) -> InstitutionId {
        self.institution_id
    }

    /// Whether the location is active.
    pub fn status(&self) -> bool {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Stock {
    type Id = StockId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
