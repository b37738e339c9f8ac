//! `pharmastock-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error model and the entity trait.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    BatchId, BatchestockId, DispensationId, EntryId, ExitId, InstitutionId, ManufacturerId,
    MedicineId, MedicineStockId, MedicineVariantId, OperatorId, PatientId,
    PharmaceuticalFormId, StockId, UnitMeasureId,
};
