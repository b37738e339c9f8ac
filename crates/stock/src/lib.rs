//! Stock domain module.
//!
//! Quantity entities (`Batchestock`, `MedicineStock`), the reference data they
//! point at (`Batch`, `MedicineVariant`, `Stock`) and the immutable movement
//! records (exits, entries, dispensations). Pure domain logic: no IO, no HTTP,
//! no storage.

pub mod batch;
pub mod batch_stock;
pub mod dispensation;
pub mod entry;
pub mod exit;
pub mod medicine_stock;
pub mod medicine_variant;
pub mod movement_type;
mod quantity;
pub mod stock;

pub use batch::{Batch, BatchProps};
pub use batch_stock::{Batchestock, BatchestockProps};
pub use dispensation::{Dispensation, DispensationProps};
pub use entry::{MedicineEntry, MedicineEntryProps};
pub use exit::{MedicineExit, MedicineExitProps};
pub use medicine_stock::{MedicineStock, MedicineStockProps};
pub use medicine_variant::{MedicineVariant, MedicineVariantProps};
pub use movement_type::{EntryType, ExitType};
pub use stock::{Stock, StockProps};
