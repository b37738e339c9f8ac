//! Storage for stock locations, batches, quantities and movement history.
//!
//! Two adapters implement every trait: an in-memory one for tests and local
//! runs, and a Postgres one.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryPharmaStore;
pub use postgres::PostgresPharmaStore;
pub use r#trait::{
    BatchStocksRepository, BatchesRepository, DispensationsRepository, EntryCommit, EntryFilter,
    ExitFilter, MedicinesEntriesRepository, MedicinesExitsRepository, MedicinesStockRepository,
    MedicinesVariantsRepository, Meta, MovementApplyError, Page, Pagination, PharmaStore,
    RepositoryError, StockMovementStore, StocksRepository,
};
