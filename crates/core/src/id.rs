//! Strongly-typed identifiers used across the domain.
//!
//! Entities reference each other by id only; a `Batchestock` never embeds its
//! `Batch`, it holds a `BatchId`.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_newtype!(
    /// Stock location (a physical place holding inventory).
    StockId,
    "StockId"
);
uuid_newtype!(InstitutionId, "InstitutionId");
uuid_newtype!(
    /// Manufactured lot of a medicine variant.
    BatchId,
    "BatchId"
);
uuid_newtype!(
    /// Quantity of one batch held at one stock location.
    BatchestockId,
    "BatchestockId"
);
uuid_newtype!(MedicineId, "MedicineId");
uuid_newtype!(MedicineVariantId, "MedicineVariantId");
uuid_newtype!(
    /// Aggregate quantity of one medicine variant at one stock location.
    MedicineStockId,
    "MedicineStockId"
);
uuid_newtype!(ManufacturerId, "ManufacturerId");
uuid_newtype!(PharmaceuticalFormId, "PharmaceuticalFormId");
uuid_newtype!(UnitMeasureId, "UnitMeasureId");
uuid_newtype!(
    /// Actor performing a movement.
    OperatorId,
    "OperatorId"
);
uuid_newtype!(PatientId, "PatientId");
uuid_newtype!(ExitId, "ExitId");
uuid_newtype!(EntryId, "EntryId");
uuid_newtype!(DispensationId, "DispensationId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_uuid() {
        let raw = "0190a5b8-6f5e-7c3a-9a47-1d2f3e4a5b6c";
        let id: BatchestockId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn rejects_garbage_with_type_name() {
        let err = "not-a-uuid".parse::<StockId>().unwrap_err();
        match err {
            DomainError::InvalidId(msg) => assert!(msg.starts_with("StockId")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn new_ids_are_distinct() {
        assert_ne!(ExitId::new(), ExitId::new());
    }
}
