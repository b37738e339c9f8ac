//! Movement classifications.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use pharmastock_core::DomainError;

/// Why stock left a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    Dispensation,
    Expiration,
    Loss,
    Transfer,
    Donation,
    Other,
}

impl ExitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitType::Dispensation => "dispensation",
            ExitType::Expiration => "expiration",
            ExitType::Loss => "loss",
            ExitType::Transfer => "transfer",
            ExitType::Donation => "donation",
            ExitType::Other => "other",
        }
    }
}

impl FromStr for ExitType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispensation" => Ok(ExitType::Dispensation),
            "expiration" => Ok(ExitType::Expiration),
            "loss" => Ok(ExitType::Loss),
            "transfer" => Ok(ExitType::Transfer),
            "donation" => Ok(ExitType::Donation),
            "other" => Ok(ExitType::Other),
            _ => Err(DomainError::validation(format!("unknown exit type '{s}'"))),
        }
    }
}

/// Where incoming stock came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Purchase,
    Donation,
    Transfer,
    Other,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Purchase => "purchase",
            EntryType::Donation => "donation",
            EntryType::Transfer => "transfer",
            EntryType::Other => "other",
        }
    }
}

impl FromStr for EntryType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(EntryType::Purchase),
            "donation" => Ok(EntryType::Donation),
            "transfer" => Ok(EntryType::Transfer),
            "other" => Ok(EntryType::Other),
            _ => Err(DomainError::validation(format!("unknown entry type '{s}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_type_strings_parse_back() {
        for t in [
            ExitType::Dispensation,
            ExitType::Expiration,
            ExitType::Loss,
            ExitType::Transfer,
            ExitType::Donation,
            ExitType::Other,
        ] {
            assert_eq!(t.as_str().parse::<ExitType>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_entry_type_is_a_validation_error() {
        assert!(matches!(
            "stolen".parse::<EntryType>(),
            Err(DomainError::Validation(_))
        ));
    }
}
