//! Guarded arithmetic shared by the two quantity levels.

use pharmastock_core::{DomainError, DomainResult};

pub(crate) fn ensure_initial(quantity: i64) -> DomainResult<()> {
    if quantity < 0 {
        return Err(DomainError::validation(format!(
            "initial quantity cannot be negative (got {quantity})"
        )));
    }
    Ok(())
}

pub(crate) fn ensure_positive_amount(amount: i64) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::validation(format!(
            "movement amount must be positive (got {amount})"
        )));
    }
    Ok(())
}

pub(crate) fn replenished(current: i64, amount: i64) -> DomainResult<i64> {
    ensure_positive_amount(amount)?;
    current
        .checked_add(amount)
        .ok_or_else(|| DomainError::invariant("quantity overflow"))
}

pub(crate) fn subtracted(current: i64, amount: i64) -> DomainResult<i64> {
    ensure_positive_amount(amount)?;
    if amount > current {
        return Err(DomainError::insufficient(amount, current));
    }
    Ok(current - amount)
}
