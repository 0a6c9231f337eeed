//! Seller balance ledger
//!
//! Pure arithmetic over a seller's balance fields. Nothing in here touches
//! storage: callers load a [`SellerBalance`], apply a [`LedgerOperation`] and
//! persist the returned value in the same transaction as the change that
//! triggered it.
//!
//! `withdrawable_balance` is always recomputed from the other fields, never
//! adjusted on its own.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of decimal places money is kept at.
pub const MONEY_SCALE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient withdrawable balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("amount {requested} exceeds pending balance {pending}")]
    InsufficientPending { pending: Decimal, requested: Decimal },

    #[error("amount {requested} exceeds locked balance {locked}")]
    InsufficientLocked { locked: Decimal, requested: Decimal },

    #[error("ledger amounts must be positive, got {amount}")]
    NonPositiveAmount { amount: Decimal },

    #[error("balance invariant violated: {details}")]
    InvariantViolation { details: String },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Balance fields of a single seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerBalance {
    pub balance: Decimal,
    pub pending_balance: Decimal,
    pub locked_balance: Decimal,
    pub withdrawable_balance: Decimal,
    pub total_withdrawn: Decimal,
}

impl Default for SellerBalance {
    fn default() -> Self {
        Self::empty()
    }
}

impl SellerBalance {
    pub fn empty() -> Self {
        Self {
            balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            locked_balance: Decimal::ZERO,
            withdrawable_balance: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
        }
    }

    /// Rebuild a balance from stored fields, validating the invariant.
    ///
    /// The stored withdrawable value is ignored and recomputed.
    pub fn from_parts(
        balance: Decimal,
        pending_balance: Decimal,
        locked_balance: Decimal,
        total_withdrawn: Decimal,
    ) -> LedgerResult<Self> {
        let candidate = Self {
            balance,
            pending_balance,
            locked_balance,
            withdrawable_balance: Decimal::ZERO,
            total_withdrawn,
        }
        .recomputed();
        candidate.check_invariant()?;
        Ok(candidate)
    }

    pub fn available(&self) -> Decimal {
        (self.balance - self.locked_balance - self.pending_balance).max(Decimal::ZERO)
    }

    fn recomputed(mut self) -> Self {
        self.withdrawable_balance = self.available();
        self
    }

    pub fn check_invariant(&self) -> LedgerResult<()> {
        if self.balance < Decimal::ZERO
            || self.pending_balance < Decimal::ZERO
            || self.locked_balance < Decimal::ZERO
            || self.total_withdrawn < Decimal::ZERO
        {
            return Err(LedgerError::InvariantViolation {
                details: format!("negative field in {:?}", self),
            });
        }
        if self.balance < self.locked_balance + self.pending_balance {
            return Err(LedgerError::InvariantViolation {
                details: format!(
                    "balance {} < locked {} + pending {}",
                    self.balance, self.locked_balance, self.pending_balance
                ),
            });
        }
        if self.withdrawable_balance != self.available() {
            return Err(LedgerError::InvariantViolation {
                details: format!(
                    "withdrawable {} drifted from {}",
                    self.withdrawable_balance,
                    self.available()
                ),
            });
        }
        Ok(())
    }

    /// Move funds from withdrawable into pending for a new withdrawal.
    pub fn reserve(&self, amount: Decimal) -> LedgerResult<Self> {
        let amount = normalize(amount)?;
        let available = self.available();
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        self.commit(Self {
            pending_balance: self.pending_balance + amount,
            ..*self
        })
    }

    /// Funds left the platform. The only operation that reduces `balance`.
    pub fn finalize(&self, amount: Decimal) -> LedgerResult<Self> {
        let amount = normalize(amount)?;
        self.ensure_pending(amount)?;
        self.commit(Self {
            balance: self.balance - amount,
            pending_balance: self.pending_balance - amount,
            total_withdrawn: self.total_withdrawn + amount,
            ..*self
        })
    }

    /// Return reserved funds to withdrawable after a failed or cancelled payout.
    pub fn release(&self, amount: Decimal) -> LedgerResult<Self> {
        let amount = normalize(amount)?;
        self.ensure_pending(amount)?;
        self.commit(Self {
            pending_balance: self.pending_balance - amount,
            ..*self
        })
    }

    /// Freeze funds for a dispute. Only withdrawable funds can be locked;
    /// funds already reserved for a withdrawal are left alone.
    pub fn lock(&self, amount: Decimal) -> LedgerResult<Self> {
        let amount = normalize(amount)?;
        let available = self.available();
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        self.commit(Self {
            locked_balance: self.locked_balance + amount,
            ..*self
        })
    }

    pub fn unlock(&self, amount: Decimal) -> LedgerResult<Self> {
        let amount = normalize(amount)?;
        if amount > self.locked_balance {
            return Err(LedgerError::InsufficientLocked {
                locked: self.locked_balance,
                requested: amount,
            });
        }
        self.commit(Self {
            locked_balance: self.locked_balance - amount,
            ..*self
        })
    }

    /// Order earnings landing on the seller's balance.
    pub fn credit(&self, amount: Decimal) -> LedgerResult<Self> {
        let amount = normalize(amount)?;
        self.commit(Self {
            balance: self.balance + amount,
            ..*self
        })
    }

    pub fn apply(&self, operation: LedgerOperation) -> LedgerResult<Self> {
        match operation {
            LedgerOperation::Credit(amount) => self.credit(amount),
            LedgerOperation::Reserve(amount) => self.reserve(amount),
            LedgerOperation::Finalize(amount) => self.finalize(amount),
            LedgerOperation::Release(amount) => self.release(amount),
            LedgerOperation::Lock(amount) => self.lock(amount),
            LedgerOperation::Unlock(amount) => self.unlock(amount),
        }
    }

    fn ensure_pending(&self, amount: Decimal) -> LedgerResult<()> {
        if amount > self.pending_balance {
            return Err(LedgerError::InsufficientPending {
                pending: self.pending_balance,
                requested: amount,
            });
        }
        Ok(())
    }

    fn commit(&self, next: Self) -> LedgerResult<Self> {
        let next = next.recomputed();
        next.check_invariant()?;
        Ok(next)
    }
}

/// A single balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "amount", rename_all = "snake_case")]
pub enum LedgerOperation {
    Credit(Decimal),
    Reserve(Decimal),
    Finalize(Decimal),
    Release(Decimal),
    Lock(Decimal),
    Unlock(Decimal),
}

impl LedgerOperation {
    pub fn amount(&self) -> Decimal {
        match *self {
            LedgerOperation::Credit(a)
            | LedgerOperation::Reserve(a)
            | LedgerOperation::Finalize(a)
            | LedgerOperation::Release(a)
            | LedgerOperation::Lock(a)
            | LedgerOperation::Unlock(a) => a,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerOperation::Credit(_) => "credit",
            LedgerOperation::Reserve(_) => "reserve",
            LedgerOperation::Finalize(_) => "finalize",
            LedgerOperation::Release(_) => "release",
            LedgerOperation::Lock(_) => "lock",
            LedgerOperation::Unlock(_) => "unlock",
        }
    }
}

/// Round to money scale and reject zero or negative amounts.
pub fn normalize(amount: Decimal) -> LedgerResult<Decimal> {
    let amount = amount.round_dp(MONEY_SCALE);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount { amount });
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn funded(amount: i64) -> SellerBalance {
        SellerBalance::empty().credit(d(amount)).unwrap()
    }

    #[test]
    fn reserve_moves_funds_into_pending() {
        let after = funded(500).reserve(d(200)).unwrap();
        assert_eq!(after.balance, d(500));
        assert_eq!(after.pending_balance, d(200));
        assert_eq!(after.withdrawable_balance, d(300));
    }

    #[test]
    fn reserve_beyond_withdrawable_is_rejected() {
        let balance = funded(500).lock(d(100)).unwrap();
        let err = balance.reserve(d(450)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                available: d(400),
                requested: d(450)
            }
        );
    }

    #[test]
    fn finalize_is_the_only_balance_reduction() {
        let after = funded(500).reserve(d(200)).unwrap().finalize(d(200)).unwrap();
        assert_eq!(after.balance, d(300));
        assert_eq!(after.pending_balance, Decimal::ZERO);
        assert_eq!(after.withdrawable_balance, d(300));
        assert_eq!(after.total_withdrawn, d(200));
    }

    #[test]
    fn release_restores_pre_request_state() {
        let before = funded(500);
        let after = before.reserve(d(100)).unwrap().release(d(100)).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn finalize_and_release_need_pending_funds() {
        let balance = funded(500).reserve(d(50)).unwrap();
        assert!(matches!(
            balance.finalize(d(60)),
            Err(LedgerError::InsufficientPending { .. })
        ));
        assert!(matches!(
            balance.release(d(60)),
            Err(LedgerError::InsufficientPending { .. })
        ));
    }

    #[test]
    fn lock_does_not_touch_reserved_funds() {
        let balance = funded(500).reserve(d(400)).unwrap();
        assert!(matches!(
            balance.lock(d(200)),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        let locked = balance.lock(d(100)).unwrap();
        assert_eq!(locked.withdrawable_balance, Decimal::ZERO);
        assert_eq!(locked.pending_balance, d(400));
    }

    #[test]
    fn unlock_is_bounded_by_locked_balance() {
        let balance = funded(100).lock(d(40)).unwrap();
        assert!(matches!(
            balance.unlock(d(41)),
            Err(LedgerError::InsufficientLocked { .. })
        ));
        assert_eq!(balance.unlock(d(40)).unwrap().withdrawable_balance, d(100));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(matches!(
            funded(10).reserve(Decimal::ZERO),
            Err(LedgerError::NonPositiveAmount { .. })
        ));
        assert!(matches!(
            funded(10).credit(d(-5)),
            Err(LedgerError::NonPositiveAmount { .. })
        ));
    }

    #[test]
    fn from_parts_recomputes_and_validates() {
        let balance = SellerBalance::from_parts(d(100), d(30), d(20), d(0)).unwrap();
        assert_eq!(balance.withdrawable_balance, d(50));

        assert!(SellerBalance::from_parts(d(10), d(30), d(0), d(0)).is_err());
    }

    #[test]
    fn invariant_holds_across_a_sequence() {
        let ops = [
            LedgerOperation::Credit(d(1000)),
            LedgerOperation::Reserve(d(250)),
            LedgerOperation::Lock(d(300)),
            LedgerOperation::Finalize(d(250)),
            LedgerOperation::Reserve(d(400)),
            LedgerOperation::Unlock(d(300)),
            LedgerOperation::Release(d(400)),
        ];
        let mut balance = SellerBalance::empty();
        for op in ops {
            balance = balance.apply(op).unwrap();
            balance.check_invariant().unwrap();
        }
        assert_eq!(balance.balance, d(750));
        assert_eq!(balance.withdrawable_balance, d(750));
        assert_eq!(balance.total_withdrawn, d(250));
    }
}
