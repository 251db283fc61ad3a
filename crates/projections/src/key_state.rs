//! Running state of one (site, equipment type) balance key.

use event_store::Effect;
use serde::{Deserialize, Serialize};

/// Custody balance and outstanding allocation for one balance key.
///
/// `allocated` is a sub-ledger of `balance`: allocated stock is still held at
/// the site but checked out to personnel. A consumption draws allocated stock
/// down first, so `0 <= allocated <= balance` holds after every valid step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    pub balance: i64,
    pub allocated: i64,
}

/// How far a debit overshoots what the key can give.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub available: i64,
    pub requested: i64,
}

/// Why a key cannot absorb an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A debit larger than the stock it draws on.
    Shortfall(Shortfall),
    /// A credit that would push the balance past `i64::MAX`.
    Overflow { balance: i64, requested: i64 },
}

impl From<Shortfall> for Rejection {
    fn from(shortfall: Shortfall) -> Self {
        Rejection::Shortfall(shortfall)
    }
}

impl KeyState {
    pub fn new(balance: i64, allocated: i64) -> Self {
        Self { balance, allocated }
    }

    /// Stock at the site that is not checked out.
    pub fn available(&self) -> i64 {
        self.balance.saturating_sub(self.allocated)
    }

    /// Applies an effect without checking it. Arithmetic saturates.
    pub fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Purchase(q) | Effect::TransferIn(q) => {
                self.balance = self.balance.saturating_add(q)
            }
            Effect::TransferOut(q) => self.balance = self.balance.saturating_sub(q),
            Effect::Allocation(q) => self.allocated = self.allocated.saturating_add(q),
            Effect::Consumption(q) => {
                self.allocated -= q.min(self.allocated);
                self.balance = self.balance.saturating_sub(q);
            }
        }
    }

    pub fn applied(mut self, effect: Effect) -> Self {
        self.apply(effect);
        self
    }

    /// Checks that the key can absorb an effect.
    ///
    /// Consumption is limited by the whole balance. Allocation and
    /// transfer-out are limited by available stock. Credits pass unless the
    /// balance would overflow.
    pub fn check(&self, effect: Effect) -> Result<(), Rejection> {
        match effect {
            Effect::Consumption(q) if q > self.balance => Err(Shortfall {
                available: self.balance,
                requested: q,
            }
            .into()),
            Effect::TransferOut(q) | Effect::Allocation(q) if q > self.available() => {
                Err(Shortfall {
                    available: self.available(),
                    requested: q,
                }
                .into())
            }
            Effect::Purchase(q) | Effect::TransferIn(q) if self.balance.checked_add(q).is_none() => {
                Err(Rejection::Overflow {
                    balance: self.balance,
                    requested: q,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.balance >= 0 && self.allocated >= 0 && self.allocated <= self.balance
    }
}

/// Replays a key's effects in projection order, checking every step.
///
/// `effects[candidate]` is the effect being proposed. A failure at the
/// candidate itself reports its own shortfall. A failure at a later step means
/// the candidate starved an event that was already valid, and is reported as
/// how much of the candidate's quantity the timeline could actually absorb.
/// An overflow is reported as-is wherever it happens.
pub fn replay_checked(effects: &[Effect], candidate: usize) -> Result<KeyState, Rejection> {
    let requested = effects.get(candidate).map(Effect::quantity).unwrap_or_default();
    let mut state = KeyState::default();

    for (index, effect) in effects.iter().enumerate() {
        match state.check(*effect) {
            Ok(()) => {}
            Err(Rejection::Shortfall(shortfall)) if index > candidate => {
                let deficit = shortfall.requested - shortfall.available;
                return Err(Shortfall {
                    available: (requested - deficit).max(0),
                    requested,
                }
                .into());
            }
            Err(rejection) => return Err(rejection),
        }
        state.apply(*effect);
    }

    Ok(state)
}
