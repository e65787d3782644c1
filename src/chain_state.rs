//! Per-address coin balances derived from the chain.
//!
//! Application of a summary is all-or-nothing: the resulting map is computed
//! first and committed only if every touched balance stays non-negative.

use std::collections::BTreeMap;

use crate::error::{DevvError, DevvResult};
use crate::summary::Summary;
use crate::transaction::Transfer;
use crate::types::Address;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainState {
    balances: BTreeMap<Address, BTreeMap<u64, i64>>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, addr: &Address, coin: u64) -> i64 {
        self.balances
            .get(addr)
            .and_then(|coins| coins.get(&coin))
            .copied()
            .unwrap_or(0)
    }

    /// Seed a balance directly; genesis provisioning only.
    pub fn set_balance(&mut self, addr: Address, coin: u64, amount: i64) {
        self.balances.entry(addr).or_default().insert(coin, amount);
    }

    pub fn addr_count(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    fn applied<I>(&self, deltas: I) -> DevvResult<Self>
    where
        I: IntoIterator<Item = (Address, u64, i64)>,
    {
        let mut next = self.clone();
        for (addr, coin, delta) in deltas {
            let entry = next.balances.entry(addr).or_default().entry(coin).or_insert(0);
            *entry = entry.checked_add(delta).ok_or(DevvError::Overdraft {
                address: addr.to_string(),
                coin,
                balance: i64::MIN,
            })?;
            if *entry < 0 {
                return Err(DevvError::Overdraft {
                    address: addr.to_string(),
                    coin,
                    balance: *entry,
                });
            }
        }
        Ok(next)
    }

    /// Apply a block summary; `Overdraft` leaves the state untouched.
    pub fn apply_summary(&mut self, summary: &Summary) -> DevvResult<()> {
        *self = self.applied(summary.deltas())?;
        Ok(())
    }

    /// Invert a previously committed summary.
    pub fn unapply_summary(&mut self, summary: &Summary) -> DevvResult<()> {
        *self = self.applied(
            summary
                .deltas()
                .into_iter()
                .map(|(addr, coin, delta)| (addr, coin, -delta)),
        )?;
        Ok(())
    }

    /// Apply one transaction's transfers; all-or-nothing like summaries.
    pub fn apply_transfers(&mut self, transfers: &[Transfer]) -> DevvResult<()> {
        *self = self.applied(transfers.iter().map(|t| (t.address, t.coin, t.delta)))?;
        Ok(())
    }

    /// True if `apply_transfers` would succeed against this state.
    pub fn can_apply_transfers(&self, transfers: &[Transfer]) -> bool {
        self.applied(transfers.iter().map(|t| (t.address, t.coin, t.delta)))
            .is_ok()
    }
}
