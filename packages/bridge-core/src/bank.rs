//! Minimal multi-denom account ledger
//!
//! Stands in for the Cosmos bank module: enough to debit senders, escrow
//! into the bridge account, mint and burn vouchers and pay fee collectors.

use std::collections::BTreeMap;

use crate::error::BridgeError;

#[derive(Debug, Clone, Default)]
pub struct Bank {
    balances: BTreeMap<(String, String), u64>,
    supply: BTreeMap<String, u64>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &str, denom: &str) -> u64 {
        self.balances
            .get(&(account.to_string(), denom.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// All non-zero balances of an account
    pub fn balances(&self, account: &str) -> BTreeMap<String, u64> {
        self.balances
            .iter()
            .filter(|((owner, _), amount)| owner == account && **amount > 0)
            .map(|((_, denom), amount)| (denom.clone(), *amount))
            .collect()
    }

    /// Total amount of `denom` in existence on this chain
    pub fn supply(&self, denom: &str) -> u64 {
        self.supply.get(denom).copied().unwrap_or(0)
    }

    /// Create new coins in `account`
    pub fn mint(&mut self, account: &str, denom: &str, amount: u64) -> Result<(), BridgeError> {
        let supply = self.supply.entry(denom.to_string()).or_insert(0);
        *supply = supply.checked_add(amount).ok_or(BridgeError::Overflow)?;
        self.credit(account, denom, amount)
    }

    /// Destroy coins held by `account`
    pub fn burn(&mut self, account: &str, denom: &str, amount: u64) -> Result<(), BridgeError> {
        self.debit(account, denom, amount)?;
        let supply = self.supply.entry(denom.to_string()).or_insert(0);
        *supply = supply.saturating_sub(amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &str,
        to: &str,
        denom: &str,
        amount: u64,
    ) -> Result<(), BridgeError> {
        self.debit(from, denom, amount)?;
        self.credit(to, denom, amount)
    }

    fn credit(&mut self, account: &str, denom: &str, amount: u64) -> Result<(), BridgeError> {
        let balance = self
            .balances
            .entry((account.to_string(), denom.to_string()))
            .or_insert(0);
        *balance = balance.checked_add(amount).ok_or(BridgeError::Overflow)?;
        Ok(())
    }

    fn debit(&mut self, account: &str, denom: &str, amount: u64) -> Result<(), BridgeError> {
        let available = self.balance(account, denom);
        if available < amount {
            return Err(BridgeError::InsufficientFunds {
                account: account.to_string(),
                denom: denom.to_string(),
                needed: amount,
                available,
            });
        }
        self.balances
            .insert((account.to_string(), denom.to_string()), available - amount);
        Ok(())
    }
}
