//! Per-contract execution accounts.
//!
//! Every `(owner, contract)` pair has an [`ExecAccount`] split into an available `balance` and a
//! `frozen` escrow. Each operation validates against the current balances before writing, so a
//! failed call leaves state untouched. A successful call returns a [`Receipt`] listing the
//! written pairs and one [`Event::ExecAccountChanged`] per touched account, in write order.

use blackwhite_types::execution::{AccountOp, Event, ExecAccount, Key, Value};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};
use thiserror::Error as ThisError;
use tracing::trace;

use crate::state::State;

#[derive(Debug, ThisError)]
pub enum LedgerError {
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("insufficient funds (available={available}, required={required})")]
    InsufficientFunds { available: u64, required: u64 },
    #[error("insufficient frozen balance (frozen={frozen}, required={required})")]
    NotFrozen { frozen: u64, required: u64 },
    #[error("balance overflow")]
    Overflow,
    #[error("source and destination are the same account")]
    SelfTransfer,
    #[error("ledger storage: {0:#}")]
    State(anyhow::Error),
}

/// Written key-values and audit logs of one successful ledger call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    pub kv: Vec<(Key, Value)>,
    pub logs: Vec<Event>,
}

pub async fn load_exec_account<S: State>(
    state: &S,
    owner: &PublicKey,
    contract: &Digest,
) -> Result<ExecAccount, LedgerError> {
    let key = Key::ExecAccount {
        owner: owner.clone(),
        contract: *contract,
    };
    match state.get(&key).await.map_err(LedgerError::State)? {
        Some(Value::ExecAccount(account)) => Ok(account),
        Some(other) => Err(LedgerError::State(anyhow::anyhow!(
            "unexpected value under exec account key: {other:?}"
        ))),
        None => Ok(ExecAccount::default()),
    }
}

/// A pending write of one account, applied only after every check in the call has passed.
struct Change {
    op: AccountOp,
    owner: PublicKey,
    prev: ExecAccount,
    current: ExecAccount,
}

async fn commit<S: State>(
    state: &mut S,
    contract: &Digest,
    changes: Vec<Change>,
) -> Result<Receipt, LedgerError> {
    let mut receipt = Receipt::default();
    for change in changes {
        let key = Key::ExecAccount {
            owner: change.owner.clone(),
            contract: *contract,
        };
        let value = Value::ExecAccount(change.current);
        state
            .insert(key.clone(), value.clone())
            .await
            .map_err(LedgerError::State)?;
        trace!(
            op = ?change.op,
            owner = ?change.owner,
            balance = change.current.balance,
            frozen = change.current.frozen,
            "exec account updated"
        );
        receipt.kv.push((key, value));
        receipt.logs.push(Event::ExecAccountChanged {
            op: change.op,
            owner: change.owner,
            contract: *contract,
            prev: change.prev,
            current: change.current,
        });
    }
    Ok(receipt)
}

fn ensure_amount(amount: u64) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

fn debit_available(account: &mut ExecAccount, amount: u64) -> Result<(), LedgerError> {
    account.balance = account
        .balance
        .checked_sub(amount)
        .ok_or(LedgerError::InsufficientFunds {
            available: account.balance,
            required: amount,
        })?;
    Ok(())
}

fn debit_frozen(account: &mut ExecAccount, amount: u64) -> Result<(), LedgerError> {
    account.frozen = account
        .frozen
        .checked_sub(amount)
        .ok_or(LedgerError::NotFrozen {
            frozen: account.frozen,
            required: amount,
        })?;
    Ok(())
}

fn credit_available(account: &mut ExecAccount, amount: u64) -> Result<(), LedgerError> {
    account.balance = account
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;
    Ok(())
}

fn credit_frozen(account: &mut ExecAccount, amount: u64) -> Result<(), LedgerError> {
    account.frozen = account
        .frozen
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;
    Ok(())
}

/// Credits available balance. Only used to fund accounts outside of game actions.
pub async fn deposit<S: State>(
    state: &mut S,
    owner: &PublicKey,
    contract: &Digest,
    amount: u64,
) -> Result<Receipt, LedgerError> {
    ensure_amount(amount)?;
    let prev = load_exec_account(state, owner, contract).await?;
    let mut current = prev;
    credit_available(&mut current, amount)?;
    let change = Change {
        op: AccountOp::Deposit,
        owner: owner.clone(),
        prev,
        current,
    };
    commit(state, contract, vec![change]).await
}

/// Moves `amount` from available to frozen.
pub async fn freeze<S: State>(
    state: &mut S,
    owner: &PublicKey,
    contract: &Digest,
    amount: u64,
) -> Result<Receipt, LedgerError> {
    ensure_amount(amount)?;
    let prev = load_exec_account(state, owner, contract).await?;
    let mut current = prev;
    debit_available(&mut current, amount)?;
    credit_frozen(&mut current, amount)?;
    let change = Change {
        op: AccountOp::Freeze,
        owner: owner.clone(),
        prev,
        current,
    };
    commit(state, contract, vec![change]).await
}

/// Moves `amount` from frozen back to available.
pub async fn unfreeze<S: State>(
    state: &mut S,
    owner: &PublicKey,
    contract: &Digest,
    amount: u64,
) -> Result<Receipt, LedgerError> {
    ensure_amount(amount)?;
    let prev = load_exec_account(state, owner, contract).await?;
    let mut current = prev;
    debit_frozen(&mut current, amount)?;
    credit_available(&mut current, amount)?;
    let change = Change {
        op: AccountOp::Unfreeze,
        owner: owner.clone(),
        prev,
        current,
    };
    commit(state, contract, vec![change]).await
}

/// Debits `from`'s frozen balance and credits `to`'s available balance.
pub async fn transfer_frozen<S: State>(
    state: &mut S,
    from: &PublicKey,
    to: &PublicKey,
    contract: &Digest,
    amount: u64,
) -> Result<Receipt, LedgerError> {
    ensure_amount(amount)?;
    if from == to {
        return Err(LedgerError::SelfTransfer);
    }
    let from_prev = load_exec_account(state, from, contract).await?;
    let to_prev = load_exec_account(state, to, contract).await?;
    let mut from_current = from_prev;
    let mut to_current = to_prev;
    debit_frozen(&mut from_current, amount)?;
    credit_available(&mut to_current, amount)?;
    let changes = vec![
        Change {
            op: AccountOp::TransferFrozen,
            owner: from.clone(),
            prev: from_prev,
            current: from_current,
        },
        Change {
            op: AccountOp::TransferFrozen,
            owner: to.clone(),
            prev: to_prev,
            current: to_current,
        },
    ];
    commit(state, contract, changes).await
}

/// Debits `from`'s available balance and credits `to`'s available balance.
pub async fn transfer<S: State>(
    state: &mut S,
    from: &PublicKey,
    to: &PublicKey,
    contract: &Digest,
    amount: u64,
) -> Result<Receipt, LedgerError> {
    ensure_amount(amount)?;
    if from == to {
        return Err(LedgerError::SelfTransfer);
    }
    let from_prev = load_exec_account(state, from, contract).await?;
    let to_prev = load_exec_account(state, to, contract).await?;
    let mut from_current = from_prev;
    let mut to_current = to_prev;
    debit_available(&mut from_current, amount)?;
    credit_available(&mut to_current, amount)?;
    let changes = vec![
        Change {
            op: AccountOp::Transfer,
            owner: from.clone(),
            prev: from_prev,
            current: from_current,
        },
        Change {
            op: AccountOp::Transfer,
            owner: to.clone(),
            prev: to_prev,
            current: to_current,
        },
    ];
    commit(state, contract, changes).await
}
