//! Wallets: a keypair plus coin selection against a ledger.

use crate::blockchain::Blockchain;
use minicoin_core::{Address, Amount, CryptoError, Keypair, TransferTransaction, TxOutput};
use thiserror::Error;

/// Errors that can occur while building a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("insufficient funds (required {required}, available {available})")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("transfer amount must be positive")]
    ZeroAmount,
}

/// A participant's wallet.
#[derive(Debug)]
pub struct Wallet {
    keypair: Keypair,
}

impl Wallet {
    /// Create a wallet with a fresh keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self::from_keypair(Keypair::generate()?))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Confirmed balance on `ledger`.
    pub fn balance(&self, ledger: &Blockchain) -> Amount {
        ledger.balance(&self.address())
    }

    /// Balance not yet committed to a pending transfer.
    pub fn spendable(&self, ledger: &Blockchain) -> Amount {
        ledger
            .spendable_outputs(&self.address())
            .iter()
            .fold(Amount::ZERO, |acc, utxo| acc.saturating_add(utxo.amount))
    }

    /// Build and sign a transfer of `amount` to `recipient`.
    ///
    /// Outputs already spent by a pending transfer are not selected. Any
    /// excess over `amount` comes back to this wallet as a change output.
    pub fn create_transfer(
        &self,
        ledger: &Blockchain,
        recipient: Address,
        amount: Amount,
    ) -> Result<TransferTransaction, WalletError> {
        if amount.is_zero() {
            return Err(WalletError::ZeroAmount);
        }

        let mut inputs = Vec::new();
        let mut gathered = Amount::ZERO;
        for utxo in ledger.spendable_outputs(&self.address()) {
            if gathered >= amount {
                break;
            }
            inputs.push(utxo.outpoint);
            gathered = gathered.saturating_add(utxo.amount);
        }

        let change = match gathered.checked_sub(amount) {
            Some(change) => change,
            None => {
                return Err(WalletError::InsufficientFunds {
                    required: amount,
                    available: gathered,
                })
            }
        };

        let mut outputs = vec![TxOutput::new(amount, recipient)];
        if !change.is_zero() {
            outputs.push(TxOutput::new(change, self.address()));
        }

        Ok(TransferTransaction::new(inputs, outputs).signed(&self.keypair))
    }
}
