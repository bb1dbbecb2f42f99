//! Immutable transaction produced by the builder
//!
//! A `Transaction` is the unit every other stage consumes: the validator and
//! optimizer inspect it, the simulator fingerprints and compiles it. Nothing
//! mutates it after construction; the `with_*` helpers consume `self` and
//! return a new value.

use crate::tx_builder::errors::TransactionBuilderError;
use sha2::{Digest, Sha256};
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    signer::Signer,
    transaction::Transaction as SolanaTransaction,
};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Account reference after union across all instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountRef {
    pub address: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountRef {
    pub fn new(address: Pubkey, is_signer: bool, is_writable: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable,
        }
    }

    /// OR the flags of another reference to the same address into this one
    fn merge(&mut self, other: &AccountRef) {
        self.is_signer |= other.is_signer;
        self.is_writable |= other.is_writable;
    }
}

impl From<&AccountMeta> for AccountRef {
    fn from(meta: &AccountMeta) -> Self {
        Self::new(meta.pubkey, meta.is_signer, meta.is_writable)
    }
}

/// Transaction assembled by [`TransactionBuilder`](crate::tx_builder::TransactionBuilder)
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    fee_payer: Option<Pubkey>,
    recent_blockhash: String,
    instructions: Vec<Instruction>,
    /// Signers declared on the builder, in declaration order (duplicates kept
    /// so the validator can report them)
    signers: Vec<Pubkey>,
    signatures: BTreeMap<Pubkey, Signature>,
}

impl Transaction {
    /// Create a transaction directly (for transactions assembled outside the builder)
    pub fn new(
        fee_payer: Option<Pubkey>,
        recent_blockhash: impl Into<String>,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            fee_payer,
            recent_blockhash: recent_blockhash.into(),
            instructions,
            signers: Vec::new(),
            signatures: BTreeMap::new(),
        }
    }

    /// Return a copy with the declared signer list replaced
    pub fn with_signers(mut self, signers: Vec<Pubkey>) -> Self {
        self.signers = signers;
        self
    }

    /// Return a copy carrying an externally produced signature
    pub fn with_signature(mut self, signer: Pubkey, signature: Signature) -> Self {
        self.signatures.insert(signer, signature);
        self
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.fee_payer.as_ref()
    }

    pub fn recent_blockhash(&self) -> &str {
        &self.recent_blockhash
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn declared_signers(&self) -> &[Pubkey] {
        &self.signers
    }

    pub fn signatures(&self) -> &BTreeMap<Pubkey, Signature> {
        &self.signatures
    }

    /// Union of every account the transaction touches, in first-appearance order
    ///
    /// Order: fee payer, then each instruction's accounts followed by its
    /// program id, then declared signers not otherwise referenced. Duplicate
    /// addresses are merged by OR-ing their signer/writable flags.
    pub fn account_refs(&self) -> Vec<AccountRef> {
        let mut refs: Vec<AccountRef> = Vec::new();
        let mut index: HashMap<Pubkey, usize> = HashMap::new();

        let mut push = |candidate: AccountRef| match index.get(&candidate.address) {
            Some(&pos) => refs[pos].merge(&candidate),
            None => {
                index.insert(candidate.address, refs.len());
                refs.push(candidate);
            }
        };

        if let Some(payer) = self.fee_payer {
            push(AccountRef::new(payer, true, true));
        }
        for ix in &self.instructions {
            for meta in &ix.accounts {
                push(AccountRef::from(meta));
            }
            push(AccountRef::new(ix.program_id, false, false));
        }
        for signer in &self.signers {
            push(AccountRef::new(*signer, true, false));
        }

        refs
    }

    /// Number of distinct addresses referenced
    pub fn unique_account_count(&self) -> usize {
        self.account_refs().len()
    }

    /// Addresses that must sign, fee payer first
    pub fn required_signers(&self) -> Vec<Pubkey> {
        self.account_refs()
            .into_iter()
            .filter(|r| r.is_signer)
            .map(|r| r.address)
            .collect()
    }

    /// Addresses that are written by at least one instruction
    pub fn writable_accounts(&self) -> Vec<Pubkey> {
        self.account_refs()
            .into_iter()
            .filter(|r| r.is_writable)
            .map(|r| r.address)
            .collect()
    }

    /// Stable content fingerprint (hex-encoded SHA-256)
    ///
    /// Covers fee payer, blockhash, every instruction (program, account flags,
    /// data) and the declared signer set. Two transactions with equal
    /// fingerprints serialize identically.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match &self.fee_payer {
            Some(payer) => {
                hasher.update([1u8]);
                hasher.update(payer.as_ref());
            }
            None => hasher.update([0u8]),
        }
        hasher.update((self.recent_blockhash.len() as u64).to_le_bytes());
        hasher.update(self.recent_blockhash.as_bytes());
        hasher.update((self.instructions.len() as u64).to_le_bytes());
        for ix in &self.instructions {
            hasher.update(ix.program_id.as_ref());
            hasher.update((ix.accounts.len() as u64).to_le_bytes());
            for meta in &ix.accounts {
                hasher.update(meta.pubkey.as_ref());
                hasher.update([meta.is_signer as u8, meta.is_writable as u8]);
            }
            hasher.update((ix.data.len() as u64).to_le_bytes());
            hasher.update(&ix.data);
        }
        hasher.update((self.signers.len() as u64).to_le_bytes());
        for signer in &self.signers {
            hasher.update(signer.as_ref());
        }
        for (signer, signature) in &self.signatures {
            hasher.update(signer.as_ref());
            hasher.update(signature.as_ref());
        }
        hex::encode(hasher.finalize())
    }

    /// Parse the stored blockhash
    pub fn blockhash(&self) -> Result<Hash, TransactionBuilderError> {
        Hash::from_str(&self.recent_blockhash).map_err(|e| {
            TransactionBuilderError::Blockhash(format!(
                "invalid blockhash '{}': {}",
                self.recent_blockhash, e
            ))
        })
    }

    /// Compile into a wire transaction for the network collaborator
    ///
    /// Stored signatures are placed at their signer positions; `signers`
    /// (if any) partially sign the remaining slots.
    pub fn to_solana_transaction(
        &self,
        signers: &[&dyn Signer],
    ) -> Result<SolanaTransaction, TransactionBuilderError> {
        let payer = self.fee_payer.ok_or_else(|| {
            TransactionBuilderError::Configuration("transaction has no fee payer".to_string())
        })?;
        let blockhash = self.blockhash()?;

        let message = Message::new_with_blockhash(&self.instructions, Some(&payer), &blockhash);
        let mut tx = SolanaTransaction::new_unsigned(message);

        let required = tx.message.header.num_required_signatures as usize;
        for (position, key) in tx.message.account_keys.iter().take(required).enumerate() {
            if let Some(signature) = self.signatures.get(key) {
                tx.signatures[position] = *signature;
            }
        }

        if !signers.is_empty() {
            tx.try_partial_sign(signers, blockhash)
                .map_err(|e| TransactionBuilderError::Signing(e.to_string()))?;
        }

        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ix(program: Pubkey, metas: Vec<AccountMeta>, data: &[u8]) -> Instruction {
        Instruction::new_with_bytes(program, data, metas)
    }

    #[test]
    fn test_account_refs_union_flags() {
        let payer = Pubkey::new_unique();
        let shared = Pubkey::new_unique();
        let program = Pubkey::new_unique();

        let tx = Transaction::new(
            Some(payer),
            Hash::default().to_string(),
            vec![
                ix(program, vec![AccountMeta::new_readonly(shared, false)], &[1]),
                ix(program, vec![AccountMeta::new(shared, true)], &[2]),
            ],
        );

        let refs = tx.account_refs();
        assert_eq!(refs.len(), 3); // payer + shared + program
        assert_eq!(refs[0], AccountRef::new(payer, true, true));
        assert_eq!(refs[1], AccountRef::new(shared, true, true));
        assert_eq!(refs[2], AccountRef::new(program, false, false));
    }

    #[test]
    fn test_fingerprint_changes_with_data() {
        let payer = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let blockhash = Hash::default().to_string();

        let a = Transaction::new(Some(payer), blockhash.clone(), vec![ix(program, vec![], &[1])]);
        let b = Transaction::new(Some(payer), blockhash.clone(), vec![ix(program, vec![], &[1])]);
        let c = Transaction::new(Some(payer), blockhash, vec![ix(program, vec![], &[2])]);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_required_signers_fee_payer_first() {
        let payer = Pubkey::new_unique();
        let cosigner = Pubkey::new_unique();
        let program = Pubkey::new_unique();

        let tx = Transaction::new(
            Some(payer),
            Hash::default().to_string(),
            vec![ix(program, vec![AccountMeta::new(cosigner, true)], &[])],
        );

        assert_eq!(tx.required_signers(), vec![payer, cosigner]);
        assert_eq!(tx.writable_accounts(), vec![payer, cosigner]);
    }

    #[test]
    fn test_compile_requires_fee_payer() {
        let tx = Transaction::new(
            None,
            Hash::default().to_string(),
            vec![ix(Pubkey::new_unique(), vec![], &[1])],
        );
        let err = tx.to_solana_transaction(&[]).unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Configuration(_)));
    }

    #[test]
    fn test_compile_rejects_bad_blockhash() {
        let tx = Transaction::new(
            Some(Pubkey::new_unique()),
            "not-a-hash",
            vec![ix(Pubkey::new_unique(), vec![], &[1])],
        );
        let err = tx.to_solana_transaction(&[]).unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Blockhash(_)));
    }

    #[test]
    fn test_compile_places_stored_signature() {
        let payer = Pubkey::new_unique();
        let signature = Signature::from([7u8; 64]);
        let tx = Transaction::new(
            Some(payer),
            Hash::default().to_string(),
            vec![ix(Pubkey::new_unique(), vec![], &[1])],
        )
        .with_signature(payer, signature);

        let compiled = tx.to_solana_transaction(&[]).expect("should compile");
        assert_eq!(compiled.signatures[0], signature);
        assert_eq!(compiled.message.account_keys[0], payer);
    }
}
