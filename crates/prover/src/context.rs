//! Withdrawal context binding.
//!
//! The pool contract recomputes `keccak256(abi.encode(withdrawal, scope)) % p`
//! and compares it with the proof's context signal, so the processor and its
//! calldata cannot be swapped after proving.

use primitives::field::fr_reduce_be;
use primitives::{Address, Fr, Scope};
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

/// Target of a withdrawal: the contract allowed to process it and the opaque
/// data it receives (relay fee recipient, fee rate and so on).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Withdrawal {
    pub processooor: Address,
    pub data: Vec<u8>,
}

impl Withdrawal {
    pub fn new(processooor: Address, data: Vec<u8>) -> Self { Self { processooor, data } }

    /// `abi.encode(withdrawal, scope)` where the withdrawal is the dynamic
    /// tuple `(address, bytes)`.
    pub fn abi_encode(&self, scope: &Scope) -> Vec<u8> {
        let padded = self.data.len().div_ceil(WORD) * WORD;
        let mut out = Vec::with_capacity(5 * WORD + padded);
        push_usize(2 * WORD, &mut out);
        out.extend_from_slice(&scope.to_be_bytes());

        let mut address = [0u8; WORD];
        address[WORD - self.processooor.0.len()..].copy_from_slice(&self.processooor.0);
        out.extend_from_slice(&address);
        push_usize(2 * WORD, &mut out);
        push_usize(self.data.len(), &mut out);
        out.extend_from_slice(&self.data);
        out.resize(5 * WORD + padded, 0);
        out
    }

    pub fn context(&self, scope: &Scope) -> Fr { compute_context(self, scope) }
}

fn push_usize(v: usize, out: &mut Vec<u8>) {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(v as u64).to_be_bytes());
    out.extend_from_slice(&word);
}

pub fn compute_context(withdrawal: &Withdrawal, scope: &Scope) -> Fr {
    let digest = Keccak256::digest(withdrawal.abi_encode(scope));
    fr_reduce_be(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_layout_matches_abi() {
        let w = Withdrawal::new(Address([0x11; 20]), vec![0xaa; 33]);
        let enc = w.abi_encode(&Scope::from(5u64));
        assert_eq!(enc.len(), 5 * 32 + 64);
        assert_eq!(enc[31], 0x40);
        assert_eq!(enc[63], 5);
        assert_eq!(&enc[64..76], &[0u8; 12]);
        assert_eq!(&enc[76..96], &[0x11; 20]);
        assert_eq!(enc[127], 0x40);
        assert_eq!(enc[159], 33);
        assert_eq!(&enc[160..193], &[0xaa; 33][..]);
        assert!(enc[193..].iter().all(|b| *b == 0));
    }

    #[test]
    fn empty_data_has_no_tail_words() {
        let enc = Withdrawal::new(Address([1; 20]), Vec::new()).abi_encode(&Scope::from(1u64));
        assert_eq!(enc.len(), 5 * 32);
    }

    #[test]
    fn context_binds_every_field() {
        let scope = Scope::from(9u64);
        let base = Withdrawal::new(Address([1; 20]), vec![1, 2, 3]);
        let other_processor = Withdrawal::new(Address([2; 20]), vec![1, 2, 3]);
        let other_data = Withdrawal::new(Address([1; 20]), vec![1, 2, 4]);
        let ctx = base.context(&scope);
        assert_ne!(ctx, other_processor.context(&scope));
        assert_ne!(ctx, other_data.context(&scope));
        assert_ne!(ctx, base.context(&Scope::from(10u64)));
        assert_eq!(ctx, compute_context(&base, &scope));
    }
}
