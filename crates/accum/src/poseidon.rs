//! Poseidon over the BN254 scalar field with the circom parameter set.
//!
//! These are the off-circuit counterparts of the circomlib `Poseidon(n)`
//! templates used by the withdrawal circuit, so every output here must match
//! the circuit bit for bit.

use std::cell::RefCell;

use light_poseidon::{Poseidon, PoseidonHasher};
use primitives::Fr;

const MAX_WIDTH: usize = 4;

thread_local! {
    /// Circom hashers are expensive to build, so each thread keeps one per width.
    static HASHERS: RefCell<[Option<Poseidon<Fr>>; MAX_WIDTH]> = RefCell::new([None, None, None, None]);
}

fn poseidon<const N: usize>(inputs: [Fr; N]) -> Fr {
    HASHERS.with(|hashers| {
        let mut hashers = hashers.borrow_mut();
        // Widths 1..=4 are always inside the circom parameter table and the
        // input count is fixed by the array length, so neither call can fail.
        let hasher = hashers[N - 1]
            .get_or_insert_with(|| Poseidon::<Fr>::new_circom(N).expect("circom parameters exist for widths 1..=12"));
        hasher.hash(&inputs).expect("input count equals hasher width")
    })
}

pub fn hash1(a: Fr) -> Fr { poseidon([a]) }

pub fn hash2(a: Fr, b: Fr) -> Fr { poseidon([a, b]) }

pub fn hash3(a: Fr, b: Fr, c: Fr) -> Fr { poseidon([a, b, c]) }

pub fn hash4(a: Fr, b: Fr, c: Fr, d: Fr) -> Fr { poseidon([a, b, c, d]) }

/// 2-to-1 compression for interior tree nodes.
pub fn compress_nodes(left: &Fr, right: &Fr) -> Fr { hash2(*left, *right) }

#[cfg(test)]
mod tests {
    use super::*;
    use primitives::field::parse_fr;

    #[test]
    fn matches_circomlibjs_vector() {
        // circomlibjs: poseidon([1, 2])
        let expected =
            parse_fr("7853200120776062878684798364095072458815029376092732009249414926327459813530").unwrap();
        assert_eq!(hash2(Fr::from(1u64), Fr::from(2u64)), expected);
    }

    #[test]
    fn cached_hashers_keep_no_state_between_calls() {
        let (a, b) = (Fr::from(5u64), Fr::from(6u64));
        let first = hash2(a, b);
        hash3(a, b, a);
        hash2(b, a);
        assert_eq!(hash2(a, b), first);
        let on_other_thread = std::thread::spawn(move || hash2(a, b)).join().unwrap();
        assert_eq!(on_other_thread, first);
    }

    #[test]
    fn arity_is_part_of_the_hash() {
        let one = Fr::from(1u64);
        assert_ne!(hash1(one), hash2(one, Fr::from(0u64)));
        assert_ne!(hash3(one, one, one), hash4(one, one, one, Fr::from(0u64)));
    }
}
