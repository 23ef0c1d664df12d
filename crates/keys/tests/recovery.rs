use keys::{recover_deposits, recover_deposits_within, DepositSecrets, KeyError, MasterKeys, MAX_SEARCH_WINDOW};
use primitives::{Amount, DepositEvent, Fr, Label, Scope, TxHash};

fn keys(seed: u64) -> MasterKeys { MasterKeys::new(Fr::from(seed), Fr::from(seed * 31 + 7)).unwrap() }

/// Deposit `i` uses child index `i` and its own label, as a wallet would
/// when depositing repeatedly into one pool.
fn make_events(keys: &MasterKeys, scope: &Scope, n: u64) -> Vec<DepositEvent> {
    (0..n)
        .map(|i| {
            let label = Label::from(1_000 + i);
            let secrets = DepositSecrets::derive(keys, scope, &label, i as u32).unwrap();
            DepositEvent {
                precommitment_hash: secrets.precommitment(),
                value: Amount::from(1_000_000 * (i + 1)),
                label,
                block_number: 100 + i,
                tx_hash: TxHash([i as u8; 32]),
            }
        })
        .collect()
}

#[test]
fn recovers_every_deposit_with_value_and_label() {
    let (k, scope) = (keys(5), Scope::from(77u64));
    let events = make_events(&k, &scope, 6);
    let recovered = recover_deposits(&k, &scope, &events).unwrap();
    assert_eq!(recovered.len(), 6);
    for (i, deposit) in recovered.iter().enumerate() {
        assert_eq!(deposit.secrets.child_index, i as u32);
        assert_eq!(deposit.event, events[i]);
        assert_eq!(deposit.secrets.label, events[i].label);
        assert_eq!(deposit.value(), events[i].value);
    }
}

#[test]
fn foreign_scope_or_keys_never_match() {
    let (k, scope) = (keys(5), Scope::from(77u64));
    let events = make_events(&k, &scope, 4);
    assert!(recover_deposits(&keys(6), &scope, &events).unwrap().is_empty());
    assert!(recover_deposits(&k, &Scope::from(78u64), &events).unwrap().is_empty());
}

#[test]
fn recovery_is_idempotent_and_ignores_noise() {
    let (k, scope) = (keys(9), Scope::from(3u64));
    let mut events = make_events(&k, &scope, 3);
    events.extend(make_events(&keys(10), &scope, 3));
    events.reverse();
    let first = recover_deposits(&k, &scope, &events).unwrap();
    let second = recover_deposits(&k, &scope, &events).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert!(first.windows(2).all(|w| w[0].secrets.child_index < w[1].secrets.child_index));
}

#[test]
fn deposits_beyond_the_window_are_not_found() {
    let (k, scope) = (keys(2), Scope::from(4u64));
    let events = make_events(&k, &scope, 5);
    let recovered = recover_deposits_within(&k, &scope, &events, 3).unwrap();
    assert_eq!(recovered.len(), 3);
}

#[test]
fn duplicated_event_is_claimed_once() {
    let (k, scope) = (keys(2), Scope::from(4u64));
    let mut events = make_events(&k, &scope, 1);
    let mut replay = events[0].clone();
    replay.block_number += 10;
    events.push(replay);
    let recovered = recover_deposits(&k, &scope, &events).unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].event.block_number, 100);
}

#[test]
fn bad_arguments_fail_before_scanning() {
    let (k, scope) = (keys(2), Scope::from(4u64));
    assert_eq!(
        recover_deposits_within(&k, &scope, &[], 0),
        Err(KeyError::InvalidWindow { window: 0, max: MAX_SEARCH_WINDOW })
    );
    assert!(matches!(
        recover_deposits_within(&k, &scope, &[], MAX_SEARCH_WINDOW + 1),
        Err(KeyError::InvalidWindow { .. })
    ));
    let mut events = make_events(&k, &scope, 1);
    events[0].label = Label::default();
    assert_eq!(recover_deposits(&k, &scope, &events), Err(KeyError::ZeroLabel));
    assert!(recover_deposits(&k, &scope, &[]).unwrap().is_empty());
}
