use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use accum::{IncrementalMerkleTree, LeanTree};
use async_trait::async_trait;
use keys::{commitment, nullifier_hash, precommitment, DepositSecrets, MasterKeys};
use primitives::{Address, Amount, Commitment, Fr, Label, NullifierHash, Root, Scope, SpendInfo, TxHash, TxInfo, U256};
use prover::inputs::signals;
use prover::{
    BackendProof, CircuitInputs, Groth16Proof, ProofError, ProofStage, ProvingBackend, TreeKind, TreeView, Withdrawal,
    WithdrawalPipeline, WithdrawalRequest, CIRCUIT_VERSION,
};
use sync::{LookupError, SpendLookup, UnspentDeposit};

const CHAIN_ID: u64 = 1;

fn keys() -> MasterKeys { MasterKeys::new(Fr::from(77u64), Fr::from(99u64)).unwrap() }

fn scope() -> Scope { Scope::from(5u64) }

fn label() -> Label { Label::from(4242u64) }

fn deposit(value: u64) -> UnspentDeposit {
    let secrets = DepositSecrets::derive(&keys(), &scope(), &label(), 0).unwrap();
    let value = Amount::from(value);
    UnspentDeposit { secrets, value, commitment: secrets.commitment(&value).unwrap(), nullifier_hash: secrets.nullifier_hash() }
}

struct Pool {
    state: LeanTree,
    asp: LeanTree,
}

impl Pool {
    fn with(deposit: &UnspentDeposit) -> Self {
        let state = LeanTree::from_leaves(&[Fr::from(11u64), deposit.commitment.0, Fr::from(13u64)]).unwrap();
        let asp = LeanTree::from_leaves(&[Fr::from(1u64), label().0]).unwrap();
        Self { state, asp }
    }

    fn state_view(&self) -> TreeView<'_> { TreeView::new(&self.state, self.state.root()) }

    fn asp_view(&self) -> TreeView<'_> { TreeView::new(&self.asp, self.asp.root()) }
}

fn request(deposit: UnspentDeposit, withdrawn: u64) -> WithdrawalRequest {
    WithdrawalRequest {
        deposit,
        withdrawn_value: Amount::from(withdrawn),
        withdrawal: Withdrawal::new(Address([0xee; 20]), vec![1, 2, 3]),
        scope: scope(),
    }
}

#[derive(Default)]
struct Lookup {
    spent: HashSet<NullifierHash>,
    calls: AtomicUsize,
}

#[async_trait]
impl SpendLookup for Lookup {
    async fn spend_info(&self, nullifier_hash: NullifierHash, chain_id: u64) -> Result<SpendInfo, LookupError> {
        assert_eq!(chain_id, CHAIN_ID);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.spent.contains(&nullifier_hash) {
            return Ok(SpendInfo::Unspent);
        }
        Ok(SpendInfo::SpentByWithdrawal {
            recipient: Address([1; 20]),
            gross_value: Amount::from(1u64),
            fee_amount: Amount::ZERO,
            new_commitment: Commitment::default(),
            tx_info: TxInfo { tx_hash: TxHash([2; 32]), block_number: 9, timestamp: None },
        })
    }
}

fn dummy_proof() -> Groth16Proof {
    let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
    Groth16Proof {
        pi_a: s(&["1", "2", "1"]),
        pi_b: vec![s(&["3", "4"]), s(&["5", "6"]), s(&["1", "0"])],
        pi_c: s(&["7", "8", "1"]),
        protocol: Some("groth16".into()),
        curve: Some("bn128".into()),
    }
}

/// Computes the public signals the circuit would output.
fn native_signals(inputs: &CircuitInputs) -> Vec<Fr> {
    let remaining = inputs.existing_value.checked_sub(inputs.withdrawn_value).unwrap();
    let new_commitment = commitment(&remaining, &inputs.label, &precommitment(&inputs.new_nullifier, &inputs.new_secret)).unwrap();
    vec![
        new_commitment.0,
        nullifier_hash(&inputs.existing_nullifier).0,
        inputs.withdrawn_value.to_field().unwrap(),
        inputs.state_root.0,
        Fr::from(inputs.state_tree_depth as u64),
        inputs.asp_root.0,
        Fr::from(inputs.asp_tree_depth as u64),
        inputs.context,
    ]
}

#[derive(Default)]
struct NativeBackend {
    proofs: AtomicUsize,
    tamper: Option<usize>,
}

impl ProvingBackend for NativeBackend {
    fn circuit_version(&self) -> u32 { CIRCUIT_VERSION }

    fn load(&self) -> prover::Result<()> { Ok(()) }

    fn prove(&self, inputs: &CircuitInputs, progress: &mut dyn FnMut(f32)) -> prover::Result<BackendProof> {
        self.proofs.fetch_add(1, Ordering::SeqCst);
        progress(0.5);
        let mut public_signals = native_signals(inputs);
        if let Some(i) = self.tamper {
            public_signals[i] += Fr::from(1u64);
        }
        progress(1.0);
        Ok(BackendProof { proof: dummy_proof(), public_signals })
    }
}

fn pipeline(backend: Arc<NativeBackend>, lookup: Lookup) -> WithdrawalPipeline<Lookup> {
    WithdrawalPipeline::new(backend, lookup, CHAIN_ID)
}

#[tokio::test]
async fn partial_withdrawal_produces_change_at_next_index() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let backend = Arc::new(NativeBackend::default());
    let pipeline = pipeline(backend.clone(), Lookup::default());
    let req = request(deposit.clone(), 400);

    let prepared = pipeline.prepare(&req, &keys(), pool.state_view(), pool.asp_view()).await.unwrap();
    assert_eq!(prepared.inputs.state_index, 1);
    assert_eq!(prepared.inputs.asp_index, 1);
    assert_eq!(prepared.inputs.state_siblings.len(), 32);
    assert_eq!(prepared.inputs.state_tree_depth, 2);
    assert_eq!(prepared.inputs.context, req.withdrawal.context(&scope()));

    let mut task = pipeline.start(prepared.clone()).unwrap();
    let mut stages = Vec::new();
    while let Some(stage) = task.next_stage().await {
        stages.push(stage);
    }
    assert_eq!(stages.first(), Some(&ProofStage::Loading));
    assert!(stages.iter().any(|s| matches!(s, ProofStage::Computing { .. })));
    let Some(ProofStage::Done(proof)) = stages.last() else { panic!("expected a proof, got {stages:?}") };

    assert_eq!(proof.change.value, Amount::from(600u64));
    assert_eq!(proof.change.secrets.child_index, 1);
    assert_eq!(proof.change.secrets.label, label());
    assert_eq!(proof.new_commitment, proof.change.commitment);
    assert_eq!(proof.existing_nullifier_hash, deposit.nullifier_hash);
    assert_eq!(proof.proof.pub_signals.len(), signals::COUNT);
    assert_eq!(proof.proof.pub_signals[signals::WITHDRAWN_VALUE], U256::from(400u64));
    assert_eq!(proof.proof.p_b[0], [U256::from(4u64), U256::from(3u64)]);
    assert_eq!(backend.proofs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_withdrawal_leaves_zero_change() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let pipeline = pipeline(Arc::new(NativeBackend::default()), Lookup::default());
    let proof = pipeline.prove(&request(deposit, 1_000), &keys(), pool.state_view(), pool.asp_view()).await.unwrap();
    assert!(proof.change.value.is_zero());
}

#[tokio::test]
async fn mismatched_backend_signal_is_rejected() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let backend = Arc::new(NativeBackend { tamper: Some(signals::WITHDRAWN_VALUE), ..Default::default() });
    let pipeline = pipeline(backend, Lookup::default());
    let err = pipeline.prove(&request(deposit, 400), &keys(), pool.state_view(), pool.asp_view()).await.unwrap_err();
    assert!(matches!(err, ProofError::SignalMismatch { signal: "withdrawnValue", .. }), "{err}");
}

#[tokio::test]
async fn stale_state_root_fails_before_proving() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let backend = Arc::new(NativeBackend::default());
    let pipeline = pipeline(backend.clone(), Lookup::default());

    let mut ahead = pool.state.clone();
    ahead.insert(Fr::from(14u64)).unwrap();
    let stale = TreeView::new(&pool.state, ahead.root());

    let err = pipeline.prepare(&request(deposit, 400), &keys(), stale, pool.asp_view()).await.unwrap_err();
    assert!(matches!(err, ProofError::StateDesynchronized { tree: TreeKind::State, on_chain, .. } if on_chain == ahead.root()));
    assert!(err.is_retryable());
    assert!(err.retry_hint().is_some());
    assert_eq!(backend.proofs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn spent_deposit_is_rejected() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let lookup = Lookup { spent: HashSet::from([deposit.nullifier_hash]), ..Default::default() };
    let pipeline = pipeline(Arc::new(NativeBackend::default()), lookup);
    let err = pipeline.prepare(&request(deposit.clone(), 400), &keys(), pool.state_view(), pool.asp_view()).await.unwrap_err();
    assert_eq!(err, ProofError::AlreadySpent(deposit.nullifier_hash));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn invalid_requests_fail_before_any_lookup() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let pipeline = pipeline(Arc::new(NativeBackend::default()), Lookup::default());

    for withdrawn in [0, 1_001] {
        let err = pipeline.prepare(&request(deposit.clone(), withdrawn), &keys(), pool.state_view(), pool.asp_view()).await;
        assert!(matches!(err, Err(ProofError::InvalidRequest(_))));
    }
    let mut forged = deposit.clone();
    forged.value = Amount::from(2_000u64);
    let err = pipeline.prepare(&request(forged, 10), &keys(), pool.state_view(), pool.asp_view()).await;
    assert!(matches!(err, Err(ProofError::InvalidRequest(_))));
    assert_eq!(pipeline.lookup().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unapproved_label_is_rejected() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let asp = LeanTree::from_leaves(&[Fr::from(1u64), Fr::from(2u64)]).unwrap();
    let pipeline = pipeline(Arc::new(NativeBackend::default()), Lookup::default());
    let err = pipeline
        .prepare(&request(deposit, 1), &keys(), pool.state_view(), TreeView::new(&asp, asp.root()))
        .await
        .unwrap_err();
    assert_eq!(err, ProofError::LabelNotApproved(label()));
}

#[tokio::test]
async fn missing_commitment_is_rejected() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let state = LeanTree::from_leaves(&[Fr::from(11u64)]).unwrap();
    let pipeline = pipeline(Arc::new(NativeBackend::default()), Lookup::default());
    let err = pipeline
        .prepare(&request(deposit.clone(), 1), &keys(), TreeView::new(&state, state.root()), pool.asp_view())
        .await
        .unwrap_err();
    assert_eq!(err, ProofError::CommitmentNotFound(deposit.commitment));
    assert_ne!(state.root(), Root::default());
}

/// Blocks in `load` until released.
struct GatedBackend {
    gate: Mutex<mpsc::Receiver<()>>,
    proofs: AtomicUsize,
}

impl ProvingBackend for GatedBackend {
    fn circuit_version(&self) -> u32 { CIRCUIT_VERSION }

    fn load(&self) -> prover::Result<()> {
        let _ = self.gate.lock().unwrap().recv();
        Ok(())
    }

    fn prove(&self, inputs: &CircuitInputs, _progress: &mut dyn FnMut(f32)) -> prover::Result<BackendProof> {
        self.proofs.fetch_add(1, Ordering::SeqCst);
        Ok(BackendProof { proof: dummy_proof(), public_signals: native_signals(inputs) })
    }
}

#[tokio::test]
async fn cancelled_task_never_reaches_the_prover() {
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let (release, gate) = mpsc::channel();
    let backend = Arc::new(GatedBackend { gate: Mutex::new(gate), proofs: AtomicUsize::new(0) });
    let pipeline = WithdrawalPipeline::new(backend.clone(), Lookup::default(), CHAIN_ID);

    let prepared = pipeline.prepare(&request(deposit, 400), &keys(), pool.state_view(), pool.asp_view()).await.unwrap();
    let mut task = pipeline.start(prepared).unwrap();
    assert_eq!(task.stage(), &ProofStage::Idle);
    assert_eq!(task.next_stage().await, Some(ProofStage::Loading));

    task.cancel();
    assert_eq!(task.finish().await, Err(ProofError::Cancelled));
    release.send(()).unwrap();

    // Give the worker time to observe cancellation at its next stage.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(backend.proofs.load(Ordering::SeqCst), 0);
}

#[test]
fn incompatible_backend_version_is_rejected() {
    struct NextCircuit;
    impl ProvingBackend for NextCircuit {
        fn circuit_version(&self) -> u32 { CIRCUIT_VERSION + 1 }
        fn load(&self) -> prover::Result<()> { Ok(()) }
        fn prove(&self, _: &CircuitInputs, _: &mut dyn FnMut(f32)) -> prover::Result<BackendProof> {
            unreachable!("version is checked first")
        }
    }
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let deposit = deposit(1_000);
    let pool = Pool::with(&deposit);
    let pipeline = WithdrawalPipeline::new(Arc::new(NextCircuit), Lookup::default(), CHAIN_ID);
    let err = rt
        .block_on(pipeline.prove(&request(deposit, 1), &keys(), pool.state_view(), pool.asp_view()))
        .unwrap_err();
    assert!(matches!(err, ProofError::Artifacts(_)));
}
