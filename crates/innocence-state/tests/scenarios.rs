mod common;

use common::*;
use innocence_core::{
    Address, Amount, CompliancePublicValues, Hash32, Nullifier, PoolEvent, TokenId, TradePublicValues,
    U256,
};
use innocence_state::{DepositPhase, PoolError, PoolParts, PrivacyPool, RootPolicy, StateChange};
use innocence_state::{LedgerVault, PoolConfig, ShadowBalanceRouter};
use innocence_verifier::{ProofKind, RegistryVerifier, VerifyingKeys};

#[test]
fn deposit_of_exact_amount_records_commitment() {
    let mut pool = pool();
    let alice = user(1);
    let note = Note::new(1);
    let empty_root = pool.merkle_root();

    let receipt = deposit(&mut pool, alice, &note, 100);

    assert!(pool.has_commitment(&note.commitment()));
    assert_eq!(pool.pending_deposit(&alice).map(|d| d.completed), Some(true));
    assert_eq!(pool.deposit_phase(&alice), DepositPhase::Completed);
    assert_eq!(pool.total_deposits(), 1);
    assert_ne!(pool.merkle_root(), empty_root);
    assert_eq!(
        receipt.events,
        vec![PoolEvent::PrivateDeposit {
            commitment: note.commitment(),
            timestamp: NOW
        }]
    );
    assert!(matches!(
        receipt.changes[0],
        StateChange::CommitmentAdded { leaf_index: 0, .. }
    ));
}

#[test]
fn re_prepare_overwrites_unfinished_deposit() {
    let mut pool = pool();
    let alice = user(1);
    pool.prepare_deposit(&ctx(alice), HYPE, 100).expect("first");
    let r = pool.prepare_deposit(&ctx(alice), HYPE, 250).expect("second");

    assert_eq!(pool.pending_deposit(&alice).map(|d| d.amount), Some(250));
    assert!(matches!(
        r.events[0],
        PoolEvent::DepositPrepared {
            amount: 250,
            overwrote: true,
            ..
        }
    ));
}

#[test]
fn funding_tolerance_boundary() {
    for (funded, ok) in [(9_900u64, true), (9_899u64, false)] {
        let mut pool = pool();
        let alice = user(1);
        let note = Note::new(1);
        pool.prepare_deposit(&ctx(alice), HYPE, 10_000).expect("prepare");
        pool.transfer_to_pool(&ctx(alice), HYPE, Amount::from_u64(funded))
            .expect("fund");
        assert_eq!(pool.can_complete_deposit(&alice), ok);
        let pv = prove(&mut pool, ProofKind::Compliance, compliance_pv(note.commitment()));
        let res = pool.complete_deposit(&ctx(alice), note.commitment(), PROOF, &pv);
        if ok {
            assert!(res.is_ok());
        } else {
            assert!(matches!(res, Err(PoolError::DepositNotFunded)));
            assert_eq!(pool.deposit_phase(&alice), DepositPhase::Prepared);
        }
    }
}

#[test]
fn complete_without_prepare_is_rejected() {
    let mut pool = pool();
    let note = Note::new(1);
    let pv = prove(&mut pool, ProofKind::Compliance, compliance_pv(note.commitment()));
    let err = pool
        .complete_deposit(&ctx(user(1)), note.commitment(), PROOF, &pv)
        .expect_err("nothing staged");
    assert_eq!(err.code(), "NoPendingDeposit");
}

#[test]
fn completing_twice_is_rejected() {
    let mut pool = pool();
    let alice = user(1);
    let note = Note::new(1);
    deposit(&mut pool, alice, &note, 100);
    let pv = compliance_pv(note.commitment());
    let err = pool
        .complete_deposit(&ctx(alice), note.commitment(), PROOF, &pv)
        .expect_err("already completed");
    assert!(matches!(err, PoolError::NoPendingDeposit));
}

#[test]
fn duplicate_commitment_is_rejected() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);

    let bob = user(2);
    pool.prepare_deposit(&ctx(bob), HYPE, 50).expect("prepare");
    pool.transfer_to_pool(&ctx(bob), HYPE, Amount::from_u64(50))
        .expect("fund");
    let pv = compliance_pv(note.commitment());
    let err = pool
        .complete_deposit(&ctx(bob), note.commitment(), PROOF, &pv)
        .expect_err("reused commitment");
    assert!(matches!(err, PoolError::DuplicateCommitment));
    assert_eq!(pool.deposit_phase(&bob), DepositPhase::Funded);
}

#[test]
fn compliance_proof_checks() {
    let mut pool = pool();
    let alice = user(1);
    let note = Note::new(1);
    pool.prepare_deposit(&ctx(alice), HYPE, 100).expect("prepare");
    pool.transfer_to_pool(&ctx(alice), HYPE, Amount::from_u64(100))
        .expect("fund");

    // unregistered proof
    let pv = compliance_pv(note.commitment());
    let err = pool
        .complete_deposit(&ctx(alice), note.commitment(), PROOF, &pv)
        .expect_err("not proven");
    assert!(matches!(err, PoolError::ProofInvalid { kind: ProofKind::Compliance }));

    // proof for another commitment
    let other = Note::new(2);
    let pv = prove(&mut pool, ProofKind::Compliance, compliance_pv(other.commitment()));
    let err = pool
        .complete_deposit(&ctx(alice), note.commitment(), PROOF, &pv)
        .expect_err("mismatch");
    assert_eq!(err.code(), "ProofArgumentMismatch");

    // foreign authority
    let pv = CompliancePublicValues {
        commitment: note.commitment(),
        compliance_authority: Address([0x66; 20]),
        valid_until: U256::from(NOW + 10),
        certificate_hash: Hash32::zero(),
    }
    .encode();
    let pv = prove(&mut pool, ProofKind::Compliance, pv);
    let err = pool
        .complete_deposit(&ctx(alice), note.commitment(), PROOF, &pv)
        .expect_err("authority");
    assert!(matches!(err, PoolError::UnknownComplianceAuthority));

    // expired certificate
    let pv = CompliancePublicValues {
        commitment: note.commitment(),
        compliance_authority: authority(),
        valid_until: U256::from(NOW - 1),
        certificate_hash: Hash32::zero(),
    }
    .encode();
    let pv = prove(&mut pool, ProofKind::Compliance, pv);
    let err = pool
        .complete_deposit(&ctx(alice), note.commitment(), PROOF, &pv)
        .expect_err("expired");
    assert!(matches!(err, PoolError::ComplianceExpired));
    assert!(!pool.has_commitment(&note.commitment()));
}

#[test]
fn withdraw_then_replay_is_double_spend() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let pv = balance_pv(note.commitment(), pool.merkle_root(), 100, HYPE);
    let pv = prove(&mut pool, ProofKind::Balance, pv);

    let r = pool
        .withdraw(&ctx(user(1)), note.nullifier_hash(), user(9), HYPE, Amount::from_u64(60), PROOF, &pv)
        .expect("withdraw");
    assert!(matches!(r.events[0], PoolEvent::PrivateWithdraw { .. }));
    assert_eq!(pool.contract_balance(HYPE), Amount::from_u64(40));

    let before = snapshot(&pool, &[note]);
    let err = pool
        .withdraw(&ctx(user(1)), note.nullifier_hash(), user(9), HYPE, Amount::from_u64(40), PROOF, &pv)
        .expect_err("replay");
    assert!(matches!(err, PoolError::DoubleSpend));
    assert_eq!(snapshot(&pool, &[note]), before);
}

#[test]
fn same_proof_with_fresh_nullifier_is_double_spend() {
    let mut pool = pool();
    let victim = Note::new(2);
    deposit(&mut pool, user(2), &victim, 500);
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let pv = balance_pv(note.commitment(), pool.merkle_root(), 100, HYPE);
    let pv = prove(&mut pool, ProofKind::Balance, pv);

    let r = pool
        .withdraw(&ctx(user(1)), note.nullifier_hash(), user(9), HYPE, Amount::from_u64(100), PROOF, &pv)
        .expect("withdraw");
    assert!(r.changes.contains(&StateChange::NoteSpent {
        commitment: note.commitment()
    }));
    assert!(pool.is_note_spent(&note.commitment()));

    let before = snapshot(&pool, &[note, victim]);
    for fresh in [Nullifier([0x42; 32]), victim.nullifier_hash()] {
        let err = pool
            .withdraw(&ctx(user(1)), fresh, user(9), HYPE, Amount::from_u64(100), PROOF, &pv)
            .expect_err("same proof again");
        assert!(matches!(err, PoolError::DoubleSpend));
        assert!(!pool.is_nullifier_used(&fresh));
    }
    assert_eq!(snapshot(&pool, &[note, victim]), before);
    assert_eq!(pool.contract_balance(HYPE), Amount::from_u64(500));
}

#[test]
fn withdraw_above_proven_balance_is_rejected() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let root = pool.merkle_root();
    let pv = prove(
        &mut pool,
        ProofKind::Balance,
        balance_pv(note.commitment(), root, 50, HYPE),
    );
    let err = pool
        .withdraw(&ctx(user(1)), note.nullifier_hash(), user(9), HYPE, Amount::from_u64(51), PROOF, &pv)
        .expect_err("over proven");
    assert!(matches!(err, PoolError::InsufficientProvenBalance));
    assert!(!pool.is_nullifier_used(&note.nullifier_hash()));
}

#[test]
fn withdraw_checks_asset_and_liquidity() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let root = pool.merkle_root();

    let pv = prove(&mut pool, ProofKind::Balance, balance_pv(note.commitment(), root, 100, USDC));
    let err = pool
        .withdraw(&ctx(user(1)), note.nullifier_hash(), user(9), HYPE, Amount::from_u64(10), PROOF, &pv)
        .expect_err("asset");
    assert!(matches!(
        err,
        PoolError::AssetMismatch {
            proven: TokenId(0),
            requested: TokenId(150)
        }
    ));

    let pv = prove(&mut pool, ProofKind::Balance, balance_pv(note.commitment(), root, 1_000, HYPE));
    let err = pool
        .withdraw(&ctx(user(1)), note.nullifier_hash(), user(9), HYPE, Amount::from_u64(101), PROOF, &pv)
        .expect_err("liquidity");
    assert_eq!(err.code(), "InsufficientContractLiquidity");
}

#[test]
fn withdraw_against_unknown_commitment_is_mismatch() {
    let mut pool = pool();
    deposit(&mut pool, user(1), &Note::new(1), 100);
    let stranger = Note::new(7);
    let root = pool.merkle_root();
    let pv = prove(
        &mut pool,
        ProofKind::Balance,
        balance_pv(stranger.commitment(), root, 100, HYPE),
    );
    let err = pool
        .withdraw(&ctx(user(1)), stranger.nullifier_hash(), user(9), HYPE, Amount::from_u64(1), PROOF, &pv)
        .expect_err("unknown note");
    assert!(matches!(err, PoolError::ProofArgumentMismatch { .. }));
}

#[test]
fn stale_root_depends_on_policy() {
    for (policy, accepted) in [(RootPolicy::CurrentOnly, false), (RootPolicy::Window(2), true)] {
        let mut pool = pool_with(policy);
        let a = Note::new(1);
        deposit(&mut pool, user(1), &a, 100);
        let old_root = pool.merkle_root();
        deposit(&mut pool, user(2), &Note::new(2), 100);

        let pv = prove(&mut pool, ProofKind::Balance, balance_pv(a.commitment(), old_root, 100, HYPE));
        let res = pool.withdraw(&ctx(user(1)), a.nullifier_hash(), user(9), HYPE, Amount::from_u64(100), PROOF, &pv);
        if accepted {
            assert!(res.is_ok());
        } else {
            assert!(matches!(res, Err(PoolError::StaleOrUnknownRoot)));
        }
    }
}

#[test]
fn trade_records_delta_without_spending() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let root = pool.merkle_root();
    let pv = prove(
        &mut pool,
        ProofKind::Trade,
        trade_pv(note.commitment(), HYPE, USDC, 40, 39, Some(root)),
    );
    let r = pool.private_spot_trade(&ctx(user(1)), PROOF, &pv).expect("trade");
    assert!(matches!(r.events[0], PoolEvent::PrivateTrade { .. }));
    let deltas = pool.router().deltas(&note.commitment());
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].to_amount, Amount::from_u64(39));
    assert!(!pool.is_nullifier_used(&note.nullifier_hash()));

    // the same note may trade again
    let pv = prove(&mut pool, ProofKind::Trade, trade_pv(note.commitment(), USDC, HYPE, 39, 38, None));
    pool.private_spot_trade(&ctx(user(1)), PROOF, &pv).expect("second trade");
    assert_eq!(pool.router().deltas(&note.commitment()).len(), 2);
}

#[test]
fn resubmitted_trade_is_replay() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let pv = prove(&mut pool, ProofKind::Trade, trade_pv(note.commitment(), HYPE, USDC, 40, 39, None));
    let r = pool.private_spot_trade(&ctx(user(1)), PROOF, &pv).expect("trade");
    let digest = TradePublicValues::decode(&pv).expect("decode").digest();
    assert!(matches!(
        r.changes[0],
        StateChange::TradeRecorded { digest: d, .. } if d == digest
    ));
    assert!(pool.is_trade_settled(&digest));

    let before = snapshot(&pool, &[note]);
    let err = pool
        .private_spot_trade(&ctx(user(3)), PROOF, &pv)
        .expect_err("replayed");
    assert!(matches!(err, PoolError::TradeReplayed));
    assert_eq!(err.code(), "TradeReplayed");
    assert_eq!(snapshot(&pool, &[note]), before);
    assert_eq!(pool.router().deltas(&note.commitment()).len(), 1);
}

#[test]
fn spent_note_can_no_longer_trade() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let root = pool.merkle_root();
    let bpv = prove(&mut pool, ProofKind::Balance, balance_pv(note.commitment(), root, 100, HYPE));
    pool.withdraw(&ctx(user(1)), note.nullifier_hash(), user(9), HYPE, Amount::from_u64(100), PROOF, &bpv)
        .expect("spend");
    let pv = prove(&mut pool, ProofKind::Trade, trade_pv(note.commitment(), HYPE, USDC, 40, 39, None));
    let err = pool.private_spot_trade(&ctx(user(1)), PROOF, &pv).expect_err("spent");
    assert!(matches!(err, PoolError::DoubleSpend));
    assert_eq!(pool.router().trade_count(), 0);
}

#[test]
fn invalid_trades_are_rejected() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let root = pool.merkle_root();

    let cases = [
        (trade_pv(note.commitment(), HYPE, HYPE, 10, 9, None), "InvalidTrade"),
        (trade_pv(note.commitment(), HYPE, USDC, 0, 9, None), "InvalidTrade"),
        (trade_pv(note.commitment(), HYPE, USDC, 10, 0, None), "InvalidTrade"),
        (trade_pv(Note::new(5).commitment(), HYPE, USDC, 10, 9, None), "ProofArgumentMismatch"),
        (trade_pv(note.commitment(), HYPE, USDC, 10, 9, Some(Hash32([1; 32]))), "StaleOrUnknownRoot"),
    ];
    for (pv, code) in cases {
        let pv = prove(&mut pool, ProofKind::Trade, pv);
        let err = pool.private_spot_trade(&ctx(user(1)), PROOF, &pv).expect_err(code);
        assert_eq!(err.code(), code);
    }
    assert_eq!(pool.router().trade_count(), 0);
    assert_eq!(pool.merkle_root(), root);
}

#[test]
fn ownership_attestation() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    let pv = prove(&mut pool, ProofKind::Ownership, ownership_pv(&note));
    assert_eq!(
        pool.attest_ownership(&note.commitment(), PROOF, &pv).expect("attest"),
        note.nullifier_hash()
    );

    let root = pool.merkle_root();
    let bpv = prove(&mut pool, ProofKind::Balance, balance_pv(note.commitment(), root, 100, HYPE));
    pool.withdraw(&ctx(user(1)), note.nullifier_hash(), user(9), HYPE, Amount::from_u64(100), PROOF, &bpv)
        .expect("spend");
    let err = pool
        .attest_ownership(&note.commitment(), PROOF, &pv)
        .expect_err("spent");
    assert!(matches!(err, PoolError::DoubleSpend));
}

#[test]
fn emergency_path_is_admin_only_and_leaves_notes_alone() {
    let mut pool = pool();
    let note = Note::new(1);
    deposit(&mut pool, user(1), &note, 100);
    pool.transfer_to_pool(&ctx(user(2)), USDC, Amount::from_u64(7))
        .expect("fund usdc");
    let root = pool.merkle_root();

    let err = pool
        .emergency_withdraw(&ctx(user(1)), user(1), HYPE, Amount::from_u64(1), "mine")
        .expect_err("not admin");
    assert!(matches!(err, PoolError::Unauthorized));

    let err = pool
        .emergency_withdraw(&ctx(admin()), admin(), HYPE, Amount::from_u64(1), &"x".repeat(300))
        .expect_err("long reason");
    assert!(matches!(err, PoolError::ReasonTooLong));

    pool.emergency_withdraw(&ctx(admin()), admin(), HYPE, Amount::from_u64(30), "incident")
        .expect("partial");
    assert_eq!(pool.contract_balance(HYPE), Amount::from_u64(70));

    let r = pool
        .emergency_withdraw_all(&ctx(admin()), admin(), "shutdown")
        .expect("drain");
    assert_eq!(r.events.len(), 2);
    assert!(pool.contract_balance(HYPE).is_zero());
    assert!(pool.contract_balance(USDC).is_zero());

    let err = pool
        .emergency_withdraw_all(&ctx(admin()), admin(), "again")
        .expect_err("empty");
    assert!(matches!(err, PoolError::InsufficientContractLiquidity { token: None }));

    assert_eq!(pool.merkle_root(), root);
    assert!(pool.has_commitment(&note.commitment()));
    assert!(!pool.is_nullifier_used(&note.nullifier_hash()));
}

#[test]
fn every_success_emits_an_event() {
    let mut pool = pool();
    let before = pool.event_count();
    let r = pool.prepare_deposit(&ctx(user(1)), HYPE, 5).expect("prepare");
    assert!(!r.events.is_empty());
    assert_eq!(r.first_seq, before);
    let r = pool
        .transfer_to_pool(&ctx(user(1)), HYPE, Amount::from_u64(5))
        .expect("fund");
    assert_eq!(r.first_seq, before + 1);
    assert_eq!(pool.events(0, 10).len(), 2);
    assert_eq!(pool.events(1, 10).len(), 1);
    assert!(pool.events(5, 10).is_empty());
}

#[test]
fn zero_amounts_are_rejected() {
    let mut pool = pool();
    assert!(matches!(
        pool.prepare_deposit(&ctx(user(1)), HYPE, 0),
        Err(PoolError::ZeroAmount)
    ));
    assert!(matches!(
        pool.transfer_to_pool(&ctx(user(1)), HYPE, Amount::zero()),
        Err(PoolError::ZeroAmount)
    ));
    assert_eq!(pool.event_count(), 0);
}

#[test]
fn merkle_paths_prove_recorded_commitments() {
    let mut pool = pool();
    let notes: Vec<_> = (1..=3).map(Note::new).collect();
    for (i, n) in notes.iter().enumerate() {
        deposit(&mut pool, user(i as u8 + 1), n, 10);
    }
    for (i, n) in notes.iter().enumerate() {
        let path = pool.merkle_path(i as u64).expect("path");
        assert!(path.verify(&n.commitment(), &pool.merkle_root()));
    }
    assert!(pool.merkle_path(3).is_none());
}

#[test]
fn rebuild_from_parts_restores_root_and_sets() {
    let mut pool = pool_with(RootPolicy::Window(3));
    let a = Note::new(1);
    let b = Note::new(2);
    deposit(&mut pool, user(1), &a, 100);
    deposit(&mut pool, user(2), &b, 100);
    let root = pool.merkle_root();
    let pv = prove(&mut pool, ProofKind::Balance, balance_pv(a.commitment(), root, 100, HYPE));
    pool.withdraw(&ctx(user(1)), a.nullifier_hash(), user(9), HYPE, Amount::from_u64(100), PROOF, &pv)
        .expect("withdraw");

    let parts = PoolParts {
        commitments: pool.commitments().to_vec(),
        nullifiers: vec![a.nullifier_hash()],
        spent_notes: vec![a.commitment()],
        trade_digests: Vec::new(),
        pending: vec![(user(2), pool.pending_deposit(&user(2)).expect("slot"))],
        events: pool.events(0, usize::MAX).to_vec(),
    };
    let config = PoolConfig {
        admin: admin(),
        compliance_authority: authority(),
        root_policy: RootPolicy::Window(3),
        keys: VerifyingKeys::devnet(),
    };
    let vault = LedgerVault::with_balances([(HYPE, pool.contract_balance(HYPE))]);
    let rebuilt = PrivacyPool::from_parts(config, RegistryVerifier::new(), vault, ShadowBalanceRouter::new(), parts)
        .expect("rebuild");

    assert_eq!(rebuilt.merkle_root(), pool.merkle_root());
    assert_eq!(
        rebuilt.roots().accepted_roots().collect::<Vec<_>>(),
        pool.roots().accepted_roots().collect::<Vec<_>>()
    );
    assert!(rebuilt.is_nullifier_used(&a.nullifier_hash()));
    assert!(rebuilt.is_note_spent(&a.commitment()));
    assert!(!rebuilt.is_note_spent(&b.commitment()));
    assert_eq!(rebuilt.event_count(), pool.event_count());
    assert_eq!(rebuilt.deposit_phase(&user(2)), DepositPhase::Completed);
}
