//! Request/fulfill scenarios against an in-memory gateway.

use std::sync::Arc;

use tendermintx::{
    Callback, InMemoryGateway, LightClientConfig, LightClientError, LightClientEvent,
    TendermintX, FREEZE_GAP_MAX, SKIP_MAX,
};
use tendermintx_primitives::types::{SkipInput, StepInput};
use tendermintx_primitives::{B256, U256};

const STEP_ID: B256 = B256::repeat_byte(0x01);
const SKIP_ID: B256 = B256::repeat_byte(0x02);

const H0: B256 = B256::repeat_byte(0xa0);
const H1: B256 = B256::repeat_byte(0xa1);
const H1_FORGED: B256 = B256::repeat_byte(0xf1);
const H2: B256 = B256::repeat_byte(0xa2);

fn setup(genesis_height: u64) -> (TendermintX, Arc<InMemoryGateway>) {
    let gateway = Arc::new(InMemoryGateway::new());
    let config = LightClientConfig {
        step_function_id: STEP_ID,
        skip_function_id: SKIP_ID,
        ..Default::default()
    };
    let mut client = TendermintX::new(gateway.clone(), config);
    client.set_genesis_header(genesis_height, H0);
    (client, gateway)
}

fn prove_step(gateway: &InMemoryGateway, trusted_height: u64, trusted_header: B256, output: B256) {
    let input = StepInput {
        trusted_height,
        trusted_header,
    };
    gateway.set_verified(STEP_ID, input.abi_encode_packed(), output.to_vec());
}

fn prove_skip(
    gateway: &InMemoryGateway,
    trusted_height: u64,
    trusted_header: B256,
    target_height: u64,
    output: B256,
) {
    let input = SkipInput {
        trusted_height,
        trusted_header,
        target_height,
    };
    gateway.set_verified(SKIP_ID, input.abi_encode_packed(), output.to_vec());
}

/// Genesis at 1000, stepped to 1001 (H1), skipped to 1500 (H2).
fn advanced() -> (TendermintX, Arc<InMemoryGateway>) {
    let (mut client, gateway) = setup(1000);
    prove_step(&gateway, 1000, H0, H1);
    client.step(1000).unwrap();
    prove_skip(&gateway, 1001, H1, 1500, H2);
    client.skip(1001, 1500).unwrap();
    (client, gateway)
}

#[test]
fn test_step_scenario() {
    let (mut client, gateway) = setup(1000);

    client.request_step(U256::ZERO).unwrap();
    let request = gateway.take_requests().remove(0);
    assert_eq!(request.function_id, STEP_ID);
    assert_eq!(request.callback, Callback::Step { trusted_height: 1000 });

    prove_step(&gateway, 1000, H0, H1);
    let event = client.fulfill(request.callback).unwrap();

    assert_eq!(
        event,
        LightClientEvent::HeadUpdate {
            height: 1001,
            header: H1
        }
    );
    assert_eq!(client.latest_height(), 1001);
    assert_eq!(client.header_at(1001), H1);
    assert_eq!(client.header_at(1000), H0);
}

#[test]
fn test_skip_scenario_and_stale_replay() {
    let (mut client, gateway) = setup(1000);
    prove_step(&gateway, 1000, H0, H1);
    client.step(1000).unwrap();

    let event = client.request_skip(1500, U256::from(1)).unwrap();
    assert_eq!(
        event,
        LightClientEvent::SkipRequested {
            trusted_height: 1001,
            trusted_header: H1,
            target_height: 1500,
        }
    );
    let request = gateway.take_requests().remove(0);
    assert_eq!(request.function_id, SKIP_ID);
    assert_eq!(request.input.len(), 48);

    prove_skip(&gateway, 1001, H1, 1500, H2);
    client.fulfill(request.callback).unwrap();
    assert_eq!(client.latest_height(), 1500);
    assert_eq!(client.header_at(1500), H2);

    // Replaying the same fulfillment is stale now.
    assert_eq!(
        client.skip(1001, 1500),
        Err(LightClientError::TargetOutOfRange {
            height: 1500,
            latest: 1500
        })
    );
    assert_eq!(client.latest_height(), 1500);
}

#[test]
fn test_skip_request_window() {
    let (client, gateway) = setup(1000);

    for target in [999, 1000, 1001 + SKIP_MAX] {
        assert!(matches!(
            client.request_skip(target, U256::ZERO),
            Err(LightClientError::TargetOutOfRange { .. })
        ));
    }
    assert!(gateway.requests().is_empty());

    client.request_skip(1000 + SKIP_MAX, U256::ZERO).unwrap();
    assert_eq!(gateway.requests().len(), 1);
}

#[test]
fn test_overlapping_skips_only_first_applies() {
    let (mut client, gateway) = setup(1000);

    client.request_skip(1400, U256::ZERO).unwrap();
    client.request_skip(1300, U256::ZERO).unwrap();
    let requests = gateway.take_requests();
    prove_skip(&gateway, 1000, H0, 1400, H1);
    prove_skip(&gateway, 1000, H0, 1300, H2);

    client.fulfill(requests[0].callback).unwrap();
    assert_eq!(
        client.fulfill(requests[1].callback),
        Err(LightClientError::TargetOutOfRange {
            height: 1300,
            latest: 1400
        })
    );
    assert_eq!(client.latest_height(), 1400);
    assert!(!client.ledger().is_known(1300));
}

#[test]
fn test_stale_step_after_skip() {
    let (mut client, gateway) = setup(1000);

    client.request_step(U256::ZERO).unwrap();
    client.request_skip(1200, U256::ZERO).unwrap();
    let requests = gateway.take_requests();
    prove_step(&gateway, 1000, H0, H1);
    prove_skip(&gateway, 1000, H0, 1200, H2);

    // Fulfillments arrive out of submission order.
    client.fulfill(requests[1].callback).unwrap();
    assert_eq!(
        client.fulfill(requests[0].callback),
        Err(LightClientError::TargetOutOfRange {
            height: 1001,
            latest: 1200
        })
    );
    assert!(!client.ledger().is_known(1001));
}

#[test]
fn test_duplicate_step_fulfillment() {
    let (mut client, gateway) = setup(1000);
    prove_step(&gateway, 1000, H0, H1);

    client.step(1000).unwrap();
    assert!(matches!(
        client.step(1000),
        Err(LightClientError::TargetOutOfRange { .. })
    ));
    assert_eq!(client.header_at(1001), H1);
}

#[test]
fn test_fulfillment_with_unknown_trusted_height() {
    let (mut client, _) = setup(1000);
    let before = client.snapshot();

    assert_eq!(
        client.step(1005),
        Err(LightClientError::UnknownTrustedHeader { height: 1005 })
    );
    assert_eq!(
        client.skip(1005, 1100),
        Err(LightClientError::UnknownTrustedHeader { height: 1005 })
    );
    assert_eq!(client.snapshot(), before);
}

#[test]
fn test_freeze_with_matching_header_is_rejected() {
    let (mut client, gateway) = advanced();

    client.request_freeze(1000, 1001, U256::ZERO).unwrap();
    let request = gateway.take_requests().remove(0);
    assert_eq!(request.function_id, SKIP_ID);
    assert_eq!(
        request.callback,
        Callback::Freeze {
            trusted_height: 1000,
            conflict_height: 1001
        }
    );

    prove_skip(&gateway, 1000, H0, 1001, H1);
    assert_eq!(
        client.fulfill(request.callback),
        Err(LightClientError::InvalidConflictBlock { height: 1001 })
    );
    assert!(!client.frozen());
}

#[test]
fn test_freeze_with_conflicting_header() {
    let (mut client, gateway) = advanced();

    prove_skip(&gateway, 1000, H0, 1001, H1_FORGED);
    let event = client.freeze(1000, 1001).unwrap();

    assert_eq!(
        event,
        LightClientEvent::Freeze {
            conflict_height: 1001,
            stored_header: H1,
            proven_header: H1_FORGED,
        }
    );
    assert!(client.frozen());
    // The stored header is not rewritten.
    assert_eq!(client.header_at(1001), H1);

    // Frozen is irreversible: a later non-conflicting attempt leaves it set.
    prove_skip(&gateway, 1000, H0, 1001, H1);
    assert!(client.freeze(1000, 1001).is_err());
    assert!(client.frozen());
}

#[test]
fn test_frozen_client_keeps_accepting_by_default() {
    let (mut client, gateway) = advanced();
    prove_skip(&gateway, 1000, H0, 1001, H1_FORGED);
    client.freeze(1000, 1001).unwrap();

    prove_step(&gateway, 1500, H2, H1);
    client.step(1500).unwrap();
    assert_eq!(client.latest_height(), 1501);
}

#[test]
fn test_freeze_request_validation() {
    let (client, gateway) = advanced();

    assert_eq!(
        client.request_freeze(1000, 1200, U256::ZERO),
        Err(LightClientError::UnknownTrustedHeader { height: 1200 })
    );
    assert_eq!(
        client.request_freeze(999, 1001, U256::ZERO),
        Err(LightClientError::UnknownTrustedHeader { height: 999 })
    );
    assert!(gateway.requests().is_empty());
}

#[test]
fn test_freeze_trusted_height_too_old() {
    let (mut client, gateway) = setup(1000);
    let far = 1000 + FREEZE_GAP_MAX + 1;
    prove_skip(&gateway, 1000, H0, far, H1);
    client.skip(1000, far).unwrap();

    assert_eq!(
        client.request_freeze(1000, far, U256::ZERO),
        Err(LightClientError::TargetOutOfRange {
            height: 1000,
            latest: far
        })
    );

    prove_skip(&gateway, 1000, H0, far, H1_FORGED);
    assert!(matches!(
        client.freeze(1000, far),
        Err(LightClientError::TargetOutOfRange { .. })
    ));
    assert!(!client.frozen());
}

#[test]
fn test_freeze_right_after_genesis() {
    let (mut client, gateway) = setup(10);
    prove_step(&gateway, 10, H0, H1);
    client.step(10).unwrap();

    // latest_height < FREEZE_GAP_MAX: the window check must not underflow.
    client.request_freeze(10, 11, U256::ZERO).unwrap();
    prove_skip(&gateway, 10, H0, 11, H1_FORGED);
    client.freeze(10, 11).unwrap();
    assert!(client.frozen());
}

#[test]
fn test_headers_are_append_only() {
    let (mut client, gateway) = setup(1000);
    let mut history = vec![(1000, H0)];
    let mut trusted = (1000, H0);

    for (i, target) in [1001u64, 1050, 1051, 2000, 2001].into_iter().enumerate() {
        let header = B256::with_last_byte(i as u8 + 1);
        if target == trusted.0 + 1 {
            prove_step(&gateway, trusted.0, trusted.1, header);
            client.step(trusted.0).unwrap();
        } else {
            prove_skip(&gateway, trusted.0, trusted.1, target, header);
            client.skip(trusted.0, target).unwrap();
        }

        let latest_before = trusted.0;
        trusted = (target, header);
        history.push(trusted);
        assert!(client.latest_height() > latest_before);

        // Stale attempts against every earlier anchor are rejected.
        for &(height, _) in &history[..history.len() - 1] {
            assert!(client.step(height).is_err());
            assert!(client.skip(height, target).is_err());
        }
        for &(height, header) in &history {
            assert_eq!(client.header_at(height), header);
        }
    }
}

#[test]
fn test_genesis_reset_reopens_recorded_heights() {
    let (mut client, gateway) = setup(1000);
    prove_step(&gateway, 1000, H0, H1);
    client.step(1000).unwrap();

    // Moving genesis below the head lets a later skip land on an already recorded height.
    let reset_header = B256::repeat_byte(0x10);
    client.set_genesis_header(10, reset_header);
    assert_eq!(client.latest_height(), 10);

    prove_skip(&gateway, 10, reset_header, 1001, H2);
    client.skip(10, 1001).unwrap();
    assert_eq!(client.header_at(1001), H2);
    assert_eq!(client.latest_height(), 1001);
}
