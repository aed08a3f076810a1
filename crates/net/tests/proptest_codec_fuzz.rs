//! Fuzz-style property tests for the packet codec
//!
//! These tests validate that datagram decoders handle arbitrary
//! network input gracefully without crashing.

use gamesync_core::state::PLAYERS;
use gamesync_core::{
    fields, ErrorKind, Fields, GameState, GameStateUpdate, GameStatus, Registries, Value,
};
use gamesync_net::{
    builders, encode_fields, Body, FramingMode, Packet, Protocol, ProtocolConfig, BOUNDARY_TOKEN,
};
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        any::<bool>().prop_map(Value::Bool),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Str),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        Just(Value::Delete),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn update() -> impl Strategy<Value = GameStateUpdate> {
    (
        -1000i64..1000,
        prop::collection::btree_map("[a-z]{1,6}", value(), 0..6),
    )
        .prop_map(|(t, fields): (i64, Fields)| GameStateUpdate::from_parts(t, fields).unwrap())
}

fn time_order() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<i64>().prop_map(|t| t as f64),
        -1.0e9f64..1.0e9,
        Just(-0.0),
    ]
}

fn game_state() -> impl Strategy<Value = GameState> {
    (
        time_order(),
        prop_oneof![Just(GameStatus::Paused), Just(GameStatus::Active)],
        prop::collection::btree_map("[0-9a-f]{8}", value(), 0..4),
        prop::collection::btree_map(
            "[a-z]{1,8}".prop_filter("reserved", |name| name != PLAYERS),
            value(),
            0..4,
        ),
    )
        .prop_map(|(t, status, players, extra)| {
            let mut state = GameState::new(t, status);
            state.players = players;
            for (name, value) in extra {
                state.insert(name, value).unwrap();
            }
            state
        })
}

/// Boundary datagram announcing a `GameStateUpdate` body, followed by `body`.
fn update_datagram_with_body(body: &[u8]) -> Vec<u8> {
    let mut datagram = builders::response(GameStateUpdate::new(1)).to_datagram().unwrap();
    let header_end = datagram
        .windows(4)
        .position(|w| w == BOUNDARY_TOKEN)
        .unwrap()
        + 4;
    datagram.truncate(header_end);
    datagram.extend_from_slice(body);
    datagram
}

fn length_prefixed() -> Protocol {
    let config = ProtocolConfig {
        framing: FramingMode::LengthPrefixed,
        ..ProtocolConfig::default()
    };
    Protocol::new(Registries::standard(), config)
}

proptest! {
    /// Property: Arbitrary bytes don't crash the boundary decoder
    #[test]
    fn arbitrary_bytes_dont_crash_boundary(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _result = Protocol::standard().decode_packet(&random_bytes);
        // No panic = success
    }

    /// Property: Arbitrary bytes don't crash the length-prefixed decoder
    #[test]
    fn arbitrary_bytes_dont_crash_length_prefixed(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        let _result = length_prefixed().decode_packet(&random_bytes);
        // No panic = success
    }

    /// Property: Arbitrary bytes behind a valid header don't crash body decoding
    #[test]
    fn arbitrary_bodies_dont_crash(
        random_bytes in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut datagram = builders::response(GameState::default()).to_datagram().unwrap();
        let header_end = datagram
            .windows(4)
            .position(|w| w == BOUNDARY_TOKEN)
            .unwrap() + 4;
        datagram.truncate(header_end);
        datagram.extend_from_slice(&random_bytes);

        let _result = Packet::from_datagram(&datagram);
    }

    /// Property: Update responses roundtrip in both framings
    #[test]
    fn update_packets_roundtrip(update in update()) {
        let packet = builders::response(update);

        let boundary = Protocol::standard();
        let datagram = boundary.encode_packet(&packet).unwrap();
        prop_assert_eq!(&boundary.decode_packet(&datagram).unwrap(), &packet);

        let prefixed = length_prefixed();
        let datagram = prefixed.encode_packet(&packet).unwrap();
        prop_assert_eq!(&prefixed.decode_packet(&datagram).unwrap(), &packet);
    }

    /// Property: State responses roundtrip
    #[test]
    fn state_packets_roundtrip(state in game_state()) {
        let packet = builders::response(state);
        let protocol = Protocol::standard();
        let datagram = protocol.encode_packet(&packet).unwrap();
        prop_assert_eq!(&protocol.decode_packet(&datagram).unwrap(), &packet);
    }

    /// Property: Update requests roundtrip
    #[test]
    fn update_requests_roundtrip(time_order in any::<i32>()) {
        let packet = builders::state_update_request(time_order);
        let decoded = Packet::from_datagram(&packet.to_datagram().unwrap()).unwrap();
        prop_assert_eq!(decoded, packet);
    }

    /// Property: Truncated frames don't crash
    #[test]
    fn truncated_frames_handled(truncate_at in 0usize..80) {
        let packet = builders::response(GameState::new(9, GameStatus::Active));
        let mut encoded = packet.to_datagram().unwrap();

        if truncate_at < encoded.len() {
            encoded.truncate(truncate_at);
            let _result = Packet::from_datagram(&encoded);
            // May fail or succeed - just shouldn't panic
        }
    }

    /// Property: Oversized length prefix handled
    #[test]
    fn oversized_length_handled(claimed_length in 100u32..5000u32) {
        let mut frame = Vec::new();
        frame.extend_from_slice(&claimed_length.to_le_bytes());
        frame.extend_from_slice(&[0, 1, 2, 3, 4]);

        prop_assert!(length_prefixed().decode_packet(&frame).is_err());
    }

    /// Property: Corrupted payload handled
    #[test]
    fn corrupted_payload_handled(flip_pos in 0usize..60, flip_bit in 0u8..8) {
        let packet = builders::out_of_sync_error("client is behind");
        let mut encoded = packet.to_datagram().unwrap();

        if flip_pos < encoded.len() {
            encoded[flip_pos] ^= 1 << flip_bit;
            let _result = Protocol::standard().decode_packet(&encoded);
            // May succeed or fail - just shouldn't panic
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn empty_frame_fails() {
        assert!(Protocol::standard().decode_packet(&[]).is_err());
        assert!(length_prefixed().decode_packet(&[]).is_err());
    }

    #[test]
    fn token_only_fails() {
        assert!(Packet::from_datagram(&BOUNDARY_TOKEN).is_err());
    }

    #[test]
    fn non_finite_time_order_is_unpack_error() {
        let protocol = Protocol::standard();
        for bad in [f64::NAN, f64::INFINITY] {
            let body = encode_fields(&fields([("time_order", bad)])).unwrap();
            let err = protocol
                .decode_packet(&update_datagram_with_body(&body))
                .unwrap_err();
            assert_eq!(err.error_kind(), ErrorKind::UNPACK_ERROR);
        }
    }

    #[test]
    fn state_keeps_syncing_after_hostile_update() {
        let protocol = Protocol::standard();
        let mut state = GameState::new(5, GameStatus::Active);

        let hostile = encode_fields(&fields([
            ("time_order", Value::Float(f64::NAN)),
            ("x", Value::Int(0)),
        ]))
        .unwrap();
        assert!(protocol
            .decode_packet(&update_datagram_with_body(&hostile))
            .is_err());

        let next = builders::response(GameStateUpdate::new(6).with("x", 1).unwrap());
        let decoded = protocol
            .decode_packet(&protocol.encode_packet(&next).unwrap())
            .unwrap();
        let Some(Body::GameStateUpdate(update)) = decoded.into_body() else {
            panic!("expected update body");
        };
        assert!(state.apply(&update).unwrap());
        assert_eq!(state.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn valid_roundtrip() {
        let packet = builders::state_request();
        let decoded = Packet::from_datagram(&packet.to_datagram().unwrap()).unwrap();
        assert_eq!(packet, decoded);
    }
}
