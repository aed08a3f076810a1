//! Constructors for every request and response packet.

use crate::protocol::{Body, Packet};
use gamesync_core::{ClientActivity, ErrorKind, ErrorMessage, GameStateUpdate, PackageKind, TimeOrder};

/// Ask the server for the full shared state.
pub fn state_request() -> Packet {
    Packet::new(PackageKind::STATE_REQUEST, None)
}

/// Ask for every update newer than `time_order`, the time order of the
/// caller's last known state.
pub fn state_update_request(time_order: impl Into<TimeOrder>) -> Packet {
    Packet::new(
        PackageKind::STATE_UPDATE_REQUEST,
        Some(Body::GameStateUpdate(GameStateUpdate::new(time_order))),
    )
}

/// Post a client activity to the server.
pub fn post_activity_request(activity: ClientActivity) -> Packet {
    Packet::new(
        PackageKind::POST_ACTIVITY_REQUEST,
        Some(Body::ClientActivity(activity)),
    )
}

/// Answer a request with `body`.
pub fn response(body: impl Into<Body>) -> Packet {
    Packet::new(PackageKind::RESPONSE, Some(body.into()))
}

/// Answer a request that needs no payload.
pub fn empty_response() -> Packet {
    Packet::new(PackageKind::RESPONSE, None)
}

/// Report an error of `kind`.
pub fn error_response(kind: ErrorKind, message: impl Into<String>) -> Packet {
    Packet::new(
        PackageKind::ERROR_RESPONSE,
        Some(Body::ErrorMessage(ErrorMessage::new(kind, message))),
    )
}

/// No response arrived in time.
pub fn timeout_error(message: impl Into<String>) -> Packet {
    error_response(ErrorKind::REQUEST_TIMEOUT, message)
}

/// Request or response bytes were corrupted.
pub fn unpack_error(message: impl Into<String>) -> Packet {
    error_response(ErrorKind::UNPACK_ERROR, message)
}

/// The request could not be handled.
pub fn request_invalid_error(message: impl Into<String>) -> Packet {
    error_response(ErrorKind::REQUEST_INVALID, message)
}

/// The client's state is too stale to diff from.
pub fn out_of_sync_error(message: impl Into<String>) -> Packet {
    error_response(ErrorKind::OUT_OF_SYNC, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BodyType;
    use gamesync_core::{join_server_activity, GameState};

    #[test]
    fn update_request_carries_time_order() {
        let packet = state_update_request(41);
        assert!(packet.is_update_request());
        match packet.body() {
            Some(Body::GameStateUpdate(update)) => {
                assert_eq!(update.time_order, TimeOrder::from(41));
                assert!(update.is_empty());
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn activity_request_wraps_activity() {
        let activity = join_server_activity("bob");
        let packet = post_activity_request(activity.clone());
        assert!(packet.is_post_activity_request());
        assert_eq!(packet.header().body_type, BodyType::ClientActivity);
        assert_eq!(packet.into_body(), Some(Body::ClientActivity(activity)));
    }

    #[test]
    fn response_header_follows_body() {
        assert_eq!(
            response(GameState::default()).header().body_type,
            BodyType::GameState
        );
        assert_eq!(empty_response().header().body_type, BodyType::None);
    }

    #[test]
    fn one_builder_per_error_kind() {
        let cases = [
            (timeout_error("t"), ErrorKind::REQUEST_TIMEOUT),
            (unpack_error("u"), ErrorKind::UNPACK_ERROR),
            (request_invalid_error("r"), ErrorKind::REQUEST_INVALID),
            (out_of_sync_error("o"), ErrorKind::OUT_OF_SYNC),
        ];
        for (packet, kind) in cases {
            assert!(packet.is_error());
            match packet.body() {
                Some(Body::ErrorMessage(error)) => assert_eq!(error.error_type, kind),
                other => panic!("unexpected body {other:?}"),
            }
        }
    }
}
