use crate::players::PlayerSession;
use log::trace;
use shared::{Datagram, Message, RequestType, TransformRequest, TransformedResponse};

/// Transform updates closer together than this are dropped.
pub const MIN_TRANSFORM_DELAY_MS: i64 = 33;

#[derive(Debug, Clone, PartialEq)]
pub enum GameVerdict {
    /// Counts as liveness; `broadcast` goes to every other connected player.
    Accepted { broadcast: Option<Vec<u8>> },
    /// Dropped without touching liveness.
    Throttled,
    /// Not a game datagram this handler understands.
    Unknown,
}

/// Game-specific handling of datagrams from connected players.
///
/// Runs while the room holds its session lock, so it must not block.
pub trait GameHandler: Send + Sync + 'static {
    fn handle(&self, session: &mut PlayerSession, datagram: &Datagram, now_ms: i64)
        -> GameVerdict;
}

/// Stores player transforms and relays them to the rest of the room.
#[derive(Debug, Clone)]
pub struct TransformHandler {
    min_delay_ms: i64,
}

impl TransformHandler {
    pub fn new() -> Self {
        Self::with_min_delay(MIN_TRANSFORM_DELAY_MS)
    }

    pub fn with_min_delay(min_delay_ms: i64) -> Self {
        Self { min_delay_ms }
    }
}

impl Default for TransformHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl GameHandler for TransformHandler {
    fn handle(
        &self,
        session: &mut PlayerSession,
        datagram: &Datagram,
        now_ms: i64,
    ) -> GameVerdict {
        if RequestType::from_tag(datagram.tag()) != Some(RequestType::Transform) {
            return GameVerdict::Unknown;
        }

        let request = match TransformRequest::decode(datagram.payload()) {
            Ok(request) => request,
            Err(e) => {
                trace!("Malformed transform from player {}: {}", session.id, e);
                return GameVerdict::Unknown;
            }
        };

        if let Some(last) = session.last_transform_ms {
            if now_ms - last < self.min_delay_ms {
                trace!("Throttled transform from player {}", session.id);
                return GameVerdict::Throttled;
            }
        }

        session.transform = request.transform;
        session.last_transform_ms = Some(now_ms);

        let relay = TransformedResponse {
            player_id: session.id,
            transform: request.transform,
        };
        GameVerdict::Accepted {
            broadcast: Some(relay.encode()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{PlayerTransform, Token};
    use std::net::SocketAddr;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_session() -> PlayerSession {
        PlayerSession::new(4, "p".to_string(), Token::generate(), 0)
    }

    fn transform_datagram(transform: PlayerTransform) -> Datagram {
        Datagram::new(TransformRequest { transform }.encode(), test_addr()).unwrap()
    }

    #[test]
    fn test_transform_accepted_and_relayed() {
        let handler = TransformHandler::new();
        let mut session = test_session();

        let verdict = handler.handle(
            &mut session,
            &transform_datagram(PlayerTransform::at(1.0, 2.0, 3.5)),
            100,
        );

        let bytes = match verdict {
            GameVerdict::Accepted {
                broadcast: Some(bytes),
            } => bytes,
            other => panic!("expected accepted transform, got {:?}", other),
        };
        let relay = TransformedResponse::decode(&bytes).unwrap();
        assert_eq!(relay.player_id, 4);
        assert_approx_eq!(relay.transform.z, 3.5);
        assert_approx_eq!(session.transform.x, 1.0);
        assert_eq!(session.last_transform_ms, Some(100));
    }

    #[test]
    fn test_transform_throttled() {
        let handler = TransformHandler::new();
        let mut session = test_session();
        let datagram = transform_datagram(PlayerTransform::at(1.0, 0.0, 0.0));

        assert!(matches!(
            handler.handle(&mut session, &datagram, 100),
            GameVerdict::Accepted { .. }
        ));
        assert_eq!(
            handler.handle(&mut session, &datagram, 100 + MIN_TRANSFORM_DELAY_MS - 1),
            GameVerdict::Throttled
        );
        assert!(matches!(
            handler.handle(&mut session, &datagram, 100 + MIN_TRANSFORM_DELAY_MS),
            GameVerdict::Accepted { .. }
        ));
    }

    #[test]
    fn test_malformed_transform_is_unknown() {
        let handler = TransformHandler::new();
        let mut session = test_session();
        let datagram = Datagram::new(vec![RequestType::Transform as u8, 0, 0], test_addr()).unwrap();

        assert_eq!(
            handler.handle(&mut session, &datagram, 0),
            GameVerdict::Unknown
        );
        assert!(session.last_transform_ms.is_none());
    }

    #[test]
    fn test_unrecognized_tag_is_unknown() {
        let handler = TransformHandler::new();
        let mut session = test_session();
        let datagram = Datagram::new(vec![200, 1, 2, 3], test_addr()).unwrap();

        assert_eq!(
            handler.handle(&mut session, &datagram, 0),
            GameVerdict::Unknown
        );
    }
}
