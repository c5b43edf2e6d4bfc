//! [`AgentLoop`] – the receive → decode → decide → encode → send cycle.
//!
//! The loop is the single owner of the [`ConnectionManager`] and the
//! [`DecisionEngine`], so exactly one cycle is ever in flight.  Each tick:
//!
//! 1. **Receive** – wait for the next inbound message.
//! 2. **Decode** – classify it as an ack, an observation or unparsed bytes.
//! 3. **Decide** – observations go through the decision engine; acks and
//!    unparsed payloads are logged and produce no reply.
//! 4. **Encode / Send** – the chosen action is written back as one document.
//!
//! Only [`ConnectionError`]s leave [`AgentLoop::tick`]; everything else is
//! handled inside the cycle.

use tracing::{debug, error, info, warn};
use wayfarer_middleware::{ConnectionError, ConnectionManager, InboundMessage, decode, encode};
use wayfarer_types::{Action, ActionAck, Observation};

use crate::decision::DecisionEngine;

/// Bytes of an unparsed payload quoted in the log line.
const UNPARSED_PREVIEW_BYTES: usize = 120;

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// An observation was answered with this action.
    Acted(Action),
    /// The server acknowledged an earlier action.
    Acknowledged(ActionAck),
    /// Nothing was sent: the payload was unparsed or the action failed to encode.
    Skipped,
}

pub struct AgentLoop {
    connection: ConnectionManager,
    engine: DecisionEngine,
    last_time_step: Option<i64>,
    cycles: u64,
}

impl AgentLoop {
    pub fn new(connection: ConnectionManager, engine: DecisionEngine) -> Self {
        Self {
            connection,
            engine,
            last_time_step: None,
            cycles: 0,
        }
    }

    /// Completed ticks so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run a single cycle.
    pub async fn tick(&mut self) -> Result<CycleOutcome, ConnectionError> {
        let bytes = self.connection.receive().await?;
        let message = decode(&bytes);
        debug!(kind = message.kind(), len = bytes.len(), "decoded inbound message");

        let outcome = match message {
            InboundMessage::Observation(observation) => self.answer(&observation).await?,
            InboundMessage::ActionAck(ack) => {
                info!(
                    message = %ack.message,
                    x = %ack.data.x,
                    y = %ack.data.y,
                    tile = %ack.data.current_tile_type,
                    "action acknowledged"
                );
                CycleOutcome::Acknowledged(ack)
            }
            InboundMessage::Unparsed(raw) => {
                let preview = String::from_utf8_lossy(&raw[..raw.len().min(UNPARSED_PREVIEW_BYTES)]);
                warn!(len = raw.len(), preview = %preview, "payload matched no known schema; not replying");
                CycleOutcome::Skipped
            }
        };
        self.cycles += 1;
        Ok(outcome)
    }

    async fn answer(&mut self, observation: &Observation) -> Result<CycleOutcome, ConnectionError> {
        let time_step = observation.time_step;
        if let Some(previous) = self.last_time_step
            && time_step < previous
        {
            warn!(time_step, previous, "time step went backwards; answering anyway");
        }
        self.last_time_step = Some(time_step);
        debug!(
            time_step,
            x = observation.current_location.x,
            y = observation.current_location.y,
            tiles = observation.surroundings.tiles.len(),
            agents = observation.surroundings.agents.len(),
            "observation received"
        );

        let action = self.engine.decide(observation).await;
        let bytes = match encode(&action) {
            Ok(b) => b,
            Err(e) => {
                error!(time_step, error = %e, "failed to encode action; not replying");
                return Ok(CycleOutcome::Skipped);
            }
        };
        self.connection.send(&bytes).await?;
        debug!(time_step, target = ?action.target_tile, "action sent");
        Ok(CycleOutcome::Acted(action))
    }

    /// Tick until the connection fails.  The error is always fatal.
    pub async fn run(&mut self) -> ConnectionError {
        info!(
            peer = self.connection.peer(),
            strategy = self.engine.strategy_name(),
            "agent loop started"
        );
        loop {
            if let Err(e) = self.tick().await {
                info!(cycles = self.cycles, "agent loop stopped");
                return e;
            }
        }
    }

    /// Close the connection.  Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.connection.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wayfarer_types::Coordinate;

    const OBSERVATION: &[u8] = br#"{"agent_id":"a","timeStep":4,"currentLocation":{"x":5,"y":5,"type":"grass"},"surroundings":{"tiles":[{"x":4,"y":5,"type":"grass"},{"x":6,"y":5,"type":"water"},{"x":5,"y":4,"type":"forest"},{"x":5,"y":6,"type":"water"}],"agents":[]},"responseType":"observation"}"#;
    const ACK: &[u8] = br#"{"data":{"currentTileType":"grass","x":"4","y":"5"},"message":"ok","responseType":"action"}"#;

    async fn connected_loop() -> (AgentLoop, tokio::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (conn, accepted) =
            tokio::join!(ConnectionManager::connect("127.0.0.1", port), listener.accept());
        let engine = DecisionEngine::random_only().with_rng(Box::new(StdRng::seed_from_u64(11)));
        (AgentLoop::new(conn.unwrap(), engine), accepted.unwrap().0)
    }

    async fn read_reply(server: &mut tokio::net::TcpStream) -> serde_json::Value {
        let mut buf = vec![0u8; 1024];
        let n = server.read(&mut buf).await.unwrap();
        serde_json::from_slice(&buf[..n]).unwrap()
    }

    #[tokio::test]
    async fn observation_is_answered_with_a_legal_move() {
        let (mut agent, mut server) = connected_loop().await;
        server.write_all(OBSERVATION).await.unwrap();

        let outcome = agent.tick().await.unwrap();
        let reply = read_reply(&mut server).await;
        assert_eq!(reply["action"], "move");
        let target = Coordinate::new(
            reply["targetTile"]["x"].as_i64().unwrap(),
            reply["targetTile"]["y"].as_i64().unwrap(),
        );
        assert!(target == Coordinate::new(4, 5) || target == Coordinate::new(5, 4));
        assert!(reply.get("message").is_none());
        assert!(matches!(outcome, CycleOutcome::Acted(a) if a.target_tile == Some(target)));
        assert_eq!(agent.cycles(), 1);
    }

    #[tokio::test]
    async fn ack_and_garbage_get_no_reply() {
        let (mut agent, mut server) = connected_loop().await;

        server.write_all(ACK).await.unwrap();
        assert!(matches!(agent.tick().await.unwrap(), CycleOutcome::Acknowledged(_)));

        server.write_all(b"not json at all").await.unwrap();
        assert_eq!(agent.tick().await.unwrap(), CycleOutcome::Skipped);

        // The next reply on the wire must belong to this observation.
        server.write_all(OBSERVATION).await.unwrap();
        agent.tick().await.unwrap();
        assert_eq!(read_reply(&mut server).await["action"], "move");
        assert_eq!(agent.cycles(), 3);
    }

    #[tokio::test]
    async fn backwards_time_step_is_still_answered() {
        let (mut agent, mut server) = connected_loop().await;

        server.write_all(OBSERVATION).await.unwrap();
        assert!(matches!(agent.tick().await.unwrap(), CycleOutcome::Acted(_)));
        assert_eq!(read_reply(&mut server).await["action"], "move");
        assert_eq!(agent.last_time_step, Some(4));

        let earlier = String::from_utf8(OBSERVATION.to_vec())
            .unwrap()
            .replace("\"timeStep\":4", "\"timeStep\":3");
        server.write_all(earlier.as_bytes()).await.unwrap();
        assert!(matches!(agent.tick().await.unwrap(), CycleOutcome::Acted(_)));
        assert_eq!(read_reply(&mut server).await["action"], "move");
        assert_eq!(agent.last_time_step, Some(3));
        assert_eq!(agent.cycles(), 2);
    }

    #[tokio::test]
    async fn run_returns_stream_closed_when_server_leaves() {
        let (mut agent, mut server) = connected_loop().await;
        server.write_all(OBSERVATION).await.unwrap();
        agent.tick().await.unwrap();
        let _ = read_reply(&mut server).await;
        drop(server);

        let err = agent.run().await;
        assert!(matches!(err, ConnectionError::StreamClosed), "got {err:?}");
        assert_eq!(agent.cycles(), 1);
        agent.shutdown().await;
        agent.shutdown().await;
    }
}
