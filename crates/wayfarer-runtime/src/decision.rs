//! [`DecisionEngine`] – observation in, exactly one legal-or-safe action out.
//!
//! Each call to [`DecisionEngine::decide`] walks
//! `Idle → Deciding → Validating → Done → Idle`:
//!
//! 1. **Deciding** – in random-only mode, or without a strategy, a random
//!    orthogonal step is chosen.  Otherwise the [`Strategy`] proposes a move;
//!    any error it returns is logged and replaced by a random step.
//! 2. **Validating** – the move must stay within one tile on each axis and
//!    land on a visible tile that is neither water nor mountain.  Illegal
//!    moves are replaced by a random step.
//! 3. **Done** – an accepted proposal's reasoning is handed to
//!    [`Strategy::reflect`], then the engine returns to `Idle`.
//!
//! Random fallbacks go through the same validation.  [`random_action`] only
//! screens out water, so a fallback onto a mountain is replaced by the null
//! move.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use thiserror::Error;
use tracing::{debug, info, warn};
use wayfarer_types::{Action, Coordinate, Observation, TileType};

use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPhase {
    Idle,
    Deciding,
    Validating,
    Done,
}

/// Why a proposed move was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("move has no target tile")]
    NoTarget,
    #[error("target {target} is {dx},{dy} tiles away; at most 1 per axis is allowed")]
    TooFar { target: Coordinate, dx: i64, dy: i64 },
    #[error("target {0} is not in the visible surroundings")]
    NotVisible(Coordinate),
    #[error("target {target} is {tile_type} and cannot be entered")]
    Impassable { target: Coordinate, tile_type: TileType },
}

/// Check `action` against the movement rules for `observation`.
pub fn validate_move(observation: &Observation, action: &Action) -> Result<(), ValidationError> {
    let target = action.target_tile.ok_or(ValidationError::NoTarget)?;
    let (dx, dy) = observation.position().offset_to(&target);
    if dx > 1 || dy > 1 {
        return Err(ValidationError::TooFar { target, dx, dy });
    }
    let tile_type = observation
        .tile_type_at(target)
        .ok_or(ValidationError::NotVisible(target))?;
    if !tile_type.is_passable() {
        return Err(ValidationError::Impassable { target, tile_type });
    }
    Ok(())
}

/// Pick a random orthogonal neighbour that is visible and not water.
///
/// When no neighbour qualifies the agent stays where it is.
pub fn random_action<R: Rng + ?Sized>(observation: &Observation, rng: &mut R) -> Action {
    let here = observation.position();
    let candidates: Vec<Coordinate> = here
        .orthogonal_neighbors()
        .into_iter()
        .filter(|c| {
            observation
                .surroundings
                .tile_at(*c)
                .is_some_and(|t| t.tile_type != TileType::Water)
        })
        .collect();

    if candidates.is_empty() {
        debug!(x = here.x, y = here.y, "no open neighbour; staying put");
        return Action::move_to(here);
    }
    let pick = candidates[rng.gen_range(0..candidates.len())];
    Action::move_to(pick)
}

/// A random step that passes [`validate_move`], or the null move.
fn legal_fallback<R: Rng + ?Sized>(observation: &Observation, rng: &mut R) -> Action {
    let action = random_action(observation, rng);
    match validate_move(observation, &action) {
        Ok(()) => action,
        Err(e) => {
            debug!(time_step = observation.time_step, error = %e, "random step rejected; staying put");
            Action::move_to(observation.position())
        }
    }
}

pub struct DecisionEngine {
    strategy: Option<Box<dyn Strategy>>,
    random_only: bool,
    rng: Box<dyn RngCore + Send>,
    phase: DecisionPhase,
}

impl DecisionEngine {
    /// Engine using `strategy` unless `random_only` is set.
    pub fn new(strategy: Option<Box<dyn Strategy>>, random_only: bool) -> Self {
        Self {
            strategy,
            random_only,
            rng: Box::new(StdRng::from_entropy()),
            phase: DecisionPhase::Idle,
        }
    }

    /// Engine that never consults a strategy.
    pub fn random_only() -> Self {
        Self::new(None, true)
    }

    /// Replace the random source, e.g. with a seeded `StdRng` in tests.
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = rng;
        self
    }

    pub fn phase(&self) -> DecisionPhase {
        self.phase
    }

    /// Name of the active strategy, or `"random"`.
    pub fn strategy_name(&self) -> &'static str {
        match (&self.strategy, self.random_only) {
            (Some(s), false) => s.name(),
            _ => "random",
        }
    }

    /// Produce the action to send for `observation`.  Never fails.
    pub async fn decide(&mut self, observation: &Observation) -> Action {
        self.phase = DecisionPhase::Deciding;
        let time_step = observation.time_step;

        let strategy = match self.strategy.as_mut() {
            Some(s) if !self.random_only => s,
            _ => {
                self.phase = DecisionPhase::Validating;
                let action = legal_fallback(observation, &mut self.rng);
                debug!(time_step, target = ?action.target_tile, "random move");
                self.phase = DecisionPhase::Idle;
                return action;
            }
        };

        let proposal = match strategy.propose(observation).await {
            Ok(p) => p,
            Err(e) => {
                warn!(time_step, strategy = strategy.name(), error = %e, "strategy failed; moving randomly");
                self.phase = DecisionPhase::Validating;
                let action = legal_fallback(observation, &mut self.rng);
                self.phase = DecisionPhase::Idle;
                return action;
            }
        };

        self.phase = DecisionPhase::Validating;
        let action = proposal.to_action();
        if let Err(e) = validate_move(observation, &action) {
            warn!(
                time_step,
                x = observation.current_location.x,
                y = observation.current_location.y,
                error = %e,
                "rejected illegal move; moving randomly"
            );
            let fallback = legal_fallback(observation, &mut self.rng);
            self.phase = DecisionPhase::Idle;
            return fallback;
        }

        self.phase = DecisionPhase::Done;
        info!(time_step, target = ?action.target_tile, "accepted proposed move");
        if let Some(reason) = proposal.reason.as_deref() {
            strategy.reflect(reason).await;
        }
        self.phase = DecisionPhase::Idle;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{LlmClient, LlmError};
    use crate::strategy::LlmStrategy;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use wayfarer_types::{Memory, MemoryType, MoveProposal, Surroundings, Tile};

    fn tile(x: i64, y: i64, tile_type: TileType) -> Tile {
        Tile { x, y, tile_type }
    }

    /// Scenario A layout: agent at (5,5).
    fn scenario_a() -> Observation {
        Observation {
            agent_id: "agent".into(),
            time_step: 1,
            current_location: tile(5, 5, TileType::Grass),
            surroundings: Surroundings {
                tiles: vec![
                    tile(4, 5, TileType::Grass),
                    tile(6, 5, TileType::Water),
                    tile(5, 4, TileType::Forest),
                    tile(5, 6, TileType::Water),
                    tile(6, 6, TileType::Mountain),
                    tile(4, 4, TileType::Snow),
                ],
                agents: vec![],
            },
            response_type: "observation".into(),
        }
    }

    fn seeded(seed: u64) -> Box<dyn RngCore + Send> {
        Box::new(StdRng::seed_from_u64(seed))
    }

    fn is_random_fallback(action: &Action) -> bool {
        matches!(
            action.target_tile,
            Some(c) if c == Coordinate::new(4, 5) || c == Coordinate::new(5, 4)
        )
    }

    struct ScriptedStrategy {
        reply: Result<MoveProposal, ()>,
        reflections: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedStrategy {
        fn proposing(x: i64, y: i64, reason: Option<&str>) -> Self {
            Self {
                reply: Ok(MoveProposal {
                    action: wayfarer_types::ActionKind::Move,
                    target_tile: Coordinate::new(x, y),
                    reason: reason.map(str::to_string),
                }),
                reflections: Arc::default(),
            }
        }

        fn failing() -> Self {
            Self { reply: Err(()), reflections: Arc::default() }
        }
    }

    #[async_trait]
    impl Strategy for ScriptedStrategy {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn propose(&mut self, _observation: &Observation) -> Result<MoveProposal, LlmError> {
            match &self.reply {
                Ok(p) => Ok(p.clone()),
                Err(()) => Err(LlmError::MissingChoices),
            }
        }

        async fn reflect(&mut self, reasoning: &str) -> Option<Memory> {
            self.reflections.lock().unwrap().push(reasoning.to_string());
            Some(Memory::new(MemoryType::Action, reasoning))
        }
    }

    #[test]
    fn random_action_only_picks_open_orthogonal_neighbours() {
        let obs = scenario_a();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let action = random_action(&obs, &mut rng);
            assert!(is_random_fallback(&action), "seed {seed} picked {action:?}");
        }
    }

    #[test]
    fn random_action_reaches_both_candidates() {
        let obs = scenario_a();
        let mut rng = StdRng::seed_from_u64(7);
        let picks: std::collections::HashSet<_> =
            (0..100).filter_map(|_| random_action(&obs, &mut rng).target_tile).collect();
        assert_eq!(picks.len(), 2);
    }

    #[test]
    fn random_action_without_open_neighbours_stays_put() {
        let mut obs = scenario_a();
        obs.surroundings.tiles.retain(|t| t.tile_type == TileType::Water);
        let action = random_action(&obs, &mut StdRng::seed_from_u64(1));
        assert_eq!(action.target_tile, Some(Coordinate::new(5, 5)));
    }

    /// Agent at (5,5) whose only non-water orthogonal neighbour is a mountain.
    fn hemmed_in_by_mountain() -> Observation {
        Observation {
            surroundings: Surroundings {
                tiles: vec![
                    tile(6, 5, TileType::Mountain),
                    tile(4, 5, TileType::Water),
                    tile(5, 6, TileType::Water),
                    tile(5, 4, TileType::Water),
                ],
                agents: vec![],
            },
            ..scenario_a()
        }
    }

    #[tokio::test]
    async fn random_step_onto_mountain_becomes_null_move() {
        let obs = hemmed_in_by_mountain();
        // The raw random rule only screens out water.
        let raw = random_action(&obs, &mut StdRng::seed_from_u64(0));
        assert_eq!(raw.target_tile, Some(Coordinate::new(6, 5)));

        for seed in 0..20 {
            let mut engine = DecisionEngine::random_only().with_rng(seeded(seed));
            let action = engine.decide(&obs).await;
            assert_eq!(action.target_tile, Some(Coordinate::new(5, 5)));
            assert_eq!(validate_move(&obs, &action), Ok(()));
        }
    }

    #[tokio::test]
    async fn rejected_proposal_never_falls_back_onto_mountain() {
        let strategy = ScriptedStrategy::proposing(7, 7, None);
        let mut engine = DecisionEngine::new(Some(Box::new(strategy)), false).with_rng(seeded(4));
        let action = engine.decide(&hemmed_in_by_mountain()).await;
        assert_eq!(action.target_tile, Some(Coordinate::new(5, 5)));
    }

    #[test]
    fn validate_accepts_null_and_diagonal_moves() {
        let obs = scenario_a();
        assert_eq!(validate_move(&obs, &Action::move_to(Coordinate::new(5, 5))), Ok(()));
        assert_eq!(validate_move(&obs, &Action::move_to(Coordinate::new(4, 4))), Ok(()));
    }

    #[test]
    fn validate_rejects_each_rule() {
        let obs = scenario_a();
        assert!(matches!(
            validate_move(&obs, &Action::move_to(Coordinate::new(7, 5))),
            Err(ValidationError::TooFar { dx: 2, dy: 0, .. })
        ));
        assert!(matches!(
            validate_move(&obs, &Action::move_to(Coordinate::new(6, 5))),
            Err(ValidationError::Impassable { tile_type: TileType::Water, .. })
        ));
        assert!(matches!(
            validate_move(&obs, &Action::move_to(Coordinate::new(6, 6))),
            Err(ValidationError::Impassable { tile_type: TileType::Mountain, .. })
        ));
        assert_eq!(
            validate_move(&obs, &Action::move_to(Coordinate::new(6, 4))),
            Err(ValidationError::NotVisible(Coordinate::new(6, 4)))
        );
        let bare = Action { target_tile: None, ..Action::move_to(Coordinate::new(0, 0)) };
        assert_eq!(validate_move(&obs, &bare), Err(ValidationError::NoTarget));
    }

    #[tokio::test]
    async fn random_only_mode_ignores_strategy() {
        let strategy = ScriptedStrategy::proposing(4, 4, None);
        let mut engine = DecisionEngine::new(Some(Box::new(strategy)), true).with_rng(seeded(3));
        assert_eq!(engine.strategy_name(), "random");
        let action = engine.decide(&scenario_a()).await;
        assert!(is_random_fallback(&action));
    }

    #[tokio::test]
    async fn legal_proposal_is_forwarded_and_reflected() {
        let strategy = ScriptedStrategy::proposing(5, 5, Some("Resting here."));
        let reflections = strategy.reflections.clone();
        let mut engine = DecisionEngine::new(Some(Box::new(strategy)), false).with_rng(seeded(0));

        let action = engine.decide(&scenario_a()).await;
        assert_eq!(action.target_tile, Some(Coordinate::new(5, 5)));
        assert!(action.message.is_none());
        assert_eq!(*reflections.lock().unwrap(), vec!["Resting here.".to_string()]);
        assert_eq!(engine.phase(), DecisionPhase::Idle);
    }

    #[tokio::test]
    async fn illegal_proposals_fall_back_to_random() {
        for (x, y) in [(7, 5), (6, 5), (6, 6), (6, 4)] {
            let strategy = ScriptedStrategy::proposing(x, y, Some("bad idea"));
            let reflections = strategy.reflections.clone();
            let mut engine =
                DecisionEngine::new(Some(Box::new(strategy)), false).with_rng(seeded(x as u64));
            let action = engine.decide(&scenario_a()).await;
            assert!(is_random_fallback(&action), "({x},{y}) forwarded as {action:?}");
            assert!(reflections.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn strategy_error_falls_back_to_random() {
        let mut engine =
            DecisionEngine::new(Some(Box::new(ScriptedStrategy::failing())), false).with_rng(seeded(9));
        let action = engine.decide(&scenario_a()).await;
        assert!(is_random_fallback(&action));
        assert_eq!(engine.phase(), DecisionPhase::Idle);
    }

    #[tokio::test]
    async fn rate_limited_llm_falls_back_to_random() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":"rate limited"}"#)
            .create_async()
            .await;

        let strategy = LlmStrategy::new(LlmClient::new(server.url(), "m", "k").unwrap(), vec![]);
        let mut engine = DecisionEngine::new(Some(Box::new(strategy)), false).with_rng(seeded(5));
        assert_eq!(engine.strategy_name(), "llm");
        let action = engine.decide(&scenario_a()).await;
        assert!(is_random_fallback(&action));
        mock.assert_async().await;
    }
}
