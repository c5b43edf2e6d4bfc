//! Prompt builders for the LLM strategy and memory summarisation.
//!
//! The system prompt is rebuilt on every call from the current persona
//! traits, so it never enters the rolling conversation window.

use serde_json::{Map, Value};
use wayfarer_types::Observation;

/// Literal movement rules given to the model.  They mirror what
/// [`validate_move`][crate::decision::validate_move] enforces.
pub const MOVEMENT_RULES: &str = "\
## Movement Rules
- Each turn you must move to a tile at most one step away on each axis (diagonals allowed).
- Staying on your current tile is a valid move.
- You may only move onto tiles listed in your surroundings.
- Water and mountain tiles can never be entered.";

/// Exact reply shape requested from the model.
pub const PROPOSAL_SHAPE: &str =
    r#"{"action": "move", "targetTile": {"x": <integer>, "y": <integer>}, "reason": "<one short sentence>"}"#;

pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You condense an explorer's reasoning into long-term memory.
Reply with a JSON object of exactly this shape: {\"memories\": [\"<sentence>\"]}
The list must contain exactly one short, factual sentence written in the first person.";

/// System prompt: persona traits followed by the movement rules.
pub fn build_system_prompt(traits: &[String]) -> String {
    let mut prompt = String::from("You are an explorer agent living in a tile-based world.\n");
    if traits.is_empty() {
        prompt.push_str("You have no particular personality traits.\n");
    } else {
        prompt.push_str("## Personality Traits\n");
        for t in traits {
            prompt.push_str("- ");
            prompt.push_str(t);
            prompt.push('\n');
        }
    }
    prompt.push('\n');
    prompt.push_str(MOVEMENT_RULES);
    prompt
}

/// User prompt: the observation as key-sorted JSON plus reply instructions.
pub fn build_user_prompt(observation: &Observation) -> String {
    let snapshot = serde_json::to_value(observation)
        .map(canonical_json)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "## Current Observation\n{snapshot}\n\n\
         Choose your next move. Reply with a single JSON object of exactly this shape and nothing else:\n\
         {PROPOSAL_SHAPE}"
    )
}

pub fn build_summary_prompt(reasoning: &str) -> String {
    format!("## Reasoning\n{reasoning}\n\nSummarise it as one memory.")
}

/// Rebuild `value` with every object's keys in lexicographic order, so the
/// serialised text is identical for identical observations.
fn canonical_json(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonical_json(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_json).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_types::{Surroundings, Tile, TileType};

    fn observation() -> Observation {
        Observation {
            agent_id: "agent-1".into(),
            time_step: 3,
            current_location: Tile { x: 2, y: 2, tile_type: TileType::Grass },
            surroundings: Surroundings {
                tiles: vec![Tile { x: 3, y: 2, tile_type: TileType::Water }],
                agents: vec![],
            },
            response_type: "observation".into(),
        }
    }

    #[test]
    fn system_prompt_lists_traits_and_rules() {
        let p = build_system_prompt(&["curious".to_string(), "avoids crowds".to_string()]);
        assert!(p.contains("- curious\n"));
        assert!(p.contains("- avoids crowds\n"));
        assert!(p.contains("Water and mountain"));
    }

    #[test]
    fn system_prompt_without_traits_still_has_rules() {
        let p = build_system_prompt(&[]);
        assert!(p.contains("no particular personality"));
        assert!(p.contains("## Movement Rules"));
    }

    #[test]
    fn user_prompt_is_deterministic_and_key_sorted() {
        let a = build_user_prompt(&observation());
        let b = build_user_prompt(&observation());
        assert_eq!(a, b);
        let agent = a.find("\"agent_id\"").unwrap();
        let current = a.find("\"currentLocation\"").unwrap();
        let time = a.find("\"timeStep\"").unwrap();
        assert!(agent < current && current < time);
        assert!(a.contains(PROPOSAL_SHAPE));
    }

    #[test]
    fn canonical_json_sorts_nested_objects() {
        let v = serde_json::json!({"b": {"z": 1, "a": 2}, "a": [{"y": 1, "x": 2}]});
        let s = serde_json::to_string(&canonical_json(v)).unwrap();
        assert_eq!(s, r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }
}
