use chrono::Utc;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Integer grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i64,
    pub y: i64,
}

impl Coordinate {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Per-axis absolute offsets `(dx, dy)` from `self` to `other`.
    pub fn offset_to(&self, other: &Coordinate) -> (i64, i64) {
        ((other.x - self.x).abs(), (other.y - self.y).abs())
    }

    /// Chebyshev (king-move) distance; diagonal steps count as 1.
    pub fn chebyshev_distance(&self, other: &Coordinate) -> i64 {
        let (dx, dy) = self.offset_to(other);
        dx.max(dy)
    }

    /// The four edge-adjacent neighbours, in east, west, south, north order.
    pub fn orthogonal_neighbors(&self) -> [Coordinate; 4] {
        [
            Coordinate::new(self.x + 1, self.y),
            Coordinate::new(self.x - 1, self.y),
            Coordinate::new(self.x, self.y + 1),
            Coordinate::new(self.x, self.y - 1),
        ]
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Terrain classification of a tile.
///
/// Decoding is lossy: any string the agent does not recognise becomes
/// [`TileType::Desert`] instead of failing the whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TileType {
    Desert,
    Water,
    Grass,
    Forest,
    Mountain,
    Snow,
}

impl TileType {
    /// Water and mountain tiles cannot be entered.
    pub fn is_passable(self) -> bool {
        !matches!(self, TileType::Water | TileType::Mountain)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TileType::Desert => "desert",
            TileType::Water => "water",
            TileType::Grass => "grass",
            TileType::Forest => "forest",
            TileType::Mountain => "mountain",
            TileType::Snow => "snow",
        }
    }
}

impl From<&str> for TileType {
    fn from(raw: &str) -> Self {
        match raw {
            "water" => TileType::Water,
            "grass" => TileType::Grass,
            "forest" => TileType::Forest,
            "mountain" => TileType::Mountain,
            "snow" => TileType::Snow,
            _ => TileType::Desert,
        }
    }
}

impl From<String> for TileType {
    fn from(raw: String) -> Self {
        TileType::from(raw.as_str())
    }
}

impl fmt::Display for TileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single visible tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: i64,
    pub y: i64,
    #[serde(rename = "type")]
    pub tile_type: TileType,
}

impl Tile {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.x, self.y)
    }
}

/// Another agent within view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surroundings {
    pub tiles: Vec<Tile>,
    pub agents: Vec<AgentSummary>,
}

impl Surroundings {
    /// Find the visible tile at `coord`, if any.
    pub fn tile_at(&self, coord: Coordinate) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.x == coord.x && t.y == coord.y)
    }
}

/// Periodic world snapshot sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub agent_id: String,
    #[serde(rename = "timeStep")]
    pub time_step: i64,
    #[serde(rename = "currentLocation")]
    pub current_location: Tile,
    pub surroundings: Surroundings,
    #[serde(rename = "responseType")]
    pub response_type: String,
}

impl Observation {
    pub fn position(&self) -> Coordinate {
        self.current_location.coordinate()
    }

    /// Resolve the terrain at `coord`: the visible tile set first, then the
    /// agent's own tile.
    pub fn tile_type_at(&self, coord: Coordinate) -> Option<TileType> {
        self.surroundings
            .tile_at(coord)
            .map(|t| t.tile_type)
            .or_else(|| (coord == self.position()).then_some(self.current_location.tile_type))
    }
}

/// Payload of an [`ActionAck`].  Coordinates arrive as strings on this schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckData {
    #[serde(rename = "currentTileType")]
    pub current_tile_type: String,
    pub x: String,
    pub y: String,
}

/// Server acknowledgement of a previously sent action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAck {
    pub data: AckData,
    pub message: String,
    #[serde(rename = "responseType")]
    pub response_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Move,
}

/// Outbound agent command.
///
/// Serialisation omits `targetTile` and `message` entirely when they are
/// `None`; they are never written as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Action {
    pub action: ActionKind,
    #[serde(rename = "targetTile", default)]
    pub target_tile: Option<Coordinate>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Action {
    /// A move towards `target` with no attached message.
    pub fn move_to(target: Coordinate) -> Self {
        Self {
            action: ActionKind::Move,
            target_tile: Some(target),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 1 + usize::from(self.target_tile.is_some()) + usize::from(self.message.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("action", &self.action)?;
        if let Some(target) = &self.target_tile {
            map.serialize_entry("targetTile", target)?;
        }
        if let Some(message) = &self.message {
            map.serialize_entry("message", message)?;
        }
        map.end()
    }
}

/// Structured move proposal parsed from an LLM reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MoveProposal {
    pub action: ActionKind,
    #[serde(rename = "targetTile")]
    pub target_tile: Coordinate,
    #[serde(default)]
    pub reason: Option<String>,
}

impl MoveProposal {
    pub fn to_action(&self) -> Action {
        Action {
            action: self.action,
            target_tile: Some(self.target_tile),
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Regular,
    Conversation,
    Spatial,
    Reflection,
    Action,
}

impl MemoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Regular => "regular",
            MemoryType::Conversation => "conversation",
            MemoryType::Spatial => "spatial",
            MemoryType::Reflection => "reflection",
            MemoryType::Action => "action",
        }
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(MemoryType::Regular),
            "conversation" => Ok(MemoryType::Conversation),
            "spatial" => Ok(MemoryType::Spatial),
            "reflection" => Ok(MemoryType::Reflection),
            "action" => Ok(MemoryType::Action),
            other => Err(format!("unknown memory type '{other}'")),
        }
    }
}

/// A durable factual record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(rename = "uniqueId")]
    pub unique_id: Uuid,
    #[serde(rename = "memoryType")]
    pub memory_type: MemoryType,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "textContent")]
    pub text_content: String,
    /// JSON-serialised list of related memory ids.
    pub links: String,
}

impl Memory {
    /// Construct a memory with a fresh id, the current time and no links.
    pub fn new(memory_type: MemoryType, text_content: impl Into<String>) -> Self {
        Self {
            unique_id: Uuid::new_v4(),
            memory_type,
            timestamp: Utc::now().timestamp(),
            text_content: text_content.into(),
            links: "[]".to_string(),
        }
    }

    pub fn with_links(mut self, related: &[Uuid]) -> Self {
        self.links = serde_json::to_string(related).unwrap_or_else(|_| "[]".to_string());
        self
    }

    /// Parse `links` back into ids; malformed content yields an empty list.
    pub fn linked_ids(&self) -> Vec<Uuid> {
        serde_json::from_str(&self.links).unwrap_or_default()
    }
}

/// Process-level failures that terminate the agent.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Connection failure: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}
