//! Persona trait file: one trait per line, `#` starts a comment line.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Read traits from `path`.  A missing or unreadable file yields no traits.
pub fn load_traits(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let traits = parse_traits(&raw);
            info!(path = %path.display(), count = traits.len(), "loaded persona traits");
            traits
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no persona traits loaded");
            Vec::new()
        }
    }
}

fn parse_traits(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
