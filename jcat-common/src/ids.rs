//! Entity identifier codec
//!
//! Classifies an opaque entity id into its entity type without touching the
//! database. Three shapes are recognised:
//!
//! - legacy: `JIN-…`, `CAN-…`, `ART-…`, `TEM-…`, `USU-…` (3 uppercase letters,
//!   a dash, and a non-empty free-form suffix)
//! - current: 9 characters, a lowercase type letter followed by 8 lowercase
//!   base36 characters (`j3k7p9a2q`)
//! - container: 11 characters from the video-platform alphabet
//!   (`[A-Za-z0-9_-]`), no type prefix

use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a current-format id (prefix letter + 8 base36 characters)
pub const CURRENT_ID_LEN: usize = 9;

/// Length of a container (video-platform) id
pub const CONTAINER_ID_LEN: usize = 11;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Entity types stored in the catalog graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Jingle,
    Cancion,
    Artista,
    Fabrica,
    Tematica,
    Usuario,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Jingle,
        EntityType::Cancion,
        EntityType::Artista,
        EntityType::Fabrica,
        EntityType::Tematica,
        EntityType::Usuario,
    ];

    /// Storage-level node label
    pub fn label(self) -> &'static str {
        match self {
            EntityType::Jingle => "Jingle",
            EntityType::Cancion => "Cancion",
            EntityType::Artista => "Artista",
            EntityType::Fabrica => "Fabrica",
            EntityType::Tematica => "Tematica",
            EntityType::Usuario => "Usuario",
        }
    }

    /// Single-letter prefix of current-format ids (containers have none)
    pub fn id_prefix(self) -> Option<char> {
        match self {
            EntityType::Jingle => Some('j'),
            EntityType::Cancion => Some('c'),
            EntityType::Artista => Some('a'),
            EntityType::Tematica => Some('t'),
            EntityType::Usuario => Some('u'),
            EntityType::Fabrica => None,
        }
    }

    /// Three-letter prefix of legacy ids (containers have none)
    pub fn legacy_prefix(self) -> Option<&'static str> {
        match self {
            EntityType::Jingle => Some("JIN"),
            EntityType::Cancion => Some("CAN"),
            EntityType::Artista => Some("ART"),
            EntityType::Tematica => Some("TEM"),
            EntityType::Usuario => Some("USU"),
            EntityType::Fabrica => None,
        }
    }

    /// Parse a type name, tolerating case and singular/plural spellings
    /// (`jingle`, `Jingles`, `canciones`, `Fabricas`, …)
    pub fn from_name(name: &str) -> Option<EntityType> {
        let lower = name.trim().to_ascii_lowercase();
        let singular = lower
            .strip_suffix("es")
            .filter(|s| s.ends_with('n'))
            .or_else(|| lower.strip_suffix('s'))
            .unwrap_or(lower.as_str());

        EntityType::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(singular) || t.label().eq_ignore_ascii_case(&lower))
    }

    fn from_id_prefix(c: char) -> Option<EntityType> {
        EntityType::ALL.into_iter().find(|t| t.id_prefix() == Some(c))
    }

    fn from_legacy_prefix(prefix: &str) -> Option<EntityType> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.legacy_prefix() == Some(prefix))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of classifying an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdClassification {
    pub valid: bool,
    #[serde(rename = "type")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IdClassification {
    fn valid(entity_type: EntityType) -> Self {
        Self {
            valid: true,
            entity_type: Some(entity_type),
            error: None,
        }
    }

    fn invalid(error: String) -> Self {
        Self {
            valid: false,
            entity_type: None,
            error: Some(error),
        }
    }

    /// Convert into a `Result`, carrying the id in the error
    pub fn into_result(self, id: &str) -> Result<EntityType> {
        match (self.valid, self.entity_type) {
            (true, Some(t)) => Ok(t),
            _ => Err(Error::InvalidId {
                id: id.to_string(),
                reason: self.error.unwrap_or_else(|| "unclassified".to_string()),
            }),
        }
    }
}

/// Classify an id into an entity type. Pure; no database access.
pub fn classify(id: &str) -> IdClassification {
    if let Some(t) = legacy_type(id) {
        return IdClassification::valid(t);
    }

    let len = id.chars().count();
    match len {
        CURRENT_ID_LEN => classify_current(id),
        CONTAINER_ID_LEN => {
            if id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                IdClassification::valid(EntityType::Fabrica)
            } else {
                IdClassification::invalid(format!(
                    "{}-character id contains characters outside [A-Za-z0-9_-]",
                    CONTAINER_ID_LEN
                ))
            }
        }
        _ => IdClassification::invalid(format!(
            "expected {} characters (prefixed id), {} characters (container id) \
             or a legacy PREFIX-suffix id, got {} characters",
            CURRENT_ID_LEN, CONTAINER_ID_LEN, len
        )),
    }
}

/// Shorthand for `classify(id).into_result(id)`
pub fn entity_type_of(id: &str) -> Result<EntityType> {
    classify(id).into_result(id)
}

fn legacy_type(id: &str) -> Option<EntityType> {
    let (prefix, suffix) = id.split_once('-')?;
    if prefix.len() != 3 || suffix.is_empty() || !prefix.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    EntityType::from_legacy_prefix(prefix)
}

fn classify_current(id: &str) -> IdClassification {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return IdClassification::invalid("empty id".to_string());
    };

    let Some(entity_type) = EntityType::from_id_prefix(first) else {
        return IdClassification::invalid(format!(
            "unknown prefix '{}' (expected one of j, c, a, t, u)",
            first
        ));
    };

    if let Some(bad) = chars.find(|c| !(c.is_ascii_digit() || c.is_ascii_lowercase())) {
        return IdClassification::invalid(format!(
            "suffix character '{}' is not lowercase base36",
            bad
        ));
    }

    IdClassification::valid(entity_type)
}

/// Generate a fresh current-format id for the given type
///
/// Containers carry externally sourced ids and cannot be generated.
pub fn generate(entity_type: EntityType) -> Result<String> {
    let prefix = entity_type.id_prefix().ok_or_else(|| {
        Error::InvalidInput(format!("{} ids are sourced externally", entity_type))
    })?;

    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(CURRENT_ID_LEN);
    id.push(prefix);
    for _ in 1..CURRENT_ID_LEN {
        id.push(BASE36[rng.gen_range(0..BASE36.len())] as char);
    }
    Ok(id)
}
