//! Graph records

use crate::ids::EntityType;
use crate::schema::RelationshipType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property bag carried by entities and relationships
pub type PropertyMap = Map<String, Value>;

/// Property keys with a fixed meaning in the catalog
pub mod fields {
    /// Jingle → id of the fabrica it appears in (mirrors `APPEARS_IN`)
    pub const FABRICA_ID: &str = "fabricaId";
    /// Jingle → date of that fabrica (mirrors `APPEARS_IN`)
    pub const FABRICA_DATE: &str = "fabricaDate";
    /// Jingle → id of the song it versions (mirrors `VERSIONA`)
    pub const CANCION_ID: &str = "cancionId";
    /// Cancion → sorted ids of its authors (mirrors `AUTOR_DE`)
    pub const AUTOR_IDS: &str = "autorIds";

    /// Fabrica broadcast date
    pub const DATE: &str = "date";
    /// Artista display name
    pub const NOMBRE: &str = "nombre";
    /// Cancion title
    pub const TITULO: &str = "title";

    /// `APPEARS_IN` position of the jingle inside the fabrica
    pub const TIMESTAMP: &str = "timestamp";
    /// `APPEARS_IN` dense 1-based order derived from `timestamp`
    pub const ORDER: &str = "order";
}

/// A node in the catalog graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub label: String,
    pub properties: PropertyMap,
}

impl EntityRecord {
    /// Entity type named by the storage label, if it is a known one
    pub fn entity_type(&self) -> Option<EntityType> {
        EntityType::from_name(&self.label)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).filter(|v| !v.is_null())
    }

    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(Value::as_str)
    }
}

/// A directed edge with its endpoints' labels
///
/// Endpoint labels are `None` when the endpoint node is missing (dangling
/// edge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub rel_id: i64,
    pub rel_type: RelationshipType,
    pub start_id: String,
    pub start_label: Option<String>,
    pub end_id: String,
    pub end_label: Option<String>,
    pub properties: PropertyMap,
}

/// Endpoint of a relationship as reported by the audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: Option<EntityType>,
    pub label: Option<String>,
}
