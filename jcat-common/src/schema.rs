//! Relationship schema registry
//!
//! Canonical table of the seven relationship types and the one direction each
//! is allowed to be stored in. Built once at startup and handed to the audit
//! and fix engines by reference; nothing mutates it afterwards.

use crate::ids::EntityType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relationship types stored in the catalog graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Jingle → Fabrica
    AppearsIn,
    /// Artista → Cancion
    #[serde(rename = "AUTOR_DE")]
    AuthoredBy,
    /// Artista → Jingle
    #[serde(rename = "JINGLERO_DE")]
    Performs,
    /// Jingle → Cancion
    #[serde(rename = "VERSIONA")]
    VersionOf,
    /// Jingle → Tematica
    TaggedWith,
    /// Usuario → Artista
    #[serde(rename = "SOY_YO")]
    ClaimsIdentity,
    /// Usuario → Jingle
    #[serde(rename = "REACCIONA_A")]
    ReactsTo,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        RelationshipType::AppearsIn,
        RelationshipType::AuthoredBy,
        RelationshipType::Performs,
        RelationshipType::VersionOf,
        RelationshipType::TaggedWith,
        RelationshipType::ClaimsIdentity,
        RelationshipType::ReactsTo,
    ];

    /// Storage-level relationship type name
    pub fn storage_name(self) -> &'static str {
        match self {
            RelationshipType::AppearsIn => "APPEARS_IN",
            RelationshipType::AuthoredBy => "AUTOR_DE",
            RelationshipType::Performs => "JINGLERO_DE",
            RelationshipType::VersionOf => "VERSIONA",
            RelationshipType::TaggedWith => "TAGGED_WITH",
            RelationshipType::ClaimsIdentity => "SOY_YO",
            RelationshipType::ReactsTo => "REACCIONA_A",
        }
    }

    /// Descriptive kebab-case name
    pub fn kebab_name(self) -> &'static str {
        match self {
            RelationshipType::AppearsIn => "appears-in",
            RelationshipType::AuthoredBy => "authored-by",
            RelationshipType::Performs => "performs",
            RelationshipType::VersionOf => "is-a-version-of",
            RelationshipType::TaggedWith => "tagged-with",
            RelationshipType::ClaimsIdentity => "claims-identity",
            RelationshipType::ReactsTo => "reacts-to",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_name())
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    /// Accepts the storage name (`APPEARS_IN`, any case) or the kebab name
    /// (`appears-in`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        RelationshipType::ALL
            .into_iter()
            .find(|t| t.storage_name().eq_ignore_ascii_case(s) || t.kebab_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown relationship type '{}'", s))
    }
}

/// Canonical direction of one relationship type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationshipSpec {
    pub rel_type: RelationshipType,
    pub source: EntityType,
    pub target: EntityType,
}

impl RelationshipSpec {
    pub fn source_label(&self) -> &'static str {
        self.source.label()
    }

    pub fn target_label(&self) -> &'static str {
        self.target.label()
    }
}

/// Immutable registry of canonical relationship directions
#[derive(Debug, Clone)]
pub struct RelationshipSchema {
    entries: Vec<RelationshipSpec>,
}

impl RelationshipSchema {
    /// The catalog's canonical schema
    pub fn canonical() -> Self {
        use EntityType::*;
        use RelationshipType::*;

        let entry = |rel_type, source, target| RelationshipSpec {
            rel_type,
            source,
            target,
        };

        Self {
            entries: vec![
                entry(AppearsIn, Jingle, Fabrica),
                entry(AuthoredBy, Artista, Cancion),
                entry(Performs, Artista, Jingle),
                entry(VersionOf, Jingle, Cancion),
                entry(TaggedWith, Jingle, Tematica),
                entry(ClaimsIdentity, Usuario, Artista),
                entry(ReactsTo, Usuario, Jingle),
            ],
        }
    }

    /// Canonical (source, target) for a relationship type
    pub fn canonical_direction(&self, rel_type: RelationshipType) -> Option<&RelationshipSpec> {
        self.entries.iter().find(|e| e.rel_type == rel_type)
    }

    /// All registered relationship types, in registry order
    pub fn all_types(&self) -> Vec<RelationshipType> {
        self.entries.iter().map(|e| e.rel_type).collect()
    }

    pub fn entries(&self) -> &[RelationshipSpec] {
        &self.entries
    }

    /// Direction check on resolved entity types
    pub fn is_direction_correct_for(
        &self,
        rel_type: RelationshipType,
        source: EntityType,
        target: EntityType,
    ) -> bool {
        self.canonical_direction(rel_type)
            .map(|spec| spec.source == source && spec.target == target)
            .unwrap_or(false)
    }

    /// Direction check on type names; tolerant of case and singular/plural
    /// spellings. Unknown names are never correct.
    pub fn is_direction_correct(
        &self,
        rel_type: RelationshipType,
        source_type: &str,
        target_type: &str,
    ) -> bool {
        match (EntityType::from_name(source_type), EntityType::from_name(target_type)) {
            (Some(source), Some(target)) => self.is_direction_correct_for(rel_type, source, target),
            _ => false,
        }
    }

    /// Parse a comma-separated list of relationship type names
    ///
    /// Returns the unknown names on failure so callers can report them
    /// alongside the valid ones.
    pub fn parse_type_list(&self, list: &str) -> Result<Vec<RelationshipType>, Vec<String>> {
        let mut types = Vec::new();
        let mut unknown = Vec::new();

        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name.parse::<RelationshipType>() {
                Ok(t) if self.canonical_direction(t).is_some() => {
                    if !types.contains(&t) {
                        types.push(t);
                    }
                }
                _ => unknown.push(name.to_string()),
            }
        }

        if unknown.is_empty() {
            Ok(types)
        } else {
            Err(unknown)
        }
    }

    /// Storage names of all registered types, for help and error output
    pub fn valid_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.rel_type.storage_name()).collect()
    }
}

impl Default for RelationshipSchema {
    fn default() -> Self {
        Self::canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_direction() {
        let schema = RelationshipSchema::canonical();
        for t in RelationshipType::ALL {
            assert!(schema.canonical_direction(t).is_some(), "{} missing", t);
        }
        assert_eq!(schema.all_types().len(), 7);
    }

    #[test]
    fn test_appears_in_direction() {
        let schema = RelationshipSchema::canonical();
        let spec = schema.canonical_direction(RelationshipType::AppearsIn).unwrap();
        assert_eq!(spec.source, EntityType::Jingle);
        assert_eq!(spec.target, EntityType::Fabrica);
        assert_eq!(spec.source_label(), "Jingle");
        assert_eq!(spec.target_label(), "Fabrica");
    }

    #[test]
    fn test_direction_check_tolerates_plurals() {
        let schema = RelationshipSchema::canonical();
        assert!(schema.is_direction_correct(RelationshipType::AppearsIn, "Jingle", "Fabrica"));
        assert!(schema.is_direction_correct(RelationshipType::AppearsIn, "jingles", "fabricas"));
        assert!(schema.is_direction_correct(RelationshipType::AuthoredBy, "Artistas", "Canciones"));
        assert!(!schema.is_direction_correct(RelationshipType::AppearsIn, "Fabrica", "Jingle"));
        assert!(!schema.is_direction_correct(RelationshipType::AppearsIn, "Jingle", "Album"));
    }

    #[test]
    fn test_parse_relationship_type_names() {
        assert_eq!("APPEARS_IN".parse(), Ok(RelationshipType::AppearsIn));
        assert_eq!("appears_in".parse(), Ok(RelationshipType::AppearsIn));
        assert_eq!("is-a-version-of".parse(), Ok(RelationshipType::VersionOf));
        assert_eq!("AUTOR_DE".parse(), Ok(RelationshipType::AuthoredBy));
        assert!("LIKES".parse::<RelationshipType>().is_err());
    }

    #[test]
    fn test_parse_type_list_reports_unknown() {
        let schema = RelationshipSchema::canonical();
        assert_eq!(
            schema.parse_type_list("APPEARS_IN, VERSIONA,APPEARS_IN"),
            Ok(vec![RelationshipType::AppearsIn, RelationshipType::VersionOf])
        );
        assert_eq!(
            schema.parse_type_list("APPEARS_IN,LIKES,FOLLOWS"),
            Err(vec!["LIKES".to_string(), "FOLLOWS".to_string()])
        );
    }

    #[test]
    fn test_serde_uses_storage_names() {
        for t in RelationshipType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.storage_name()));
        }
    }
}
