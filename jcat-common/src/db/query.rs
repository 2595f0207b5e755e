//! Typed graph query builder
//!
//! Every statement the catalog runs against the graph store is one of the
//! variants below. SQL text is fixed per variant; relationship type names and
//! node labels are always bound as parameters, never spliced into the text.
//!
//! Binding order: the variant's own parameters (type name, labels) come
//! first, followed by the caller's dynamic parameters in the order listed on
//! each variant.

use crate::ids::EntityType;
use crate::schema::RelationshipType;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

macro_rules! edge_select {
    ($tail:literal) => {
        concat!(
            "SELECT r.rel_id, r.rel_type, r.start_id, s.label AS start_label, ",
            "r.end_id, e.label AS end_label, r.properties ",
            "FROM relationships r ",
            "LEFT JOIN entities s ON s.id = r.start_id ",
            "LEFT JOIN entities e ON e.id = r.end_id ",
            $tail
        )
    };
}

/// Statements against the graph store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphQuery {
    /// All edges of a type, in insertion order. Dynamic: none.
    EdgesOfType(RelationshipType),
    /// Edges of a type leaving a node. Dynamic: start_id.
    EdgesFrom(RelationshipType),
    /// Edges of a type entering a node. Dynamic: end_id.
    EdgesInto(RelationshipType),
    /// Existence of an edge between two labeled nodes. Dynamic: start_id, end_id.
    EdgeExists {
        rel_type: RelationshipType,
        start: EntityType,
        end: EntityType,
    },
    /// One edge by identity. Dynamic: rel_id.
    EdgeById,
    /// Delete one edge by identity. Dynamic: rel_id.
    DeleteEdgeById,
    /// Delete every edge of a type between an ordered pair. Dynamic: start_id, end_id.
    DeleteEdgesBetween(RelationshipType),
    /// Create an edge. Dynamic: start_id, end_id, properties.
    CreateEdge(RelationshipType),
    /// Replace an edge's property bag. Dynamic: properties, rel_id.
    UpdateEdgeProperties,
    /// One node by id, any label. Dynamic: id.
    EntityById,
    /// One node by id carrying the given label. Dynamic: id.
    EntityWithLabel(EntityType),
    /// All nodes carrying a label, by id. Dynamic: none.
    EntitiesWithLabel(EntityType),
    /// Create a node. Dynamic: id, properties.
    CreateEntity(EntityType),
    /// Replace a node's property bag. Dynamic: properties, id.
    UpdateEntityProperties,
}

impl GraphQuery {
    /// Fixed SQL text of the statement
    pub fn sql(&self) -> &'static str {
        match self {
            GraphQuery::EdgesOfType(_) => edge_select!(
                "WHERE r.rel_type = ? ORDER BY r.rel_id"
            ),
            GraphQuery::EdgesFrom(_) => edge_select!(
                "WHERE r.rel_type = ? AND r.start_id = ? ORDER BY r.rel_id"
            ),
            GraphQuery::EdgesInto(_) => edge_select!(
                "WHERE r.rel_type = ? AND r.end_id = ? ORDER BY r.rel_id"
            ),
            GraphQuery::EdgeById => edge_select!("WHERE r.rel_id = ?"),
            GraphQuery::EdgeExists { .. } => {
                "SELECT EXISTS(\
                   SELECT 1 FROM relationships r \
                   JOIN entities s ON s.id = r.start_id AND s.label = ? \
                   JOIN entities e ON e.id = r.end_id AND e.label = ? \
                   WHERE r.rel_type = ? AND r.start_id = ? AND r.end_id = ?)"
            }
            GraphQuery::DeleteEdgeById => "DELETE FROM relationships WHERE rel_id = ?",
            GraphQuery::DeleteEdgesBetween(_) => {
                "DELETE FROM relationships WHERE rel_type = ? AND start_id = ? AND end_id = ?"
            }
            GraphQuery::CreateEdge(_) => {
                "INSERT INTO relationships (rel_type, start_id, end_id, properties) \
                 VALUES (?, ?, ?, ?)"
            }
            GraphQuery::UpdateEdgeProperties => {
                "UPDATE relationships SET properties = ? WHERE rel_id = ?"
            }
            GraphQuery::EntityById => "SELECT id, label, properties FROM entities WHERE id = ?",
            GraphQuery::EntityWithLabel(_) => {
                "SELECT id, label, properties FROM entities WHERE label = ? AND id = ?"
            }
            GraphQuery::EntitiesWithLabel(_) => {
                "SELECT id, label, properties FROM entities WHERE label = ? ORDER BY id"
            }
            GraphQuery::CreateEntity(_) => {
                "INSERT INTO entities (label, id, properties) VALUES (?, ?, ?)"
            }
            GraphQuery::UpdateEntityProperties => {
                "UPDATE entities SET properties = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?"
            }
        }
    }

    /// Parameters owned by the variant (type name, labels), bound first
    pub fn static_binds(&self) -> Vec<&'static str> {
        match *self {
            GraphQuery::EdgesOfType(t)
            | GraphQuery::EdgesFrom(t)
            | GraphQuery::EdgesInto(t)
            | GraphQuery::DeleteEdgesBetween(t)
            | GraphQuery::CreateEdge(t) => vec![t.storage_name()],
            GraphQuery::EdgeExists {
                rel_type,
                start,
                end,
            } => vec![start.label(), end.label(), rel_type.storage_name()],
            GraphQuery::EntityWithLabel(l)
            | GraphQuery::EntitiesWithLabel(l)
            | GraphQuery::CreateEntity(l) => vec![l.label()],
            GraphQuery::EdgeById
            | GraphQuery::DeleteEdgeById
            | GraphQuery::UpdateEdgeProperties
            | GraphQuery::EntityById
            | GraphQuery::UpdateEntityProperties => Vec::new(),
        }
    }

    /// Number of parameters the caller must bind after the static ones
    pub fn dynamic_arity(&self) -> usize {
        match self {
            GraphQuery::EdgesOfType(_) | GraphQuery::EntitiesWithLabel(_) => 0,
            GraphQuery::EdgesFrom(_)
            | GraphQuery::EdgesInto(_)
            | GraphQuery::EdgeById
            | GraphQuery::DeleteEdgeById
            | GraphQuery::EntityById
            | GraphQuery::EntityWithLabel(_) => 1,
            GraphQuery::EdgeExists { .. }
            | GraphQuery::DeleteEdgesBetween(_)
            | GraphQuery::UpdateEdgeProperties
            | GraphQuery::CreateEntity(_)
            | GraphQuery::UpdateEntityProperties => 2,
            GraphQuery::CreateEdge(_) => 3,
        }
    }

    /// Statement with the variant's own parameters already bound
    pub fn prepare(&self) -> Query<'static, Sqlite, SqliteArguments<'static>> {
        self.static_binds()
            .into_iter()
            .fold(sqlx::query(self.sql()), |q, value| q.bind(value.to_string()))
    }

    /// Every statement the store can issue, for inspection and tests
    pub fn all() -> Vec<GraphQuery> {
        let mut queries = Vec::new();
        for t in RelationshipType::ALL {
            queries.push(GraphQuery::EdgesOfType(t));
            queries.push(GraphQuery::EdgesFrom(t));
            queries.push(GraphQuery::EdgesInto(t));
            queries.push(GraphQuery::DeleteEdgesBetween(t));
            queries.push(GraphQuery::CreateEdge(t));
            for start in EntityType::ALL {
                for end in EntityType::ALL {
                    queries.push(GraphQuery::EdgeExists {
                        rel_type: t,
                        start,
                        end,
                    });
                }
            }
        }
        for l in EntityType::ALL {
            queries.push(GraphQuery::EntityWithLabel(l));
            queries.push(GraphQuery::EntitiesWithLabel(l));
            queries.push(GraphQuery::CreateEntity(l));
        }
        queries.extend([
            GraphQuery::EdgeById,
            GraphQuery::DeleteEdgeById,
            GraphQuery::UpdateEdgeProperties,
            GraphQuery::EntityById,
            GraphQuery::UpdateEntityProperties,
        ]);
        queries
    }
}
