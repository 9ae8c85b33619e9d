// Copyright (c) 2025 arrowql contributors
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! JOIN result shapes
//!
//! A JOIN produces a virtual record. Its structure is described by a
//! [`ShapeNode`] tree built from the JOIN's result selector and persisted on
//! the JOIN operation, so that downstream WHERE / SELECT / further JOINs can
//! resolve a nested member access such as `r.user.id` back to a concrete
//! `(slot, column)` pair. Slot indices are assigned left-to-right across a
//! chain of JOINs; when chaining, the prior JOIN's shape occupies the outer
//! slots and the new inner table receives the next index.

use serde::{Deserialize, Serialize};

/// One node of a JOIN result shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeNode {
    /// A record whose properties are themselves shapes; preserves order
    Object(Vec<(String, ShapeNode)>),

    /// A single column drawn from one table slot
    Column { slot: usize, name: String },

    /// The entire row of one table slot nested as a record
    Reference { slot: usize },
}

impl ShapeNode {
    /// Look up a property of an object shape
    pub fn property(&self, name: &str) -> Option<&ShapeNode> {
        match self {
            ShapeNode::Object(props) => props
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, node)| node),
            _ => None,
        }
    }

    /// Resolve a member-access path against this shape
    ///
    /// A path ending on a `Column` yields that column; a path ending inside a
    /// `Reference` yields a column in that slot.
    pub fn resolve(&self, path: &[&str]) -> Option<ResolvedShape> {
        match (self, path) {
            (ShapeNode::Column { slot, name }, []) => Some(ResolvedShape::Column {
                slot: *slot,
                name: name.clone(),
            }),
            (ShapeNode::Reference { slot }, []) => Some(ResolvedShape::Row { slot: *slot }),
            (ShapeNode::Reference { slot }, [column]) => Some(ResolvedShape::Column {
                slot: *slot,
                name: (*column).to_string(),
            }),
            (ShapeNode::Object(_), []) => Some(ResolvedShape::Shape(self.clone())),
            (ShapeNode::Object(_), [head, rest @ ..]) => {
                self.property(head).and_then(|node| node.resolve(rest))
            }
            _ => None,
        }
    }

    /// Highest slot index mentioned anywhere in this shape
    pub fn max_slot(&self) -> usize {
        match self {
            ShapeNode::Object(props) => props.iter().map(|(_, n)| n.max_slot()).max().unwrap_or(0),
            ShapeNode::Column { slot, .. } | ShapeNode::Reference { slot } => *slot,
        }
    }
}

/// Result of resolving a member path against a shape
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedShape {
    /// A concrete column in a slot
    Column { slot: usize, name: String },
    /// A whole row of a slot
    Row { slot: usize },
    /// An intermediate object shape
    Shape(ShapeNode),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShapeNode {
        ShapeNode::Object(vec![
            ("user".to_string(), ShapeNode::Reference { slot: 0 }),
            (
                "total".to_string(),
                ShapeNode::Column {
                    slot: 1,
                    name: "total".to_string(),
                },
            ),
        ])
    }

    #[test]
    fn test_resolve_through_reference() {
        let shape = sample();
        let resolved = shape.resolve(&["user", "id"]).unwrap();
        assert_eq!(
            resolved,
            ResolvedShape::Column {
                slot: 0,
                name: "id".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_column_property() {
        let shape = sample();
        let resolved = shape.resolve(&["total"]).unwrap();
        assert_eq!(
            resolved,
            ResolvedShape::Column {
                slot: 1,
                name: "total".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_whole_row() {
        let shape = sample();
        assert_eq!(
            shape.resolve(&["user"]).unwrap(),
            ResolvedShape::Row { slot: 0 }
        );
    }

    #[test]
    fn test_max_slot() {
        assert_eq!(sample().max_slot(), 1);
    }

    #[test]
    fn test_unknown_property() {
        assert!(sample().resolve(&["missing"]).is_none());
    }
}
