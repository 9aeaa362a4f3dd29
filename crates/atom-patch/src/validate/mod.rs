//! Integrity validation for Atom graphs.
//!
//! Structural soundness only: every reference resolves, every object is
//! fully named, and map keys are scalar. Whether the objects are at a
//! version the running code understands is the patch engine's business.

use crate::error::ValidationError;
use crate::model::{is_valid_id, Atom, AtomGraph, ObjectAtom};

/// Validates an Atom graph, returning the first issue found.
///
/// Objects are checked in traversal order, so the result is deterministic.
pub fn validate_graph(graph: &AtomGraph) -> Result<(), ValidationError> {
    match graph_issues(graph).into_iter().next() {
        Some(issue) => Err(issue),
        None => Ok(()),
    }
}

/// Lists every integrity issue of an Atom graph.
pub fn graph_issues(graph: &AtomGraph) -> Vec<ValidationError> {
    let mut issues = Vec::new();

    if let Some(root) = graph.root() {
        if !graph.contains(root) {
            issues.push(ValidationError::MissingRoot { id: root.to_string() });
        }
    }

    let mut keys: Vec<&String> = graph.entries().keys().collect();
    keys.sort_unstable();
    for key in keys {
        let Some(object) = graph.entries().get(key) else {
            continue;
        };
        if object.id() != key {
            issues.push(ValidationError::IdMismatch {
                key: key.clone(),
                id: object.id().to_string(),
            });
        }
        if !is_valid_id(object.id()) || object.classname().is_empty() || object.version().is_empty() {
            issues.push(ValidationError::IncompleteMetadata { id: key.clone() });
        }
        object_issues(graph, object, &mut issues);
    }
    issues
}

fn object_issues(graph: &AtomGraph, object: &ObjectAtom, issues: &mut Vec<ValidationError>) {
    for target in object.references() {
        if !graph.contains(&target) {
            issues.push(ValidationError::DanglingReference {
                from: object.id().to_string(),
                to: target,
            });
        }
    }
    for (name, value) in object.attributes() {
        map_key_issues(object, name, value, issues);
    }
}

/// Checks map keys at any depth of one attribute value.
fn map_key_issues(object: &ObjectAtom, attribute: &str, value: &Atom, issues: &mut Vec<ValidationError>) {
    let mut stack = vec![value];
    while let Some(atom) = stack.pop() {
        match atom {
            Atom::Sequence(items) => stack.extend(items.iter()),
            Atom::Map(entries) => {
                for (key, value) in entries {
                    if !key.is_scalar_key() {
                        issues.push(ValidationError::InvalidMapKey {
                            id: object.id().to_string(),
                            attribute: attribute.to_string(),
                            kind: key.kind(),
                        });
                    }
                    stack.push(value);
                }
            }
            _ => {}
        }
    }
}
