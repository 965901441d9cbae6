//! Directional relationships between objects.
//!
//! Object `j` lies in direction `d` from object `i` when the offset
//! `coords(j) - coords(i)` projects onto the frame vector of `d` by more than
//! `epsilon`. Pairs that are nearly perpendicular to `d` are related in neither
//! `d` nor its opposite.
//!
//! The table is a cache of that rule: any edit that moves or removes objects
//! recomputes it rather than patching entries.

use std::collections::BTreeMap;

use crate::model::{dot, sub, Direction, Object, Vec3};

/// Projection threshold used by the renderer when it wrote the table.
pub const DEFAULT_EPSILON: f64 = 0.2;

/// For each horizontal direction, one sorted index list per object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipTable {
    entries: BTreeMap<Direction, Vec<Vec<usize>>>,
}

impl RelationshipTable {
    pub(crate) fn from_map(entries: BTreeMap<Direction, Vec<Vec<usize>>>) -> Self {
        Self { entries }
    }

    pub(crate) fn into_map(self) -> BTreeMap<Direction, Vec<Vec<usize>>> {
        self.entries
    }

    pub fn get(&self, direction: Direction) -> Option<&[Vec<usize>]> {
        self.entries.get(&direction).map(Vec::as_slice)
    }

    /// Objects in `direction` from `index`; empty when the direction or index
    /// is absent.
    pub fn related(&self, direction: Direction, index: usize) -> &[usize] {
        self.entries
            .get(&direction)
            .and_then(|per_object| per_object.get(index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Moves every entry from its direction to `relabel(direction)`.
    pub(crate) fn relabel(&self, relabel: impl Fn(Direction) -> Direction) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(d, e)| (relabel(*d), e.clone()))
                .collect(),
        }
    }
}

pub fn compute_relationships(
    objects: &[Object],
    directions: &BTreeMap<Direction, Vec3>,
    epsilon: f64,
) -> RelationshipTable {
    let mut entries = BTreeMap::new();
    for direction in Direction::CARDINAL {
        let Some(vector) = directions.get(&direction) else {
            continue;
        };
        let per_object: Vec<Vec<usize>> = objects
            .iter()
            .enumerate()
            .map(|(i, from)| {
                objects
                    .iter()
                    .enumerate()
                    .filter(|&(j, to)| j != i && dot(&sub(&to.coords, &from.coords), vector) > epsilon)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();
        entries.insert(direction, per_object);
    }
    RelationshipTable { entries }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f64, y: f64) -> Object {
        Object::new("cube", "small", "rubber", "gray", [x, y, 0.35])
    }

    #[test]
    fn projection_rule_relates_along_frame() {
        let objects = vec![at(0.0, 0.0), at(2.0, 0.0), at(-1.0, 1.0)];
        let table = compute_relationships(&objects, &Direction::axis_aligned_frame(), DEFAULT_EPSILON);

        assert_eq!(table.related(Direction::Right, 0), &[1]);
        assert_eq!(table.related(Direction::Left, 0), &[2]);
        assert_eq!(table.related(Direction::Left, 1), &[0, 2]);
        assert_eq!(table.related(Direction::Behind, 0), &[2]);
        assert_eq!(table.related(Direction::Front, 2), &[0, 1]);
        assert!(table.get(Direction::Above).is_none());
    }

    #[test]
    fn near_perpendicular_pairs_relate_in_neither_direction() {
        let objects = vec![at(0.0, 0.0), at(0.1, 3.0)];
        let table = compute_relationships(&objects, &Direction::axis_aligned_frame(), DEFAULT_EPSILON);
        assert!(table.related(Direction::Left, 0).is_empty());
        assert!(table.related(Direction::Right, 0).is_empty());
        assert_eq!(table.related(Direction::Behind, 0), &[1]);
    }

    #[test]
    fn relabel_moves_entries_between_directions() {
        let objects = vec![at(0.0, 0.0), at(2.0, 0.0)];
        let table = compute_relationships(&objects, &Direction::axis_aligned_frame(), DEFAULT_EPSILON);
        let swapped = table.relabel(Direction::opposite);
        assert_eq!(swapped.related(Direction::Left, 0), &[1]);
        assert_eq!(swapped.related(Direction::Right, 1), &[0]);
    }
}
