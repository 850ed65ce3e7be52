//! Table/list conversions under the guest's 1-based index convention

use crate::value::Argument;
use crate::{Error, Result};
use std::collections::HashMap;

/// Turn an ordered list into a map keyed by 1-based integer indices
pub fn map_from_list(list: Vec<Argument>) -> HashMap<Argument, Argument> {
    list.into_iter()
        .enumerate()
        .map(|(position, value)| (Argument::Integer(position as i64 + 1), value))
        .collect()
}

/// Linearize a map whose keys are exactly the contiguous 1..=N integer range
///
/// An `Integer(i)` key and an integral `Number(f)` key both denote index `i`.
/// Any other key, an out-of-range index, or two keys denoting the same index
/// fail with [`Error::CannotRepresentAsList`]. The result is ordered by key.
pub fn list_from_map(map: &HashMap<Argument, Argument>) -> Result<Vec<Argument>> {
    let mut slots: Vec<Option<Argument>> = vec![None; map.len()];

    for (key, value) in map {
        let position = key_position(key).ok_or(Error::CannotRepresentAsList)?;
        match slots.get_mut(position) {
            Some(slot @ None) => *slot = Some(value.clone()),
            _ => return Err(Error::CannotRepresentAsList),
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.ok_or(Error::CannotRepresentAsList))
        .collect()
}

/// 0-based position denoted by a 1-based integer-like key
fn key_position(key: &Argument) -> Option<usize> {
    let index = match *key {
        Argument::Integer(index) => index,
        Argument::Number(number) if number.fract() == 0.0 => number as i64,
        _ => return None,
    };
    (index >= 1).then(|| (index - 1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_list() -> Vec<Argument> {
        vec![
            Argument::from("first"),
            Argument::from(2i64),
            Argument::Bool(true),
        ]
    }

    #[test]
    fn list_round_trips_through_map() {
        let list = sample_list();
        let map = map_from_list(list.clone());
        assert_eq!(map.len(), 3);
        assert_eq!(map[&Argument::Integer(1)], Argument::from("first"));

        let back = list_from_map(&map).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn integral_number_keys_are_accepted() {
        let mut map = HashMap::new();
        map.insert(Argument::Number(1.0), Argument::from("a"));
        map.insert(Argument::Number(2.0), Argument::from("b"));

        let list = list_from_map(&map).unwrap();
        assert_eq!(list, vec![Argument::from("a"), Argument::from("b")]);
    }

    #[test]
    fn sparse_keys_are_rejected() {
        let mut map = HashMap::new();
        map.insert(Argument::Integer(1), Argument::from("a"));
        map.insert(Argument::Integer(3), Argument::from("c"));
        assert!(matches!(
            list_from_map(&map),
            Err(Error::CannotRepresentAsList)
        ));
    }

    #[test]
    fn non_integer_keys_are_rejected() {
        let mut map = HashMap::new();
        map.insert(Argument::from("name"), Argument::from("a"));
        assert!(list_from_map(&map).is_err());

        let mut map = HashMap::new();
        map.insert(Argument::Number(1.5), Argument::from("a"));
        assert!(list_from_map(&map).is_err());

        let mut map = HashMap::new();
        map.insert(Argument::Integer(0), Argument::from("a"));
        assert!(list_from_map(&map).is_err());
    }

    #[test]
    fn duplicate_index_across_kinds_is_rejected() {
        let mut map = HashMap::new();
        map.insert(Argument::Integer(1), Argument::from("a"));
        map.insert(Argument::Number(1.0), Argument::from("b"));
        assert_eq!(map.len(), 2);
        assert!(list_from_map(&map).is_err());
    }

    #[test]
    fn empty_containers_round_trip() {
        let map = map_from_list(Vec::new());
        assert!(map.is_empty());
        assert!(list_from_map(&map).unwrap().is_empty());
    }
}
