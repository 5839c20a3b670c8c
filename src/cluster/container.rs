use std::cmp::Ordering;
use std::fmt;

use crate::errors::{ContainerKind, ModelError};

/// Something that can live inside a [`Container`], identified by a unique key.
pub trait Member {
    type Key: Ord + Clone + fmt::Display;

    const KIND: ContainerKind;

    fn key(&self) -> &Self::Key;

    /// Called on every child when its parent container is frozen.
    fn freeze_children(&mut self) {}
}

/// Which end of the ordering [`Container::extremum`] should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Highest,
    Lowest,
}

/// Ordered child set shared by the cluster (nodes) and nodes (VMs).
///
/// Children keep insertion order until the container is frozen. Freezing
/// sorts the children by key, recursively, and rejects any later `add` or
/// `remove` on that instance. Clones are never frozen.
#[derive(Debug)]
pub struct Container<T> {
    children: Vec<T>,
    frozen: bool,
}

impl<T> Default for Container<T> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            frozen: false,
        }
    }
}

impl<T: Clone> Clone for Container<T> {
    fn clone(&self) -> Self {
        Self {
            children: self.children.clone(),
            frozen: false,
        }
    }
}

impl<T: Member> Container<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.children.iter()
    }

    pub fn keys(&self) -> Vec<T::Key> {
        self.children.iter().map(|c| c.key().clone()).collect()
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.children.iter().find(|c| c.key() == key)
    }

    pub(crate) fn get_mut(&mut self, key: &T::Key) -> Option<&mut T> {
        self.children.iter_mut().find(|c| c.key() == key)
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.get(key).is_some()
    }

    pub fn add(&mut self, child: T) -> Result<&mut T, ModelError> {
        if self.frozen {
            return Err(ModelError::Frozen { kind: T::KIND });
        }
        if self.contains(child.key()) {
            return Err(ModelError::DuplicateChild {
                kind: T::KIND,
                key: child.key().to_string(),
            });
        }

        self.children.push(child);
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    pub fn remove(&mut self, key: &T::Key) -> Result<T, ModelError> {
        if self.frozen {
            return Err(ModelError::Frozen { kind: T::KIND });
        }

        let pos = self
            .children
            .iter()
            .position(|c| c.key() == key)
            .ok_or_else(|| ModelError::ChildNotFound {
                kind: T::KIND,
                key: key.to_string(),
            })?;

        Ok(self.children.remove(pos))
    }

    /// Sort children by key and lock the child set. Returns `false` if the
    /// container was already frozen, in which case nothing changes.
    pub fn freeze(&mut self) -> bool {
        if self.frozen {
            return false;
        }

        for child in &mut self.children {
            child.freeze_children();
        }
        self.children.sort_by(|a, b| a.key().cmp(b.key()));
        self.frozen = true;

        true
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<&T>
    where
        P: Fn(&T) -> bool,
    {
        self.children.iter().filter(|c| predicate(c)).collect()
    }

    pub fn aggregate<A, P>(&self, attr: A, predicate: P) -> u64
    where
        A: Fn(&T) -> u64,
        P: Fn(&T) -> bool,
    {
        self.children
            .iter()
            .filter(|c| predicate(c))
            .map(|c| attr(c))
            .sum()
    }

    pub fn sum<A>(&self, attr: A) -> u64
    where
        A: Fn(&T) -> u64,
    {
        self.aggregate(attr, |_| true)
    }

    /// Child with the highest or lowest `metric` among those matching
    /// `predicate`. Equal metrics are resolved by ascending key, independent
    /// of the current child order.
    pub fn extremum<K, M, P>(&self, which: Extremum, metric: M, predicate: P) -> Option<&T>
    where
        K: PartialOrd,
        M: Fn(&T) -> K,
        P: Fn(&T) -> bool,
    {
        let mut matching = self.filter(predicate);

        matching.sort_by(|a, b| {
            let by_metric = metric(a)
                .partial_cmp(&metric(b))
                .unwrap_or(Ordering::Equal);
            let by_metric = match which {
                Extremum::Lowest => by_metric,
                Extremum::Highest => by_metric.reverse(),
            };
            by_metric.then_with(|| a.key().cmp(b.key()))
        });

        matching.into_iter().next()
    }
}

impl<'a, T> IntoIterator for &'a Container<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        key: u32,
        weight: u64,
    }

    impl Member for Item {
        type Key = u32;
        const KIND: ContainerKind = ContainerKind::Vm;

        fn key(&self) -> &u32 {
            &self.key
        }
    }

    fn item(key: u32, weight: u64) -> Item {
        Item { key, weight }
    }

    fn container(items: &[(u32, u64)]) -> Container<Item> {
        let mut c = Container::new();
        for &(key, weight) in items {
            c.add(item(key, weight)).unwrap();
        }
        c
    }

    #[test]
    fn test_insertion_order_until_frozen() {
        let mut c = container(&[(3, 1), (1, 1), (2, 1)]);
        assert_eq!(c.keys(), vec![3, 1, 2]);

        assert!(c.freeze());
        assert_eq!(c.keys(), vec![1, 2, 3]);
    }

    #[test]
    fn test_freeze_twice_is_noop() {
        let mut c = container(&[(2, 1), (1, 1)]);
        assert!(c.freeze());
        let order = c.keys();

        assert!(!c.freeze());
        assert_eq!(c.keys(), order);
        assert!(c.is_frozen());
    }

    #[test]
    fn test_frozen_rejects_mutation() {
        let mut c = container(&[(1, 1)]);
        c.freeze();

        assert_eq!(
            c.add(item(2, 1)).unwrap_err(),
            ModelError::Frozen { kind: ContainerKind::Vm }
        );
        assert_eq!(
            c.remove(&1).unwrap_err(),
            ModelError::Frozen { kind: ContainerKind::Vm }
        );
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_clone_is_unfrozen_and_independent() {
        let mut c = container(&[(2, 5), (1, 7)]);
        c.freeze();

        let mut copy = c.clone();
        assert!(!copy.is_frozen());
        assert_eq!(copy.keys(), c.keys());

        copy.remove(&1).unwrap();
        copy.add(item(9, 1)).unwrap();
        assert_eq!(c.keys(), vec![1, 2]);
        assert_eq!(copy.keys(), vec![2, 9]);
    }

    #[test]
    fn test_duplicate_and_missing_keys() {
        let mut c = container(&[(1, 1)]);
        assert!(matches!(
            c.add(item(1, 2)),
            Err(ModelError::DuplicateChild { .. })
        ));
        assert!(matches!(
            c.remove(&5),
            Err(ModelError::ChildNotFound { .. })
        ));
    }

    #[test]
    fn test_extremum_tie_break_by_key() {
        // insertion order deliberately differs from key order
        let c = container(&[(7, 10), (3, 10), (5, 1)]);

        let high = c.extremum(Extremum::Highest, |i| i.weight, |_| true).unwrap();
        assert_eq!(high.key, 3);

        let low = c.extremum(Extremum::Lowest, |i| i.weight, |_| true).unwrap();
        assert_eq!(low.key, 5);
    }

    #[test]
    fn test_extremum_with_no_match() {
        let c = container(&[(1, 1), (2, 2)]);
        assert!(c
            .extremum(Extremum::Highest, |i| i.weight, |i| i.weight > 10)
            .is_none());
    }

    #[test]
    fn test_filter_and_aggregate() {
        let c = container(&[(1, 4), (2, 6), (3, 10)]);

        let heavy: Vec<u32> = c.filter(|i| i.weight > 5).iter().map(|i| i.key).collect();
        assert_eq!(heavy, vec![2, 3]);
        assert_eq!(c.aggregate(|i| i.weight, |i| i.key != 3), 10);
        assert_eq!(c.sum(|i| i.weight), 20);
    }
}
