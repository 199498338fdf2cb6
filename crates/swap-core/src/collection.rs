//! Keyed entity containers with get-or-create access.
//!
//! Classification order and gold order are not coordinated, so any user or
//! subject may be referenced before it exists. A [`Collection`] resolves
//! unknown keys through an explicit factory supplied at construction time
//! and keeps entities in insertion order for bulk passes and exports.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use swap_common::{SubjectId, UserId};

use crate::model::{Subject, User};

/// Entities that know their own key.
pub trait Keyed {
    type Key: Clone + Eq + Hash + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// Default-construction rule for unknown keys.
pub type Factory<V> = Arc<dyn Fn(&<V as Keyed>::Key) -> V + Send + Sync>;

pub struct Collection<V: Keyed> {
    items: Vec<V>,
    index: HashMap<V::Key, usize>,
    factory: Factory<V>,
}

pub type Users = Collection<User>;
pub type Subjects = Collection<Subject>;

impl<V: Keyed> Collection<V> {
    pub fn new(factory: Factory<V>) -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            factory,
        }
    }

    /// Rebuild from previously dumped entities. Later duplicates replace
    /// earlier ones in place.
    pub fn from_items(items: impl IntoIterator<Item = V>, factory: Factory<V>) -> Self {
        let mut collection = Self::new(factory);
        for item in items {
            collection.insert(item);
        }
        collection
    }

    /// Insert or replace an entity, keeping the original position on replace.
    pub fn insert(&mut self, item: V) {
        match self.index.get(item.key()) {
            Some(&pos) => self.items[pos] = item,
            None => {
                self.index.insert(item.key().clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    /// Resolve a key, creating the entity through the factory if needed.
    pub fn get_or_create(&mut self, key: &V::Key) -> &mut V {
        let pos = match self.index.get(key) {
            Some(&pos) => pos,
            None => {
                let item = (self.factory)(key);
                let pos = self.items.len();
                self.index.insert(key.clone(), pos);
                self.items.push(item);
                pos
            }
        };
        &mut self.items[pos]
    }

    pub fn get(&self, key: &V::Key) -> Option<&V> {
        self.index.get(key).map(|&pos| &self.items[pos])
    }

    pub fn get_mut(&mut self, key: &V::Key) -> Option<&mut V> {
        match self.index.get(key) {
            Some(&pos) => Some(&mut self.items[pos]),
            None => None,
        }
    }

    pub fn contains(&self, key: &V::Key) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entities in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, V> {
        self.items.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &V::Key> {
        self.items.iter().map(Keyed::key)
    }

    pub fn factory(&self) -> Factory<V> {
        Arc::clone(&self.factory)
    }
}

impl<V: Keyed + Clone> Collection<V> {
    /// Entities as a plain list, suitable for serialization.
    pub fn dump(&self) -> Vec<V> {
        self.items.clone()
    }
}

impl<V: Keyed + Clone> Clone for Collection<V> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            index: self.index.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<V: Keyed + fmt::Debug> fmt::Debug for Collection<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("len", &self.items.len())
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl<'a, V: Keyed> IntoIterator for &'a Collection<V> {
    type Item = &'a V;
    type IntoIter = std::slice::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Users are created anonymous with the configured pseudo-count.
pub fn user_factory(gamma: f64) -> Factory<User> {
    Arc::new(move |id: &UserId| User::new(id.clone(), None, gamma))
}

/// Subjects are created unlabelled at the population prior.
pub fn subject_factory(p0: f64) -> Factory<Subject> {
    Arc::new(move |id: &SubjectId| Subject::new(*id, p0))
}
