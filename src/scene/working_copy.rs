use std::collections::{HashMap, HashSet};

use crate::scene::item::{Scene, SceneItem};

/// Mutable, id-indexed copy of a scene.
///
/// Holds exactly the items of the snapshot it was built from. Items are
/// mutated in place and never added or removed; a fresh snapshot builds a
/// fresh working copy.
#[derive(Clone, Debug)]
pub struct WorkingCopy {
    name: String,
    items: Vec<SceneItem>,
    index: HashMap<String, usize>,
}

/// Checks that every id in `items` is unique, without copying them.
pub fn check_unique_ids(items: &[SceneItem]) -> Result<(), String> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(format!("duplicate item id \"{}\"", item.id));
        }
    }
    Ok(())
}

impl WorkingCopy {
    /// Builds the working copy, rejecting scenes with duplicate ids.
    pub fn from_scene(scene: Scene) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(scene.items.len());
        for (i, item) in scene.items.iter().enumerate() {
            if index.insert(item.id.clone(), i).is_some() {
                return Err(format!("duplicate item id \"{}\"", item.id));
            }
        }
        Ok(Self {
            name: scene.name,
            items: scene.items,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items in snapshot order. This is what the instantiation layer reads.
    pub fn items(&self) -> &[SceneItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&SceneItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut SceneItem> {
        match self.index.get(id) {
            Some(&i) => self.items.get_mut(i),
            None => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_scene(&self) -> Scene {
        Scene {
            name: self.name.clone(),
            items: self.items.clone(),
        }
    }
}
