//! Client-side replica of the visible world
//!
//! Tracks only the entities inside the player's area of interest. The
//! replica is mutated exclusively by the diff lists carried on state
//! messages (plus full-list resync); nothing else touches an entity.

use std::collections::HashMap;

use crate::proto::{Entity, EntityPatch};

/// Mapping from entity id to the latest snapshot of that entity
#[derive(Debug, Default)]
pub struct WorldState {
    entities: HashMap<String, Entity>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-replace each entity by id
    pub fn apply_added(&mut self, added: Vec<Entity>) {
        for entity in added {
            self.entities.insert(entity.id.clone(), entity);
        }
    }

    /// Merge partial patches over existing entities
    ///
    /// A patch for an id that is not present is silently dropped: updates
    /// never resurrect an entity. A patched `meta` replaces the previous
    /// mapping wholesale.
    pub fn apply_updated(&mut self, updated: Vec<EntityPatch>) {
        for update in updated {
            let Some(current) = self.entities.get_mut(&update.id) else {
                continue;
            };
            let patch = update.patch;
            if let Some(kind) = patch.kind {
                current.kind = kind;
            }
            if let Some(x) = patch.x {
                current.x = x;
            }
            if let Some(y) = patch.y {
                current.y = y;
            }
            if let Some(hp) = patch.hp {
                current.hp = hp;
            }
            if let Some(meta) = patch.meta {
                current.meta = meta;
            }
        }
    }

    /// Delete by id; absent ids are a no-op
    pub fn apply_removed(&mut self, removed: Vec<String>) {
        for id in removed {
            self.entities.remove(&id);
        }
    }

    /// Replace the whole replica with an authoritative full list
    pub fn reset(&mut self, entities: Vec<Entity>) {
        self.entities.clear();
        self.apply_added(entities);
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Current entity set ordered by id for stable presentation
    pub fn snapshot(&self) -> Vec<Entity> {
        let mut list: Vec<Entity> = self.entities.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::EntityFields;
    use std::collections::HashMap;

    fn entity(id: &str, x: f64, y: f64) -> Entity {
        Entity {
            id: id.to_string(),
            kind: "npc".to_string(),
            x,
            y,
            hp: 100,
            meta: HashMap::new(),
        }
    }

    fn patch(id: &str, fields: EntityFields) -> EntityPatch {
        EntityPatch {
            id: id.to_string(),
            patch: fields,
        }
    }

    #[test]
    fn added_then_patched_keeps_untouched_fields() {
        let mut world = WorldState::new();
        world.apply_added(vec![entity("e1", 0.0, 0.0)]);
        world.apply_updated(vec![patch(
            "e1",
            EntityFields {
                x: Some(10.0),
                ..Default::default()
            },
        )]);

        let e1 = world.get("e1").unwrap();
        assert_eq!(e1.x, 10.0);
        assert_eq!(e1.y, 0.0);
        assert_eq!(e1.hp, 100);
    }

    #[test]
    fn patch_for_unknown_id_is_dropped() {
        let mut world = WorldState::new();
        world.apply_updated(vec![patch(
            "ghost",
            EntityFields {
                x: Some(1.0),
                ..Default::default()
            },
        )]);
        assert!(world.is_empty());
    }

    #[test]
    fn add_replaces_existing_entity() {
        let mut world = WorldState::new();
        world.apply_added(vec![entity("e1", 0.0, 0.0)]);
        world.apply_added(vec![entity("e1", 5.0, 6.0)]);

        assert_eq!(world.len(), 1);
        let e1 = world.get("e1").unwrap();
        assert_eq!((e1.x, e1.y), (5.0, 6.0));
    }

    #[test]
    fn remove_is_a_noop_for_absent_ids() {
        let mut world = WorldState::new();
        world.apply_added(vec![entity("e1", 0.0, 0.0)]);
        world.apply_removed(vec!["e2".to_string()]);
        world.apply_removed(vec!["e1".to_string()]);
        world.apply_removed(vec!["e1".to_string()]);
        assert!(world.is_empty());
    }

    #[test]
    fn batches_apply_in_added_updated_removed_order() {
        let mut world = WorldState::new();

        // Added and updated in the same message: ends patched.
        world.apply_added(vec![entity("e1", 0.0, 0.0), entity("e2", 1.0, 1.0)]);
        world.apply_updated(vec![patch(
            "e1",
            EntityFields {
                hp: Some(25),
                ..Default::default()
            },
        )]);
        // Added and removed in the same message: ends absent.
        world.apply_removed(vec!["e2".to_string()]);

        assert_eq!(world.get("e1").unwrap().hp, 25);
        assert!(world.get("e2").is_none());
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn patched_meta_replaces_the_mapping() {
        let mut world = WorldState::new();
        let mut e1 = entity("e1", 0.0, 0.0);
        e1.meta
            .insert("guild".to_string(), rmpv::Value::from("red"));
        e1.meta.insert("level".to_string(), rmpv::Value::from(3));
        world.apply_added(vec![e1]);

        let mut new_meta = HashMap::new();
        new_meta.insert("guild".to_string(), rmpv::Value::from("blue"));
        world.apply_updated(vec![patch(
            "e1",
            EntityFields {
                meta: Some(new_meta),
                ..Default::default()
            },
        )]);

        let meta = &world.get("e1").unwrap().meta;
        assert_eq!(meta.get("guild"), Some(&rmpv::Value::from("blue")));
        assert!(meta.get("level").is_none());
    }

    #[test]
    fn reset_replaces_everything() {
        let mut world = WorldState::new();
        world.apply_added(vec![entity("e1", 0.0, 0.0), entity("e2", 1.0, 1.0)]);
        world.reset(vec![entity("e3", 2.0, 2.0)]);

        assert_eq!(world.len(), 1);
        assert!(world.get("e3").is_some());
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let mut world = WorldState::new();
        world.apply_added(vec![
            entity("b", 0.0, 0.0),
            entity("a", 0.0, 0.0),
            entity("c", 0.0, 0.0),
        ]);

        let ids: Vec<String> = world.snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
