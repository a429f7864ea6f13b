use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ObjectKey, ObjectType, ScopeKey, SyncObject};
use crate::error::{CoordinatorError, Result};

/// Named synchronisation objects shared across all drivers.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: DashMap<ObjectKey, Arc<SyncObject>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectEntry {
    pub key: ObjectKey,
    pub object_type: ObjectType,
    pub holder: Option<String>,
    pub signaled: Option<bool>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new object. An existing object under the same key is kept
    /// and reported as a collision.
    pub fn register_object(&self, key: ObjectKey, object: SyncObject) -> Result<Arc<SyncObject>> {
        match self.objects.entry(key) {
            Entry::Occupied(existing) => Err(CoordinatorError::ObjectCollision {
                name: existing.key().name.clone(),
                scope: existing.key().scope.to_string(),
                existing: existing.get().object_type().to_string(),
            }),
            Entry::Vacant(slot) => {
                info!("Registered {} '{}'", object.object_type(), slot.key());
                let object = Arc::new(object);
                slot.insert(object.clone());
                Ok(object)
            }
        }
    }

    /// Stores `object` unconditionally, returning whatever it displaced.
    pub fn replace_object(&self, key: ObjectKey, object: SyncObject) -> Option<Arc<SyncObject>> {
        debug!("Replacing object '{}'", key);
        self.objects.insert(key, Arc::new(object))
    }

    pub fn get_object(&self, key: &ObjectKey) -> Option<Arc<SyncObject>> {
        self.objects.get(key).map(|o| o.value().clone())
    }

    /// Looks up `key`, creating an object of `object_type` if absent. A
    /// stored object of the other type is a collision.
    pub fn get_or_create(&self, key: ObjectKey, object_type: ObjectType) -> Result<Arc<SyncObject>> {
        let name = key.name.clone();
        let entry = self
            .objects
            .entry(key)
            .or_insert_with(|| Arc::new(SyncObject::new(object_type, name)));
        let object = entry.value().clone();
        if object.object_type() != object_type {
            return Err(CoordinatorError::ObjectCollision {
                name: entry.key().name.clone(),
                scope: entry.key().scope.to_string(),
                existing: object.object_type().to_string(),
            });
        }
        Ok(object)
    }

    pub fn remove_object(&self, key: &ObjectKey) -> Option<Arc<SyncObject>> {
        self.objects.remove(key).map(|(_, o)| o)
    }

    /// Drops every object bound to `scope`; returns how many went.
    pub fn remove_scope(&self, scope: &ScopeKey) -> usize {
        let before = self.objects.len();
        self.objects.retain(|k, _| &k.scope != scope);
        let removed = before.saturating_sub(self.objects.len());
        if removed > 0 {
            debug!("Removed {} objects in scope {}", removed, scope);
        }
        removed
    }

    pub fn clear(&self) {
        self.objects.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn entries(&self) -> Vec<ObjectEntry> {
        let mut entries: Vec<ObjectEntry> = self
            .objects
            .iter()
            .map(|e| ObjectEntry {
                key: e.key().clone(),
                object_type: e.value().object_type(),
                holder: e.value().as_mutex().and_then(|m| m.holder()),
                signaled: e.value().as_event().map(|ev| ev.is_signaled()),
            })
            .collect();
        entries.sort_by_key(|e| e.key.to_string());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{LockContext, ObjectScope};

    fn key(name: &str, scope: ObjectScope) -> ObjectKey {
        ObjectKey::resolve(name, scope, &LockContext::new("d1", "s1")).unwrap()
    }

    #[test]
    fn test_register_then_get_returns_same_object() {
        let reg = ObjectRegistry::new();
        let k = key("db", ObjectScope::Global);
        let stored = reg.register_object(k.clone(), SyncObject::mutex("db")).unwrap();
        let found = reg.get_object(&k).unwrap();
        assert!(Arc::ptr_eq(&stored, &found));
    }

    #[test]
    fn test_register_collision_keeps_original() {
        let reg = ObjectRegistry::new();
        let k = key("db", ObjectScope::Script);
        let first = reg.register_object(k.clone(), SyncObject::mutex("db")).unwrap();

        let err = reg.register_object(k.clone(), SyncObject::event("db")).unwrap_err();
        assert!(matches!(err, CoordinatorError::ObjectCollision { .. }));
        assert!(Arc::ptr_eq(&first, &reg.get_object(&k).unwrap()));
    }

    #[test]
    fn test_replace_object_is_last_write_wins() {
        let reg = ObjectRegistry::new();
        let k = key("flag", ObjectScope::Global);
        reg.register_object(k.clone(), SyncObject::mutex("flag")).unwrap();
        let old = reg.replace_object(k.clone(), SyncObject::event("flag"));
        assert_eq!(old.unwrap().object_type(), ObjectType::Mutex);
        assert_eq!(reg.get_object(&k).unwrap().object_type(), ObjectType::Event);
    }

    #[test]
    fn test_get_or_create_type_mismatch() {
        let reg = ObjectRegistry::new();
        let k = key("x", ObjectScope::Global);
        let a = reg.get_or_create(k.clone(), ObjectType::Mutex).unwrap();
        let b = reg.get_or_create(k.clone(), ObjectType::Mutex).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(reg.get_or_create(k, ObjectType::Event).is_err());
    }

    #[test]
    fn test_remove_scope_leaves_other_scopes() {
        let reg = ObjectRegistry::new();
        reg.register_object(key("a", ObjectScope::Script), SyncObject::mutex("a"))
            .unwrap();
        reg.register_object(key("b", ObjectScope::Script), SyncObject::event("b"))
            .unwrap();
        reg.register_object(key("a", ObjectScope::Global), SyncObject::mutex("a"))
            .unwrap();

        assert_eq!(reg.remove_scope(&ScopeKey::Script("s1".into())), 2);
        assert_eq!(reg.len(), 1);
        assert!(reg.get_object(&key("a", ObjectScope::Global)).is_some());
    }

    #[test]
    fn test_concurrent_get_or_create_yields_single_object() {
        let reg = Arc::new(ObjectRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    reg.get_or_create(ObjectKey::global("shared").unwrap(), ObjectType::Mutex)
                        .unwrap()
                })
            })
            .collect();
        let objects: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(objects.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_entries_report_holder() {
        let reg = ObjectRegistry::new();
        let m = reg
            .register_object(ObjectKey::global("m").unwrap(), SyncObject::mutex("m"))
            .unwrap();
        m.as_mutex()
            .unwrap()
            .try_acquire("d1", std::time::Duration::from_secs(60));
        let entries = reg.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].holder.as_deref(), Some("d1"));
        assert_eq!(entries[0].signaled, None);
    }
}
