use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::{CoreError, Group, GroupStore, Member, MemberStore};

/// Simple in-memory member store for tests and local development. Cloning
/// shares the underlying map.
#[derive(Clone)]
pub struct InMemoryMemberStore {
    inner: Arc<Mutex<BTreeMap<String, Member>>>,
}

/// In-memory group store, same sharing semantics as [`InMemoryMemberStore`].
#[derive(Clone)]
pub struct InMemoryGroupStore {
    inner: Arc<Mutex<BTreeMap<String, Group>>>,
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryMemberStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberStore for InMemoryMemberStore {
    fn get(&self, name: &str) -> Result<Option<Member>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))?;
        Ok(map.get(name).cloned())
    }

    fn put(&self, member: &Member) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))?;
        // Unconditional upsert: a duplicate name replaces the prior record.
        map.insert(member.name.clone(), member.clone());
        Ok(())
    }

    fn scan_all(&self) -> Result<Vec<Member>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))?;
        Ok(map.values().cloned().collect())
    }
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryGroupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupStore for InMemoryGroupStore {
    fn get(&self, name: &str) -> Result<Option<Group>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))?;
        Ok(map.get(name).cloned())
    }

    fn put(&self, group: &Group) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))?;
        map.insert(group.name.clone(), group.clone());
        Ok(())
    }

    fn append_members(&self, group_name: &str, members: &[Member]) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))?;
        match map.get_mut(group_name) {
            Some(group) => {
                group.users.extend_from_slice(members);
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn scan_all(&self) -> Result<Vec<Group>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))?;
        Ok(map.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str) -> Member {
        Member {
            name: name.into(),
            region: "us".into(),
            email: format!("{name}@x.com"),
            age: "30".into(),
            group: "g1".into(),
        }
    }

    #[test]
    fn member_put_overwrites() {
        let store = InMemoryMemberStore::new();
        store.put(&member("alice")).unwrap();
        let mut updated = member("alice");
        updated.age = "31".into();
        store.put(&updated).unwrap();

        assert_eq!(store.scan_all().unwrap().len(), 1);
        assert_eq!(store.get("alice").unwrap().unwrap().age, "31");
    }

    #[test]
    fn append_to_missing_group_is_not_found() {
        let store = InMemoryGroupStore::new();
        let err = store.append_members("ghost", &[member("alice")]).unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[test]
    fn append_keeps_insertion_order() {
        let store = InMemoryGroupStore::new();
        store
            .put(&Group {
                name: "g1".into(),
                region: "us".into(),
                users: vec![member("alice")],
            })
            .unwrap();
        store.append_members("g1", &[member("bob")]).unwrap();

        let group = store.get("g1").unwrap().unwrap();
        let names: Vec<_> = group.users.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }
}
