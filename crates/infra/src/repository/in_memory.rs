use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;

use cascade_core::{AggregateRoot, Entity};

use super::r#trait::RepositoryBackend;

/// In-memory repository backend.
///
/// Stores snapshots keyed by `key_of(entity)`; `add` and `update` both
/// overwrite. Intended for tests/dev.
pub struct InMemoryRepository<A, K> {
    items: RwLock<HashMap<K, A>>,
    key_of: fn(&A) -> K,
}

impl<A, K> InMemoryRepository<A, K>
where
    A: AggregateRoot,
    K: Hash + Eq + Send + Sync + 'static,
{
    pub fn new(key_of: fn(&A) -> K) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            key_of,
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, entity: &A) -> anyhow::Result<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| anyhow!("lock poisoned"))?;
        items.insert((self.key_of)(entity), entity.clone());
        Ok(())
    }
}

#[async_trait]
impl<A, K> RepositoryBackend for InMemoryRepository<A, K>
where
    A: AggregateRoot,
    K: Hash + Eq + Send + Sync + 'static,
{
    type Entity = A;
    type Key = K;

    async fn add(&self, entity: &A) -> anyhow::Result<()> {
        self.store(entity)
    }

    async fn get(&self, key: &K) -> anyhow::Result<Option<A>> {
        let items = self.items.read().map_err(|_| anyhow!("lock poisoned"))?;
        Ok(items.get(key).cloned())
    }

    async fn update(&self, entity: &A) -> anyhow::Result<()> {
        self.store(entity)
    }
}

impl<A: Entity, K> fmt::Debug for InMemoryRepository<A, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRepository")
            .field("entity_type", &A::type_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{EventBuffer, FieldMap};

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Note {
        id: i64,
        body: String,
        events: EventBuffer,
    }

    impl Entity for Note {
        fn fields(&self) -> FieldMap {
            FieldMap::new()
                .with("id", self.id)
                .with("body", self.body.as_str())
        }
    }

    impl AggregateRoot for Note {
        fn events(&self) -> &EventBuffer {
            &self.events
        }

        fn events_mut(&mut self) -> &mut EventBuffer {
            &mut self.events
        }
    }

    fn note(id: i64, body: &str) -> Note {
        Note {
            id,
            body: body.into(),
            events: EventBuffer::new(),
        }
    }

    #[tokio::test]
    async fn stores_snapshots_by_key() {
        let backend = InMemoryRepository::new(|n: &Note| n.id);

        backend.add(&note(1, "draft")).await.unwrap();
        backend.update(&note(1, "final")).await.unwrap();
        backend.add(&note(2, "other")).await.unwrap();

        assert_eq!(backend.len(), 2);
        assert_eq!(backend.get(&1).await.unwrap(), Some(note(1, "final")));
        assert_eq!(backend.get(&3).await.unwrap(), None);
    }
}
