//! Datastore facade and journal recovery.

use crate::allocator::{IdAllocator, Scope};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::hooks::ModelHooks;
use crate::journal::{Journal, JournalRecord};
use crate::key::Key;
use crate::model::{Entity, Model};
use crate::query::Query;
use crate::schema::ModelSchema;
use kinddb_codec::{to_canonical_cbor, Value};
use kinddb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// An embedded datastore.
///
/// Entities are kept in memory, ordered by key, and every mutation is
/// appended to a journal on the storage backend before it becomes visible.
/// Opening a datastore replays its journal.
///
/// # Schemas
///
/// Stored records carry their class name only. Reading a record needs the
/// class's [`ModelSchema`], which is registered automatically on `put` or
/// explicitly with [`Datastore::register`] (needed after reopening a
/// persistent datastore).
///
/// ```
/// use kinddb_core::{Datastore, Entity, ModelSchema, Property};
///
/// let ds = Datastore::open_in_memory().unwrap();
/// let schema = ModelSchema::builder("Account")
///     .property(Property::string("username"))
///     .build();
///
/// let mut sandy = Entity::with_values(&schema, [("username", "Sandy")]).unwrap();
/// let key = ds.put(&mut sandy).unwrap();
/// assert_eq!(ds.get(&key).unwrap(), Some(sandy));
///
/// ds.delete(&key).unwrap();
/// assert_eq!(ds.get(&key).unwrap(), None);
/// ```
pub struct Datastore {
    config: Config,
    inner: RwLock<Inner>,
    schemas: RwLock<HashMap<String, Arc<ModelSchema>>>,
    hooks: RwLock<HashMap<String, Arc<dyn ModelHooks>>>,
}

struct Inner {
    journal: Journal,
    records: BTreeMap<Key, Value>,
    allocator: IdAllocator,
}

fn scope_of(key: &Key) -> Scope {
    (key.parent(), key.kind().to_string())
}

impl Datastore {
    /// Opens a datastore journaled in memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(
            Config::default().sync_on_write(false),
            Box::new(InMemoryBackend::new()),
        )
    }

    /// Opens (or creates) a datastore journaled to the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a file-backed datastore with a custom configuration.
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let backend = FileBackend::open(path.as_ref())?;
        Self::open_with_backend(config, Box::new(backend))
    }

    /// Opens a datastore over any storage backend, replaying its journal.
    pub fn open_with_backend(
        config: Config,
        backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let mut journal = Journal::new(backend, config.sync_on_write);
        let scan = journal.replay(config.repair_torn_tail)?;

        let mut records = BTreeMap::new();
        let mut allocator = IdAllocator::new();
        let replayed = scan.records.len();
        for (_, record) in scan.records {
            match record {
                JournalRecord::Put { key, entity } => {
                    if let Some(id) = key.integer_id() {
                        allocator.observe(scope_of(&key), id);
                    }
                    records.insert(key, entity);
                }
                JournalRecord::Delete { key } => {
                    records.remove(&key);
                }
                JournalRecord::Allocate { kind, parent, next } => {
                    allocator.restore((parent, kind), next);
                }
            }
        }

        info!(
            records = replayed,
            entities = records.len(),
            torn_tail = scan.torn_tail,
            "datastore opened"
        );

        Ok(Self {
            config,
            inner: RwLock::new(Inner {
                journal,
                records,
                allocator,
            }),
            schemas: RwLock::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Makes a schema available for reading its class's records.
    pub fn register(&self, schema: &Arc<ModelSchema>) {
        self.schemas
            .write()
            .insert(schema.class_name().to_string(), Arc::clone(schema));
    }

    /// Installs hooks for every operation on `kind`, replacing any
    /// previously registered.
    pub fn register_hooks(&self, kind: impl Into<String>, hooks: Arc<dyn ModelHooks>) {
        self.hooks.write().insert(kind.into(), hooks);
    }

    fn hooks_for(&self, kind: &str) -> Option<Arc<dyn ModelHooks>> {
        self.hooks.read().get(kind).cloned()
    }

    fn materialize(&self, key: Key, record: &Value) -> CoreResult<Entity> {
        let class = record.text_field("class")?;
        let schema = self
            .schemas
            .read()
            .get(class)
            .cloned()
            .ok_or_else(|| CoreError::UnknownKind {
                kind: class.to_string(),
            })?;
        Ok(Entity::from_record(&schema, key, record)?)
    }

    /// Stores an entity and returns its key.
    ///
    /// An entity without a complete key gets a newly allocated integer id;
    /// the key is written back to the entity. Hooks for the kind run before
    /// and after.
    pub fn put(&self, entity: &mut Entity) -> CoreResult<Key> {
        let hooks = self.hooks_for(entity.kind());
        if let Some(hooks) = &hooks {
            hooks.pre_put(entity)?;
        }
        entity.check_initialized()?;
        self.register(entity.schema());

        let record = entity.to_record();
        let size = to_canonical_cbor(&record).len();
        if size > self.config.max_entity_bytes {
            return Err(CoreError::EntityTooLarge {
                size,
                limit: self.config.max_entity_bytes,
            });
        }

        let key = {
            let mut inner = self.inner.write();
            let mut pending = Vec::with_capacity(2);
            let key = match entity.key() {
                Some(key) if key.is_complete() => {
                    if let Some(id) = key.integer_id() {
                        inner.allocator.observe(scope_of(key), id);
                    }
                    key.clone()
                }
                partial => {
                    let partial = match partial {
                        Some(key) => key.clone(),
                        None => Key::incomplete(entity.kind(), None)?,
                    };
                    let scope = scope_of(&partial);
                    let (id, _) = inner.allocator.allocate(scope.clone(), 1)?;
                    pending.push(JournalRecord::Allocate {
                        kind: scope.1,
                        parent: scope.0,
                        next: id + 1,
                    });
                    partial.with_id(id)?
                }
            };
            pending.push(JournalRecord::Put {
                key: key.clone(),
                entity: record.clone(),
            });
            inner.journal.append_all(&pending)?;
            inner.records.insert(key.clone(), record);
            key
        };

        entity.set_key(key.clone())?;
        debug!(%key, bytes = size, "put entity");
        if let Some(hooks) = &hooks {
            hooks.post_put(&key);
        }
        Ok(key)
    }

    /// Stores several entities in order.
    pub fn put_multi(&self, entities: &mut [Entity]) -> CoreResult<Vec<Key>> {
        entities.iter_mut().map(|e| self.put(e)).collect()
    }

    /// Loads the entity stored under `key`.
    pub fn get(&self, key: &Key) -> CoreResult<Option<Entity>> {
        let hooks = self.hooks_for(key.kind());
        if let Some(hooks) = &hooks {
            hooks.pre_get(key)?;
        }
        let record = self.inner.read().records.get(key).cloned();
        let entity = record
            .map(|record| self.materialize(key.clone(), &record))
            .transpose()?;
        if let Some(hooks) = &hooks {
            hooks.post_get(key, entity.as_ref());
        }
        Ok(entity)
    }

    /// Loads several entities; missing keys yield `None`.
    pub fn get_multi(&self, keys: &[Key]) -> CoreResult<Vec<Option<Entity>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    /// Loads a typed model, checking the key's kind first.
    pub fn get_model<M: Model>(&self, key: &Key) -> CoreResult<Option<M>> {
        let schema = M::schema();
        if key.kind() != schema.kind() {
            return Err(CoreError::KindMismatch {
                expected: schema.kind().to_string(),
                actual: key.kind().to_string(),
            });
        }
        self.get(key)?.map(M::from_entity).transpose()
    }

    /// Deletes the entity under `key`. Deleting a missing key succeeds.
    pub fn delete(&self, key: &Key) -> CoreResult<()> {
        let hooks = self.hooks_for(key.kind());
        if let Some(hooks) = &hooks {
            hooks.pre_delete(key)?;
        }
        {
            let mut inner = self.inner.write();
            if inner.records.contains_key(key) {
                inner
                    .journal
                    .append(&JournalRecord::Delete { key: key.clone() })?;
                inner.records.remove(key);
                debug!(%key, "deleted entity");
            }
        }
        if let Some(hooks) = &hooks {
            hooks.post_delete(key);
        }
        Ok(())
    }

    /// Deletes several keys in order.
    pub fn delete_multi(&self, keys: &[Key]) -> CoreResult<()> {
        keys.iter().try_for_each(|k| self.delete(k))
    }

    /// Reserves `size` consecutive ids for `kind` under `parent`, returning
    /// `(first, last)`.
    pub fn allocate_ids(&self, kind: &str, parent: Option<&Key>, size: u64) -> CoreResult<(i64, i64)> {
        let scope = scope_of(&Key::incomplete(kind, parent)?);
        let mut inner = self.inner.write();
        let (first, last) = inner.allocator.allocate(scope.clone(), size)?;
        inner.journal.append(&JournalRecord::Allocate {
            kind: scope.1,
            parent: scope.0,
            next: last + 1,
        })?;
        debug!(kind, first, last, "allocated ids");
        Ok((first, last))
    }

    /// Reserves every id up to `max` for `kind` under `parent`. The range is
    /// empty (`last == first - 1`) when `max` was already passed.
    pub fn allocate_ids_max(
        &self,
        kind: &str,
        parent: Option<&Key>,
        max: i64,
    ) -> CoreResult<(i64, i64)> {
        let scope = scope_of(&Key::incomplete(kind, parent)?);
        let mut inner = self.inner.write();
        let (first, last) = inner.allocator.allocate_max(scope.clone(), max)?;
        if last >= first {
            inner.journal.append(&JournalRecord::Allocate {
                kind: scope.1,
                parent: scope.0,
                next: last + 1,
            })?;
        }
        debug!(kind, first, last, "allocated ids up to max");
        Ok((first, last))
    }

    /// Runs a query, returning matching entities.
    pub fn run_query(&self, query: &Query) -> CoreResult<Vec<Entity>> {
        let schema = query
            .class()
            .and_then(|class| self.schemas.read().get(class).cloned());
        if let Some(schema) = schema {
            query.validate(&schema)?;
        }

        let candidates: Vec<(Key, Value)> = {
            let inner = self.inner.read();
            inner
                .records
                .iter()
                .filter(|(key, _)| query.kind().map_or(true, |kind| key.kind() == kind))
                .filter(|(key, _)| query.ancestor_key().map_or(true, |a| a.is_ancestor_of(key)))
                .map(|(key, record)| (key.clone(), record.clone()))
                .collect()
        };
        let entities = candidates
            .into_iter()
            .map(|(key, record)| self.materialize(key, &record))
            .collect::<CoreResult<Vec<_>>>()?;
        query.apply(entities)
    }

    /// Runs a query, returning matching keys.
    pub fn query_keys(&self, query: &Query) -> CoreResult<Vec<Key>> {
        Ok(self
            .run_query(query)?
            .into_iter()
            .filter_map(|e| e.key().cloned())
            .collect())
    }

    /// Number of entities a query matches.
    pub fn count(&self, query: &Query) -> CoreResult<usize> {
        Ok(self.run_query(query)?.len())
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
