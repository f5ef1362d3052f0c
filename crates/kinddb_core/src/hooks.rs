//! Per-kind datastore hooks.

use crate::error::CoreResult;
use crate::key::Key;
use crate::model::Entity;

/// Callbacks run around datastore operations on one kind.
///
/// Every method defaults to doing nothing. A `pre_*` hook that returns an
/// error aborts the operation before anything is stored. `post_*` hooks run
/// after the store has been updated and cannot fail.
///
/// Hooks are called with no datastore lock held, so they may call back
/// into the datastore.
pub trait ModelHooks: Send + Sync {
    /// Before an entity is stored. May modify the entity.
    fn pre_put(&self, _entity: &mut Entity) -> CoreResult<()> {
        Ok(())
    }

    /// After an entity is stored under `key`.
    fn post_put(&self, _key: &Key) {}

    /// Before a key is looked up.
    fn pre_get(&self, _key: &Key) -> CoreResult<()> {
        Ok(())
    }

    /// After a lookup, with the entity if found.
    fn post_get(&self, _key: &Key, _entity: Option<&Entity>) {}

    /// Before a key is deleted.
    fn pre_delete(&self, _key: &Key) -> CoreResult<()> {
        Ok(())
    }

    /// After a key is deleted.
    fn post_delete(&self, _key: &Key) {}
}
