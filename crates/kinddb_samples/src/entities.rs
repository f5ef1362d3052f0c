//! Entity, key, query, hook and id allocation samples.

use kinddb_core::{
    CoreError, CoreResult, Datastore, Entity, Key, KeyId, Model, ModelHooks, ModelSchema,
    Property, PropertyDescriptor, PropertyRef, PropertyValue, Query,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Declares a model newtype over [`Entity`] with a lazily built schema.
macro_rules! model {
    ($(#[$meta:meta])* $name:ident => $schema:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name(Entity);

        impl Model for $name {
            fn schema() -> Arc<ModelSchema> {
                static SCHEMA: OnceLock<Arc<ModelSchema>> = OnceLock::new();
                SCHEMA.get_or_init(|| $schema).clone()
            }

            fn wrap(entity: Entity) -> Self {
                Self(entity)
            }

            fn entity(&self) -> &Entity {
                &self.0
            }

            fn entity_mut(&mut self) -> &mut Entity {
                &mut self.0
            }

            fn into_entity(self) -> Entity {
                self.0
            }
        }
    };
}

model! {
    /// A user account.
    Account => ModelSchema::builder("Account")
        .property(Property::string("username"))
        .property(Property::integer("userid"))
        .property(Property::string("email"))
        .build()
}

impl Account {
    /// Username, if set.
    pub fn username(&self) -> Option<&str> {
        self.0.value("username").and_then(PropertyValue::as_str)
    }

    /// Email, if set.
    pub fn email(&self) -> Option<&str> {
        self.0.value("email").and_then(PropertyValue::as_str)
    }

    /// Numeric user id, if set.
    pub fn userid(&self) -> Option<i64> {
        self.0.value("userid").and_then(PropertyValue::as_integer)
    }
}

model! {
    /// A message thread, parent of its revisions.
    Message => ModelSchema::builder("Message").build()
}

model! {
    /// One revision of a message.
    Revision => ModelSchema::builder("Revision")
        .property(Property::string("message_text"))
        .build()
}

impl Revision {
    /// Message body, if set.
    pub fn message_text(&self) -> Option<&str> {
        self.0.value("message_text").and_then(PropertyValue::as_str)
    }
}

model! {
    /// Expando model with no declared properties.
    Mine => ModelSchema::builder("Mine").expando().build()
}

model! {
    /// Expando employee with two declared properties.
    FlexEmployee => ModelSchema::builder("FlexEmployee")
        .expando()
        .property(Property::string("name"))
        .property(Property::integer("age"))
        .build()
}

impl FlexEmployee {
    /// Name, if set.
    pub fn name(&self) -> Option<&str> {
        self.0.value("name").and_then(PropertyValue::as_str)
    }
}

model! {
    /// Expando whose dynamic properties are not indexed.
    Specialized => ModelSchema::builder("Specialized")
        .expando()
        .default_indexed(false)
        .build()
}

model! {
    /// A friend, watched by [`FriendHooks`].
    Friend => ModelSchema::builder("Friend")
        .property(Property::string("name"))
        .build()
}

model! {
    /// Model used for id reservation samples.
    MyModel => ModelSchema::builder("MyModel").build()
}

model! {
    /// Root of a polymorphic contact hierarchy.
    Contact => ModelSchema::builder("Contact")
        .polymodel()
        .property(Property::string("phone_number"))
        .property(Property::string("address"))
        .build()
}

model! {
    /// Contact that is a person.
    Person => ModelSchema::builder("Person")
        .extends(&Contact::schema())
        .property(Property::string("first_name"))
        .property(Property::string("last_name"))
        .build()
}

model! {
    /// Contact that is a company.
    Company => ModelSchema::builder("Company")
        .extends(&Contact::schema())
        .property(Property::string("name"))
        .build()
}

fn sandy_values() -> [(&'static str, PropertyValue); 3] {
    [
        ("username", "Sandy".into()),
        ("userid", 123.into()),
        ("email", "sandy@example.com".into()),
    ]
}

fn missing(key: &Key) -> CoreError {
    CoreError::bad_argument(format!("no entity stored under {key}"))
}

/// Builds an account from keyword values.
pub fn create_sandy_with_keywords() -> CoreResult<Account> {
    Ok(Account::wrap(Entity::with_values(
        &Account::schema(),
        sandy_values(),
    )?))
}

/// Builds an account one property at a time.
pub fn create_sandy_manually() -> CoreResult<Account> {
    let mut sandy = Account::new();
    for (name, value) in sandy_values() {
        sandy.entity_mut().set(name, value)?;
    }
    Ok(sandy)
}

/// Fails: `userid` is an integer property.
pub fn create_with_type_error_in_constructor() -> CoreResult<Account> {
    Ok(Account::wrap(Entity::with_values(
        &Account::schema(),
        [("username", "Sandy"), ("userid", "not integer")],
    )?))
}

/// Fails: `username` is a string property.
pub fn assign_with_type_error(sandy: &mut Account) -> CoreResult<()> {
    sandy.entity_mut().set("username", 42)
}

/// Stores an account and returns its new key.
pub fn store_sandy(ds: &Datastore, sandy: &mut Account) -> CoreResult<Key> {
    sandy.put(ds)
}

/// URL-safe form of a key.
pub fn url_safe_sandy_key(key: &Key) -> String {
    key.urlsafe()
}

/// Loads an account from a URL-safe key.
pub fn get_sandy_from_urlsafe(ds: &Datastore, urlsafe: &str) -> CoreResult<Option<Account>> {
    let key = Key::from_urlsafe(urlsafe)?;
    Account::get(ds, &key)
}

/// Decodes a URL-safe key into the key, its id and its kind.
pub fn id_from_urlsafe(urlsafe: &str) -> CoreResult<(Key, KeyId, String)> {
    let key = Key::from_urlsafe(urlsafe)?;
    let ident = key
        .id()
        .cloned()
        .ok_or_else(|| CoreError::bad_argument("key has no id"))?;
    let kind = key.kind().to_string();
    Ok((key, ident, kind))
}

/// Changes the email of the account under `key`.
pub fn update_key(ds: &Datastore, key: &Key) -> CoreResult<Account> {
    let mut sandy = Account::get(ds, key)?.ok_or_else(|| missing(key))?;
    sandy.entity_mut().set("email", "sandy@gmail.co.uk")?;
    sandy.put(ds)?;
    Ok(sandy)
}

/// Deletes a stored account.
pub fn delete_sandy(ds: &Datastore, sandy: &Account) -> CoreResult<()> {
    let key = sandy
        .key()
        .ok_or_else(|| CoreError::bad_argument("account has no key"))?;
    ds.delete(key)
}

/// Builds an account with a named key and returns the name.
pub fn create_sandy_named_key() -> CoreResult<String> {
    let account = Account::wrap(
        Entity::with_values(
            &Account::schema(),
            [("username", "Sandy"), ("email", "sandy@example.com")],
        )?
        .with_id("SOME@WHERE.COM")?,
    );
    account
        .key()
        .and_then(Key::string_id)
        .map(str::to_string)
        .ok_or_else(|| CoreError::bad_argument("named key lost its name"))
}

/// Assigns a complete key to an existing account.
pub fn set_key_directly(account: &mut Account) -> CoreResult<()> {
    account
        .entity_mut()
        .set_key(Key::new("Account", "SOME@WHERE.COM")?)
}

/// Stores an account under an id chosen by the datastore.
pub fn create_sandy_with_generated_numeric_id(ds: &Datastore) -> CoreResult<Account> {
    let mut sandy = Account::wrap(Entity::with_values(
        &Account::schema(),
        [("username", "Sandy"), ("email", "sandy@example.com")],
    )?);
    sandy.put(ds)?;
    Ok(sandy)
}

/// Keys of two revisions of message 123 of sandy's account.
pub fn example_message_revisions() -> CoreResult<Vec<Key>> {
    let account_key = Key::new("Account", "sandy@foo.com")?;
    let message_key = Key::with_parent("Message", 123, &account_key)?;
    Ok(vec![
        Key::with_parent("Revision", "1", &message_key)?,
        Key::with_parent("Revision", "2", &message_key)?,
    ])
}

/// Three equal ways of naming one revision, and the account key they
/// share as root.
pub fn example_revision_equivalents() -> CoreResult<(Vec<Key>, Key)> {
    let flat = Key::from_pairs([
        ("Account", KeyId::from("sandy@foo.com")),
        ("Message", KeyId::from(123)),
        ("Revision", KeyId::from("1")),
    ])?;
    let parent_pairs = Key::with_parent(
        "Revision",
        "1",
        &Key::from_pairs([
            ("Account", KeyId::from("sandy@foo.com")),
            ("Message", KeyId::from(123)),
        ])?,
    )?;
    let account_key = Key::new("Account", "sandy@foo.com")?;
    let nested = Key::with_parent(
        "Revision",
        "1",
        &Key::with_parent("Message", 123, &account_key)?,
    )?;
    Ok((vec![flat, parent_pairs, nested], account_key))
}

/// Stores the first revision of a message under sandy's account.
pub fn insert_message(ds: &Datastore) -> CoreResult<Revision> {
    let account_key = Key::new("Account", "sandy@foo.com")?;
    let message_key = Key::with_parent("Message", 123, &account_key)?;
    let mut initial_revision = Revision::wrap(
        Entity::with_values(&Revision::schema(), [("message_text", "Hello")])?
            .with_key(Key::with_parent("Revision", "1", &message_key)?)?,
    );
    initial_revision.put(ds)?;
    Ok(initial_revision)
}

/// Key of the message a revision belongs to.
pub fn get_parent_key(revision: &Revision) -> Option<Key> {
    revision.key().and_then(Key::parent)
}

/// Puts, reads back and deletes several accounts in batch calls.
pub fn multi_key_ops(ds: &Datastore, accounts: &mut [Account]) -> CoreResult<Vec<Key>> {
    let mut entities: Vec<Entity> = accounts.iter().map(|a| a.entity().clone()).collect();
    let keys = ds.put_multi(&mut entities)?;
    for (account, key) in accounts.iter_mut().zip(&keys) {
        account.entity_mut().set_key(key.clone())?;
    }

    let fetched = ds.get_multi(&keys)?;
    if let Some(pos) = fetched.iter().position(Option::is_none) {
        return Err(missing(&keys[pos]));
    }

    ds.delete_multi(&keys)?;
    Ok(keys)
}

/// Stores an expando entity with three dynamic properties.
pub fn create_expando(ds: &Datastore) -> CoreResult<Mine> {
    let mut e = Mine::new();
    e.entity_mut().populate([
        ("foo", PropertyValue::from(1)),
        ("bar", "blah".into()),
        ("tags", PropertyValue::list(["exp", "and", "oh"])),
    ])?;
    e.put(ds)?;
    Ok(e)
}

/// Properties of an expando entity, dynamic ones included.
pub fn expando_properties(e: &Mine) -> BTreeMap<String, PropertyDescriptor> {
    e.entity().properties()
}

/// Stores an employee with a dynamic `location`.
pub fn create_flex_employee(ds: &Datastore) -> CoreResult<FlexEmployee> {
    let mut employee = FlexEmployee::wrap(Entity::with_values(
        &FlexEmployee::schema(),
        [("name", "Sandy"), ("location", "SF")],
    )?);
    employee.put(ds)?;
    Ok(employee)
}

/// Properties of an entity whose dynamic properties are unindexed.
pub fn create_specialized() -> CoreResult<BTreeMap<String, PropertyDescriptor>> {
    let mut e = Specialized::new();
    e.entity_mut().set("foo", 1)?;
    e.entity_mut().set("bar", PropertyValue::list(["a"]))?;
    Ok(e.entity().properties())
}

/// Fails: `location` is dynamic, so the model has no attribute for it.
pub fn non_working_flex_query() -> CoreResult<Query> {
    let location = FlexEmployee::schema().property("location")?;
    Ok(FlexEmployee::query().filter(location.equal("SF")))
}

/// Queries a dynamic property through a generic reference.
pub fn working_flex_employee(ds: &Datastore) -> CoreResult<Vec<FlexEmployee>> {
    let query = FlexEmployee::query().filter(PropertyRef::generic("location").equal("SF"));
    ds.run_query(&query)?
        .into_iter()
        .map(FlexEmployee::from_entity)
        .collect()
}

/// Hooks that leave a note whenever a friend is made or lost.
#[derive(Debug, Default)]
pub struct FriendHooks {
    notification: Mutex<Option<String>>,
}

impl FriendHooks {
    /// Registers a fresh set of hooks for [`Friend`] on `ds`.
    pub fn install(ds: &Datastore) -> Arc<Self> {
        let hooks = Arc::new(Self::default());
        ds.register_hooks(Friend::schema().kind(), hooks.clone());
        hooks
    }

    /// Most recent notification.
    pub fn notification(&self) -> Option<String> {
        self.notification.lock().clone()
    }

    fn notify(&self, message: &str) {
        info!(message, "friend notification");
        *self.notification.lock() = Some(message.to_string());
    }
}

impl ModelHooks for FriendHooks {
    fn pre_put(&self, _entity: &mut Entity) -> CoreResult<()> {
        self.notify("Gee wiz I have a new friend!");
        Ok(())
    }

    fn post_delete(&self, _key: &Key) {
        self.notify("I suck and nobody likes me.");
    }
}

/// Steps through making and then losing a friend.
///
/// The first step stores a friend, the second deletes it. Each step yields
/// its outcome so callers can look at hook side effects in between.
pub struct HookDemo<'a> {
    ds: &'a Datastore,
    friend: Friend,
    step: u8,
}

/// Starts the hook demonstration.
pub fn demonstrate_hook(ds: &Datastore) -> HookDemo<'_> {
    HookDemo {
        ds,
        friend: Friend::new(),
        step: 0,
    }
}

impl Iterator for HookDemo<'_> {
    type Item = CoreResult<()>;

    fn next(&mut self) -> Option<Self::Item> {
        let outcome = match self.step {
            0 => self
                .friend
                .entity_mut()
                .set("name", "Carole King")
                .and_then(|()| self.friend.put(self.ds).map(drop)),
            1 => match self.friend.key() {
                Some(key) => self.ds.delete(key),
                None => Err(CoreError::bad_argument("friend was never stored")),
            },
            _ => return None,
        };
        self.step += 1;
        Some(outcome)
    }
}

/// Reserves 100 ids for [`MyModel`].
pub fn reserve_ids(ds: &Datastore) -> CoreResult<(i64, i64)> {
    MyModel::allocate_ids(ds, 100, None)
}

/// Reserves 100 ids for [`MyModel`] under `parent`.
pub fn reserve_ids_with_parent(ds: &Datastore, parent: Option<&Key>) -> CoreResult<(i64, i64)> {
    MyModel::allocate_ids(ds, 100, parent)
}

/// Keys for every id in a reserved range.
pub fn construct_keys(first: i64, last: i64) -> CoreResult<Vec<Key>> {
    (first..=last).map(|id| Key::new("MyModel", id)).collect()
}

/// Reserves every [`MyModel`] id up to `n`.
pub fn reserve_ids_up_to(ds: &Datastore, n: i64) -> CoreResult<(i64, i64)> {
    MyModel::allocate_ids_max(ds, n, None)
}

/// Stores a person and a company, then counts all contacts and just the
/// people.
pub fn polymodel_contacts(ds: &Datastore) -> CoreResult<(usize, usize)> {
    let mut person = Person::wrap(Entity::with_values(
        &Person::schema(),
        [("first_name", "Sandy"), ("last_name", "Smith"), ("phone_number", "555-0100")],
    )?);
    person.put(ds)?;
    let mut company = Company::wrap(Entity::with_values(
        &Company::schema(),
        [("name", "Acme"), ("address", "1 Main St")],
    )?);
    company.put(ds)?;

    Ok((ds.count(&Contact::query())?, ds.count(&Person::query())?))
}
