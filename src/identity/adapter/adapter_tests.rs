use std::collections::BTreeSet;

use super::*;
use crate::identity::attributes::IdentityAttribute;
use crate::identity::model::NewUser;
use crate::storage::MemoryDocumentStore;

fn setup_with(index: AttributeIndex) -> (MemoryDocumentStore, IndexedUserDatastore) {
    let mem = MemoryDocumentStore::new();
    identity_migrator(&index).run(&mem).unwrap();
    let users = IndexedUserDatastore::new(Arc::new(mem.clone()), index).unwrap();
    (mem, users)
}

fn setup() -> (MemoryDocumentStore, IndexedUserDatastore) { setup_with(AttributeIndex::default()) }

#[test]
fn construction_requires_migration() {
    let mem = MemoryDocumentStore::new();
    let res = IndexedUserDatastore::new(Arc::new(mem), AttributeIndex::default());
    assert!(matches!(res, Err(XmailError::Programming(_))));
}

#[test]
fn persist_assigns_pk_and_uniquifier() {
    let (_mem, users) = setup();
    let u = users.put_user(User::new("alice", "digest")).unwrap();
    assert!(u.pk.as_deref().map(|s| !s.is_empty()).unwrap_or(false));
    assert!(!u.fs_uniquifier.is_empty());
    assert_eq!(u.username, "alice");
    assert_eq!(u.password_digest, "digest");

    let found = users.find_user(&UserQuery::fs_uniquifier(u.fs_uniquifier.clone())).unwrap().unwrap();
    assert_eq!(found, u);
}

#[test]
fn persist_is_whole_record_replace() {
    let (_mem, users) = setup();
    let mut u = users.put_user(User::new("alice", "d1")).unwrap();
    u.roles.insert("ghost".into());
    u.password_digest = "d2".into();
    let pk = u.pk.clone();
    users.put_user(u).unwrap();

    let mut replacement = User::new("alice", "d3");
    replacement.pk = pk.clone();
    replacement.fs_uniquifier = "fixed".into();
    users.put_user(replacement).unwrap();

    let found = users.find_user_by_username("alice").unwrap().unwrap();
    assert_eq!(found.pk, pk);
    assert_eq!(found.password_digest, "d3");
    // No merge with the previous document.
    assert!(found.roles.is_empty());
}

#[test]
fn duplicate_username_is_rejected() {
    let (mem, users) = setup();
    let first = users.put_user(User::new("alice", "d")).unwrap();
    let err = users.put_user(User::new("alice", "other")).unwrap_err();
    assert!(matches!(err, XmailError::Conflict(_)));
    assert_eq!(mem.len("user"), 1);
    assert_eq!(users.find_user_by_username("alice").unwrap().unwrap().pk, first.pk);
}

#[test]
fn unknown_attributes_are_dropped() {
    let (_mem, users) = setup();
    users.put_user(User::new("alice", "d")).unwrap();
    let plain = users.find_user(&UserQuery::username("alice")).unwrap();
    let noisy = users.find_user(&UserQuery::username("alice").and("bogus", "x")).unwrap();
    assert!(plain.is_some());
    assert_eq!(plain, noisy);
}

#[test]
fn only_unknown_attributes_issue_no_query() {
    let (mem, users) = setup();
    users.put_user(User::new("alice", "d")).unwrap();
    let before = mem.lookup_count();
    assert!(users.find_user(&UserQuery::by("bogus", "x")).unwrap().is_none());
    assert!(users.find_user(&UserQuery::new()).unwrap().is_none());
    assert_eq!(mem.lookup_count(), before);
}

#[test]
fn email_is_not_queryable_unless_declared() {
    let (_mem, users) = setup();
    let mut u = User::new("alice", "d");
    u.email = Some("alice@example.org".into());
    users.put_user(u).unwrap();
    assert!(users.find_user(&UserQuery::email("alice@example.org")).unwrap().is_none());

    let (_mem, users) = setup_with(AttributeIndex::new(vec![IdentityAttribute::folded(UserAttribute::Email)]));
    let mut u = User::new("alice", "d");
    u.email = Some("Alice@Example.org".into());
    users.put_user(u).unwrap();
    let found = users.find_user(&UserQuery::email("ALICE@example.ORG")).unwrap().unwrap();
    assert_eq!(found.email.as_deref(), Some("alice@example.org"));
}

#[test]
fn lookup_scans_attributes_in_declared_order() {
    let (_mem, users) = setup();
    let alice = users.put_user(User::new("alice", "d")).unwrap();
    let bob = users.put_user(User::new("bob", "d")).unwrap();
    // username is declared before fs_uniquifier, so it decides.
    let q = UserQuery::fs_uniquifier(bob.fs_uniquifier.clone()).and("username", "alice");
    assert_eq!(users.find_user(&q).unwrap().unwrap().pk, alice.pk);
    // A miss on the first attribute falls through to the next.
    let q = UserQuery::username("nobody").and("fs_uniquifier", bob.fs_uniquifier.clone());
    assert_eq!(users.find_user(&q).unwrap().unwrap().pk, bob.pk);
}

#[test]
fn case_insensitive_request_degrades_to_exact_match() {
    let (_mem, users) = setup();
    users.put_user(User::new("Alice", "d")).unwrap();
    let q = UserQuery::username("alice").case_insensitive(true);
    assert!(users.find_user(&q).unwrap().is_none());
    let q = UserQuery::username("Alice").case_insensitive(true);
    assert!(users.find_user(&q).unwrap().is_some());
}

#[test]
fn case_insensitive_declaration_normalises_usernames() {
    let (_mem, users) = setup_with(AttributeIndex::new(vec![IdentityAttribute::folded(UserAttribute::Username)]));
    let u = users.put_user(User::new("  Alice ", "d")).unwrap();
    assert_eq!(u.username, "alice");
    assert!(users.find_user_by_username("ALICE").unwrap().is_some());
    assert!(matches!(users.put_user(User::new("aLiCe", "d")), Err(XmailError::Conflict(_))));
}

#[test]
fn exact_usernames_are_stored_as_given() {
    let (_mem, users) = setup();
    let u = users.put_user(User::new(" bob ", "d")).unwrap();
    assert_eq!(u.username, " bob ");
    assert!(users.find_user_by_username("bob").unwrap().is_none());
    assert_eq!(users.find_user_by_username(" bob ").unwrap().unwrap().pk, u.pk);
    // a trimmed twin is a different username under exact matching
    users.put_user(User::new("bob", "d")).unwrap();
}

#[test]
fn roles_find_and_uniqueness() {
    let (_mem, users) = setup();
    let perms: BTreeSet<String> = ["mail.send".to_string()].into_iter().collect();
    let admin = users.create_role("admin", perms).unwrap();
    assert!(admin.pk.is_some());
    assert_eq!(users.find_role("admin").unwrap().unwrap(), admin);
    assert!(users.find_role("Admin").unwrap().is_none());
    assert!(matches!(users.create_role("admin", BTreeSet::new()), Err(XmailError::Conflict(_))));
    assert_eq!(users.find_or_create_role("admin").unwrap().pk, admin.pk);
    assert!(users.find_or_create_role("editor").unwrap().pk.is_some());
}

#[test]
fn role_membership_is_duplicate_free() {
    let (_mem, users) = setup();
    users.create_role("admin", BTreeSet::new()).unwrap();
    let mut u = users.create_user(NewUser::new("alice", "d")).unwrap();
    assert!(users.add_role_to_user(&mut u, "admin").unwrap());
    assert!(!users.add_role_to_user(&mut u, "admin").unwrap());
    let stored = users.find_user_by_username("alice").unwrap().unwrap();
    assert_eq!(stored.roles.len(), 1);
    assert!(stored.has_role("admin"));
    assert!(matches!(users.add_role_to_user(&mut u, "missing"), Err(XmailError::NotFound(_))));
    assert!(users.remove_role_from_user(&mut u, "admin").unwrap());
    assert!(!users.remove_role_from_user(&mut u, "admin").unwrap());
}

#[test]
fn deletes_do_not_cascade() {
    let (mem, users) = setup();
    let perms: BTreeSet<String> = ["mail.read".to_string()].into_iter().collect();
    let role = users.create_role("reader", perms).unwrap();
    let u = users.create_user(NewUser::new("alice", "d").role("reader")).unwrap();
    assert!(users.user_has_permission(&u, "mail.read").unwrap());

    users.delete(&Entity::Role(role)).unwrap();
    // The user survives with a dangling reference that grants nothing.
    let u = users.find_user_by_username("alice").unwrap().unwrap();
    assert!(u.has_role("reader"));
    assert!(!users.user_has_permission(&u, "mail.read").unwrap());

    users.create_role("other", BTreeSet::new()).unwrap();
    users.delete_user(&u).unwrap();
    assert!(users.find_user_by_username("alice").unwrap().is_none());
    assert!(users.find_role("other").unwrap().is_some());
    assert_eq!(mem.len("user"), 0);
}

#[test]
fn deleting_unsaved_entity_is_a_programming_error() {
    let (_mem, users) = setup();
    let err = users.delete(&Entity::User(User::new("ghost", "d"))).unwrap_err();
    assert!(matches!(err, XmailError::Programming(_)));
}

#[test]
fn activation_and_uniquifier_rotation() {
    let (_mem, users) = setup();
    let mut u = users.create_user(NewUser::new("alice", "d")).unwrap();
    assert!(users.deactivate_user(&mut u).unwrap());
    assert!(!users.deactivate_user(&mut u).unwrap());
    assert!(!users.find_user_by_username("alice").unwrap().unwrap().active);
    assert!(users.toggle_active(&mut u).unwrap());
    assert!(users.find_user_by_username("alice").unwrap().unwrap().active);

    let old = u.fs_uniquifier.clone();
    users.reset_uniquifier(&mut u).unwrap();
    assert_ne!(u.fs_uniquifier, old);
    assert!(users.find_user(&UserQuery::fs_uniquifier(old)).unwrap().is_none());
    assert!(users.find_user(&UserQuery::fs_uniquifier(u.fs_uniquifier.clone())).unwrap().is_some());
}

#[test]
fn transport_failures_propagate_as_unavailable() {
    let (mem, users) = setup();
    users.put_user(User::new("alice", "d")).unwrap();
    mem.set_available(false);
    assert!(users.find_user_by_username("alice").unwrap_err().is_unavailable());
    assert!(users.find_role("admin").unwrap_err().is_unavailable());
    assert!(users.put_user(User::new("bob", "d")).unwrap_err().is_unavailable());
    mem.set_available(true);
    // Nothing was half-written while the store was down.
    assert!(users.find_user_by_username("bob").unwrap().is_none());
}
