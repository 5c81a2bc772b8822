use repokit_core::db::open_db_in_memory;
use repokit_core::{
    ActorContext, ActorResolutionError, AuditingHook, EntityRepository, Item, Member,
    MemberRepository, PersistenceSession, RepoError, SqliteSession, StaticActor,
};
use std::cell::Cell;
use std::rc::Rc;

fn clock(tick: &Rc<Cell<i64>>) -> impl Fn() -> i64 {
    let tick = Rc::clone(tick);
    move || tick.get()
}

#[test]
fn new_entity_gets_identical_created_and_updated_stamps() {
    let conn = open_db_in_memory().unwrap();
    let tick = Rc::new(Cell::new(1_000_i64));
    let actor = ActorContext::new();
    let mut session =
        SqliteSession::new(&conn).with_hook(AuditingHook::new(clock(&tick), actor.clone()));
    let members = MemberRepository::new().unwrap();

    actor.set("alice").unwrap();
    let mut member = Member::with_age("member1", 10);
    members.save_and_flush(&mut session, &mut member).unwrap();

    assert_eq!(member.audit.created_at, Some(1_000));
    assert_eq!(member.audit.created_at, member.audit.updated_at);
    assert_eq!(member.audit.created_by.as_deref(), Some("alice"));
    assert_eq!(member.audit.created_by, member.audit.updated_by);
}

#[test]
fn update_changes_only_modification_fields() {
    let conn = open_db_in_memory().unwrap();
    let tick = Rc::new(Cell::new(1_000_i64));
    let actor = ActorContext::new();
    let mut session =
        SqliteSession::new(&conn).with_hook(AuditingHook::new(clock(&tick), actor.clone()));
    let members = MemberRepository::new().unwrap();

    actor.set("alice").unwrap();
    let mut member = Member::with_age("member1", 10);
    members.save_and_flush(&mut session, &mut member).unwrap();

    tick.set(2_000);
    actor.set("bob").unwrap();
    member.username = "member2".to_string();
    members.save_and_flush(&mut session, &mut member).unwrap();
    session.clear();

    let reloaded = members
        .find_by_id(&mut session, member.id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.username, "member2");
    assert_eq!(reloaded.audit.created_at, Some(1_000));
    assert_eq!(reloaded.audit.updated_at, Some(2_000));
    assert_eq!(reloaded.audit.created_by.as_deref(), Some("alice"));
    assert_eq!(reloaded.audit.updated_by.as_deref(), Some("bob"));
}

#[test]
fn hooks_run_once_per_write() {
    let conn = open_db_in_memory().unwrap();
    let tick = Rc::new(Cell::new(1_000_i64));
    let mut session = SqliteSession::new(&conn)
        .with_hook(AuditingHook::new(clock(&tick), StaticActor(None)));
    let members = MemberRepository::new().unwrap();

    let mut member = Member::with_age("member1", 10);
    members.save_and_flush(&mut session, &mut member).unwrap();

    // Nothing pending: a second flush writes nothing and stamps nothing.
    tick.set(5_000);
    session.flush().unwrap();
    session.clear();

    let reloaded = members
        .find_by_id(&mut session, member.id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.audit.updated_at, Some(1_000));
}

#[test]
fn missing_actor_leaves_actor_columns_null() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn).with_hook(AuditingHook::with_actor(ActorContext::new()));
    let members = MemberRepository::new().unwrap();

    let mut member = Member::new("member1");
    members.save_and_flush(&mut session, &mut member).unwrap();

    assert!(member.audit.created_at.is_some());
    assert_eq!(member.audit.created_by, None);
    assert_eq!(member.audit.updated_by, None);
}

#[test]
fn actor_resolution_failure_does_not_fail_the_write() {
    let conn = open_db_in_memory().unwrap();
    let failing = || -> Result<Option<String>, ActorResolutionError> {
        Err(ActorResolutionError::new("no request scope"))
    };
    let mut session = SqliteSession::new(&conn).with_hook(AuditingHook::new(|| 42_i64, failing));
    let members = MemberRepository::new().unwrap();

    let mut member = Member::new("member1");
    members.save_and_flush(&mut session, &mut member).unwrap();

    assert_eq!(member.audit.created_at, Some(42));
    assert_eq!(member.audit.created_by, None);
}

#[test]
fn assigned_identifier_is_inserted_not_updated() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn)
        .with_hook(AuditingHook::new(|| 7_i64, StaticActor(Some("importer".to_string()))));
    let items: EntityRepository<Item> = EntityRepository::new();

    let mut item = Item::with_id("A");
    assert!(item.audit.created_at.is_none());
    items.save_and_flush(&mut session, &mut item).unwrap();

    assert_eq!(item.audit.created_at, Some(7));
    assert_eq!(item.audit.created_by.as_deref(), Some("importer"));
    assert_eq!(items.count(&mut session).unwrap(), 1);

    // A second, fresh object with the same id is new by its own predicate
    // and collides with the stored row.
    session.clear();
    let mut duplicate = Item::with_id("A");
    items.save(&mut session, &mut duplicate).unwrap();
    let err = session.flush().unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation { .. }));
}
