use repokit_core::db::open_db_in_memory;
use repokit_core::model::member::MEMBER_META;
use repokit_core::model::team::TEAM_META;
use repokit_core::projection::project_entity;
use repokit_core::{
    DerivedQuery, EntityRepository, Member, MemberRepository, Params, PersistenceSession,
    ProjectionShape, QueryDescriptor, RepoError, Sort, SqliteSession, Team, TeamRepository,
};

fn seed(session: &mut SqliteSession<'_>, members: &MemberRepository) -> Team {
    let teams = TeamRepository::new();
    let mut team = Team::new("teamA");
    teams.save(session, &mut team).unwrap();

    let mut m1 = Member::with_team("m1", 0, &team);
    let mut m2 = Member::with_team("m2", 0, &team);
    let mut loner = Member::new("loner");
    members.save(session, &mut m1).unwrap();
    members.save(session, &mut m2).unwrap();
    members.save(session, &mut loner).unwrap();
    session.flush().unwrap();
    team
}

#[test]
fn nested_projection_matches_directly_loaded_reference() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    let team = seed(&mut session, &members);
    session.clear();

    let projections = members
        .find_projections_by_username(&mut session, "m1")
        .unwrap();
    assert_eq!(projections.len(), 1);
    let projection = &projections[0];
    assert_eq!(projection.get_text("username"), Some("m1"));
    assert!(projection.get("age").is_none());

    let nested_team = projection.nested("team").unwrap();
    let loaded = TeamRepository::new()
        .find_by_id(&mut session, team.id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(nested_team.get_text("name"), Some(loaded.name.as_str()));
    assert_eq!(nested_team.field_names().collect::<Vec<_>>(), vec!["name"]);
}

#[test]
fn projection_does_not_materialise_members() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);
    session.clear();

    members
        .find_projections_by_username(&mut session, "m2")
        .unwrap();

    assert_eq!(session.managed_len(), 0);
}

#[test]
fn empty_reference_projects_to_none() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let projections = members
        .find_projections_by_username(&mut session, "loner")
        .unwrap();
    assert_eq!(projections[0].get_text("username"), Some("loner"));
    assert!(projections[0].nested("team").is_none());
}

#[test]
fn flat_projection_through_generic_repository() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let shape = ProjectionShape::builder(&MEMBER_META)
        .field("id")
        .field("username")
        .build()
        .unwrap();
    let query: QueryDescriptor = DerivedQuery::parse(&MEMBER_META, "findByAge")
        .unwrap()
        .into();
    let repo: EntityRepository<Member> = EntityRepository::new();
    let rows = repo
        .find_projected(
            &mut session,
            &query,
            &Params::positional([0_i64]),
            &shape,
            &Sort::unsorted(),
        )
        .unwrap();

    let ids: Vec<i64> = rows.iter().map(|row| row.get_i64("id").unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn project_entity_uses_the_same_shape() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let member = members
        .find_member_by_username(&mut session, "m1")
        .unwrap()
        .unwrap();
    let shape = ProjectionShape::builder(&MEMBER_META)
        .field("username")
        .nested(
            "team",
            ProjectionShape::builder(&TEAM_META)
                .field("name")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let projection = project_entity(&mut session, &shape, &member).unwrap();
    assert_eq!(
        projection.nested("team").and_then(|team| team.get_text("name")),
        Some("teamA")
    );

    let team_shape = ProjectionShape::builder(&TEAM_META)
        .field("name")
        .build()
        .unwrap();
    let err = project_entity(&mut session, &team_shape, &member).unwrap_err();
    assert!(matches!(err, RepoError::ProjectionMapping(_)));
}

#[test]
fn projection_serializes_as_nested_object() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let projections = members
        .find_projections_by_username(&mut session, "m1")
        .unwrap();
    let json = serde_json::to_value(&projections[0]).unwrap();

    assert_eq!(
        json,
        serde_json::json!({ "username": "m1", "team": { "name": "teamA" } })
    );
}

#[test]
fn shape_over_another_entity_is_rejected_before_execution() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let team_shape = ProjectionShape::builder(&TEAM_META)
        .field("name")
        .build()
        .unwrap();
    let by_age: QueryDescriptor = DerivedQuery::parse(&MEMBER_META, "findByAge").unwrap().into();
    let err = EntityRepository::<Member>::new()
        .find_projected(
            &mut session,
            &by_age,
            &Params::positional([0_i64]),
            &team_shape,
            &Sort::unsorted(),
        )
        .unwrap_err();

    match err {
        RepoError::ProjectionMapping(err) => {
            assert_eq!(err.shape, team_shape.name());
            assert_eq!(err.field, "Member");
        }
        other => panic!("unexpected error: {other}"),
    }
}
