use repokit_core::db::open_db_in_memory;
use repokit_core::model::item::ITEM_META;
use repokit_core::model::member::MEMBER_META;
use repokit_core::query::derive::{Comparator, QueryKind};
use repokit_core::{
    DerivedQuery, Direction, EntityRepository, Member, MemberRepository, Params,
    PersistenceSession, QueryDescriptor, QueryTemplate, RepoError, Sort, SqliteSession, Team,
    TeamRepository,
};

fn seed(session: &mut SqliteSession<'_>, members: &MemberRepository) {
    let teams = TeamRepository::new();
    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    teams.save(session, &mut team_a).unwrap();
    teams.save(session, &mut team_b).unwrap();

    let mut rows = vec![
        Member::with_team("AAA", 10, &team_a),
        Member::with_team("AAA", 20, &team_b),
        Member::with_age("BBB", 30),
    ];
    for member in &mut rows {
        members.save(session, member).unwrap();
    }
    session.flush().unwrap();
}

#[test]
fn derived_clauses_keep_declaration_order() {
    let query = DerivedQuery::parse(&MEMBER_META, "findByUsernameAndAgeGreaterThan").unwrap();

    let fields: Vec<&str> = query.clauses().iter().map(|clause| clause.field).collect();
    let comparators: Vec<Comparator> = query
        .clauses()
        .iter()
        .map(|clause| clause.comparator)
        .collect();
    assert_eq!(fields, vec!["username", "age"]);
    assert_eq!(comparators, vec![Comparator::Equals, Comparator::GreaterThan]);
    assert_eq!(query.kind(), QueryKind::Select);
}

#[test]
fn subject_words_and_ordering_are_parsed() {
    let query = DerivedQuery::parse(&MEMBER_META, "findListByAgeOrderByUsernameDescIdAsc").unwrap();
    assert_eq!(query.clauses().len(), 1);

    let order: Vec<(&str, Direction)> = query
        .order()
        .iter()
        .map(|order| (order.field, order.direction))
        .collect();
    assert_eq!(
        order,
        vec![("username", Direction::Desc), ("id", Direction::Asc)]
    );

    let count = DerivedQuery::parse(&MEMBER_META, "countByAge").unwrap();
    assert_eq!(count.kind(), QueryKind::Count);
}

#[test]
fn unknown_field_names_the_offending_token() {
    let err = DerivedQuery::parse(&MEMBER_META, "findByUsernameAndNickname").unwrap_err();
    assert_eq!(err.token, "Nickname");
    assert_eq!(err.reason, "unknown field");

    let err = DerivedQuery::parse(&ITEM_META, "findByUsername").unwrap_err();
    assert_eq!(err.token, "Username");
}

#[test]
fn disjunction_is_rejected() {
    let err = DerivedQuery::parse(&MEMBER_META, "findByUsernameOrAge").unwrap_err();
    assert_eq!(err.token, "UsernameOrAge");
    assert!(err.to_string().contains("OR"));
}

#[test]
fn malformed_method_names_are_rejected() {
    for method in ["findUsername", "deleteByAge", "findByAgeOrderBy", "findBy"] {
        assert!(
            DerivedQuery::parse(&MEMBER_META, method).is_err(),
            "{method} should not parse"
        );
    }
}

#[test]
fn builder_matches_parsed_descriptor() {
    let parsed = DerivedQuery::parse(&MEMBER_META, "findByUsernameAndAgeGreaterThan").unwrap();
    let built = DerivedQuery::builder(&MEMBER_META)
        .eq("username")
        .gt("age")
        .build()
        .unwrap();
    assert_eq!(parsed.clauses(), built.clauses());

    let err = DerivedQuery::builder(&MEMBER_META)
        .eq("nickname")
        .gt("age")
        .build()
        .unwrap_err();
    assert_eq!(err.token, "nickname");
}

#[test]
fn argument_count_is_checked_before_execution() {
    let query = DerivedQuery::parse(&MEMBER_META, "findByUsernameAndAgeGreaterThan").unwrap();
    let err = query.bind(&Params::positional(["AAA"])).unwrap_err();
    assert!(err.detail.contains("expected 2"));

    let template =
        QueryTemplate::new("SELECT * FROM members WHERE username = :username AND age = :age")
            .unwrap();
    assert!(template.bind(&Params::named([("username", "AAA")])).is_err());
    assert!(template.bind(&Params::positional(["AAA", "10"])).is_err());
    assert!(template
        .bind(&Params::named([("username", "AAA"), ("nickname", "x")]))
        .is_err());
}

#[test]
fn mixed_placeholder_styles_are_rejected() {
    let err = QueryTemplate::new("SELECT * FROM members WHERE username = ?1 AND age = :age")
        .unwrap_err();
    assert!(err.detail.contains("mixes"));
}

#[test]
fn find_by_username_and_age_greater_than() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let result = members
        .find_by_username_and_age_greater_than(&mut session, "AAA", 15)
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].username, "AAA");
    assert_eq!(result[0].age, 20);
}

#[test]
fn find_user_binds_named_parameters() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let result = members.find_user(&mut session, "AAA", 10).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].age, 10);
}

#[test]
fn scalar_and_dto_queries() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    assert_eq!(
        members.find_username_list(&mut session).unwrap(),
        vec!["AAA".to_string(), "AAA".to_string(), "BBB".to_string()]
    );

    let dtos = members.find_member_dto(&mut session).unwrap();
    let team_names: Vec<Option<&str>> = dtos.iter().map(|dto| dto.team_name.as_deref()).collect();
    assert_eq!(team_names, vec![Some("teamA"), Some("teamB")]);
}

#[test]
fn list_parameter_expands_into_in_clause() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    assert_eq!(members.find_by_names(&mut session, ["AAA", "BBB"]).unwrap().len(), 3);
    assert_eq!(members.find_by_names(&mut session, ["BBB"]).unwrap().len(), 1);
    assert!(members
        .find_by_names(&mut session, Vec::<String>::new())
        .unwrap()
        .is_empty());
}

#[test]
fn single_result_queries() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let found = members.find_member_by_username(&mut session, "BBB").unwrap();
    assert_eq!(found.map(|member| member.age), Some(30));
    assert!(members
        .find_member_by_username(&mut session, "CCC")
        .unwrap()
        .is_none());

    let err = members
        .find_member_by_username(&mut session, "AAA")
        .unwrap_err();
    assert!(matches!(err, RepoError::NonUniqueResult { actual: 2 }));

    assert_eq!(members.find_list_by_username(&mut session, "AAA").unwrap().len(), 2);
    assert_eq!(members.count_by_age(&mut session, 10).unwrap(), 1);
}

#[test]
fn static_ordering_is_applied() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();
    seed(&mut session, &members);

    let query: QueryDescriptor = DerivedQuery::parse(&MEMBER_META, "findByUsernameOrderByAgeDesc")
        .unwrap()
        .into();
    let ages: Vec<i64> = members
        .find_by(
            &mut session,
            &query,
            &Params::positional(["AAA"]),
            &Sort::unsorted(),
        )
        .unwrap()
        .into_iter()
        .map(|member| member.age)
        .collect();
    assert_eq!(ages, vec![20, 10]);
}

#[test]
fn entity_queries_must_target_the_repository_entity() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let teams: EntityRepository<Team> = EntityRepository::new();

    let member_query: QueryDescriptor = DerivedQuery::parse(&MEMBER_META, "findByAge")
        .unwrap()
        .into();
    let err = teams
        .find_by(
            &mut session,
            &member_query,
            &Params::positional([10_i64]),
            &Sort::unsorted(),
        )
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));

    let untyped: QueryDescriptor = QueryTemplate::new("SELECT * FROM teams").unwrap().into();
    let err = teams
        .find_by(&mut session, &untyped, &Params::None, &Sort::unsorted())
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));
}

#[test]
fn unknown_sort_field_is_a_derivation_error() {
    let conn = open_db_in_memory().unwrap();
    let mut session = SqliteSession::new(&conn);
    let members = MemberRepository::new().unwrap();

    let err = members
        .find_all(&mut session, &Sort::by(Direction::Asc, ["nickname"]))
        .unwrap_err();
    assert!(matches!(err, RepoError::Derivation(ref err) if err.token == "nickname"));
}
