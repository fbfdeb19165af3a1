use partidb::{Config, Database, ErrorKind, JoinCriteria, JoinType, Query, SortSpec, TableSchema};
use serde_json::{json, Value};

fn sports(config: Config) -> Database {
    let mut db = Database::new(config);
    db.add_table(TableSchema::new("league", "league_id")).insert(json!([
        {"league_id": 1, "name": "Premier"},
        {"league_id": 2, "name": "Championship"},
    ]))
    .unwrap();
    db.add_table(TableSchema::new("league_season", "league_season_id").partitioned_by(["league_id"]))
        .insert(json!([
            {"league_season_id": 10, "league_id": 1, "season": 2023},
            {"league_season_id": 11, "league_id": 1, "season": 2024},
            {"league_season_id": 20, "league_id": 2, "season": 2023},
        ]))
        .unwrap();
    db.add_table(TableSchema::new("team_season", "team_season_id").partitioned_by(["league_id", "season"]))
        .insert(json!([
            {"team_season_id": 1, "league_season_id": 10, "league_id": 1, "season": 2023, "power_rank": 2},
            {"team_season_id": 2, "league_season_id": 10, "league_id": 1, "season": 2023, "power_rank": 3},
            {"team_season_id": 3, "league_season_id": 10, "league_id": 1, "season": 2023, "power_rank": 1},
            {"team_season_id": 4, "league_season_id": 11, "league_id": 1, "season": 2024, "power_rank": 1},
            {"team_season_id": 5, "league_season_id": 20, "league_id": 2, "season": 2023, "power_rank": 1},
        ]))
        .unwrap();
    db.add_table(TableSchema::new("commissioner", "commissioner_id")).insert(json!([
        {"commissioner_id": 7, "league_id": 1, "name": "Ada"},
    ]))
    .unwrap();

    db.add_connection("league", "league_season", "league_id", JoinType::OneToMany).unwrap();
    db.add_connection("league_season", "team_season", "league_season_id", JoinType::OneToMany).unwrap();
    db.add_connection("league", "commissioner", "league_id", JoinType::OneToOne).unwrap();
    db
}

fn ids(rows: &Value, field: &str) -> Vec<i64> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row[field].as_i64().unwrap())
        .collect()
}

#[test]
fn test_league_season_with_ranked_team_seasons() {
    let db = sports(Config::default());
    let result = db
        .nested_join(&json!({
            "league_season": {
                "find_fn": "findOne",
                "filter": {"league_id": 1, "season": 2023},
                "children": {
                    "team_season": {"alias": "team_seasons", "sort": {"power_rank": -1}}
                }
            }
        }))
        .unwrap();

    assert_eq!(result["league_season_id"], json!(10));
    assert_eq!(ids(&result["team_seasons"], "team_season_id"), vec![2, 1, 3]);
    assert_eq!(ids(&result["team_seasons"], "power_rank"), vec![3, 2, 1]);
}

#[test]
fn test_cardinality_shapes_the_nesting() {
    let db = sports(Config::default());
    let result = db
        .nested_join(&json!({
            "league": {
                "filter": {"league_id": 1},
                "children": {"league_season": {}, "commissioner": {}}
            }
        }))
        .unwrap();

    let leagues = result.as_array().unwrap();
    assert_eq!(leagues.len(), 1);
    // one_to_many nests an array under the pluralized table name
    assert_eq!(ids(&leagues[0]["league_seasons"], "league_season_id"), vec![10, 11]);
    // one_to_one nests a single object under the table name
    assert_eq!(leagues[0]["commissioner"]["name"], json!("Ada"));

    let result = db
        .nested_join(&json!({"league": {"filter": {"league_id": 2}, "children": {"commissioner": {}}}}))
        .unwrap();
    assert_eq!(result[0]["commissioner"], Value::Null);
}

#[test]
fn test_find_one_child_nests_an_object() {
    let db = sports(Config::default());
    let result = db
        .nested_join(&json!({
            "league": {
                "filter": {"league_id": 1},
                "children": {"league_season": {"find_fn": "findOne", "filter": {"season": 2024}}}
            }
        }))
        .unwrap();
    assert_eq!(result[0]["league_season"]["league_season_id"], json!(11));
}

#[test]
fn test_child_to_parent_nests_the_parent() {
    let db = sports(Config::default());
    let result = db
        .nested_join(&json!({
            "team_season": {
                "filter": {"power_rank": 1},
                "sort": {"team_season_id": 1},
                "children": {"league_season": {"children": {"league": {}}}}
            }
        }))
        .unwrap();

    assert_eq!(ids(&result, "team_season_id"), vec![3, 4, 5]);
    assert_eq!(result[0]["league_season"]["season"], json!(2023));
    assert_eq!(result[0]["league_season"]["league"]["name"], json!("Premier"));
    assert_eq!(result[2]["league_season"]["league"]["name"], json!("Championship"));
}

#[test]
fn test_filter_up_drops_parents_without_children() {
    let db = sports(Config::default());
    let spec = |filter_up: bool| {
        json!({
            "league": {
                "sort": {"league_id": 1},
                "children": {
                    "league_season": {"filter": {"season": 2024}, "alias": "seasons", "filter_up": filter_up}
                }
            }
        })
    };

    let all = db.nested_join(&spec(false)).unwrap();
    assert_eq!(ids(&all, "league_id"), vec![1, 2]);
    assert_eq!(all[1]["seasons"], json!([]));

    let kept = db.nested_join(&spec(true)).unwrap();
    assert_eq!(ids(&kept, "league_id"), vec![1]);
    assert_eq!(ids(&kept[0]["seasons"], "league_season_id"), vec![11]);
}

#[test]
fn test_reroot_does_not_change_results() {
    let spec = json!({
        "league": {
            "sort": {"league_id": 1},
            "children": {
                "league_season": {
                    "sort": {"league_season_id": 1},
                    "children": {
                        "team_season": {
                            "filter": {"season": 2023, "power_rank": {"$lte": 2}},
                            "sort": {"team_season_id": 1}
                        }
                    }
                },
                "commissioner": {}
            }
        }
    });

    let rerooted = sports(Config::default()).nested_join(&spec).unwrap();
    let direct = sports(Config::default().with_reroot_joins(false)).nested_join(&spec).unwrap();
    assert_eq!(rerooted, direct);

    let premier = &rerooted[0];
    assert_eq!(ids(&premier["league_seasons"], "league_season_id"), vec![10, 11]);
    assert_eq!(ids(&premier["league_seasons"][0]["team_seasons"], "team_season_id"), vec![1, 3]);
    assert_eq!(premier["league_seasons"][1]["team_seasons"], json!([]));
}

#[test]
fn test_typed_criteria_match_json_criteria() {
    let db = sports(Config::default());
    let criteria = JoinCriteria::new()
        .filter(Query::new().eq("league_id", 1).eq("season", 2023))
        .find_one()
        .child(
            "team_season",
            JoinCriteria::new().alias("team_seasons").sort(SortSpec::new().desc("power_rank")),
        );
    let typed = db.join("league_season", &criteria).unwrap();
    let parsed = db
        .nested_join(&json!({
            "league_season": {
                "find_fn": "findOne",
                "filter": {"league_id": 1, "season": 2023},
                "children": {"team_season": {"alias": "team_seasons", "sort": {"power_rank": -1}}}
            }
        }))
        .unwrap();
    assert_eq!(typed, parsed);
}

#[test]
fn test_join_errors() {
    let db = sports(Config::default());

    let err = db.nested_join(&json!({"stadium": {}})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TableNotFound);

    let err = db
        .nested_join(&json!({"commissioner": {"children": {"team_season": {}}}}))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionNotFound);

    let err = db
        .nested_join(&json!({"league": {"children": {"league_season": {"children": {"league": {}}}}}}))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CyclicJoin);

    let err = db.nested_join(&json!({"league": {}, "team_season": {}})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidQuery);
}

#[test]
fn test_connections_are_registered_with_their_inverse() {
    let mut db = sports(Config::default());
    let league_season = db.get_table("league_season").unwrap();
    assert_eq!(league_season.get_table_connection("league").unwrap().join_type, JoinType::ManyToOne);
    assert_eq!(league_season.get_table_connection("team_season").unwrap().join_type, JoinType::OneToMany);
    assert_eq!(
        db.get_table("commissioner").unwrap().get_table_connection("league").unwrap().join_type,
        JoinType::OneToOne
    );
    assert_eq!(
        league_season.get_foreign_keys_and_primary_keys(),
        vec!["league_id".to_string(), "league_season_id".to_string()]
    );

    let err = db
        .add_connection("league", "stadium", "league_id", JoinType::OneToMany)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionEndpointMissing);
}
