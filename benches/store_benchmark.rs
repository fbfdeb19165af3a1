use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use partidb::{Config, Database, JoinType, Query, TableSchema};
use rand::Rng;
use serde_json::{json, Value};

/// Helper to create team_season rows spread over leagues and seasons
fn create_team_seasons(count: usize) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|id| {
            json!({
                "team_season_id": id,
                "league_id": id % 5,
                "season": 2015 + (id % 10),
                "power_rank": rng.gen_range(1..=30),
                "wins": rng.gen_range(0..82),
            })
        })
        .collect()
}

fn create_database(config: Config, rows: usize) -> Database {
    let mut db = Database::new(config);
    db.add_table(TableSchema::new("league", "league_id"));
    db.add_table(TableSchema::new("league_season", "league_season_id").partitioned_by(["league_id"]));
    db.add_table(TableSchema::new("team_season", "team_season_id").partitioned_by(["league_id", "season"]));
    db.add_connection("league", "league_season", "league_id", JoinType::OneToMany).unwrap();
    db.add_connection("league_season", "team_season", "season", JoinType::OneToMany).unwrap();

    let leagues = db.get_table_mut("league").unwrap();
    for league_id in 0..5 {
        leagues.insert(json!({"league_id": league_id, "name": format!("League {}", league_id)})).unwrap();
    }
    let seasons = db.get_table_mut("league_season").unwrap();
    for league_id in 0..5 {
        for season in 2015..2025 {
            seasons
                .insert(json!({"league_season_id": league_id * 100 + season, "league_id": league_id, "season": season}))
                .unwrap();
        }
    }
    db.get_table_mut("team_season").unwrap().insert(Value::Array(create_team_seasons(rows))).unwrap();
    db
}

/// Benchmark batch insertion
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for batch_size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &batch_size| {
            let rows = create_team_seasons(batch_size);
            b.iter(|| {
                let mut db = Database::new(Config::default());
                let table = db.add_table(
                    TableSchema::new("team_season", "team_season_id").partitioned_by(["league_id", "season"]),
                );
                table.insert(Value::Array(rows.clone())).unwrap();
                black_box(table.count());
            });
        });
    }

    group.finish();
}

/// Benchmark partition-pruned versus full-scan finds
fn bench_find(c: &mut Criterion) {
    let db = create_database(Config::default(), 10000);
    let table = db.get_table("team_season").unwrap();
    let mut group = c.benchmark_group("find");

    let pruned = Query::new().eq("league_id", 1).eq("season", 2021);
    group.bench_function("partition_keys", |b| {
        b.iter(|| black_box(table.find(Some(&pruned)).len()));
    });

    let by_key = Query::new().eq("team_season_id", 4242);
    group.bench_function("primary_key", |b| {
        b.iter(|| black_box(table.find(Some(&by_key)).len()));
    });

    let scan = Query::new().gte("power_rank", 10).lt("wins", 40);
    group.bench_function("row_scan", |b| {
        b.iter(|| black_box(table.find(Some(&scan)).len()));
    });

    group.finish();
}

/// Benchmark nested joins with and without the selectivity pass
fn bench_nested_join(c: &mut Criterion) {
    let spec = json!({
        "league": {
            "children": {
                "league_season": {
                    "filter": {"season": {"$gte": 2020}},
                    "children": {
                        "team_season": {"filter": {"league_id": 2, "power_rank": {"$lte": 5}}}
                    }
                }
            }
        }
    });
    let mut group = c.benchmark_group("nested_join");

    for reroot in [true, false] {
        let db = create_database(Config::default().with_reroot_joins(reroot), 10000);
        group.bench_with_input(BenchmarkId::new("reroot", reroot), &spec, |b, spec| {
            b.iter(|| black_box(db.nested_join(spec).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_find, bench_nested_join);
criterion_main!(benches);
