/// partidb API demo
///
/// Walks through the main operations:
/// - table creation with partition keys
/// - insert, update and filtered find
/// - table connections and nested joins
/// - save and reload from disk

use partidb::compression::compress::CompressionType;
use partidb::{Config, Database, JoinType, Query, TableSchema};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        partidb - Complete API Demo            ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Create database and tables
    println!("Step 1: Creating database...");
    let config = Config::new("./demo_data", "sports").with_compression(CompressionType::Zstd);
    let mut db = Database::new(config);
    db.add_table(TableSchema::new("league", "league_id"));
    db.add_table(TableSchema::new("league_season", "league_season_id").partitioned_by(["league_id"]));
    db.add_table(TableSchema::new("team_season", "team_season_id").partitioned_by(["league_id", "season"]));
    db.add_connection("league", "league_season", "league_id", JoinType::OneToMany)?;
    db.add_connection("league_season", "team_season", "season", JoinType::OneToMany)?;
    println!("  Tables: {:?}\n", db.table_names().collect::<Vec<_>>());

    // Step 2: INSERT
    println!("Step 2: INSERT - Adding rows...");
    db.get_table_mut("league")?.insert(json!([
        {"league_id": 1, "name": "Premier"},
        {"league_id": 2, "name": "Championship"},
    ]))?;
    db.get_table_mut("league_season")?.insert(json!([
        {"league_season_id": 10, "league_id": 1, "season": 2023},
        {"league_season_id": 11, "league_id": 1, "season": 2024},
        {"league_season_id": 20, "league_id": 2, "season": 2023},
    ]))?;
    let team_seasons = db.get_table_mut("team_season")?;
    for id in 1..=6 {
        let season = if id % 2 == 0 { 2023 } else { 2024 };
        team_seasons.insert(json!({
            "team_season_id": id,
            "league_id": 1,
            "season": season,
            "power_rank": id,
        }))?;
    }
    println!("  team_season partitions: {}\n", team_seasons.partitions().count());

    // Step 3: FIND
    println!("Step 3: FIND - Querying rows...");
    let query = Query::new().eq("season", 2023).lte("power_rank", 4);
    let rows = db.get_table("team_season")?.find(Some(&query));
    println!("  season = 2023, power_rank <= 4: {} rows", rows.len());
    let rows = db.get_table("team_season")?.find_json(&json!({"power_rank": {"$between": [2, 5]}}))?;
    println!("  power_rank between 2 and 5: {} rows\n", rows.len());

    // Step 4: UPDATE
    println!("Step 4: UPDATE - Moving a row to another season...");
    db.get_table_mut("team_season")?
        .update(json!({"team_season_id": 1, "league_id": 1, "season": 2023, "power_rank": 1}))?;
    let partition = db.get_table("team_season")?.partition_name_of(&json!(1)).unwrap_or("none").to_string();
    println!("  team_season 1 now lives in {}\n", partition);

    // Step 5: NESTED JOIN
    println!("Step 5: NESTED JOIN...");
    let joined = db.nested_join(&json!({
        "league_season": {
            "find_fn": "findOne",
            "filter": {"league_id": 1, "season": 2023},
            "children": {
                "team_season": {"alias": "team_seasons", "sort": {"power_rank": -1}}
            }
        }
    }))?;
    println!("{}\n", serde_json::to_string_pretty(&joined)?);

    // Step 6: SAVE and reload
    println!("Step 6: SAVE - Writing to disk...");
    let reports = db.save().await?;
    for (table, report) in &reports {
        println!("  {}: {} written, {} clean", table, report.written, report.clean);
    }

    let mut reloaded = Database::new(Config::new("./demo_data", "sports"));
    reloaded.read_from_file().await;
    println!("  Reloaded team_season rows: {}", reloaded.get_table("team_season")?.count());

    println!("\nDemo complete.");
    Ok(())
}
