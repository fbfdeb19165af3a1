pub mod core;
pub mod storage;
pub mod compression;
pub mod query;
pub mod table;
pub mod results;
pub mod join;

pub use crate::core::config::Config;
pub use crate::core::database::Database;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::join::criteria::JoinCriteria;
pub use crate::query::ast::Query;
pub use crate::query::sort::SortSpec;
pub use crate::results::collection::ResultSet;
pub use crate::table::connection::JoinType;
pub use crate::table::table::{Table, TableSchema};

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                              PARTIDB STRUCT ARCHITECTURE                                    │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── CORE LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                               struct Database                                       │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ config: Config                    // Paths, compression, lock backoff        │ │    │
│  │  │ storage: StorageLayout            // <root>/<db>/_db.json                    │ │    │
│  │  │ tables: BTreeMap<String, Table>   // Named tables                            │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌──────────────────┐  ┌──────────────────┐  ┌───────────────────────────────────────┐    │
│  │ struct Config    │  │ enum RowKey      │  │ struct PartitionKey                   │    │
│  │ • storage_path   │  │ • Null           │  │ • 0: Map<String, Value>               │    │
│  │ • database_name  │  │ • Bool(bool)     │  │ • partition_name()                    │    │
│  │ • compression    │  │ • Int(i64)       │  │   "league_id_1_season_2023"           │    │
│  │ • write_lock_*   │  │ • Text(String)   │  │   "default" when no keys              │    │
│  │ • reroot_joins   │  └──────────────────┘  └───────────────────────────────────────┘    │
│  └──────────────────┘                                                                       │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── TABLE LAYER ─────────────────────────────────────────┐
│                                                                                              │
│  ┌───────────────────────────────────────┐  ┌──────────────────────────────────────────┐   │
│  │ struct Table                          │  │ struct TableConnection                    │   │
│  │ • primary_key_field                   │  │ • join_key: String                        │   │
│  │ • partition_key_fields                │  │ • join_type: JoinType                     │   │
│  │ • partitions: BTreeMap<_, Partition>  │  │   OneToOne / OneToMany / ManyToOne        │   │
│  │ • partition_name_by_primary_key       │  └──────────────────────────────────────────┘   │
│  │ • table_connections                   │                                                  │
│  │ • insert() / update() / find()        │                                                  │
│  │ • delete() / output_to_file()         │                                                  │
│  └───────────────────────────────────────┘                                                  │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────────── STORAGE LAYER ────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────┐  ┌──────────────────────────┐  ┌───────────────────────────┐   │
│  │ struct Partition       │  │ struct TableLayout       │  │ trait RowCodec            │   │
│  │ • data: BTreeMap       │  │ • _table.json            │  │ • encode() / decode()     │   │
│  │ • dirty: AtomicBool    │  │ • <partition>.json       │  │ IdentityCodec             │   │
│  │ • write_lock           │  │ • <partition>.bin        │  │ DropFieldsCodec           │   │
│  │ • prepare_write()      │  │ • write_atomic()         │  └───────────────────────────┘   │
│  │ • read_from_file()     │  └──────────────────────────┘                                  │
│  └────────────────────────┘  ┌──────────────────────────┐  ┌───────────────────────────┐   │
│                              │ struct CompressedBlock   │  │ struct SqueezedRows       │   │
│                              │ • LZ4 / Zstd / Snappy    │  │ • fields + value columns  │   │
│                              │ • crc32 checksum         │  └───────────────────────────┘   │
│                              └──────────────────────────┘                                  │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── QUERY / JOIN LAYER ─────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────┐  ┌──────────────────────────┐  ┌───────────────────────────┐   │
│  │ struct Query           │  │ struct JoinGraph         │  │ struct JoinExecutor       │   │
│  │ • clauses: Vec<Clause> │  │ • nodes: Vec<JoinNode>   │  │ • selectivity pass        │   │
│  │ • or: Option<Vec<_>>   │  │ • root: NodeId           │  │ • final pass              │   │
│  │ enum Operator          │  │ • most_selective_node()  │  │ • $in narrowing           │   │
│  │ • $eq $ne $gt $gte     │  │ • rerooted()             │  └───────────────────────────┘   │
│  │ • $lt $lte $in $nin    │  └──────────────────────────┘  ┌───────────────────────────┐   │
│  │ • $between             │                                │ struct ResultSet          │   │
│  └────────────────────────┘                                │ • sorted_by / index_by    │   │
│                                                            │ • group_by / left_join    │   │
│                                                            └───────────────────────────┘   │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── RELATIONSHIPS ────────────────────────────────────────────┐
│                                                                                              │
│  Database ──owns──> Table ──owns──> Partition ──writes──> TableLayout file                  │
│     │                 │                 │                                                   │
│     │                 │                 └──uses──> RowCodec / CompressedBlock               │
│     │                 │                                                                     │
│     │                 └──knows──> TableConnection ──names──> peer Table                     │
│     │                                                                                       │
│     └──runs──> JoinExecutor ──walks──> JoinGraph ──built_from──> JoinCriteria               │
│                      │                                                                      │
│                      └──calls──> Table::find(Query) ──returns──> ResultSet                  │
│                                                                                              │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
