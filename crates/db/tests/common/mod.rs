//! Shared fixture for the integration tests: an in-memory SQLite database,
//! the entity schema it backs, and a manual clock.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use paranoid_core::association::{Association, Dependent};
use paranoid_core::clock::ManualClock;
use paranoid_core::hooks::HookRegistry;
use paranoid_core::paranoid::ParanoidConfig;
use paranoid_core::record::Record;
use paranoid_core::schema::{EntityDef, Schema};
use paranoid_core::types::{DbId, Timestamp};
use paranoid_db::Paranoia;
use sqlx::{Connection, SqliteConnection};

const DDL: &str = r#"
CREATE TABLE paranoid_times (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    deleted_at TEXT
);
CREATE TABLE paranoid_has_many_dependants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    paranoid_time_id INTEGER,
    paranoid_belongs_dependant_id INTEGER,
    deleted_at TEXT
);
CREATE TABLE paranoid_belongs_dependants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    deleted_at TEXT
);
CREATE TABLE paranoid_has_one_dependants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    paranoid_time_id INTEGER,
    paranoid_boolean_id INTEGER,
    deleted_at TEXT
);
CREATE TABLE paranoid_booleans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    is_deleted BOOLEAN,
    paranoid_with_counter_caches_count INTEGER NOT NULL DEFAULT 0,
    custom_counter_cache INTEGER NOT NULL DEFAULT 0,
    all_counter_caches_count INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE paranoid_with_counter_caches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    paranoid_boolean_id INTEGER,
    deleted_at TEXT
);
CREATE TABLE paranoid_with_custom_counter_caches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    paranoid_boolean_id INTEGER,
    deleted_at TEXT
);
CREATE TABLE not_paranoids (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    paranoid_time_id INTEGER
);
CREATE TABLE has_one_not_paranoids (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    paranoid_time_id INTEGER
);
CREATE TABLE paranoid_strings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    deleted TEXT
);
CREATE TABLE paranoid_boolean_not_nullables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    deleted BOOLEAN NOT NULL DEFAULT 0
);
CREATE TABLE paranoid_no_double_taps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    deleted_at TEXT
);
CREATE TABLE paranoid_sections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paranoid_time_id INTEGER,
    paranoid_thing_id INTEGER,
    paranoid_thing_type TEXT,
    deleted_at TEXT
);
CREATE TABLE paranoid_androids (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    deleted_at TEXT
);
CREATE TABLE paranoid_polygons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sides INTEGER,
    deleted_at TEXT
);
CREATE TABLE paranoid_with_callbacks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    deleted_at TEXT
);
CREATE TABLE paranoid_uniques (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    deleted_at TEXT
);
CREATE UNIQUE INDEX paranoid_uniques_active_name
    ON paranoid_uniques (name) WHERE deleted_at IS NULL;
CREATE TABLE paranoid_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    partner_id INTEGER,
    deleted_at TEXT
);
CREATE TABLE paranoid_flag_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    paranoid_node_id INTEGER,
    is_deleted BOOLEAN
);
"#;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

fn time_entity(name: &str, table: &str) -> EntityDef {
    EntityDef::new(name)
        .table(table)
        .paranoid(ParanoidConfig::time("deleted_at"))
}

pub fn schema() -> Schema {
    Schema::builder()
        .entity(
            time_entity("ParanoidTime", "paranoid_times")
                .association(
                    Association::has_many(
                        "paranoid_has_many_dependants",
                        "ParanoidHasManyDependant",
                        "paranoid_time_id",
                    )
                    .dependent(Dependent::Destroy),
                )
                .association(
                    Association::has_one(
                        "paranoid_has_one_dependant",
                        "ParanoidHasOneDependant",
                        "paranoid_time_id",
                    )
                    .dependent(Dependent::Destroy),
                )
                .association(Association::has_many(
                    "not_paranoids",
                    "NotParanoid",
                    "paranoid_time_id",
                ))
                .association(
                    Association::has_one(
                        "has_one_not_paranoid",
                        "HasOneNotParanoid",
                        "paranoid_time_id",
                    )
                    .dependent(Dependent::Destroy),
                )
                .association(
                    Association::has_many("paranoid_sections", "ParanoidSection", "paranoid_time_id")
                        .dependent(Dependent::Destroy),
                ),
        )
        .entity(
            time_entity("ParanoidHasManyDependant", "paranoid_has_many_dependants")
                .association(Association::belongs_to(
                    "paranoid_time",
                    "ParanoidTime",
                    "paranoid_time_id",
                ))
                .association(
                    Association::belongs_to(
                        "paranoid_belongs_dependant",
                        "ParanoidBelongsDependant",
                        "paranoid_belongs_dependant_id",
                    )
                    .dependent(Dependent::Destroy),
                ),
        )
        .entity(time_entity(
            "ParanoidBelongsDependant",
            "paranoid_belongs_dependants",
        ))
        .entity(
            time_entity("ParanoidHasOneDependant", "paranoid_has_one_dependants").association(
                Association::belongs_to("paranoid_boolean", "ParanoidBoolean", "paranoid_boolean_id")
                    .dependent(Dependent::Destroy),
            ),
        )
        .entity(
            EntityDef::new("ParanoidBoolean")
                .table("paranoid_booleans")
                .paranoid(ParanoidConfig::boolean("is_deleted")),
        )
        .entity(
            time_entity("ParanoidWithCounterCache", "paranoid_with_counter_caches")
                .association(
                    Association::belongs_to("paranoid_boolean", "ParanoidBoolean", "paranoid_boolean_id")
                        .counter_cache("paranoid_with_counter_caches_count"),
                )
                .association(
                    Association::belongs_to(
                        "paranoid_boolean_total",
                        "ParanoidBoolean",
                        "paranoid_boolean_id",
                    )
                    .counter_cache_counting_deleted("all_counter_caches_count"),
                ),
        )
        .entity(
            time_entity(
                "ParanoidWithCustomCounterCache",
                "paranoid_with_custom_counter_caches",
            )
            .association(
                Association::belongs_to("paranoid_boolean", "ParanoidBoolean", "paranoid_boolean_id")
                    .counter_cache("custom_counter_cache"),
            ),
        )
        .entity(EntityDef::new("NotParanoid").table("not_paranoids"))
        .entity(EntityDef::new("HasOneNotParanoid").table("has_one_not_paranoids"))
        .entity(
            EntityDef::new("ParanoidString")
                .table("paranoid_strings")
                .paranoid(ParanoidConfig::string("deleted", "dead")),
        )
        .entity(
            EntityDef::new("ParanoidBooleanNotNullable")
                .table("paranoid_boolean_not_nullables")
                .paranoid(
                    ParanoidConfig::boolean("deleted")
                        .not_nullable()
                        .double_tap_destroys_fully(true),
                ),
        )
        .entity(time_entity("ParanoidNoDoubleTap", "paranoid_no_double_taps"))
        .entity(
            time_entity("ParanoidSection", "paranoid_sections").association(
                Association::belongs_to_polymorphic(
                    "paranoid_thing",
                    "paranoid_thing_type",
                    "paranoid_thing_id",
                )
                .dependent(Dependent::Destroy),
            ),
        )
        .entity(time_entity("ParanoidAndroid", "paranoid_androids"))
        .entity(
            time_entity("ParanoidPolygon", "paranoid_polygons").association(
                Association::has_many("sections", "ParanoidSection", "paranoid_thing_id")
                    .as_polymorphic("paranoid_thing_type")
                    .dependent(Dependent::DeleteAll),
            ),
        )
        .entity(time_entity("ParanoidWithCallback", "paranoid_with_callbacks"))
        .entity(time_entity("ParanoidUnique", "paranoid_uniques"))
        .entity(
            time_entity("ParanoidNode", "paranoid_nodes")
                .association(
                    Association::belongs_to("partner", "ParanoidNode", "partner_id")
                        .dependent(Dependent::Destroy),
                )
                .association(
                    Association::has_one("flag", "ParanoidFlagNode", "paranoid_node_id")
                        .dependent(Dependent::Destroy),
                ),
        )
        .entity(
            EntityDef::new("ParanoidFlagNode")
                .table("paranoid_flag_nodes")
                .paranoid(ParanoidConfig::boolean("is_deleted"))
                .association(
                    Association::belongs_to("paranoid_node", "ParanoidNode", "paranoid_node_id")
                        .dependent(Dependent::Destroy),
                ),
        )
        .build()
        .expect("fixture schema is valid")
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn epoch() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub conn: SqliteConnection,
    pub paranoia: Paranoia,
    pub clock: Arc<ManualClock>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn harness() -> Harness {
    harness_with(HookRegistry::new()).await
}

pub async fn harness_with(hooks: HookRegistry) -> Harness {
    init_tracing();

    let mut conn = SqliteConnection::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::raw_sql(DDL)
        .execute(&mut conn)
        .await
        .expect("fixture tables");

    let clock = Arc::new(ManualClock::new(epoch()));
    let paranoia = Paranoia::new(schema(), hooks).with_clock(clock.clone());
    Harness {
        conn,
        paranoia,
        clock,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl Harness {
    /// Insert `record`, panicking on failure.
    pub async fn create(&mut self, record: Record) -> Record {
        let mut record = record;
        self.paranoia
            .insert_strict(&mut self.conn, &mut record)
            .await
            .expect("insert");
        record
    }

    /// Active rows.
    pub async fn count(&mut self, entity: &str) -> i64 {
        self.paranoia
            .all(entity)
            .unwrap()
            .count(&mut self.conn)
            .await
            .unwrap()
    }

    pub async fn count_only_deleted(&mut self, entity: &str) -> i64 {
        self.paranoia
            .only_deleted(entity)
            .unwrap()
            .count(&mut self.conn)
            .await
            .unwrap()
    }

    pub async fn count_with_deleted(&mut self, entity: &str) -> i64 {
        self.paranoia
            .count_with_deleted(&mut self.conn, entity, None)
            .await
            .unwrap()
    }

    pub async fn reload(&mut self, record: &mut Record) {
        self.paranoia
            .reload(&mut self.conn, record)
            .await
            .expect("reload");
    }

    pub async fn find_with_deleted(&mut self, entity: &str, id: DbId) -> Record {
        self.paranoia
            .find_with_deleted(&mut self.conn, entity, id)
            .await
            .expect("row exists")
    }
}

pub fn id_of(record: &Record) -> DbId {
    record.id().expect("persisted record")
}

// ---------------------------------------------------------------------------
// Recursive fixture
// ---------------------------------------------------------------------------

pub struct RecursiveFixture {
    pub parent: Record,
    pub has_many: Vec<Record>,
    pub belongs: Vec<Record>,
    pub has_one: Record,
    pub boolean: Record,
    /// Booleans created outside the parent's dependency tree.
    pub boolean_count: i64,
}

/// Three `ParanoidTime` rows, the first of which owns three has-many
/// dependants (each with a belongs dependant), a has-one dependant with its
/// boolean, one `NotParanoid` and one `HasOneNotParanoid`.
pub async fn setup_recursive(h: &mut Harness) -> RecursiveFixture {
    let parent = h
        .create(Record::new("ParanoidTime").with("name", "paranoid_parent"))
        .await;
    h.create(Record::new("ParanoidTime").with("name", "paranoid_time_1"))
        .await;
    h.create(Record::new("ParanoidTime").with("name", "paranoid_time_2"))
        .await;

    h.create(Record::new("ParanoidBoolean").with("name", "bystander_1"))
        .await;
    h.create(Record::new("ParanoidBoolean").with("name", "bystander_2"))
        .await;
    let boolean_count = h.count("ParanoidBoolean").await;

    let mut has_many = Vec::new();
    let mut belongs = Vec::new();
    for n in 0..3 {
        let belongs_dependant = h
            .create(Record::new("ParanoidBelongsDependant").with("name", format!("belongs_{n}")))
            .await;
        let dependant = h
            .create(
                Record::new("ParanoidHasManyDependant")
                    .with("name", format!("has_many_{n}"))
                    .with("paranoid_time_id", id_of(&parent))
                    .with("paranoid_belongs_dependant_id", id_of(&belongs_dependant)),
            )
            .await;
        belongs.push(belongs_dependant);
        has_many.push(dependant);
    }

    let boolean = h
        .create(Record::new("ParanoidBoolean").with("name", "owned"))
        .await;
    let has_one = h
        .create(
            Record::new("ParanoidHasOneDependant")
                .with("name", "has_one")
                .with("paranoid_time_id", id_of(&parent))
                .with("paranoid_boolean_id", id_of(&boolean)),
        )
        .await;

    h.create(
        Record::new("NotParanoid")
            .with("name", "not_paranoid")
            .with("paranoid_time_id", id_of(&parent)),
    )
    .await;
    h.create(
        Record::new("HasOneNotParanoid")
            .with("name", "has_one_not_paranoid")
            .with("paranoid_time_id", id_of(&parent)),
    )
    .await;

    RecursiveFixture {
        parent,
        has_many,
        belongs,
        has_one,
        boolean,
        boolean_count,
    }
}
