//! Integration tests for the visibility and deletion-time scopes.

mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use paranoid_core::error::CoreError;
use paranoid_core::record::Record;
use paranoid_db::{Predicate, Visibility};

use common::{epoch, harness, id_of, Harness};

async fn names(h: &mut Harness, scope: paranoid_db::Scope) -> Vec<String> {
    scope
        .fetch_all(&mut h.conn)
        .await
        .unwrap()
        .iter()
        .map(|r| r.get("name").as_text().unwrap_or_default().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Test: visibility partition
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scopes_partition_rows() {
    let mut h = harness().await;
    let mut doomed = Vec::new();
    for n in 0..5 {
        let record = h
            .create(Record::new("ParanoidTime").with("name", format!("time_{n}")))
            .await;
        if n % 2 == 0 {
            doomed.push(record);
        }
    }
    for record in &mut doomed {
        h.paranoia.destroy(&mut h.conn, record).await.unwrap();
    }

    let active = h.count("ParanoidTime").await;
    let deleted = h.count_only_deleted("ParanoidTime").await;
    let total = h.count_with_deleted("ParanoidTime").await;
    assert_eq!(active, 2);
    assert_eq!(deleted, 3);
    assert_eq!(active + deleted, total, "active and deleted partition all rows");

    let scope = h.paranoia.only_deleted("ParanoidTime").unwrap();
    assert_eq!(scope.visibility(), Visibility::OnlyDeleted);
    assert_eq!(names(&mut h, scope).await, vec!["time_0", "time_2", "time_4"]);
}

#[tokio::test]
async fn test_string_marker_scopes() {
    let mut h = harness().await;
    let mut dead = h
        .create(Record::new("ParanoidString").with("name", "dead"))
        .await;
    h.create(Record::new("ParanoidString").with("name", "alive"))
        .await;
    h.create(
        Record::new("ParanoidString")
            .with("name", "zombie")
            .with("deleted", "undead"),
    )
    .await;
    h.paranoia.destroy(&mut h.conn, &mut dead).await.unwrap();

    let active = h.paranoia.all("ParanoidString").unwrap();
    assert_eq!(names(&mut h, active).await, vec!["alive", "zombie"]);
    let deleted = h.paranoia.only_deleted("ParanoidString").unwrap();
    assert_eq!(names(&mut h, deleted).await, vec!["dead"]);
}

#[tokio::test]
async fn test_count_with_deleted_predicate() {
    let mut h = harness().await;
    let mut first = h
        .create(Record::new("ParanoidTime").with("name", "match"))
        .await;
    h.create(Record::new("ParanoidTime").with("name", "match"))
        .await;
    h.create(Record::new("ParanoidTime").with("name", "other"))
        .await;
    h.paranoia.destroy(&mut h.conn, &mut first).await.unwrap();

    let matching = h
        .paranoia
        .count_with_deleted(&mut h.conn, "ParanoidTime", Some(Predicate::eq("name", "match")))
        .await
        .unwrap();
    assert_eq!(matching, 2);

    let by_id = h
        .paranoia
        .count_with_deleted(
            &mut h.conn,
            "ParanoidTime",
            Some(Predicate::is_in("id", [id_of(&first)])),
        )
        .await
        .unwrap();
    assert_eq!(by_id, 1);
}

// ---------------------------------------------------------------------------
// Test: deletion-time scopes
// ---------------------------------------------------------------------------

async fn staggered(h: &mut Harness) {
    for (name, hours_ago) in [("old", 48), ("recent", 1), ("now", 0)] {
        let mut record = h
            .create(Record::new("ParanoidTime").with("name", name))
            .await;
        h.clock.set(epoch() - Duration::hours(hours_ago));
        h.paranoia.destroy(&mut h.conn, &mut record).await.unwrap();
        h.clock.set(epoch());
    }
    h.create(Record::new("ParanoidTime").with("name", "active"))
        .await;
}

#[tokio::test]
async fn test_deleted_before_and_after() {
    let mut h = harness().await;
    staggered(&mut h).await;

    let before = h
        .paranoia
        .deleted_before("ParanoidTime", epoch() - Duration::hours(2))
        .unwrap();
    assert_eq!(names(&mut h, before).await, vec!["old"]);

    let after = h
        .paranoia
        .deleted_after("ParanoidTime", epoch() - Duration::hours(2))
        .unwrap();
    assert_eq!(names(&mut h, after).await, vec!["recent", "now"]);

    let strictly_before = h.paranoia.deleted_before("ParanoidTime", epoch()).unwrap();
    assert_eq!(
        names(&mut h, strictly_before).await,
        vec!["old", "recent"],
        "a row deleted exactly at the bound is excluded"
    );
}

#[tokio::test]
async fn test_deleted_inside_window_is_closed() {
    let mut h = harness().await;
    staggered(&mut h).await;

    let window = h
        .paranoia
        .deleted_inside_window("ParanoidTime", epoch(), Duration::hours(1))
        .unwrap();
    assert_eq!(
        names(&mut h, window).await,
        vec!["recent", "now"],
        "both ends of the window are inclusive"
    );

    let narrow = h
        .paranoia
        .deleted_inside_window("ParanoidTime", epoch() - Duration::minutes(30), Duration::minutes(10))
        .unwrap();
    assert!(names(&mut h, narrow).await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: capability errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_time_scopes_require_time_marker() {
    let h = harness().await;

    assert_matches!(
        h.paranoia.deleted_before("ParanoidBoolean", epoch()),
        Err(CoreError::Unsupported { .. })
    );
    assert_matches!(
        h.paranoia.deleted_after("ParanoidString", epoch()),
        Err(CoreError::Unsupported { .. })
    );
    assert_matches!(
        h.paranoia
            .deleted_inside_window("ParanoidBoolean", epoch(), Duration::minutes(2)),
        Err(CoreError::Unsupported { .. })
    );
}

#[tokio::test]
async fn test_visibility_scopes_require_paranoid_entity() {
    let mut h = harness().await;

    assert_matches!(
        h.paranoia.with_deleted("NotParanoid"),
        Err(CoreError::NotParanoid { .. })
    );
    assert_matches!(
        h.paranoia.only_deleted("NotParanoid"),
        Err(CoreError::NotParanoid { .. })
    );

    h.create(Record::new("NotParanoid").with("name", "plain"))
        .await;
    let scope = h.paranoia.all("NotParanoid").unwrap();
    assert_eq!(scope.visibility(), Visibility::WithDeleted);
    assert_eq!(scope.count(&mut h.conn).await.unwrap(), 1);
}
