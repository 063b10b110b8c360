#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use cardstore::{
    models::{Attachment, Card, CardType, Filter},
    repo::inmem::InMemCardStore,
    CardStore, StoreError,
};

/// Helper that returns a fresh, empty store for every test run.
fn store() -> InMemCardStore {
    InMemCardStore::new()
}

fn card(id: &str, owner: &str) -> Card {
    Card {
        card_id: id.into(),
        owner_id: owner.into(),
        board_id: "board-1".into(),
        category_id: "cat-1".into(),
        name: format!("card {id}"),
        card_type: CardType::Text,
        content: String::new(),
        position: 0,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        tags: vec![],
        attachments: vec![],
    }
}

fn by_id(id: &str) -> Filter {
    Filter { card_ids: vec![id.into()], ..Default::default() }
}

async fn load(s: &InMemCardStore, id: &str) -> Card {
    let mut hits = s.find(&by_id(id), 0, 1).await.unwrap();
    assert_eq!(hits.len(), 1, "card {id} should exist");
    hits.remove(0)
}

fn attachment_ids(c: &Card) -> Vec<&str> {
    c.attachments.iter().map(|a| a.attachment_id.as_str()).collect()
}

#[tokio::test]
async fn insert_only_fields_are_write_once() {
    let s = store();
    let mut first = card("c1", "owner-x");
    first.card_type = CardType::Checklist;
    s.save(first.clone()).await.unwrap();

    let mut update = card("c1", "owner-y");
    update.card_type = CardType::Image;
    update.created_at = first.created_at + Duration::days(3);
    update.name = "renamed".into();
    s.save(update).await.unwrap();

    let stored = load(&s, "c1").await;
    assert_eq!(stored.owner_id, "owner-x");
    assert_eq!(stored.card_type, CardType::Checklist);
    assert_eq!(stored.created_at, first.created_at);
    assert_eq!(stored.name, "renamed");
}

#[tokio::test]
async fn attachment_removal_and_addition_merge_by_id() {
    let s = store();
    let mut c = card("c1", "o1");
    c.attachments = vec![Attachment::new("A", "a"), Attachment::new("B", "b")];
    s.save(c).await.unwrap();

    let mut upd = card("c1", "o1");
    upd.attachments = vec![Attachment::removal("B"), Attachment::new("C", "c")];
    s.save(upd).await.unwrap();
    assert_eq!(attachment_ids(&load(&s, "c1").await), vec!["A", "C"]);

    let mut readd = card("c1", "o1");
    readd.attachments = vec![Attachment::new("B", "b")];
    s.save(readd).await.unwrap();
    s.save(card("c1", "o1")).await.unwrap(); // no attachment changes

    let stored = load(&s, "c1").await;
    let mut ids = attachment_ids(&stored);
    ids.sort();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert!(stored.attachments.iter().all(|a| !a.delete));
}

#[tokio::test]
async fn tags_are_replaced_not_merged() {
    let s = store();
    let mut c = card("c1", "o1");
    c.tags = vec!["x".into()];
    s.save(c).await.unwrap();

    let mut upd = card("c1", "o1");
    upd.tags = vec!["y".into()];
    s.save(upd).await.unwrap();

    assert_eq!(load(&s, "c1").await.tags, vec!["y".to_string()]);
}

#[tokio::test]
async fn filter_fields_are_anded() {
    let s = store();
    let mut a = card("a", "o1");
    a.tags = vec!["t1".into()];
    let mut b = card("b", "o1");
    b.tags = vec!["t2".into()];
    let mut c = card("c", "o2");
    c.tags = vec!["t1".into()];
    s.save_many(vec![a, b, c]).await.unwrap();

    let f = Filter { owner_ids: vec!["o1".into()], tags: vec!["t1".into()], ..Default::default() };
    let hits = s.find(&f, 0, 10).await.unwrap();
    assert_eq!(hits.iter().map(|c| c.card_id.as_str()).collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(s.count(&f).await.unwrap(), 1);

    assert_eq!(s.count(&Filter::default()).await.unwrap(), 3);
}

#[tokio::test]
async fn find_sorts_by_position_then_created_at_and_pages() {
    let s = store();
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut cards = Vec::new();
    let layout = [("p2-old", 2, 0), ("p1", 1, 5), ("p2-new", 2, 9), ("p0", 0, 7), ("p3", 3, 1)];
    for (id, pos, age) in layout {
        let mut c = card(id, "o1");
        c.position = pos;
        c.created_at = base + Duration::minutes(age);
        cards.push(c);
    }
    s.save_many(cards).await.unwrap();

    let all = s.find(&Filter::default(), 0, 0).await.unwrap();
    let order: Vec<_> = all.iter().map(|c| c.card_id.as_str()).collect();
    assert_eq!(order, vec!["p0", "p1", "p2-old", "p2-new", "p3"]);

    let page = s.find(&Filter::default(), 1, 2).await.unwrap();
    let ids: Vec<_> = page.iter().map(|c| c.card_id.as_str()).collect();
    assert_eq!(ids, vec!["p2-old", "p2-new"]);

    assert!(s.find(&Filter::default(), 5, 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_semantics() {
    let s = store();
    let err = s.delete("missing").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { ref card_id } if card_id == "missing"));

    s.save(card("c1", "o1")).await.unwrap();
    s.delete("c1").await.unwrap();
    assert!(s.find(&by_id("c1"), 0, 10).await.unwrap().is_empty());
    assert!(s.is_empty());
}

#[tokio::test]
async fn batch_mixes_insert_and_update() {
    let s = store();
    let mut existing = card("r2", "o1");
    existing.attachments = vec![Attachment::new("keep", ""), Attachment::new("drop", "")];
    s.save(existing).await.unwrap();

    let fresh = card("r1", "o9");
    let mut upd = card("r2", "someone-else");
    upd.position = 4;
    upd.attachments = vec![Attachment::removal("drop")];
    s.save_many(vec![fresh, upd]).await.unwrap();

    assert_eq!(s.len(), 2);
    assert_eq!(load(&s, "r1").await.owner_id, "o9");
    let r2 = load(&s, "r2").await;
    assert_eq!(r2.owner_id, "o1");
    assert_eq!(r2.position, 4);
    assert_eq!(attachment_ids(&r2), vec!["keep"]);
}

#[tokio::test]
async fn removal_on_first_write_is_noop() {
    let s = store();
    let mut c = card("c1", "o1");
    c.attachments = vec![Attachment::removal("ghost"), Attachment::new("real", "m")];
    s.save(c).await.unwrap();
    assert_eq!(attachment_ids(&load(&s, "c1").await), vec!["real"]);
}

#[tokio::test]
async fn empty_batch_is_accepted() {
    let s = store();
    s.save_many(vec![]).await.unwrap();
    assert!(s.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attachment_adds_all_land() {
    let s = Arc::new(store());
    s.save(card("busy", "o1")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..32 {
        let s = s.clone();
        handles.push(tokio::spawn(async move {
            let mut c = card("busy", "o1");
            c.attachments = vec![Attachment::new(format!("att-{i}"), "")];
            s.save(c).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(load(&s, "busy").await.attachments.len(), 32);
}

/// Readers must only ever see a fully applied write: the pull of "B" and the
/// upsert that renames the card land together or not at all.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_half_applied_writes() {
    let s = Arc::new(store());
    let mut seed = card("flip", "o1");
    seed.name = "n2".into();
    seed.attachments = vec![Attachment::new("B", "")];
    s.save(seed).await.unwrap();

    let writer = |name: &'static str, attachments: Vec<Attachment>| {
        let s = s.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let mut c = card("flip", "o1");
                c.name = name.into();
                c.attachments = attachments.clone();
                s.save(c).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    let drop_b = writer("n1", vec![Attachment::removal("B"), Attachment::new("C", "")]);
    let add_b = writer("n2", vec![Attachment::new("B", "")]);

    let reader = {
        let s = s.clone();
        tokio::spawn(async move {
            for _ in 0..400 {
                let c = load(&s, "flip").await;
                let has_b = c.attachments.iter().any(|a| a.attachment_id == "B");
                match c.name.as_str() {
                    "n1" => assert!(!has_b, "n1 state still carries B: {:?}", c.attachments),
                    "n2" => assert!(has_b, "n2 state lost B: {:?}", c.attachments),
                    other => panic!("unexpected name {other}"),
                }
                tokio::task::yield_now().await;
            }
        })
    };

    drop_b.await.unwrap();
    add_b.await.unwrap();
    reader.await.unwrap();
}
