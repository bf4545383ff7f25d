use bson::{Bson, Document, doc};
use serde_json::{Value, json};

use qstore_core::{
    adapter::{AdapterBuilder, QueryAdapter},
    envelope::{Action, Envelope, PopulateSpec},
    error::{AdapterError, AdapterResult, ErrorKind},
    query::Match,
};
use qstore_memory::{IdPolicy, InMemoryAdapter, StoreMap};

async fn exec(adapter: &InMemoryAdapter, wire: Value) -> AdapterResult<Vec<Document>> {
    adapter.exec(&Envelope::from_json(wire)?).await
}

fn number(record: &Document, field: &str) -> f64 {
    match record.get(field) {
        Some(Bson::Int32(value)) => f64::from(*value),
        Some(Bson::Int64(value)) => *value as f64,
        Some(Bson::Double(value)) => *value,
        other => panic!("field {field} is not numeric: {other:?}"),
    }
}

fn handles(records: &[Document]) -> Vec<&str> {
    records
        .iter()
        .map(|record| record.get_str("handle").unwrap())
        .collect()
}

fn supers() -> Vec<Document> {
    vec![
        doc! { "id": 1, "handle": "Drzzt", "type": "rogue", "power": 5, "speed": 12 },
        doc! { "id": 2, "handle": "Pug", "type": "wizard", "power": 2, "speed": 5 },
        doc! { "id": 3, "handle": "Bruce", "type": "fighter", "power": 15, "speed": 6 },
        doc! { "id": 4, "handle": "Joe", "type": "rogue", "power": 8, "speed": 10 },
    ]
}

async fn fixture() -> InMemoryAdapter {
    InMemoryAdapter::builder()
        .resource("supers", supers())
        .build()
        .await
        .unwrap()
}

mod dispatch {
    use super::*;

    #[tokio::test]
    async fn missing_resource_or_action_is_invalid() {
        let adapter = fixture().await;

        let err = exec(&adapter, json!({ "on": "x" })).await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("invalid query"));

        let err = exec(&adapter, json!({ "do": "x" })).await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("invalid query"));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = exec(&adapter, json!({ "do": "find", "on": "" })).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn unknown_action_has_no_handler() {
        let adapter = fixture().await;
        let err = exec(&adapter, json!({ "do": "explode", "on": "supers" })).await.unwrap_err();
        assert!(matches!(err, AdapterError::NoMatchingAction(ref name) if name == "explode"));
    }

    #[tokio::test]
    async fn callback_receives_result() {
        let adapter = fixture().await;
        let envelope = Envelope::from_json(json!({ "do": "find", "on": "supers" })).unwrap();

        let mut seen = None;
        adapter
            .exec_with(&envelope, |result| seen = Some(result.map(|records| records.len())))
            .await;

        assert_eq!(seen.unwrap().unwrap(), 4);
    }
}

mod create {
    use super::*;

    #[tokio::test]
    async fn creates_entries_with_generated_ids() {
        let adapter = InMemoryAdapter::new();

        let created = exec(&adapter, json!({ "do": "create", "on": "bands", "body": [{ "name": "Splergh" }] }))
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].get_str("name").unwrap(), "Splergh");
        assert!(!created[0].get_str("id").unwrap().is_empty());
    }

    #[tokio::test]
    async fn creates_many_in_order_with_unique_ids() {
        let adapter = InMemoryAdapter::new();

        let created = exec(&adapter, json!({ "do": "create", "on": "bands", "body": [{ "name": "Woo" }, { "name": "Um" }] }))
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        assert_eq!(created[0].get_str("name").unwrap(), "Woo");
        assert_eq!(created[1].get_str("name").unwrap(), "Um");
        assert_ne!(created[0].get("id"), created[1].get("id"));

        let all = exec(&adapter, json!({ "do": "find", "on": "bands" })).await.unwrap();
        assert_eq!(all, created);
    }

    #[tokio::test]
    async fn created_record_is_found_by_id() {
        let adapter = InMemoryAdapter::new();

        let created = exec(&adapter, json!({ "do": "create", "on": "bands", "body": [{ "name": "DOTN" }] }))
            .await
            .unwrap();
        let id = created[0].get("id").cloned().unwrap();

        let found = adapter
            .exec(&Envelope::builder().action(Action::Find).resource("bands").ids([id]).build())
            .await
            .unwrap();

        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn accepts_client_ids_unless_taken() {
        let adapter = fixture().await;

        let created = exec(&adapter, json!({ "do": "create", "on": "supers", "body": [{ "id": "raist", "handle": "Raistlin" }] }))
            .await
            .unwrap();
        assert_eq!(created[0].get_str("id").unwrap(), "raist");

        let err = exec(&adapter, json!({ "do": "create", "on": "supers", "body": [{ "id": 2, "handle": "Again" }] }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::RecordAlreadyExists(ref id, ref resource) if id == "2" && resource == "supers"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn large_integer_ids_stay_distinct() {
        let low = 9_007_199_254_740_992i64;
        let high = 9_007_199_254_740_993i64;

        let adapter = InMemoryAdapter::builder()
            .resource("r", vec![doc! { "id": low, "name": "a" }])
            .build()
            .await
            .unwrap();

        let created = adapter
            .exec(&Envelope::builder().action(Action::Create).resource("r").body([doc! { "id": high, "name": "b" }]).build())
            .await
            .unwrap();
        assert_eq!(created[0].get_i64("id").unwrap(), high);

        let found = adapter
            .exec(&Envelope::builder().action(Action::Find).resource("r").ids([high]).build())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("name").unwrap(), "b");

        let seeded = InMemoryAdapter::builder()
            .resource("r", vec![doc! { "id": low }, doc! { "id": high }])
            .build()
            .await;
        assert!(seeded.is_ok());
    }

    #[tokio::test]
    async fn failed_batch_creates_nothing() {
        let adapter = fixture().await;

        let err = exec(&adapter, json!({ "do": "create", "on": "supers", "body": [{ "handle": "New" }, { "id": "x" }, { "id": "x" }] }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::RecordAlreadyExists(..)));

        let all = exec(&adapter, json!({ "do": "find", "on": "supers" })).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn generate_only_rejects_client_ids() {
        let adapter = InMemoryAdapter::builder()
            .id_policy(IdPolicy::GenerateOnly)
            .build()
            .await
            .unwrap();

        let err = exec(&adapter, json!({ "do": "create", "on": "bands", "body": [{ "id": "mine" }] }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::RecordAlreadyExists(..)));
        assert!(adapter.resources().await.is_empty());
    }

    #[tokio::test]
    async fn requires_a_body() {
        let adapter = InMemoryAdapter::new();
        let err = exec(&adapter, json!({ "do": "create", "on": "bands" })).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn created_records_pass_through_select() {
        let adapter = InMemoryAdapter::new();

        let created = exec(&adapter, json!({ "do": "create", "on": "bands", "body": [{ "name": "Woo", "albums": 2 }], "select": ["-albums"] }))
            .await
            .unwrap();
        assert!(created[0].get("albums").is_none());

        let stored = exec(&adapter, json!({ "do": "find", "on": "bands" })).await.unwrap();
        assert_eq!(number(&stored[0], "albums"), 2.0);
    }
}

mod find {
    use super::*;

    #[tokio::test]
    async fn lists_everything_without_targeting() {
        let adapter = fixture().await;
        let all = exec(&adapter, json!({ "do": "find", "on": "supers" })).await.unwrap();
        assert_eq!(handles(&all), ["Drzzt", "Pug", "Bruce", "Joe"]);
    }

    #[tokio::test]
    async fn unknown_resource_is_empty() {
        let adapter = fixture().await;
        let found = exec(&adapter, json!({ "do": "find", "on": "slime" })).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn operators() {
        let adapter = fixture().await;

        let cases = [
            (json!({ "power": { "eq": 5 } }), vec!["Drzzt"]),
            (json!({ "power": { "neq": 5 } }), vec!["Pug", "Bruce", "Joe"]),
            (json!({ "type": { "in": ["wizard", "fighter"] } }), vec!["Pug", "Bruce"]),
            (json!({ "type": { "nin": ["wizard", "fighter"] } }), vec!["Drzzt", "Joe"]),
            (json!({ "speed": { "gt": 10 } }), vec!["Drzzt"]),
            (json!({ "speed": { "gte": 10 } }), vec!["Drzzt", "Joe"]),
            (json!({ "speed": { "lt": 10 } }), vec!["Pug", "Bruce"]),
            (json!({ "speed": { "lte": 10 } }), vec!["Pug", "Bruce", "Joe"]),
        ];

        for (condition, expected) in cases {
            let found = exec(&adapter, json!({ "do": "find", "on": "supers", "match": { "and": [condition.clone()] } }))
                .await
                .unwrap();
            assert_eq!(handles(&found), expected, "condition {condition}");
        }
    }

    #[tokio::test]
    async fn complex_matches() {
        let adapter = fixture().await;

        let both = exec(&adapter, json!({ "do": "find", "on": "supers", "match": { "and": [{ "speed": { "gt": 8 } }, { "power": { "gte": 8 } }] } }))
            .await
            .unwrap();
        assert_eq!(handles(&both), ["Joe"]);

        let either = exec(&adapter, json!({ "do": "find", "on": "supers", "match": { "or": [{ "speed": { "gt": 8 } }, { "power": { "gte": 8 } }] } }))
            .await
            .unwrap();
        assert_eq!(either.len(), 3);

        let nested = exec(&adapter, json!({
            "do": "find",
            "on": "supers",
            "match": {
                "or": [
                    { "and": [{ "speed": { "gt": 8 } }, { "power": { "gte": 8 } }] },
                    { "type": { "eq": "wizard" } }
                ]
            }
        }))
        .await
        .unwrap();
        assert_eq!(handles(&nested), ["Pug", "Joe"]);
    }

    #[tokio::test]
    async fn ids_then_match() {
        let adapter = fixture().await;

        let found = exec(&adapter, json!({ "do": "find", "on": "supers", "ids": [1, 2, 4], "match": { "type": { "eq": "rogue" } } }))
            .await
            .unwrap();
        assert_eq!(handles(&found), ["Drzzt", "Joe"]);
    }

    #[tokio::test]
    async fn select_whitelist_and_blacklist() {
        let adapter = fixture().await;

        let only = exec(&adapter, json!({ "do": "find", "on": "supers", "select": ["handle"] })).await.unwrap();
        assert!(only.iter().all(|record| record.len() == 1 && record.contains_key("handle")));

        let without = exec(&adapter, json!({ "do": "find", "on": "supers", "select": ["-handle"] })).await.unwrap();
        assert_eq!(without[0], doc! { "id": 1, "type": "rogue", "power": 5, "speed": 12 });

        let err = exec(&adapter, json!({ "do": "find", "on": "supers", "select": ["handle", "-power"] }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn limit_and_offset_paginate() {
        let adapter = fixture().await;

        let first = exec(&adapter, json!({ "do": "find", "on": "supers", "limit": 2 })).await.unwrap();
        assert_eq!(handles(&first), ["Drzzt", "Pug"]);

        let rest = exec(&adapter, json!({ "do": "find", "on": "supers", "offset": 2 })).await.unwrap();
        assert_eq!(handles(&rest), ["Bruce", "Joe"]);

        let page = exec(&adapter, json!({ "do": "find", "on": "supers", "offset": 1, "limit": 2 })).await.unwrap();
        assert_eq!(handles(&page), ["Pug", "Bruce"]);

        let past_end = exec(&adapter, json!({ "do": "find", "on": "supers", "offset": 10 })).await.unwrap();
        assert!(past_end.is_empty());
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn requires_targeting() {
        let adapter = fixture().await;

        let err = exec(&adapter, json!({ "do": "update", "on": "supers", "body": [{ "power": 1 }] }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ids"));
        assert_eq!(err.kind(), ErrorKind::Targeting);
    }

    #[tokio::test]
    async fn partial_update_merges_fields() {
        let adapter = InMemoryAdapter::new();

        let created = exec(&adapter, json!({ "do": "create", "on": "bands", "body": [{ "name": "SDRE", "albums": 3 }] }))
            .await
            .unwrap();
        let id = created[0].get_str("id").unwrap();

        let updated = exec(&adapter, json!({ "do": "update", "on": "bands", "ids": [id], "body": [{ "albums": 4 }] }))
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(number(&updated[0], "albums"), 4.0);
        assert_eq!(updated[0].get_str("name").unwrap(), "SDRE");
        assert_eq!(updated[0].get_str("id").unwrap(), id);
        assert_eq!(updated[0].len(), 3);
    }

    #[tokio::test]
    async fn match_with_inc_updates_every_target() {
        let adapter = fixture().await;

        let updated = exec(&adapter, json!({
            "do": "update",
            "on": "supers",
            "match": { "and": [{ "type": { "eq": "rogue" } }] },
            "update": [{ "power": { "inc": 4 } }]
        }))
        .await
        .unwrap();

        assert_eq!(updated.len(), 2);
        assert_eq!(number(&updated[0], "power"), 9.0);
        assert_eq!(number(&updated[1], "power"), 12.0);

        let stored = exec(&adapter, json!({ "do": "find", "on": "supers", "ids": [4] })).await.unwrap();
        assert_eq!(number(&stored[0], "power"), 12.0);
    }

    #[tokio::test]
    async fn push_and_pull() {
        let adapter = InMemoryAdapter::builder()
            .resource("bands", vec![doc! { "id": "a", "tags": ["rock", "live"] }])
            .build()
            .await
            .unwrap();

        let updated = exec(&adapter, json!({
            "do": "update",
            "on": "bands",
            "ids": ["a"],
            "update": [{ "tags": { "push": ["indie", "live"] } }, { "tags": { "pull": "live" } }]
        }))
        .await
        .unwrap();

        assert_eq!(updated[0].get_array("tags").unwrap(), &vec![Bson::from("rock"), Bson::from("indie")]);
    }

    #[tokio::test]
    async fn failing_instruction_leaves_store_untouched() {
        let adapter = fixture().await;

        let err = exec(&adapter, json!({
            "do": "update",
            "on": "supers",
            "match": { "type": { "eq": "rogue" } },
            "body": [{ "power": 100 }],
            "update": [{ "handle": { "inc": 1 } }]
        }))
        .await
        .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidQuery(_)));

        let rogues = exec(&adapter, json!({ "do": "find", "on": "supers", "match": { "type": { "eq": "rogue" } } }))
            .await
            .unwrap();
        assert_eq!(number(&rogues[0], "power"), 5.0);
        assert_eq!(number(&rogues[1], "power"), 8.0);
    }

    #[tokio::test]
    async fn no_match_is_not_found() {
        let adapter = fixture().await;

        let err = exec(&adapter, json!({ "do": "update", "on": "supers", "ids": [99], "body": [{ "power": 1 }] }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound(Action::Update, ref resource) if resource == "supers"));
    }
}

mod remove {
    use super::*;

    #[tokio::test]
    async fn requires_targeting() {
        let adapter = fixture().await;
        let err = exec(&adapter, json!({ "do": "remove", "on": "supers" })).await.unwrap_err();
        assert!(err.to_string().contains("ids"));
        assert!(matches!(err, AdapterError::MissingTarget(Action::Remove)));
    }

    #[tokio::test]
    async fn removes_by_id() {
        let adapter = InMemoryAdapter::new();

        let created = exec(&adapter, json!({ "do": "create", "on": "bands", "body": [{ "name": "Starfucker" }] }))
            .await
            .unwrap();
        let id = created[0].get_str("id").unwrap();

        let removed = exec(&adapter, json!({ "do": "remove", "on": "bands", "ids": [id] })).await.unwrap();
        assert_eq!(removed, created);

        let found = exec(&adapter, json!({ "do": "find", "on": "bands", "ids": [id] })).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn removes_every_match_despite_shifting_positions() {
        let adapter = fixture().await;

        let removed = exec(&adapter, json!({ "do": "remove", "on": "supers", "match": { "speed": { "lte": 10 } } }))
            .await
            .unwrap();
        assert_eq!(handles(&removed), ["Pug", "Bruce", "Joe"]);

        let left = exec(&adapter, json!({ "do": "find", "on": "supers" })).await.unwrap();
        assert_eq!(handles(&left), ["Drzzt"]);
    }

    #[tokio::test]
    async fn non_matching_condition_is_empty() {
        let adapter = fixture().await;

        let removed = exec(&adapter, json!({ "do": "remove", "on": "supers", "match": { "type": { "eq": "bard" } } }))
            .await
            .unwrap();
        assert!(removed.is_empty());

        let missing = exec(&adapter, json!({ "do": "remove", "on": "nowhere", "ids": [1] })).await.unwrap();
        assert!(missing.is_empty());
    }
}

mod populate {
    use super::*;

    async fn linked() -> InMemoryAdapter {
        InMemoryAdapter::builder()
            .resource("supers", vec![
                doc! { "id": 1, "handle": "Drzzt", "powers": [10, 11], "mentor": 2 },
                doc! { "id": 2, "handle": "Pug", "powers": [12] },
                doc! { "id": 3, "handle": "Bruce" },
            ])
            .resource("abilities", vec![
                doc! { "id": "a", "power_id": 10, "name": "stealth" },
                doc! { "id": "b", "power_id": 11, "name": "blades" },
                doc! { "id": "c", "power_id": 12, "name": "magic" },
                doc! { "id": "d", "power_id": 10, "name": "shadows" },
            ])
            .build()
            .await
            .unwrap()
    }

    fn names(value: Option<&Bson>) -> Vec<String> {
        value
            .and_then(Bson::as_array)
            .unwrap()
            .iter()
            .map(|item| item.as_document().unwrap().get_str("name").unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn by_foreign_key_without_touching_store() {
        let adapter = linked().await;

        let found = exec(&adapter, json!({
            "do": "find",
            "on": "supers",
            "populate": { "powers": { "key": "power_id", "query": { "on": "abilities" } } }
        }))
        .await
        .unwrap();

        assert_eq!(names(found[0].get("powers")), ["stealth", "blades", "shadows"]);
        assert_eq!(names(found[1].get("powers")), ["magic"]);
        assert!(found[2].get("powers").is_none());

        let raw = exec(&adapter, json!({ "do": "find", "on": "supers", "ids": [1] })).await.unwrap();
        assert_eq!(raw[0].get_array("powers").unwrap(), &vec![Bson::Int32(10), Bson::Int32(11)]);
    }

    #[tokio::test]
    async fn by_id_with_nested_select() {
        let adapter = linked().await;

        let envelope = Envelope::builder()
            .action(Action::Find)
            .resource("supers")
            .ids([1])
            .populate("mentor", PopulateSpec::by_id().with_query(Envelope::builder().resource("supers").select(["handle"]).build()))
            .build();

        let found = adapter.exec(&envelope).await.unwrap();
        assert_eq!(found[0].get_array("mentor").unwrap(), &vec![Bson::Document(doc! { "handle": "Pug" })]);
    }

    #[tokio::test]
    async fn nested_match_is_conjoined() {
        let adapter = linked().await;

        let envelope = Envelope::builder()
            .action(Action::Find)
            .resource("supers")
            .ids([1])
            .populate(
                "powers",
                PopulateSpec::by_key("power_id")
                    .with_query(Envelope::builder().resource("abilities").matcher(Match::neq("name", "shadows")).build()),
            )
            .build();

        let found = adapter.exec(&envelope).await.unwrap();
        assert_eq!(names(found[0].get("powers")), ["stealth", "blades"]);
    }

    #[tokio::test]
    async fn nested_failure_fails_the_whole_find() {
        let adapter = linked().await;

        let err = exec(&adapter, json!({
            "do": "find",
            "on": "supers",
            "populate": { "powers": { "key": "power_id", "query": { "on": "abilities", "select": ["name", "-id"] } } }
        }))
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Population);
        assert!(matches!(err, AdapterError::Population { ref field, .. } if field == "powers"));
    }

    #[tokio::test]
    async fn replaced_store_isolates_fixtures() {
        let adapter = linked().await;

        let mut store = StoreMap::new();
        store.insert("supers".to_string(), supers());
        adapter.replace_store(store).await.unwrap();

        let found = exec(&adapter, json!({ "do": "find", "on": "abilities" })).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(exec(&adapter, json!({ "do": "find", "on": "supers" })).await.unwrap().len(), 4);
    }
}
