//! Property tests for record flattening, batching and bucket selection

use anonymize_it::core::mapping::bucket::BucketMap;
use anonymize_it::core::providers::ProviderRegistry;
use anonymize_it::core::stream::BatchStreamer;
use anonymize_it::domain::Record;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::from),
    ]
}

/// Nested objects whose keys contain no dots and whose objects are non-empty
fn document() -> impl Strategy<Value = Value> {
    let tree = leaf().prop_recursive(3, 24, 4, |inner| {
        prop::collection::btree_map("[a-z][a-z0-9_]{0,6}", inner, 1..4)
            .prop_map(|map| Value::Object(map.into_iter().collect::<Map<String, Value>>()))
    });
    prop::collection::btree_map("[a-z][a-z0-9_]{0,6}", tree, 1..5)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

proptest! {
    #[test]
    fn flatten_then_nest_restores_document(document in document()) {
        let record = Record::from_document(document.clone()).unwrap();
        prop_assert!(record.fields().all(|field| !field.starts_with('.') && !field.ends_with('.')));
        prop_assert_eq!(record.to_nested(), document);
    }

    #[test]
    fn batches_cover_every_record(total in 0usize..200, batch_size in 1usize..40) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (sizes, sequences) = runtime.block_on(async {
            let records = (0..total).map(|i| Record::from_document(json!({"n": i})));
            let mut streamer = BatchStreamer::new(futures::stream::iter(records), batch_size).unwrap();
            let mut sizes = Vec::new();
            let mut sequences = Vec::new();
            while let Some(batch) = streamer.next_batch().await.unwrap() {
                sizes.push(batch.len());
                sequences.push(batch.sequence);
            }
            (sizes, sequences)
        });

        prop_assert_eq!(sizes.len(), total.div_ceil(batch_size));
        prop_assert_eq!(sizes.iter().sum::<usize>(), total);
        if let Some((last, full)) = sizes.split_last() {
            prop_assert!(full.iter().all(|size| *size == batch_size));
            prop_assert!(*last >= 1 && *last <= batch_size);
        }
        prop_assert_eq!(sequences, (0..sizes.len()).collect::<Vec<_>>());
    }

    #[test]
    fn bucket_selection_is_stable(
        values in prop::collection::vec("[a-z0-9.@-]{1,20}", 1..30),
        pool_size in 1usize..50,
        seed in any::<u64>(),
    ) {
        let mut registry = ProviderRegistry::new(Some(seed));
        let provider = ProviderRegistry::lookup("token").unwrap();
        let bucket = BucketMap::generate("session.id", &provider, pool_size, &mut registry);

        prop_assert_eq!(bucket.pool_size(), pool_size);
        for value in values {
            let original = Value::from(value);
            let index = bucket.index_of(&original);
            prop_assert!(index < pool_size);
            prop_assert_eq!(bucket.index_of(&original), index);
            prop_assert_eq!(bucket.substitute(&original), bucket.substitute(&original.clone()));
        }
    }
}
