//! Property tests for the producer/consumer pipeline.
//!
//! The interesting property is the round trip: for any sequence of records,
//! the byte stream delivered to the writer equals what rendering the records
//! synchronously would have produced, in order, with no gaps or duplicates.
//! Small ring sizes force frequent wraparound and producer blocking.

use std::sync::{Mutex, MutexGuard};

use framelog::{Config, MemoryWriter};
use proptest::prelude::*;

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn serialize_test() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_logger(input_buffer_size: usize, records: impl FnOnce()) -> Vec<u8> {
    let writer = MemoryWriter::new();
    framelog::initialize_with(
        Box::new(writer.clone()),
        Config {
            input_buffer_size,
            ..Config::default()
        },
    )
    .unwrap();
    records();
    framelog::cleanup().unwrap();
    writer.contents()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn round_trip_matches_synchronous_rendering(
        values in prop::collection::vec(any::<i64>(), 1..60)
    ) {
        let _guard = serialize_test();
        let contents = run_logger(512, || {
            for v in &values {
                framelog::log!("v=%d;", *v).unwrap();
            }
        });
        let expected: Vec<u8> = values
            .iter()
            .flat_map(|v| format!("v={v};").into_bytes())
            .collect();
        prop_assert_eq!(contents, expected);
    }

    #[test]
    fn owned_strings_survive_the_ring(
        texts in prop::collection::vec("[a-z]{0,12}", 1..40)
    ) {
        let _guard = serialize_test();
        let logged = texts.clone();
        let contents = run_logger(512, move || {
            for (i, text) in logged.into_iter().enumerate() {
                framelog::log!("%d:%s;", i, text).unwrap();
            }
        });
        let expected: Vec<u8> = texts
            .iter()
            .enumerate()
            .flat_map(|(i, text)| format!("{i}:{text};").into_bytes())
            .collect();
        prop_assert_eq!(contents, expected);
    }
}
