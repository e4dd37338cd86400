//! Property tests for the map's core invariants: random sequences of
//! `insert`/`erase`/`range_query` calls checked against a sequential
//! `BTreeMap` oracle, single-threaded.

use cordmap::map::ConcurrentMap;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Insert(i32, i32),
    Erase(i32),
    RangeQuery(i32, i32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i32..200, 0i32..1_000_000).prop_map(|(k, v)| Op::Insert(k, v)),
        (0i32..200).prop_map(Op::Erase),
        (0i32..200, 0i32..200).prop_map(|(a, b)| {
            if a <= b {
                Op::RangeQuery(a, b)
            } else {
                Op::RangeQuery(b, a)
            }
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// After replaying any sequence of inserts/erases/range-queries, the map
    /// agrees with a `BTreeMap` oracle replayed the same way: `insert`
    /// returns the prior value, `erase` returns the removed (or no) value,
    /// and `range_query` returns exactly the oracle's matching entries,
    /// sorted, with no duplicates.
    #[test]
    fn matches_btreemap_oracle(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let map: ConcurrentMap<i32, i32> = ConcurrentMap::new(i32::MIN, i32::MAX, -1).unwrap();
        let mut handle = map.init_thread();
        let mut oracle: BTreeMap<i32, i32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let prior = map.insert(&mut handle, k, v).unwrap();
                    let oracle_prior = *oracle.entry(k).or_insert(v);
                    prop_assert_eq!(prior, oracle_prior);
                }
                Op::Erase(k) => {
                    let removed = map.erase(&mut handle, &k).unwrap();
                    let oracle_removed = oracle.remove(&k).unwrap_or(-1);
                    prop_assert_eq!(removed, oracle_removed);
                }
                Op::RangeQuery(lo, hi) => {
                    let result = map.range_query(&mut handle, &lo, &hi).unwrap();
                    let expected: Vec<(i32, i32)> = oracle
                        .range(lo..=hi)
                        .map(|(&k, &v)| (k, v))
                        .collect();
                    prop_assert_eq!(result, expected);
                }
            }
        }
    }

    /// `contains` agrees with the oracle after every mutating op: the "After
    /// insert(k, v), contains(k) is true" / "After erase(k), contains(k) is
    /// false" laws of the map's core behavior, exercised transactionally rather than as two
    /// isolated examples.
    #[test]
    fn contains_matches_oracle_after_every_mutation(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let map: ConcurrentMap<i32, i32> = ConcurrentMap::new(i32::MIN, i32::MAX, -1).unwrap();
        let mut handle = map.init_thread();
        let mut oracle: BTreeMap<i32, i32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    map.insert(&mut handle, k, v).unwrap();
                    oracle.entry(k).or_insert(v);
                }
                Op::Erase(k) => {
                    map.erase(&mut handle, &k).unwrap();
                    oracle.remove(&k);
                }
                Op::RangeQuery(_, _) => continue,
            }
        }

        for k in 0..200 {
            prop_assert_eq!(map.contains(&mut handle, &k).unwrap(), oracle.contains_key(&k));
        }
    }
}
