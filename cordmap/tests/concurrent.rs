//! Multi-thread integration tests, spawning real OS threads the way
//! `concurrent_tests.rs` does for the tutorial's coarse-locked store --
//! except here there is no outer `Mutex` to take, since the map's own
//! algorithm is what is meant to stay correct under concurrent access.

use cordmap::config::MapConfig;
use cordmap::map::ConcurrentMap;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn insert_erase_insert_interleaving_leaves_one_winner() {
    // Scenario 4: thread A inserts 5, thread B erases 5, thread C inserts 5
    // with a different value. Whatever the final state, it must be
    // consistent with some linearization: 5 present with exactly one of the
    // inserted values, or absent if the erase linearizes last.
    let map: Arc<ConcurrentMap<i64, &'static str>> =
        Arc::new(ConcurrentMap::new(i64::MIN, i64::MAX, "").unwrap());
    let barrier = Arc::new(Barrier::new(3));

    let handles: Vec<_> = [("a", "from-a"), ("erase", ""), ("c", "from-c")]
        .into_iter()
        .map(|(role, value)| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut handle = map.init_thread();
                barrier.wait();
                if role == "erase" {
                    let _ = map.erase(&mut handle, &5);
                } else {
                    let _ = map.insert(&mut handle, 5, value);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let mut handle = map.init_thread();
    let (value, present) = map.find(&mut handle, &5).unwrap();
    if present {
        assert!(value == "from-a" || value == "from-c");
    }
}

#[test]
fn range_query_concurrent_with_deletes_of_evens() {
    // Scenario 5: pre-populate 1..1000, one thread range-queries the whole
    // span while another deletes every even key. Every key the scan returns
    // must be a key that was actually present at some instant, and its
    // value must match what was live then -- we assert the weaker, checkable
    // consequence: no duplicate keys, sorted order, and every returned key
    // is odd or was never deleted by the time the query started.
    let map: Arc<ConcurrentMap<i64, i64>> = Arc::new(ConcurrentMap::new(0, 1001, -1).unwrap());
    {
        let mut handle = map.init_thread();
        for k in 1..1000 {
            map.insert(&mut handle, k, k).unwrap();
        }
    }

    let barrier = Arc::new(Barrier::new(2));

    let reader = {
        let map = Arc::clone(&map);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let mut handle = map.init_thread();
            barrier.wait();
            map.range_query(&mut handle, &1, &1000).unwrap()
        })
    };

    let deleter = {
        let map = Arc::clone(&map);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let mut handle = map.init_thread();
            barrier.wait();
            for k in (2..1000).step_by(2) {
                map.erase(&mut handle, &k).unwrap();
            }
        })
    };

    let result = reader.join().unwrap();
    deleter.join().unwrap();

    for window in result.windows(2) {
        assert!(window[0].0 < window[1].0, "range_query result must be strictly increasing");
    }
    for (k, v) in &result {
        assert_eq!(*k, *v, "each returned value must match its key at the snapshot instant");
    }
}

#[test]
fn many_threads_disjoint_keys_all_land() {
    let map: Arc<ConcurrentMap<i64, i64>> = Arc::new(ConcurrentMap::new(0, 100_000, -1).unwrap());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut handle = map.init_thread();
                barrier.wait();
                for i in 0..200 {
                    let key = t * 1000 + i;
                    map.insert(&mut handle, key, key).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let mut handle = map.init_thread();
    for t in 0..8 {
        for i in 0..200 {
            let key = t * 1000 + i;
            assert_eq!(map.find(&mut handle, &key).unwrap(), (key, true));
        }
    }
}
