//! Value stores: cache transparency, persistence, file layout.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use retrograde::store::{
    CacheGeometry, CachedFileStore, DirectFileStore, FarthestLine, LeastRecentlyUsed,
    MemoryStore, NearestLine, ReplacementPolicy, RoundRobin, ValueStore,
};

const NUM_STATES: u64 = 53;

fn geometry(line_length: usize, num_lines: usize) -> CacheGeometry {
    CacheGeometry {
        num_states: NUM_STATES,
        line_length,
        num_lines,
    }
}

/// Random reads, writes and flushes against a cached store and a reference.
fn check_against_memory<P: ReplacementPolicy>(policy: P, seed: u64) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("values.bin");
    let cached = CachedFileStore::open(&path, geometry(4, 3), true, policy).unwrap();
    let reference = MemoryStore::new(NUM_STATES);
    let mut rng = StdRng::seed_from_u64(seed);

    for step in 0..3000 {
        let index = rng.random_range(0..NUM_STATES);
        match rng.random_range(0..10) {
            0..=3 => {
                let value: f64 = rng.random_range(-100.0..100.0);
                cached.set(index, value).unwrap();
                reference.set(index, value).unwrap();
            }
            4 => cached.flush().unwrap(),
            _ => assert_eq!(
                cached.get(index).unwrap(),
                reference.get(index).unwrap(),
                "step {step} index {index}"
            ),
        }
    }

    let mut a = Vec::new();
    let mut b = Vec::new();
    cached.write_values(&mut a).unwrap();
    reference.write_values(&mut b).unwrap();
    assert_eq!(a, b);

    let stats = cached.stats();
    assert!(stats.evictions > 0 && stats.hits > 0);
    assert!(cached.resident_lines().len() <= 3);
}

#[test]
fn lru_cache_is_transparent() {
    check_against_memory(LeastRecentlyUsed, 1);
}

#[test]
fn round_robin_cache_is_transparent() {
    check_against_memory(RoundRobin::default(), 2);
}

#[test]
fn nearest_line_cache_is_transparent() {
    check_against_memory(NearestLine, 3);
}

#[test]
fn farthest_line_cache_is_transparent() {
    check_against_memory(FarthestLine, 4);
}

#[test]
fn boxed_policy_is_transparent() {
    let policy: Box<dyn ReplacementPolicy> = Box::new(NearestLine);
    check_against_memory(policy, 5);
}

#[test]
fn reopen_sees_flushed_values_through_any_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("values.bin");
    {
        let store = CachedFileStore::open_lru(&path, geometry(8, 2), true).unwrap();
        for i in 0..NUM_STATES {
            store.set(i, (i * i) as f64).unwrap();
        }
        store.flush().unwrap();
    }

    let direct = DirectFileStore::open(&path, NUM_STATES, false).unwrap();
    let cached = CachedFileStore::open_lru(&path, geometry(5, 1), false).unwrap();
    for i in 0..NUM_STATES {
        assert_eq!(direct.get(i).unwrap(), (i * i) as f64);
        assert_eq!(cached.get(i).unwrap(), (i * i) as f64);
    }
}

#[test]
fn larger_state_count_extends_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("values.bin");
    {
        let store = CachedFileStore::open_lru(&path, geometry(4, 2), true).unwrap();
        store.set(NUM_STATES - 1, 7.0).unwrap();
        store.flush().unwrap();
    }
    let bigger = CacheGeometry {
        num_states: NUM_STATES + 20,
        ..geometry(4, 2)
    };
    let store = CachedFileStore::open_lru(&path, bigger, false).unwrap();
    assert_eq!(store.get(NUM_STATES - 1).unwrap(), 7.0);
    assert_eq!(store.get(NUM_STATES + 19).unwrap(), 0.0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), (NUM_STATES + 20) * 8);
}

#[test]
fn writes_never_leak_into_neighbours() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("values.bin");
    let store = CachedFileStore::open_lru(&path, geometry(4, 2), true).unwrap();
    for i in 0..NUM_STATES {
        store.set(i, 1.0).unwrap();
        for j in 0..NUM_STATES {
            let expected = if j <= i { 1.0 } else { 0.0 };
            assert_eq!(store.get(j).unwrap(), expected, "after set {i}, get {j}");
        }
    }
}
