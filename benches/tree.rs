//! Benchmarks for `BwTree` using Divan.
//!
//! Run with: `cargo bench --bench tree`

use divan::{black_box, Bencher};

use bwtree::{BwTree, TreeConfig};

fn main() {
    divan::main();
}

fn bench_tree() -> BwTree<u64, u64> {
    BwTree::with_config(
        TreeConfig::default()
            .leaf_slot_max(64)
            .inner_slot_max(64)
            .mapping_capacity(1 << 20),
    )
}

// =============================================================================
// Construction
// =============================================================================

#[divan::bench_group]
mod construction {
    use super::{bench_tree, BwTree};

    #[divan::bench]
    fn with_config() -> BwTree<u64, u64> {
        bench_tree()
    }
}

// =============================================================================
// Insert
// =============================================================================

#[divan::bench_group]
mod insert {
    use super::{bench_tree, black_box, Bencher};

    #[divan::bench(args = [100, 1_000, 10_000])]
    fn sequential_keys(bencher: Bencher, count: u64) {
        bencher.bench_local(|| {
            let tree = bench_tree();
            let guard = tree.guard();
            for k in 0..count {
                tree.insert_with_guard(black_box(k), k, &guard).unwrap();
            }
            tree.len()
        });
    }

    #[divan::bench(args = [1_000, 10_000])]
    fn shuffled_keys(bencher: Bencher, count: u64) {
        // Fixed multiplicative shuffle: structural load without rng noise.
        let keys: Vec<u64> = (0..count).map(|i| i.wrapping_mul(0x9E37_79B9) % count).collect();
        bencher.bench_local(|| {
            let tree = bench_tree();
            let guard = tree.guard();
            for k in &keys {
                tree.insert_with_guard(black_box(*k), *k, &guard).unwrap();
            }
            tree.len()
        });
    }

    #[divan::bench]
    fn duplicate_heavy(bencher: Bencher) {
        bencher.bench_local(|| {
            let tree = bench_tree();
            let guard = tree.guard();
            for i in 0..10_000u64 {
                tree.insert_with_guard(black_box(i % 128), i, &guard).unwrap();
            }
            tree.len()
        });
    }
}

// =============================================================================
// Lookup
// =============================================================================

#[divan::bench_group]
mod lookup {
    use super::{bench_tree, black_box, Bencher, BwTree};

    fn populated(count: u64) -> BwTree<u64, u64> {
        let tree = bench_tree();
        for k in 0..count {
            tree.insert(k, k * 2).unwrap();
        }
        tree
    }

    #[divan::bench(args = [1_000, 100_000])]
    fn hit(bencher: Bencher, count: u64) {
        let tree = populated(count);
        let mut next = 0u64;
        bencher.bench_local(move || {
            next = (next + 7919) % count;
            black_box(tree.lookup(black_box(&next)))
        });
    }

    #[divan::bench(args = [100_000])]
    fn miss(bencher: Bencher, count: u64) {
        let tree = populated(count);
        bencher.bench_local(move || black_box(tree.lookup(black_box(&(count + 1)))));
    }

    #[divan::bench(args = [100_000])]
    fn hit_with_shared_guard(bencher: Bencher, count: u64) {
        let tree = populated(count);
        let mut next = 0u64;
        bencher.bench_local(move || {
            let guard = tree.guard();
            next = (next + 7919) % count;
            black_box(tree.lookup_with_guard(black_box(&next), &guard))
        });
    }
}

// =============================================================================
// Scan
// =============================================================================

#[divan::bench_group]
mod scan {
    use super::{bench_tree, black_box, Bencher};

    #[divan::bench(args = [1_000, 50_000])]
    fn scan_all(bencher: Bencher, count: u64) {
        let tree = bench_tree();
        for k in 0..count {
            tree.insert(k, k).unwrap();
        }
        bencher.bench_local(move || black_box(tree.scan_all().len()));
    }
}

// =============================================================================
// Mixed workload
// =============================================================================

#[divan::bench_group]
mod mixed {
    use super::{bench_tree, black_box, Bencher};

    #[divan::bench]
    fn insert_update_delete_cycle(bencher: Bencher) {
        bencher.bench_local(|| {
            let tree = bench_tree();
            let guard = tree.guard();
            for i in 0..5_000u64 {
                let k = i % 512;
                tree.insert_with_guard(k, i, &guard).unwrap();
                if i % 3 == 0 {
                    tree.update_with_guard(k, i + 1, &guard).unwrap();
                }
                if i % 5 == 0 {
                    tree.delete_key_with_guard(black_box(k), &guard).unwrap();
                }
            }
            tree.len()
        });
    }
}
