//! Bin-packing strategies over `{key -> size}` maps.
//!
//! Four algorithms, all with the same shape: given a table of items and a
//! capacity, choose a subset whose total size fits in that capacity. Used
//! by [`crate::list::BackupFileList::generate_fitted`] and
//! [`crate::list::BackupFileList::generate_span`] to pack a week of backups
//! across discs.

use std::collections::BTreeMap;

use crate::error::{FsError, Result};

/// Result of a single knapsack fit: the selected keys (in selection order)
/// and their total size.
pub type Fit<K> = (Vec<K>, f64);

/// Name of a knapsack algorithm, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Consider items in table order, include each that still fits.
    FirstFit,
    /// Repeatedly pick the remaining item whose size is closest to (but
    /// not over) the remaining capacity.
    BestFit,
    /// Repeatedly pick the largest remaining item that still fits.
    WorstFit,
    /// Alternate one pick from the worst-fit side and one from the
    /// best-fit side until nothing else fits.
    AlternateFit,
}

impl Algorithm {
    /// Parses the spec's algorithm name strings (`"first_fit"` etc).
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "first_fit" => Ok(Algorithm::FirstFit),
            "best_fit" => Ok(Algorithm::BestFit),
            "worst_fit" => Ok(Algorithm::WorstFit),
            "alternate_fit" => Ok(Algorithm::AlternateFit),
            other => Err(FsError::InvalidArgument(format!(
                "Algorithm [{other}] is invalid."
            ))),
        }
    }

    /// Runs this algorithm against `table` and `capacity`.
    pub fn fit<K: Ord + Clone>(self, table: &BTreeMap<K, f64>, capacity: f64) -> Fit<K> {
        match self {
            Algorithm::FirstFit => first_fit(table, capacity),
            Algorithm::BestFit => best_fit(table, capacity),
            Algorithm::WorstFit => worst_fit(table, capacity),
            Algorithm::AlternateFit => alternate_fit(table, capacity),
        }
    }
}

/// Items in table (key) order, include each if it fits in the remaining
/// capacity. Ties are naturally broken by table order since `BTreeMap`
/// iterates in key order.
pub fn first_fit<K: Ord + Clone>(table: &BTreeMap<K, f64>, capacity: f64) -> Fit<K> {
    let mut selected = Vec::new();
    let mut remaining = capacity;
    let mut total = 0.0;

    for (key, &size) in table.iter() {
        if size <= remaining {
            selected.push(key.clone());
            remaining -= size;
            total += size;
        }
    }

    (selected, total)
}

/// Repeatedly pick the item whose size is closest to (but not over) the
/// remaining capacity; ties broken by key order.
pub fn best_fit<K: Ord + Clone>(table: &BTreeMap<K, f64>, capacity: f64) -> Fit<K> {
    greedy_pick(table, capacity, |candidates, remaining| {
        candidates
            .iter()
            .filter(|(_, &size)| size <= remaining)
            .min_by(|(k1, &s1), (k2, &s2)| {
                (remaining - s1)
                    .partial_cmp(&(remaining - s2))
                    .unwrap()
                    .then_with(|| k1.cmp(k2))
            })
            .map(|(k, _)| (*k).clone())
    })
}

/// Repeatedly pick the largest remaining item that still fits; ties broken
/// by key order.
pub fn worst_fit<K: Ord + Clone>(table: &BTreeMap<K, f64>, capacity: f64) -> Fit<K> {
    greedy_pick(table, capacity, |candidates, remaining| {
        candidates
            .iter()
            .filter(|(_, &size)| size <= remaining)
            .max_by(|(k1, &s1), (k2, &s2)| {
                s1.partial_cmp(&s2).unwrap().then_with(|| k1.cmp(k2))
            })
            .map(|(k, _)| (*k).clone())
    })
}

/// Alternate one pick from the worst-fit side and one from the best-fit
/// side until nothing else fits.
pub fn alternate_fit<K: Ord + Clone>(table: &BTreeMap<K, f64>, capacity: f64) -> Fit<K> {
    let mut selected = Vec::new();
    let mut remaining = capacity;
    let mut total = 0.0;
    let mut worst_turn = true;

    loop {
        let candidates: Vec<(&K, &f64)> = table
            .iter()
            .filter(|(k, _)| !selected.contains(k))
            .collect();

        let pick = if worst_turn {
            candidates
                .iter()
                .filter(|(_, &size)| size <= remaining)
                .max_by(|(k1, &s1), (k2, &s2)| {
                    s1.partial_cmp(&s2).unwrap().then_with(|| k1.cmp(k2))
                })
                .map(|(k, _)| (*k).clone())
        } else {
            candidates
                .iter()
                .filter(|(_, &size)| size <= remaining)
                .min_by(|(k1, &s1), (k2, &s2)| {
                    (remaining - s1)
                        .partial_cmp(&(remaining - s2))
                        .unwrap()
                        .then_with(|| k1.cmp(k2))
                })
                .map(|(k, _)| (*k).clone())
        };

        match pick {
            Some(key) => {
                let size = table[&key];
                remaining -= size;
                total += size;
                selected.push(key);
            }
            None => break,
        }

        worst_turn = !worst_turn;
    }

    (selected, total)
}

/// Shared driver for the repeatedly-pick-one-item algorithms (best/worst
/// fit): each call to `pick_one` must return the next key to take, given
/// the set of not-yet-selected candidates and the remaining capacity.
fn greedy_pick<K, F>(table: &BTreeMap<K, f64>, capacity: f64, mut pick_one: F) -> Fit<K>
where
    K: Ord + Clone,
    F: FnMut(&[(&K, &f64)], f64) -> Option<K>,
{
    let mut selected: Vec<K> = Vec::new();
    let mut remaining = capacity;
    let mut total = 0.0;

    loop {
        let candidates: Vec<(&K, &f64)> = table
            .iter()
            .filter(|(k, _)| !selected.contains(k))
            .collect();

        match pick_one(&candidates, remaining) {
            Some(key) => {
                let size = table[&key];
                remaining -= size;
                total += size;
                selected.push(key);
            }
            None => break,
        }
    }

    (selected, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn first_fit_includes_in_order_while_it_fits() {
        let t = table(&[("a", 300.0), ("b", 300.0), ("c", 400.0), ("d", 700.0)]);
        let (selected, total) = first_fit(&t, 1000.0);
        assert_eq!(selected, vec!["a", "b", "c"]);
        assert_eq!(total, 1000.0);
    }

    #[test]
    fn worst_fit_picks_largest_first() {
        // Spec scenario 1: worst-fit on {a:300,b:300,c:400,d:700}, cap 1000
        // First span: {d, a} size 1000.
        let t = table(&[("a", 300.0), ("b", 300.0), ("c", 400.0), ("d", 700.0)]);
        let (selected, total) = worst_fit(&t, 1000.0);
        assert_eq!(selected, vec!["d", "a"]);
        assert_eq!(total, 1000.0);
    }

    #[test]
    fn best_fit_prefers_closest_remaining() {
        let t = table(&[("a", 100.0), ("b", 450.0), ("c", 500.0)]);
        let (selected, _total) = best_fit(&t, 500.0);
        assert_eq!(selected[0], "c");
    }

    #[test]
    fn zero_size_item_always_included() {
        let t = table(&[("a", 0.0), ("b", 50.0)]);
        let (selected, _) = first_fit(&t, 10.0);
        assert!(selected.contains(&"a".to_string()));
    }

    #[test]
    fn ties_break_by_key_order() {
        let t = table(&[("b", 100.0), ("a", 100.0)]);
        let (selected, _) = worst_fit(&t, 100.0);
        assert_eq!(selected, vec!["a"]);
    }

    #[test]
    fn selection_never_exceeds_capacity() {
        let t = table(&[("a", 37.0), ("b", 51.0), ("c", 12.0), ("d", 99.0)]);
        for algo in [
            Algorithm::FirstFit,
            Algorithm::BestFit,
            Algorithm::WorstFit,
            Algorithm::AlternateFit,
        ] {
            let (selected, total) = algo.fit(&t, 100.0);
            assert!(total <= 100.0);
            let recomputed: f64 = selected.iter().map(|k| t[k]).sum();
            assert_eq!(recomputed, total);
        }
    }

    #[test]
    fn alternate_fit_alternates_sides() {
        let t = table(&[("a", 10.0), ("b", 90.0), ("c", 50.0), ("d", 40.0)]);
        let (selected, total) = alternate_fit(&t, 100.0);
        assert!(total <= 100.0);
        assert!(!selected.is_empty());
    }

    #[test]
    fn algorithm_from_name_rejects_unknown() {
        assert!(Algorithm::from_name("bogus_fit").is_err());
        assert!(Algorithm::from_name("first_fit").is_ok());
    }
}
