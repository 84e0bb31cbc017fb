//! Uniform sampling without replacement.
//!
//! A partial Fisher–Yates shuffle: the first `k` slots are filled by swapping
//! each with a uniformly chosen element from the unshuffled tail. Runs in
//! `O(k)` swaps regardless of how the random draws fall.

use rand::Rng;

use crate::error::{Error, Result};

/// Draw `min(k, items.len())` distinct elements uniformly at random.
///
/// Every subset of the requested size is equally likely. An empty input
/// yields an empty result for any `k`; otherwise `k == 0` is rejected.
pub fn sample<T>(items: Vec<T>, k: usize) -> Result<Vec<T>> {
    sample_with_rng(items, k, &mut rand::thread_rng())
}

/// [`sample`] with a caller-supplied random source.
pub fn sample_with_rng<T, R: Rng + ?Sized>(
    mut items: Vec<T>,
    k: usize,
    rng: &mut R,
) -> Result<Vec<T>> {
    if items.is_empty() {
        return Ok(items);
    }
    if k == 0 {
        return Err(Error::InvalidArgument(
            "sample size must be positive".to_string(),
        ));
    }

    let n = items.len();
    let take = k.min(n);
    for i in 0..take {
        let j = rng.gen_range(i..n);
        items.swap(i, j);
    }
    items.truncate(take);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn test_sample_larger_input_returns_k_distinct() {
        let items: Vec<u32> = (0..30).collect();
        let picked = sample(items, 21).unwrap();

        assert_eq!(picked.len(), 21);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 21);
        assert!(picked.iter().all(|v| *v < 30));
    }

    #[test]
    fn test_sample_smaller_input_returns_all() {
        let items = vec!["a", "b", "c", "d", "e"];
        let mut picked = sample(items, 21).unwrap();
        picked.sort();
        assert_eq!(picked, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_sample_empty_input() {
        let picked = sample(Vec::<u8>::new(), 21).unwrap();
        assert!(picked.is_empty());
        assert!(sample(Vec::<u8>::new(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_sample_zero_k_rejected() {
        let err = sample(vec![1, 2, 3], 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_sample_single_element() {
        assert_eq!(sample(vec![42], 1).unwrap(), vec![42]);
    }

    #[test]
    fn test_sample_is_deterministic_with_seeded_rng() {
        let items: Vec<u32> = (0..100).collect();
        let a = sample_with_rng(items.clone(), 10, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = sample_with_rng(items, 10, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_is_roughly_uniform() {
        // 5 choose 2 = 10 subsets; each should appear about 1/10 of the time.
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut counts: HashMap<Vec<u8>, usize> = HashMap::new();
        let trials = 20_000;
        for _ in 0..trials {
            let mut picked = sample_with_rng(vec![0u8, 1, 2, 3, 4], 2, &mut rng).unwrap();
            picked.sort();
            *counts.entry(picked).or_default() += 1;
        }

        assert_eq!(counts.len(), 10);
        let expected = trials / 10;
        for (subset, count) in counts {
            let deviation = (count as i64 - expected as i64).abs();
            assert!(
                deviation < (expected as i64) / 5,
                "subset {subset:?} drawn {count} times, expected about {expected}"
            );
        }
    }
}
