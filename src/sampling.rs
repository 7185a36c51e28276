use crate::error::{Result, VerifyError};
use crate::models::Record;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::{SliceRandom, index};

pub const DEFAULT_TRAIN_FRACTION: f64 = 0.75;

/// Choose up to `sample_size` records without replacement.
///
/// The same seed and input always yield the same output. Chosen records keep
/// their source order. With no `sample_size` every record is returned.
pub fn select(records: &[Record], sample_size: Option<usize>, seed: u64) -> Vec<Record> {
    let Some(requested) = sample_size else {
        return records.to_vec();
    };

    let amount = requested.min(records.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = index::sample(&mut rng, records.len(), amount).into_vec();
    picked.sort_unstable();

    picked.into_iter().map(|i| records[i].clone()).collect()
}

/// Shuffle under `seed` and cut into (train, test).
///
/// The cut sits at `floor(len * train_fraction)`, clamped so neither side is
/// empty. Only the test side is scored; train is left for prompt tuning.
pub fn split(records: &[Record], seed: u64, train_fraction: f64) -> Result<(Vec<Record>, Vec<Record>)> {
    let len = records.len();
    if len < 2 {
        return Err(VerifyError::InsufficientData { needed: 2, found: len });
    }

    let mut shuffled = records.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let cut = ((len as f64 * train_fraction).floor() as usize).clamp(1, len - 1);
    let test = shuffled.split_off(cut);

    Ok((shuffled, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verdict;
    use std::collections::HashSet;

    fn records(n: usize) -> Vec<Record> {
        (1..=n)
            .map(|i| Record {
                id: i.to_string(),
                question: format!("question {}", i),
                response: format!("response {}", i),
                label: if i % 3 == 0 { Verdict::Fail } else { Verdict::Pass },
                category: None,
            })
            .collect()
    }

    fn ids(records: &[Record]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_select_is_reproducible() {
        let data = records(50);
        for seed in [0, 1, 42, u64::MAX] {
            let first = select(&data, Some(10), seed);
            let second = select(&data, Some(10), seed);
            assert_eq!(first, second);
            assert_eq!(first.len(), 10);
        }
    }

    #[test]
    fn test_select_seed_changes_sample() {
        let data = records(100);
        let a = ids(&select(&data, Some(10), 1));
        let b = ids(&select(&data, Some(10), 2));
        assert_ne!(a, b);
    }

    #[test]
    fn test_select_without_replacement_in_source_order() {
        let data = records(30);
        let picked = select(&data, Some(12), 7);

        let positions: Vec<usize> = picked.iter().map(|r| r.id.parse().unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        let unique: HashSet<_> = positions.iter().collect();
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn test_select_caps_at_population() {
        let data = records(5);
        assert_eq!(select(&data, Some(50), 42), data);
        assert_eq!(select(&data, None, 42), data);
        assert!(select(&[], Some(3), 42).is_empty());
    }

    #[test]
    fn test_split_partitions_records() {
        for n in 2..40 {
            let data = records(n);
            let (train, test) = split(&data, 42, DEFAULT_TRAIN_FRACTION).unwrap();

            assert!(!train.is_empty());
            assert!(!test.is_empty());
            assert_eq!(train.len() + test.len(), n);

            let train_ids: HashSet<_> = ids(&train).into_iter().collect();
            let test_ids: HashSet<_> = ids(&test).into_iter().collect();
            assert!(train_ids.is_disjoint(&test_ids));

            let union: HashSet<_> = train_ids.union(&test_ids).cloned().collect();
            let all: HashSet<_> = ids(&data).into_iter().collect();
            assert_eq!(union, all);
        }
    }

    #[test]
    fn test_split_uses_floor_index() {
        let (train, test) = split(&records(8), 42, 0.75).unwrap();
        assert_eq!((train.len(), test.len()), (6, 2));

        let (train, test) = split(&records(3), 42, 0.75).unwrap();
        assert_eq!((train.len(), test.len()), (2, 1));

        let (train, test) = split(&records(2), 42, 0.75).unwrap();
        assert_eq!((train.len(), test.len()), (1, 1));
    }

    #[test]
    fn test_split_clamps_extreme_fractions() {
        let (train, test) = split(&records(4), 42, 0.1).unwrap();
        assert_eq!((train.len(), test.len()), (1, 3));

        let (train, test) = split(&records(4), 42, 0.99).unwrap();
        assert_eq!((train.len(), test.len()), (3, 1));
    }

    #[test]
    fn test_split_is_reproducible() {
        let data = records(20);
        let first = split(&data, 9, 0.75).unwrap();
        let second = split(&data, 9, 0.75).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_split_insufficient_data() {
        for n in 0..2 {
            let err = split(&records(n), 42, 0.75).unwrap_err();
            assert!(matches!(err, VerifyError::InsufficientData { needed: 2, found } if found == n));
        }
    }
}
