//! Seeded train/test split.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::AppError;

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SPLIT_SEED: u64 = 42;

/// Row indices for training and testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a seeded RNG and hold out `ceil(n × test_fraction)` rows.
///
/// Both sides must end up non-empty.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<Split, AppError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(AppError::new(2, "Test fraction must be in (0, 1)."));
    }
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(AppError::new(
            3,
            format!("Cannot split {n} row(s) into non-empty train and test sets."),
        ));
    }

    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = idx.split_off(n_test);
    Ok(Split { train, test: idx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sizes_and_coverage() {
        let s = train_test_split(101, 0.2, 42).unwrap();
        assert_eq!(s.test.len(), 21);
        assert_eq!(s.train.len(), 80);

        let mut all: Vec<usize> = s.train.iter().chain(&s.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_seeded() {
        let a = train_test_split(50, 0.2, 42).unwrap();
        let b = train_test_split(50, 0.2, 42).unwrap();
        let c = train_test_split(50, 0.2, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn degenerate_inputs_fail() {
        assert_eq!(train_test_split(1, 0.2, 42).unwrap_err().exit_code(), 3);
        assert_eq!(train_test_split(10, 1.0, 42).unwrap_err().exit_code(), 2);
        assert_eq!(train_test_split(0, 0.2, 42).unwrap_err().exit_code(), 3);
    }
}
