//! Adaptive quality search.
//!
//! Encodes once at the codec's starting quality, then keeps lowering the
//! quality by a fixed step until the measured output fits the target, the
//! quality floor is reached, or the retry budget is spent:
//!
//! ```text
//! Unneeded                      (original already fits, decided by the caller)
//! Initial ──▶ Retrying(1) ──▶ … ──▶ Retrying(max) ──▶ Done
//!    └────────────┴──────────────────────┴────────────▶ Done
//! ```
//!
//! The target is soft: whatever the last attempt produced is accepted.
//! The search never touches codecs or files itself; it drives an
//! encode-and-measure callback.

use crate::codec::Codec;
use crate::config::CompressionConfig;
use crate::error::Result;
use std::fmt;
use tracing::debug;

/// State of a single search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    /// Original already fits the target; nothing to encode
    Unneeded,
    /// First encode at the starting quality
    Initial,
    /// Retry number `n` (1-based) at a lower quality
    Retrying(u32),
    /// Accepted the last encode
    Done,
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchState::Unneeded => f.write_str("unneeded"),
            SearchState::Initial => f.write_str("initial"),
            SearchState::Retrying(n) => write!(f, "retrying({})", n),
            SearchState::Done => f.write_str("done"),
        }
    }
}

/// Numeric parameters of one search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Soft target in kilobytes
    pub target_kb: f64,
    /// Quality of the initial encode
    pub start_quality: u8,
    /// Lowest quality any attempt may use
    pub floor: u8,
    /// Decrement between attempts
    pub step: u8,
    /// Retries after the initial encode
    pub max_retries: u32,
}

impl SearchParams {
    /// Parameters for `codec` under `config`.
    pub fn from_config(config: &CompressionConfig, codec: Codec) -> Self {
        Self {
            target_kb: config.target_size_kb(),
            start_quality: config.starting_quality(codec),
            floor: config.quality_floor,
            step: config.quality_step,
            max_retries: config.max_retry_attempts,
        }
    }

    /// Whether an original of `size_kb` needs any work.
    pub fn needs_compression(&self, size_kb: f64) -> bool {
        size_kb > self.target_kb
    }

    /// Quality for the attempt after one at `quality`, clamped to the floor.
    fn next_quality(&self, quality: u8) -> u8 {
        quality.saturating_sub(self.step).max(self.floor)
    }
}

/// Result of a finished search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOutcome {
    /// Size of the accepted encode in kilobytes
    pub final_size_kb: f64,
    /// Quality of the accepted encode
    pub final_quality: u8,
    /// Encodes performed, initial included
    pub attempts: u32,
    /// Whether the accepted encode fits the target
    pub target_met: bool,
}

/// Run the search.
///
/// `encode` writes the image at the given quality and returns the measured
/// size in kilobytes. Its first error aborts the search.
///
/// The last step may be smaller than `step`: quality is clamped to `floor`.
///
/// # Example
/// ```
/// use upload_compress::search::{run, SearchParams};
///
/// let params = SearchParams {
///     target_kb: 600.0,
///     start_quality: 85,
///     floor: 60,
///     step: 10,
///     max_retries: 3,
/// };
/// let outcome = run(&params, |quality| Ok(quality as f64 * 8.0)).unwrap();
/// assert_eq!(outcome.final_quality, 75);
/// assert_eq!(outcome.attempts, 2);
/// ```
pub fn run<F>(params: &SearchParams, mut encode: F) -> Result<SearchOutcome>
where
    F: FnMut(u8) -> Result<f64>,
{
    let mut quality = params.start_quality.max(params.floor);
    let mut size_kb = 0.0;
    let mut attempts = 0u32;
    let mut state = SearchState::Initial;

    loop {
        let retries = match state {
            SearchState::Initial => 0,
            SearchState::Retrying(n) => {
                quality = params.next_quality(quality);
                n
            }
            SearchState::Unneeded | SearchState::Done => break,
        };

        size_kb = encode(quality)?;
        attempts += 1;
        debug!(%state, quality, size_kb, target_kb = params.target_kb, "encode attempt");

        state = if size_kb <= params.target_kb
            || retries >= params.max_retries
            || quality <= params.floor
        {
            SearchState::Done
        } else {
            SearchState::Retrying(retries + 1)
        };
    }

    Ok(SearchOutcome {
        final_size_kb: size_kb,
        final_quality: quality,
        attempts,
        target_met: size_kb <= params.target_kb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompressError;
    use proptest::prelude::*;

    fn params(start_quality: u8) -> SearchParams {
        SearchParams {
            target_kb: 600.0,
            start_quality,
            floor: 60,
            step: 10,
            max_retries: 3,
        }
    }

    /// Encoder stub answering from a quality → size table, recording qualities.
    fn table<'a>(sizes: &[(u8, f64)], seen: &'a mut Vec<u8>) -> impl FnMut(u8) -> Result<f64> + 'a {
        let sizes = sizes.to_vec();
        move |quality| {
            seen.push(quality);
            Ok(sizes
                .iter()
                .find(|(q, _)| *q == quality)
                .map(|(_, size)| *size)
                .unwrap_or(10_000.0))
        }
    }

    #[test]
    fn test_initial_encode_meets_target() {
        let mut seen = Vec::new();
        let outcome = run(&params(85), table(&[(85, 550.0)], &mut seen)).unwrap();

        assert_eq!(seen, vec![85]);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.target_met);
    }

    #[test]
    fn test_stops_the_instant_target_is_met() {
        // 900 KB JPEG scaled down: 85 → 700, 75 → 640, 65 → 590
        let mut seen = Vec::new();
        let outcome = run(
            &params(85),
            table(&[(85, 700.0), (75, 640.0), (65, 590.0), (60, 560.0)], &mut seen),
        )
        .unwrap();

        assert_eq!(seen, vec![85, 75, 65]);
        assert_eq!(outcome.final_quality, 65);
        assert_eq!(outcome.final_size_kb, 590.0);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.target_met);
    }

    #[test]
    fn test_soft_target_at_floor() {
        // WebP that stays at 700 KB whatever the quality
        let mut seen = Vec::new();
        let outcome = run(&params(85), |quality| {
            seen.push(quality);
            Ok(700.0)
        })
        .unwrap();

        assert_eq!(seen, vec![85, 75, 65, 60]);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.final_quality, 60);
        assert!(!outcome.target_met);
        assert_eq!(outcome.final_size_kb, 700.0);
    }

    #[test]
    fn test_png_steps_land_on_floor() {
        let mut seen = Vec::new();
        let outcome = run(&params(90), table(&[], &mut seen)).unwrap();

        assert_eq!(seen, vec![90, 80, 70, 60]);
        assert_eq!(outcome.attempts, 4);
    }

    #[test]
    fn test_retry_budget_limits_attempts() {
        let mut p = params(100);
        p.floor = 10;
        p.max_retries = 2;
        let mut seen = Vec::new();
        let outcome = run(&p, table(&[], &mut seen)).unwrap();

        assert_eq!(seen, vec![100, 90, 80]);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_start_at_floor_never_retries() {
        let mut p = params(60);
        p.max_retries = 5;
        let outcome = run(&p, |_| Ok(5_000.0)).unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.final_quality, 60);
    }

    #[test]
    fn test_zero_retries() {
        let mut p = params(85);
        p.max_retries = 0;
        let outcome = run(&p, |_| Ok(5_000.0)).unwrap();
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_encode_error_aborts() {
        let mut calls = 0;
        let err = run(&params(85), |_| {
            calls += 1;
            if calls == 2 {
                Err(CompressError::Config("boom".into()))
            } else {
                Ok(9_000.0)
            }
        })
        .unwrap_err();

        assert!(matches!(err, CompressError::Config(_)));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_needs_compression_boundary() {
        let p = params(85);
        assert!(!p.needs_compression(600.0));
        assert!(p.needs_compression(600.001));
    }

    #[test]
    fn test_from_config() {
        let config = CompressionConfig::default();
        let p = SearchParams::from_config(&config, Codec::Png);
        assert_eq!(p.start_quality, 90);
        assert_eq!(p.floor, 60);
        assert_eq!(p.step, 10);
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.target_kb, 600.0);
    }

    proptest! {
        #[test]
        fn prop_attempts_bounded_and_quality_above_floor(
            start in 1u8..=100,
            floor in 1u8..=100,
            step in 1u8..=50,
            max_retries in 0u32..8,
            sizes in proptest::collection::vec(0.0f64..2_000.0, 1..16),
        ) {
            let p = SearchParams { target_kb: 600.0, start_quality: start, floor, step, max_retries };
            let mut qualities = Vec::new();
            let mut calls = 0usize;
            let outcome = run(&p, |quality| {
                qualities.push(quality);
                let size = sizes[calls % sizes.len()];
                calls += 1;
                Ok(size)
            }).unwrap();

            prop_assert!(outcome.attempts >= 1);
            prop_assert!(outcome.attempts <= max_retries + 1);
            prop_assert!(qualities.iter().all(|q| *q >= floor));
            prop_assert!(qualities.windows(2).all(|w| w[1] < w[0]));
            prop_assert_eq!(outcome.attempts as usize, qualities.len());
        }
    }
}
