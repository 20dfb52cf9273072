//! crates/lesson_review_core/src/scheduler.rs
//!
//! SM-2 spaced repetition. The transition is a pure function of the card's
//! scheduling state and a quality score; deriving that score from a learner's
//! response is a separate, replaceable [`QualityModel`].

use crate::domain::{QuestionResponse, ReviewCard};
use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;
use uuid::Uuid;

/// Minimum ease factor allowed by SM-2.
pub const MIN_EASE: f64 = 1.3;
/// Ease factor assigned to a card that has never been reviewed.
pub const INITIAL_EASE: f64 = 2.5;

//=========================================================================================
// Quality
//=========================================================================================

/// Recall quality in `[0, 5]`. Values below 3 are lapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const BLACKOUT: Quality = Quality(0);
    pub const INCORRECT: Quality = Quality(1);
    pub const PASS: Quality = Quality(3);
    pub const PERFECT: Quality = Quality(5);

    /// Returns `None` for values above 5.
    pub fn new(value: u8) -> Option<Self> {
        (value <= 5).then_some(Quality(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_lapse(self) -> bool {
        self < Quality::PASS
    }
}

/// Turns a learner response into a quality score.
pub trait QualityModel: Send + Sync {
    fn quality(&self, response: &QuestionResponse) -> Quality;
}

/// Faster correct answers score higher; wrong answers score 1, and skipped
/// questions score 0. Correct answers slower than `good_within` score 3.
#[derive(Debug, Clone)]
pub struct LatencyQualityModel {
    pub perfect_within: StdDuration,
    pub good_within: StdDuration,
}

impl Default for LatencyQualityModel {
    fn default() -> Self {
        Self {
            perfect_within: StdDuration::from_secs(10),
            good_within: StdDuration::from_secs(20),
        }
    }
}

impl QualityModel for LatencyQualityModel {
    fn quality(&self, response: &QuestionResponse) -> Quality {
        if response.selected_option.is_none() {
            return Quality::BLACKOUT;
        }
        if !response.correct {
            return Quality::INCORRECT;
        }
        if response.latency <= self.perfect_within {
            Quality::PERFECT
        } else if response.latency <= self.good_within {
            Quality(4)
        } else {
            Quality::PASS
        }
    }
}

//=========================================================================================
// SM-2 Transition
//=========================================================================================

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_interval_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_interval_days: 365,
        }
    }
}

/// The part of a card the SM-2 update reads and writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulingState {
    pub ease_factor: f64,
    pub repetitions: u32,
    pub interval_days: u32,
}

impl SchedulingState {
    /// State of a card before its first review.
    pub fn initial() -> Self {
        Self {
            ease_factor: INITIAL_EASE,
            repetitions: 0,
            interval_days: 0,
        }
    }

    pub fn of(card: &ReviewCard) -> Self {
        Self {
            ease_factor: card.ease_factor,
            repetitions: card.repetitions,
            interval_days: card.interval_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub state: SchedulingState,
    pub next_review_at: DateTime<Utc>,
}

/// Applies one SM-2 step.
///
/// A lapse resets repetitions and sets the interval to one day, leaving ease
/// untouched. A pass updates ease (floored at 1.3) and grows the interval
/// 1 → 6 → previous × ease. Intervals are clamped to `[1, max_interval_days]`.
pub fn schedule(
    state: SchedulingState,
    quality: Quality,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
) -> Scheduled {
    let ceiling = config.max_interval_days.max(1);

    let next = if quality.is_lapse() {
        SchedulingState {
            ease_factor: state.ease_factor.max(MIN_EASE),
            repetitions: 0,
            interval_days: 1,
        }
    } else {
        let miss = 5.0 - f64::from(quality.value());
        let ease = (state.ease_factor + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE);
        let repetitions = state.repetitions + 1;
        let interval = match repetitions {
            1 => 1,
            2 => 6,
            _ => (f64::from(state.interval_days) * ease).round() as u32,
        };
        SchedulingState {
            ease_factor: ease,
            repetitions,
            interval_days: interval.clamp(1, ceiling),
        }
    };

    Scheduled {
        state: next,
        next_review_at: now + Duration::days(i64::from(next.interval_days)),
    }
}

/// Produces the updated card for a response, creating it if this is the first review.
pub fn apply_to_card(
    existing: Option<&ReviewCard>,
    owner_id: Uuid,
    question_id: Uuid,
    quality: Quality,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
) -> ReviewCard {
    let state = existing.map_or_else(SchedulingState::initial, SchedulingState::of);
    let scheduled = schedule(state, quality, now, config);

    ReviewCard {
        id: existing.map_or_else(Uuid::new_v4, |card| card.id),
        owner_id,
        question_id,
        ease_factor: scheduled.state.ease_factor,
        repetitions: scheduled.state.repetitions,
        interval_days: scheduled.state.interval_days,
        last_reviewed_at: now,
        next_review_at: scheduled.next_review_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(value: u8) -> Quality {
        Quality::new(value).unwrap()
    }

    fn run(qualities: &[u8]) -> Vec<SchedulingState> {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let mut state = SchedulingState::initial();
        qualities
            .iter()
            .map(|&value| {
                state = schedule(state, q(value), now, &config).state;
                state
            })
            .collect()
    }

    /// Deterministic pseudo-random quality stream.
    fn qualities(seed: u64, len: usize) -> Vec<u8> {
        let mut x = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                (x % 6) as u8
            })
            .collect()
    }

    #[test]
    fn quality_rejects_values_above_five() {
        assert!(Quality::new(6).is_none());
        assert_eq!(Quality::new(5), Some(Quality::PERFECT));
    }

    #[test]
    fn five_five_four_scenario() {
        let states = run(&[5, 5, 4]);
        let intervals: Vec<u32> = states.iter().map(|s| s.interval_days).collect();
        assert_eq!(intervals, vec![1, 6, 16]);
        assert!((states[2].ease_factor - 2.7).abs() < 1e-9);
    }

    #[test]
    fn lapse_resets_regardless_of_prior_state() {
        let config = SchedulerConfig::default();
        let mature = SchedulingState {
            ease_factor: 2.9,
            repetitions: 7,
            interval_days: 120,
        };
        for value in 0..3 {
            let next = schedule(mature, q(value), Utc::now(), &config).state;
            assert_eq!(next.repetitions, 0);
            assert_eq!(next.interval_days, 1);
            assert_eq!(next.ease_factor, 2.9);
        }
    }

    #[test]
    fn ease_never_drops_below_floor() {
        for seed in 0..50 {
            for state in run(&qualities(seed, 60)) {
                assert!(state.ease_factor >= MIN_EASE, "seed {} gave {:?}", seed, state);
                assert!(state.interval_days >= 1);
                assert!(state.interval_days <= 365);
            }
        }
    }

    #[test]
    fn intervals_never_shrink_across_consecutive_passes() {
        for value in 3..=5 {
            let states = run(&[value; 12]);
            for pair in states.windows(2) {
                assert!(pair[1].interval_days >= pair[0].interval_days, "{:?}", pair);
            }
        }
        for seed in 0..50 {
            let passing: Vec<u8> = qualities(seed, 20).into_iter().map(|v| 3 + v % 3).collect();
            let states = run(&passing);
            for pair in states.windows(2) {
                assert!(pair[1].interval_days >= pair[0].interval_days);
            }
        }
    }

    #[test]
    fn interval_is_capped() {
        let config = SchedulerConfig {
            max_interval_days: 30,
        };
        let state = SchedulingState {
            ease_factor: 2.5,
            repetitions: 5,
            interval_days: 25,
        };
        let next = schedule(state, q(5), Utc::now(), &config).state;
        assert_eq!(next.interval_days, 30);
    }

    #[test]
    fn next_review_is_last_review_plus_interval() {
        let now = Utc::now();
        let first = apply_to_card(None, Uuid::new_v4(), Uuid::new_v4(), q(4), now, &SchedulerConfig::default());
        assert_eq!(first.next_review_at, first.expected_next_review());
        assert_eq!(first.interval_days, 1);

        let later = now + Duration::days(1);
        let second = apply_to_card(Some(&first), first.owner_id, first.question_id, q(4), later, &SchedulerConfig::default());
        assert_eq!(second.id, first.id);
        assert_eq!(second.interval_days, 6);
        assert_eq!(second.next_review_at, later + Duration::days(6));
    }

    #[test]
    fn latency_model_maps_speed_to_quality() {
        let model = LatencyQualityModel::default();
        let response = |selected: Option<usize>, correct, secs| QuestionResponse {
            question_id: Uuid::new_v4(),
            selected_option: selected,
            correct,
            latency: StdDuration::from_secs(secs),
        };
        assert_eq!(model.quality(&response(Some(0), true, 4)).value(), 5);
        assert_eq!(model.quality(&response(Some(0), true, 10)).value(), 5);
        assert_eq!(model.quality(&response(Some(0), true, 15)).value(), 4);
        assert_eq!(model.quality(&response(Some(0), true, 30)).value(), 3);
        assert_eq!(model.quality(&response(Some(0), true, 300)).value(), 3);
        assert_eq!(model.quality(&response(Some(1), false, 3)).value(), 1);
        assert_eq!(model.quality(&response(None, false, 60)).value(), 0);
    }
}
