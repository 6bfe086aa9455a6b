use std::fmt;
use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Serialize, Deserialize};

/// One wedge of the discount dial.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiscountOption {
    pub value: u32,   // Discount in whole currency units
    pub label: String,
    pub weight: f64,  // 0 keeps the sector on the dial but out of the draw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl DiscountOption {
    pub fn new(value: u32, label: impl Into<String>, weight: f64) -> Self {
        Self {
            value,
            label: label.into(),
            weight,
            color: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn is_selectable(&self) -> bool {
        self.weight > 0.0
    }
}

/// Result of a single spin: the awarded option and the rotation the dial must turn by.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SpinOutcome {
    pub selected: DiscountOption,
    pub rotation_degrees: f64,
}

/// The dial is configured in a way the selector cannot work with.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    EmptyDial,
    NoSelectableOptions,
    InvalidWeight { value: u32 },
    ValueNotOnDial(u32),
    InvalidTurnRange { min: u32, max: u32 },
    WeightOverflow,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDial => write!(f, "Dial has no sectors"),
            Self::NoSelectableOptions => write!(f, "No discount option has a positive weight"),
            Self::InvalidWeight { value } => write!(f, "Option {} has a negative or non-finite weight", value),
            Self::ValueNotOnDial(value) => write!(f, "Discount {} is not part of the dial layout", value),
            Self::InvalidTurnRange { min, max } => write!(f, "Invalid full turn range {}..={}", min, max),
            Self::WeightOverflow => write!(f, "Option weights add up to more than can be represented"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

#[derive(Debug, Clone, PartialEq)]
pub enum WheelError {
    Configuration(ConfigurationError),
    AlreadySpun,
    NotSpinning,
}

impl fmt::Display for WheelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(e) => write!(f, "Configuration error: {}", e),
            Self::AlreadySpun => write!(f, "The wheel has already been spun in this session"),
            Self::NotSpinning => write!(f, "No spin is in progress"),
        }
    }
}

impl std::error::Error for WheelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for WheelError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

// Constants for frontend animation
pub const SPIN_DURATION_MS: u64 = 4500;  // Presentation delay before the outcome is revealed
pub const MIN_SPINS: u32 = 5;            // Minimum number of full rotations
pub const MAX_SPINS: u32 = 8;            // Maximum number of full rotations

/// The promotional dial in its fixed layout order. The last sector is decorative.
pub fn default_segments() -> Vec<DiscountOption> {
    vec![
        DiscountOption::new(5, "₹5 OFF", 25.0).with_color("#FF6B6B"),
        DiscountOption::new(10, "₹10 OFF", 25.0).with_color("#4ECDC4"),
        DiscountOption::new(25, "₹25 OFF", 20.0).with_color("#45B7D1"),
        DiscountOption::new(30, "₹30 OFF", 15.0).with_color("#96CEB4"),
        DiscountOption::new(40, "₹40 OFF", 10.0).with_color("#FFEAA7"),
        DiscountOption::new(50, "₹50 OFF", 5.0).with_color("#DDA0DD"),
        DiscountOption::new(100, "₹100 OFF", 0.0).with_color("#FFB347"),
    ]
}

/// Weighted draw over the options with a positive weight.
///
/// Walks the candidates subtracting each weight from a uniform draw in
/// `[0, total)`; the first candidate that takes the remainder to zero or
/// below wins.
pub fn select_reward<'a, R: Rng + ?Sized>(
    options: &'a [DiscountOption],
    rng: &mut R,
) -> Result<&'a DiscountOption, ConfigurationError> {
    if let Some(bad) = options.iter().find(|o| !o.weight.is_finite() || o.weight < 0.0) {
        return Err(ConfigurationError::InvalidWeight { value: bad.value });
    }

    let candidates: Vec<&DiscountOption> = options.iter().filter(|o| o.is_selectable()).collect();
    let first = *candidates.first().ok_or(ConfigurationError::NoSelectableOptions)?;
    let total_weight = total_weight(&candidates)?;

    let mut remainder = rng.gen_range(0.0..total_weight);
    for candidate in &candidates {
        remainder -= candidate.weight;
        if remainder <= 0.0 {
            return Ok(candidate);
        }
    }

    // Only reachable through floating point drift
    Ok(first)
}

fn total_weight(candidates: &[&DiscountOption]) -> Result<f64, ConfigurationError> {
    let total: f64 = candidates.iter().map(|o| o.weight).sum();
    if !total.is_finite() {
        return Err(ConfigurationError::WeightOverflow);
    }
    if total <= 0.0 {
        return Err(ConfigurationError::NoSelectableOptions);
    }
    Ok(total)
}

/// Center of sector `index` measured clockwise from the pointer, in degrees.
pub fn sector_center_angle(index: usize, sectors: usize) -> f64 {
    let sector_angle = 360.0 / sectors as f64;
    index as f64 * sector_angle + sector_angle / 2.0
}

/// Index of the sector left under the pointer once the dial has turned by
/// `rotation_degrees`. `None` for a dial without sectors.
pub fn resting_sector(rotation_degrees: f64, sectors: usize) -> Option<usize> {
    if sectors == 0 {
        return None;
    }
    let sector_angle = 360.0 / sectors as f64;
    let under_pointer = (360.0 - rotation_degrees.rem_euclid(360.0)).rem_euclid(360.0);
    Some(((under_pointer / sector_angle) as usize).min(sectors - 1))
}

/// Rotation that lands the sector holding `selected_value` under the pointer
/// after a random number of whole turns taken from `full_turns`.
pub fn compute_rotation<R: Rng + ?Sized>(
    selected_value: u32,
    dial_values: &[u32],
    full_turns: RangeInclusive<u32>,
    rng: &mut R,
) -> Result<f64, ConfigurationError> {
    if dial_values.is_empty() {
        return Err(ConfigurationError::EmptyDial);
    }
    let index = dial_values
        .iter()
        .position(|&v| v == selected_value)
        .ok_or(ConfigurationError::ValueNotOnDial(selected_value))?;
    if full_turns.is_empty() {
        return Err(ConfigurationError::InvalidTurnRange {
            min: *full_turns.start(),
            max: *full_turns.end(),
        });
    }

    let center_angle = sector_center_angle(index, dial_values.len());
    let turns = rng.gen_range(full_turns);

    Ok(f64::from(turns) * 360.0 + (360.0 - center_angle))
}

/// Dial layout plus the animation parameters a spin is computed with.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WheelConfig {
    pub segments: Vec<DiscountOption>,
    pub min_full_turns: u32,
    pub max_full_turns: u32,
    pub presentation_delay_ms: u64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            segments: default_segments(),
            min_full_turns: MIN_SPINS,
            max_full_turns: MAX_SPINS,
            presentation_delay_ms: SPIN_DURATION_MS,
        }
    }
}

impl WheelConfig {
    pub fn dial_values(&self) -> Vec<u32> {
        self.segments.iter().map(|s| s.value).collect()
    }

    pub fn full_turns(&self) -> RangeInclusive<u32> {
        self.min_full_turns..=self.max_full_turns
    }

    /// Checks everything a spin relies on so misconfiguration surfaces at startup.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.segments.is_empty() {
            return Err(ConfigurationError::EmptyDial);
        }
        if let Some(bad) = self.segments.iter().find(|o| !o.weight.is_finite() || o.weight < 0.0) {
            return Err(ConfigurationError::InvalidWeight { value: bad.value });
        }
        let candidates: Vec<&DiscountOption> = self.segments.iter().filter(|o| o.is_selectable()).collect();
        total_weight(&candidates)?;
        if self.min_full_turns > self.max_full_turns {
            return Err(ConfigurationError::InvalidTurnRange {
                min: self.min_full_turns,
                max: self.max_full_turns,
            });
        }
        Ok(())
    }

    pub fn spin<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SpinOutcome, ConfigurationError> {
        let selected = select_reward(&self.segments, rng)?.clone();
        let rotation_degrees = compute_rotation(selected.value, &self.dial_values(), self.full_turns(), rng)?;
        Ok(SpinOutcome { selected, rotation_degrees })
    }
}

/// Interaction phases of one visitor's spin. There is no way back to `Idle`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "phase", content = "outcome", rename_all = "snake_case")]
pub enum SpinPhase {
    Idle,
    Spinning(SpinOutcome),
    Resolved(SpinOutcome),
}

/// Per-visitor state: whether the wheel was spun, what it landed on and the
/// last transaction issued for it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpinSession {
    pub phase: SpinPhase,
    pub transaction_id: Option<String>,
}

impl Default for SpinSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinSession {
    pub fn new() -> Self {
        Self {
            phase: SpinPhase::Idle,
            transaction_id: None,
        }
    }

    pub fn has_spun(&self) -> bool {
        !matches!(self.phase, SpinPhase::Idle)
    }

    pub fn start_spin<R: Rng + ?Sized>(
        &mut self,
        config: &WheelConfig,
        rng: &mut R,
    ) -> Result<SpinOutcome, WheelError> {
        if self.has_spun() {
            return Err(WheelError::AlreadySpun);
        }

        // Configuration errors leave the session untouched
        let outcome = config.spin(rng)?;
        log::debug!(
            "Spin landed on {} after {:.1} degrees",
            outcome.selected.value,
            outcome.rotation_degrees
        );
        self.phase = SpinPhase::Spinning(outcome.clone());
        Ok(outcome)
    }

    /// Reveals the pending outcome. Fires once; later calls fail.
    pub fn resolve(&mut self) -> Result<SpinOutcome, WheelError> {
        match &self.phase {
            SpinPhase::Spinning(outcome) => {
                let outcome = outcome.clone();
                self.phase = SpinPhase::Resolved(outcome.clone());
                Ok(outcome)
            }
            _ => Err(WheelError::NotSpinning),
        }
    }

    pub fn resolved_outcome(&self) -> Option<&SpinOutcome> {
        match &self.phase {
            SpinPhase::Resolved(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn selected_discount(&self) -> Option<u32> {
        self.resolved_outcome().map(|o| o.selected.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DIAL: [u32; 7] = [5, 10, 25, 30, 40, 50, 100];

    fn landing_center(rotation: f64) -> f64 {
        (360.0 - rotation.rem_euclid(360.0)).rem_euclid(360.0)
    }

    #[test]
    fn test_selection_never_returns_zero_weight() {
        let segments = default_segments();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let picked = select_reward(&segments, &mut rng).unwrap();
            assert!(picked.weight > 0.0);
            assert_ne!(picked.value, 100);
        }
    }

    #[test]
    fn test_selection_frequencies_follow_weights() {
        let segments = default_segments();
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 200_000;
        let mut counts = std::collections::HashMap::new();
        for _ in 0..draws {
            let picked = select_reward(&segments, &mut rng).unwrap();
            *counts.entry(picked.value).or_insert(0u32) += 1;
        }

        for segment in &segments {
            let observed = f64::from(*counts.get(&segment.value).unwrap_or(&0)) / draws as f64;
            let expected = segment.weight / 100.0;
            assert!(
                (observed - expected).abs() < 0.01,
                "value {} observed {} expected {}",
                segment.value,
                observed,
                expected
            );
        }
        assert!(!counts.contains_key(&100));
    }

    #[test]
    fn test_selection_rejects_unusable_sets() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            select_reward(&[], &mut rng),
            Err(ConfigurationError::NoSelectableOptions)
        );

        let all_zero = vec![DiscountOption::new(5, "a", 0.0), DiscountOption::new(10, "b", 0.0)];
        assert_eq!(
            select_reward(&all_zero, &mut rng),
            Err(ConfigurationError::NoSelectableOptions)
        );

        let negative = vec![DiscountOption::new(5, "a", 1.0), DiscountOption::new(10, "b", -1.0)];
        assert_eq!(
            select_reward(&negative, &mut rng),
            Err(ConfigurationError::InvalidWeight { value: 10 })
        );
    }

    #[test]
    fn test_overflowing_weights_are_rejected() {
        let huge = vec![
            DiscountOption::new(5, "a", f64::MAX),
            DiscountOption::new(10, "b", f64::MAX),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_reward(&huge, &mut rng), Err(ConfigurationError::WeightOverflow));

        let config = WheelConfig {
            segments: huge,
            ..WheelConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigurationError::WeightOverflow));
        assert_eq!(config.spin(&mut rng), Err(ConfigurationError::WeightOverflow));
    }

    #[test]
    fn test_resting_sector_without_sectors() {
        assert_eq!(resting_sector(180.0, 0), None);
        assert_eq!(resting_sector(180.0, 4), Some(2));
    }

    #[test]
    fn test_single_selectable_option_always_wins() {
        let segments = vec![
            DiscountOption::new(5, "a", 0.0),
            DiscountOption::new(10, "b", 3.0),
            DiscountOption::new(25, "c", 0.0),
        ];
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(select_reward(&segments, &mut rng).unwrap().value, 10);
        }
    }

    #[test]
    fn test_rotation_lands_on_every_sector() {
        let mut rng = StdRng::seed_from_u64(11);
        for (index, &value) in DIAL.iter().enumerate() {
            for _ in 0..20 {
                let rotation = compute_rotation(value, &DIAL, 5..=8, &mut rng).unwrap();
                let expected = sector_center_angle(index, DIAL.len());
                assert!((landing_center(rotation) - expected).abs() < 1e-9);
                assert_eq!(resting_sector(rotation, DIAL.len()), Some(index));
                assert!(rotation >= 5.0 * 360.0);
                assert!(rotation < 9.0 * 360.0);
            }
        }
    }

    #[test]
    fn test_rotation_for_thirty_rests_at_one_eighty() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            let rotation = compute_rotation(30, &DIAL, 5..=8, &mut rng).unwrap();
            assert!((rotation.rem_euclid(360.0) - 180.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rotation_for_value_off_dial_fails() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(
            compute_rotation(15, &DIAL, 5..=8, &mut rng),
            Err(ConfigurationError::ValueNotOnDial(15))
        );
        assert_eq!(
            compute_rotation(5, &[], 5..=8, &mut rng),
            Err(ConfigurationError::EmptyDial)
        );
    }

    #[test]
    fn test_rotation_uses_first_matching_sector() {
        let dial = [10, 20, 10, 40];
        let mut rng = StdRng::seed_from_u64(8);
        let rotation = compute_rotation(10, &dial, 5..=5, &mut rng).unwrap();
        assert!((rotation - (5.0 * 360.0 + 360.0 - 45.0)).abs() < 1e-9);
    }

    #[test]
    fn test_seeded_spins_are_repeatable() {
        let config = WheelConfig::default();
        let mut first = StdRng::seed_from_u64(2024);
        let mut second = StdRng::seed_from_u64(2024);
        for _ in 0..25 {
            assert_eq!(config.spin(&mut first).unwrap(), config.spin(&mut second).unwrap());
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(WheelConfig::default().validate().is_ok());

        let mut config = WheelConfig::default();
        config.min_full_turns = 9;
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::InvalidTurnRange { min: 9, max: 8 })
        );

        let mut config = WheelConfig::default();
        config.segments.iter_mut().for_each(|s| s.weight = 0.0);
        assert_eq!(config.validate(), Err(ConfigurationError::NoSelectableOptions));
    }

    #[test]
    fn test_session_spins_once() {
        let config = WheelConfig::default();
        let mut rng = StdRng::seed_from_u64(17);
        let mut session = SpinSession::new();
        assert!(!session.has_spun());

        let outcome = session.start_spin(&config, &mut rng).unwrap();
        assert!(session.has_spun());
        assert_eq!(session.selected_discount(), None);
        assert_eq!(session.start_spin(&config, &mut rng), Err(WheelError::AlreadySpun));

        assert_eq!(session.resolve().unwrap(), outcome);
        assert_eq!(session.selected_discount(), Some(outcome.selected.value));
        assert_eq!(session.resolve(), Err(WheelError::NotSpinning));
        assert_eq!(session.start_spin(&config, &mut rng), Err(WheelError::AlreadySpun));
    }

    #[test]
    fn test_session_stays_idle_on_bad_config() {
        let mut config = WheelConfig::default();
        config.segments.iter_mut().for_each(|s| s.weight = 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        let mut session = SpinSession::new();

        assert_eq!(
            session.start_spin(&config, &mut rng),
            Err(WheelError::Configuration(ConfigurationError::NoSelectableOptions))
        );
        assert_eq!(session.phase, SpinPhase::Idle);
    }
}
