//! Deterministic triage scoring.
//!
//! Converts a set of vital-sign readings and the patient's own description
//! of their symptoms into a numeric acuity score, a coarse priority level
//! and an audit trail of the rules that fired. Scoring is a pure function:
//! identical input always produces an identical result, and no I/O happens
//! here.
//!
//! The score accumulates points across five independent factors. Each factor
//! contributes at most once, using only its single highest matching band:
//! temperature, heart rate, blood pressure, self-reported pain, and symptom
//! keywords.

use serde::{Deserialize, Serialize};

// Band thresholds. Temperature deviates from 98.6°F, heart rate from the
// 60-100 BPM normal range, blood pressure from 120/80.
const TEMP_CRITICAL_HIGH_F: f64 = 103.0;
const TEMP_CRITICAL_LOW_F: f64 = 95.0;
const TEMP_SERIOUS_HIGH_F: f64 = 101.5;
const TEMP_SERIOUS_LOW_F: f64 = 96.0;
const TEMP_MODERATE_HIGH_F: f64 = 100.0;
const TEMP_MODERATE_LOW_F: f64 = 97.0;

const HEART_RATE_CRITICAL_HIGH: u32 = 140;
const HEART_RATE_CRITICAL_LOW: u32 = 40;
const HEART_RATE_SERIOUS_HIGH: u32 = 120;
const HEART_RATE_SERIOUS_LOW: u32 = 50;
const HEART_RATE_MODERATE_HIGH: u32 = 100;
const HEART_RATE_MODERATE_LOW: u32 = 60;

const NORMAL_SYSTOLIC: u32 = 120;
const NORMAL_DIASTOLIC: u32 = 80;
const BP_CRITICAL_SYSTOLIC_DELTA: u32 = 40;
const BP_CRITICAL_DIASTOLIC_DELTA: u32 = 30;
const BP_SERIOUS_SYSTOLIC_DELTA: u32 = 25;
const BP_SERIOUS_DIASTOLIC_DELTA: u32 = 20;
const BP_MODERATE_DELTA: u32 = 10;

const PAIN_SEVERE: u8 = 8;
const PAIN_MODERATE: u8 = 5;
const PAIN_MILD: u8 = 1;

const TEMP_CRITICAL_POINTS: u32 = 30;
const TEMP_SERIOUS_POINTS: u32 = 20;
const TEMP_MODERATE_POINTS: u32 = 10;
const HEART_RATE_CRITICAL_POINTS: u32 = 25;
const HEART_RATE_SERIOUS_POINTS: u32 = 15;
const HEART_RATE_MODERATE_POINTS: u32 = 5;
// The critical band awards the systolic constant whether the systolic or the
// diastolic delta triggered it. Kept as-is; see the asymmetry note in
// DESIGN.md before changing.
const BP_CRITICAL_POINTS: u32 = 40;
const BP_SERIOUS_POINTS: u32 = 25;
const BP_MODERATE_POINTS: u32 = 10;
const PAIN_SEVERE_POINTS: u32 = 20;
const PAIN_MODERATE_POINTS: u32 = 10;
const PAIN_MILD_POINTS: u32 = 3;
const SYMPTOM_CRITICAL_POINTS: u32 = 40;
const SYMPTOM_SERIOUS_POINTS: u32 = 25;

const HIGH_THRESHOLD: u32 = 60;
const MEDIUM_THRESHOLD: u32 = 30;

/// Symptom phrases that indicate a potentially life-threatening presentation.
const CRITICAL_KEYWORDS: &[&str] = &[
    "chest pain",
    "difficulty breathing",
    "shortness of breath",
    "severe bleeding",
    "unconscious",
    "unresponsive",
    "stroke",
    "heart attack",
];

/// Symptom phrases that warrant prompt attention but are not immediately
/// life-threatening. Only consulted when no critical keyword matched.
const SERIOUS_KEYWORDS: &[&str] = &[
    "broken bone",
    "fracture",
    "seizure",
    "severe pain",
    "head injury",
    "deep cut",
    "high fever",
];

/// Vital-sign readings captured at check-in.
///
/// Every measurement is optional; a reading that was not taken simply
/// contributes no points. Range validation of present values happens
/// upstream at the intake boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    /// Body temperature in degrees Fahrenheit.
    pub temperature_f: Option<f64>,
    /// Heart rate in beats per minute.
    pub heart_rate_bpm: Option<u32>,
    /// Systolic blood pressure in mmHg.
    pub systolic_mmhg: Option<u32>,
    /// Diastolic blood pressure in mmHg.
    pub diastolic_mmhg: Option<u32>,
    /// Self-reported pain on the 0-10 scale.
    pub pain_level: Option<u8>,
}

/// Coarse priority bucket derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageLevel {
    High,
    Medium,
    Low,
}

impl TriageLevel {
    /// Wire/storage representation.
    pub fn as_wire(self) -> &'static str {
        match self {
            TriageLevel::High => "high",
            TriageLevel::Medium => "medium",
            TriageLevel::Low => "low",
        }
    }

    /// Parses the wire representation.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "high" => Some(TriageLevel::High),
            "medium" => Some(TriageLevel::Medium),
            "low" => Some(TriageLevel::Low),
            _ => None,
        }
    }

    fn from_score(score: u32) -> Self {
        if score >= HIGH_THRESHOLD {
            TriageLevel::High
        } else if score >= MEDIUM_THRESHOLD {
            TriageLevel::Medium
        } else {
            TriageLevel::Low
        }
    }
}

impl std::fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// Outcome of scoring one check-in.
///
/// `factors` lists one human-readable line per rule that contributed points,
/// in rule-evaluation order, for audit and front-desk display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageResult {
    pub score: u32,
    pub level: TriageLevel,
    pub factors: Vec<String>,
}

/// Triage scoring operations.
///
/// Zero-sized type used for namespacing; all methods are associated
/// functions.
pub struct TriageScorer;

impl TriageScorer {
    /// Scores one set of vitals plus the symptom text.
    ///
    /// Pure and deterministic: no I/O, no clock access, and identical input
    /// yields an identical result.
    pub fn score(vitals: &Vitals, symptom_text: &str) -> TriageResult {
        let mut score = 0u32;
        let mut factors = Vec::new();

        if let Some((points, factor)) = temperature_band(vitals.temperature_f) {
            score += points;
            factors.push(factor);
        }
        if let Some((points, factor)) = heart_rate_band(vitals.heart_rate_bpm) {
            score += points;
            factors.push(factor);
        }
        if let Some((points, factor)) =
            blood_pressure_band(vitals.systolic_mmhg, vitals.diastolic_mmhg)
        {
            score += points;
            factors.push(factor);
        }
        if let Some((points, factor)) = pain_band(vitals.pain_level) {
            score += points;
            factors.push(factor);
        }
        if let Some((points, factor)) = symptom_keywords(symptom_text) {
            score += points;
            factors.push(factor);
        }

        TriageResult {
            score,
            level: TriageLevel::from_score(score),
            factors,
        }
    }
}

fn temperature_band(temperature: Option<f64>) -> Option<(u32, String)> {
    let t = temperature?;
    if t >= TEMP_CRITICAL_HIGH_F || t <= TEMP_CRITICAL_LOW_F {
        Some((
            TEMP_CRITICAL_POINTS,
            format!("Critically abnormal temperature ({t:.1}\u{b0}F)"),
        ))
    } else if t >= TEMP_SERIOUS_HIGH_F || t <= TEMP_SERIOUS_LOW_F {
        Some((
            TEMP_SERIOUS_POINTS,
            format!("Seriously abnormal temperature ({t:.1}\u{b0}F)"),
        ))
    } else if t >= TEMP_MODERATE_HIGH_F || t <= TEMP_MODERATE_LOW_F {
        Some((
            TEMP_MODERATE_POINTS,
            format!("Moderately abnormal temperature ({t:.1}\u{b0}F)"),
        ))
    } else {
        None
    }
}

fn heart_rate_band(heart_rate: Option<u32>) -> Option<(u32, String)> {
    let hr = heart_rate?;
    if hr >= HEART_RATE_CRITICAL_HIGH || hr <= HEART_RATE_CRITICAL_LOW {
        Some((
            HEART_RATE_CRITICAL_POINTS,
            format!("Critically abnormal heart rate ({hr} BPM)"),
        ))
    } else if hr >= HEART_RATE_SERIOUS_HIGH || hr <= HEART_RATE_SERIOUS_LOW {
        Some((
            HEART_RATE_SERIOUS_POINTS,
            format!("Seriously abnormal heart rate ({hr} BPM)"),
        ))
    } else if hr > HEART_RATE_MODERATE_HIGH || hr < HEART_RATE_MODERATE_LOW {
        Some((
            HEART_RATE_MODERATE_POINTS,
            format!("Heart rate outside normal range ({hr} BPM)"),
        ))
    } else {
        None
    }
}

fn blood_pressure_band(systolic: Option<u32>, diastolic: Option<u32>) -> Option<(u32, String)> {
    if systolic.is_none() && diastolic.is_none() {
        return None;
    }

    let sys_delta = systolic.map(|s| s.abs_diff(NORMAL_SYSTOLIC)).unwrap_or(0);
    let dia_delta = diastolic.map(|d| d.abs_diff(NORMAL_DIASTOLIC)).unwrap_or(0);
    let reading = describe_bp(systolic, diastolic);

    if sys_delta >= BP_CRITICAL_SYSTOLIC_DELTA || dia_delta >= BP_CRITICAL_DIASTOLIC_DELTA {
        Some((
            BP_CRITICAL_POINTS,
            format!("Critically abnormal blood pressure ({reading})"),
        ))
    } else if sys_delta >= BP_SERIOUS_SYSTOLIC_DELTA || dia_delta >= BP_SERIOUS_DIASTOLIC_DELTA {
        Some((
            BP_SERIOUS_POINTS,
            format!("Seriously abnormal blood pressure ({reading})"),
        ))
    } else if sys_delta >= BP_MODERATE_DELTA || dia_delta >= BP_MODERATE_DELTA {
        Some((
            BP_MODERATE_POINTS,
            format!("Moderately abnormal blood pressure ({reading})"),
        ))
    } else {
        None
    }
}

fn describe_bp(systolic: Option<u32>, diastolic: Option<u32>) -> String {
    match (systolic, diastolic) {
        (Some(s), Some(d)) => format!("{s}/{d}"),
        (Some(s), None) => format!("{s}/-"),
        (None, Some(d)) => format!("-/{d}"),
        (None, None) => "-/-".to_string(),
    }
}

fn pain_band(pain: Option<u8>) -> Option<(u32, String)> {
    let p = pain?;
    if p >= PAIN_SEVERE {
        Some((PAIN_SEVERE_POINTS, format!("Severe pain reported ({p}/10)")))
    } else if p >= PAIN_MODERATE {
        Some((
            PAIN_MODERATE_POINTS,
            format!("Moderate pain reported ({p}/10)"),
        ))
    } else if p >= PAIN_MILD {
        Some((PAIN_MILD_POINTS, format!("Mild pain reported ({p}/10)")))
    } else {
        None
    }
}

/// Case-insensitive substring match against the two keyword sets. The
/// critical set is checked first and wins outright; the serious set is only
/// consulted when nothing critical matched, so a symptom never double-counts.
fn symptom_keywords(symptom_text: &str) -> Option<(u32, String)> {
    let lowered = symptom_text.to_lowercase();

    if let Some(keyword) = CRITICAL_KEYWORDS.iter().find(|k| lowered.contains(*k)) {
        return Some((
            SYMPTOM_CRITICAL_POINTS,
            format!("Critical symptom reported: {keyword}"),
        ));
    }
    if let Some(keyword) = SERIOUS_KEYWORDS.iter().find(|k| lowered.contains(*k)) {
        return Some((
            SYMPTOM_SERIOUS_POINTS,
            format!("Serious symptom reported: {keyword}"),
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_vitals(temp: f64, hr: u32, sys: u32, dia: u32, pain: u8) -> Vitals {
        Vitals {
            temperature_f: Some(temp),
            heart_rate_bpm: Some(hr),
            systolic_mmhg: Some(sys),
            diastolic_mmhg: Some(dia),
            pain_level: Some(pain),
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let vitals = full_vitals(101.8, 115, 150, 95, 6);
        let first = TriageScorer::score(&vitals, "severe pain in left arm");
        let second = TriageScorer::score(&vitals, "severe pain in left arm");
        assert_eq!(first, second);
    }

    #[test]
    fn critical_presentation_scores_high() {
        let vitals = full_vitals(104.5, 130, 180, 110, 9);
        let result = TriageScorer::score(&vitals, "chest pain and difficulty breathing");

        assert_eq!(result.level, TriageLevel::High);
        assert!(result.score >= 60, "score was {}", result.score);
        // temp 30 + hr 15 + bp 40 + pain 20 + symptoms 40
        assert_eq!(result.score, 145);
        assert_eq!(result.factors.len(), 5);
    }

    #[test]
    fn routine_presentation_scores_low() {
        let vitals = full_vitals(98.6, 72, 120, 80, 2);
        let result = TriageScorer::score(&vitals, "routine check-up");

        assert_eq!(result.level, TriageLevel::Low);
        assert!(result.score < 30, "score was {}", result.score);
    }

    #[test]
    fn missing_vitals_contribute_nothing() {
        let result = TriageScorer::score(&Vitals::default(), "feeling a bit tired");
        assert_eq!(result.score, 0);
        assert_eq!(result.level, TriageLevel::Low);
        assert!(result.factors.is_empty());
    }

    #[test]
    fn only_highest_temperature_band_applies() {
        // 104.0 crosses the moderate, serious and critical thresholds; only
        // the critical band may contribute.
        let vitals = Vitals {
            temperature_f: Some(104.0),
            ..Vitals::default()
        };
        let result = TriageScorer::score(&vitals, "");
        assert_eq!(result.score, 30);
        assert_eq!(result.factors.len(), 1);
    }

    #[test]
    fn low_temperature_bands_mirror_high_ones() {
        let freezing = Vitals {
            temperature_f: Some(94.5),
            ..Vitals::default()
        };
        assert_eq!(TriageScorer::score(&freezing, "").score, 30);

        let cool = Vitals {
            temperature_f: Some(96.5),
            ..Vitals::default()
        };
        assert_eq!(TriageScorer::score(&cool, "").score, 10);
    }

    #[test]
    fn diastolic_delta_alone_can_trigger_the_critical_band() {
        // Systolic delta of 5 is benign; diastolic delta of 35 crosses the
        // critical threshold and must award the full critical points.
        let vitals = Vitals {
            systolic_mmhg: Some(125),
            diastolic_mmhg: Some(115),
            ..Vitals::default()
        };
        let result = TriageScorer::score(&vitals, "");
        assert_eq!(result.score, 40);
    }

    #[test]
    fn critical_keywords_win_over_serious_ones() {
        let result = TriageScorer::score(
            &Vitals::default(),
            "fell badly, possible broken bone and chest pain",
        );
        // Only the critical set may contribute: 40, never 40 + 25.
        assert_eq!(result.score, 40);
        assert_eq!(result.factors.len(), 1);
        assert!(result.factors[0].contains("chest pain"));
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let result = TriageScorer::score(&Vitals::default(), "CHEST PAIN since this morning");
        assert_eq!(result.score, 40);
    }

    #[test]
    fn serious_keywords_apply_when_no_critical_match() {
        let result = TriageScorer::score(&Vitals::default(), "suspected fracture of the wrist");
        assert_eq!(result.score, 25);
    }

    #[test]
    fn level_thresholds_bracket_correctly() {
        // pain 9 (20) + hr 125 (15) = 35 -> medium
        let medium = full_vitals(98.6, 125, 120, 80, 9);
        assert_eq!(TriageScorer::score(&medium, "").level, TriageLevel::Medium);

        // bp critical (40) + pain severe (20) = 60 -> exactly the high threshold
        let high = Vitals {
            systolic_mmhg: Some(180),
            diastolic_mmhg: Some(80),
            pain_level: Some(8),
            ..Vitals::default()
        };
        let result = TriageScorer::score(&high, "");
        assert_eq!(result.score, 60);
        assert_eq!(result.level, TriageLevel::High);

        // pain mild (3) -> low
        let low = Vitals {
            pain_level: Some(1),
            ..Vitals::default()
        };
        assert_eq!(TriageScorer::score(&low, "").level, TriageLevel::Low);
    }

    #[test]
    fn widening_a_deviation_never_lowers_the_score() {
        // Monotonicity: walking the heart rate further from the normal range
        // while everything else is fixed must not decrease the score.
        let mut previous = 0;
        for hr in [70, 101, 110, 120, 130, 140, 200] {
            let vitals = Vitals {
                heart_rate_bpm: Some(hr),
                ..Vitals::default()
            };
            let score = TriageScorer::score(&vitals, "").score;
            assert!(
                score >= previous,
                "score dropped from {previous} to {score} at {hr} BPM"
            );
            previous = score;
        }
    }

    #[test]
    fn factors_follow_rule_evaluation_order() {
        let vitals = full_vitals(104.5, 130, 180, 110, 9);
        let result = TriageScorer::score(&vitals, "chest pain");

        assert!(result.factors[0].contains("temperature"));
        assert!(result.factors[1].contains("heart rate"));
        assert!(result.factors[2].contains("blood pressure"));
        assert!(result.factors[3].contains("pain"));
        assert!(result.factors[4].contains("symptom"));
    }

    #[test]
    fn triage_result_round_trips_through_json() {
        let vitals = full_vitals(101.8, 115, 150, 95, 6);
        let result = TriageScorer::score(&vitals, "severe pain");
        let json = serde_json::to_string(&result).expect("serialise");
        let back: TriageResult = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(result, back);
    }
}
