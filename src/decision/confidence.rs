use serde::{Deserialize, Serialize};

/// Score below which a numeric confidence maps to [`ConfidenceLevel::Low`].
pub const LOW_THRESHOLD: f64 = 0.4;
/// Score below which a numeric confidence maps to [`ConfidenceLevel::Medium`].
pub const HIGH_THRESHOLD: f64 = 0.7;

const HEDGING_TERMS: &[&str] = &["uncertain", "unclear"];
const QUALIFYING_TERMS: &[&str] = &["likely", "probably"];

/// Ordinal certainty of a thought step or an agent output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    /// Weak or hedged.
    Low,
    /// Neither weak nor strong.
    #[default]
    Medium,
    /// Strong and unqualified.
    High,
}

impl ConfidenceLevel {
    /// Map a framework-supplied label ("low", "HIGH", ...) to a level.
    ///
    /// Anything unrecognised falls back to `Medium`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }

    /// Map a numeric confidence in `[0, 1]` to a level.
    ///
    /// `< 0.4` is `Low`, `< 0.7` is `Medium`, everything else is `High`.
    /// The thresholds are lower-inclusive for the upper band, so `0.4` is
    /// `Medium` and `0.7` is `High`. Non-finite scores are `Medium`.
    pub fn from_score(score: f64) -> Self {
        if !score.is_finite() {
            return ConfidenceLevel::Medium;
        }
        if score < LOW_THRESHOLD {
            ConfidenceLevel::Low
        } else if score < HIGH_THRESHOLD {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        }
    }

    /// Lexical guess at the confidence expressed by free text.
    ///
    /// Hedging words ("uncertain", "unclear") give `Low`, qualifiers
    /// ("likely", "probably") give `Medium`, and anything else is read as
    /// `High`. This is a keyword heuristic, not a calibrated estimate.
    pub fn classify_text(text: &str) -> Self {
        let lowered = text.to_lowercase();
        if HEDGING_TERMS.iter().any(|term| lowered.contains(term)) {
            ConfidenceLevel::Low
        } else if QUALIFYING_TERMS.iter().any(|term| lowered.contains(term)) {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceLevel::Low => write!(f, "LOW"),
            ConfidenceLevel::Medium => write!(f, "MEDIUM"),
            ConfidenceLevel::High => write!(f, "HIGH"),
        }
    }
}

impl std::str::FromStr for ConfidenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(ConfidenceLevel::Low),
            "MEDIUM" => Ok(ConfidenceLevel::Medium),
            "HIGH" => Ok(ConfidenceLevel::High),
            _ => Err(format!("Unknown confidence level: {}", s)),
        }
    }
}
