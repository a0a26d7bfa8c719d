use crate::config::TierThresholds;
use crate::evaluators::SignalResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        };
        f.write_str(s)
    }
}

/// Result of combining the evaluator outcomes for one message.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub percent: u32,
    /// Ids of triggered evaluators, in declaration order.
    pub contributing: Vec<String>,
    /// Ids of evaluated-but-clean evaluators, in declaration order.
    pub clean: Vec<String>,
    /// Ids skipped for lack of data; excluded from the denominator.
    pub skipped: Vec<String>,
}

/// Combine evaluator outputs into a 0..=100 percentage. The denominator is
/// the weight of the evaluators that actually ran for this message, so
/// partial evaluation still yields a meaningful ratio; a message where
/// nothing was evaluable scores 0. Rounds half away from zero.
pub fn score(evaluations: &[SignalResult]) -> ScoreBreakdown {
    let mut triggered_weight: u64 = 0;
    let mut evaluated_weight: u64 = 0;
    let mut contributing = Vec::new();
    let mut clean = Vec::new();
    let mut skipped = Vec::new();

    for result in evaluations {
        if !result.evaluated {
            skipped.push(result.id.as_str().to_string());
            continue;
        }
        evaluated_weight += u64::from(result.weight);
        if result.triggered {
            triggered_weight += u64::from(result.weight);
            contributing.push(result.id.as_str().to_string());
        } else {
            clean.push(result.id.as_str().to_string());
        }
    }

    let percent = if evaluated_weight == 0 {
        0
    } else {
        // Integer rounding, half away from zero.
        ((triggered_weight * 100 * 2 + evaluated_weight) / (evaluated_weight * 2)) as u32
    };

    ScoreBreakdown {
        percent,
        contributing,
        clean,
        skipped,
    }
}

pub fn tier_for(percent: u32, thresholds: &TierThresholds) -> RiskTier {
    if percent >= thresholds.high {
        RiskTier::High
    } else if percent >= thresholds.medium {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}
