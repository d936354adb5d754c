//! Reasoning-depth modes
//!
//! Five named tiers controlling the token budget and sampling temperature a
//! backend is allowed to use. A mode is parsed from the task phrasing when
//! present, otherwise defaulted from the task's complexity.

use serde::{Deserialize, Serialize};

use crate::task::ComplexityLevel;

/// Named reasoning-depth tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingMode {
    Minimal,
    Low,
    Medium,
    High,
    Max,
}

impl ThinkingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingMode::Minimal => "minimal",
            ThinkingMode::Low => "low",
            ThinkingMode::Medium => "medium",
            ThinkingMode::High => "high",
            ThinkingMode::Max => "max",
        }
    }

    /// Parse an exact tier name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "minimal" => Some(ThinkingMode::Minimal),
            "low" => Some(ThinkingMode::Low),
            "medium" => Some(ThinkingMode::Medium),
            "high" => Some(ThinkingMode::High),
            "max" => Some(ThinkingMode::Max),
            _ => None,
        }
    }

    /// Default mode for a given task complexity
    pub fn for_complexity(complexity: ComplexityLevel) -> Self {
        match complexity {
            ComplexityLevel::Trivial => ThinkingMode::Minimal,
            ComplexityLevel::Low => ThinkingMode::Low,
            ComplexityLevel::Medium => ThinkingMode::Medium,
            ComplexityLevel::High => ThinkingMode::High,
            ComplexityLevel::VeryHigh => ThinkingMode::Max,
        }
    }

    pub fn profile(&self) -> ThinkingProfile {
        match self {
            ThinkingMode::Minimal => ThinkingProfile {
                mode: *self,
                token_budget: 128,
                temperature: 0.1,
            },
            ThinkingMode::Low => ThinkingProfile {
                mode: *self,
                token_budget: 2048,
                temperature: 0.2,
            },
            ThinkingMode::Medium => ThinkingProfile {
                mode: *self,
                token_budget: 8192,
                temperature: 0.3,
            },
            ThinkingMode::High => ThinkingProfile {
                mode: *self,
                token_budget: 16384,
                temperature: 0.4,
            },
            ThinkingMode::Max => ThinkingProfile {
                mode: *self,
                token_budget: 32768,
                temperature: 0.5,
            },
        }
    }
}

impl std::fmt::Display for ThinkingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete budget for a thinking mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThinkingProfile {
    pub mode: ThinkingMode,
    pub token_budget: u32,
    pub temperature: f32,
}

impl ThinkingProfile {
    /// Token budget of the medium tier; per-request cost ceilings scale
    /// relative to this.
    pub const BASELINE_BUDGET: u32 = 8192;

    /// Multiplier applied to per-request cost limits for this profile
    pub fn cost_scale(&self) -> f64 {
        f64::from(self.token_budget) / f64::from(Self::BASELINE_BUDGET)
    }
}

impl Default for ThinkingProfile {
    fn default() -> Self {
        ThinkingMode::Medium.profile()
    }
}

/// Parse a thinking mode from free-form task phrasing.
///
/// Direct tier names ("use high thinking") win; otherwise a small set of
/// phrase synonyms is consulted. Returns `None` when nothing matches so the
/// caller can fall back to the complexity default.
pub fn parse_thinking_mode(text: &str) -> Option<ThinkingMode> {
    let text = text.to_lowercase();

    if !text.contains("thinking") && !text.contains("reasoning") {
        return None;
    }

    for mode in [
        ThinkingMode::Minimal,
        ThinkingMode::Low,
        ThinkingMode::Medium,
        ThinkingMode::High,
        ThinkingMode::Max,
    ] {
        if text.contains(mode.as_str()) {
            return Some(mode);
        }
    }

    if ["minimum", "simple", "quick"].iter().any(|p| text.contains(p)) {
        Some(ThinkingMode::Minimal)
    } else if ["basic", "standard"].iter().any(|p| text.contains(p)) {
        Some(ThinkingMode::Low)
    } else if ["normal", "regular", "default"].iter().any(|p| text.contains(p)) {
        Some(ThinkingMode::Medium)
    } else if ["deep", "thorough", "comprehensive"].iter().any(|p| text.contains(p)) {
        Some(ThinkingMode::High)
    } else if ["maximum", "exhaustive", "complete"].iter().any(|p| text.contains(p)) {
        Some(ThinkingMode::Max)
    } else {
        None
    }
}
