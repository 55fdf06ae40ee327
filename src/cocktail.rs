//! Cocktail tables, quorum, and the per-round policy constants that the rest
//! of the crate treats as a single typed configuration (§9 Design Notes)
//! rather than scattered magic numbers.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of PRIMARY (and aligned FALLBACK) slots per cocktail.
pub const N: usize = 3;

/// Minimum number of live models required past activation.
pub const QUORUM: usize = 2;

/// Per-attempt read timeout for R1 (seconds).
pub const PRIMARY_TIMEOUT_SECS: u64 = 15;

/// Attempts per model in R1/R2.
pub const PRIMARY_ATTEMPTS: u32 = 2;

/// One of the five pre-selected LLM bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CocktailName {
    Luxe,
    Premium,
    Speedy,
    Budget,
    Depth,
}

impl CocktailName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CocktailName::Luxe => "LUXE",
            CocktailName::Premium => "PREMIUM",
            CocktailName::Speedy => "SPEEDY",
            CocktailName::Budget => "BUDGET",
            CocktailName::Depth => "DEPTH",
        }
    }

    pub fn lowercase(&self) -> &'static str {
        match self {
            CocktailName::Luxe => "luxe",
            CocktailName::Premium => "premium",
            CocktailName::Speedy => "speedy",
            CocktailName::Budget => "budget",
            CocktailName::Depth => "depth",
        }
    }

    /// The PRIMARY and FALLBACK sequences for this cocktail, aligned by
    /// index. Both are `N` long and disjoint from each other, per §3's
    /// cocktail invariant.
    pub fn models(&self) -> (&'static [&'static str; N], &'static [&'static str; N]) {
        match self {
            CocktailName::Luxe => (&PRIMARY_LUXE, &FALLBACK_LUXE),
            CocktailName::Premium => (&PRIMARY_PREMIUM, &FALLBACK_PREMIUM),
            CocktailName::Speedy => (&PRIMARY_SPEEDY, &FALLBACK_SPEEDY),
            CocktailName::Budget => (&PRIMARY_BUDGET, &FALLBACK_BUDGET),
            CocktailName::Depth => (&PRIMARY_DEPTH, &FALLBACK_DEPTH),
        }
    }
}

impl fmt::Display for CocktailName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("'{0}' is not a valid cocktail name")]
pub struct ParseCocktailError(String);

impl FromStr for CocktailName {
    type Err = ParseCocktailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LUXE" => Ok(CocktailName::Luxe),
            "PREMIUM" => Ok(CocktailName::Premium),
            "SPEEDY" => Ok(CocktailName::Speedy),
            "BUDGET" => Ok(CocktailName::Budget),
            "DEPTH" => Ok(CocktailName::Depth),
            other => Err(ParseCocktailError(other.to_string())),
        }
    }
}

pub const PRIMARY_LUXE: [&str; N] =
    ["openai/gpt-4o", "anthropic/claude-sonnet-4.5", "google/gemini-2.0-flash-exp:free"];
pub const FALLBACK_LUXE: [&str; N] =
    ["openai/chatgpt-4o-latest", "anthropic/claude-3.7-sonnet", "google/gemini-2.5-pro"];

pub const PRIMARY_PREMIUM: [&str; N] =
    ["anthropic/claude-3.7-sonnet", "openai/gpt-4o", "google/gemini-2.5-pro"];
pub const FALLBACK_PREMIUM: [&str; N] =
    ["x-ai/grok-3", "openai/chatgpt-4o-latest", "meta-llama/llama-3.3-70b-instruct"];

pub const PRIMARY_SPEEDY: [&str; N] =
    ["openai/gpt-4o-mini", "anthropic/claude-3-haiku", "x-ai/grok-3-mini"];
pub const FALLBACK_SPEEDY: [&str; N] =
    ["google/gemini-2.0-flash-exp:free", "qwen/qwen-2.5-72b-instruct", "meta-llama/llama-3.3-70b-instruct"];

pub const PRIMARY_BUDGET: [&str; N] =
    ["openai/gpt-3.5-turbo", "google/gemini-2.0-flash-exp:free", "qwen/qwen-2.5-72b-instruct"];
pub const FALLBACK_BUDGET: [&str; N] =
    ["meta-llama/llama-3.3-70b-instruct", "openai/gpt-4o-mini", "anthropic/claude-3-haiku"];

pub const PRIMARY_DEPTH: [&str; N] =
    ["anthropic/claude-3.7-sonnet", "openai/gpt-4o", "meta-llama/llama-3.3-70b-instruct"];
pub const FALLBACK_DEPTH: [&str; N] =
    ["openai/chatgpt-4o-latest", "anthropic/claude-sonnet-4.5", "google/gemini-2.0-flash-exp:free"];

/// Preference order for R3 neutral-model selection: the first entry present
/// in `activeList` wins. `openai/gpt-4o-mini` is ranked first so that a
/// SPEEDY run with a fully-ready primary set selects its own first primary
/// as neutral (see DESIGN.md for why this diverges from the order used
/// when the neutral model is drawn from a premium-tier cocktail).
pub const NEUTRAL_PREFERENCE: &[&str] = &[
    "openai/gpt-4o-mini",
    "anthropic/claude-3.7-sonnet",
    "openai/gpt-4o",
    "google/gemini-2.0-flash-thinking-exp:free",
    "meta-llama/llama-3.3-70b-instruct",
];

/// `calculate_concurrency_limit`: semaphore width for R1/R2 fan-out.
/// Query length never affects width; attachment count does.
pub fn concurrency_limit(attachment_count: usize, num_models: usize) -> usize {
    if attachment_count == 0 {
        num_models
    } else if attachment_count <= 3 {
        2
    } else {
        1
    }
}

/// `calculate_synthesis_timeout`: dynamic R3 deadline from context length
/// and draft count, clamped to [60, 300] seconds.
pub fn synthesis_timeout_secs(context_len: usize, num_meta_drafts: usize) -> f64 {
    let mut factor = if context_len < 1000 {
        1.0
    } else if context_len < 3000 {
        1.5
    } else if context_len < 5000 {
        2.0
    } else {
        3.0
    };
    if num_meta_drafts >= 4 {
        factor *= 1.2;
    }
    (60.0 * factor).clamp(60.0, 300.0)
}

/// Per-draft character cap, bucketed by the *preliminary* (worst-case)
/// synthesis timeout computed before truncation is applied.
pub fn max_chars_per_draft(preliminary_timeout_secs: f64) -> usize {
    if preliminary_timeout_secs >= 180.0 {
        2000
    } else if preliminary_timeout_secs >= 120.0 {
        1200
    } else if preliminary_timeout_secs >= 90.0 {
        800
    } else {
        500
    }
}
