//! Response synthesis
//!
//! Merges responses from multiple backends into a single output. All
//! methods are total: `combine` never fails, it degrades to the best
//! single response instead.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::adapters::ModelResponse;

/// Confidence assumed for responses that don't report one
const DEFAULT_CONFIDENCE: f64 = 0.7;

/// How multiple responses are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMethod {
    WeightedConsensus,
    BestOf,
    Merge,
}

impl std::fmt::Display for SynthesisMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthesisMethod::WeightedConsensus => write!(f, "weighted_consensus"),
            SynthesisMethod::BestOf => write!(f, "best_of"),
            SynthesisMethod::Merge => write!(f, "merge"),
        }
    }
}

/// Combines backend responses. Stateless; order of the input slice never
/// affects which response wins.
#[derive(Debug, Default, Clone)]
pub struct ResponseSynthesizer;

impl ResponseSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Combine responses with the given method. Zero responses yield an
    /// empty string; a single response is returned unchanged.
    pub fn combine(
        &self,
        responses: &[ModelResponse],
        method: SynthesisMethod,
        weights: Option<&HashMap<String, f64>>,
    ) -> String {
        match responses {
            [] => String::new(),
            [only] => only.content.clone(),
            _ => match method {
                SynthesisMethod::WeightedConsensus => self.weighted_consensus(responses, weights),
                SynthesisMethod::BestOf => self.best_of(responses),
                SynthesisMethod::Merge => self.merge(responses),
            },
        }
    }

    /// Pick the highest-weighted response and annotate it. This is a
    /// deliberate pick-best simplification rather than textual blending.
    fn weighted_consensus(
        &self,
        responses: &[ModelResponse],
        weights: Option<&HashMap<String, f64>>,
    ) -> String {
        let weight_of = |response: &ModelResponse| -> f64 {
            match weights {
                Some(map) => map.get(&response.model).copied().unwrap_or(0.5),
                None => response.confidence.map(f64::from).unwrap_or(DEFAULT_CONFIDENCE),
            }
        };

        let best = responses
            .iter()
            .max_by(|a, b| {
                weight_of(a)
                    .partial_cmp(&weight_of(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Stable tiebreak so permuting the input can't change
                    // the winner
                    .then_with(|| b.model.cmp(&a.model))
            })
            .expect("non-empty response slice");

        format!(
            "{}\n\n---\n*Synthesized from {} models with weighted consensus*",
            best.content,
            responses.len()
        )
    }

    /// Return the top-scoring response content, unannotated
    fn best_of(&self, responses: &[ModelResponse]) -> String {
        responses
            .iter()
            .max_by(|a, b| {
                self.score(a)
                    .partial_cmp(&self.score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.model.cmp(&a.model))
            })
            .expect("non-empty response slice")
            .content
            .clone()
    }

    /// Quality heuristic: confidence 40%, length sweet spot 20%, structure
    /// markers 20%, model affinity 20%
    fn score(&self, response: &ModelResponse) -> f64 {
        let mut score = response
            .confidence
            .map(f64::from)
            .unwrap_or(DEFAULT_CONFIDENCE)
            * 0.4;

        let length = response.content.len();
        if (500..=5000).contains(&length) {
            score += 0.2;
        } else if length > 5000 {
            score += 0.1;
        }

        if response.content.contains("```") {
            score += 0.1;
        }
        if ["##", "**", "1.", "- "]
            .iter()
            .any(|marker| response.content.contains(marker))
        {
            score += 0.1;
        }

        let model = response.model.to_lowercase();
        for (marker, bonus) in [("architect", 0.1), ("editor", 0.1), ("primary", 0.1)] {
            if model.contains(marker) {
                score += bonus;
                break;
            }
        }

        score.min(1.0)
    }

    /// Segment every response into named sections and reassemble them under
    /// fixed headers, deduplicating repeated segments by content hash.
    fn merge(&self, responses: &[ModelResponse]) -> String {
        let mut sections: HashMap<Section, Vec<String>> = HashMap::new();

        // Sort by model id so section concatenation order is input-order
        // independent
        let mut ordered: Vec<&ModelResponse> = responses.iter().collect();
        ordered.sort_by(|a, b| a.model.cmp(&b.model));

        for response in ordered {
            for (section, content) in segment(&response.content) {
                if !content.trim().is_empty() {
                    sections.entry(section).or_default().push(content);
                }
            }
        }

        let mut merged = Vec::new();
        for (section, header) in [
            (Section::Overview, "## Overview"),
            (Section::Implementation, "## Implementation"),
            (Section::Considerations, "## Considerations"),
            (Section::Alternatives, "## Alternatives"),
        ] {
            if let Some(contents) = sections.get(&section) {
                merged.push(header.to_string());
                merged.push(dedupe(contents));
            }
        }

        merged.join("\n\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Section {
    Overview,
    Implementation,
    Considerations,
    Alternatives,
}

/// Best-effort line-scan segmentation by keyword triggers. Text before the
/// first trigger (or with no triggers at all) lands in the overview.
fn segment(content: &str) -> Vec<(Section, String)> {
    let mut sections = Vec::new();
    let mut current = Section::Overview;
    let mut buffer: Vec<&str> = Vec::new();

    let flush = |section: Section, buffer: &mut Vec<&str>, out: &mut Vec<(Section, String)>| {
        if !buffer.is_empty() {
            out.push((section, buffer.join("\n")));
            buffer.clear();
        }
    };

    for line in content.lines() {
        let lower = line.to_lowercase();
        let next = if ["implementation", "solution", "code:"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Some(Section::Implementation)
        } else if ["consideration", "note:", "important"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Some(Section::Considerations)
        } else if ["alternative", "other option", "instead"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Some(Section::Alternatives)
        } else {
            None
        };

        match next {
            Some(section) if section != current => {
                flush(current, &mut buffer, &mut sections);
                current = section;
                // The trigger line often carries the content itself
                // ("Note: ..."), so it stays with its section
                buffer.push(line);
            }
            _ => buffer.push(line),
        }
    }
    flush(current, &mut buffer, &mut sections);

    sections
}

/// Drop segments whose normalized content hashes identically
fn dedupe(contents: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();

    for content in contents {
        let mut hasher = DefaultHasher::new();
        content.trim().to_lowercase().hash(&mut hasher);
        if seen.insert(hasher.finish()) {
            unique.push(content.as_str());
        }
    }

    unique.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn response(model: &str, content: &str, confidence: Option<f32>) -> ModelResponse {
        ModelResponse {
            content: content.to_string(),
            model: model.to_string(),
            reasoning_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            latency_ms: None,
            cost: Decimal::ZERO,
            confidence,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_empty_input_yields_empty_string() {
        let synthesizer = ResponseSynthesizer::new();
        assert_eq!(
            synthesizer.combine(&[], SynthesisMethod::WeightedConsensus, None),
            ""
        );
    }

    #[test]
    fn test_single_response_returned_verbatim() {
        let synthesizer = ResponseSynthesizer::new();
        let responses = vec![response("primary", "the answer", Some(0.9))];
        assert_eq!(
            synthesizer.combine(&responses, SynthesisMethod::Merge, None),
            "the answer"
        );
    }

    #[test]
    fn test_weighted_consensus_picks_highest_confidence() {
        let synthesizer = ResponseSynthesizer::new();
        let responses = vec![
            response("fast", "shallow take", Some(0.5)),
            response("primary", "deep take", Some(0.9)),
        ];
        let combined = synthesizer.combine(&responses, SynthesisMethod::WeightedConsensus, None);
        assert!(combined.starts_with("deep take"));
        assert!(combined.contains("weighted consensus"));
    }

    #[test]
    fn test_weighted_consensus_respects_explicit_weights() {
        let synthesizer = ResponseSynthesizer::new();
        let responses = vec![
            response("fast", "shallow take", Some(0.9)),
            response("primary", "deep take", Some(0.5)),
        ];
        let weights: HashMap<String, f64> =
            [("fast".to_string(), 0.2), ("primary".to_string(), 0.8)]
                .into_iter()
                .collect();
        let combined = synthesizer.combine(
            &responses,
            SynthesisMethod::WeightedConsensus,
            Some(&weights),
        );
        assert!(combined.starts_with("deep take"));
    }

    #[test]
    fn test_combine_is_order_independent() {
        let synthesizer = ResponseSynthesizer::new();
        let a = response("fast", "## Overview\nfirst view", Some(0.6));
        let b = response("primary", "implementation details\nfn main() {}", Some(0.8));
        let c = response("architect", "Note: watch the cache", Some(0.7));

        let forward = vec![a.clone(), b.clone(), c.clone()];
        let backward = vec![c, b, a];

        assert_eq!(
            synthesizer.combine(&forward, SynthesisMethod::WeightedConsensus, None),
            synthesizer.combine(&backward, SynthesisMethod::WeightedConsensus, None)
        );
        assert_eq!(
            synthesizer.combine(&forward, SynthesisMethod::Merge, None),
            synthesizer.combine(&backward, SynthesisMethod::Merge, None)
        );
    }

    #[test]
    fn test_best_of_prefers_structured_content() {
        let synthesizer = ResponseSynthesizer::new();
        let plain = "x".repeat(600);
        let structured = format!("## Plan\n{}\n```rust\nfn f() {{}}\n```", "y".repeat(600));
        let responses = vec![
            response("fast", &plain, Some(0.7)),
            response("primary", &structured, Some(0.7)),
        ];
        assert_eq!(
            synthesizer.combine(&responses, SynthesisMethod::BestOf, None),
            structured
        );
    }

    #[test]
    fn test_merge_collects_sections() {
        let synthesizer = ResponseSynthesizer::new();
        let responses = vec![
            response("primary", "The cache is stale.\nImplementation:\nrefresh on write", None),
            response("architect", "Note: invalidation is the hard part", None),
        ];
        let merged = synthesizer.combine(&responses, SynthesisMethod::Merge, None);
        assert!(merged.contains("## Overview"));
        assert!(merged.contains("## Implementation"));
        assert!(merged.contains("## Considerations"));
    }

    #[test]
    fn test_merge_dedupes_identical_segments() {
        let synthesizer = ResponseSynthesizer::new();
        let responses = vec![
            response("primary", "shared insight", None),
            response("fast", "Shared Insight", None),
        ];
        let merged = synthesizer.combine(&responses, SynthesisMethod::Merge, None);
        assert_eq!(merged.matches("hared insight").count(), 1);
    }

    #[test]
    fn test_unsegmentable_text_lands_in_overview() {
        let synthesizer = ResponseSynthesizer::new();
        let responses = vec![
            response("primary", "plain prose with no markers", None),
            response("fast", "more plain prose", None),
        ];
        let merged = synthesizer.combine(&responses, SynthesisMethod::Merge, None);
        assert!(merged.starts_with("## Overview"));
        assert!(merged.contains("plain prose with no markers"));
    }
}
