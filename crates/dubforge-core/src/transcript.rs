//! Transcript model shared by every speech-to-text backend.

use serde::{Deserialize, Serialize};

/// One timed span of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    pub text: String,
    /// Backend-specific confidence score, if reported.
    pub confidence: Option<f64>,
}

/// Result of a transcription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Full transcribed text.
    pub text: String,
    /// Ordered segments.
    pub segments: Vec<Segment>,
    /// Detected (or hinted) language code.
    pub language: Option<String>,
    /// Overall confidence: mean of the segment confidences that were reported.
    pub confidence: f64,
}

impl Transcript {
    /// Build a transcript from ordered segments, flattening the text and
    /// averaging reported confidences.
    pub fn from_segments(segments: Vec<Segment>, language: Option<String>) -> Self {
        let text = flatten_segments(&segments);
        let scores: Vec<f64> = segments.iter().filter_map(|s| s.confidence).collect();
        let confidence = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        Self {
            text,
            segments,
            language,
            confidence,
        }
    }

    /// `true` when there is no speech text to synthesize.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Span covered by the segments, in seconds.
    pub fn duration(&self) -> f64 {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => (last.end - first.start).max(0.0),
            _ => 0.0,
        }
    }
}

/// Join segment texts into one string, trimming each and skipping blanks.
pub fn flatten_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str, confidence: Option<f64>) -> Segment {
        Segment {
            start,
            end,
            text: text.into(),
            confidence,
        }
    }

    #[test]
    fn flatten_trims_and_skips_blank() {
        let segments = vec![
            seg(0.0, 1.0, " Hello ", None),
            seg(1.0, 1.5, "   ", None),
            seg(1.5, 3.0, "world.", None),
        ];
        assert_eq!(flatten_segments(&segments), "Hello world.");
    }

    #[test]
    fn from_segments_averages_reported_confidence() {
        let t = Transcript::from_segments(
            vec![
                seg(0.0, 1.0, "a", Some(0.5)),
                seg(1.0, 2.0, "b", None),
                seg(2.0, 4.0, "c", Some(1.0)),
            ],
            Some("en".into()),
        );
        assert_eq!(t.text, "a b c");
        assert!((t.confidence - 0.75).abs() < 1e-9);
        assert!((t.duration() - 4.0).abs() < 1e-9);
        assert_eq!(t.language.as_deref(), Some("en"));
    }

    #[test]
    fn empty_transcript() {
        let t = Transcript::from_segments(vec![], None);
        assert!(t.is_empty());
        assert_eq!(t.confidence, 0.0);
        assert_eq!(t.duration(), 0.0);
    }
}
