//! Classifies a failed [`TaskResult`] into a failure category with a
//! confidence score (spec §4.7, C8a).
//!
//! Grounded on `abathur::services::guardrails`'s pattern-table matching
//! idiom (iterate fixed rules, keep the best match); the category set and
//! scoring are new per spec §4.7.

use regex::Regex;

use crate::domain::models::TaskResult;

/// Failure category (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Oom,
    Timeout,
    DependencyFailure,
    Crash,
    PermissionDenied,
    NetworkError,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oom => "OOM",
            Self::Timeout => "TIMEOUT",
            Self::DependencyFailure => "DEPENDENCY_FAILURE",
            Self::Crash => "CRASH",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// A classification with its confidence (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub category: FailureCategory,
    pub confidence: f64,
}

struct Pattern {
    category: FailureCategory,
    stderr_patterns: Vec<Regex>,
    exit_codes: Vec<i32>,
    base_confidence: f64,
}

/// Duration (ms) beyond which TIMEOUT gains additional evidence.
const ANOMALY_DURATION_MS: u64 = 60_000;
const UNKNOWN_CONFIDENCE: f64 = 0.3;

/// Pattern-table failure classifier (spec §4.7).
pub struct FailureDetector {
    patterns: Vec<Pattern>,
}

impl Default for FailureDetector {
    fn default() -> Self {
        Self { patterns: Self::default_patterns() }
    }
}

impl FailureDetector {
    fn default_patterns() -> Vec<Pattern> {
        vec![
            Pattern {
                category: FailureCategory::Oom,
                stderr_patterns: vec![
                    Regex::new(r"(?i)out of memory|oom[-_ ]?killed|cannot allocate memory").unwrap(),
                ],
                exit_codes: vec![137],
                base_confidence: 0.9,
            },
            Pattern {
                category: FailureCategory::Timeout,
                stderr_patterns: vec![Regex::new(r"(?i)timed? ?out|deadline exceeded").unwrap()],
                exit_codes: vec![124],
                base_confidence: 0.8,
            },
            Pattern {
                category: FailureCategory::DependencyFailure,
                stderr_patterns: vec![
                    Regex::new(r"(?i)module not found|package .* not found|dependency resolution failed|could not find crate")
                        .unwrap(),
                ],
                exit_codes: vec![],
                base_confidence: 0.75,
            },
            Pattern {
                category: FailureCategory::PermissionDenied,
                stderr_patterns: vec![Regex::new(r"(?i)permission denied|access is denied|eacces").unwrap()],
                exit_codes: vec![126],
                base_confidence: 0.85,
            },
            Pattern {
                category: FailureCategory::NetworkError,
                stderr_patterns: vec![
                    Regex::new(r"(?i)connection refused|connection reset|dns resolution failed|network unreachable")
                        .unwrap(),
                ],
                exit_codes: vec![],
                base_confidence: 0.7,
            },
            Pattern {
                category: FailureCategory::Crash,
                stderr_patterns: vec![
                    Regex::new(r"(?i)segmentation fault|panic|core dumped|sigsegv|sigabrt").unwrap(),
                ],
                exit_codes: vec![134, 139],
                base_confidence: 0.85,
            },
        ]
    }

    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self { patterns }
    }

    /// Returns the highest-confidence category; unmatched non-zero exits
    /// yield `UNKNOWN` at low confidence (spec §4.7).
    pub fn classify(&self, result: &TaskResult, duration_ms: Option<u64>) -> Classification {
        let mut best: Option<Classification> = None;

        for pattern in &self.patterns {
            let mut confidence = 0.0;
            let stderr_hit = pattern.stderr_patterns.iter().any(|re| re.is_match(&result.stderr));
            let exit_hit = pattern.exit_codes.contains(&result.exit_code);
            if stderr_hit || exit_hit {
                confidence = pattern.base_confidence;
                if stderr_hit && exit_hit {
                    confidence = (confidence + 0.1).min(1.0);
                }
                if pattern.category == FailureCategory::Timeout {
                    if let Some(d) = duration_ms {
                        if d > ANOMALY_DURATION_MS {
                            confidence = (confidence + 0.15).min(1.0);
                        }
                    }
                }
            }
            if confidence > 0.0 && best.is_none_or(|b| confidence > b.confidence) {
                best = Some(Classification { category: pattern.category, confidence });
            }
        }

        best.unwrap_or(Classification { category: FailureCategory::Unknown, confidence: UNKNOWN_CONFIDENCE })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32, stderr: &str) -> TaskResult {
        TaskResult { exit_code, stdout: String::new(), stderr: stderr.to_string(), duration_ms: 1 }
    }

    #[test]
    fn oom_exit_code_is_classified() {
        let detector = FailureDetector::default();
        let c = detector.classify(&result(137, ""), None);
        assert_eq!(c.category, FailureCategory::Oom);
    }

    #[test]
    fn timeout_gains_confidence_from_long_duration() {
        let detector = FailureDetector::default();
        let quick = detector.classify(&result(124, "operation timed out"), Some(1_000));
        let slow = detector.classify(&result(124, "operation timed out"), Some(120_000));
        assert!(slow.confidence > quick.confidence);
    }

    #[test]
    fn unmatched_nonzero_exit_is_unknown_low_confidence() {
        let detector = FailureDetector::default();
        let c = detector.classify(&result(7, "something weird happened"), None);
        assert_eq!(c.category, FailureCategory::Unknown);
        assert!((c.confidence - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn stderr_and_exit_code_both_matching_boosts_confidence() {
        let detector = FailureDetector::default();
        let both = detector.classify(&result(137, "out of memory"), None);
        let only_code = detector.classify(&result(137, ""), None);
        assert!(both.confidence >= only_code.confidence);
    }
}
