//! Quality gates for remotely generated questions.
//!
//! Three independent predicates run against every question:
//! - Specificity: at least 8 words and not opening with "what is"
//! - Uniqueness: word-set Jaccard similarity to every existing question ≤ 0.8
//! - Branchability: not opening with a yes/no auxiliary
//!
//! The gates only see remote output; deterministic content is never gated.

use std::collections::HashSet;

use super::{BranchItem, PathQuestionResult};

/// Minimum number of whitespace-separated words.
pub const MIN_QUESTION_WORDS: usize = 8;

/// Similarity above which a question counts as a duplicate.
pub const MAX_JACCARD_SIMILARITY: f64 = 0.8;

const GENERIC_OPENER: &str = "what is";

const YES_NO_STARTERS: &[&str] = &[
    "is ", "are ", "do ", "does ", "can ", "will ", "has ", "have ", "was ", "were ", "should ",
];

/// Which gate a question failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateFailure {
    Specificity,
    Uniqueness,
    Branchability,
}

impl GateFailure {
    fn describe(&self) -> &'static str {
        match self {
            GateFailure::Specificity => "too short or generic",
            GateFailure::Uniqueness => "too similar to an existing question",
            GateFailure::Branchability => "yes/no question",
        }
    }
}

/// Outcome of running the gates over a result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityReport {
    pub failures: Vec<(String, GateFailure)>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable reasons, one per failure.
    pub fn reasons(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|(q, gate)| {
                let excerpt: String = q.chars().take(50).collect();
                format!("{}: \"{}\"", gate.describe(), excerpt)
            })
            .collect()
    }
}

pub fn passes_specificity(question: &str) -> bool {
    let trimmed = question.trim();
    if trimmed.split_whitespace().count() < MIN_QUESTION_WORDS {
        return false;
    }
    !trimmed.to_lowercase().starts_with(GENERIC_OPENER)
}

/// Word-set Jaccard similarity of two strings, case-insensitive.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / union as f64
}

pub fn passes_uniqueness(question: &str, existing: &[String]) -> bool {
    existing
        .iter()
        .all(|e| jaccard_similarity(question, e) <= MAX_JACCARD_SIMILARITY)
}

pub fn passes_branchability(question: &str) -> bool {
    let lower = question.trim().to_lowercase();
    !YES_NO_STARTERS.iter().any(|s| lower.starts_with(s))
}

/// Run all three gates over a list of questions.
pub fn check_questions<'a, I>(questions: I, existing: &[String]) -> QualityReport
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = QualityReport::default();
    for q in questions {
        if !passes_specificity(q) {
            report.failures.push((q.to_string(), GateFailure::Specificity));
        }
        if !passes_uniqueness(q, existing) {
            report.failures.push((q.to_string(), GateFailure::Uniqueness));
        }
        if !passes_branchability(q) {
            report.failures.push((q.to_string(), GateFailure::Branchability));
        }
    }
    report
}

/// Gate the branch questions of a path result.
///
/// The root question is not gated, so a short framing root such as
/// "How do octopuses change colour?" is accepted.
pub fn check_path_questions(result: &PathQuestionResult, existing: &[String]) -> QualityReport {
    check_questions(result.branches.iter().map(|b| b.question.as_str()), existing)
}

pub fn check_branches(branches: &[BranchItem], existing: &[String]) -> QualityReport {
    check_questions(branches.iter().map(|b| b.question.as_str()), existing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_no_question_fails_branchability() {
        assert!(!passes_branchability("Is this true?"));
        assert!(!passes_branchability("  SHOULD we care about this at all?"));
        assert!(passes_branchability("Island nations adapt to rising seas how?"));
    }

    #[test]
    fn test_specificity_requires_eight_words() {
        assert!(!passes_specificity("Why does this work?"));
        assert!(passes_specificity(
            "Why does this mechanism keep working across so many contexts?"
        ));
    }

    #[test]
    fn test_specificity_rejects_what_is_opener() {
        assert!(!passes_specificity(
            "What is the deeper meaning behind all of these recurring patterns?"
        ));
        assert!(!passes_specificity(
            "WHAT IS the deeper meaning behind all of these recurring patterns?"
        ));
    }

    #[test]
    fn test_jaccard_similarity() {
        assert_eq!(jaccard_similarity("a b c", "a b c"), 1.0);
        assert_eq!(jaccard_similarity("a b", "c d"), 0.0);
        assert_eq!(jaccard_similarity("", ""), 0.0);
        assert!((jaccard_similarity("A b c", "a b d") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_uniqueness_threshold_is_strict() {
        // 4 shared of 5 total = 0.8, which is not above the threshold.
        let existing = vec!["one two three four five".to_string()];
        assert!(passes_uniqueness("one two three four", &existing));
        assert!(!passes_uniqueness("one two three four five", &existing));
    }

    #[test]
    fn test_twenty_word_novel_question_passes_all_gates() {
        let question = "Why might ancient trade routes across deserts have shaped \
                        language families more than mountains rivers or empires ever \
                        did historically";
        assert_eq!(question.split_whitespace().count(), 20);
        let existing = vec!["Completely unrelated sentence about kitchens".to_string()];
        let report = check_questions([question], &existing);
        assert!(report.passed(), "{:?}", report.reasons());
    }

    #[test]
    fn test_path_check_exempts_root_question() {
        let result = PathQuestionResult {
            root_question: "Why?".to_string(),
            branches: vec![BranchItem::new(
                "How do the hidden incentives here shape everyday decisions?",
                "c",
            )],
        };
        assert!(check_path_questions(&result, &[]).passed());
    }

    #[test]
    fn test_report_collects_every_failure() {
        let report = check_questions(["Is it?"], &["Is it?".to_string()]);
        assert_eq!(report.failures.len(), 3);
        assert!(!report.passed());
        assert_eq!(report.reasons().len(), 3);
    }
}
