//! Offline, hash-seeded generation from pre-authored content.
//!
//! The same input always selects the same entry from a fixed pool, so this
//! provider is a pure function up to its artificial delay. It needs no
//! network and no credential, which makes it the default in demo mode and
//! the fallback target of the dispatcher.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

use super::{
    AnswerResult, BranchItem, BranchType, GenerationProvider, NodeContext, PathQuestionResult,
    PathType,
};
use crate::error::GenerationResult;

/// Randomized latency band in milliseconds (inclusive min, exclusive max).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayBand {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayBand {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..self.max_ms))
    }
}

/// Artificial latency per operation, for UX parity with the remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyProfile {
    pub path_questions: DelayBand,
    pub answer: DelayBand,
    pub branches: DelayBand,
}

impl LatencyProfile {
    /// Bands that feel like a live model call.
    pub const REALISTIC: LatencyProfile = LatencyProfile {
        path_questions: DelayBand::new(600, 1000),
        answer: DelayBand::new(800, 1400),
        branches: DelayBand::new(500, 1000),
    };

    /// No delay at all.
    pub const NONE: LatencyProfile = LatencyProfile {
        path_questions: DelayBand::new(0, 0),
        answer: DelayBand::new(0, 0),
        branches: DelayBand::new(0, 0),
    };
}

/// Stable 32-bit string hash (`h = h * 31 + unit` over UTF-16 code units),
/// returned as an absolute value.
pub fn stable_hash(input: &str) -> u32 {
    let hash = input
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32));
    hash.unsigned_abs()
}

fn pick<T>(pool: &[T], key: &str) -> usize {
    stable_hash(key) as usize % pool.len()
}

/// Deterministic generation provider.
#[derive(Debug, Clone)]
pub struct DeterministicGenerator {
    latency: LatencyProfile,
}

impl Default for DeterministicGenerator {
    fn default() -> Self {
        Self::new(LatencyProfile::REALISTIC)
    }
}

impl DeterministicGenerator {
    pub fn new(latency: LatencyProfile) -> Self {
        Self { latency }
    }

    /// A generator that answers immediately.
    pub fn instant() -> Self {
        Self::new(LatencyProfile::NONE)
    }

    /// Pure selection of the path question set for `(source_text, path_type)`.
    pub fn select_path_questions(source_text: &str, path_type: PathType) -> PathQuestionResult {
        let sets = path_question_sets(path_type);
        let set = &sets[pick(sets, source_text)];
        PathQuestionResult {
            root_question: set.root.to_string(),
            branches: to_items(set.branches),
        }
    }

    /// Pure selection of the answer for a question.
    pub fn select_answer(question: &str) -> AnswerResult {
        let (summary, bullets) = ANSWERS[pick(ANSWERS, question)];
        AnswerResult {
            summary: summary.to_string(),
            bullets: bullets.iter().map(|b| b.to_string()).collect(),
        }
    }

    /// Pure selection of a branch set for a question and branch type.
    pub fn select_branches(question: &str, branch_type: BranchType) -> Vec<BranchItem> {
        let pool = match branch_type {
            BranchType::Question => BRANCHES_FROM_QUESTION,
            BranchType::Answer => BRANCHES_FROM_ANSWER,
        };
        let key = format!("{}{}", question, branch_type.as_str());
        to_items(pool[pick(pool, &key)])
    }

    async fn pause(&self, band: DelayBand) {
        let delay = band.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GenerationProvider for DeterministicGenerator {
    async fn generate_path_questions(
        &self,
        source_text: &str,
        path_type: PathType,
    ) -> GenerationResult<PathQuestionResult> {
        self.pause(self.latency.path_questions).await;
        debug!(path_type = %path_type, "Deterministic path questions");
        Ok(Self::select_path_questions(source_text, path_type))
    }

    async fn generate_answer(&self, node: &NodeContext) -> GenerationResult<AnswerResult> {
        self.pause(self.latency.answer).await;
        Ok(Self::select_answer(&node.question))
    }

    async fn generate_branches(
        &self,
        node: &NodeContext,
        branch_type: BranchType,
    ) -> GenerationResult<Vec<BranchItem>> {
        self.pause(self.latency.branches).await;
        Ok(Self::select_branches(&node.question, branch_type))
    }
}

fn to_items(pairs: &[(&str, &str)]) -> Vec<BranchItem> {
    pairs
        .iter()
        .map(|(q, c)| BranchItem::new(*q, *c))
        .collect()
}

// ============================================================================
// Pre-authored content
// ============================================================================

struct QuestionSet {
    root: &'static str,
    branches: &'static [(&'static str, &'static str)],
}

fn path_question_sets(path_type: PathType) -> &'static [QuestionSet] {
    match path_type {
        PathType::Clarify => CLARIFY_SETS,
        PathType::GoDeeper => GO_DEEPER_SETS,
        PathType::Challenge => CHALLENGE_SETS,
        PathType::Apply => APPLY_SETS,
        PathType::Connect => CONNECT_SETS,
        PathType::Surprise => SURPRISE_SETS,
    }
}

const CLARIFY_SETS: &[QuestionSet] = &[
    QuestionSet {
        root: "Which single idea in this passage carries most of its meaning?",
        branches: &[
            ("How would you restate that idea without any of the original wording?", "Rewording exposes whether the idea is understood or only recognised"),
            ("Which phrase here could a careful reader take two different ways?", "Ambiguous phrasing often hides a real disagreement"),
            ("What has to be assumed for this statement to make sense at all?", "Unstated premises quietly decide what a claim means"),
        ],
    },
    QuestionSet {
        root: "How would the key terms here be defined by someone who uses them daily?",
        branches: &[
            ("Which words carry a technical sense that differs from casual usage?", "Specialist vocabulary can invert everyday meaning"),
            ("What surrounding context would change how this passage reads?", "The same sentence means different things in different settings"),
        ],
    },
    QuestionSet {
        root: "Where exactly do the boundaries of this claim begin and end?",
        branches: &[
            ("Under which conditions is this meant to hold, and where does it stop?", "Scope is rarely stated but always present"),
            ("What neighbouring idea is most easily confused with this one?", "Drawing the line sharpens both concepts"),
            ("How has the meaning of the central term shifted over the years?", "Words drift, and old meanings linger in new uses"),
        ],
    },
];

const GO_DEEPER_SETS: &[QuestionSet] = &[
    QuestionSet {
        root: "Which hidden mechanism does the real work behind what is described here?",
        branches: &[
            ("What sequence of causes leads from the starting point to the outcome?", "Tracing the chain reveals which links are load-bearing"),
            ("Which component could be removed before the whole thing stops working?", "Subtraction shows what is essential"),
            ("How does this behave when you zoom down to its smallest moving parts?", "Lower levels often contain the surprising detail"),
        ],
    },
    QuestionSet {
        root: "Which layers of complexity sit underneath the simple version told here?",
        branches: &[
            ("Which feedback loops keep this stable or push it out of balance?", "Self-reinforcing dynamics are easy to miss from outside"),
            ("Which second-order effects appear only after some time has passed?", "Delayed consequences often outweigh the immediate ones"),
        ],
    },
    QuestionSet {
        root: "Why did this end up working this way rather than some other way?",
        branches: &[
            ("Which constraints ruled out the alternatives that seem obvious today?", "Constraints explain the road not taken"),
            ("Which trade-offs were accepted to get the benefits described here?", "Every design pays for its strengths somewhere"),
            ("How did earlier choices lock in the form we see now?", "Path dependence shapes the present more than design does"),
        ],
    },
];

const CHALLENGE_SETS: &[QuestionSet] = &[
    QuestionSet {
        root: "What is the strongest case someone could make against this idea?",
        branches: &[
            ("Which observation would force us to abandon this claim if it turned up?", "A claim that cannot fail cannot be tested"),
            ("Who disagrees with this most sharply, and what is their best point?", "Steelmanning the other side reveals blind spots"),
            ("Under which conditions does the argument quietly stop holding?", "Edge cases expose the limits of any framework"),
        ],
    },
    QuestionSet {
        root: "Which biases could be shaping how this perspective is presented?",
        branches: &[
            ("Which evidence might have been left out because it did not fit?", "Selective evidence is the most common reasoning error"),
            ("What proof would a thoughtful skeptic require before accepting this?", "Raising the bar strengthens understanding"),
        ],
    },
    QuestionSet {
        root: "How do we know this is actually true rather than merely repeated often?",
        branches: &[
            ("Where did this claim originate, and has anyone checked it independently?", "Many familiar facts are unverified traditions"),
            ("How well could the opposite position be defended with the same evidence?", "Some debates have strong arguments on both sides"),
            ("Which single finding would change your mind about this claim?", "Naming the crux shows what really matters"),
        ],
    },
];

const APPLY_SETS: &[QuestionSet] = &[
    QuestionSet {
        root: "How could someone put this idea to work this week in ordinary life?",
        branches: &[
            ("What is the smallest first step that would test this in practice?", "Small experiments lower the barrier to action"),
            ("Which tools or resources would a beginner need before starting?", "Practice depends on concrete means"),
            ("Which mistakes do people usually make when they first try this?", "Borrowed mistakes are cheaper than your own"),
        ],
    },
    QuestionSet {
        root: "Which real-world problem becomes easier once this idea is understood?",
        branches: &[
            ("Which specific situation would show the value of this most clearly?", "Concrete scenarios make abstract ideas tangible"),
            ("How would you convince a practical skeptic that this is worth the effort?", "Explaining value forces clarity"),
        ],
    },
    QuestionSet {
        root: "How would a step-by-step plan for using this idea actually unfold?",
        branches: &[
            ("Which prerequisites need to be in place before the first step?", "Dependencies decide the order of work"),
            ("How would you measure whether the application is making a difference?", "Measurement turns theory into testable practice"),
            ("Which adjustments would different settings or people require?", "No method transfers unchanged"),
        ],
    },
];

const CONNECT_SETS: &[QuestionSet] = &[
    QuestionSet {
        root: "Which other fields wrestle with a problem shaped just like this one?",
        branches: &[
            ("Which pattern here reappears in a completely unrelated discipline?", "Shared structure across domains hints at something deep"),
            ("How does this fit with something you already understand well?", "New ideas anchor best to existing knowledge"),
            ("Which connection here would most people overlook on first reading?", "Non-obvious links often yield the richest insight"),
        ],
    },
    QuestionSet {
        root: "Which larger system does this idea belong to, and what sits next to it?",
        branches: &[
            ("What depends on this, and what does this in turn depend on?", "Mapping dependencies reveals system structure"),
            ("How would a change here ripple outward into connected areas?", "Interconnection means changes propagate"),
        ],
    },
    QuestionSet {
        root: "Which analogy captures the essence of this idea most faithfully?",
        branches: &[
            ("Which everyday experience mirrors the structure described here?", "Familiar analogies make complex ideas accessible"),
            ("Where does that analogy break down, and what does the break reveal?", "The limits of an analogy teach as much as its fit"),
            ("Which historical episode followed a similar arc to this one?", "History often rhymes in instructive ways"),
        ],
    },
];

const SURPRISE_SETS: &[QuestionSet] = &[
    QuestionSet {
        root: "Which part of this would most people find genuinely counterintuitive?",
        branches: &[
            ("Which detail here would surprise someone encountering it for the first time?", "Surprise marks a gap between perception and reality"),
            ("What happens if you flip the usual assumption here on its head?", "Inversion is a powerful thinking tool"),
            ("Which odd edge case reveals something fundamental about the whole?", "Edge cases illuminate core principles"),
        ],
    },
    QuestionSet {
        root: "How might this look completely different fifty years from now?",
        branches: &[
            ("Which current assumption about this will seem strange to future readers?", "Every era has blind spots visible only in hindsight"),
            ("Which emerging trend could quietly transform this over the next decade?", "Slow shifts are hard to notice and easy to underestimate"),
        ],
    },
    QuestionSet {
        root: "Where does this idea lead when followed all the way to its extreme?",
        branches: &[
            ("What follows if every practical constraint on this were removed?", "Thought experiments surface hidden implications"),
            ("Which paradox or contradiction is buried inside this idea?", "Paradoxes often point to deeper truths"),
            ("How would an observer from a very different culture read this?", "Radical perspective shifts break habitual thinking"),
        ],
    },
];

const ANSWERS: &[(&str, &[&str])] = &[
    (
        "The core of this lies in several layers that reinforce one another rather than a single cause.",
        &[
            "The familiar explanation covers only the most visible layer",
            "Feedback between the layers gives stability and also resists change",
            "The history of the idea explains why it took this particular form",
            "Applying it well means adapting the principle to local conditions",
        ],
    ),
    (
        "What looks simple here turns out to be several interacting processes.",
        &[
            "A single label hides processes that can be separated and studied",
            "The most influential factor is often the least discussed one",
            "Independent lines of evidence point toward the same conclusion",
            "The consequences reach well beyond the field where this was first noticed",
        ],
    ),
    (
        "The real value is in how this reframes the questions worth asking.",
        &[
            "A new framing makes previously invisible options visible",
            "The approach has held up across quite different contexts",
            "Confusing correlation with cause is the most common misreading",
            "Habits of thought, not missing knowledge, are the main barrier",
        ],
    ),
    (
        "Recent work has shifted how specialists think about this topic.",
        &[
            "The older model was useful but left out important nuance",
            "Several careful studies settled questions that had been open for years",
            "The revised picture has direct consequences for practice",
        ],
    ),
];

const BRANCHES_FROM_QUESTION: &[&[(&str, &str)]] = &[
    &[
        ("Which assumptions are already built into the way this question is asked?", "Questions shape the answers we find"),
        ("How would a specialist from a distant field rephrase this question?", "Cross-disciplinary framing reveals blind spots"),
        ("Which simpler question has to be settled before this one?", "Hard questions often decompose into easier parts"),
    ],
    &[
        ("Why has this question resisted a satisfying answer for so long?", "Persistent questions usually hide structural barriers"),
        ("What changes when we ask the exact opposite of this question?", "Inversion exposes what the original framing took for granted"),
    ],
    &[
        ("Which observations would let us answer this with real confidence?", "Naming the evidence needed sharpens the inquiry"),
        ("Who would be best placed to answer this, and what would they see?", "Mapping expertise reveals knowledge gaps"),
        ("How does the framing of this question narrow the possible answers?", "Frames decide conclusions more than we notice"),
    ],
];

const BRANCHES_FROM_ANSWER: &[&[(&str, &str)]] = &[
    &[
        ("Which of these points rests on the strongest evidence, and why?", "Claims inside one answer are rarely equally supported"),
        ("Which practical experiment could put the main claim to the test?", "Testability separates speculation from knowledge"),
        ("How would this answer change if its central assumption were wrong?", "Sensitivity reveals robustness"),
    ],
    &[
        ("Which important implication follows from this without being stated?", "Unstated conclusions are often the most interesting"),
        ("Where does this explanation skip over complexity it should address?", "Gaps in explanations mark unsolved problems"),
    ],
    &[
        ("How does this answer differ from what you expected before reading it?", "Violated expectations drive the deepest learning"),
        ("Which follow-up evidence would raise your confidence in this answer?", "Calibrating confidence means knowing what is missing"),
        ("What gets lost when this answer is compressed into one sentence?", "Compression reveals what we treat as essential"),
    ],
];
