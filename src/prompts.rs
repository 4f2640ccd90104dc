//! Prompt templates for the generative-language API.
//!
//! Every prompt opens with the same persona preamble, names the lens being
//! explored, and asks for a bare JSON payload that the remote generator
//! parses. Quality-gate retries append [`RETRY_INSTRUCTION`] to the
//! original prompt.

use crate::generation::{BranchType, PathType};

/// Persona shared by all prompts: exploratory, never directive.
pub const PERSONA_PREAMBLE: &str = "You are a curious companion helping someone wander through an idea. \
You never lecture, instruct or tell the reader what to conclude. You open doors: every question you \
write should invite the reader to look closer, compare, or doubt, and should leave room for more than \
one reasonable answer.";

/// Suffix appended to a prompt when its previous result failed a quality gate.
pub const RETRY_INSTRUCTION: &str = "\n\nIMPORTANT: Your previous response was too generic or too similar to existing questions. Be MORE SPECIFIC and EXPLORATORY, and add friction: each question should push against an assumption in the text. Do not start questions with 'What is' and do not write questions that can be answered with yes or no.";

/// Lens description for a path type.
pub fn path_description(path_type: PathType) -> &'static str {
    match path_type {
        PathType::Clarify => "Pin down what the text actually means. Separate terms that are being used loosely, surface hidden assumptions, and notice where a reader could misunderstand.",
        PathType::GoDeeper => "Dig into the mechanisms underneath. Follow chains of cause and effect, look for the parts that carry the load, and ask how and why it works at a more fundamental level.",
        PathType::Challenge => "Test how robust the claim is. Look for counterarguments, missing evidence, and the conditions under which the reasoning falls apart.",
        PathType::Apply => "Move from idea to practice. Look for concrete uses, first steps, and the obstacles someone would hit when acting on this.",
        PathType::Connect => "Place the idea in a wider web. Look for analogies, parallels in other fields, and the systems this idea depends on or influences.",
        PathType::Surprise => "Look for the counterintuitive. Find paradoxes, inversions, and implications that would unsettle conventional thinking.",
    }
}

/// One-shot example for a path type.
fn path_example(path_type: PathType) -> &'static str {
    match path_type {
        PathType::Clarify => r#"Example input: "Inflation quietly taxes people who hold cash."
Example output: { "rootQuestion": "In what sense does rising prices act like a tax when no government collects it?", "branches": [{ "question": "Who exactly counts as holding cash once bank deposits and wages are included?", "context": "The group affected is wider and less obvious than the phrase suggests" }, { "question": "Which meaning of 'quietly' matters here: unnoticed, unlegislated, or unavoidable?", "context": "Each reading points to a different policy debate" }] }"#,
        PathType::GoDeeper => r#"Example input: "Sleep helps consolidate memories."
Example output: { "rootQuestion": "Which processes during different sleep stages turn fragile experiences into lasting memories?", "branches": [{ "question": "How does replay of neural activity during deep sleep differ from what happens while dreaming?", "context": "Different stages appear to handle different kinds of memory" }, { "question": "Why would the brain postpone this work until the body is offline?", "context": "The timing hints at a trade-off between learning and acting" }] }"#,
        PathType::Challenge => r#"Example input: "Remote work makes teams more productive."
Example output: { "rootQuestion": "How was productivity measured in the studies behind this claim, and what did that leave out?", "branches": [{ "question": "Which kinds of work or teams show the opposite effect when studied carefully?", "context": "Average results can hide groups that are worse off" }, { "question": "How much of the reported gain disappears once longer hours are accounted for?", "context": "Output per hour and output per person tell different stories" }] }"#,
        PathType::Apply => r#"Example input: "Spaced repetition improves long-term recall."
Example output: { "rootQuestion": "How would a busy adult learning a language build spaced repetition into a normal week?", "branches": [{ "question": "Which tools make scheduling reviews effortless for someone starting from zero?", "context": "The method only works if reviews actually happen" }, { "question": "Where do learners usually abandon the practice, and how could that be prevented?", "context": "Dropout, not technique, is the common failure point" }] }"#,
        PathType::Connect => r#"Example input: "Forests share nutrients through fungal networks."
Example output: { "rootQuestion": "Where else do independent organisms rely on a shared underground infrastructure?", "branches": [{ "question": "How does this resemble the way cities share water and power grids?", "context": "Shared infrastructure creates both resilience and common risk" }, { "question": "What could economists learn from resource sharing between competing trees?", "context": "Cooperation among rivals is a puzzle in both fields" }] }"#,
        PathType::Surprise => r#"Example input: "Most of the universe is dark matter we cannot see."
Example output: { "rootQuestion": "How can we be confident about something we have never directly observed?", "branches": [{ "question": "Which everyday certainty rests on similarly indirect evidence?", "context": "Indirect inference is more common than it feels" }, { "question": "What would change in physics if the missing mass turned out to be an error in gravity itself?", "context": "The anomaly might be in our rules rather than our inventory" }] }"#,
    }
}

/// Prompt for a root question plus branches along a path.
pub fn build_path_questions_prompt(source_text: &str, path_type: PathType) -> String {
    format!(
        r#"{preamble}

LENS: "{path}": {description}

INSTRUCTIONS:
- Write exactly 1 root question and 2-3 branch questions
- Every question must be specific to the text below, never generic
- Questions must invite exploration, never a yes/no answer
- Branch questions should open different facets of the root question
- Each branch needs a "context" field saying why the question matters

{example}

TEXT:
"{source_text}"

Return ONLY valid JSON matching this schema, with no markdown fences and no preamble:
{{ "rootQuestion": "...", "branches": [{{ "question": "...", "context": "..." }}] }}"#,
        preamble = PERSONA_PREAMBLE,
        path = path_type.as_str(),
        description = path_description(path_type),
        example = path_example(path_type),
        source_text = source_text,
    )
}

/// Prompt for a JSON answer to a node's question.
pub fn build_answer_prompt(question: &str, source_text: &str) -> String {
    format!(
        r#"{preamble}

QUESTION: "{question}"

TEXT: "{source_text}"

INSTRUCTIONS:
- Open with a single-sentence summary of the key insight
- Follow with 3-4 bullet points that each add something new
- Stay concrete and evidence-based
- If the text is silent on something, say what is known and what is uncertain

Return ONLY valid JSON matching this schema, with no markdown fences and no preamble:
{{ "summary": "...", "bullets": ["...", "..."] }}"#,
        preamble = PERSONA_PREAMBLE,
        question = question,
        source_text = source_text,
    )
}

/// Prompt for a streamed, line-oriented answer.
pub fn build_streaming_answer_prompt(question: &str, source_text: &str) -> String {
    format!(
        r#"{preamble}

QUESTION: "{question}"

TEXT: "{source_text}"

Answer in this exact plain-text layout:
**One-sentence summary of the key insight**
- first point
- second point
- third point"#,
        preamble = PERSONA_PREAMBLE,
        question = question,
        source_text = source_text,
    )
}

/// Prompt for 2-3 follow-up questions from a node's question or answer.
pub fn build_branch_prompt(content: &str, branch_type: BranchType, source_text: &str) -> String {
    let (label, focus) = match branch_type {
        BranchType::Question => (
            "PARENT QUESTION",
            "Explore the question itself: the assumptions it carries, other ways to frame it, what must be known first, and what kind of answer would satisfy it.",
        ),
        BranchType::Answer => (
            "PARENT ANSWER",
            "Probe the claims in the answer: which need more evidence, what follows from them, what was left unsaid, and where the reasoning is weakest.",
        ),
    };

    format!(
        r#"{preamble}

{label}: "{content}"

TEXT: "{source_text}"

INSTRUCTIONS:
- {focus}
- Write exactly 2-3 follow-up questions
- Each must be narrower than the parent, never broader
- Never a yes/no question and never a rephrasing of the parent
- Each needs a "context" field saying why the follow-up matters

Return ONLY valid JSON matching this schema, with no markdown fences and no preamble:
[{{ "question": "...", "context": "..." }}]"#,
        preamble = PERSONA_PREAMBLE,
        label = label,
        content = content,
        source_text = source_text,
        focus = focus,
    )
}

/// Original prompt plus the fixed retry instruction.
pub fn append_retry_instruction(prompt: &str) -> String {
    format!("{}{}", prompt, RETRY_INSTRUCTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_prompt_embeds_lens_example_and_text() {
        let prompt = build_path_questions_prompt("Bees dance to share directions.", PathType::Connect);
        assert!(prompt.starts_with(PERSONA_PREAMBLE));
        assert!(prompt.contains("LENS: \"connect\""));
        assert!(prompt.contains(path_description(PathType::Connect)));
        assert!(prompt.contains("Example output"));
        assert!(prompt.contains("Bees dance to share directions."));
        assert!(prompt.contains(r#"{ "rootQuestion": "...""#));
    }

    #[test]
    fn test_branch_prompt_switches_on_branch_type() {
        let q = build_branch_prompt("Why?", BranchType::Question, "src");
        let a = build_branch_prompt("Because.", BranchType::Answer, "src");
        assert!(q.contains("PARENT QUESTION: \"Why?\""));
        assert!(a.contains("PARENT ANSWER: \"Because.\""));
    }

    #[test]
    fn test_retry_instruction_is_appended_once() {
        let base = build_answer_prompt("q", "t");
        let retried = append_retry_instruction(&base);
        assert!(retried.starts_with(&base));
        assert!(retried.ends_with(RETRY_INSTRUCTION));
    }
}
