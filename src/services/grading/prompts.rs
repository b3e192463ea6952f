use super::pipeline::{AssignmentContext, Stage};

const ANSWER_VERIFICATION_PROMPT: &str = r#"You are an experienced teacher checking a student's answer against the model answer and key points.
Judge factual accuracy only. Be strict about wrong facts but do not penalise wording.

Respond with a single JSON object and nothing else:
{
  "accuracyScore": <integer 0-100>,
  "isCorrect": <true|false>,
  "wrongFacts": ["each factually wrong statement"],
  "keyPointsCovered": ["key points the answer covers"],
  "keyPointsMissing": ["key points the answer misses"],
  "explanation": "short rationale"
}"#;

const TOPIC_RELEVANCE_PROMPT: &str = r#"You are an experienced teacher deciding whether a student's answer addresses the assignment topic.
Ignore correctness; judge only whether the answer is about the right subject.

Respond with a single JSON object and nothing else:
{
  "relevanceScore": <integer 0-100>,
  "isRelevant": <true|false>,
  "detectedTopic": "what the answer is actually about",
  "explanation": "short rationale"
}"#;

const QUALITY_ANALYSIS_PROMPT: &str = r#"You are an experienced teacher assessing the writing quality of a student's answer for the given class level.
Consider grammar, clarity and effort. Ignore factual accuracy.

Respond with a single JSON object and nothing else:
{
  "qualityScore": <integer 0-100>,
  "grammarScore": <integer 0-100>,
  "clarityScore": <integer 0-100>,
  "effortScore": <integer 0-100>,
  "strengths": ["what the student did well"],
  "improvements": ["concrete, encouraging improvement tips"]
}"#;

const ORIGINALITY_CHECK_PROMPT: &str = r#"You are an experienced teacher checking whether a student's answer looks like the student's own work.
Look for copied textbook passages, pasted generated text, or wording far beyond the class level.

Respond with a single JSON object and nothing else:
{
  "originalityScore": <integer 0-100>,
  "isOriginal": <true|false>,
  "concerns": ["specific originality concerns, empty if none"]
}"#;

pub(crate) fn system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::AnswerVerification => ANSWER_VERIFICATION_PROMPT,
        Stage::TopicRelevance => TOPIC_RELEVANCE_PROMPT,
        Stage::QualityAnalysis => QUALITY_ANALYSIS_PROMPT,
        Stage::OriginalityCheck => ORIGINALITY_CHECK_PROMPT,
    }
}

pub(crate) fn user_prompt(stage: Stage, assignment: &AssignmentContext, answer: &str) -> String {
    let mut prompt = format!(
        "Assignment: {}\nSubject: {}\nClass level: {}\n",
        assignment.title,
        assignment.subject,
        assignment.class_label.as_deref().unwrap_or("not specified"),
    );

    if matches!(stage, Stage::AnswerVerification) {
        if let Some(expected) = assignment.expected_answer.as_deref() {
            prompt.push_str(&format!("\nModel answer:\n{expected}\n"));
        }
        if !assignment.key_points.is_empty() {
            prompt.push_str("\nKey points:\n");
            for point in &assignment.key_points {
                prompt.push_str(&format!("- {point}\n"));
            }
        }
    }

    prompt.push_str(&format!("\nStudent answer:\n{answer}\n"));
    prompt
}
