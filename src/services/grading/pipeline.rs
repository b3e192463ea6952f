use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::feedback::{build_feedback, FeedbackInput};
use super::prompts;
use super::reports::{
    parse_report, AnswerVerification, OriginalityCheck, Parsed, QualityAnalysis, TopicRelevance,
};
use super::scoring::{
    apply_penalties, build_flags, composite_score, confidence, point_score, GradingFlag,
    LetterGrade, SubScores,
};
use crate::services::oracle::{OracleError, OracleRequest, TextOracle};

/// Assignment fields the pipeline grades against.
#[derive(Debug, Clone)]
pub(crate) struct AssignmentContext {
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) expected_answer: Option<String>,
    pub(crate) key_points: Vec<String>,
    pub(crate) max_points: u32,
    pub(crate) class_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Stage {
    AnswerVerification,
    TopicRelevance,
    QualityAnalysis,
    OriginalityCheck,
}

impl Stage {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::AnswerVerification => "answer_verification",
            Self::TopicRelevance => "topic_relevance",
            Self::QualityAnalysis => "quality_analysis",
            Self::OriginalityCheck => "originality_check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("not enough content to grade (at least {min_chars} characters required)")]
    InsufficientContent { min_chars: usize },
    #[error("assignment cannot be graded automatically: {0}")]
    InvalidAssignment(&'static str),
    #[error("{} failed: {source}", stage.as_str())]
    Oracle {
        stage: Stage,
        #[source]
        source: OracleError,
    },
    #[error("grading did not finish within {seconds} seconds")]
    DeadlineExceeded { seconds: u64 },
}

impl GradingError {
    /// Marker stored on the submission for teacher follow-up.
    pub(crate) fn flag_reason(&self) -> &'static str {
        match self {
            Self::InsufficientContent { .. } => "insufficient_content",
            Self::InvalidAssignment(_) => "invalid_assignment",
            Self::Oracle { .. } | Self::DeadlineExceeded { .. } => "grading_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScoreCard {
    pub(crate) content_accuracy: u8,
    pub(crate) uniqueness: u8,
    pub(crate) relevance: u8,
    pub(crate) quality: u8,
    pub(crate) overall: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Analysis {
    pub(crate) is_correct: Option<bool>,
    pub(crate) wrong_facts: Vec<String>,
    pub(crate) key_points_covered: Vec<String>,
    pub(crate) key_points_missing: Vec<String>,
    pub(crate) strengths: Vec<String>,
    pub(crate) improvements: Vec<String>,
    pub(crate) topic_match: Option<bool>,
    pub(crate) detected_topic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AiGrading {
    pub(crate) is_graded: bool,
    pub(crate) scores: ScoreCard,
    pub(crate) analysis: Analysis,
    pub(crate) flags: Vec<GradingFlag>,
    pub(crate) confidence: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct GradingOutcome {
    pub(crate) grade: LetterGrade,
    pub(crate) score: u32,
    pub(crate) max_points: u32,
    pub(crate) feedback: String,
    pub(crate) ai_grading: AiGrading,
}

pub(crate) struct GradingPipeline {
    oracle: Arc<dyn TextOracle>,
    mode: ExecutionMode,
    min_content_chars: usize,
}

impl GradingPipeline {
    pub(crate) fn new(
        oracle: Arc<dyn TextOracle>,
        mode: ExecutionMode,
        min_content_chars: usize,
    ) -> Self {
        Self { oracle, mode, min_content_chars }
    }

    pub(crate) async fn grade(
        &self,
        answer: &str,
        assignment: &AssignmentContext,
    ) -> Result<GradingOutcome, GradingError> {
        self.check_gradable(answer, assignment)?;
        let answer = answer.trim();

        let (verification, relevance, quality, originality) = match self.mode {
            ExecutionMode::Sequential => {
                let verification: Parsed<AnswerVerification> =
                    self.ask(Stage::AnswerVerification, assignment, answer).await?;
                let relevance: Parsed<TopicRelevance> =
                    self.ask(Stage::TopicRelevance, assignment, answer).await?;
                let quality: Parsed<QualityAnalysis> =
                    self.ask(Stage::QualityAnalysis, assignment, answer).await?;
                let originality: Parsed<OriginalityCheck> =
                    self.ask(Stage::OriginalityCheck, assignment, answer).await?;
                (verification, relevance, quality, originality)
            }
            ExecutionMode::Parallel => {
                let (verification, relevance, quality, originality) = tokio::join!(
                    self.ask::<AnswerVerification>(Stage::AnswerVerification, assignment, answer),
                    self.ask::<TopicRelevance>(Stage::TopicRelevance, assignment, answer),
                    self.ask::<QualityAnalysis>(Stage::QualityAnalysis, assignment, answer),
                    self.ask::<OriginalityCheck>(Stage::OriginalityCheck, assignment, answer),
                );
                (verification?, relevance?, quality?, originality?)
            }
        };

        Ok(combine(assignment.max_points, verification, relevance, quality, originality))
    }

    fn check_gradable(
        &self,
        answer: &str,
        assignment: &AssignmentContext,
    ) -> Result<(), GradingError> {
        if assignment.title.trim().is_empty() {
            return Err(GradingError::InvalidAssignment("missing title"));
        }
        if assignment.max_points == 0 {
            return Err(GradingError::InvalidAssignment("max points must be positive"));
        }

        let meaningful = answer.chars().filter(|ch| !ch.is_whitespace()).count();
        if meaningful < self.min_content_chars.max(1) {
            return Err(GradingError::InsufficientContent { min_chars: self.min_content_chars });
        }
        Ok(())
    }

    async fn ask<T>(
        &self,
        stage: Stage,
        assignment: &AssignmentContext,
        answer: &str,
    ) -> Result<Parsed<T>, GradingError>
    where
        T: DeserializeOwned + Default,
    {
        let request = OracleRequest {
            system: prompts::system_prompt(stage).to_string(),
            user: prompts::user_prompt(stage, assignment, answer),
        };

        let reply = self
            .oracle
            .complete(request)
            .await
            .map_err(|source| GradingError::Oracle { stage, source })?;

        let parsed = parse_report::<T>(&reply);
        if parsed.malformed {
            tracing::warn!(
                stage = stage.as_str(),
                reply_chars = reply.len(),
                "Oracle reply had no usable JSON; using default report"
            );
        }
        Ok(parsed)
    }
}

fn combine(
    max_points: u32,
    verification: Parsed<AnswerVerification>,
    relevance: Parsed<TopicRelevance>,
    quality: Parsed<QualityAnalysis>,
    originality: Parsed<OriginalityCheck>,
) -> GradingOutcome {
    let malformed_stages: Vec<&str> = [
        (verification.malformed, "answer verification"),
        (relevance.malformed, "topic relevance"),
        (quality.malformed, "quality analysis"),
        (originality.malformed, "originality check"),
    ]
    .into_iter()
    .filter_map(|(malformed, name)| malformed.then_some(name))
    .collect();

    let (verification, relevance, quality, originality) =
        (verification.report, relevance.report, quality.report, originality.report);

    let raw = SubScores {
        accuracy: verification.accuracy_score.unwrap_or(0),
        relevance: relevance.relevance_score.unwrap_or(0),
        quality: quality.quality_score.unwrap_or(0),
        originality: originality.originality_score.unwrap_or(0),
    };
    let scores = apply_penalties(raw, &verification, &relevance);
    let composite = composite_score(scores);
    let grade = LetterGrade::from_score(composite);
    let score = point_score(composite, max_points);
    let flags = build_flags(scores, &verification, &relevance, &originality, &malformed_stages);
    let confidence = confidence(
        verification.accuracy_score,
        relevance.relevance_score,
        quality.quality_score,
    );

    let feedback = build_feedback(&FeedbackInput {
        composite,
        grade,
        score,
        max_points,
        verification: &verification,
        relevance: &relevance,
        quality: &quality,
    });

    let detected_topic =
        Some(relevance.detected_topic.clone()).filter(|topic| !topic.is_empty());

    GradingOutcome {
        grade,
        score,
        max_points,
        feedback,
        ai_grading: AiGrading {
            is_graded: true,
            scores: ScoreCard {
                content_accuracy: scores.accuracy,
                uniqueness: scores.originality,
                relevance: scores.relevance,
                quality: scores.quality,
                overall: composite,
            },
            analysis: Analysis {
                is_correct: verification.is_correct,
                wrong_facts: verification.wrong_facts,
                key_points_covered: verification.key_points_covered,
                key_points_missing: verification.key_points_missing,
                strengths: quality.strengths,
                improvements: quality.improvements,
                topic_match: relevance.is_relevant,
                detected_topic,
            },
            flags,
            confidence,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grading::scoring::FlagKind;
    use crate::test_support::{sample_assignment, ScriptedOracle};

    const ANSWER: &str = "Water evaporates, condenses into clouds and falls as rain.";

    fn scripted_perfect() -> ScriptedOracle {
        ScriptedOracle::new()
            .reply(
                Stage::AnswerVerification,
                r#"{"accuracyScore": 95, "isCorrect": true, "keyPointsCovered": ["evaporation", "condensation"]}"#,
            )
            .reply(Stage::TopicRelevance, r#"{"relevanceScore": 95, "isRelevant": true}"#)
            .reply(
                Stage::QualityAnalysis,
                r#"Here you go: {"qualityScore": 90, "strengths": ["clear"], "improvements": ["add an example"]}"#,
            )
            .reply(Stage::OriginalityCheck, r#"{"originalityScore": 80, "isOriginal": true}"#)
    }

    #[tokio::test]
    async fn matching_answer_earns_a_plus() {
        let oracle = Arc::new(scripted_perfect());
        let pipeline = GradingPipeline::new(oracle.clone(), ExecutionMode::Sequential, 10);

        let outcome = pipeline.grade(ANSWER, &sample_assignment()).await.expect("outcome");

        assert_eq!(outcome.ai_grading.scores.overall, 93);
        assert_eq!(outcome.grade, LetterGrade::APlus);
        assert_eq!(outcome.score, 9);
        assert_eq!(outcome.ai_grading.confidence, 100);
        assert!(outcome.ai_grading.flags.is_empty());
        assert!(outcome.feedback.starts_with("✅"));
        assert_eq!(oracle.calls(), 4);
    }

    #[tokio::test]
    async fn off_topic_answer_fails() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .reply(Stage::AnswerVerification, r#"{"accuracyScore": 20, "isCorrect": false}"#)
                .reply(
                    Stage::TopicRelevance,
                    r#"{"relevanceScore": 10, "isRelevant": false, "detectedTopic": "football"}"#,
                )
                .reply(Stage::QualityAnalysis, r#"{"qualityScore": 50}"#)
                .reply(Stage::OriginalityCheck, r#"{"originalityScore": 60, "isOriginal": true}"#),
        );
        let pipeline = GradingPipeline::new(oracle, ExecutionMode::Parallel, 10);

        let outcome = pipeline.grade(ANSWER, &sample_assignment()).await.expect("outcome");

        let scores = &outcome.ai_grading.scores;
        assert_eq!((scores.content_accuracy, scores.relevance), (20, 10));
        assert_eq!(scores.overall, 26);
        assert_eq!(outcome.grade, LetterGrade::F);
        assert_eq!(outcome.ai_grading.analysis.topic_match, Some(false));
        assert_eq!(outcome.ai_grading.analysis.detected_topic.as_deref(), Some("football"));

        let kinds: Vec<FlagKind> = outcome.ai_grading.flags.iter().map(|flag| flag.kind).collect();
        assert_eq!(kinds, vec![FlagKind::IncorrectAnswer, FlagKind::OffTopic]);
    }

    #[tokio::test]
    async fn malformed_reply_uses_defaults_and_is_flagged() {
        let oracle = Arc::new(
            scripted_perfect().reply(Stage::QualityAnalysis, "Sorry, I can't help with that."),
        );
        let pipeline = GradingPipeline::new(oracle, ExecutionMode::Sequential, 10);

        let outcome = pipeline.grade(ANSWER, &sample_assignment()).await.expect("outcome");

        assert_eq!(outcome.ai_grading.scores.quality, 0);
        // 50*95 + 25*95 + 15*0 + 10*80 = 7925
        assert_eq!(outcome.ai_grading.scores.overall, 79);
        assert_eq!(outcome.ai_grading.confidence, 70);
        assert_eq!(outcome.ai_grading.flags.len(), 1);
        assert_eq!(outcome.ai_grading.flags[0].kind, FlagKind::MalformedResponse);
    }

    #[tokio::test]
    async fn oracle_failure_names_the_stage() {
        let oracle = Arc::new(scripted_perfect().fail(Stage::OriginalityCheck, 503));
        let pipeline = GradingPipeline::new(oracle, ExecutionMode::Sequential, 10);

        let err = pipeline.grade(ANSWER, &sample_assignment()).await.unwrap_err();

        assert!(matches!(err, GradingError::Oracle { stage: Stage::OriginalityCheck, .. }));
        assert_eq!(err.flag_reason(), "grading_error");
    }

    #[tokio::test]
    async fn short_answer_is_rejected_before_any_call() {
        let oracle = Arc::new(scripted_perfect());
        let pipeline = GradingPipeline::new(oracle.clone(), ExecutionMode::Sequential, 10);

        let err = pipeline.grade("  too   short ", &sample_assignment()).await.unwrap_err();

        assert!(matches!(err, GradingError::InsufficientContent { min_chars: 10 }));
        assert_eq!(err.flag_reason(), "insufficient_content");
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn assignment_without_points_is_rejected() {
        let oracle = Arc::new(scripted_perfect());
        let pipeline = GradingPipeline::new(oracle.clone(), ExecutionMode::Sequential, 10);
        let mut assignment = sample_assignment();
        assignment.max_points = 0;

        let err = pipeline.grade(ANSWER, &assignment).await.unwrap_err();

        assert!(matches!(err, GradingError::InvalidAssignment(_)));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn serialized_grading_uses_external_field_names() {
        let pipeline =
            GradingPipeline::new(Arc::new(scripted_perfect()), ExecutionMode::Sequential, 10);
        let outcome = pipeline.grade(ANSWER, &sample_assignment()).await.expect("outcome");

        let json = serde_json::to_value(&outcome.ai_grading).expect("json");

        assert_eq!(json["isGraded"], true);
        assert_eq!(json["scores"]["contentAccuracy"], 95);
        assert_eq!(json["scores"]["uniqueness"], 80);
        assert_eq!(json["analysis"]["keyPointsCovered"][1], "condensation");
        assert_eq!(json["analysis"]["topicMatch"], true);
    }
}
