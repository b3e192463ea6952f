//! Deterministic guardrails applied on top of the oracle's raw scores.

use serde::Serialize;

use super::reports::{AnswerVerification, OriginalityCheck, TopicRelevance};

/// Rubric weights in percent: accuracy, relevance, quality, originality.
const WEIGHTS: [u32; 4] = [50, 25, 15, 10];

const INCORRECT_THRESHOLD: u8 = 30;
const INCORRECT_CAP: u8 = 25;
const OFF_TOPIC_RELEVANCE_CAP: u8 = 30;
const OFF_TOPIC_ACCURACY_CAP: u8 = 40;
const WRONG_FACT_PENALTY: usize = 10;
const MAX_WRONG_FACT_PENALTY: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct SubScores {
    pub(crate) accuracy: u8,
    pub(crate) relevance: u8,
    pub(crate) quality: u8,
    pub(crate) originality: u8,
}

pub(crate) fn apply_penalties(
    raw: SubScores,
    verification: &AnswerVerification,
    relevance: &TopicRelevance,
) -> SubScores {
    let mut scores = raw;

    if verification.is_correct == Some(false) && scores.accuracy < INCORRECT_THRESHOLD {
        scores.accuracy = scores.accuracy.min(INCORRECT_CAP);
    }

    if relevance.is_relevant == Some(false) {
        scores.relevance = scores.relevance.min(OFF_TOPIC_RELEVANCE_CAP);
        scores.accuracy = scores.accuracy.min(OFF_TOPIC_ACCURACY_CAP);
    }

    let penalty = (verification.wrong_facts.len() * WRONG_FACT_PENALTY).min(MAX_WRONG_FACT_PENALTY);
    scores.accuracy = scores.accuracy.saturating_sub(penalty as u8);

    scores
}

/// Weighted composite, rounded half up.
pub(crate) fn composite_score(scores: SubScores) -> u8 {
    let weighted = WEIGHTS[0] * u32::from(scores.accuracy)
        + WEIGHTS[1] * u32::from(scores.relevance)
        + WEIGHTS[2] * u32::from(scores.quality)
        + WEIGHTS[3] * u32::from(scores.originality);
    ((weighted + 50) / 100).min(100) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LetterGrade {
    APlus,
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    F,
}

const BREAKPOINTS: [(u8, LetterGrade); 11] = [
    (90, LetterGrade::APlus),
    (85, LetterGrade::A),
    (80, LetterGrade::AMinus),
    (75, LetterGrade::BPlus),
    (70, LetterGrade::B),
    (65, LetterGrade::BMinus),
    (60, LetterGrade::CPlus),
    (55, LetterGrade::C),
    (50, LetterGrade::CMinus),
    (45, LetterGrade::DPlus),
    (40, LetterGrade::D),
];

impl LetterGrade {
    pub(crate) fn from_score(score: u8) -> Self {
        BREAKPOINTS
            .iter()
            .find(|(floor, _)| score >= *floor)
            .map(|(_, grade)| *grade)
            .unwrap_or(Self::F)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::AMinus => "A-",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::BMinus => "B-",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::CMinus => "C-",
            Self::DPlus => "D+",
            Self::D => "D",
            Self::F => "F",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        BREAKPOINTS
            .iter()
            .map(|(_, grade)| *grade)
            .chain(std::iter::once(Self::F))
            .find(|grade| grade.as_str().eq_ignore_ascii_case(value))
    }

    /// Grade for `points` out of `max_points`, using the percentage bands.
    pub(crate) fn for_points(points: u32, max_points: u32) -> Self {
        if max_points == 0 {
            return Self::F;
        }
        let percent = (u64::from(points) * 100 + u64::from(max_points) / 2) / u64::from(max_points);
        Self::from_score(u8::try_from(percent.min(100)).unwrap_or(100))
    }
}

impl Serialize for LetterGrade {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Points earned out of `max_points`, rounded half up.
pub(crate) fn point_score(composite: u8, max_points: u32) -> u32 {
    let points = (u64::from(composite) * u64::from(max_points) + 50) / 100;
    u32::try_from(points).unwrap_or(max_points)
}

/// How much of the primary evidence came back with a score.
pub(crate) fn confidence(accuracy: Option<u8>, relevance: Option<u8>, quality: Option<u8>) -> u8 {
    let total = [(accuracy, 35u8), (relevance, 35), (quality, 30)]
        .iter()
        .filter(|(score, _)| score.is_some())
        .map(|(_, weight)| *weight)
        .sum::<u8>();
    total.min(100)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum FlagKind {
    IncorrectAnswer,
    FactualErrors,
    OffTopic,
    OriginalityConcern,
    MalformedResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct GradingFlag {
    #[serde(rename = "type")]
    pub(crate) kind: FlagKind,
    pub(crate) severity: Severity,
    pub(crate) message: String,
}

impl GradingFlag {
    fn new(kind: FlagKind, severity: Severity, message: impl Into<String>) -> Self {
        Self { kind, severity, message: message.into() }
    }
}

pub(crate) fn build_flags(
    scores: SubScores,
    verification: &AnswerVerification,
    relevance: &TopicRelevance,
    originality: &OriginalityCheck,
    malformed_stages: &[&str],
) -> Vec<GradingFlag> {
    let mut flags = Vec::new();

    if verification.is_correct == Some(false) {
        let severity = if scores.accuracy < 30 { Severity::Critical } else { Severity::High };
        flags.push(GradingFlag::new(
            FlagKind::IncorrectAnswer,
            severity,
            "The answer was judged incorrect",
        ));
    }

    if !verification.wrong_facts.is_empty() {
        let count = verification.wrong_facts.len();
        let noun = if count == 1 { "factual error" } else { "factual errors" };
        flags.push(GradingFlag::new(
            FlagKind::FactualErrors,
            Severity::High,
            format!("{count} {noun} detected"),
        ));
    }

    if relevance.is_relevant == Some(false) {
        let severity = if scores.relevance < 20 { Severity::Critical } else { Severity::High };
        let message = if relevance.detected_topic.is_empty() {
            "The answer does not address the assignment topic".to_string()
        } else {
            format!("The answer appears to be about {}", relevance.detected_topic)
        };
        flags.push(GradingFlag::new(FlagKind::OffTopic, severity, message));
    }

    if originality.is_original == Some(false) {
        let message = originality
            .concerns
            .first()
            .cloned()
            .unwrap_or_else(|| "The answer may not be original work".to_string());
        flags.push(GradingFlag::new(FlagKind::OriginalityConcern, Severity::Medium, message));
    }

    for stage in malformed_stages {
        flags.push(GradingFlag::new(
            FlagKind::MalformedResponse,
            Severity::Low,
            format!("No structured {stage} report; defaults were used"),
        ));
    }

    flags
}
