use super::reports::{AnswerVerification, QualityAnalysis, TopicRelevance};
use super::scoring::LetterGrade;

const MAX_ERRORS_SHOWN: usize = 3;
const MAX_KEY_POINTS_SHOWN: usize = 3;
const MAX_TIPS_SHOWN: usize = 2;

pub(crate) struct FeedbackInput<'a> {
    pub(crate) composite: u8,
    pub(crate) grade: LetterGrade,
    pub(crate) score: u32,
    pub(crate) max_points: u32,
    pub(crate) verification: &'a AnswerVerification,
    pub(crate) relevance: &'a TopicRelevance,
    pub(crate) quality: &'a QualityAnalysis,
}

/// Student-facing feedback text. Sections are separated by a blank line.
pub(crate) fn build_feedback(input: &FeedbackInput<'_>) -> String {
    let mut lines = vec![
        verdict_banner(input),
        format!(
            "Score: {}/{} ({}, {}%)",
            input.score,
            input.max_points,
            input.grade.as_str(),
            input.composite
        ),
    ];

    push_section(&mut lines, "Factual errors to fix:", &input.verification.wrong_facts, MAX_ERRORS_SHOWN);
    push_section(
        &mut lines,
        "What you covered well:",
        &input.verification.key_points_covered,
        MAX_KEY_POINTS_SHOWN,
    );
    push_section(
        &mut lines,
        "Key points that are missing:",
        &input.verification.key_points_missing,
        MAX_KEY_POINTS_SHOWN,
    );
    push_section(&mut lines, "Tips for next time:", &input.quality.improvements, MAX_TIPS_SHOWN);

    lines.push(String::new());
    lines.push(encouragement(input.composite).to_string());
    lines.join("\n")
}

fn verdict_banner(input: &FeedbackInput<'_>) -> String {
    if input.relevance.is_relevant == Some(false) {
        return match input.relevance.detected_topic.as_str() {
            "" => "⚠️ Your answer does not address the assignment topic.".to_string(),
            topic => format!("⚠️ Your answer seems to be about {topic}, not the assignment topic."),
        };
    }
    if input.verification.is_correct == Some(false) {
        return "❌ Your answer contains significant mistakes.".to_string();
    }
    match input.composite {
        80.. => "✅ Excellent work! Your answer is accurate and well presented.".to_string(),
        60..=79 => "👍 Good answer with room to improve.".to_string(),
        _ => "📝 Your answer needs more work.".to_string(),
    }
}

fn push_section(lines: &mut Vec<String>, heading: &str, items: &[String], limit: usize) {
    if items.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(heading.to_string());
    lines.extend(items.iter().take(limit).map(|item| format!("- {item}")));
}

fn encouragement(composite: u8) -> &'static str {
    match composite {
        0..=39 => "Don't give up! Review the material and try again.",
        40..=59 => "You're making progress. Focus on the missing points above.",
        60..=79 => "Good effort! A little more depth will take you further.",
        _ => "Outstanding! Keep up the great work.",
    }
}
