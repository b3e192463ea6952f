//! Sub-reports returned by the oracle, one per grading stage.
//!
//! Oracle replies are loosely typed: scores arrive as numbers or strings,
//! verdicts as booleans or "yes"/"no", lists sometimes as a single string.
//! Every field is parsed leniently and missing fields take their default.
//! Keys may be camelCase or snake_case; when both spellings of a field are
//! present the camelCase one wins.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::services::oracle::extract_json_object;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct AnswerVerification {
    #[serde(deserialize_with = "score")]
    pub(crate) accuracy_score: Option<u8>,
    #[serde(deserialize_with = "verdict")]
    pub(crate) is_correct: Option<bool>,
    #[serde(deserialize_with = "string_list")]
    pub(crate) wrong_facts: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub(crate) key_points_covered: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub(crate) key_points_missing: Vec<String>,
    #[serde(deserialize_with = "text")]
    pub(crate) explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct TopicRelevance {
    #[serde(deserialize_with = "score")]
    pub(crate) relevance_score: Option<u8>,
    #[serde(deserialize_with = "verdict")]
    pub(crate) is_relevant: Option<bool>,
    #[serde(deserialize_with = "text")]
    pub(crate) detected_topic: String,
    #[serde(deserialize_with = "text")]
    pub(crate) explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct QualityAnalysis {
    #[serde(deserialize_with = "score")]
    pub(crate) quality_score: Option<u8>,
    #[serde(deserialize_with = "score")]
    pub(crate) grammar_score: Option<u8>,
    #[serde(deserialize_with = "score")]
    pub(crate) clarity_score: Option<u8>,
    #[serde(deserialize_with = "score")]
    pub(crate) effort_score: Option<u8>,
    #[serde(deserialize_with = "string_list")]
    pub(crate) strengths: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub(crate) improvements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct OriginalityCheck {
    #[serde(deserialize_with = "score")]
    pub(crate) originality_score: Option<u8>,
    #[serde(deserialize_with = "verdict")]
    pub(crate) is_original: Option<bool>,
    #[serde(deserialize_with = "string_list")]
    pub(crate) concerns: Vec<String>,
}

/// A parsed sub-report, or its default when the reply held no usable object.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Parsed<T> {
    pub(crate) report: T,
    pub(crate) malformed: bool,
}

pub(crate) fn parse_report<T>(reply: &str) -> Parsed<T>
where
    T: DeserializeOwned + Default,
{
    let parsed = extract_json_object(reply)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .and_then(|value| serde_json::from_value::<T>(camel_case_keys(value)).ok());
    match parsed {
        Some(report) => Parsed { report, malformed: false },
        None => Parsed { report: T::default(), malformed: true },
    }
}

fn camel_case_keys(value: Value) -> Value {
    let Value::Object(fields) = value else {
        return value;
    };

    let mut normalized = Map::with_capacity(fields.len());
    for (key, field) in fields {
        let camel = to_camel_case(&key);
        if camel == key || !normalized.contains_key(&camel) {
            normalized.insert(camel, field);
        }
    }
    Value::Object(normalized)
}

fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let number = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(raw)) => raw.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    Ok(number.filter(|value| value.is_finite()).map(|value| value.round().clamp(0.0, 100.0) as u8))
}

fn verdict<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::String(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect(),
        Some(Value::String(text)) if !text.trim().is_empty() => vec![text.trim().to_string()],
        _ => Vec::new(),
    })
}

fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}
