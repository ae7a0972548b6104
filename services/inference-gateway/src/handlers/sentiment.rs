//! Text sentiment: a positive-class score from the `sentiment` model.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vdoc_core::{CacheLayer, Memoized, ResourceRegistry, ServiceError};

use super::{model, observe, MemoFn};
use crate::text::{hashed_term_frequencies, preprocess};

pub const MODEL: &str = "sentiment";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchAnalyzeRequest {
    #[serde(default)]
    pub texts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment { Positive, Negative }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub raw_score: f32,
}

impl SentimentResult {
    pub fn from_score(raw_score: f32) -> Self {
        if raw_score > 0.5 {
            Self { sentiment: Sentiment::Positive, confidence: raw_score, raw_score }
        } else {
            Self { sentiment: Sentiment::Negative, confidence: 1.0 - raw_score, raw_score }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub text: String,
    #[serde(flatten)]
    pub result: SentimentResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSentimentResponse {
    pub results: Vec<BatchItem>,
}

pub struct SentimentAnalyzer {
    memo: Memoized<MemoFn<str, SentimentResult>>,
}

impl SentimentAnalyzer {
    pub fn new(registry: Arc<ResourceRegistry>, cache: &Arc<CacheLayer>) -> Self {
        let score: MemoFn<str, SentimentResult> = Box::new(move |text: &str| score_text(&registry, text));
        Self { memo: cache.memoize("sentiment.analyze", None, score) }
    }

    pub fn analyze(&self, req: &AnalyzeRequest) -> Result<SentimentResult, ServiceError> {
        observe("sentiment.analyze", || {
            let text = req.text.as_deref().filter(|t| !t.is_empty()).ok_or_else(|| ServiceError::missing("Text input is required"))?;
            self.memo.call(text)
        })
    }

    pub fn batch_analyze(&self, req: &BatchAnalyzeRequest) -> Result<BatchSentimentResponse, ServiceError> {
        observe("sentiment.batch_analyze", || {
            let texts = req.texts.as_ref().filter(|t| !t.is_empty()).ok_or_else(|| ServiceError::missing("List of texts is required"))?;
            let results = texts
                .iter()
                .map(|text| Ok(BatchItem { text: text.clone(), result: self.memo.call(text.as_str())? }))
                .collect::<Result<Vec<_>, ServiceError>>()?;
            Ok(BatchSentimentResponse { results })
        })
    }
}

/// Single-output models give the positive score directly; two-output models are
/// `[negative, positive]`.
fn score_text(registry: &ResourceRegistry, text: &str) -> Result<SentimentResult, ServiceError> {
    let model = model(registry, MODEL)?;
    let info = model.info();
    let features = hashed_term_frequencies(&preprocess(text), info.input_dim);
    let out = model.predict(&features)?;
    let raw = match out.as_slice() {
        [score] => *score,
        [_, positive] => *positive,
        other => return Err(anyhow::anyhow!("sentiment model returned {} outputs", other.len()).into()),
    };
    Ok(SentimentResult::from_score(raw))
}
