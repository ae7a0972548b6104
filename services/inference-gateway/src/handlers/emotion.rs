//! Facial emotion classification over a preprocessed 48x48 grayscale crop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use vdoc_core::{CacheLayer, KeyArgs, Memoized, ResourceRegistry, ServiceError, ToKeyArgs};

use super::{model, observe, ranked, MemoFn};

pub const MODEL: &str = "emotion";
pub const IMAGE_SIDE: usize = 48;
pub const EMOTIONS: [&str; 7] = ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];
const TOP_N: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GrayImage {
    #[serde(default)]
    pub name: Option<String>,
    pub pixels: Vec<u8>,
}

impl ToKeyArgs for GrayImage {
    fn key_args(&self) -> KeyArgs { KeyArgs::new().arg(&self.pixels) }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub image: Option<GrayImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchDetectRequest {
    #[serde(default)]
    pub images: Option<Vec<GrayImage>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub emotion: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionResult {
    pub emotion: String,
    pub confidence: f32,
    pub all_emotions: BTreeMap<String, f32>,
    pub top_emotions: Vec<EmotionScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub image_name: Option<String>,
    #[serde(flatten)]
    pub result: EmotionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEmotionResponse {
    pub results: Vec<BatchItem>,
}

pub struct EmotionDetector {
    memo: Memoized<MemoFn<GrayImage, EmotionResult>>,
}

impl EmotionDetector {
    pub fn new(registry: Arc<ResourceRegistry>, cache: &Arc<CacheLayer>) -> Self {
        let run: MemoFn<GrayImage, EmotionResult> = Box::new(move |image: &GrayImage| classify(&registry, image));
        Self { memo: cache.memoize("emotion.detect", None, run) }
    }

    pub fn detect(&self, req: &DetectRequest) -> Result<EmotionResult, ServiceError> {
        observe("emotion.detect", || {
            let image = req.image.as_ref().ok_or_else(|| ServiceError::missing("Image is required"))?;
            self.run(image)
        })
    }

    pub fn batch_detect(&self, req: &BatchDetectRequest) -> Result<BatchEmotionResponse, ServiceError> {
        observe("emotion.batch_detect", || {
            let images = req.images.as_ref().filter(|i| !i.is_empty()).ok_or_else(|| ServiceError::missing("Images are required"))?;
            let results = images
                .iter()
                .map(|image| Ok(BatchItem { image_name: image.name.clone(), result: self.run(image)? }))
                .collect::<Result<Vec<_>, ServiceError>>()?;
            Ok(BatchEmotionResponse { results })
        })
    }

    fn run(&self, image: &GrayImage) -> Result<EmotionResult, ServiceError> {
        let expected = IMAGE_SIDE * IMAGE_SIDE;
        if image.pixels.len() != expected {
            return Err(ServiceError::invalid(format!("image must be {IMAGE_SIDE}x{IMAGE_SIDE} grayscale ({expected} pixels), got {}", image.pixels.len())));
        }
        self.memo.call(image)
    }
}

fn classify(registry: &ResourceRegistry, image: &GrayImage) -> Result<EmotionResult, ServiceError> {
    let model = model(registry, MODEL)?;
    let input: Vec<f32> = image.pixels.iter().map(|&p| f32::from(p) / 255.0).collect();
    let scores = model.predict(&input)?;
    let info = model.info();
    let labels: Vec<String> = if info.labels.is_empty() { EMOTIONS.iter().map(|s| s.to_string()).collect() } else { info.labels };
    summarize(&labels, &scores)
}

fn summarize(labels: &[String], scores: &[f32]) -> Result<EmotionResult, ServiceError> {
    if scores.len() != labels.len() || scores.is_empty() {
        return Err(anyhow::anyhow!("emotion model returned {} scores for {} labels", scores.len(), labels.len()).into());
    }
    let order = ranked(scores);
    let best = order[0];
    Ok(EmotionResult {
        emotion: labels[best].clone(),
        confidence: scores[best],
        all_emotions: labels.iter().cloned().zip(scores.iter().copied()).collect(),
        top_emotions: order.iter().take(TOP_N).map(|&i| EmotionScore { emotion: labels[i].clone(), score: scores[i] }).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_picks_argmax_and_top_three() {
        let labels: Vec<String> = EMOTIONS.iter().map(|s| s.to_string()).collect();
        let r = summarize(&labels, &[0.05, 0.05, 0.1, 0.5, 0.2, 0.05, 0.05]).unwrap();
        assert_eq!(r.emotion, "happy");
        assert_eq!(r.top_emotions.iter().map(|s| s.emotion.as_str()).collect::<Vec<_>>(), vec!["happy", "sad", "fear"]);
        assert_eq!(r.all_emotions.len(), 7);
    }

    #[test]
    fn label_mismatch_is_a_computation_error() {
        let err = summarize(&["a".to_string()], &[0.5, 0.5]).unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
