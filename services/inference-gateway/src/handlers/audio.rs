//! Audio feature extraction. The `audio` model maps one fixed-length frame of samples
//! to a feature vector; a clip yields one vector per frame.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vdoc_core::{ResourceRegistry, ServiceError};

use super::{model, observe};

pub const MODEL: &str = "audio";
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub samples: Option<Vec<f32>>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFeatures {
    pub features: Vec<Vec<f32>>,
    pub duration: f64,
    pub sample_rate: u32,
}

pub struct AudioProcessor {
    registry: Arc<ResourceRegistry>,
}

impl AudioProcessor {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self { Self { registry } }

    pub fn process(&self, req: &ProcessRequest) -> Result<AudioFeatures, ServiceError> {
        observe("audio.process", || {
            let samples = req.samples.as_ref().filter(|s| !s.is_empty()).ok_or_else(|| ServiceError::missing("Audio file is required"))?;
            let sample_rate = req.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
            if sample_rate == 0 {
                return Err(ServiceError::invalid("sample_rate must be positive"));
            }
            let model = model(&self.registry, MODEL)?;
            let frame_len = model.info().input_dim;
            if frame_len == 0 {
                return Err(anyhow::anyhow!("audio model has no fixed input length").into());
            }
            let features = frames(samples, frame_len)
                .iter()
                .map(|frame| model.predict(frame).map_err(ServiceError::from))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AudioFeatures { features, duration: samples.len() as f64 / f64::from(sample_rate), sample_rate })
        })
    }
}

/// Split into `len`-sample frames, zero-padding the last.
fn frames(samples: &[f32], len: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(len)
        .map(|chunk| {
            let mut frame = chunk.to_vec();
            frame.resize(len, 0.0);
            frame
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_frame_is_padded() {
        let f = frames(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        assert_eq!(f, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 0.0]]);
    }
}
