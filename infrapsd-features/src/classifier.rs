//! Earthquake/background classification of feature vectors.

use crate::error::{ModelError, Result};
use crate::features::FeatureVector;
use eyre::WrapErr;
use ndarray::{Array1, Ix2};
use ndarray_stats::QuantileExt;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use ort::{inputs, value::Value};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Class order of the model's logits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Earthquake,
    Background,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Earthquake, Label::Background];
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Earthquake => write!(f, "earthquake"),
            Label::Background => write!(f, "background"),
        }
    }
}

/// Classifier decision with class probabilities in [`Label::ALL`] order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    pub probabilities: [f32; 2],
}

impl Prediction {
    /// Softmax over `[earthquake, background]` logits.
    pub fn from_logits(logits: [f32; 2]) -> Self {
        let max = logits[0].max(logits[1]);
        let exp = logits.map(|l| (l - max).exp());
        let total: f32 = exp.iter().sum();
        let probabilities = exp.map(|e| e / total);

        let label = Array1::from(probabilities.to_vec())
            .argmax()
            .map(|i| Label::ALL[i])
            .unwrap_or(Label::Background);

        Self {
            label,
            probabilities,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self.label {
            Label::Earthquake => self.probabilities[0],
            Label::Background => self.probabilities[1],
        }
    }
}

/// Binary classifier over assembled feature vectors.
pub trait Classifier {
    /// Classify one feature vector.
    ///
    /// Note: Takes `&mut self` because ONNX Runtime's Session::run requires it.
    fn predict(&mut self, features: &FeatureVector) -> Result<Prediction>;
}

/// ONNX classifier taking a `(1, len)` float input and producing `(1, 2)` logits.
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    pub fn new(session: Session) -> Self {
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".into());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output".into());

        Self {
            session,
            input_name,
            output_name,
        }
    }

    /// Load a model file with an optional custom session builder.
    pub fn from_file(path: impl AsRef<Path>, builder: Option<SessionBuilder>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let builder = match builder {
            Some(builder) => builder,
            None => Session::builder()?,
        };
        let session = builder
            .commit_from_file(path)
            .wrap_err_with(|| format!("failed to load classifier: {}", path.display()))?;

        tracing::debug!(model = %path.display(), "loaded classifier");
        Ok(Self::new(session))
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&mut self, features: &FeatureVector) -> Result<Prediction> {
        let input = features.clone().insert_axis(ndarray::Axis(0));
        let input = Value::from_array(input)?;

        let mut outputs = self
            .session
            .run(inputs!(self.input_name.as_str() => input))?;

        let logits = outputs
            .remove(&self.output_name)
            .ok_or_else(|| ModelError::MissingOutput {
                name: self.output_name.clone(),
            })?;

        let logits = logits
            .try_extract_array::<f32>()?
            .to_owned()
            .into_dimensionality::<Ix2>()
            .map_err(ModelError::from)?;

        if logits.shape() != [1, 2] {
            return Err(ModelError::UnexpectedShape(logits.shape().to_vec()).into());
        }

        Ok(Prediction::from_logits([logits[[0, 0]], logits[[0, 1]]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_of_equal_logits_is_even() {
        let prediction = Prediction::from_logits([0.3, 0.3]);

        assert!((prediction.probabilities[0] - 0.5).abs() < 1e-6);
        assert!((prediction.probabilities[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn larger_logit_wins() {
        let quake = Prediction::from_logits([4.0, -1.0]);
        let quiet = Prediction::from_logits([-2.0, 1.5]);

        assert_eq!(quake.label, Label::Earthquake);
        assert_eq!(quiet.label, Label::Background);
        assert!(quake.confidence() > 0.99);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let prediction = Prediction::from_logits([1000.0, 990.0]);

        assert!(prediction.probabilities.iter().all(|p| p.is_finite()));
        assert!((prediction.probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn labels_display_lowercase() {
        assert_eq!(Label::Earthquake.to_string(), "earthquake");
        assert_eq!(
            serde_json::to_string(&Label::Background).unwrap(),
            "\"background\""
        );
    }
}
