use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("Threshold must be between 0 and 1")]
pub struct ThresholdOutOfRange(pub f64);

/// Decision boundary on the probability of the `real` class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ThresholdOutOfRange> {
        // NaN fails the range check
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ThresholdOutOfRange(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Real => "real",
            Label::Fake => "fake",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Probabilities {
    pub real: f64,
    pub fake: f64,
}

impl Probabilities {
    /// Builds the class distribution from the raw `[real, fake]` logits.
    pub fn from_logits(real_logit: f32, fake_logit: f32) -> Self {
        let (real_logit, fake_logit) = (f64::from(real_logit), f64::from(fake_logit));
        let max = real_logit.max(fake_logit);
        let real = (real_logit - max).exp();
        let fake = (fake_logit - max).exp();
        let sum = real + fake;

        Self {
            real: real / sum,
            fake: fake / sum,
        }
    }

    pub fn classify(self, threshold: Threshold) -> Prediction {
        let prediction = if self.real >= threshold.value() {
            Label::Real
        } else {
            Label::Fake
        };

        Prediction {
            prediction,
            probabilities: self,
            threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction: Label,
    pub probabilities: Probabilities,
    pub threshold: Threshold,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_bounds() {
        assert!(Threshold::new(0.0).is_ok());
        assert!(Threshold::new(1.0).is_ok());
        assert!(Threshold::new(0.75).is_ok());
        assert_eq!(Threshold::new(-0.01), Err(ThresholdOutOfRange(-0.01)));
        assert!(Threshold::new(1.01).is_err());
        assert!(Threshold::new(f64::NAN).is_err());
        assert_eq!(
            Threshold::new(1.00000001),
            Err(ThresholdOutOfRange(1.00000001))
        );
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let logits = [
            (0.0, 0.0),
            (3.2, -1.4),
            (-7.5, 2.25),
            (120.0, 119.0),
            (-300.0, 300.0),
        ];
        for (real, fake) in logits {
            let p = Probabilities::from_logits(real, fake);
            assert!((p.real + p.fake - 1.0).abs() < 1e-6, "{:?}", p);
            assert!(p.real.is_finite() && p.fake.is_finite());
        }
    }

    #[test]
    fn test_softmax_equal_logits() {
        let p = Probabilities::from_logits(1.5, 1.5);
        assert!((p.real - 0.5).abs() < 1e-6);
        assert!((p.fake - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_classify_uses_inclusive_threshold() {
        let probabilities = Probabilities {
            real: 0.75,
            fake: 0.25,
        };
        let threshold = Threshold::new(0.75).unwrap();
        assert_eq!(probabilities.classify(threshold).prediction, Label::Real);

        let threshold = Threshold::new(0.76).unwrap();
        assert_eq!(probabilities.classify(threshold).prediction, Label::Fake);
    }

    #[test]
    fn test_classify_matches_decision_rule() {
        let probabilities = Probabilities::from_logits(0.4, -0.2);
        for step in 0..=20 {
            let threshold = Threshold::new(step as f64 / 20.0).unwrap();
            let prediction = probabilities.classify(threshold);
            assert_eq!(
                prediction.prediction == Label::Real,
                prediction.probabilities.real >= threshold.value()
            );
        }
    }

    #[test]
    fn test_prediction_serialization() {
        let prediction = Probabilities {
            real: 0.25,
            fake: 0.75,
        }
        .classify(Threshold::new(0.5).unwrap());

        let json = serde_json::to_value(prediction).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "prediction": "fake",
                "probabilities": { "real": 0.25, "fake": 0.75 },
                "threshold": 0.5
            })
        );
    }
}
