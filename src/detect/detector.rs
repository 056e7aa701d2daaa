use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::detect::baseline::Baseline;
use crate::detect::forest::{quantile, IsolationForest};
use crate::detect::{AnomalyVerdict, DetectError, Observation, Trigger};

struct Trained {
    baseline: Baseline,
    forest: IsolationForest,
    /// Scores strictly above this are statistical outliers.
    threshold: f64,
}

/// Classifies observations against a frozen warm-up baseline.
///
/// Two rules are OR-ed together: a statistical outlier counts only when it
/// also exceeds `floor`, while anything above `ceiling` always counts.
pub struct DriftDetector {
    config: DetectorConfig,
    trained: Option<Trained>,
}

impl DriftDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            trained: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.trained.is_some()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.trained.as_ref().map(|t| &t.baseline)
    }

    /// Decision threshold derived from the contamination setting.
    pub fn threshold(&self) -> Option<f64> {
        self.trained.as_ref().map(|t| t.threshold)
    }

    /// Fit the outlier model on the warm-up observations.
    ///
    /// On failure the detector keeps its previous state.
    pub fn train(&mut self, initial: &[Observation]) -> Result<(), DetectError> {
        let needed = self.config.min_training_points;
        if initial.len() < needed {
            return Err(DetectError::InsufficientBaseline {
                needed,
                have: initial.len(),
            });
        }
        if let Some((index, o)) = initial.iter().enumerate().find(|(_, o)| !o.value.is_finite()) {
            return Err(DetectError::NonFinite {
                index,
                value: o.value,
            });
        }

        let baseline = Baseline::from_observations(initial, self.config.warmup_points.max(needed));
        let values = baseline.values();
        let forest = IsolationForest::fit(&values, self.config.trees, self.config.seed);
        let scores: Vec<f64> = values.iter().map(|&v| forest.score(v)).collect();
        let threshold = quantile(&scores, 1.0 - self.config.contamination);

        info!(
            points = baseline.len(),
            mean = baseline.mean(),
            std_dev = baseline.std_dev(),
            threshold,
            "drift detector trained"
        );

        self.trained = Some(Trained {
            baseline,
            forest,
            threshold,
        });
        Ok(())
    }

    pub fn classify(&self, observation: &Observation) -> Result<AnomalyVerdict, DetectError> {
        let trained = self.trained.as_ref().ok_or(DetectError::NotReady)?;
        let value = observation.value;
        if !value.is_finite() {
            return Err(DetectError::NonFinite { index: 0, value });
        }

        let score = trained.forest.score(value);
        let statistical = score > trained.threshold;

        let trigger = if value > self.config.ceiling {
            Some(Trigger::Ceiling)
        } else if statistical && value > self.config.floor {
            Some(Trigger::Statistical)
        } else {
            None
        };

        debug!(value, score, statistical, ?trigger, "classified observation");

        Ok(AnomalyVerdict {
            observation: *observation,
            is_anomalous: trigger.is_some(),
            score: Some(score),
            statistical,
            trigger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig {
            warmup_points: 20,
            floor: 15.0,
            ceiling: 60.0,
            ..DetectorConfig::default()
        }
    }

    fn obs(values: &[f64]) -> Vec<Observation> {
        values.iter().map(|&v| Observation::new(v)).collect()
    }

    fn trained_on(values: &[f64]) -> DriftDetector {
        let mut d = DriftDetector::new(config());
        d.train(&obs(values)).unwrap();
        d
    }

    fn cluster() -> Vec<f64> {
        (0..20).map(|i| 10.0 + i as f64 * 0.1).collect()
    }

    #[test]
    fn test_classify_before_train_is_not_ready() {
        let d = DriftDetector::new(config());
        assert!(!d.is_ready());
        assert_eq!(d.classify(&Observation::new(1.0)), Err(DetectError::NotReady));
    }

    #[test]
    fn test_train_rejects_short_warmup() {
        for len in 0..5 {
            let mut d = DriftDetector::new(config());
            let err = d.train(&obs(&vec![1.0; len])).unwrap_err();
            assert_eq!(err, DetectError::InsufficientBaseline { needed: 5, have: len });
            assert!(!d.is_ready());
        }
    }

    #[test]
    fn test_train_rejects_non_finite() {
        let mut d = DriftDetector::new(config());
        let err = d.train(&obs(&[1.0, 2.0, f64::NAN, 3.0, 4.0])).unwrap_err();
        assert!(matches!(err, DetectError::NonFinite { index: 2, .. }));

        let err = d.train(&obs(&[1.0, 2.0, 3.0, 4.0, f64::INFINITY])).unwrap_err();
        assert!(matches!(err, DetectError::NonFinite { index: 4, .. }));
        assert!(!d.is_ready());
    }

    #[test]
    fn test_baseline_window_is_bounded() {
        let mut d = DriftDetector::new(DetectorConfig {
            warmup_points: 6,
            ..config()
        });
        d.train(&obs(&[5.0, 5.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0])).unwrap();
        assert_eq!(d.baseline().unwrap().values(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_ceiling_overrides_model() {
        // A constant baseline leaves the model unable to tell 1.0 from 65.0
        // apart by splitting, yet the ceiling still fires.
        let d = trained_on(&[1.0; 5]);
        let v = d.classify(&Observation::new(65.0)).unwrap();
        assert!(v.is_anomalous);
        assert_eq!(v.trigger, Some(Trigger::Ceiling));

        // Values the model itself finds ordinary still trip the ceiling.
        let d = trained_on(&[70.0, 71.0, 72.0, 70.5, 71.5, 72.5, 70.0, 71.0]);
        let v = d.classify(&Observation::new(71.0)).unwrap();
        assert!(!v.statistical);
        assert!(v.is_anomalous);
        assert_eq!(v.trigger, Some(Trigger::Ceiling));
    }

    #[test]
    fn test_statistical_outlier_above_floor() {
        let d = trained_on(&cluster());
        let v = d.classify(&Observation::new(40.0)).unwrap();
        assert!(v.statistical);
        assert!(v.is_anomalous);
        assert_eq!(v.trigger, Some(Trigger::Statistical));
        assert!(v.score.unwrap() > d.threshold().unwrap());
    }

    #[test]
    fn test_statistical_outlier_below_floor_is_ignored() {
        let d = trained_on(&cluster());
        let v = d.classify(&Observation::new(2.0)).unwrap();
        assert!(v.statistical);
        assert!(!v.is_anomalous);
        assert_eq!(v.trigger, None);
    }

    #[test]
    fn test_values_below_both_thresholds_never_anomalous() {
        let d = trained_on(&[1.0, 1.0, 1.0, 1.0, 1.0]);
        for v in [0.0, 1.0, 5.0, 14.9, 15.0] {
            let verdict = d.classify(&Observation::new(v)).unwrap();
            assert!(!verdict.is_anomalous, "{v} flagged");
        }
    }

    #[test]
    fn test_non_finite_observation_is_rejected() {
        let d = trained_on(&cluster());
        assert!(matches!(
            d.classify(&Observation::new(f64::NAN)),
            Err(DetectError::NonFinite { .. })
        ));
    }
}
