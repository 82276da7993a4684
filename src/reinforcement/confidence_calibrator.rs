// src/reinforcement/confidence_calibrator.rs
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::types::{CalibrationBin, CalibrationCurvePoint, CalibrationStats};
use crate::config::{
    LearningConfig, CALIBRATION_BIN_WIDTH, CALIBRATION_SAMPLES_FOR_FULL_BLEND,
    DEFAULT_CALIBRATION_MIN_SAMPLES, MAX_CALIBRATION_BLEND,
};
use crate::persistence::{load_or_default, save_atomic, LoadStatus};
use crate::utils::{clamp_percent, finite_or_zero, mean};

const LAST_BIN: u32 = 100 - CALIBRATION_BIN_WIDTH;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalibrationDocument {
    #[serde(default = "empty_bins")]
    bins: BTreeMap<u32, CalibrationBin>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl Default for CalibrationDocument {
    fn default() -> Self {
        Self {
            bins: empty_bins(),
            last_updated: None,
        }
    }
}

fn empty_bins() -> BTreeMap<u32, CalibrationBin> {
    (0..=LAST_BIN)
        .step_by(CALIBRATION_BIN_WIDTH as usize)
        .map(|k| (k, CalibrationBin::default()))
        .collect()
}

/// Maps raw confidences toward the accuracy observed for their range.
#[derive(Debug, Clone)]
pub struct ConfidenceCalibrator {
    path: PathBuf,
    min_samples: u32,
    doc: CalibrationDocument,
}

impl ConfidenceCalibrator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            min_samples: DEFAULT_CALIBRATION_MIN_SAMPLES,
            doc: CalibrationDocument::default(),
        }
    }

    pub fn load(config: &LearningConfig) -> Self {
        Self::load_with_status(config).0
    }

    /// Like `load`, also reporting how the persisted document was obtained.
    pub fn load_with_status(config: &LearningConfig) -> (Self, LoadStatus) {
        let path = config.calibration_path();
        let (mut doc, status): (CalibrationDocument, _) =
            load_or_default(&path, "confidence calibration");
        // documents written with fewer bins still get the full set
        for (key, bin) in empty_bins() {
            doc.bins.entry(key).or_insert(bin);
        }
        let samples: u64 = doc.bins.values().map(|b| b.total as u64).sum();
        info!("Confidence calibrator ready with {} samples", samples);
        let calibrator = Self {
            path,
            min_samples: config.calibration_min_samples,
            doc,
        };
        (calibrator, status)
    }

    pub fn with_min_samples(mut self, min_samples: u32) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lower edge of the bin holding `confidence`, clamped to [0, 90].
    pub fn bin_key(confidence: f64) -> u32 {
        let c = finite_or_zero(confidence).max(0.0);
        let index = (c / CALIBRATION_BIN_WIDTH as f64).floor() as u32;
        (index * CALIBRATION_BIN_WIDTH).min(LAST_BIN)
    }

    pub fn bin(&self, confidence: f64) -> CalibrationBin {
        self.doc
            .bins
            .get(&Self::bin_key(confidence))
            .copied()
            .unwrap_or_default()
    }

    /// Records one judged prediction without persisting.
    pub fn record(&mut self, predicted_confidence: f64, actual_correct: bool) {
        let key = Self::bin_key(predicted_confidence);
        self.doc
            .bins
            .entry(key)
            .or_default()
            .record(actual_correct);
        self.doc.last_updated = Some(Utc::now());
        debug!(
            "Calibration bin {} now {:?}",
            key,
            self.doc.bins.get(&key)
        );
    }

    /// Records one judged prediction and persists the bins.
    pub fn update(&mut self, predicted_confidence: f64, actual_correct: bool) -> Result<()> {
        self.record(predicted_confidence, actual_correct);
        self.persist()
    }

    pub fn persist(&self) -> Result<()> {
        save_atomic(&self.path, &self.doc)
    }

    pub fn calibrate(&self, raw_confidence: f64) -> f64 {
        self.calibrate_with(raw_confidence, self.min_samples)
    }

    /// Blends `raw_confidence` with the observed accuracy of its bin. Bins with
    /// fewer than `min_samples` judgments leave the score untouched.
    pub fn calibrate_with(&self, raw_confidence: f64, min_samples: u32) -> f64 {
        let raw = clamp_percent(raw_confidence);
        let bin = self.bin(raw);
        if bin.total == 0 || bin.total < min_samples {
            return raw;
        }
        let blend = (bin.total as f64 / CALIBRATION_SAMPLES_FOR_FULL_BLEND).min(MAX_CALIBRATION_BLEND);
        clamp_percent((1.0 - blend) * raw + blend * bin.accuracy * 100.0)
    }

    pub fn get_calibration_curve(&self) -> Vec<CalibrationCurvePoint> {
        self.doc
            .bins
            .iter()
            .filter(|(_, bin)| bin.total > 0)
            .map(|(key, bin)| CalibrationCurvePoint {
                predicted_range: format!("{}-{}%", key, key + CALIBRATION_BIN_WIDTH),
                actual_accuracy: bin.accuracy * 100.0,
                sample_count: bin.total,
            })
            .collect()
    }

    pub fn stats(&self) -> CalibrationStats {
        let populated: Vec<(&u32, &CalibrationBin)> =
            self.doc.bins.iter().filter(|(_, b)| b.total > 0).collect();
        let errors: Vec<f64> = populated
            .iter()
            .map(|(key, bin)| {
                let midpoint = **key as f64 + CALIBRATION_BIN_WIDTH as f64 / 2.0;
                (midpoint - bin.accuracy * 100.0).abs()
            })
            .collect();

        CalibrationStats {
            total_samples: self.doc.bins.values().map(|b| b.total as u64).sum(),
            mean_calibration_error: mean(&errors).unwrap_or(0.0),
            calibrated_bins: populated.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrator(dir: &tempfile::TempDir) -> ConfidenceCalibrator {
        ConfidenceCalibrator::new(dir.path().join("confidence_calibration.json"))
    }

    #[test]
    fn bin_keys_are_clamped() {
        assert_eq!(ConfidenceCalibrator::bin_key(0.0), 0);
        assert_eq!(ConfidenceCalibrator::bin_key(55.0), 50);
        assert_eq!(ConfidenceCalibrator::bin_key(99.9), 90);
        assert_eq!(ConfidenceCalibrator::bin_key(100.0), 90);
        assert_eq!(ConfidenceCalibrator::bin_key(-4.0), 0);
        assert_eq!(ConfidenceCalibrator::bin_key(f64::NAN), 0);
    }

    #[test]
    fn sparse_bins_leave_scores_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut cal = calibrator(&dir);
        for _ in 0..4 {
            cal.record(55.0, true);
        }
        assert_eq!(cal.calibrate(55.0), 55.0);
    }

    #[test]
    fn fifth_sample_enables_blending() {
        let dir = tempfile::tempdir().unwrap();
        let mut cal = calibrator(&dir);
        for _ in 0..5 {
            cal.update(55.0, true).unwrap();
        }
        let calibrated = cal.calibrate(55.0);
        assert!(calibrated > 55.0 && calibrated < 100.0, "got {calibrated}");
        // blend 5/50 = 0.1 toward 100% accuracy
        assert!((calibrated - 59.5).abs() < 1e-9);
        assert_eq!(cal.calibrate(55.0), calibrated);
    }

    #[test]
    fn blend_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut cal = calibrator(&dir);
        for _ in 0..200 {
            cal.record(85.0, false);
        }
        // 70% of the way toward 0% accuracy
        assert!((cal.calibrate(85.0) - 25.5).abs() < 1e-9);
    }

    #[test]
    fn curve_and_stats_cover_populated_bins() {
        let dir = tempfile::tempdir().unwrap();
        let mut cal = calibrator(&dir);
        cal.record(12.0, false);
        cal.record(95.0, true);
        cal.record(91.0, true);

        let curve = cal.get_calibration_curve();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].predicted_range, "10-20%");
        assert_eq!(curve[1].sample_count, 2);

        let stats = cal.stats();
        assert_eq!(stats.total_samples, 3);
        assert_eq!(stats.calibrated_bins, 2);
        // |15 - 0| and |95 - 100|
        assert!((stats.mean_calibration_error - 10.0).abs() < 1e-9);
    }

    #[test]
    fn persisted_bins_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = LearningConfig::with_data_dir(dir.path());
        let mut cal = ConfidenceCalibrator::load(&config);
        cal.update(72.0, true).unwrap();
        cal.update(71.0, false).unwrap();

        let reloaded = ConfidenceCalibrator::load(&config);
        let bin = reloaded.bin(70.0);
        assert_eq!((bin.correct, bin.total), (1, 2));
    }
}
