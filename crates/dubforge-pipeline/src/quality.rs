//! Post-hoc quality checks on a produced output file.
//!
//! Each check is best-effort: one that cannot run appends an issue and the
//! remaining checks still execute.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dubforge_core::config::QualityConfig;
use dubforge_core::{MediaKind, MediaTool};
use serde::Serialize;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Findings for one `(reference, output)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub reference: PathBuf,
    pub output: PathBuf,
    /// `false` only when at least one issue was found.
    pub valid: bool,
    pub issues: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    fn new(reference: &Path, output: &Path) -> Self {
        Self {
            reference: reference.to_path_buf(),
            output: output.to_path_buf(),
            valid: true,
            issues: Vec::new(),
            metrics: BTreeMap::new(),
            recommendations: Vec::new(),
        }
    }

    fn issue(&mut self, message: impl Into<String>) {
        self.issues.push(message.into());
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.insert(name.to_string(), value);
    }

    fn finish(mut self) -> Self {
        self.valid = self.issues.is_empty();
        self
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Dubbing Quality Report ===")?;
        writeln!(f)?;
        writeln!(f, "Output: {}", self.output.display())?;
        writeln!(f, "Overall Status: {}", if self.valid { "PASSED" } else { "FAILED" })?;

        if !self.issues.is_empty() {
            writeln!(f)?;
            writeln!(f, "Issues Found:")?;
            for issue in &self.issues {
                writeln!(f, "  - {issue}")?;
            }
        }

        if !self.metrics.is_empty() {
            writeln!(f)?;
            writeln!(f, "Quality Metrics:")?;
            for (name, value) in &self.metrics {
                writeln!(f, "  {name}: {value:.2}")?;
            }
        }

        if !self.recommendations.is_empty() {
            writeln!(f)?;
            writeln!(f, "Recommendations:")?;
            for rec in &self.recommendations {
                writeln!(f, "  * {rec}")?;
            }
        }
        Ok(())
    }
}

/// Compares a dubbed output against the file it was made from.
pub struct QualityValidator {
    media: Arc<dyn MediaTool>,
    thresholds: QualityConfig,
}

impl QualityValidator {
    pub fn new(media: Arc<dyn MediaTool>) -> Self {
        Self {
            media,
            thresholds: QualityConfig::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: QualityConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub async fn validate(&self, reference: &Path, output: &Path) -> ValidationReport {
        tracing::info!(reference = %reference.display(), output = %output.display(), "validating dubbing output");
        let mut report = ValidationReport::new(reference, output);

        let size = match tokio::fs::metadata(output).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                report.issue("Output file does not exist");
                return report.finish();
            }
        };

        report.metric("file_size_mb", size as f64 / BYTES_PER_MB);
        if size == 0 {
            report.issue("Output file is empty");
        } else if size < self.thresholds.min_output_bytes {
            report.issue(format!(
                "Output file is very small ({size} bytes), may be corrupted"
            ));
        }

        self.check_duration(reference, output, &mut report).await;

        if MediaKind::is_video(output) {
            self.check_resolution(reference, output, &mut report).await;
        }

        let report = report.finish();
        tracing::debug!(valid = report.valid, issues = report.issues.len(), "validation finished");
        report
    }

    async fn check_duration(&self, reference: &Path, output: &Path, report: &mut ValidationReport) {
        let durations = async {
            let original = self.media.get_duration(reference).await?;
            let dubbed = self.media.get_duration(output).await?;
            Ok::<_, dubforge_core::Error>((original, dubbed))
        };
        let (original, dubbed) = match durations.await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "duration check failed");
                report.issue("Could not analyze audio quality");
                return;
            }
        };

        let difference = (original - dubbed).abs();
        let ratio = if original > 0.0 { difference / original } else { 0.0 };

        report.metric("original_duration", original);
        report.metric("dubbed_duration", dubbed);
        report.metric("duration_difference", difference);
        report.metric("duration_ratio", ratio);

        if ratio > self.thresholds.issue_duration_ratio {
            report.issue(format!("Significant duration difference: {difference:.2}s"));
        } else if ratio > self.thresholds.advisory_duration_ratio {
            report
                .recommendations
                .push("Consider adjusting speech rate for better timing".into());
        }
    }

    async fn check_resolution(&self, reference: &Path, output: &Path, report: &mut ValidationReport) {
        let infos = async {
            let original = self.media.get_media_info(reference).await?;
            let dubbed = self.media.get_media_info(output).await?;
            Ok::<_, dubforge_core::Error>((original, dubbed))
        };
        let (original, dubbed) = match infos.await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "resolution check failed");
                report.issue("Could not analyze video quality");
                return;
            }
        };

        let (Some(orig), Some(dub)) = (original.resolution(), dubbed.resolution()) else {
            return;
        };
        report.metric("original_width", f64::from(orig.0));
        report.metric("original_height", f64::from(orig.1));
        report.metric("dubbed_width", f64::from(dub.0));
        report.metric("dubbed_height", f64::from(dub.1));

        if orig != dub {
            report.recommendations.push(format!(
                "Resolution changed from {}x{} to {}x{}",
                orig.0, orig.1, dub.0, dub.1
            ));
        }
    }
}

impl fmt::Debug for QualityValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityValidator")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}
