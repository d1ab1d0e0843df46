//! Plain-text report renderer.
//!
//! Layout: the Friedman summary table, then one post-hoc table per
//! analysed metric (with mean ranks), then skipped metrics and degenerate
//! comparisons. Formatting knobs live in an explicit [`ReportStyle`].

use std::fmt::Write;

use pipestat_core::{AnalysisReport, CorrectedComparisonSet, FriedmanResult};

/// Formatting options for [`render_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStyle {
    /// Digits after the decimal point for statistics and p-values.
    pub precision: usize,
    /// Appended to significant rows.
    pub significance_marker: String,
    /// Print each metric's mean ranks above its post-hoc table.
    pub show_mean_ranks: bool,
}

impl ReportStyle {
    /// Default number of decimal places.
    pub const DEFAULT_PRECISION: usize = 4;

    /// Default significance marker.
    pub const DEFAULT_MARKER: &'static str = "*";
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            precision: Self::DEFAULT_PRECISION,
            significance_marker: Self::DEFAULT_MARKER.to_string(),
            show_mean_ranks: true,
        }
    }
}

/// Render an analysis report as text.
#[must_use]
pub fn render_report(report: &AnalysisReport, style: &ReportStyle) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Friedman Test Summary\n{}", "=".repeat(60));
    write_summary(&mut out, &report.summary, report.config.alpha, style);

    for (friedman, posthoc) in report.analyzed() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Post-hoc: {} (Wilcoxon signed-rank, Holm, alpha={})\n{}",
            friedman.metric_name,
            report.config.alpha,
            "-".repeat(60)
        );
        if style.show_mean_ranks {
            write_mean_ranks(&mut out, friedman, style);
        }
        write_posthoc(&mut out, posthoc, style);
    }

    let issues: Vec<String> = report
        .skipped
        .iter()
        .map(|s| format!("  {} (skipped): {}", s.metric_name, s.reason))
        .chain(
            report
                .failed
                .iter()
                .map(|s| format!("  {} (failed): {}", s.metric_name, s.reason)),
        )
        .collect();
    if !issues.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Skipped metrics");
        for line in issues {
            let _ = writeln!(out, "{line}");
        }
    }

    let degenerate: Vec<String> = report
        .posthoc
        .values()
        .flat_map(|set| set.degenerate())
        .map(|c| format!("  {}: {}", c.metric_name, c.label()))
        .collect();
    if !degenerate.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Degenerate comparisons (no non-zero differences)");
        for line in degenerate {
            let _ = writeln!(out, "{line}");
        }
    }

    out
}

fn write_summary(out: &mut String, summary: &[FriedmanResult], alpha: f64, style: &ReportStyle) {
    if summary.is_empty() {
        let _ = writeln!(out, "(no metrics analysed)");
        return;
    }
    let _ = writeln!(
        out,
        "{:<24} {:>12} {:>4} {:>12} {:>8} {:>6} {:>4}",
        "Metric", "Chi2", "df", "p", "W", "n", "k"
    );
    for r in summary {
        let marker = if r.p_value <= alpha {
            style.significance_marker.as_str()
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{:<24} {:>12} {:>4} {:>12} {:>8} {:>6} {:>4} {marker}",
            r.metric_name,
            fixed(r.statistic, style.precision),
            r.degrees_of_freedom,
            p_value(r.p_value, style.precision),
            fixed(r.effect_size, style.precision),
            r.n_images,
            r.k_pipelines,
        );
    }
}

fn write_mean_ranks(out: &mut String, friedman: &FriedmanResult, style: &ReportStyle) {
    let ranks: Vec<String> = friedman
        .mean_ranks
        .iter()
        .map(|r| format!("{}={}", r.pipeline, fixed(r.mean_rank, 2.min(style.precision))))
        .collect();
    let _ = writeln!(out, "Mean ranks: {}", ranks.join(" "));
}

fn write_posthoc(out: &mut String, set: &CorrectedComparisonSet, style: &ReportStyle) {
    let _ = writeln!(
        out,
        "{:<16} {:>10} {:>5} {:>7} {:>12} {:>12}",
        "Comparison", "T", "n", "method", "p_raw", "p_holm"
    );
    for c in &set.comparisons {
        let Some(test) = c.test.as_ref() else {
            let _ = writeln!(
                out,
                "{:<16} {:>10} {:>5} {:>7} {:>12} {:>12}",
                c.label(),
                "-",
                "0",
                "-",
                "-",
                "-"
            );
            continue;
        };
        let marker = if c.is_significant {
            style.significance_marker.as_str()
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{:<16} {:>10} {:>5} {:>7} {:>12} {:>12} {marker}",
            c.label(),
            fixed(test.statistic, 1),
            test.n_effective,
            test.method.as_str(),
            c.raw_p_value.map_or_else(|| "-".to_string(), |p| p_value(p, style.precision)),
            c.adjusted_p_value
                .map_or_else(|| "-".to_string(), |p| p_value(p, style.precision)),
        );
    }
}

fn fixed(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

/// Fixed notation, switching to scientific when the value would round to
/// zero at `precision` digits.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn p_value(p: f64, precision: usize) -> String {
    let smallest = 10f64.powi(-(precision as i32));
    if p != 0.0 && p < smallest {
        format!("{p:.2e}")
    } else {
        fixed(p, precision)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pipestat_core::{AnalysisConfig, Observation, ObservationTable, analyze};

    fn report() -> AnalysisReport {
        let mut observations = Vec::new();
        for image in 0..8 {
            let x = f64::from(image);
            for (pipeline, value) in [("p0", x), ("p2", x), ("p5", x.mul_add(x, 50.0))] {
                observations.push(Observation::new(
                    format!("img{image}"),
                    pipeline,
                    "contrast",
                    Some(value),
                ));
            }
            observations.push(Observation::new(format!("img{image}"), "p0", "ratio", Some(x)));
        }
        analyze(
            &ObservationTable::new(observations).unwrap(),
            &AnalysisConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn p_value_switches_to_scientific() {
        assert_eq!(p_value(0.25, 4), "0.2500");
        assert_eq!(p_value(3.85e-8, 4), "3.85e-8");
        assert_eq!(p_value(0.0, 4), "0.0000");
    }

    #[test]
    fn renders_all_sections() {
        let text = render_report(&report(), &ReportStyle::default());
        assert!(text.starts_with("Friedman Test Summary"));
        assert!(text.contains("Post-hoc: contrast"));
        assert!(text.contains("Mean ranks: p0=1.50 p2=1.50 p5=3.00"));
        assert!(text.contains("Skipped metrics"));
        assert!(text.contains("ratio (skipped)"));
        assert!(text.contains("Degenerate comparisons"));
        assert!(text.contains("contrast: p0 vs p2"));
    }

    #[test]
    fn marker_is_configurable() {
        let style = ReportStyle {
            significance_marker: "<sig>".to_string(),
            show_mean_ranks: false,
            ..ReportStyle::default()
        };
        let text = render_report(&report(), &style);
        assert!(text.contains("<sig>"));
        assert!(!text.contains("Mean ranks"));
    }
}
