//! Result table files.

use std::path::Path;

use anyhow::{Context, Result};
use pipestat_core::AnalysisReport;
use pipestat_format::{
    posthoc_csv, posthoc_file_name, posthoc_file_names, skipped_csv, summary_csv,
};

/// Write `summary.csv`, one `posthoc_<metric>.csv` per analysed metric,
/// and `skipped.csv` into `dir`, creating it if needed.
///
/// Metrics whose sanitised names collide get numbered file names (see
/// [`posthoc_file_names`]) so no table overwrites another.
pub fn write_tables(dir: &Path, report: &AnalysisReport) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("error creating {}", dir.display()))?;

    write(dir, "summary.csv", &summary_csv(&report.summary)?)?;

    let analyzed: Vec<_> = report.analyzed().collect();
    let metrics: Vec<&str> = analyzed
        .iter()
        .map(|(friedman, _)| friedman.metric_name.as_str())
        .collect();
    let names = posthoc_file_names(&metrics);
    for ((friedman, posthoc), name) in analyzed.iter().zip(&names) {
        if *name != posthoc_file_name(&friedman.metric_name) {
            tracing::warn!(
                metric = %friedman.metric_name,
                file = %name,
                "post-hoc file name collides with another metric, numbered instead"
            );
        }
        write(dir, name, &posthoc_csv(posthoc)?)?;
    }

    write(dir, "skipped.csv", &skipped_csv(report)?)?;
    Ok(())
}

fn write(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, contents).with_context(|| format!("error writing {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "wrote table");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pipestat_core::{AnalysisConfig, Observation, ObservationTable, analyze};
    use tempfile::tempdir;

    /// Two metrics whose names sanitise to the same file name.
    fn report() -> AnalysisReport {
        let mut observations = Vec::new();
        for image in 0..8 {
            let x = f64::from(image);
            for (j, pipeline) in ["p0", "p2", "p5"].into_iter().enumerate() {
                let offset = f64::from(u32::try_from(j).unwrap());
                for metric in ["rel sharpness", "rel_sharpness"] {
                    observations.push(Observation::new(
                        format!("img{image}"),
                        pipeline,
                        metric,
                        Some(x.mul_add(1.0 + offset, offset * 10.0)),
                    ));
                }
            }
        }
        analyze(
            &ObservationTable::new(observations).unwrap(),
            &AnalysisConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn colliding_metric_names_write_separate_files() {
        let report = report();
        assert_eq!(report.summary.len(), 2);

        let dir = tempdir().unwrap();
        write_tables(dir.path(), &report).unwrap();

        let mut files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, [
            "posthoc_rel_sharpness.csv",
            "posthoc_rel_sharpness_2.csv",
            "skipped.csv",
            "summary.csv",
        ]);

        let first = std::fs::read_to_string(dir.path().join("posthoc_rel_sharpness.csv")).unwrap();
        let second =
            std::fs::read_to_string(dir.path().join("posthoc_rel_sharpness_2.csv")).unwrap();
        assert_eq!(first.lines().count(), 4);
        assert_eq!(second.lines().count(), 4);
    }
}
