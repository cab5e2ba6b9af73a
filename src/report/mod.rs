//! Reporting utilities: progress listings and formatted summaries.
//!
//! Formatting lives here so the distribution engine and the fits only deal in
//! typed values, and output changes stay localized.

use crate::domain::{FitResult, PipelineConfig, Sample};
use crate::mpi::{RankReport, RunSummary};

/// Upper-case step label used as the prefix of progress messages.
pub fn suffix_label(suffix: &str) -> String {
    suffix.to_uppercase()
}

/// One `  {index} {galaxy_dir} (r={radius} arcsec)` line per sample index.
/// Indices outside the sample are skipped.
pub fn list_indices(sample: &Sample, config: &PipelineConfig, indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .filter_map(|&ii| {
            let g = sample.get(ii)?;
            Some(format!(
                "  {ii} {} (r={:.3} arcsec)",
                config.galaxy_dir(&g.galaxy).display(),
                g.mosaic_radius_arcsec()
            ))
        })
        .collect()
}

/// Parameter table for one Sersic fit.
pub fn format_fit_summary(fit: &FitResult) -> String {
    let mut out = String::new();
    let status = if fit.success { "ok" } else { "FAILED" };
    out.push_str(&format!(
        "{} [{status}] chi2={:.3} dof={} points={}\n",
        fit.modeltype,
        fit.chi2,
        fit.dof,
        fit.radius.len()
    ));
    if !fit.success {
        out.push_str(&format!("  {}\n", fit.fit_message));
        return out;
    }

    for p in &fit.params {
        let note = match (&p.tied_to, p.fixed) {
            (Some(src), _) => format!("tied to {src}"),
            (None, true) => "fixed".to_string(),
            (None, false) => String::new(),
        };
        out.push_str(
            format!(
                "  {:<10} {:>12.5} +/- {:<10.5} {note}\n",
                truncate(&p.name, 10),
                p.value,
                p.uncertainty
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Totals across ranks for one run.
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}: {} galaxies in sample, {} rank(s)\n",
        suffix_label(summary.kind.suffix()),
        summary.sample_size,
        summary.rank_count
    ));
    match &summary.report {
        Some(report) => out.push_str(&format_rank_report(report)),
        None if summary.kind.is_serial() => out.push_str("  serial step\n"),
        None => out.push_str("  nothing to do\n"),
    }
    out
}

fn format_rank_report(report: &RankReport) -> String {
    format!(
        "  rank {:03}: assigned={} completed={} failed={}\n",
        report.rank, report.assigned, report.completed, report.failed
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
