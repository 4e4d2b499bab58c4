// Run summaries printed after a catalog run

use crate::catalog::RunReport;
use crate::sink::DeliveryReport;
use colored::Colorize;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

/// Generate a plain-text summary of a run and, if given, its delivery.
pub fn generate_run_summary(run: &RunReport, delivery: Option<&DeliveryReport>) -> String {
    let mut report = String::new();
    report.push_str(RULE);
    report.push('\n');
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Products collected: {}\n", run.dataset.len()));
    report.push_str(&format!("  Categories scraped: {}\n", run.outcomes.len()));
    report.push_str(&format!("  Categories failed: {}\n", run.failures.len()));
    report.push_str(&format!("  Tiles skipped: {}\n", run.issue_count()));
    report.push('\n');
    report.push_str(RULE);
    report.push('\n');

    for outcome in &run.outcomes {
        report.push_str(&format!("## {}\n", outcome.category));
        report.push_str(&format!("  {}\n", outcome.url));
        report.push_str(&format!(
            "  {} products added, {} tiles seen, {} expansions",
            outcome.added, outcome.tiles_seen, outcome.expansions
        ));
        if outcome.duplicates > 0 {
            report.push_str(&format!(", {} duplicates", outcome.duplicates));
        }
        report.push('\n');

        for issue in &outcome.issues {
            report.push_str(&format!("  {} {}\n", "⚠".yellow(), issue));
        }
        report.push('\n');
    }

    for failure in &run.failures {
        report.push_str(&format!("{} {}\n", "✗".red(), failure));
    }
    if let Some(ref e) = run.close_error {
        report.push_str(&format!("{} render surface did not close: {}\n", "⚠".yellow(), e));
    }

    if let Some(delivery) = delivery {
        if !run.failures.is_empty() || run.close_error.is_some() {
            report.push('\n');
        }
        report.push_str("# Delivery:\n");
        for outcome in &delivery.outcomes {
            match outcome.result {
                Ok(()) => report.push_str(&format!("  {} {}\n", "✓".green(), outcome.sink)),
                Err(ref e) => {
                    report.push_str(&format!("  {} {}: {}\n", "✗".red(), outcome.sink, e))
                }
            }
        }
    }

    report
}
