//! Human-readable batch report.

use console::style;

use fleetpkg_core::install::{BatchReport, PackageOutcome};

pub fn print_table(report: &BatchReport) {
    println!();
    println!("  {:<24} {:<10} Details", "Package", "Result");
    println!("  {}", "-".repeat(70));

    for outcome in &report.packages {
        match outcome {
            PackageOutcome::Installed(install) => {
                println!(
                    "  {:<24} {:<10} {} node(s), {} artifact(s)",
                    install.package,
                    style("OK").green(),
                    install.nodes.len(),
                    install.artifacts.len()
                );
            }
            PackageOutcome::Failed {
                package,
                error,
                failed_nodes,
            } => {
                println!("  {:<24} {:<10} {}", package, style("FAILED").red(), error);
                if !failed_nodes.is_empty() {
                    println!("  {:<24} {:<10} nodes: {}", "", "", failed_nodes.join(", "));
                }
            }
            PackageOutcome::Skipped { package } => {
                println!("  {:<24} {:<10} not attempted", package, style("SKIPPED").yellow());
            }
        }
    }
    println!();

    let installed = report.installed().count();
    let failed = report.failed().count();
    let skipped = report.skipped().count();
    let elapsed = report.finished_at - report.started_at;
    if report.is_success() {
        println!(
            "Done! {} package(s) installed on {} in {}s",
            installed,
            report.nodes,
            elapsed.num_seconds()
        );
    } else {
        println!(
            "Summary: {} installed, {} failed, {} skipped",
            installed, failed, skipped
        );
        if skipped > 0 {
            println!("Use --keep-going to attempt every package.");
        }
    }
}
