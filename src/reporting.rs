use crate::runner::RunReport;
use crate::sim::request::ActivationStatus;

/// Prints a human-readable summary of a run to stdout.
pub fn print_run_report(report: &RunReport) {
    println!("\n--- Run Report ---");
    println!(
        "Instance: {} [{}, {})",
        report.instance_name, report.start_time, report.stop_time
    );
    println!("Ticks: {}", report.ticks);
    println!(
        "Activations: {} scheduled, {} cascaded",
        report.scheduled, report.cascaded
    );
    println!(
        "Outcomes: {} completed, {} failed, {} unfinished",
        report.completed, report.failed, report.unfinished
    );
    let observed = report.events.iter().filter(|e| e.is_observed_only()).count();
    println!(
        "Output clock ticks: {} ({} observed only)",
        report.events.len(),
        observed
    );
    for a in &report.activations {
        if let Some(ActivationStatus::Failed { stage, reason }) = &a.status {
            println!("  {} at t={}: {stage} failed: {reason}", a.clock, a.time);
        }
    }
    match &report.error {
        None => println!("Status: success"),
        Some(err) => println!("Status: FAILED ({err})"),
    }
}
