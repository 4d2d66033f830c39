//! Terminal output for the cascade CLI.

use cascade_core::{RunOutcome, Topology, UnitStatus};

/// Print the final report followed by a run summary.
pub fn print_outcome(outcome: &RunOutcome) {
    println!("{}", outcome.content);
    println!();
    print_summary(outcome);
}

/// Print per-tier counts and a table of failed workers.
pub fn print_summary(outcome: &RunOutcome) {
    print!("{}", format_summary(outcome));
}

fn format_summary(outcome: &RunOutcome) -> String {
    let f = &outcome.failures;
    let mut out = String::new();
    out.push_str(&format!("Run: {}\n\n", outcome.run_id));
    out.push_str(&format!("  Final Tier:     {}\n", outcome.final_tier.as_str()));
    out.push_str(&format!(
        "  Workers:        {}/{} succeeded\n",
        f.workers_total - f.workers_failed,
        f.workers_total
    ));
    if f.groups_total > 0 {
        out.push_str(&format!(
            "  Syntheses:      {}/{} succeeded\n",
            f.groups_total - f.groups_failed,
            f.groups_total
        ));
    }
    if let Some(executive) = &outcome.executive {
        out.push_str(&format!("  Executive:      {}\n", format_status(executive.status)));
    }
    out.push_str(&format!(
        "  Tokens:         {}\n",
        outcome.total_usage.total_tokens()
    ));
    out.push_str(&format!("  Cost:           ${:.4}\n", outcome.total_usage.cost_usd));
    out.push_str(&format!("  Duration:       {}\n", format_duration(outcome.elapsed_ms)));
    if outcome.cancelled {
        out.push_str("  Cancelled:      yes\n");
    }

    let failed: Vec<_> = outcome
        .workers
        .iter()
        .filter_map(|w| w.failure.as_ref().map(|r| (w.subtask.index, r)))
        .collect();
    if !failed.is_empty() {
        out.push_str("\n  Failed Workers:\n");
        out.push_str(&format!("    {:<6}  {:<60}\n", "INDEX", "REASON"));
        out.push_str(&format!("    {}\n", "-".repeat(68)));
        for (index, reason) in failed {
            out.push_str(&format!(
                "    {:<6}  {:<60}\n",
                index,
                truncate(&reason.to_string(), 60)
            ));
        }
    }
    out
}

/// Print the tier layout for a range of worker counts.
pub fn print_topology_table(rows: &[Topology]) {
    println!(
        "{:<8}  {:<12}  {:<10}  {:<10}  {:<6}",
        "WORKERS", "SYNTHESIZERS", "GROUP_SIZE", "EXECUTIVE", "AGENTS"
    );
    println!("{}", "-".repeat(54));
    for t in rows {
        println!(
            "{:<8}  {:<12}  {:<10}  {:<10}  {:<6}",
            t.workers,
            t.synthesizers,
            t.group_size(),
            if t.executive { "yes" } else { "no" },
            t.total_agents(),
        );
    }
}

fn format_status(status: UnitStatus) -> &'static str {
    status.as_str()
}

fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
