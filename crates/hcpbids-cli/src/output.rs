use hcpbids_core::plan::{Plan, Step};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    // The last column is a command line; leave it unpadded.
    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = if i + 1 == row.len() {
                    0
                } else {
                    widths.get(i).copied().unwrap_or(0)
                };
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  "));
    }
}

/// One row per step: subject, step kind, and what it does.
pub fn plan_rows(plans: &[Plan]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for plan in plans {
        for step in &plan.steps {
            let (kind, detail) = match step {
                Step::CreateDir { path } => ("mkdir", path.display().to_string()),
                Step::WriteFile { path, .. } => ("write", path.display().to_string()),
                Step::CopyTree { from, to } => {
                    ("copy", format!("{} -> {}", from.display(), to.display()))
                }
                Step::Command(inv) => (inv.label.as_str(), inv.to_string()),
            };
            rows.push(vec![plan.subject.clone(), kind.to_string(), detail]);
        }
    }
    rows
}
