use std::path::Path;

use anyhow::Context;
use tagvm_core::vm::OpcodeHistogram;

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory for {}", path.display()))?;
        }
    }
    Ok(())
}

pub(crate) fn write_bytes(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes `contents` to `path`, or to stdout when no path is given.
pub(crate) fn write_output(path: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            write_bytes(path, contents.as_bytes())?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", contents),
    }
    Ok(())
}

pub(crate) fn print_histogram(histogram: &OpcodeHistogram) {
    let total: usize = histogram.entries.iter().map(|e| e.count).sum();
    println!("Opcode frequency:");
    println!("OPCODE | INSTRUCTION             | COUNT  | PERCENTAGE");
    println!("-------|-------------------------|--------|------------");
    for entry in &histogram.entries {
        let pct = if total == 0 {
            0.0
        } else {
            entry.count as f64 * 100.0 / total as f64
        };
        println!("{:>6} | {:<23} | {:>6} | {:.2}%", entry.opcode, entry.name, entry.count, pct);
    }
}
