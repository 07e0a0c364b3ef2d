//! Document index overview.
//!
//! Used by `cyd index` to confirm which index the server will load and that
//! it matches the configured embedding model.

use anyhow::Result;

use crate::config::Config;
use crate::index::DocumentIndex;

/// Load the index and print a summary.
pub fn run_index_stats(config: &Config) -> Result<()> {
    let path = &config.index.path;
    let index = DocumentIndex::load(path)?;

    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let counts = index.source_counts();

    println!("Chat-Your-Data: Document Index");
    println!("===============================");
    println!();
    println!("  Index:       {}", path.display());
    println!("  Size:        {}", format_bytes(file_size));
    println!("  SHA-256:     {}", index.fingerprint());
    println!();
    println!("  Chunks:      {}", index.len());
    println!("  Sources:     {}", counts.len());
    println!("  Dimensions:  {}", index.dims());
    println!(
        "  Model:       {}",
        index.embedding_model().unwrap_or("(not recorded)")
    );

    if let Some(model) = index.embedding_model() {
        if model != config.openai.embedding_model {
            println!(
                "  WARNING:     queries will be embedded with '{}'",
                config.openai.embedding_model
            );
        }
    }

    if !counts.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(57));
        for (source, count) in &counts {
            println!("  {:<48} {:>8}", source, count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
