//! # Garbage Collection
//!
//! `fstore clean`: age-based sweep of the store.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use fstore_cas::{CleanStats, Store};
use fstore_config::{format_duration, log_gc_debug, log_gc_info, parse_duration};

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Remove blobs not used for this long (e.g. "1h", "30d"); "0" wipes the store.
    /// Defaults to `gc.lifetime` from the config.
    #[arg(long)]
    pub lifetime: Option<String>,
}

pub fn run(store: &Store, default_lifetime: Duration, args: CleanArgs) -> Result<CleanStats> {
    let lifetime = match args.lifetime {
        Some(value) => parse_duration(&value)?,
        None => default_lifetime,
    };
    let root = store.root().display().to_string();
    let lifetime_str = format_duration(lifetime);
    log_gc_info!(
        "Starting sweep",
        root = root.as_str(),
        lifetime = lifetime_str.as_str()
    );

    let stats = store
        .clean(lifetime)
        .with_context(|| format!("Failed to clean {}", store.root().display()))?;
    log_gc_debug!(
        "Sweep finished",
        removed_blobs = stats.removed_blobs,
        removed_dirs = stats.removed_dirs,
        skipped = stats.skipped
    );
    print_report(store.root(), lifetime, &stats);
    Ok(stats)
}

fn print_report(root: &Path, lifetime: Duration, stats: &CleanStats) {
    println!();
    println!("  fstore garbage collection");
    println!("  =========================");
    println!("    Root:      {}", root.display());
    if stats.reset {
        println!("    Store reset: all blobs removed");
        println!();
        return;
    }
    println!("    Lifetime:  {}", format_duration(lifetime));
    println!(
        "    Removed:   {} blobs ({})",
        format_number(stats.removed_blobs),
        format_bytes(stats.removed_bytes)
    );
    if stats.removed_temp_files > 0 {
        println!(
            "    Orphans:   {} temporary files",
            format_number(stats.removed_temp_files)
        );
    }
    println!("    Pruned:    {} directories", format_number(stats.removed_dirs));
    if stats.skipped > 0 {
        println!("    Skipped:   {} entries", format_number(stats.skipped));
    }
    println!();
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format number with comma separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 bytes");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_explicit_lifetime_overrides_default() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("blobs")).unwrap();
        store.create("", &b"kept"[..]).unwrap();

        let args = CleanArgs {
            lifetime: Some("0".to_string()),
        };
        let stats = run(&store, Duration::from_secs(3600), args).unwrap();
        assert!(stats.reset);
        assert!(!store.root().exists());
    }

    #[test]
    fn test_invalid_lifetime_flag() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path()).unwrap();
        let args = CleanArgs {
            lifetime: Some("forever".to_string()),
        };
        assert!(run(&store, Duration::from_secs(60), args).is_err());
    }
}
