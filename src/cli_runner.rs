//! Command dispatch for the `mtar` binary.
//!
//! Runs one parsed [`Commands`] value against the library and renders its
//! result. Command output goes to the supplied writer (stdout in the binary);
//! diagnostics go through `tracing`.

use std::io::{self, Write};

use crate::archive::Entry;
use crate::cli::Commands;
use crate::error::{ArchiverError, Result};
use crate::extract::{self, ExtractOptions, ListedEntry};
use crate::workers::{self, CreateOptions};

/// Executes `command`, printing its output to `out`.
pub fn run_command<W: Write>(command: &Commands, out: &mut W) -> Result<()> {
    match command {
        Commands::Create { archive, source, level, threads, skip_check } => {
            let options = CreateOptions { level: *level, threads: *threads };
            let summary = workers::create_archive(archive, source, &options)?;
            if !*skip_check {
                // Re-read what was just written.
                extract::verify_archive(archive)?;
            }
            writeln!(
                out,
                "{}: {} entries ({} files, {} dirs), {} unique blocks, {} dedup hits, {} -> {} bytes",
                archive.display(),
                summary.entries,
                summary.files,
                summary.directories,
                summary.unique_blocks,
                summary.dedup_hits,
                summary.logical_bytes,
                summary.archive_bytes
            )
            .map_err(stdout_error)?;
        }
        Commands::Extract { archive, dest, threads } => {
            let summary = extract::extract_archive(archive, dest, &ExtractOptions { threads: *threads })?;
            writeln!(
                out,
                "{}: {} files, {} dirs, {} bytes",
                dest.display(),
                summary.files,
                summary.directories,
                summary.bytes_written
            )
            .map_err(stdout_error)?;
        }
        Commands::List { archive, long, json } => {
            let entries = extract::list_archive(archive)?;
            if *json {
                print_json(&entries, out).map_err(stdout_error)?;
            } else {
                print_listing(&entries, *long, out).map_err(stdout_error)?;
            }
        }
        Commands::Verify { archive } => {
            let report = extract::verify_archive(archive)?;
            writeln!(
                out,
                "{}: OK ({} entries, {} blocks, {} bytes)",
                archive.display(),
                report.entries,
                report.blocks,
                report.original_bytes
            )
            .map_err(stdout_error)?;
        }
    }
    out.flush().map_err(stdout_error)
}

fn stdout_error(e: io::Error) -> ArchiverError {
    ArchiverError::io("<stdout>", e)
}

/// One path per line in stored order; directories end with `/`.
///
/// Paths are written as their raw bytes so non-UTF-8 names come out unchanged.
fn print_listing<W: Write>(entries: &[Entry], long: bool, out: &mut W) -> io::Result<()> {
    for entry in entries {
        if long {
            let (kind, fingerprint) = match entry.content_ref() {
                Some(fp) => ('f', fp.short()),
                None => ('d', "-".to_string()),
            };
            write!(out, "{} {:>12} {:<12} ", kind, entry.size(), fingerprint)?;
        }
        out.write_all(entry.path.as_bytes())?;
        if entry.is_dir() {
            out.write_all(b"/")?;
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn print_json<W: Write>(entries: &[Entry], out: &mut W) -> io::Result<()> {
    let listed: Vec<ListedEntry> = entries.iter().map(ListedEntry::from).collect();
    serde_json::to_writer_pretty(&mut *out, &listed)?;
    out.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchivePath;
    use crate::hash::Fingerprint;

    fn sample() -> Vec<Entry> {
        vec![
            Entry::directory(ArchivePath::from_bytes(b"docs".to_vec()).unwrap()),
            Entry::file(ArchivePath::from_bytes(b"docs/a.txt".to_vec()).unwrap(), 5, Fingerprint::of(b"hello")),
        ]
    }

    #[test]
    fn plain_listing_marks_directories() -> Result<(), Box<dyn std::error::Error>> {
        let mut out = Vec::new();
        print_listing(&sample(), false, &mut out)?;
        assert_eq!(String::from_utf8(out)?, "docs/\ndocs/a.txt\n");
        Ok(())
    }

    #[test]
    fn long_listing_has_kind_size_and_fingerprint() -> Result<(), Box<dyn std::error::Error>> {
        let mut out = Vec::new();
        print_listing(&sample(), true, &mut out)?;
        let text = String::from_utf8(out)?;
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("d "));
        assert!(lines[0].ends_with(" docs/"));
        assert!(lines[1].starts_with("f "));
        assert!(lines[1].contains(&Fingerprint::of(b"hello").short()));
        assert!(lines[1].ends_with(" docs/a.txt"));
        Ok(())
    }

    #[test]
    fn json_listing_is_an_array() -> Result<(), Box<dyn std::error::Error>> {
        let mut out = Vec::new();
        print_json(&sample(), &mut out)?;
        let value: serde_json::Value = serde_json::from_slice(&out)?;
        let items = value.as_array().ok_or("not an array")?;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["kind"], "directory");
        assert_eq!(items[1]["size"], 5);
        Ok(())
    }
}
