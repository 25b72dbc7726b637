use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use takeout_scout_core::{
    compare_against_index, find_sources, scan_batch, BatchOutcome, CancellationToken,
    ChangeReport, DiscoveryStore, GroupSummary, ScanControl, ScanOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "takeout-scout", version, about = "Google Takeout scout - inspect zip/tgz exports without extraction")]
struct Cli {
    /// Folder holding discoveries_index.json and takeouts_discovered/
    #[arg(long, global = true, default_value = ".")]
    store: PathBuf,

    /// JSON file with scan options; flags below override it
    #[arg(long, global = true)]
    options: Option<PathBuf>,

    /// Log at info level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan sources and record what they contain
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Treat each path as a root and scan every Takeout source under it
        #[arg(long)]
        find: bool,

        /// Do not write discovery records
        #[arg(long)]
        no_save: bool,

        /// Print every entry of every source
        #[arg(long)]
        details: bool,

        /// Write the per-group summary to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Show new, missing and changed sources without scanning
    Compare {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long)]
        find: bool,
    },
    /// List every recorded source
    List,
    /// Print one record as JSON
    Show { path: PathBuf },
    /// Remove one record from the store
    Forget { path: PathBuf },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_options(path: Option<&Path>) -> anyhow::Result<ScanOptions> {
    let Some(path) = path else {
        return Ok(ScanOptions::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading options from {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing options in {}", path.display()))
}

fn expand_sources(paths: Vec<PathBuf>, find: bool) -> anyhow::Result<Vec<PathBuf>> {
    if !find {
        return Ok(paths);
    }
    let mut sources = Vec::new();
    for root in &paths {
        let found = find_sources(root)?;
        if found.is_empty() {
            eprintln!("No Takeout sources under {}", root.display());
        }
        sources.extend(found);
    }
    sources.sort();
    sources.dedup();
    Ok(sources)
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} [{prefix}] {wide_msg}") {
        pb.set_style(style);
    }
    pb
}

const CSV_HEADER: [&str; 15] = [
    "Group",
    "Parts",
    "Service",
    "Files",
    "Photos",
    "Videos",
    "JSON Sidecars",
    "Other",
    "Compressed Size (bytes)",
    "Photos w/EXIF",
    "Photos w/GPS",
    "Photos w/DateTime",
    "Photos Checked",
    "Live Photos",
    "Photo+JSON",
];

fn group_row(group: &GroupSummary) -> Vec<String> {
    let c = &group.counts;
    let mut row = vec![
        group.group.clone(),
        group.parts.len().to_string(),
        group.service_guess.clone(),
    ];
    row.extend(
        [
            c.file_count,
            c.photos,
            c.videos,
            c.json_sidecars,
            c.other,
            c.compressed_size,
            c.photos_with_exif,
            c.photos_with_gps,
            c.photos_with_datetime,
            c.photos_checked,
            c.live_photos,
            c.photo_json_pairs,
        ]
        .map(|n| n.to_string()),
    );
    row
}

fn write_groups_csv<W: io::Write>(groups: &[GroupSummary], out: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER)?;
    for group in groups {
        writer.write_record(group_row(group))?;
    }
    writer.flush()?;
    Ok(())
}

fn print_changes(changes: &ChangeReport) {
    if changes.is_empty() {
        println!("No changes against the index.");
        return;
    }
    for (label, paths) in [
        ("new", &changes.new),
        ("missing", &changes.missing),
        ("changed", &changes.changed),
    ] {
        for path in paths {
            println!("  {label:<8} {path}");
        }
    }
}

fn print_outcome(outcome: &BatchOutcome, details: bool) {
    for result in &outcome.results {
        match result {
            Ok(report) => {
                let s = &report.summary;
                let c = &s.counts;
                println!(
                    "{} [{}] {} files: {} photos, {} videos, {} json, {} other ({}) - {}",
                    s.path,
                    s.source_type,
                    c.file_count,
                    c.photos,
                    c.videos,
                    c.json_sidecars,
                    c.other,
                    human_size(c.total_bytes),
                    s.service_guess,
                );
                if c.unreadable_entries > 0 {
                    println!("    {} entries could not be read, counts are partial", c.unreadable_entries);
                }
                if details {
                    for file in &report.files {
                        println!("    {:>10}  {:<6}  {}", file.size, file.file_type.as_str(), file.path);
                    }
                }
            }
            Err(failure) => println!("{} FAILED: {}", failure.path.display(), failure.error),
        }
    }

    if !outcome.groups.is_empty() {
        println!();
        println!("Groups:");
        for group in &outcome.groups {
            let c = &group.counts;
            println!(
                "  {} ({} part{}) {}: {} files, {} photos ({} with EXIF, {} with GPS), {} videos, {}",
                group.group,
                group.parts.len(),
                if group.parts.len() == 1 { "" } else { "s" },
                group.service_guess,
                c.file_count,
                c.photos,
                c.photos_with_exif,
                c.photos_with_gps,
                c.videos,
                human_size(c.compressed_size),
            );
        }
    }

    println!();
    println!("Changes:");
    print_changes(&outcome.changes);

    let deltas: Vec<_> = outcome.deltas.iter().filter(|d| !d.is_empty()).collect();
    if !deltas.is_empty() {
        println!();
        println!("Content deltas:");
        for d in deltas {
            println!(
                "  {}: files {:+}, photos {:+}, videos {:+}, json {:+}, other {:+}, bytes {:+}",
                d.path, d.file_count, d.photos, d.videos, d.json_sidecars, d.other, d.total_bytes
            );
        }
    }
}

fn run_scan(
    store: &DiscoveryStore,
    mut options: ScanOptions,
    sources: Vec<PathBuf>,
    no_save: bool,
    details: bool,
    csv_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    if sources.is_empty() {
        bail!("nothing to scan");
    }
    if no_save {
        options.save_discovery = false;
    }
    options.keep_file_details = details;

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("installing Ctrl-C handler")?;
    let control = ScanControl::new().with_cancel_token(token.clone());

    let t_total = std::time::Instant::now();
    let pb = spinner();
    let outcome = scan_batch(&sources, &options, store, &control, &|stage, current, total, message| {
        pb.set_prefix(stage.to_string());
        if total == 0 {
            pb.set_message(format!("{} {message}", current + 1));
        } else {
            pb.set_message(format!("{}/{} {message}", current.min(total), total));
        }
    })?;
    pb.finish_and_clear();

    if token.is_cancelled() {
        bail!("scan cancelled");
    }

    print_outcome(&outcome, details);
    if let Some(path) = csv_path {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        write_groups_csv(&outcome.groups, file)?;
        eprintln!("Wrote {} group rows to {}", outcome.groups.len(), path.display());
    }

    let failed = outcome.failures().count();
    eprintln!(
        "Done! {} sources scanned, {} failed ({:.2}s)",
        outcome.results.len() - failed,
        failed,
        t_total.elapsed().as_secs_f64()
    );
    if failed > 0 {
        bail!("{failed} source(s) could not be scanned");
    }
    Ok(())
}

fn run_list(store: &DiscoveryStore) -> anyhow::Result<()> {
    let records = store.list_all()?;
    if records.is_empty() {
        println!("No discoveries in {}", store.root().display());
        return Ok(());
    }
    for (path, record) in records {
        let c = &record.counts;
        println!(
            "{path}\n    scans: {}, last: {}, group: {}, service: {}\n    {} files, {} photos, {} videos, {} json, {} other, {}",
            record.scan_count,
            record.last_scanned.format("%Y-%m-%d %H:%M:%S"),
            record.parts_group,
            record.service_guess,
            c.file_count,
            c.photos,
            c.videos,
            c.json_sidecars,
            c.other,
            human_size(c.total_bytes),
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = DiscoveryStore::open(&cli.store)
        .with_context(|| format!("opening store at {}", cli.store.display()))?;

    match cli.command {
        Command::Scan {
            paths,
            find,
            no_save,
            details,
            csv,
        } => {
            let options = load_options(cli.options.as_deref())?;
            let sources = expand_sources(paths, find)?;
            run_scan(&store, options, sources, no_save, details, csv)
        }
        Command::Compare { paths, find } => {
            let sources = expand_sources(paths, find)?;
            print_changes(&compare_against_index(&store, &sources)?);
            Ok(())
        }
        Command::List => run_list(&store),
        Command::Show { path } => match store.load(&path)? {
            Some(record) => {
                println!("{}", serde_json::to_string_pretty(&record)?);
                Ok(())
            }
            None => bail!("no record for {}", path.display()),
        },
        Command::Forget { path } => {
            if store.forget(&path)? {
                println!("Forgot {}", path.display());
            } else {
                println!("No record for {}", path.display());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeout_scout_core::ContentCounts;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_groups_csv_layout() {
        let group = GroupSummary {
            group: "takeout-20240101T000000Z".to_string(),
            parts: vec!["a".to_string(), "b".to_string()],
            service_guess: "Google Photos".to_string(),
            counts: ContentCounts {
                file_count: 7,
                photos: 3,
                compressed_size: 4096,
                live_photos: 1,
                ..Default::default()
            },
        };
        let mut out = Vec::new();
        write_groups_csv(&[group], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap().split(',').count(), 15);
        assert_eq!(
            lines.next().unwrap(),
            "takeout-20240101T000000Z,2,Google Photos,7,3,0,0,0,4096,0,0,0,0,1,0"
        );
    }
}
