use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taxon_core::data::{Database, RunKind};
use taxon_core::pipeline::{
    OfflineInputs, OutputLayout, PipelineConfig, reconcile_files, run_offline, scrape_nodes,
    verify_files, write_closure, write_sources,
};
use taxon_core::report::{
    PipelineReport, ReportFormat, generate_json_report, generate_text_report, save_report,
};
use taxon_core::model::ROOT_PARENT;
use taxon_core::scrape::{NodeFetchOptions, TreeSource, load_tree};
use taxon_core::{
    ClosureOutcome, CoverageReport, ExclusionPolicy, JoinSpec, Lineage, Reconciliation,
    SupplementalMapping, TruncationKind, VerificationReport,
};
use url::Url;

/// Whether a command that ran to completion should still exit non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Passed,
    Failed,
}

impl CommandStatus {
    fn from_passed(passed: bool) -> Self {
        if passed {
            CommandStatus::Passed
        } else {
            CommandStatus::Failed
        }
    }
}

/// Expand `~` and environment variables in a user supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

fn expand_path_buf(path: &Path) -> PathBuf {
    expand_path(&path.to_string_lossy())
}

/// Parse a comma separated list of node ids; blank means none.
pub fn parse_id_list(text: &str) -> Result<Vec<i64>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .with_context(|| format!("'{}' is not a node id", part))
        })
        .collect()
}

/// Built-in NUCC defaults, with lineages and supplemental attributes
/// replaced by JSON files when given.
pub fn load_pipeline_config(
    lineages: Option<&Path>,
    supplemental: Option<&Path>,
) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();
    if let Some(path) = lineages {
        config.lineages = Lineage::from_json_file(path)
            .with_context(|| format!("Failed to load lineages from {}", path.display()))?;
    }
    if let Some(path) = supplemental {
        config.supplemental = SupplementalMapping::from_json_file(path)
            .with_context(|| format!("Failed to load supplemental mapping from {}", path.display()))?;
    }
    Ok(config)
}

fn layout_from(args: &ArgMatches) -> OutputLayout {
    let data_dir = args
        .get_one::<String>("data-dir")
        .map(|d| expand_path(d))
        .unwrap_or_else(|| PathBuf::from("data"));
    OutputLayout::in_dir(data_dir)
}

fn path_or(args: &ArgMatches, name: &str, default: &Path) -> PathBuf {
    args.get_one::<PathBuf>(name)
        .map(|p| expand_path_buf(p))
        .unwrap_or_else(|| default.to_path_buf())
}

fn optional_path(args: &ArgMatches, name: &str) -> Option<PathBuf> {
    args.get_one::<PathBuf>(name).map(|p| expand_path_buf(p))
}

fn open_database(args: &ArgMatches) -> Result<Option<Database>> {
    let Some(raw) = args.get_one::<String>("db") else {
        return Ok(None);
    };
    let path = expand_path(raw);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = Database::new(&path)
        .with_context(|| format!("Failed to open run ledger at {}", path.display()))?;
    Ok(Some(db))
}

fn print_header(title: &str) {
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!("{}", format!("  {}", title).bright_white().bold());
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_done(message: String) {
    println!("{} {}", "✓".green().bold(), message);
}

fn print_warning(message: String) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

fn print_closure_summary(outcome: &ClosureOutcome, path: &Path) {
    print_done(format!(
        "{} ancestor edges over {} nodes written to {}",
        outcome.closure.len().to_string().cyan(),
        outcome.closure.node_universe().len(),
        path.display().to_string().bright_white()
    ));

    let diagnostics = &outcome.diagnostics;
    if !diagnostics.skipped_excluded.is_empty() {
        println!(
            "{} {} excluded nodes left out",
            "→".blue(),
            diagnostics.skipped_excluded.len()
        );
    }
    for (kind, label) in [
        (TruncationKind::Excluded, "chains stop at an excluded node"),
        (TruncationKind::Dangling, "chains stop at a missing parent"),
        (TruncationKind::Cycle, "chains stop at a cycle"),
    ] {
        let count = diagnostics.count(kind);
        if count > 0 {
            print_warning(format!("{} {}", count, label));
        }
    }
    if !diagnostics.duplicate_ids.is_empty() {
        print_warning(format!(
            "{} duplicate node ids (last record wins)",
            diagnostics.duplicate_ids.len()
        ));
    }
}

fn print_reconciliation_summary(reconciliation: &Reconciliation, merged: &Path) {
    let counts = reconciliation.counts;
    print_done(format!(
        "{} reconciled rows written to {}",
        counts.total().to_string().cyan(),
        merged.display().to_string().bright_white()
    ));
    println!("  {} both:       {}", "•".blue(), counts.both);
    println!("  {} left only:  {}", "•".blue(), counts.left_only);
    println!("  {} right only: {}", "•".blue(), counts.right_only);

    let conflicts = &reconciliation.conflicts;
    if !conflicts.is_clean() {
        print_warning(format!(
            "join conflicts: {} duplicate left keys, {} duplicate right keys, {} fan-out rows, {} unidentified rows",
            conflicts.left_duplicate_keys.len(),
            conflicts.right_duplicate_keys.len(),
            conflicts.fanout_rows,
            conflicts.unidentified_rows
        ));
    }
}

fn print_coverage(coverage: &CoverageReport, missing_listing: &Path) {
    if coverage.is_complete() {
        print_done(format!(
            "all {} closure nodes present in the reconciled table",
            coverage.expected
        ));
    } else {
        print_warning(format!(
            "{} of {} closure nodes missing, listed in {}",
            coverage.missing.len(),
            coverage.expected,
            missing_listing.display().to_string().bright_white()
        ));
    }
}

fn print_verification(verification: &VerificationReport) {
    for result in &verification.results {
        let mark = if result.passed() {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        };
        println!("  {} {}: {}", mark, result.lineage.name, result.agreement.description());
    }
    if verification.all_passed() {
        print_done(format!("{} lineages verified", verification.results.len()));
    } else {
        println!(
            "{} {} of {} lineages failed",
            "✗".red().bold(),
            verification.failed_count(),
            verification.results.len()
        );
    }
}

pub async fn handle_ancestors(args: &ArgMatches) -> Result<CommandStatus> {
    let layout = layout_from(args);
    let timeout = *args.get_one::<u64>("timeout").unwrap_or(&30);
    let excluded = parse_id_list(
        args.get_one::<String>("exclude")
            .map(String::as_str)
            .unwrap_or(""),
    )?;
    let policy = ExclusionPolicy::new(excluded, ROOT_PARENT);

    let source = match optional_path(args, "tree-file") {
        Some(path) => TreeSource::File(path),
        None => {
            let url = args
                .get_one::<Url>("url")
                .context("either --url or --tree-file must be provided")?;
            TreeSource::Url(url.as_str().to_string())
        }
    };

    let tree = load_tree(&source, timeout)
        .await
        .with_context(|| format!("Failed to load the taxonomy tree from {:?}", source))?;
    if tree.is_empty() {
        bail!("the taxonomy tree has no nodes");
    }

    let outcome = write_closure(&tree, &policy, &layout).context("Failed to build the closure")?;
    print_closure_summary(&outcome, &layout.ancestors);
    Ok(CommandStatus::Passed)
}

pub async fn handle_nodes(args: &ArgMatches) -> Result<CommandStatus> {
    let layout = layout_from(args);
    let base_url = args
        .get_one::<Url>("base-url")
        .map(|u| u.as_str().to_string())
        .unwrap_or_else(|| taxon_scanner::fetcher::DEFAULT_BASE_URL.to_string());

    let mut options = NodeFetchOptions::new(base_url, &layout.page_cache);
    options.workers = *args.get_one::<usize>("workers").unwrap_or(&8);
    options.max_age =
        Duration::from_secs(args.get_one::<u64>("max-age-hours").unwrap_or(&24) * 60 * 60);
    options.timeout_secs = *args.get_one::<u64>("timeout").unwrap_or(&30);
    options.show_progress_bars = !args.get_flag("quiet");

    let outcome = scrape_nodes(&layout, &options)
        .await
        .context("Failed to fetch node pages")?;

    print_done(format!(
        "{} node records written to {} ({} cached, {} downloaded)",
        outcome.records.len().to_string().cyan(),
        layout.nodes.display().to_string().bright_white(),
        outcome.cached,
        outcome.downloaded
    ));
    if !outcome.failed.is_empty() {
        print_warning(format!(
            "{} node pages could not be fetched: {}",
            outcome.failed.len(),
            outcome.failed.join(", ")
        ));
    }
    Ok(CommandStatus::Passed)
}

pub fn handle_reconcile(args: &ArgMatches) -> Result<CommandStatus> {
    let layout = layout_from(args);
    let download = path_or(args, "download-csv", Path::new(""));
    let scraped = path_or(args, "scraped-csv", Path::new(""));
    let ancestors = match optional_path(args, "ancestors") {
        Some(path) => Some(path),
        None => layout.ancestors.exists().then(|| layout.ancestors.clone()),
    };

    let output = reconcile_files(
        &download,
        &scraped,
        ancestors.as_deref(),
        &layout,
        &JoinSpec::nucc(),
    )
    .context("Failed to reconcile the two tables")?;

    print_reconciliation_summary(&output.reconciliation, &layout.merged);
    if let Some(coverage) = &output.coverage {
        print_coverage(coverage, &layout.missing);
    }
    Ok(CommandStatus::Passed)
}

pub fn handle_verify(args: &ArgMatches) -> Result<CommandStatus> {
    let layout = layout_from(args);
    let ancestors = path_or(args, "ancestors", &layout.ancestors);
    let merged = path_or(args, "merged", &layout.merged);
    let config = load_pipeline_config(
        optional_path(args, "lineages").as_deref(),
        optional_path(args, "supplemental").as_deref(),
    )?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = match format {
        ReportFormat::Text => path_or(args, "output", &layout.report_text),
        ReportFormat::Json => path_or(args, "output", &layout.report_json),
    };

    let mut db = open_database(args)?;
    let run_id = match db.as_ref() {
        Some(db) => Some(db.create_run(
            RunKind::Verify,
            &serde_json::json!({
                "ancestors": ancestors.display().to_string(),
                "merged": merged.display().to_string(),
            })
            .to_string(),
        )?),
        None => None,
    };

    let verification = match verify_files(&ancestors, &merged, &config) {
        Ok(verification) => verification,
        Err(e) => {
            if let (Some(db), Some(run_id)) = (db.as_ref(), run_id.as_deref()) {
                db.fail_run(run_id)?;
            }
            return Err(e).context("Failed to verify lineages");
        }
    };

    if let (Some(db), Some(run_id)) = (db.as_mut(), run_id.as_deref()) {
        db.insert_lineage_results(run_id, &verification.results)?;
        if verification.all_passed() {
            db.complete_run(run_id)?;
        } else {
            db.fail_run(run_id)?;
        }
    }

    let report = PipelineReport {
        run_id,
        verification: Some(verification),
        ..Default::default()
    };
    let content = match format {
        ReportFormat::Text => generate_text_report(&report),
        ReportFormat::Json => generate_json_report(&report)?,
    };
    save_report(&content, &output)
        .with_context(|| format!("Failed to save report to {}", output.display()))?;

    if let Some(verification) = &report.verification {
        print_verification(verification);
    }
    print_done(format!(
        "Report saved to {}",
        output.display().to_string().bright_white()
    ));
    Ok(CommandStatus::from_passed(report.passed()))
}

pub fn handle_sources(args: &ArgMatches) -> Result<CommandStatus> {
    let layout = layout_from(args);
    let nodes = path_or(args, "nodes-csv", &layout.nodes);
    let output = path_or(args, "output", &layout.sources);

    let count = write_sources(&nodes, &output)
        .with_context(|| format!("Failed to extract sources from {}", nodes.display()))?;
    print_done(format!(
        "{} citation rows written to {}",
        count.to_string().cyan(),
        output.display().to_string().bright_white()
    ));
    Ok(CommandStatus::Passed)
}

pub fn handle_run(args: &ArgMatches) -> Result<CommandStatus> {
    let layout = layout_from(args);
    let inputs = OfflineInputs {
        tree_file: path_or(args, "tree-file", Path::new("")),
        download_csv: path_or(args, "download-csv", Path::new("")),
        scraped_csv: path_or(args, "scraped-csv", Path::new("")),
    };
    let config = load_pipeline_config(
        optional_path(args, "lineages").as_deref(),
        optional_path(args, "supplemental").as_deref(),
    )?;
    let mut db = open_database(args)?;

    if !args.get_flag("quiet") {
        print_header("TAXON RUN");
        println!(
            "{} Data directory: {}",
            "→".blue(),
            layout.data_dir.display().to_string().bright_white()
        );
        println!();
    }

    let report = run_offline(&inputs, &layout, &config, db.as_mut()).context("Run failed")?;

    if let Some(closure) = &report.closure {
        print_done(format!(
            "{} ancestor edges over {} nodes",
            closure.edges.to_string().cyan(),
            closure.nodes
        ));
    }
    if let Some(reconciliation) = &report.reconciliation {
        let counts = reconciliation.counts;
        print_done(format!(
            "{} reconciled rows ({} both, {} left only, {} right only)",
            counts.total().to_string().cyan(),
            counts.both,
            counts.left_only,
            counts.right_only
        ));
    }
    if let Some(coverage) = &report.coverage {
        print_coverage(coverage, &layout.missing);
    }
    if let Some(verification) = &report.verification {
        print_verification(verification);
    }
    if let Some(run_id) = &report.run_id {
        println!("{} Run ID: {}", "→".blue(), run_id.bright_white());
    }
    print_done(format!(
        "Reports saved to {}",
        layout.data_dir.display().to_string().bright_white()
    ));

    Ok(CommandStatus::from_passed(report.passed()))
}
