use cartograph_core::{
    Database, ExploreOptions, Explorer, FirstAvailable, GraphExport, GraphStore, MemoryGraphStore,
    ReportFormat, RunError, RunSummary, ScriptedSelector, derive_test_cases, extract_flows,
    generate_management_export, generate_markdown_report, save_report,
};
use cartograph_explorer::{DiffPolicy, Driver, SubprocessDriver};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;
use url::Url;

pub fn print_banner() {
    println!(
        "{}",
        r#"
   ___          _                             _
  / __\__ _ _ _| |_ ___   __ _ _ __ __ _ _ __| |__
 / /  / _` | '__| __/ _ \ / _` | '__/ _` | '_ \ '_ \
/ /__| (_| | |  | || (_) | (_| | | | (_| | |_) | | |
\____/\__,_|_|   \__\___/ \__, |_|  \__,_| .__/|_| |_|
                          |___/          |_|
"#
        .bright_cyan()
    );
    println!(
        "{}",
        "Autonomous app exploration and QA test-flow derivation\n".bright_white()
    );
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub async fn handle_explore(sub_matches: &ArgMatches) {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let url = sub_matches.get_one::<Url>("url").unwrap();
    let driver_cmd = sub_matches.get_one::<String>("driver-cmd").unwrap();
    let max_places = sub_matches.get_one::<usize>("max-places").copied();
    let max_depth = sub_matches.get_one::<usize>("max-depth").copied();
    let content_threshold = *sub_matches.get_one::<usize>("content-threshold").unwrap();
    let volatile_patterns: Vec<String> = sub_matches
        .get_many::<String>("volatile")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();
    let db_path = sub_matches.get_one::<PathBuf>("db").map(|p| expand_path(p));
    let output_dir = sub_matches
        .get_one::<PathBuf>("output")
        .map(|p| expand_path(p));
    let script = sub_matches
        .get_one::<PathBuf>("script")
        .map(|p| expand_path(p));

    let driver = match spawn_driver(driver_cmd) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("✗ Failed to start driver '{}': {}", driver_cmd, e);
            std::process::exit(1);
        }
    };

    let selector: Box<dyn cartograph_core::ActionSelector> = match &script {
        Some(path) => match fs::read_to_string(path) {
            Ok(text) => Box::new(ScriptedSelector::from_lines(&text)),
            Err(e) => {
                eprintln!("✗ Failed to read script {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Box::new(FirstAvailable),
    };

    let options = ExploreOptions {
        root_address: url.as_str().to_string(),
        max_places,
        max_depth,
        diff_policy: DiffPolicy {
            content_change_threshold: content_threshold,
        },
        volatile_patterns,
        evidence_dir: output_dir.as_ref().map(|dir| dir.join("evidence")),
    };

    println!("\n🧭 Exploring {}", url);
    if let Some(n) = max_places {
        println!("Place budget: {}", n);
    }
    if let Some(n) = max_depth {
        println!("Max depth: {}", n);
    }
    println!();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Exploring {}...", url));

    match &db_path {
        Some(path) => {
            let store = match Database::create_run(path, url.as_str()) {
                Ok(store) => store,
                Err(e) => {
                    eprintln!("✗ Failed to open database {}: {}", path.display(), e);
                    std::process::exit(1);
                }
            };
            let mut explorer = Explorer::new(store, driver, selector, options);
            install_stop_signal(&explorer);
            let result = explorer.run().await;
            let store = explorer.into_store();
            spinner.finish_and_clear();
            match result {
                Ok(summary) => {
                    if let Err(e) = store.complete_run(summary.termination.as_str()) {
                        eprintln!("⚠ Failed to mark run completed: {}", e);
                    }
                    finish_run(&store, summary, output_dir);
                }
                Err(e) => {
                    let _ = store.abort_run(&e.to_string());
                    fail_run(&store, e, output_dir);
                }
            }
        }
        None => {
            let store = MemoryGraphStore::new();
            let mut explorer = Explorer::new(store, driver, selector, options);
            install_stop_signal(&explorer);
            let result = explorer.run().await;
            let store = explorer.into_store();
            spinner.finish_and_clear();
            match result {
                Ok(summary) => finish_run(&store, summary, output_dir),
                Err(e) => fail_run(&store, e, output_dir),
            }
        }
    }
}

/// Expand a leading tilde so `--db ~/runs/x.db` lands under the home
/// directory instead of a literal `~` entry in the working directory.
fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
}

/// Split the driver command line and expand a leading tilde on the program.
fn spawn_driver(command_line: &str) -> cartograph_explorer::Result<Box<dyn Driver>> {
    let mut parts = command_line.split_whitespace();
    let program = parts.next().unwrap_or_default();
    let program = shellexpand::tilde(program).to_string();
    let args: Vec<String> = parts.map(String::from).collect();
    Ok(Box::new(SubprocessDriver::spawn(&program, &args)?))
}

fn install_stop_signal<S: GraphStore>(explorer: &Explorer<S>) {
    let stop = explorer.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.store(true, Ordering::Relaxed);
        }
    });
}

fn finish_run<S: GraphStore>(store: &S, summary: RunSummary, output_dir: Option<PathBuf>) {
    println!("\n✓ Exploration complete!\n");
    print_divider();
    println!("{}", "  RUN SUMMARY".bright_white().bold());
    print_divider();
    println!(
        "{} Places discovered:  {}",
        "✓".green().bold(),
        summary.places_discovered.to_string().bright_white()
    );
    println!(
        "{} Actions attempted:  {}",
        "✓".green().bold(),
        summary.actions_attempted.to_string().bright_white()
    );
    if summary.actions_failed > 0 {
        println!(
            "{} Actions failed:     {}",
            "⚠".yellow().bold(),
            summary.actions_failed.to_string().yellow()
        );
    } else {
        println!("{} Actions failed:     0", "✓".green().bold());
    }
    println!(
        "{} Termination:        {}",
        "→".blue(),
        summary.termination.to_string().bright_white()
    );
    println!();

    write_graph_export(store, output_dir);
}

fn fail_run<S: GraphStore>(store: &S, error: RunError, output_dir: Option<PathBuf>) {
    eprintln!("✗ Exploration failed: {}", error);
    // The graph stays exportable even after an aborted run.
    write_graph_export(store, output_dir);
    std::process::exit(1);
}

fn write_graph_export<S: GraphStore>(store: &S, output_dir: Option<PathBuf>) {
    let export = match store.export() {
        Ok(export) => export,
        Err(e) => {
            eprintln!("✗ Failed to export graph: {}", e);
            return;
        }
    };
    let Some(dir) = output_dir else {
        return;
    };
    if let Err(e) = fs::create_dir_all(&dir) {
        eprintln!("✗ Failed to create output directory: {}", e);
        return;
    }
    let path = dir.join("graph.json");
    match export.to_json_pretty() {
        Ok(json) => match fs::write(&path, json) {
            Ok(()) => println!(
                "{} Graph exported: {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            ),
            Err(e) => eprintln!("✗ Failed to write {}: {}", path.display(), e),
        },
        Err(e) => eprintln!("✗ Failed to serialize graph: {}", e),
    }
}

pub fn handle_export(sub_matches: &ArgMatches) {
    let db_path = expand_path(sub_matches.get_one::<PathBuf>("db").unwrap());
    let output = sub_matches
        .get_one::<PathBuf>("output")
        .map(|p| expand_path(p));

    let export = match load_export(&db_path) {
        Ok(export) => export,
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    let json = match export.to_json_pretty() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("✗ Failed to serialize graph: {}", e);
            std::process::exit(1);
        }
    };

    match &output {
        Some(path) => match fs::write(path, &json) {
            Ok(()) => println!(
                "{} Graph exported: {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            ),
            Err(e) => {
                eprintln!("✗ Failed to write {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => println!("{}", json),
    }
}

pub fn handle_report(sub_matches: &ArgMatches) {
    let db_path = expand_path(sub_matches.get_one::<PathBuf>("db").unwrap());
    let format = sub_matches.get_one::<String>("format").unwrap();
    let output = sub_matches
        .get_one::<PathBuf>("output")
        .map(|p| expand_path(p));

    let export = match load_export(&db_path) {
        Ok(export) => export,
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    let flows = extract_flows(&export);
    let cases = derive_test_cases(&export, &flows);

    let content = match ReportFormat::from_str(format) {
        Some(ReportFormat::Markdown) => generate_markdown_report(&export, &cases),
        Some(ReportFormat::Json) => match generate_management_export(&export, &cases) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("✗ Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            eprintln!("✗ Unknown report format: {}", format);
            std::process::exit(1);
        }
    };

    match &output {
        Some(path) => match save_report(&content, path) {
            Ok(()) => println!(
                "{} Report saved: {} ({} test cases)",
                "✓".green().bold(),
                path.display().to_string().bright_white(),
                cases.len().to_string().cyan()
            ),
            Err(e) => {
                eprintln!("✗ Failed to save report to {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => print!("{}", content),
    }
}

fn load_export(db_path: &Path) -> Result<GraphExport, String> {
    if !Database::exists(db_path) {
        return Err(format!("No database found at {}", db_path.display()));
    }
    let db = Database::open_latest(db_path)
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))?;
    db.export()
        .map_err(|e| format!("Failed to export graph: {}", e))
}
