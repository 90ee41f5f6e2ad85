use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use docpatch_diff::{deep, diff, CountedDiff, DiffOptions};
use docpatch_sdk::{run, MemoryConnector, PatchHandle, ProgressSnapshot, RunOptions};
use docpatch_store::{Database, InMemoryDatabase};
use docpatch_stream::{error_chain, FixedModifier};
use docpatch_types::Document;

use crate::cli::*;

const DATA_DB: &str = "memory://data";
const AUDIT_DB: &str = "memory://audit";

/// Dispatches the parsed command.
pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Apply(args) => cmd_apply(args, cli.format).await,
        Command::Diff(args) => cmd_diff(args, cli.format),
    }
}

/// A declarative patch: every document of `collection` matching `query`
/// receives `modifier`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchFile {
    pub version: String,
    pub collection: String,
    #[serde(default)]
    pub query: Document,
    pub modifier: Document,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("parsing {}", path.display()))
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    std::fs::write(path, rendered + "\n").with_context(|| format!("writing {}", path.display()))
}

/// Run options from the config file (if any), overridden by flags.
fn run_options(args: &ApplyArgs) -> anyhow::Result<RunOptions> {
    let mut options = match &args.config {
        Some(path) => RunOptions::from_file(path)?,
        None => RunOptions::default(),
    };
    if options.db.is_empty() {
        options.db = DATA_DB.to_string();
    }
    if let Some(update) = args.update {
        options.update = update;
    }
    if let Some(parallel) = args.parallel {
        options.parallel = parallel;
    }
    if args.log && options.log_db.is_none() {
        options.log_db = Some(AUDIT_DB.to_string());
    }
    if let Some(name) = &args.log_collection {
        options.log_collection = Some(name.clone());
    }
    options.diff_object |= args.diff_object;
    Ok(options)
}

async fn load_data(db: &InMemoryDatabase, data: BTreeMap<String, Vec<Document>>) -> anyhow::Result<u64> {
    let mut loaded = 0;
    for (name, documents) in data {
        let collection = db.create_collection(&name).await?;
        for document in documents {
            collection.insert(document).await?;
            loaded += 1;
        }
    }
    Ok(loaded)
}

fn render_progress(progress: &ProgressSnapshot) -> String {
    let eta = progress
        .eta
        .map(|eta| format!("{eta:.1}s"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>5.1}% {}/{} modified {} skipped {} {:.1} docs/s eta {}",
        progress.percentage,
        progress.count,
        progress.total,
        progress.modified,
        progress.skipped,
        progress.speed,
        eta
    )
}

fn render_counted(diff: &CountedDiff) -> String {
    let mut lines = Vec::new();
    for (path, counts) in diff {
        lines.push(format!(
            "  {}  {} {} {}",
            path.bold(),
            format!("+{}", counts.added).green(),
            format!("-{}", counts.removed).red(),
            format!("~{}", counts.updated).yellow()
        ));
    }
    lines.join("\n")
}

async fn cmd_apply(args: ApplyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let patch: PatchFile = read_json(&args.patch)?;
    let data: BTreeMap<String, Vec<Document>> = read_json(&args.data)?;
    let options = run_options(&args)?;

    let connector = MemoryConnector::new();
    let db = connector.database(&options.db)?;
    let loaded = load_data(&db, data).await?;
    debug!(documents = loaded, db = %options.db, "loaded data");

    let PatchFile {
        version,
        collection,
        query,
        modifier,
    } = patch;
    let mut patch_run = run(
        move |p: &mut PatchHandle| {
            p.version(version).update(collection, query, FixedModifier(modifier));
        },
        options.clone(),
        &connector,
    )
    .await?;

    if format == OutputFormat::Text {
        eprintln!("{} {} ({} documents)", "Running".bold(), patch_run.id().cyan(), patch_run.total());
    }

    let mut last = None;
    while let Some(result) = patch_run.next().await {
        match result {
            Ok(patch) => {
                if format == OutputFormat::Json {
                    println!("{}", serde_json::to_string(&patch)?);
                } else if let Some(progress) = &patch.progress {
                    eprint!("\r{}", render_progress(progress));
                }
                last = patch.progress;
            }
            Err(err) => {
                if format == OutputFormat::Text {
                    eprintln!();
                }
                eprintln!("{} {}", "error:".red().bold(), error_chain(&err));
                if let Some(snapshot) = err.patch() {
                    eprintln!("{}", serde_json::to_string_pretty(snapshot)?);
                }
                return Err(err.into());
            }
        }
    }

    let summary = last.unwrap_or_default();
    if format == OutputFormat::Text {
        eprintln!();
        println!(
            "{} {} documents, {} modified, {} skipped in {:.2}s",
            "✓".green().bold(),
            summary.count,
            summary.modified.to_string().green(),
            summary.skipped.to_string().yellow(),
            summary.time
        );
        if !summary.diff.is_empty() {
            println!("{}", render_counted(&summary.diff));
        }
        if let (Some(log_db), Some(audit)) = (&options.log_db, audit_count(&connector, &options, patch_run.id())?) {
            println!("  audit: {audit} records in {log_db}");
        }
    }

    if let Some(output) = &args.output {
        write_json(output, &db.snapshot())?;
        if format == OutputFormat::Text {
            println!("  wrote {}", output.display().to_string().bold());
        }
    }
    Ok(())
}

fn audit_count(connector: &MemoryConnector, options: &RunOptions, id: &str) -> anyhow::Result<Option<usize>> {
    let Some(log_db) = &options.log_db else {
        return Ok(None);
    };
    let name = options.log_collection.as_deref().unwrap_or(id);
    let records = connector.database(log_db)?.snapshot();
    Ok(Some(records.get(name).map_or(0, Vec::len)))
}

fn cmd_diff(args: DiffArgs, format: OutputFormat) -> anyhow::Result<()> {
    let a: Document = read_json(&args.a)?;
    let b: Document = read_json(&args.b)?;
    let options = DiffOptions { group: args.group };

    if args.counted {
        let counted = diff(&a, &b, options);
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&counted)?),
            OutputFormat::Text if counted.is_empty() => println!("No changes."),
            OutputFormat::Text => println!("{}", render_counted(&counted)),
        }
    } else {
        let labeled = deep(&a, &b, options);
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&labeled)?),
            OutputFormat::Text if labeled == Value::Object(Default::default()) => println!("No changes."),
            OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&labeled)?),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn write(dir: &tempfile::TempDir, name: &str, value: Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn apply_args(patch: PathBuf, data: PathBuf) -> ApplyArgs {
        ApplyArgs {
            patch,
            data,
            update: None,
            parallel: None,
            log: false,
            log_collection: None,
            diff_object: false,
            config: None,
            output: None,
        }
    }

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("docpatch.toml");
        std::fs::write(&config, "update = \"query\"\nparallel = 4\n").unwrap();

        let mut args = apply_args("p.json".into(), "d.json".into());
        args.config = Some(config);
        let options = run_options(&args).unwrap();
        assert_eq!(options.db, DATA_DB);
        assert_eq!(options.update, docpatch_sdk::UpdateMode::Query);
        assert_eq!(options.parallel, 4);
        assert!(options.log_db.is_none());

        args.parallel = Some(2);
        args.log = true;
        let options = run_options(&args).unwrap();
        assert_eq!(options.parallel, 2);
        assert_eq!(options.log_db.as_deref(), Some(AUDIT_DB));
    }

    #[test]
    fn patch_file_query_is_optional() {
        let patch: PatchFile = serde_json::from_value(json!({
            "version": "0.1.0",
            "collection": "users",
            "modifier": { "$set": { "active": true } }
        }))
        .unwrap();
        assert!(patch.query.is_empty());
        assert_eq!(patch.collection, "users");
    }

    #[test]
    fn progress_line() {
        let progress = ProgressSnapshot {
            total: 4,
            count: 2,
            modified: 1,
            skipped: 1,
            speed: 2.0,
            eta: Some(1.0),
            percentage: 50.0,
            ..ProgressSnapshot::default()
        };
        assert_eq!(
            render_progress(&progress),
            " 50.0% 2/4 modified 1 skipped 1 2.0 docs/s eta 1.0s"
        );
    }

    #[tokio::test]
    async fn apply_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let patch = write(&dir, "patch.json", json!({
            "version": docpatch_sdk::VERSION,
            "collection": "users",
            "query": { "active": true },
            "modifier": { "$rename": { "name": "username" } }
        }));
        let data = write(&dir, "data.json", json!({
            "users": [
                { "_id": 1, "name": "user_1", "active": true },
                { "_id": 2, "name": "user_2", "active": false },
                { "_id": 3, "name": "user_3", "active": true }
            ]
        }));
        let output = dir.path().join("out.json");
        let mut args = apply_args(patch, data);
        args.output = Some(output.clone());
        args.log = true;

        cmd_apply(args, OutputFormat::Json).await.unwrap();

        let written: Value = read_json(&output).unwrap();
        let users = written["users"].as_array().unwrap();
        assert_eq!(users[0], json!({ "_id": 1, "username": "user_1", "active": true }));
        assert_eq!(users[1], json!({ "_id": 2, "name": "user_2", "active": false }));
        assert_eq!(users[2]["username"], json!("user_3"));
    }

    #[tokio::test]
    async fn apply_rejects_wrong_version() {
        let dir = tempfile::tempdir().unwrap();
        let patch = write(&dir, "patch.json", json!({
            "version": "999.0.0",
            "collection": "users",
            "modifier": { "$set": { "a": 1 } }
        }));
        let data = write(&dir, "data.json", json!({ "users": [{ "_id": 1 }] }));
        let err = cmd_apply(apply_args(patch, data), OutputFormat::Json).await.unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
