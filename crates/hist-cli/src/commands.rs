use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use hist_diff::{Diff, StaticSchema, TypedAttributeDiff};
use hist_ledger::ValidationReport;
use hist_sdk::{EngineConfig, History, Record, RecordRef, SaveOutcome, Version};
use serde_json::{json, Value};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Diff(args) => cmd_diff(args, config, cli.format),
        Command::Replay(args) => cmd_replay(args, config, cli.format),
        Command::Config => cmd_config(&config, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_schema(path: &Path) -> anyhow::Result<StaticSchema> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    toml::from_str(&source).with_context(|| format!("parsing schema {}", path.display()))
}

/// Snapshots in a file: a single record object or an array of them.
fn load_snapshots(path: &Path) -> anyhow::Result<Vec<Record>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let value: Value = serde_json::from_str(&source)
        .with_context(|| format!("parsing snapshot {}", path.display()))?;
    let records = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Record>, _>>(),
        single => serde_json::from_value(single).map(|r| vec![r]),
    };
    records.with_context(|| format!("{} does not hold record snapshots", path.display()))
}

fn load_single(path: &Path) -> anyhow::Result<Record> {
    let mut records = load_snapshots(path)?;
    if records.len() != 1 {
        bail!("{} holds {} snapshots, expected one", path.display(), records.len());
    }
    Ok(records.remove(0))
}

fn open_history(schema: &Path, config: EngineConfig) -> anyhow::Result<History> {
    let host = Arc::new(load_schema(schema)?);
    Ok(History::builder(host).config(config).in_memory())
}

// ---- diff ----

fn cmd_diff(args: DiffArgs, config: EngineConfig, format: OutputFormat) -> anyhow::Result<()> {
    let history = open_history(&args.schema, config)?;
    let from = args.from.as_deref().map(load_single).transpose()?;
    let to = load_single(&args.to)?;
    let diff = history.compute_diff(from.as_ref(), &to)?;

    match format {
        OutputFormat::Json => println!("{}", diff.to_document().to_json()?),
        OutputFormat::Text => print_diff(&diff),
    }
    Ok(())
}

fn print_diff(diff: &Diff) {
    if diff.is_creation() {
        println!("{} {}", "creation".green().bold(), diff.target().to_string().cyan());
        return;
    }
    if diff.is_empty() {
        println!("{} No changes.", diff.target().to_string().cyan());
        return;
    }
    println!(
        "{} {} ({} change(s))",
        "update".yellow().bold(),
        diff.target().to_string().cyan(),
        diff.len()
    );
    for entry in diff.entries() {
        println!("  {}", render_entry(entry));
    }
}

fn render_entry(entry: &TypedAttributeDiff) -> String {
    let kind = entry
        .attribute_type()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".into());
    format!(
        "{} [{}]: {} → {}",
        entry.attribute().bold(),
        kind.dimmed(),
        entry.old_value().to_string().red(),
        entry.new_value().to_string().green()
    )
}

// ---- replay ----

fn cmd_replay(args: ReplayArgs, config: EngineConfig, format: OutputFormat) -> anyhow::Result<()> {
    let history = open_history(&args.schema, config)?;
    let mut snapshots = Vec::new();
    for path in &args.snapshots {
        snapshots.extend(load_snapshots(path)?);
    }

    let latest = replay(&history, &snapshots, args.merge)?;

    let mut versions = Vec::new();
    for target in latest.keys() {
        versions.extend(history.versions(target)?);
    }

    let mut states = Vec::new();
    if let Some(number) = args.at {
        for current in latest.values() {
            states.push(history.state_at(current, number)?);
        }
    }

    let reports = if args.validate {
        history.validate_all()?
    } else {
        Vec::new()
    };

    match format {
        OutputFormat::Json => {
            let states = states
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?;
            let out = json!({
                "versions": versions.iter().map(version_json).collect::<Vec<_>>(),
                "states": states,
                "validation": reports.iter().map(report_json).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            for version in &versions {
                print_version(version);
            }
            if let Some(number) = args.at {
                for state in &states {
                    println!("\n{} at v{}:", state.reference.to_string().cyan(), number);
                    for (name, value) in &state.attributes {
                        println!("  {} = {}", name.bold(), value);
                    }
                }
            }
            for report in &reports {
                print_report(report);
            }
        }
    }
    if reports.iter().any(|r| !r.is_valid()) {
        bail!("history validation failed");
    }
    Ok(())
}

/// Feed snapshots through the history in save order. Returns the latest
/// snapshot of every target seen.
fn replay(
    history: &History,
    snapshots: &[Record],
    merge: bool,
) -> anyhow::Result<BTreeMap<RecordRef, Record>> {
    let mut latest: BTreeMap<RecordRef, Record> = BTreeMap::new();
    let mut open: BTreeMap<RecordRef, Option<Version>> = BTreeMap::new();

    for snapshot in snapshots {
        let target = snapshot.reference.clone();
        let previous = latest.get(&target);
        let outcome = if merge {
            let slot = open.entry(target.clone()).or_default();
            history.save(slot, previous, snapshot, None)?
        } else {
            match history.ledger().record(previous, snapshot, None)? {
                Some(version) => SaveOutcome::Recorded(version.number()),
                None => SaveOutcome::Unchanged,
            }
        };
        tracing::debug!(target_ref = %target, ?outcome, "snapshot applied");
        latest.insert(target, snapshot.clone());
    }
    Ok(latest)
}

fn print_version(version: &Version) {
    let label = format!("v{}", version.number());
    let label = if version.is_creation() {
        label.green().bold()
    } else {
        label.yellow().bold()
    };
    let author = version
        .author()
        .map(|a| format!(" by {a}"))
        .unwrap_or_default();
    println!(
        "{}  {}  {}{}",
        label,
        version.target().to_string().cyan(),
        version.id().short_id().dimmed(),
        author
    );
    for entry in version.diff().entries() {
        println!("    {}", render_entry(entry));
    }
}

fn version_json(version: &Version) -> Value {
    let entries: Vec<Value> = version
        .diff()
        .entries()
        .iter()
        .map(|e| {
            json!({
                "attribute": e.attribute(),
                "attribute_type": e.attribute_type().map(|t| t.to_string()),
                "old_value": e.old_value().to_json(),
                "new_value": e.new_value().to_json(),
            })
        })
        .collect();
    json!({
        "id": version.id().to_string(),
        "target": version.target().to_string(),
        "number": version.number(),
        "kind": version.kind().to_string(),
        "author": version.author().map(|a| a.to_string()),
        "entries": entries,
    })
}

fn print_report(report: &ValidationReport) {
    if report.is_valid() {
        println!(
            "{} {} ({} versions)",
            "✓".green().bold(),
            report.target.to_string().cyan(),
            report.version_count
        );
        return;
    }
    println!("{} {}", "✗".red().bold(), report.target.to_string().cyan());
    for violation in &report.violations {
        let at = violation
            .number
            .map(|n| format!("v{n}"))
            .unwrap_or_else(|| "-".into());
        println!("  {} {:?}: {}", at.yellow(), violation.kind, violation.description);
    }
}

fn report_json(report: &ValidationReport) -> Value {
    json!({
        "target": report.target.to_string(),
        "version_count": report.version_count,
        "valid": report.is_valid(),
        "violations": report
            .violations
            .iter()
            .map(|v| json!({
                "number": v.number,
                "kind": format!("{:?}", v.kind),
                "description": v.description,
            }))
            .collect::<Vec<_>>(),
    })
}

// ---- config ----

fn cmd_config(config: &EngineConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"
        [kinds.Person]
        attributes = [
            { name = "name", type = "text" },
            { name = "age", type = "integer" },
        ]
    "#;

    fn file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn snapshot(age: i64) -> Value {
        json!({
            "reference": {"kind": "Person", "id": "1"},
            "attributes": {"name": "Alice", "age": age}
        })
    }

    fn history() -> History {
        let schema = file(SCHEMA);
        open_history(schema.path(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn snapshot_file_may_hold_one_or_many() {
        let one = file(&snapshot(30).to_string());
        assert_eq!(load_snapshots(one.path()).unwrap().len(), 1);

        let many = file(&json!([snapshot(30), snapshot(31)]).to_string());
        assert_eq!(load_snapshots(many.path()).unwrap().len(), 2);
        assert!(load_single(many.path()).is_err());
    }

    #[test]
    fn malformed_snapshot_is_reported_with_path() {
        let bad = file("{\"attributes\": 3}");
        let err = load_snapshots(bad.path()).unwrap_err();
        assert!(format!("{err:#}").contains("record snapshots"));
    }

    #[test]
    fn replay_records_one_version_per_change() {
        let history = history();
        let snapshots: Vec<Record> = [30, 31, 31, 32]
            .iter()
            .map(|a| serde_json::from_value(snapshot(*a)).unwrap())
            .collect();
        let latest = replay(&history, &snapshots, false).unwrap();
        let target = latest.keys().next().unwrap();
        let numbers: Vec<_> = history
            .versions(target)
            .unwrap()
            .iter()
            .map(Version::number)
            .collect();
        assert_eq!(numbers, [0, 1, 2]);
    }

    #[test]
    fn replay_with_merge_folds_into_open_version() {
        let history = history();
        let snapshots: Vec<Record> = [30, 31, 32]
            .iter()
            .map(|a| serde_json::from_value(snapshot(*a)).unwrap())
            .collect();
        let latest = replay(&history, &snapshots, true).unwrap();
        let versions = history.versions(latest.keys().next().unwrap()).unwrap();
        assert_eq!(versions.len(), 2);
        let entry = versions[1].diff().entry("age").unwrap();
        assert_eq!(entry.old_value().to_json(), json!(30));
        assert_eq!(entry.new_value().to_json(), json!(32));
    }

    #[test]
    fn version_json_shape() {
        let history = history();
        let a: Record = serde_json::from_value(snapshot(30)).unwrap();
        let b: Record = serde_json::from_value(snapshot(31)).unwrap();
        history.record_creation(&a, None).unwrap();
        let version = history.record_update(&a, &b, None).unwrap().unwrap();
        let value = version_json(&version);
        assert_eq!(value["number"], 1);
        assert_eq!(value["kind"], "update");
        assert_eq!(value["entries"][0]["attribute"], "age");
        assert_eq!(value["entries"][0]["new_value"], 31);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(missing.as_path())).is_err());
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }
}
