//! `fieldkit run` / `fieldkit validate` / `fieldkit unique`.

use std::path::{Path, PathBuf};

use fieldkit_recon::config::MergeOptions;
use fieldkit_recon::engine::{MergeOutcome, ResolveOutcome, SelectOutcome, ZonesOutcome};
use fieldkit_recon::table::Table;
use fieldkit_recon::{
    run_resolve, run_select, run_unique, run_zones, FieldType, MergeConfig, MergeJob, ResolveConfig,
    SelectConfig, SpatialJoinConfig, ValidationResult, ZonesConfig,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::exit_codes::{EXIT_ERROR, EXIT_JOB_INVALID_CONFIG, EXIT_JOB_RECORD_FAILURES, EXIT_JOB_RUNTIME, EXIT_JOB_VALIDATION};
use crate::CliError;

/// Extract the `kind` field from a TOML string, defaulting to "merge".
fn extract_kind(config_str: &str) -> String {
    #[derive(serde::Deserialize)]
    struct KindProbe {
        #[serde(default = "default_kind")]
        kind: String,
    }
    fn default_kind() -> String {
        "merge".into()
    }

    toml::from_str::<KindProbe>(config_str)
        .map(|p| p.kind)
        .unwrap_or_else(|_| "merge".into())
}

/// Where to send results after a job has run.
struct Sink {
    json: bool,
    output: Option<PathBuf>,
    write: Option<PathBuf>,
    dry_run: bool,
}

/// A loaded config with its directory; relative file names resolve against it.
struct JobFile {
    path: PathBuf,
    text: String,
    kind: String,
}

impl JobFile {
    fn read(path: PathBuf) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| CliError::usage(format!("cannot read config {}: {e}", path.display())))?;
        let kind = extract_kind(&text);
        debug!(config = %path.display(), kind = %kind, "config loaded");
        Ok(Self { path, text, kind })
    }

    fn resolve(&self, file: &str) -> PathBuf {
        self.path.parent().unwrap_or_else(|| Path::new(".")).join(file)
    }

    fn read_input(&self, file: &str) -> Result<String, CliError> {
        let path = self.resolve(file);
        std::fs::read_to_string(&path)
            .map_err(|e| CliError::usage(format!("cannot read {}: {e}", path.display())))
    }
}

fn unknown_kind(kind: &str) -> CliError {
    CliError::new(
        EXIT_JOB_INVALID_CONFIG,
        format!("unknown config kind: \"{kind}\""),
    )
    .with_hint("expected one of: merge, resolve, spatial_join, zones, select")
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn cmd_run(
    config_path: PathBuf,
    json: bool,
    output: Option<PathBuf>,
    write: Option<PathBuf>,
    dry_run: bool,
) -> Result<(), CliError> {
    let job = JobFile::read(config_path)?;
    let sink = Sink { json, output, write, dry_run };

    match job.kind.as_str() {
        "merge" => {
            let config = MergeConfig::from_toml(&job.text).map_err(CliError::job)?;
            let target = job.read_input(&config.target.file)?;
            let source = job.read_input(&config.source.file)?;
            let loaded = MergeJob::load(&config, &target, &source).map_err(CliError::job)?;
            run_merge(loaded, &config.options, job.resolve(&config.target.file), &sink)
        }
        "spatial_join" => {
            let config = SpatialJoinConfig::from_toml(&job.text).map_err(CliError::job)?;
            let target = job.read_input(&config.target.file)?;
            let joined = job.read_input(&config.joined.file)?;
            let loaded = MergeJob::load_spatial_join(&config, &target, &joined).map_err(CliError::job)?;
            run_merge(loaded, &config.options, job.resolve(&config.target.file), &sink)
        }
        "resolve" => {
            let config = ResolveConfig::from_toml(&job.text).map_err(CliError::job)?;
            let records = job.read_input(&config.records.file)?;
            let groups = job.read_input(&config.groups.file)?;
            let outcome = run_resolve(&config, &records, &groups).map_err(CliError::job)?;
            report_resolve(&outcome, &sink)
        }
        "zones" => {
            let config = ZonesConfig::from_toml(&job.text).map_err(CliError::job)?;
            let zones = job.read_input(&config.zones.file)?;
            let summary = job.read_input(&config.summary.file)?;
            let outcome = run_zones(&config, &zones, &summary).map_err(CliError::job)?;
            report_zones(outcome, job.resolve(&config.zones.file), &sink)
        }
        "select" => {
            let config = SelectConfig::from_toml(&job.text).map_err(CliError::job)?;
            let input = job.read_input(&config.input.file)?;
            let list = job.read_input(&config.list.file)?;
            let outcome = run_select(&config, &input, &list).map_err(CliError::job)?;
            report_select(&outcome, &sink)
        }
        other => Err(unknown_kind(other)),
    }
}

fn run_merge(mut job: MergeJob, options: &MergeOptions, target_path: PathBuf, sink: &Sink) -> Result<(), CliError> {
    let validation = job.validate();
    print_validation(&validation);
    if !validation.is_ok() {
        return Err(CliError::new(
            EXIT_JOB_VALIDATION,
            format!("{} validation error(s); nothing written", validation.errors.len()),
        ));
    }

    if sink.dry_run {
        job.dry_run = true;
    }
    let outcome = job.run().map_err(CliError::job)?;

    emit_json(&outcome, sink)?;
    if let Some(table) = &outcome.output {
        write_table(table, sink.write.as_deref().unwrap_or(&target_path))?;
    }

    summarize_merge(&outcome, options.log_changes);

    let failures = outcome.report.failures.len() + outcome.applied.failures.len();
    if failures > 0 {
        return Err(CliError::new(
            EXIT_JOB_RECORD_FAILURES,
            format!("{failures} record(s) could not be written"),
        ));
    }
    Ok(())
}

fn summarize_merge(outcome: &MergeOutcome, log_changes: bool) {
    let r = &outcome.report;
    if log_changes {
        for c in &r.changes {
            eprintln!(
                "  {} [{}] {}: '{}' -> '{}'",
                c.record,
                c.key.render(),
                c.field,
                c.old.render(),
                c.new.render(),
            );
        }
    }
    for f in r.failures.iter().chain(outcome.applied.failures.iter()) {
        match &f.field {
            Some(field) => eprintln!("  failed {} {field}: {}", f.record, f.message),
            None => eprintln!("  failed {}: {}", f.record, f.message),
        }
    }
    eprintln!(
        "{} ({}): {} records, {} changes across {} fields, {} keys not found",
        outcome.meta.kind,
        r.policy.label(),
        r.records_scanned,
        r.change_count(),
        r.fields_touched,
        r.keys_not_found,
    );
    if !r.added_fields.is_empty() {
        eprintln!("added fields: {}", r.added_fields.join(", "));
    }
    if !r.read_only_skipped.is_empty() {
        eprintln!("skipped read-only fields: {}", r.read_only_skipped.join(", "));
    }
    if outcome.output.is_none() {
        eprintln!("dry run: {} write command(s) planned, nothing written", r.commands.len());
    }
}

fn report_resolve(outcome: &ResolveOutcome, sink: &Sink) -> Result<(), CliError> {
    emit_json(outcome, sink)?;
    if !sink.json {
        for r in &outcome.resolutions {
            let losers: Vec<String> = r.losers.iter().map(|id| id.to_string()).collect();
            println!("{}\t{}\t{}", r.group_id, r.winner, losers.join(","));
        }
    }
    eprintln!(
        "resolve: {} groups by {} ({}), {} clip command(s)",
        outcome.resolutions.len(),
        outcome.rank_field,
        if outcome.descending { "descending" } else { "ascending" },
        outcome.clips.len(),
    );
    Ok(())
}

fn report_zones(outcome: ZonesOutcome, zones_path: PathBuf, sink: &Sink) -> Result<(), CliError> {
    print_validation(&outcome.validation);
    if !outcome.validation.is_ok() {
        return Err(CliError::new(
            EXIT_JOB_VALIDATION,
            format!("{} validation error(s); nothing written", outcome.validation.errors.len()),
        ));
    }

    emit_json(&outcome, sink)?;
    if let Some(table) = &outcome.output {
        if sink.dry_run {
            info!("dry run: zone counts not written");
        } else {
            write_table(table, sink.write.as_deref().unwrap_or(&zones_path))?;
        }
    }

    let zones = outcome.counts.as_ref().map(|c| c.rows.len()).unwrap_or(0);
    eprintln!("zones: {} records, {} category field(s)", zones, outcome.categories.len());

    if !outcome.applied.failures.is_empty() {
        return Err(CliError::new(
            EXIT_JOB_RECORD_FAILURES,
            format!("{} record(s) could not be written", outcome.applied.failures.len()),
        ));
    }
    Ok(())
}

fn report_select(outcome: &SelectOutcome, sink: &Sink) -> Result<(), CliError> {
    emit_json(outcome, sink)?;
    let s = &outcome.selection;
    if !sink.json {
        for id in &s.selected {
            println!("{id}");
        }
    }
    for w in &s.warnings {
        eprintln!("warning: {w}");
    }
    eprintln!("select ({}): {}", s.mode, s.query);
    eprintln!("{} matched, {} selected", s.matched, s.selected.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let job = JobFile::read(config_path)?;

    let validation = match job.kind.as_str() {
        "merge" => {
            let config = MergeConfig::from_toml(&job.text).map_err(CliError::job)?;
            let target = job.read_input(&config.target.file)?;
            let source = job.read_input(&config.source.file)?;
            MergeJob::load(&config, &target, &source).map_err(CliError::job)?.validate()
        }
        "spatial_join" => {
            let config = SpatialJoinConfig::from_toml(&job.text).map_err(CliError::job)?;
            let target = job.read_input(&config.target.file)?;
            let joined = job.read_input(&config.joined.file)?;
            MergeJob::load_spatial_join(&config, &target, &joined)
                .map_err(CliError::job)?
                .validate()
        }
        "zones" => {
            let config = ZonesConfig::from_toml(&job.text).map_err(CliError::job)?;
            let zones = job.read_input(&config.zones.file)?;
            let summary = job.read_input(&config.summary.file)?;
            run_zones(&config, &zones, &summary).map_err(CliError::job)?.validation
        }
        "resolve" => {
            let config = ResolveConfig::from_toml(&job.text).map_err(CliError::job)?;
            let records = job.read_input(&config.records.file)?;
            let groups = job.read_input(&config.groups.file)?;
            run_resolve(&config, &records, &groups).map_err(CliError::job)?;
            ValidationResult::default()
        }
        "select" => {
            let config = SelectConfig::from_toml(&job.text).map_err(CliError::job)?;
            let input = job.read_input(&config.input.file)?;
            let list = job.read_input(&config.list.file)?;
            let outcome = run_select(&config, &input, &list).map_err(CliError::job)?;
            for w in &outcome.selection.warnings {
                eprintln!("warning: {w}");
            }
            ValidationResult::default()
        }
        other => return Err(unknown_kind(other)),
    };

    print_validation(&validation);
    if !validation.is_ok() {
        return Err(CliError::new(
            EXIT_JOB_VALIDATION,
            format!("{} validation error(s)", validation.errors.len()),
        ));
    }
    eprintln!("{}: config OK ({} warning(s))", job.kind, validation.warnings.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// unique
// ---------------------------------------------------------------------------

pub fn cmd_unique(
    input: PathBuf,
    field: String,
    field_type: FieldType,
    limit: usize,
    json: bool,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let csv_data = std::fs::read_to_string(&input)
        .map_err(|e| CliError::usage(format!("cannot read {}: {e}", input.display())))?;
    let outcome = run_unique(&csv_data, &field, field_type, limit).map_err(CliError::job)?;

    if let Some(path) = &output {
        let mut table = Table {
            name: "unique".into(),
            headers: vec![field.clone()],
            rows: Vec::with_capacity(outcome.values.len()),
        };
        for v in &outcome.values {
            table.rows.push(vec![v.render()]);
        }
        write_table(&table, path)?;
    }

    if json {
        let json_str = to_json(&outcome)?;
        println!("{json_str}");
    } else if output.is_none() {
        for v in &outcome.values {
            println!("{}", v.render());
        }
    }

    if let Some(w) = &outcome.warning {
        eprintln!("warning: {w}");
    }
    eprintln!("{}: {} unique value(s)", outcome.field, outcome.total);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_validation(validation: &ValidationResult) {
    for w in &validation.warnings {
        eprintln!("warning: {}", w.message);
    }
    for e in &validation.errors {
        eprintln!("error: {}", e.message);
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))
}

fn emit_json<T: Serialize>(value: &T, sink: &Sink) -> Result<(), CliError> {
    if !sink.json && sink.output.is_none() {
        return Ok(());
    }
    let json_str = to_json(value)?;

    if let Some(ref path) = sink.output {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::new(EXIT_JOB_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if sink.json {
        println!("{json_str}");
    }
    Ok(())
}

fn write_table(table: &Table, path: &Path) -> Result<(), CliError> {
    let csv_str = table.to_csv().map_err(CliError::job)?;
    std::fs::write(path, csv_str)
        .map_err(|e| CliError::new(EXIT_JOB_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}
