use std::collections::BTreeSet;
use std::io::{self, Read};

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::date::{self, format_date, parse_date_expr};
use crate::render::Renderer;
use crate::store::{TaskPatch, TaskStore, ToggleOutcome};
use crate::task::{Draft, Priority, Recur, Task};
use crate::timer::{self, FocusTimer, Phase, SystemTicker};
use crate::view::{self, Selector};

const EXPORT_VERSION: u32 = 1;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "done",
        "delete",
        "archive",
        "edit",
        "reset",
        "sweep",
        "list",
        "search",
        "show",
        "counts",
        "projects",
        "labels",
        "export",
        "import",
        "focus",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut TaskStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let today = date::to_project_date(now);
    let command = inv.command.as_str();

    match command {
        "add" => cmd_add(store, &inv.args, now, today),
        "done" => cmd_done(store, &inv.args, now, today),
        "delete" => cmd_delete(store, &inv.args),
        "archive" => cmd_archive(store, &inv.args),
        "edit" => cmd_edit(store, &inv.args, today),
        "reset" => cmd_reset(store, &inv.args),
        "sweep" => cmd_sweep(store, now, today),
        "list" => cmd_list(store, renderer, &inv.args, today),
        "search" => cmd_search(store, renderer, &inv.args, today),
        "show" => cmd_show(store, renderer, &inv.args),
        "counts" => cmd_counts(store, renderer, today),
        "projects" => cmd_projects(store),
        "labels" => cmd_labels(store),
        "export" => cmd_export(store),
        "import" => cmd_import(store),
        "focus" => cmd_focus(store, cfg, renderer, &inv.args),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[derive(Debug, Clone)]
enum Mod {
    Title(String),
    Notes(Option<String>),
    Project(Option<String>),
    Priority(Priority),
    Due(Option<NaiveDate>),
    Recur(Recur),
    LabelAdd(String),
    LabelRemove(String),
}

fn parse_one_mod(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Mod>> {
    if let Some(label) = tok.strip_prefix('+') {
        if label.is_empty() {
            return Err(anyhow!("label name cannot be empty"));
        }
        return Ok(Some(Mod::LabelAdd(label.to_string())));
    }
    if let Some(label) = tok.strip_prefix('-') {
        if label.is_empty() {
            return Err(anyhow!("label name cannot be empty"));
        }
        return Ok(Some(Mod::LabelRemove(label.to_string())));
    }

    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "title" => Ok(Some(Mod::Title(value.to_string()))),
        "notes" | "note" => Ok(Some(Mod::Notes(optional_value(value)))),
        "project" | "proj" => Ok(Some(Mod::Project(optional_value(value)))),
        "pri" | "priority" => Priority::parse(value)
            .map(|priority| Some(Mod::Priority(priority)))
            .ok_or_else(|| anyhow!("unknown priority: {value}")),
        "due" => {
            if value.is_empty() || value.eq_ignore_ascii_case("none") {
                Ok(Some(Mod::Due(None)))
            } else {
                Ok(Some(Mod::Due(Some(parse_date_expr(value, today)?))))
            }
        }
        "recur" | "repeat" => Recur::parse(value)
            .map(|recur| Some(Mod::Recur(recur)))
            .ok_or_else(|| anyhow!("unknown recurrence: {value}")),
        _ => Ok(None),
    }
}

fn optional_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Splits add arguments into title words and `key:value` / `+label`
/// modifiers. A literal `--` turns everything after it into title words.
fn split_title_and_mods(args: &[String], today: NaiveDate) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut words = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
            continue;
        }

        words.push(arg.clone());
    }

    Ok((words.join(" "), mods))
}

fn resolve_id(store: &TaskStore, args: &[String]) -> anyhow::Result<Option<(Uuid, String)>> {
    let Some(prefix) = args.first() else {
        return Err(anyhow!("a task id (or unambiguous prefix) is required"));
    };
    Ok(store
        .find_by_prefix(prefix)
        .map(|task| (task.id, task.short_id())))
}

fn short(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[instrument(skip(store, args, now, today))]
fn cmd_add(
    store: &mut TaskStore,
    args: &[String],
    now: chrono::DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = split_title_and_mods(args, today)?;
    let mut draft = Draft {
        title,
        ..Draft::default()
    };
    for one_mod in mods {
        match one_mod {
            Mod::Title(title) => draft.title = title,
            Mod::Notes(notes) => draft.notes = notes,
            Mod::Project(project) => draft.project = project,
            Mod::Priority(priority) => draft.priority = priority,
            Mod::Due(due) => draft.due = due,
            Mod::Recur(recur) => draft.recur = recur,
            Mod::LabelAdd(label) => draft.labels.push(label),
            Mod::LabelRemove(label) => {
                warn!(label = %label, "label removal ignored on add");
            }
        }
    }

    match store.add(draft, now) {
        Some(id) => println!("Created task {}.", short(id)),
        None => println!("Task title is empty; nothing added."),
    }
    Ok(())
}

#[instrument(skip(store, args, now, today))]
fn cmd_done(
    store: &mut TaskStore,
    args: &[String],
    now: chrono::DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command done");

    let Some((id, short_id)) = resolve_id(store, args)? else {
        println!("No matching task.");
        return Ok(());
    };

    match store.toggle_complete(id, now, today) {
        ToggleOutcome::NoMatch => println!("No matching task."),
        ToggleOutcome::Completed { spawned: None } => println!("Completed {short_id}."),
        ToggleOutcome::Completed {
            spawned: Some(spawned),
        } => {
            let due = store
                .get(spawned)
                .and_then(|task| task.due)
                .map(format_date)
                .unwrap_or_default();
            println!(
                "Completed {short_id}; next occurrence {} due {due}.",
                short(spawned)
            );
        }
        ToggleOutcome::Reopened => println!("Reopened {short_id}."),
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_delete(store: &mut TaskStore, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");

    let Some((id, short_id)) = resolve_id(store, args)? else {
        println!("No matching task.");
        return Ok(());
    };

    if store.remove(id) {
        println!("Deleted {short_id}.");
    } else {
        println!("No matching task.");
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_archive(store: &mut TaskStore, args: &[String]) -> anyhow::Result<()> {
    info!("command archive");

    let Some((id, short_id)) = resolve_id(store, args)? else {
        println!("No matching task.");
        return Ok(());
    };

    if store.archive(id) {
        println!("Archived {short_id}.");
    } else {
        println!("No matching task.");
    }
    Ok(())
}

#[instrument(skip(store, args, today))]
fn cmd_edit(store: &mut TaskStore, args: &[String], today: NaiveDate) -> anyhow::Result<()> {
    info!("command edit");

    let Some((id, short_id)) = resolve_id(store, args)? else {
        println!("No matching task.");
        return Ok(());
    };
    if args.len() < 2 {
        return Err(anyhow!("edit requires at least one field change"));
    }

    let mut patch = TaskPatch::default();
    let mut label_adds: Vec<String> = Vec::new();
    let mut label_removes: Vec<String> = Vec::new();

    for tok in &args[1..] {
        match parse_one_mod(tok, today)? {
            Some(Mod::Title(title)) => patch.title = Some(title),
            Some(Mod::Notes(notes)) => patch.notes = Some(notes),
            Some(Mod::Project(project)) => patch.project = Some(project),
            Some(Mod::Priority(priority)) => patch.priority = Some(priority),
            Some(Mod::Due(due)) => patch.due = Some(due),
            Some(Mod::Recur(recur)) => patch.recur = Some(recur),
            Some(Mod::LabelAdd(label)) => label_adds.push(label),
            Some(Mod::LabelRemove(label)) => label_removes.push(label),
            None => warn!(token = %tok, "unrecognized edit token ignored"),
        }
    }

    if !label_adds.is_empty() || !label_removes.is_empty() {
        let current = store
            .get(id)
            .map(|task| task.labels.clone())
            .unwrap_or_default();
        let merged: Vec<String> = current
            .into_iter()
            .chain(label_adds)
            .filter(|label| !label_removes.contains(label))
            .collect();
        patch.labels = Some(merged);
    }

    if store.edit(id, patch) {
        println!("Edited {short_id}.");
    } else {
        println!("No matching task.");
    }
    Ok(())
}

/// Clears both the archived flag and the completion timestamp through the
/// generic edit patch; this is the documented way back out of the archive.
#[instrument(skip(store, args))]
fn cmd_reset(store: &mut TaskStore, args: &[String]) -> anyhow::Result<()> {
    info!("command reset");

    let Some((id, short_id)) = resolve_id(store, args)? else {
        println!("No matching task.");
        return Ok(());
    };

    let patch = TaskPatch {
        archived: Some(false),
        completed_at: Some(None),
        ..TaskPatch::default()
    };
    if store.edit(id, patch) {
        println!("Reset {short_id}.");
    } else {
        println!("No matching task.");
    }
    Ok(())
}

#[instrument(skip(store, now, today))]
fn cmd_sweep(
    store: &mut TaskStore,
    now: chrono::DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command sweep");

    let completed = store.bulk_complete_today(now, today);
    println!("Completed {completed} due task(s).");
    Ok(())
}

#[instrument(skip(store, renderer, args, today))]
fn cmd_list(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command list");

    let selector = if args.is_empty() {
        store.datastore().load_view()
    } else {
        let selector = Selector::parse(args)?;
        if let Err(err) = store.datastore().save_view(&selector) {
            warn!(error = %err, "failed to persist view selection");
        }
        selector
    };

    let rows = view::project_view(store.tasks(), &selector, "", today);
    renderer.print_view(&selector.describe(), &rows, today)
}

#[instrument(skip(store, renderer, args, today))]
fn cmd_search(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command search");

    let query = args.join(" ");
    if query.trim().is_empty() {
        return Err(anyhow!("search requires a query"));
    }

    let selector = store.datastore().load_view();
    let rows = view::project_view(store.tasks(), &selector, &query, today);
    let heading = format!("{} /{}", selector.describe(), query.trim());
    renderer.print_view(&heading, &rows, today)
}

#[instrument(skip(store, renderer, args))]
fn cmd_show(store: &mut TaskStore, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command show");

    let Some((id, _)) = resolve_id(store, args)? else {
        println!("No matching task.");
        return Ok(());
    };
    let Some(task) = store.get(id) else {
        println!("No matching task.");
        return Ok(());
    };
    renderer.print_task_info(task)
}

#[instrument(skip(store, renderer, today))]
fn cmd_counts(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command counts");

    let counts = view::counts(store.tasks(), today);
    renderer.print_counts(&counts)
}

#[instrument(skip(store))]
fn cmd_projects(store: &mut TaskStore) -> anyhow::Result<()> {
    let mut set = BTreeSet::new();
    for task in store.tasks() {
        if !task.archived && let Some(project) = &task.project {
            set.insert(project.clone());
        }
    }

    for project in set {
        println!("{project}");
    }
    Ok(())
}

#[instrument(skip(store))]
fn cmd_labels(store: &mut TaskStore) -> anyhow::Result<()> {
    let mut set = BTreeSet::new();
    for task in store.tasks() {
        if task.archived {
            continue;
        }
        for label in &task.labels {
            set.insert(label.clone());
        }
    }

    for label in set {
        println!("{label}");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ExportDoc<'a> {
    v: u32,
    tasks: &'a [Task],
}

#[derive(Debug, Deserialize)]
struct ImportDoc {
    v: u32,
    tasks: Vec<Task>,
}

#[instrument(skip(store))]
fn cmd_export(store: &mut TaskStore) -> anyhow::Result<()> {
    info!("command export");

    let doc = ExportDoc {
        v: EXPORT_VERSION,
        tasks: store.tasks(),
    };
    println!("{}", serde_json::to_string(&doc)?);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_import(store: &mut TaskStore) -> anyhow::Result<()> {
    info!("command import");

    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .context("failed reading stdin")?;

    let tasks = parse_import(&raw)?;
    let count = tasks.len();
    store.replace_all(tasks);

    println!("Imported {count} task(s).");
    Ok(())
}

/// Accepts the versioned document (`{"v":1,"tasks":[…]}`) or, for older
/// exports, a bare task array. Anything else is rejected before the store
/// is touched, so a failed import never alters existing state.
pub fn parse_import(raw: &str) -> anyhow::Result<Vec<Task>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let value: Value = serde_json::from_str(trimmed).context("import: input is not valid JSON")?;

    if let Value::Array(_) = value {
        return serde_json::from_value(value).context("import: invalid task array");
    }

    let is_doc = value
        .as_object()
        .map(|obj| obj.contains_key("tasks"))
        .unwrap_or(false);
    if !is_doc {
        return Err(anyhow!(
            "import: expected a task array or a versioned task document"
        ));
    }

    let doc: ImportDoc =
        serde_json::from_value(value).context("import: invalid task document")?;
    if doc.v != EXPORT_VERSION {
        return Err(anyhow!("import: unsupported version {}", doc.v));
    }
    Ok(doc.tasks)
}

fn parse_duration_secs(token: &str) -> anyhow::Result<u32> {
    let t = token.trim().to_ascii_lowercase();
    let (digits, multiplier) = if let Some(rest) = t.strip_suffix('m') {
        (rest, 60)
    } else if let Some(rest) = t.strip_suffix('s') {
        (rest, 1)
    } else {
        (t.as_str(), 1)
    };

    let value: u32 = digits
        .parse()
        .map_err(|_| anyhow!("invalid duration: {token}"))?;
    if value == 0 {
        return Err(anyhow!("duration must be positive: {token}"));
    }
    value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("duration out of range: {token}"))
}

#[instrument(skip(store, cfg, renderer, args))]
fn cmd_focus(
    store: &mut TaskStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command focus");

    let mut durations = cfg.timer_durations();
    let mut bind_prefix: Option<&String> = None;
    let mut cycles: Option<u32> = None;

    for tok in args {
        if let Some((key, value)) = tok.split_once(':') {
            match key.to_ascii_lowercase().as_str() {
                "work" => {
                    durations.work_secs = parse_duration_secs(value)?;
                    continue;
                }
                "break" => {
                    durations.break_secs = parse_duration_secs(value)?;
                    continue;
                }
                "cycles" => {
                    cycles = Some(
                        value
                            .parse()
                            .map_err(|_| anyhow!("invalid cycle count: {value}"))?,
                    );
                    continue;
                }
                _ => {}
            }
        }

        if bind_prefix.is_some() {
            return Err(anyhow!("focus takes at most one task id"));
        }
        bind_prefix = Some(tok);
    }

    let mut focus_timer = FocusTimer::new(durations);
    if let Some(prefix) = bind_prefix {
        match store.find_by_prefix(prefix) {
            Some(task) => {
                println!("Focusing on {}: {}", task.short_id(), task.title);
                focus_timer.bind(Some(task.id));
            }
            None => println!("No matching task; running unbound."),
        }
    }

    let mut ticker = SystemTicker::one_second();
    let mut work_phases_done = 0u32;
    let mut render_err: Option<anyhow::Error> = None;

    timer::run_session(&mut focus_timer, &mut ticker, &mut |state, crossed| {
        let printed = match crossed {
            Some(_) => renderer.print_timer_phase_change(state),
            None => renderer.print_timer_line(state),
        };
        if let Err(err) = printed {
            render_err = Some(err);
            return false;
        }

        if crossed == Some(Phase::Break) {
            work_phases_done += 1;
            if let Some(limit) = cycles
                && work_phases_done >= limit
            {
                return false;
            }
        }
        true
    });

    if let Some(err) = render_err {
        return Err(err);
    }

    println!();
    if let Some(limit) = cycles {
        println!("Finished {limit} work phase(s).");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands: add, done, delete, archive, edit, reset, sweep, list, search, show, counts, projects, labels, export, import, focus, help, version"
    );
    println!("Views: inbox, today, upcoming, project:<name>, label:<name>, completed, archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{expand_command_abbrev, known_command_names, parse_duration_secs, parse_import, split_title_and_mods};
    use crate::task::{Draft, Task};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).expect("valid date")
    }

    fn sample_task(title: &str) -> Task {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        Task::from_draft(
            Draft {
                title: title.to_string(),
                ..Draft::default()
            },
            now,
        )
        .expect("valid draft")
    }

    #[test]
    fn abbreviations_expand_when_unambiguous() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("exp", &known), Some("export"));
        assert_eq!(expand_command_abbrev("li", &known), Some("list"));
        assert_eq!(expand_command_abbrev("a", &known), None, "add vs archive");
        assert_eq!(expand_command_abbrev("zz", &known), None);
    }

    #[test]
    fn add_tokens_split_into_title_and_mods() {
        let args = vec![
            "pay".to_string(),
            "rent".to_string(),
            "project:home".to_string(),
            "+money".to_string(),
            "due:2024-07-01".to_string(),
        ];
        let (title, mods) = split_title_and_mods(&args, today()).expect("split");
        assert_eq!(title, "pay rent");
        assert_eq!(mods.len(), 3);
    }

    #[test]
    fn double_dash_makes_the_rest_literal() {
        let args = vec![
            "--".to_string(),
            "read".to_string(),
            "project:gutenberg".to_string(),
        ];
        let (title, mods) = split_title_and_mods(&args, today()).expect("split");
        assert_eq!(title, "read project:gutenberg");
        assert!(mods.is_empty());
    }

    #[test]
    fn import_accepts_versioned_doc_and_bare_array() {
        let tasks = vec![sample_task("from export")];
        let doc = format!(
            "{{\"v\":1,\"tasks\":{}}}",
            serde_json::to_string(&tasks).expect("serialize")
        );
        assert_eq!(parse_import(&doc).expect("doc").len(), 1);

        let bare = serde_json::to_string(&tasks).expect("serialize");
        assert_eq!(parse_import(&bare).expect("bare").len(), 1);
    }

    #[test]
    fn import_rejects_malformed_payloads() {
        assert!(parse_import("{\"foo\": 1}").is_err());
        assert!(parse_import("not json").is_err());
        assert!(parse_import("").is_err());
        assert!(parse_import("42").is_err());
    }

    #[test]
    fn import_rejects_unknown_versions() {
        let raw = "{\"v\":2,\"tasks\":[]}";
        assert!(parse_import(raw).is_err());
    }

    #[test]
    fn durations_accept_minute_and_second_suffixes() {
        assert_eq!(parse_duration_secs("25m").expect("25m"), 1500);
        assert_eq!(parse_duration_secs("90s").expect("90s"), 90);
        assert_eq!(parse_duration_secs("45").expect("45"), 45);
        assert!(parse_duration_secs("0").is_err());
        assert!(parse_duration_secs("soon").is_err());
    }
}
