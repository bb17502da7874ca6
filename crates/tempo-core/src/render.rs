use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::date::format_date;
use crate::task::Task;
use crate::timer::{FocusTimer, format_clock};
use crate::view::{Counts, group_by_due};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    /// Prints a projection bucketed by due date: a header per calendar day
    /// ("no due date" last), then an aligned table of the bucket's tasks.
    #[tracing::instrument(skip(self, heading, rows, today))]
    pub fn print_view(
        &mut self,
        heading: &str,
        rows: &[&Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "{}: {} task(s)", heading, rows.len())?;
        if rows.is_empty() {
            return Ok(());
        }

        for (due, bucket) in group_by_due(rows) {
            writeln!(out)?;
            writeln!(out, "{}", self.bucket_header(due, today))?;

            let table: Vec<Vec<String>> = bucket
                .iter()
                .map(|task| self.view_row(task))
                .collect();
            write_table(
                &mut out,
                vec![
                    "ID".to_string(),
                    "Pri".to_string(),
                    "Project".to_string(),
                    "Title".to_string(),
                    "Labels".to_string(),
                ],
                table,
            )?;
        }

        Ok(())
    }

    fn bucket_header(&self, due: Option<NaiveDate>, today: NaiveDate) -> String {
        match due {
            Some(date) if date < today => self.paint(&format!("{} (overdue)", format_date(date)), "31"),
            Some(date) if date == today => format!("{} (today)", format_date(date)),
            Some(date) => format_date(date),
            None => "no due date".to_string(),
        }
    }

    fn view_row(&self, task: &Task) -> Vec<String> {
        let mut title = task.title.clone();
        if task.is_completed() {
            title = format!("{title} ✓");
        }

        vec![
            self.paint(&task.short_id(), "33"),
            task.priority.label().to_string(),
            task.project.clone().unwrap_or_default(),
            title,
            task.labels
                .iter()
                .map(|label| format!("+{label}"))
                .collect::<Vec<_>>()
                .join(" "),
        ]
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id         {}", task.id)?;
        writeln!(out, "title      {}", task.title)?;
        writeln!(out, "notes      {}", task.notes.clone().unwrap_or_default())?;
        writeln!(
            out,
            "project    {}",
            task.project.clone().unwrap_or_default()
        )?;
        writeln!(out, "labels     {}", task.labels.join(", "))?;
        writeln!(out, "priority   {}", task.priority.label())?;
        writeln!(
            out,
            "due        {}",
            task.due.map(format_date).unwrap_or_default()
        )?;
        writeln!(out, "recur      {}", task.recur.label())?;
        writeln!(out, "created    {}", task.created_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        if let Some(completed_at) = task.completed_at {
            writeln!(out, "completed  {}", completed_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        writeln!(out, "archived   {}", task.archived)?;

        Ok(())
    }

    #[tracing::instrument(skip(self, counts))]
    pub fn print_counts(&mut self, counts: &Counts) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "inbox      {}", counts.inbox)?;
        writeln!(out, "today      {}", counts.today)?;
        writeln!(out, "upcoming   {}", counts.upcoming)?;
        writeln!(out, "completed  {}", counts.completed)?;
        writeln!(out, "archive    {}", counts.archive)?;
        Ok(())
    }

    /// One countdown line, redrawn in place while the session runs.
    pub fn print_timer_line(&mut self, timer: &FocusTimer) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let clock = format_clock(timer.seconds_remaining());
        let phase = match timer.phase() {
            crate::timer::Phase::Work => self.paint("work", "32"),
            crate::timer::Phase::Break => self.paint("break", "36"),
        };
        write!(out, "\r[{phase}] {clock}  ")?;
        out.flush()?;
        Ok(())
    }

    pub fn print_timer_phase_change(&mut self, timer: &FocusTimer) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "\rphase complete → {} {}",
            timer.phase().label(),
            format_clock(timer.seconds_remaining())
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
