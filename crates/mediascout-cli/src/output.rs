use std::io::Write;

use mediascout_core::{AttemptStatus, AvMeta, PluginAttempt};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn format_date(ts: i64) -> Option<String> {
    if ts == 0 {
        return None;
    }
    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
}

fn format_duration(secs: i64) -> Option<String> {
    if secs <= 0 {
        return None;
    }
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    Some(if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else {
        format!("{m}m {s:02}s")
    })
}

fn field(w: &mut dyn Write, label: &str, value: &str, color: ColorMode) -> std::io::Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    if color.enabled() {
        writeln!(w, "{:>10}: {}", label.bold(), value)
    } else {
        writeln!(w, "{:>10}: {}", label, value)
    }
}

/// Print the populated fields of a record.
pub fn print_record(w: &mut dyn Write, meta: &AvMeta, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", meta.number.green().bold())?;
    } else {
        writeln!(w, "{}", meta.number)?;
    }

    let translate = &meta.ext_info.translate_info.data;
    field(w, "Title", &meta.title, color)?;
    field(w, "Title (tr)", &translate.translated_title, color)?;
    field(w, "Actors", &meta.actors.join(", "), color)?;
    field(w, "Released", &format_date(meta.release_date).unwrap_or_default(), color)?;
    field(w, "Duration", &format_duration(meta.duration).unwrap_or_default(), color)?;
    field(w, "Studio", &meta.studio, color)?;
    field(w, "Label", &meta.label, color)?;
    field(w, "Series", &meta.series, color)?;
    field(w, "Director", &meta.director, color)?;
    field(w, "Genres", &meta.genres.join(", "), color)?;
    field(w, "Cover", meta.cover.as_ref().map_or("", |f| f.name.as_str()), color)?;
    field(w, "Poster", meta.poster.as_ref().map_or("", |f| f.name.as_str()), color)?;
    if !meta.sample_images.is_empty() {
        field(w, "Samples", &format!("{} images", meta.sample_images.len()), color)?;
    }
    field(w, "Plot", &meta.plot, color)?;
    field(w, "Plot (tr)", &translate.translated_plot, color)?;
    field(w, "Source", &meta.ext_info.scrape_source, color)?;
    Ok(())
}

/// Print one line per plugin attempt.
pub fn print_attempts(
    w: &mut dyn Write,
    attempts: &[PluginAttempt],
    color: ColorMode,
) -> std::io::Result<()> {
    for attempt in attempts {
        let ms = attempt.elapsed.as_millis();
        let (label, detail) = match &attempt.status {
            AttemptStatus::Found => ("FOUND", None),
            AttemptStatus::NotFound => ("NOT FOUND", None),
            AttemptStatus::Skipped => ("SKIPPED", None),
            AttemptStatus::Cancelled => ("CANCELLED", None),
            AttemptStatus::Failed(msg) => ("ERROR", Some(msg.as_str())),
        };
        if color.enabled() {
            let label = match attempt.status {
                AttemptStatus::Found => label.green().to_string(),
                AttemptStatus::Failed(_) => label.red().to_string(),
                _ => label.yellow().to_string(),
            };
            write!(w, "[{}] {} ({}ms)", attempt.plugin, label, ms)?;
        } else {
            write!(w, "[{}] {} ({}ms)", attempt.plugin, label, ms)?;
        }
        match detail {
            Some(msg) => writeln!(w, ": {}", msg)?,
            None => writeln!(w)?,
        }
    }
    Ok(())
}
