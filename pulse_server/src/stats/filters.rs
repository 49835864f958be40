//! Path exclusion and the working-hours window.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::models::settings::{ProjectFilters, WorkingHoursSettings};

/// Extension (suffix) and folder (prefix) exclusions of a project.
#[derive(Debug, Clone, Default)]
pub struct PathFilters {
    extensions: Vec<String>,
    folders: Vec<String>,
}

impl PathFilters {
    pub fn new<E, F>(extensions: E, folders: F) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .filter_map(|e| normalize_extension(e.as_ref()))
                .collect(),
            folders: folders
                .into_iter()
                .filter_map(|f| normalize_folder(f.as_ref()))
                .collect(),
        }
    }

    pub fn from_project(filters: &ProjectFilters) -> Self {
        Self::new(&filters.excluded_extensions, &filters.excluded_folders)
    }

    /// Whether a file's line counts are left out of the aggregates.
    pub fn excludes(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./");
        let lower = path.to_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
            || self.folders.iter().any(|dir| path.starts_with(dir.as_str()))
    }
}

/// `md`, `.MD` and ` .md ` all exclude `*.md`.
fn normalize_extension(raw: &str) -> Option<String> {
    let ext = raw.trim().trim_start_matches('*').to_lowercase();
    if ext.is_empty() || ext == "." {
        return None;
    }
    Some(if ext.starts_with('.') { ext } else { format!(".{ext}") })
}

/// `vendor`, `/vendor/` and `./vendor` all exclude `vendor/...` but not `vendored/`.
fn normalize_folder(raw: &str) -> Option<String> {
    let dir = raw.trim().trim_start_matches("./").trim_matches('/');
    if dir.is_empty() {
        return None;
    }
    Some(format!("{dir}/"))
}

/// Hours and weekdays in which commits count, evaluated in UTC.
#[derive(Debug, Clone, Copy)]
pub struct WorkingWindow {
    settings: Option<WorkingHoursSettings>,
}

impl WorkingWindow {
    /// No settings means every commit counts.
    pub fn new(settings: Option<WorkingHoursSettings>) -> Self {
        Self { settings }
    }

    /// `[start, end)`; a start after the end wraps past midnight and equal
    /// bounds cover the whole day. The weekday is that of the commit itself.
    pub fn permits(&self, at: DateTime<Utc>) -> bool {
        let Some(settings) = &self.settings else {
            return true;
        };
        if !day_enabled(settings, at.weekday()) {
            return false;
        }
        let hour = at.hour() as i32;
        let (start, end) = (settings.start_hour, settings.end_hour);
        match start.cmp(&end) {
            std::cmp::Ordering::Equal => true,
            std::cmp::Ordering::Less => (start..end).contains(&hour),
            std::cmp::Ordering::Greater => hour >= start || hour < end,
        }
    }
}

fn day_enabled(settings: &WorkingHoursSettings, day: Weekday) -> bool {
    match day {
        Weekday::Mon => settings.monday,
        Weekday::Tue => settings.tuesday,
        Weekday::Wed => settings.wednesday,
        Weekday::Thu => settings.thursday,
        Weekday::Fri => settings.friday,
        Weekday::Sat => settings.saturday,
        Weekday::Sun => settings.sunday,
    }
}
