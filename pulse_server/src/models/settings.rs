//! Per-project analysis settings: path filters, score weights, working hours,
//! and scheduled updates.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::schema::{
    excluded_extensions, excluded_folders, project_update_settings, score_settings,
    working_hours_settings,
};

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = excluded_extensions)]
pub struct ExcludedExtension {
    pub id: Uuid,
    pub project_id: Uuid,
    pub value: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = excluded_folders)]
pub struct ExcludedFolder {
    pub id: Uuid,
    pub project_id: Uuid,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = score_settings)]
pub struct ScoreSettings {
    pub project_id: Uuid,
    pub additions: f64,
    pub deletions: f64,
    pub commits: f64,
    pub pull_requests: f64,
    pub comments: f64,
}

impl ScoreSettings {
    /// Weights applied when a project has not configured its own.
    pub fn defaults(project_id: Uuid) -> Self {
        Self {
            project_id,
            additions: 1.0,
            deletions: 0.5,
            commits: 10.0,
            pull_requests: 20.0,
            comments: 5.0,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        let weights = [
            self.additions,
            self.deletions,
            self.commits,
            self.pull_requests,
            self.comments,
        ];
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(CoreError::InvalidInput(
                "score weights must be finite numbers".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = working_hours_settings)]
pub struct WorkingHoursSettings {
    pub project_id: Uuid,
    pub start_hour: i32,
    pub end_hour: i32,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl WorkingHoursSettings {
    pub fn validate(&self) -> CoreResult<()> {
        for hour in [self.start_hour, self.end_hour] {
            if !(0..=23).contains(&hour) {
                return Err(CoreError::InvalidInput(format!(
                    "working hours must be between 0 and 23, got {hour}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = project_update_settings)]
pub struct ProjectUpdateSettings {
    pub project_id: Uuid,
    pub auto_update_enabled: bool,
    pub auto_update_hour: i32,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl ProjectUpdateSettings {
    pub fn validate(&self) -> CoreResult<()> {
        if !(0..=23).contains(&self.auto_update_hour) {
            return Err(CoreError::InvalidInput(format!(
                "auto update hour must be between 0 and 23, got {}",
                self.auto_update_hour
            )));
        }
        Ok(())
    }
}

/// Everything the statistics engine needs to know about a project's configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectFilters {
    pub excluded_extensions: Vec<String>,
    pub excluded_folders: Vec<String>,
    pub score: ScoreSettings,
    pub working_hours: Option<WorkingHoursSettings>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(start_hour: i32, end_hour: i32) -> WorkingHoursSettings {
        WorkingHoursSettings {
            project_id: Uuid::nil(),
            start_hour,
            end_hour,
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: false,
            sunday: false,
        }
    }

    #[test]
    fn working_hours_bounds_are_checked() {
        assert!(hours(9, 18).validate().is_ok());
        assert!(hours(0, 23).validate().is_ok());
        assert!(hours(-1, 18).validate().is_err());
        assert!(hours(9, 24).validate().is_err());
    }

    #[test]
    fn non_finite_weights_are_rejected() {
        let mut score = ScoreSettings::defaults(Uuid::nil());
        assert!(score.validate().is_ok());
        score.comments = f64::NAN;
        assert!(score.validate().is_err());
    }
}
