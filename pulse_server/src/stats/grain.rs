//! Read-side aggregation of stored statistics by calendar grain.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{Months, NaiveDate, Weekday};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::statistics::PeopleStatistics;
use crate::store::StatsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grain {
    All,
    Day(NaiveDate),
    /// ISO week-numbering year and week.
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Year(i32),
}

impl Grain {
    /// `grain` is one of `all`, `day`, `week`, `month`, `year`; every grain
    /// but `all` needs a key (`2024-03-11`, `2024-W11`, `2024-03`, `2024`).
    pub fn parse(grain: &str, key: Option<&str>) -> CoreResult<Self> {
        let key = key.map(str::trim).filter(|k| !k.is_empty());
        let parsed = match (grain, key) {
            ("all", _) => Some(Self::All),
            ("day", Some(key)) => NaiveDate::parse_from_str(key, "%Y-%m-%d").ok().map(Self::Day),
            ("week", Some(key)) => parse_week(key),
            ("month", Some(key)) => parse_month(key),
            ("year", Some(key)) => key
                .parse::<i32>()
                .ok()
                .filter(|y| NaiveDate::from_ymd_opt(*y, 1, 1).is_some())
                .map(Self::Year),
            ("day" | "week" | "month" | "year", None) => {
                return Err(CoreError::InvalidInput(format!("grain {grain} needs a key")));
            }
            _ => return Err(CoreError::InvalidInput(format!("unknown grain {grain}"))),
        };
        // Keys at the edge of the calendar parse but have no full range.
        parsed
            .filter(|g| *g == Self::All || g.dates().is_some())
            .ok_or_else(|| CoreError::InvalidInput(format!("invalid {grain} key {}", key.unwrap_or(""))))
    }

    /// Inclusive date range covered, `None` for `all`.
    pub fn dates(&self) -> Option<RangeInclusive<NaiveDate>> {
        match *self {
            Self::All => None,
            Self::Day(day) => Some(day..=day),
            Self::Week { year, week } => {
                let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
                let sunday = NaiveDate::from_isoywd_opt(year, week, Weekday::Sun)?;
                Some(monday..=sunday)
            }
            Self::Month { year, month } => {
                let first = NaiveDate::from_ymd_opt(year, month, 1)?;
                let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
                Some(first..=last)
            }
            Self::Year(year) => Some(NaiveDate::from_ymd_opt(year, 1, 1)?..=NaiveDate::from_ymd_opt(year, 12, 31)?),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Day(_) => "day",
            Self::Week { .. } => "week",
            Self::Month { .. } => "month",
            Self::Year(_) => "year",
        }
    }
}

fn parse_week(key: &str) -> Option<Grain> {
    let (year, week) = key.split_once("-W")?;
    let year = year.parse().ok()?;
    let week = week.parse().ok()?;
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
    Some(Grain::Week { year, week })
}

fn parse_month(key: &str) -> Option<Grain> {
    let (year, month) = key.split_once('-')?;
    let year = year.parse().ok()?;
    let month = month.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(Grain::Month { year, month })
}

/// One account's sums over a grain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonTotals {
    pub github_person_id: Uuid,
    pub additions: i64,
    pub deletions: i64,
    pub commits: i64,
    pub prs_authored: i64,
    pub prs_reviewed: i64,
    pub comments: i64,
    pub score: f64,
    pub active_days: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub grain: &'static str,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Highest score first.
    pub people: Vec<PersonTotals>,
    pub rows: Vec<PeopleStatistics>,
}

/// Sum rows per account across repositories and days.
pub fn aggregate(rows: &[PeopleStatistics]) -> Vec<PersonTotals> {
    let mut totals: BTreeMap<Uuid, (PersonTotals, Vec<NaiveDate>)> = BTreeMap::new();
    for row in rows {
        let (t, days) = totals.entry(row.github_person_id).or_insert_with(|| {
            (
                PersonTotals {
                    github_person_id: row.github_person_id,
                    additions: 0,
                    deletions: 0,
                    commits: 0,
                    prs_authored: 0,
                    prs_reviewed: 0,
                    comments: 0,
                    score: 0.0,
                    active_days: 0,
                },
                Vec::new(),
            )
        });
        t.additions += row.additions;
        t.deletions += row.deletions;
        t.commits += i64::from(row.commits);
        t.prs_authored += i64::from(row.prs_authored);
        t.prs_reviewed += i64::from(row.prs_reviewed);
        t.comments += i64::from(row.comments);
        t.score += row.score;
        days.push(row.stat_date);
    }
    let mut people: Vec<PersonTotals> = totals
        .into_values()
        .map(|(mut t, mut days)| {
            days.sort();
            days.dedup();
            t.active_days = days.len();
            t
        })
        .collect();
    people.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.github_person_id.cmp(&b.github_person_id))
    });
    people
}

/// Stored aggregates for a grain. Never recomputes.
pub async fn read_stats<S>(store: &S, project_id: Uuid, grain: Grain) -> CoreResult<StatsReport>
where
    S: StatsStore + ?Sized,
{
    let dates = grain.dates();
    let rows = store.project_stats(project_id, dates.clone()).await?;
    Ok(StatsReport {
        grain: grain.name(),
        from: dates.as_ref().map(|d| *d.start()),
        to: dates.as_ref().map(|d| *d.end()),
        people: aggregate(&rows),
        rows,
    })
}
