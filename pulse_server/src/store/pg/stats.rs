use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::PgStore;
use crate::error::{CoreError, CoreResult};
use crate::models::statistics::{PeopleStatistics, PersonDayStats};
use crate::schema::people_statistics;
use crate::store::StatsStore;

/// Keeps each insert well under PostgreSQL's bind parameter limit.
const CHUNK: usize = 1000;

#[async_trait]
impl StatsStore for PgStore {
    async fn replace_repository_stats(
        &self,
        project_id: Uuid,
        repository_id: Uuid,
        rows: Vec<PersonDayStats>,
    ) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                use people_statistics::dsl as s;

                let existing: HashMap<(Uuid, NaiveDate), Uuid> = s::people_statistics
                    .filter(s::project_id.eq(project_id))
                    .filter(s::repository_id.eq(repository_id))
                    .select((s::github_person_id, s::stat_date, s::id))
                    .load::<(Uuid, NaiveDate, Uuid)>(conn)
                    .await?
                    .into_iter()
                    .map(|(person, date, id)| ((person, date), id))
                    .collect();

                let keep: HashSet<(Uuid, NaiveDate)> = rows
                    .iter()
                    .map(|r| (r.github_person_id, r.stat_date))
                    .collect();
                let stale: Vec<Uuid> = existing
                    .iter()
                    .filter(|(key, _)| !keep.contains(key))
                    .map(|(_, id)| *id)
                    .collect();

                let records: Vec<PeopleStatistics> = rows
                    .into_iter()
                    .map(|r| {
                        let id = existing
                            .get(&(r.github_person_id, r.stat_date))
                            .copied()
                            .unwrap_or_else(Uuid::new_v4);
                        r.into_row(id, project_id, repository_id)
                    })
                    .collect();

                for chunk in records.chunks(CHUNK) {
                    diesel::insert_into(s::people_statistics)
                        .values(chunk)
                        .on_conflict((s::project_id, s::repository_id, s::github_person_id, s::stat_date))
                        .do_update()
                        .set((
                            s::additions.eq(excluded(s::additions)),
                            s::deletions.eq(excluded(s::deletions)),
                            s::commits.eq(excluded(s::commits)),
                            s::prs_authored.eq(excluded(s::prs_authored)),
                            s::prs_reviewed.eq(excluded(s::prs_reviewed)),
                            s::comments.eq(excluded(s::comments)),
                            s::score.eq(excluded(s::score)),
                        ))
                        .execute(conn)
                        .await?;
                }

                for chunk in stale.chunks(CHUNK) {
                    diesel::delete(s::people_statistics.filter(s::id.eq_any(chunk)))
                        .execute(conn)
                        .await?;
                }

                tracing::debug!(
                    project_id = %project_id,
                    repository_id = %repository_id,
                    written = records.len(),
                    removed = stale.len(),
                    "Statistics replaced"
                );
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn project_stats(
        &self,
        project_id: Uuid,
        dates: Option<RangeInclusive<NaiveDate>>,
    ) -> CoreResult<Vec<PeopleStatistics>> {
        let mut conn = self.conn().await?;
        let mut query = people_statistics::table
            .filter(people_statistics::project_id.eq(project_id))
            .into_boxed();
        if let Some(range) = dates {
            query = query
                .filter(people_statistics::stat_date.ge(*range.start()))
                .filter(people_statistics::stat_date.le(*range.end()));
        }
        Ok(query
            .order((
                people_statistics::stat_date.asc(),
                people_statistics::repository_id.asc(),
                people_statistics::github_person_id.asc(),
            ))
            .load::<PeopleStatistics>(&mut conn)
            .await?)
    }
}
