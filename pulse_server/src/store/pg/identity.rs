use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::PgStore;
use crate::error::{CoreError, CoreResult};
use crate::github::GithubAccount;
use crate::identity::merge_graph::MergeGraph;
use crate::models::identity::{
    normalize_email, EmailMerge, GithubPerson, GithubPersonEmail, IdentityBinding, Person,
};
use crate::schema::{email_merges, github_people, github_person_emails, people, projects};
use crate::store::IdentityStore;

#[async_trait]
impl IdentityStore for PgStore {
    async fn merges(&self, project_id: Uuid) -> CoreResult<Vec<EmailMerge>> {
        let mut conn = self.conn().await?;
        Ok(email_merges::table
            .filter(email_merges::project_id.eq(project_id))
            .order(email_merges::source_email.asc())
            .load::<EmailMerge>(&mut conn)
            .await?)
    }

    async fn create_merge(&self, project_id: Uuid, source: &str, target: &str) -> CoreResult<EmailMerge> {
        let source = normalize_email(source);
        let target = normalize_email(target);
        let mut conn = self.conn().await?;
        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                // Serialise merge edits per project so the cycle check sees every edge.
                projects::table
                    .find(project_id)
                    .select(projects::id)
                    .for_update()
                    .first::<Uuid>(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| CoreError::not_found(format!("project {project_id} not found")))?;

                let existing = email_merges::table
                    .filter(email_merges::project_id.eq(project_id))
                    .load::<EmailMerge>(conn)
                    .await?;
                MergeGraph::from_merges(&existing).check_new_edge(&source, &target)?;

                let merge = EmailMerge {
                    id: Uuid::new_v4(),
                    project_id,
                    source_email: source,
                    target_email: target,
                    created_at: Utc::now(),
                };
                Ok(diesel::insert_into(email_merges::table)
                    .values(&merge)
                    .get_result::<EmailMerge>(conn)
                    .await?)
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_merge(&self, project_id: Uuid, source: &str) -> CoreResult<()> {
        let source = normalize_email(source);
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            email_merges::table
                .filter(email_merges::project_id.eq(project_id))
                .filter(email_merges::source_email.eq(&source)),
        )
        .execute(&mut conn)
        .await?;
        if deleted == 0 {
            return Err(CoreError::not_found(format!("no merge from {source}")));
        }
        Ok(())
    }

    async fn bindings(&self, project_id: Uuid) -> CoreResult<Vec<IdentityBinding>> {
        let mut conn = self.conn().await?;
        let rows = github_person_emails::table
            .inner_join(people::table)
            .inner_join(github_people::table)
            .filter(github_person_emails::project_id.eq(project_id))
            .order(github_people::username.asc())
            .select((
                GithubPersonEmail::as_select(),
                Person::as_select(),
                GithubPerson::as_select(),
            ))
            .load::<(GithubPersonEmail, Person, GithubPerson)>(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(binding, person, github_person)| IdentityBinding {
                binding,
                person,
                github_person,
            })
            .collect())
    }

    async fn has_bindings(&self, project_id: Uuid) -> CoreResult<bool> {
        let mut conn = self.conn().await?;
        let count: i64 = github_person_emails::table
            .filter(github_person_emails::project_id.eq(project_id))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }

    async fn get_or_create_person(&self, email: &str, name: &str) -> CoreResult<Person> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(CoreError::InvalidInput("email must not be empty".to_string()));
        }
        let mut conn = self.conn().await?;
        let candidate = Person {
            id: Uuid::new_v4(),
            name: name.to_string(),
            primary_email: email.clone(),
        };
        diesel::insert_into(people::table)
            .values(&candidate)
            .on_conflict(people::primary_email)
            .do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(people::table
            .filter(people::primary_email.eq(&email))
            .first::<Person>(&mut conn)
            .await?)
    }

    async fn upsert_github_person(&self, account: &GithubAccount) -> CoreResult<GithubPerson> {
        let mut conn = self.conn().await?;
        let row = GithubPerson {
            id: Uuid::new_v4(),
            github_user_id: account.id,
            username: account.login.clone(),
            person_type: account.account_type.as_str().to_string(),
        };
        use github_people::dsl as g;
        Ok(diesel::insert_into(g::github_people)
            .values(&row)
            .on_conflict(g::github_user_id)
            .do_update()
            .set((
                g::username.eq(excluded(g::username)),
                g::person_type.eq(excluded(g::person_type)),
            ))
            .get_result::<GithubPerson>(&mut conn)
            .await?)
    }

    async fn github_person_by_login(&self, login: &str) -> CoreResult<Option<GithubPerson>> {
        let mut conn = self.conn().await?;
        Ok(github_people::table
            .filter(github_people::username.eq(login))
            .order(github_people::github_user_id.asc())
            .first::<GithubPerson>(&mut conn)
            .await
            .optional()?)
    }

    async fn bind(
        &self,
        project_id: Uuid,
        github_person_id: Uuid,
        person_id: Uuid,
    ) -> CoreResult<GithubPersonEmail> {
        let mut conn = self.conn().await?;
        let row = GithubPersonEmail {
            id: Uuid::new_v4(),
            project_id,
            github_person_id,
            person_id,
        };
        diesel::insert_into(github_person_emails::table)
            .values(&row)
            .get_result::<GithubPersonEmail>(&mut conn)
            .await
            .map_err(|e| match CoreError::from(e) {
                CoreError::Conflict { .. } => {
                    CoreError::conflict("account is already associated in this project")
                }
                other => other,
            })
    }

    async fn unbind(&self, project_id: Uuid, github_person_id: Uuid) -> CoreResult<()> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            github_person_emails::table
                .filter(github_person_emails::project_id.eq(project_id))
                .filter(github_person_emails::github_person_id.eq(github_person_id)),
        )
        .execute(&mut conn)
        .await?;
        if deleted == 0 {
            return Err(CoreError::not_found("association not found"));
        }
        Ok(())
    }
}
