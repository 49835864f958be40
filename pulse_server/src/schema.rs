//! Diesel table definitions for the analytics store.
//!
//! Tables: projects, project_repositories, github_repositories, commits,
//! commit_files, pull_requests, pr_reviews, people, github_people,
//! github_person_emails, email_merges, excluded_extensions, excluded_folders,
//! score_settings, working_hours_settings, project_update_settings, jobs,
//! people_statistics.

diesel::table! {
    projects (id) {
        id -> Uuid,
        name -> Varchar,
        owner_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    github_repositories (id) {
        id -> Uuid,
        github_repo_id -> Int8,
        full_name -> Varchar,
        clone_url -> Varchar,
        default_branch -> Varchar,
        is_cloned -> Bool,
        head_sha -> Nullable<Varchar>,
        ingested_sha -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    project_repositories (id) {
        id -> Uuid,
        project_id -> Uuid,
        github_repository_id -> Uuid,
        is_tracked -> Bool,
        is_cloned -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    commits (id) {
        id -> Uuid,
        github_repository_id -> Uuid,
        sha -> Varchar,
        author_email -> Varchar,
        author_name -> Varchar,
        commit_date -> Timestamptz,
        message -> Text,
    }
}

diesel::table! {
    commit_files (id) {
        id -> Uuid,
        commit_id -> Uuid,
        path -> Text,
        additions -> Int4,
        deletions -> Int4,
        status -> Varchar,
    }
}

diesel::table! {
    pull_requests (id) {
        id -> Uuid,
        repository_id -> Uuid,
        number -> Int4,
        title -> Text,
        user_login -> Varchar,
        state -> Varchar,
        review_comments -> Int4,
        github_created_at -> Timestamptz,
        merged_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    pr_reviews (id) {
        id -> Uuid,
        repository_id -> Uuid,
        pr_id -> Uuid,
        github_review_id -> Int8,
        reviewer_login -> Varchar,
        state -> Varchar,
        has_body -> Bool,
        comment_count -> Int4,
        github_created_at -> Timestamptz,
    }
}

diesel::table! {
    people (id) {
        id -> Uuid,
        name -> Varchar,
        primary_email -> Varchar,
    }
}

diesel::table! {
    github_people (id) {
        id -> Uuid,
        github_user_id -> Int8,
        username -> Varchar,
        person_type -> Varchar,
    }
}

diesel::table! {
    github_person_emails (id) {
        id -> Uuid,
        project_id -> Uuid,
        github_person_id -> Uuid,
        person_id -> Uuid,
    }
}

diesel::table! {
    email_merges (id) {
        id -> Uuid,
        project_id -> Uuid,
        source_email -> Varchar,
        target_email -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    excluded_extensions (id) {
        id -> Uuid,
        project_id -> Uuid,
        value -> Varchar,
    }
}

diesel::table! {
    excluded_folders (id) {
        id -> Uuid,
        project_id -> Uuid,
        value -> Varchar,
    }
}

diesel::table! {
    score_settings (project_id) {
        project_id -> Uuid,
        additions -> Float8,
        deletions -> Float8,
        commits -> Float8,
        pull_requests -> Float8,
        comments -> Float8,
    }
}

diesel::table! {
    working_hours_settings (project_id) {
        project_id -> Uuid,
        start_hour -> Int4,
        end_hour -> Int4,
        monday -> Bool,
        tuesday -> Bool,
        wednesday -> Bool,
        thursday -> Bool,
        friday -> Bool,
        saturday -> Bool,
        sunday -> Bool,
    }
}

diesel::table! {
    project_update_settings (project_id) {
        project_id -> Uuid,
        auto_update_enabled -> Bool,
        auto_update_hour -> Int4,
        last_triggered_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    jobs (id) {
        id -> Uuid,
        project_id -> Uuid,
        project_repository_id -> Nullable<Uuid>,
        job_type -> Varchar,
        status -> Varchar,
        depends_on -> Nullable<Uuid>,
        error_message -> Nullable<Text>,
        attempt -> Int4,
        retry_of -> Nullable<Uuid>,
        created_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        finished_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    people_statistics (id) {
        id -> Uuid,
        project_id -> Uuid,
        repository_id -> Uuid,
        github_person_id -> Uuid,
        stat_date -> Date,
        additions -> Int8,
        deletions -> Int8,
        commits -> Int4,
        prs_authored -> Int4,
        prs_reviewed -> Int4,
        comments -> Int4,
        score -> Float8,
    }
}

// Foreign key relationships
diesel::joinable!(project_repositories -> projects (project_id));
diesel::joinable!(project_repositories -> github_repositories (github_repository_id));
diesel::joinable!(commits -> github_repositories (github_repository_id));
diesel::joinable!(commit_files -> commits (commit_id));
diesel::joinable!(pull_requests -> github_repositories (repository_id));
diesel::joinable!(pr_reviews -> pull_requests (pr_id));
diesel::joinable!(github_person_emails -> people (person_id));
diesel::joinable!(github_person_emails -> github_people (github_person_id));
diesel::joinable!(email_merges -> projects (project_id));
diesel::joinable!(jobs -> projects (project_id));
diesel::joinable!(people_statistics -> github_people (github_person_id));

diesel::allow_tables_to_appear_in_same_query!(
    projects,
    github_repositories,
    project_repositories,
    commits,
    commit_files,
    pull_requests,
    pr_reviews,
    people,
    github_people,
    github_person_emails,
    email_merges,
    excluded_extensions,
    excluded_folders,
    score_settings,
    working_hours_settings,
    project_update_settings,
    jobs,
    people_statistics,
);
