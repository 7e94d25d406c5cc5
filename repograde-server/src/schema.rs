//! Diesel schema definitions for the RepoGrade server.

diesel::table! {
    repositories (id) {
        id -> Int8,
        requester_id -> Text,
        name -> Text,
        html_url -> Text,
        description -> Nullable<Text>,
        main_branch -> Text,
        primary_language -> Nullable<Text>,
        public -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    repository_languages (id) {
        id -> Int8,
        repository_id -> Int8,
        language -> Text,
        bytes -> Int8,
    }
}

diesel::table! {
    analysis_results (id) {
        id -> Int8,
        repository_id -> Int8,
        summary -> Text,
        strengths -> Text,
        improvements -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    scores (id) {
        id -> Int8,
        analysis_result_id -> Int8,
        readme_score -> Int4,
        test_score -> Int4,
        commit_score -> Int4,
        cicd_score -> Int4,
    }
}

diesel::joinable!(repository_languages -> repositories (repository_id));
diesel::joinable!(analysis_results -> repositories (repository_id));
diesel::joinable!(scores -> analysis_results (analysis_result_id));

diesel::allow_tables_to_appear_in_same_query!(
    repositories,
    repository_languages,
    analysis_results,
    scores,
);
