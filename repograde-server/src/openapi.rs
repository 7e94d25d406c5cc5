//! OpenAPI specification for the RepoGrade server.

use utoipa::OpenApi;

use repograde_core::ScoreBreakdown;

use crate::progress::{ProgressEvent, ProgressStage};
use crate::routes::{AnalysisRequest, AnalysisResponse, ErrorResponse, PublishRequest};
use crate::store::{AnalysisResultRecord, HistoryEntry, RepositoryRecord};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::analysis_start,
        crate::routes::analysis_progress,
        crate::routes::analysis_history,
        crate::routes::repository_results,
        crate::routes::repository_languages,
        crate::routes::repository_publish,
        crate::routes::result_detail,
        crate::routes::result_delete,
        crate::routes::openapi_json
    ),
    components(
        schemas(
            AnalysisRequest,
            AnalysisResponse,
            PublishRequest,
            ErrorResponse,
            RepositoryRecord,
            AnalysisResultRecord,
            HistoryEntry,
            ScoreBreakdown,
            ProgressEvent,
            ProgressStage
        )
    ),
    tags(
        (name = "analysis", description = "Repository analysis"),
        (name = "repositories", description = "Analysed repositories"),
        (name = "results", description = "Evaluation results"),
        (name = "system", description = "System endpoints")
    )
)]
/// OpenAPI specification for the RepoGrade server.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::ApiDoc;
    use utoipa::OpenApi;

    #[test]
    fn openapi_includes_expected_paths() {
        let doc = ApiDoc::openapi();
        let paths = doc.paths.paths;

        assert!(paths.contains_key("/analysis"));
        assert!(paths.contains_key("/analysis/progress/{requester_id}"));
        assert!(paths.contains_key("/analysis/user/{requester_id}"));
        assert!(paths.contains_key("/repositories/{id}/results"));
        assert!(paths.contains_key("/repositories/{id}/languages"));
        assert!(paths.contains_key("/repositories/{id}/public"));
        assert!(paths.contains_key("/results/{id}"));
        assert!(paths.contains_key("/openapi.json"));
    }

    #[test]
    fn openapi_registers_error_schema() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.schemas.contains_key("ErrorResponse"));
        assert!(components.schemas.contains_key("HistoryEntry"));
    }
}
