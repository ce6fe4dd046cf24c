use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{ApiErrorResponse, ApiResult};
use crate::middleware::CurrentUser;
use crate::server::RecordsServer;
use crate::services::exports::{self, CsvExport};
use crate::types::QueryParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GradeExportParams {
    /// Restrict the export to one course
    pub course_id: Option<i64>,
}

impl IntoResponse for CsvExport {
    fn into_response(self) -> Response {
        let disposition = format!("attachment; filename=\"{}\"", self.filename);
        (
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.body,
        )
            .into_response()
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/exports/students",
    responses(
        (status = 200, description = "Student profiles as CSV", content_type = "text/csv", body = String),
        (status = 403, description = "Administrators only", body = ApiErrorResponse)
    ),
    tag = "exports",
    security(("bearer_auth" = []))
)]
pub async fn export_students(State(server): State<RecordsServer>, current: CurrentUser) -> ApiResult<CsvExport> {
    exports::students_csv(&server, &current.principal).await
}

#[utoipa::path(
    get,
    path = "/api/v1/exports/grades",
    params(GradeExportParams),
    responses(
        (status = 200, description = "Grades as CSV", content_type = "text/csv", body = String),
        (status = 403, description = "Administrators only", body = ApiErrorResponse)
    ),
    tag = "exports",
    security(("bearer_auth" = []))
)]
pub async fn export_grades(
    State(server): State<RecordsServer>,
    current: CurrentUser,
    QueryParams(params): QueryParams<GradeExportParams>,
) -> ApiResult<CsvExport> {
    exports::grades_csv(&server, &current.principal, params.course_id).await
}
