//! CSV exports for administrators

use access_control::{Principal, RowFilter};
use anyhow::Context;
use database_layer::StudentQuery;

use crate::error::{ApiError, ApiResult};
use crate::server::RecordsServer;

pub const STUDENT_HEADERS: [&str; 9] = [
    "ID",
    "Username",
    "Email",
    "First Name",
    "Last Name",
    "Enrollment Number",
    "Date of Birth",
    "Phone Number",
    "Address",
];

pub const GRADE_HEADERS: [&str; 8] = [
    "ID",
    "Student Username",
    "Student Enrollment",
    "Course Code",
    "Course Title",
    "Grade",
    "Teacher",
    "Graded At",
];

/// A rendered export, ready to send as an attachment
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub filename: &'static str,
    pub body: Vec<u8>,
}

fn require_admin(principal: &Principal, export: &str) -> ApiResult<()> {
    if principal.is_admin() {
        return Ok(());
    }
    tracing::debug!(
        principal = principal.user_id,
        role = %principal.role,
        export,
        "Export denied"
    );
    Err(ApiError::forbidden())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> ApiResult<Vec<u8>> {
    Ok(writer.into_inner().context("Failed to flush CSV export")?)
}

pub async fn students_csv(server: &RecordsServer, principal: &Principal) -> ApiResult<CsvExport> {
    require_admin(principal, "students")?;

    let mut tx = server.begin().await?;
    let students = tx.list_students(&RowFilter::All, &StudentQuery::default()).await?;
    drop(tx);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(STUDENT_HEADERS).context("Failed to write CSV header")?;
    for record in &students.items {
        let (user, profile) = (&record.user, &record.profile);
        writer
            .write_record([
                profile.id.to_string(),
                user.username.clone(),
                user.email.clone(),
                user.first_name.clone(),
                user.last_name.clone(),
                profile.enrollment_number.clone(),
                profile.date_of_birth.to_string(),
                profile.phone_number.clone(),
                profile.address.clone(),
            ])
            .context("Failed to write CSV row")?;
    }

    tracing::info!(rows = students.items.len(), exported_by = principal.user_id, "Students exported");
    Ok(CsvExport {
        filename: "students.csv",
        body: finish(writer)?,
    })
}

pub async fn grades_csv(server: &RecordsServer, principal: &Principal, course_id: Option<i64>) -> ApiResult<CsvExport> {
    require_admin(principal, "grades")?;

    let mut tx = server.begin().await?;
    let rows = tx.grade_export_rows(course_id).await?;
    drop(tx);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(GRADE_HEADERS).context("Failed to write CSV header")?;
    for row in &rows {
        writer
            .write_record([
                row.id.to_string(),
                row.student_username.clone(),
                row.enrollment_number.clone(),
                row.course_code.clone(),
                row.course_title.clone(),
                row.value.to_string(),
                row.teacher_username.clone().unwrap_or_else(|| "N/A".to_string()),
                row.graded_at.to_rfc3339(),
            ])
            .context("Failed to write CSV row")?;
    }

    tracing::info!(rows = rows.len(), course_id, exported_by = principal.user_id, "Grades exported");
    Ok(CsvExport {
        filename: "grades.csv",
        body: finish(writer)?,
    })
}
