//! Demo data for local development
//!
//! Safe to run repeatedly: rows that already exist are left alone, apart from
//! bringing the demo student's profile back to its fixed values.

use access_control::{Role, RowFilter};
use chrono::NaiveDate;
use database_layer::{
    Course, CourseFilter, CourseQuery, GradeFilter, GradeQuery, GradeValue, NewCourse, NewEnrollment, NewGrade,
    NewStudentProfile, NewTeacherProfile, NewUser, StoreTx, User,
};

use crate::error::{ApiError, ApiResult};
use crate::server::RecordsServer;
use crate::services::users::{insert_account, ValidatedAccount};

pub const DEMO_ENROLLMENT_NUMBER: &str = "ENR001";
const DEMO_DEPARTMENT: &str = "Computer Science";
const DEMO_PHONE: &str = "+1234567890";
const DEMO_ADDRESS: &str = "123 Main St, City, State 12345";

/// What a seeding run created and what it found already present
#[derive(Debug, Default)]
pub struct SeedReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

impl SeedReport {
    fn record(&mut self, created: bool, what: impl Into<String>) {
        if created {
            self.created.push(what.into());
        } else {
            self.existing.push(what.into());
        }
    }
}

async fn demo_account(username: &str, password: &str, role: Role, first_name: &str, last_name: &str) -> ApiResult<NewUser> {
    ValidatedAccount {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: password.to_string(),
        role,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
    }
    .into_new_user()
    .await
}

async fn ensure_user(tx: &mut dyn StoreTx, report: &mut SeedReport, account: NewUser) -> ApiResult<User> {
    let label = format!("user {}", account.username);
    if let Some(user) = tx.find_user_by_username(&account.username).await? {
        report.record(false, label);
        return Ok(user);
    }
    let user = insert_account(tx, account).await?;
    report.record(true, label);
    Ok(user)
}

async fn ensure_course(
    tx: &mut dyn StoreTx,
    report: &mut SeedReport,
    code: &str,
    title: &str,
    description: &str,
    teacher_id: i64,
) -> ApiResult<Course> {
    let query = CourseQuery::new(CourseFilter {
        code: Some(code.to_string()),
        ..CourseFilter::default()
    });
    let existing = tx.list_courses(&RowFilter::All, &query).await?;
    let label = format!("course {code}");
    if let Some(course) = existing.items.into_iter().find(|course| course.code == code) {
        report.record(false, label);
        return Ok(course);
    }

    let course = tx
        .insert_course(NewCourse {
            code: code.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            teacher_id: Some(teacher_id),
            is_active: true,
        })
        .await?;
    report.record(true, label);
    Ok(course)
}

async fn ensure_enrollment(tx: &mut dyn StoreTx, report: &mut SeedReport, student_id: i64, course: &Course) -> ApiResult<()> {
    let label = format!("enrollment in {}", course.code);
    if tx.is_enrolled(student_id, course.id).await? {
        report.record(false, label);
        return Ok(());
    }
    tx.insert_enrollment(NewEnrollment {
        student_id,
        course_id: course.id,
    })
    .await?;
    report.record(true, label);
    Ok(())
}

async fn ensure_grade(
    tx: &mut dyn StoreTx,
    report: &mut SeedReport,
    student_id: i64,
    teacher_id: i64,
    course: &Course,
    value: GradeValue,
) -> ApiResult<()> {
    let query = GradeQuery::new(GradeFilter {
        student: Some(student_id),
        course: Some(course.id),
        ..GradeFilter::default()
    });
    let label = format!("grade for {}", course.code);
    if tx.list_grades(&RowFilter::All, &query).await?.total > 0 {
        report.record(false, label);
        return Ok(());
    }
    tx.insert_grade(NewGrade {
        student_id,
        course_id: course.id,
        teacher_id: Some(teacher_id),
        value,
    })
    .await?;
    report.record(true, label);
    Ok(())
}

/// Admin, teacher and student accounts with two courses, enrollments and grades
pub async fn seed_demo(server: &RecordsServer) -> ApiResult<SeedReport> {
    let date_of_birth =
        NaiveDate::from_ymd_opt(2000, 1, 15).ok_or_else(|| ApiError::internal("Invalid demo date of birth"))?;

    // Hashing happens before the transaction takes the store
    let admin = demo_account("admin", "admin123", Role::Admin, "Admin", "User").await?;
    let teacher = demo_account("teacher", "teacher123", Role::Teacher, "John", "Doe").await?;
    let student = demo_account("student", "student123", Role::Student, "Jane", "Smith").await?;

    let mut report = SeedReport::default();
    let mut tx = server.begin().await?;

    ensure_user(tx.as_mut(), &mut report, admin).await?;
    let teacher = ensure_user(tx.as_mut(), &mut report, teacher).await?;
    let student = ensure_user(tx.as_mut(), &mut report, student).await?;

    let teacher_profile = match tx.teacher_for_user(teacher.id).await? {
        Some(mut record) => {
            if record.profile.department.is_empty() {
                record.profile.department = DEMO_DEPARTMENT.to_string();
                tx.update_teacher(&record.profile).await?;
            }
            record.profile
        }
        None => {
            tx.insert_teacher(NewTeacherProfile {
                user_id: teacher.id,
                department: DEMO_DEPARTMENT.to_string(),
            })
            .await?
            .profile
        }
    };

    let student_profile = match tx.student_for_user(student.id).await? {
        Some(mut record) => {
            if record.profile.enrollment_number != DEMO_ENROLLMENT_NUMBER {
                record.profile.enrollment_number = DEMO_ENROLLMENT_NUMBER.to_string();
                record.profile.date_of_birth = date_of_birth;
                record.profile.phone_number = DEMO_PHONE.to_string();
                record.profile.address = DEMO_ADDRESS.to_string();
                tx.update_student(&record.profile).await?;
                report.record(true, "student profile values");
            }
            record.profile
        }
        None => {
            tx.insert_student(NewStudentProfile {
                user_id: student.id,
                enrollment_number: DEMO_ENROLLMENT_NUMBER.to_string(),
                date_of_birth,
                phone_number: DEMO_PHONE.to_string(),
                address: DEMO_ADDRESS.to_string(),
            })
            .await?
            .profile
        }
    };

    let cs101 = ensure_course(
        tx.as_mut(),
        &mut report,
        "CS101",
        "Introduction to Computer Science",
        "Fundamentals of programming and computer science",
        teacher_profile.id,
    )
    .await?;
    let ma101 = ensure_course(
        tx.as_mut(),
        &mut report,
        "MA101",
        "Calculus I",
        "Introduction to differential and integral calculus",
        teacher_profile.id,
    )
    .await?;

    for course in [&cs101, &ma101] {
        ensure_enrollment(tx.as_mut(), &mut report, student_profile.id, course).await?;
    }
    ensure_grade(tx.as_mut(), &mut report, student_profile.id, teacher_profile.id, &cs101, GradeValue::A).await?;
    ensure_grade(tx.as_mut(), &mut report, student_profile.id, teacher_profile.id, &ma101, GradeValue::B).await?;

    tx.commit().await?;
    tracing::info!(
        created = report.created.len(),
        existing = report.existing.len(),
        "Demo data seeded"
    );
    Ok(report)
}
