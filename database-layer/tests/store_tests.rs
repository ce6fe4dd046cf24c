//! Integration tests for the in-memory entity store

use access_control::{Role, RowFilter};
use chrono::NaiveDate;
use database_layer::*;
use std::sync::Arc;

struct Fixture {
    teacher: ProfileIds,
    other_teacher: ProfileIds,
    student: ProfileIds,
    other_student: ProfileIds,
    course: i64,
    other_course: i64,
}

#[derive(Clone, Copy)]
struct ProfileIds {
    user: i64,
    profile: i64,
}

fn user(username: &str, role: Role) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: format!("{username}@school.test"),
        password_hash: "hash".to_string(),
        role,
        first_name: username.to_uppercase(),
        last_name: String::new(),
        is_active: true,
    }
}

async fn seed(store: &MemoryStore) -> Fixture {
    let mut tx = store.begin().await.unwrap();

    let mut teachers = Vec::new();
    for name in ["turing", "hopper"] {
        let u = tx.insert_user(user(name, Role::Teacher)).await.unwrap();
        let t = tx
            .insert_teacher(NewTeacherProfile {
                user_id: u.id,
                department: "Computing".to_string(),
            })
            .await
            .unwrap();
        teachers.push(ProfileIds {
            user: u.id,
            profile: t.profile.id,
        });
    }

    let mut students = Vec::new();
    for (name, number) in [("ada", "ENR000101"), ("grace", "ENR000102")] {
        let u = tx.insert_user(user(name, Role::Student)).await.unwrap();
        let s = tx
            .insert_student(NewStudentProfile {
                user_id: u.id,
                enrollment_number: number.to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(2001, 5, 4).unwrap(),
                phone_number: String::new(),
                address: String::new(),
            })
            .await
            .unwrap();
        students.push(ProfileIds {
            user: u.id,
            profile: s.profile.id,
        });
    }

    let course = tx
        .insert_course(NewCourse {
            code: "CS101".to_string(),
            title: "Introduction to Computing".to_string(),
            description: "Algorithms and machines".to_string(),
            teacher_id: Some(teachers[0].profile),
            is_active: true,
        })
        .await
        .unwrap();
    let other_course = tx
        .insert_course(NewCourse {
            code: "CS202".to_string(),
            title: "Compilers".to_string(),
            description: String::new(),
            teacher_id: Some(teachers[1].profile),
            is_active: false,
        })
        .await
        .unwrap();

    tx.insert_enrollment(NewEnrollment {
        student_id: students[0].profile,
        course_id: course.id,
    })
    .await
    .unwrap();
    tx.insert_enrollment(NewEnrollment {
        student_id: students[1].profile,
        course_id: other_course.id,
    })
    .await
    .unwrap();

    tx.commit().await.unwrap();

    Fixture {
        teacher: teachers[0],
        other_teacher: teachers[1],
        student: students[0],
        other_student: students[1],
        course: course.id,
        other_course: other_course.id,
    }
}

#[tokio::test]
async fn test_teacher_sees_only_students_in_taught_courses() {
    let store = MemoryStore::new();
    let fx = seed(&store).await;
    let mut tx = store.begin().await.unwrap();

    let page = tx
        .list_students(&RowFilter::TaughtBy(fx.teacher.profile), &StudentQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].profile.id, fx.student.profile);
    assert_eq!(page.items[0].user.username, "ada");

    let hidden = tx
        .get_student(fx.other_student.profile, &RowFilter::TaughtBy(fx.teacher.profile))
        .await
        .unwrap();
    assert!(hidden.is_none());
}

#[tokio::test]
async fn test_active_course_filter_and_search() {
    let store = MemoryStore::new();
    let fx = seed(&store).await;
    let mut tx = store.begin().await.unwrap();

    let active = tx
        .list_courses(&RowFilter::ActiveCourses, &CourseQuery::default())
        .await
        .unwrap();
    assert_eq!(active.total, 1);
    assert_eq!(active.items[0].id, fx.course);

    let searched = tx
        .list_courses(
            &RowFilter::All,
            &CourseQuery::default().with_search(Some("COMPILER".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(searched.total, 1);
    assert_eq!(searched.items[0].id, fx.other_course);

    let by_teacher = tx
        .list_courses(
            &RowFilter::All,
            &CourseQuery::new(CourseFilter {
                teacher: Some(fx.other_teacher.profile),
                ..CourseFilter::default()
            }),
        )
        .await
        .unwrap();
    assert_eq!(by_teacher.total, 1);
}

#[tokio::test]
async fn test_totals_exclude_invisible_rows_before_pagination() {
    let store = MemoryStore::new();
    let fx = seed(&store).await;
    let mut tx = store.begin().await.unwrap();

    let page = tx
        .list_enrollments(
            &RowFilter::OwnStudent(fx.student.profile),
            &EnrollmentQuery::default().with_page(PageRequest::new(1, 1)),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items.len(), 1);

    let beyond = tx
        .list_enrollments(
            &RowFilter::All,
            &EnrollmentQuery::default().with_page(PageRequest::new(3, 1)),
        )
        .await
        .unwrap();
    assert_eq!(beyond.total, 2);
    assert!(beyond.items.is_empty());
}

#[tokio::test]
async fn test_teacher_profiles_order_by_username_by_default() {
    let store = MemoryStore::new();
    seed(&store).await;
    let mut tx = store.begin().await.unwrap();

    let page = tx
        .list_teachers(&RowFilter::All, &TeacherQuery::default())
        .await
        .unwrap();
    let names: Vec<_> = page.items.iter().map(|t| t.user.username.as_str()).collect();
    assert_eq!(names, vec!["hopper", "turing"]);

    let reversed = tx
        .list_teachers(&RowFilter::All, &TeacherQuery::default().with_ordering(Some("-username")))
        .await
        .unwrap();
    assert_eq!(reversed.items[0].user.username, "turing");
}

#[tokio::test]
async fn test_grade_export_joins_names() {
    let store = MemoryStore::new();
    let fx = seed(&store).await;
    let mut tx = store.begin().await.unwrap();
    tx.insert_grade(NewGrade {
        student_id: fx.student.profile,
        course_id: fx.course,
        teacher_id: None,
        value: GradeValue::A,
    })
    .await
    .unwrap();

    let rows = tx.grade_export_rows(Some(fx.course)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].student_username, "ada");
    assert_eq!(rows[0].course_code, "CS101");
    assert_eq!(rows[0].teacher_username, None);
    assert!(tx.grade_export_rows(Some(fx.other_course)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_duplicate_enrollment_exactly_one_commits() {
    let store = Arc::new(MemoryStore::new());
    let fx = seed(&store).await;

    let (student_id, course_id) = (fx.student.profile, fx.other_course);

    let attempt = move |store: Arc<MemoryStore>| async move {
        let mut tx = store.begin().await?;
        tx.insert_enrollment(NewEnrollment {
            student_id,
            course_id,
        })
        .await?;
        tx.commit().await
    };

    let (a, b) = tokio::join!(
        tokio::spawn(attempt(Arc::clone(&store))),
        tokio::spawn(attempt(Arc::clone(&store)))
    );
    let results = [a.unwrap(), b.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(DatabaseError::UniqueViolation { field: "non_field_errors", .. }))));
}

#[tokio::test]
async fn test_deleting_student_user_cascades() {
    let store = MemoryStore::new();
    let fx = seed(&store).await;
    let mut tx = store.begin().await.unwrap();

    assert!(tx.delete_user(fx.student.user).await.unwrap());
    assert!(tx.student_for_user(fx.student.user).await.unwrap().is_none());
    assert!(!tx.is_enrolled(fx.student.profile, fx.course).await.unwrap());
    assert!(tx.get_user(fx.teacher.user).await.unwrap().is_some());
}
