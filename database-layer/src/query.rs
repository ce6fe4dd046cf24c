//! List query construction: filters, search, ordering and pagination
//!
//! Each resource declares its filter struct and a [`SortField`] enum naming
//! the columns it may be ordered by. Unknown ordering fields are dropped, and
//! an empty ordering falls back to the resource's default.

use access_control::{ProfileId, Role};
use serde::Serialize;

use crate::models::GradeValue;

/// Offset pagination request; `page` is 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_PAGE_SIZE)
    }
}

/// One page of results plus the total count of visible, filtered rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// Column a resource may be ordered by
pub trait SortField: Copy + Sized {
    fn parse(name: &str) -> Option<Self>;

    /// Qualified SQL column
    fn column(&self) -> &'static str;

    fn default_ordering() -> Vec<OrderBy<Self>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy<F> {
    pub field: F,
    pub descending: bool,
}

impl<F: SortField> OrderBy<F> {
    pub fn asc(field: F) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: F) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// Parse a comma separated `ordering` parameter such as `-graded_at,value`
    pub fn parse_list(raw: Option<&str>) -> Vec<Self> {
        let parsed: Vec<Self> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .filter_map(|term| match term.strip_prefix('-') {
                Some(name) => F::parse(name).map(Self::desc),
                None => F::parse(term).map(Self::asc),
            })
            .collect();

        if parsed.is_empty() {
            F::default_ordering()
        } else {
            parsed
        }
    }
}

/// Full list request for one resource
#[derive(Debug, Clone)]
pub struct ListQuery<Filter, Field> {
    pub filter: Filter,
    /// Case-insensitive substring over the resource's search fields
    pub search: Option<String>,
    pub ordering: Vec<OrderBy<Field>>,
    /// `None` returns every matching row
    pub page: Option<PageRequest>,
}

impl<Filter: Default, Field: SortField> Default for ListQuery<Filter, Field> {
    fn default() -> Self {
        Self {
            filter: Filter::default(),
            search: None,
            ordering: Field::default_ordering(),
            page: None,
        }
    }
}

impl<Filter, Field: SortField> ListQuery<Filter, Field> {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            search: None,
            ordering: Field::default_ordering(),
            page: None,
        }
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn with_ordering(mut self, raw: Option<&str>) -> Self {
        self.ordering = OrderBy::parse_list(raw);
        self
    }

    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    /// Lowercased search term, for backends that match in memory
    pub fn search_lower(&self) -> Option<String> {
        self.search.as_ref().map(|s| s.to_lowercase())
    }
}

macro_rules! sort_fields {
    (
        $name:ident { $($variant:ident => $param:literal, $column:literal;)+ }
        default: $($default:expr),+
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
        }

        impl SortField for $name {
            fn parse(name: &str) -> Option<Self> {
                match name {
                    $($param => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn column(&self) -> &'static str {
                match self {
                    $(Self::$variant => $column,)+
                }
            }

            fn default_ordering() -> Vec<OrderBy<Self>> {
                vec![$($default),+]
            }
        }
    };
}

sort_fields! {
    UserSort {
        Username => "username", "u.username";
        Email => "email", "u.email";
        DateJoined => "date_joined", "u.date_joined";
        Role => "role", "u.role";
    }
    default: OrderBy::desc(UserSort::DateJoined)
}

sort_fields! {
    StudentSort {
        EnrollmentNumber => "enrollment_number", "sp.enrollment_number";
        CreatedAt => "created_at", "sp.created_at";
    }
    default: OrderBy::asc(StudentSort::EnrollmentNumber)
}

sort_fields! {
    TeacherSort {
        Department => "department", "tp.department";
        CreatedAt => "created_at", "tp.created_at";
        Username => "username", "u.username";
    }
    default: OrderBy::asc(TeacherSort::Username)
}

sort_fields! {
    CourseSort {
        Code => "code", "c.code";
        Title => "title", "c.title";
        CreatedAt => "created_at", "c.created_at";
    }
    default: OrderBy::asc(CourseSort::Code)
}

sort_fields! {
    EnrollmentSort {
        EnrolledAt => "enrolled_at", "e.enrolled_at";
    }
    default: OrderBy::desc(EnrollmentSort::EnrolledAt)
}

sort_fields! {
    GradeSort {
        GradedAt => "graded_at", "g.graded_at";
        Value => "value", "g.value";
    }
    default: OrderBy::desc(GradeSort::GradedAt)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilter {
    pub enrollment_number: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeacherFilter {
    pub department: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseFilter {
    pub title: Option<String>,
    pub code: Option<String>,
    pub teacher: Option<ProfileId>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub student: Option<ProfileId>,
    pub course: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeFilter {
    pub student: Option<ProfileId>,
    pub course: Option<i64>,
    pub teacher: Option<ProfileId>,
    pub value: Option<GradeValue>,
}

pub type UserQuery = ListQuery<UserFilter, UserSort>;
pub type StudentQuery = ListQuery<StudentFilter, StudentSort>;
pub type TeacherQuery = ListQuery<TeacherFilter, TeacherSort>;
pub type CourseQuery = ListQuery<CourseFilter, CourseSort>;
pub type EnrollmentQuery = ListQuery<EnrollmentFilter, EnrollmentSort>;
pub type GradeQuery = ListQuery<GradeFilter, GradeSort>;

/// Case-insensitive substring match used by the in-memory backend
pub(crate) fn icontains(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_ordering_falls_back_to_default() {
        let ordering = OrderBy::<GradeSort>::parse_list(Some("bogus,,"));
        assert_eq!(ordering, vec![OrderBy::desc(GradeSort::GradedAt)]);
    }

    #[test]
    fn test_ordering_keeps_known_terms_only() {
        let ordering = OrderBy::<CourseSort>::parse_list(Some("-title, nope ,code"));
        assert_eq!(
            ordering,
            vec![OrderBy::desc(CourseSort::Title), OrderBy::asc(CourseSort::Code)]
        );
    }

    #[test]
    fn test_page_request_is_clamped() {
        let page = PageRequest::new(0, 500);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let query = CourseQuery::default().with_search(Some("   ".to_string()));
        assert_eq!(query.search, None);
    }
}
