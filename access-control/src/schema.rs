use serde::Serialize;

use crate::models::*;

/// Who may attempt an action class on a resource kind, before visibility
/// narrowing and object checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Admins only
    AdminOnly,
    /// Any authenticated principal; results are narrowed by visibility
    Authenticated,
    /// Admins plus principals holding the given role
    AdminOr(Role),
    /// Principals holding a role with a self-service profile of this kind
    SelfProfile(ProfileKind),
}

impl Rule {
    /// Evaluate the rule for a non-admin role
    pub fn permits(&self, role: Role) -> bool {
        match self {
            Rule::AdminOnly => false,
            Rule::Authenticated => true,
            Rule::AdminOr(allowed) => role == *allowed,
            Rule::SelfProfile(kind) => role.profile_kind() == Some(*kind),
        }
    }
}

/// The static per-resource, per-action-class rule table
#[derive(Debug, Clone, Copy, Default)]
pub struct Schema;

impl Schema {
    pub fn new() -> Self {
        Self
    }

    /// Look up the rule for a resource kind and action class.
    ///
    /// Returns `None` where the action does not exist for the resource
    /// (`me` outside the two profile kinds); callers treat that as a denial.
    pub fn rule_for(&self, kind: ResourceKind, class: ActionClass) -> Option<Rule> {
        use ActionClass::*;
        use ResourceKind::*;

        let rule = match (kind, class) {
            (User, Read | Create | MutateExisting) => Rule::AdminOnly,

            (StudentProfile, Read) => Rule::Authenticated,
            (StudentProfile, Create | MutateExisting) => Rule::AdminOnly,
            (StudentProfile, SelfService) => Rule::SelfProfile(ProfileKind::Student),

            (TeacherProfile, Read) => Rule::Authenticated,
            (TeacherProfile, Create | MutateExisting) => Rule::AdminOnly,
            (TeacherProfile, SelfService) => Rule::SelfProfile(ProfileKind::Teacher),

            (Course, Read) => Rule::Authenticated,
            (Course, Create) => Rule::AdminOr(Role::Teacher),
            (Course, MutateExisting) => Rule::AdminOnly,

            (Enrollment, Read) => Rule::Authenticated,
            (Enrollment, Create) => Rule::AdminOr(Role::Student),
            (Enrollment, MutateExisting) => Rule::AdminOnly,

            (Grade, Read) => Rule::Authenticated,
            (Grade, Create | MutateExisting) => Rule::AdminOr(Role::Teacher),

            (User | Course | Enrollment | Grade, SelfService) => return None,
        };

        Some(rule)
    }

    /// Every (resource, action, rule) entry, for documentation and audits
    pub fn entries(&self) -> Vec<(ResourceKind, Action, Option<Rule>)> {
        ResourceKind::ALL
            .iter()
            .flat_map(|kind| {
                Action::ALL
                    .iter()
                    .map(move |action| (*kind, *action, self.rule_for(*kind, action.class())))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_resource_is_admin_only() {
        let schema = Schema::new();
        for class in [ActionClass::Read, ActionClass::Create, ActionClass::MutateExisting] {
            assert_eq!(schema.rule_for(ResourceKind::User, class), Some(Rule::AdminOnly));
        }
        assert_eq!(schema.rule_for(ResourceKind::User, ActionClass::SelfService), None);
    }

    #[test]
    fn test_grade_mutation_open_to_teachers() {
        let rule = Schema::new()
            .rule_for(ResourceKind::Grade, ActionClass::MutateExisting)
            .unwrap();
        assert!(rule.permits(Role::Teacher));
        assert!(!rule.permits(Role::Student));
    }

    #[test]
    fn test_entries_cover_every_pair() {
        assert_eq!(Schema::new().entries().len(), ResourceKind::ALL.len() * Action::ALL.len());
    }
}
