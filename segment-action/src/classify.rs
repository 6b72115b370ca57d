use crate::api::ActionError;
use crate::query::FieldDescriptor;

pub const EMAIL_TAG: &str = "email";
pub const USER_ID_TAG: &str = "user_id";
pub const ANONYMOUS_ID_TAG: &str = "segment_anonymous_id";

/// A query needs at least one field carrying one of these tags.
pub const ALLOWED_TAGS: [&str; 3] = [EMAIL_TAG, USER_ID_TAG, ANONYMOUS_ID_TAG];

/// The identity roles a field can fill in an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Becomes the event's `userId`.
    Id,
    /// Always surfaced as the `email` trait.
    Email,
    /// Becomes the event's `anonymousId`.
    AnonymousId,
}

impl Role {
    fn matches(self, field: &FieldDescriptor) -> bool {
        match self {
            Role::Id => field.has_tag(USER_ID_TAG) || field.has_tag(ANONYMOUS_ID_TAG),
            Role::Email => field.has_tag(EMAIL_TAG),
            Role::AnonymousId => field.has_tag(ANONYMOUS_ID_TAG),
        }
    }
}

/// Which field, if any, fills each role. Computed once per invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRoles {
    pub id_field: Option<FieldDescriptor>,
    pub email_field: Option<FieldDescriptor>,
    pub anonymous_id_field: Option<FieldDescriptor>,
}

impl ResolvedRoles {
    pub fn field(&self, role: Role) -> Option<&FieldDescriptor> {
        match role {
            Role::Id => self.id_field.as_ref(),
            Role::Email => self.email_field.as_ref(),
            Role::AnonymousId => self.anonymous_id_field.as_ref(),
        }
    }

    /// Whether `field` is the one resolved for `role`. Fields are compared by name.
    pub fn is(&self, role: Role, field: &FieldDescriptor) -> bool {
        self.field(role).is_some_and(|f| f.name == field.name)
    }
}

/// Resolve every role against `fields`. The first matching field in order wins, and
/// a single field may fill several roles.
pub fn classify(fields: &[FieldDescriptor]) -> Result<ResolvedRoles, ActionError> {
    let identifiable: Vec<&FieldDescriptor> = fields
        .iter()
        .filter(|field| ALLOWED_TAGS.iter().any(|tag| field.has_tag(tag)))
        .collect();

    if identifiable.is_empty() {
        return Err(ActionError::MissingIdentifier);
    }

    let resolve = |role: Role| {
        identifiable
            .iter()
            .find(|field| role.matches(field))
            .map(|field| (*field).clone())
    };

    let roles = ResolvedRoles {
        id_field: resolve(Role::Id),
        email_field: resolve(Role::Email),
        anonymous_id_field: resolve(Role::AnonymousId),
    };

    tracing::debug!(
        id_field = roles.id_field.as_ref().map(|f| f.name.as_str()),
        email_field = roles.email_field.as_ref().map(|f| f.name.as_str()),
        anonymous_id_field = roles.anonymous_id_field.as_ref().map(|f| f.name.as_str()),
        "resolved identity roles"
    );

    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, tags: &[&str]) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_owned(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn rejects_queries_without_identifiable_fields() {
        let fields = vec![field("users.plan", &[]), field("users.city", &["geo"])];

        let err = classify(&fields).unwrap_err();
        assert!(matches!(err, ActionError::MissingIdentifier));

        assert!(matches!(classify(&[]), Err(ActionError::MissingIdentifier)));
    }

    #[test]
    fn first_matching_field_wins() {
        let fields = vec![
            field("users.plan", &[]),
            field("users.email", &["email"]),
            field("users.id", &["user_id"]),
            field("users.backup_email", &["email"]),
            field("users.other_id", &["user_id"]),
        ];

        let roles = classify(&fields).unwrap();
        assert_eq!(roles.field(Role::Email).unwrap().name, "users.email");
        assert_eq!(roles.field(Role::Id).unwrap().name, "users.id");
        assert_eq!(roles.field(Role::AnonymousId), None);
    }

    #[test]
    fn anonymous_id_fills_both_id_and_anonymous_roles() {
        let fields = vec![field("events.anon", &["segment_anonymous_id"])];

        let roles = classify(&fields).unwrap();
        assert_eq!(roles.field(Role::Id).unwrap().name, "events.anon");
        assert_eq!(roles.field(Role::AnonymousId).unwrap().name, "events.anon");
        assert_eq!(roles.field(Role::Email), None);
    }

    #[test]
    fn id_role_takes_the_first_of_either_tag() {
        let fields = vec![
            field("events.anon", &["segment_anonymous_id"]),
            field("users.id", &["user_id"]),
        ];

        let roles = classify(&fields).unwrap();
        assert_eq!(roles.field(Role::Id).unwrap().name, "events.anon");
    }

    #[test]
    fn one_field_can_fill_several_roles() {
        let fields = vec![field("users.email", &["user_id", "email"])];

        let roles = classify(&fields).unwrap();
        assert!(roles.is(Role::Id, &fields[0]));
        assert!(roles.is(Role::Email, &fields[0]));
        assert!(!roles.is(Role::AnonymousId, &fields[0]));
    }
}
