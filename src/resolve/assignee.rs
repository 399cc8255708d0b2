//! Assignee resolution.
//!
//! Turns the free-text "assigned to" string the extraction service produces
//! into either a registered user reference or an external email. The caller
//! pre-fetches the candidate users into a [`UserDirectory`] so resolution
//! itself stays a pure function.

use std::collections::HashMap;

/// Minimal user view needed for matching.
#[derive(Debug, Clone)]
pub struct DirectoryUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Candidates for assignment: registered users found by exact email lookup,
/// plus the meeting's linked attendees.
#[derive(Debug, Default)]
pub struct UserDirectory {
    registered_by_email: HashMap<String, DirectoryUser>,
    attendees: Vec<DirectoryUser>,
}

impl UserDirectory {
    pub fn new(registered: Vec<DirectoryUser>, attendees: Vec<DirectoryUser>) -> Self {
        let registered_by_email = registered
            .into_iter()
            .map(|user| (user.email.to_lowercase(), user))
            .collect();
        Self {
            registered_by_email,
            attendees,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Resolved to a registered user id.
    User(String),
    /// External party identified by email (or a raw-text placeholder).
    Email(String),
    Unassigned,
}

pub fn resolve_assignee(input: &str, directory: &UserDirectory) -> Assignment {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Assignment::Unassigned;
    }

    if let Some(user) = directory.registered_by_email.get(&trimmed.to_lowercase()) {
        return Assignment::User(user.id.clone());
    }

    if let Some(user) = directory.attendees.iter().find(|user| {
        user.name.eq_ignore_ascii_case(trimmed) || user.email.eq_ignore_ascii_case(trimmed)
    }) {
        return Assignment::User(user.id.clone());
    }

    // No match: an email goes out as-is, anything else becomes a
    // placeholder the owner can fix up later.
    Assignment::Email(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str, email: &str) -> DirectoryUser {
        DirectoryUser {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    fn directory() -> UserDirectory {
        UserDirectory::new(
            vec![user("u-alice", "Alice", "alice@example.com")],
            vec![
                user("u-bob", "Bob Smith", "bob@example.com"),
                user("u-carol", "Carol", "carol@example.com"),
            ],
        )
    }

    #[test]
    fn test_blank_is_unassigned() {
        assert_eq!(resolve_assignee("", &directory()), Assignment::Unassigned);
        assert_eq!(resolve_assignee("   ", &directory()), Assignment::Unassigned);
    }

    #[test]
    fn test_registered_email_wins() {
        assert_eq!(
            resolve_assignee("ALICE@example.com", &directory()),
            Assignment::User("u-alice".to_string())
        );
    }

    #[test]
    fn test_attendee_name_match() {
        assert_eq!(
            resolve_assignee("bob smith", &directory()),
            Assignment::User("u-bob".to_string())
        );
    }

    #[test]
    fn test_attendee_email_match() {
        assert_eq!(
            resolve_assignee("Carol@Example.com", &directory()),
            Assignment::User("u-carol".to_string())
        );
    }

    #[test]
    fn test_unknown_email_kept_as_external() {
        assert_eq!(
            resolve_assignee("vendor@acme.com", &directory()),
            Assignment::Email("vendor@acme.com".to_string())
        );
    }

    #[test]
    fn test_unknown_name_becomes_placeholder() {
        assert_eq!(
            resolve_assignee("the new intern", &directory()),
            Assignment::Email("the new intern".to_string())
        );
    }

    #[test]
    fn test_input_is_trimmed() {
        assert_eq!(
            resolve_assignee("  alice@example.com  ", &directory()),
            Assignment::User("u-alice".to_string())
        );
    }
}
