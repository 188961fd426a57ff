use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::session::SessionSnapshot;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mentor,
    Student,
}

impl Role {
    /// Anything that isn't "mentor" is treated as a student
    pub fn parse(s: &str) -> Role {
        if s.eq_ignore_ascii_case("mentor") {
            Role::Mentor
        } else {
            Role::Student
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Role::parse(&s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Mentor => write!(f, "mentor"),
            Role::Student => write!(f, "student"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
}

/// Guest entry as carried in a snapshot's guest list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Guest {
    pub id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

/// Rebuild the roster from a full snapshot.
///
/// `local_name` stands in for the mentor when the snapshot names none.
/// Roles in `left` are suppressed.
pub fn build_roster(
    snapshot: &SessionSnapshot,
    local_name: Option<&str>,
    left: &HashSet<Role>,
) -> Vec<Participant> {
    let mut parts = Vec::new();

    let mentor_name = snapshot.mentor_name.as_deref().or(local_name);
    if let Some(name) = mentor_name {
        parts.push(Participant {
            id: snapshot.mentor_id.clone().unwrap_or_else(|| "mentor".to_string()),
            name: name.to_string(),
            role: Role::Mentor,
            active: true,
        });
    }

    if snapshot.student_name.is_some() || snapshot.student_email.is_some() {
        let name = snapshot
            .student_name
            .clone()
            .or_else(|| snapshot.student_email.clone())
            .unwrap_or_else(|| "Student".to_string());
        let id = snapshot
            .student_email
            .clone()
            .unwrap_or_else(|| format!("student:{}", name));
        parts.push(Participant { id, name, role: Role::Student, active: true });
    }

    for guest in &snapshot.guests {
        let id = guest
            .id
            .clone()
            .or_else(|| guest.email.clone())
            .unwrap_or_else(|| format!("{}:{}", guest.role, guest.name));
        parts.push(Participant {
            id,
            name: guest.name.clone(),
            role: guest.role,
            active: true,
        });
    }

    let mut seen = HashSet::new();
    parts
        .into_iter()
        .filter(|p| !p.id.is_empty() && seen.insert(p.id.clone()))
        .filter(|p| !left.contains(&p.role))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            mentor_name: Some("Ada".into()),
            student_name: Some("Linus".into()),
            student_email: Some("linus@example.com".into()),
            guests: vec![
                Guest { id: None, name: "Grace".into(), email: Some("grace@example.com".into()), role: Role::Student },
                Guest { id: None, name: "Dup".into(), email: Some("linus@example.com".into()), role: Role::Student },
            ],
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn roster_orders_mentor_student_guests_and_dedupes() {
        let roster = build_roster(&snapshot(), None, &HashSet::new());
        let names: Vec<_> = roster.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Linus", "Grace"]);
        assert_eq!(roster[1].id, "linus@example.com");
    }

    #[test]
    fn local_name_fills_missing_mentor() {
        let snap = SessionSnapshot { mentor_name: None, ..snapshot() };
        let roster = build_roster(&snap, Some("Me"), &HashSet::new());
        assert_eq!(roster[0].name, "Me");
        assert_eq!(roster[0].role, Role::Mentor);
    }

    #[test]
    fn left_roles_are_suppressed() {
        let left: HashSet<Role> = [Role::Mentor].into_iter().collect();
        let roster = build_roster(&snapshot(), None, &left);
        assert!(roster.iter().all(|p| p.role == Role::Student));
    }

    #[test]
    fn unknown_role_folds_into_student() {
        let role: Role = serde_json::from_str("\"observer\"").unwrap();
        assert_eq!(role, Role::Student);
    }
}
