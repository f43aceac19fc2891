//! Static role/path/method access policy.
//!
//! Rules are compiled once into a [`PolicyTable`]. Lookup walks the rules in
//! order and the first rule whose role, method, and path pattern all match
//! decides. No match means [`Effect::Deny`].
//!
//! Paths in [`PUBLIC_PATHS`] never reach the table.

use pvz_core::Role;

/// Bumped whenever [`RULES`] changes meaning.
pub const POLICY_VERSION: u32 = 1;

/// Paths reachable without a token.
pub const PUBLIC_PATHS: &[&str] = &["/dummyLogin", "/login", "/register"];

/// Result of a policy lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// One uncompiled rule. `{name}` in a pattern matches any single segment.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub role: Role,
    pub pattern: &'static str,
    pub method: &'static str,
    pub effect: Effect,
}

const fn allow(role: Role, method: &'static str, pattern: &'static str) -> RuleSpec {
    RuleSpec {
        role,
        pattern,
        method,
        effect: Effect::Allow,
    }
}

const fn deny(role: Role, method: &'static str, pattern: &'static str) -> RuleSpec {
    RuleSpec {
        role,
        pattern,
        method,
        effect: Effect::Deny,
    }
}

/// The service's access rules.
pub const RULES: &[RuleSpec] = &[
    allow(Role::Moderator, "POST", "/pvz"),
    deny(Role::Employee, "POST", "/pvz"),
    allow(Role::Employee, "GET", "/pvz"),
    allow(Role::Moderator, "GET", "/pvz"),
    allow(Role::Employee, "POST", "/receptions"),
    deny(Role::Moderator, "POST", "/receptions"),
    allow(Role::Employee, "POST", "/products"),
    deny(Role::Moderator, "POST", "/products"),
    allow(Role::Employee, "POST", "/pvz/{pvzId}/delete_last_product"),
    deny(Role::Moderator, "POST", "/pvz/{pvzId}/delete_last_product"),
    allow(Role::Employee, "POST", "/pvz/{pvzId}/close_last_reception"),
    deny(Role::Moderator, "POST", "/pvz/{pvzId}/close_last_reception"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    role: Role,
    method: String,
    segments: Vec<Segment>,
    effect: Effect,
}

impl CompiledRule {
    fn compile(spec: &RuleSpec) -> Self {
        let segments = split_path(spec.pattern)
            .map(|s| {
                if s.starts_with('{') && s.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_owned())
                }
            })
            .collect();

        Self {
            role: spec.role,
            method: spec.method.to_ascii_uppercase(),
            segments,
            effect: spec.effect,
        }
    }

    fn matches(&self, role: Role, path: &str, method: &str) -> bool {
        if self.role != role || !self.method.eq_ignore_ascii_case(method) {
            return false;
        }

        let mut parts = split_path(path);
        for segment in &self.segments {
            match (segment, parts.next()) {
                (Segment::Literal(expected), Some(actual)) if expected == actual => {}
                (Segment::Param, Some(actual)) if !actual.is_empty() => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
}

/// Immutable compiled policy.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    version: u32,
    rules: Vec<CompiledRule>,
}

impl PolicyTable {
    /// Compile a rule list.
    #[must_use]
    pub fn compile(version: u32, rules: &[RuleSpec]) -> Self {
        Self {
            version,
            rules: rules.iter().map(CompiledRule::compile).collect(),
        }
    }

    /// The built-in policy.
    #[must_use]
    pub fn standard() -> Self {
        Self::compile(POLICY_VERSION, RULES)
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Whether `path` is reachable without a token.
    #[must_use]
    pub fn is_public(path: &str) -> bool {
        let trimmed = path.trim_end_matches('/');
        PUBLIC_PATHS.contains(&trimmed)
    }

    /// Decide whether `role` may call `method path`.
    #[must_use]
    pub fn decide(&self, role: Role, path: &str, method: &str) -> Effect {
        self.rules
            .iter()
            .find(|rule| rule.matches(role, path, method))
            .map_or(Effect::Deny, |rule| rule.effect)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moderator_only_creates_pvz() {
        let table = PolicyTable::standard();
        assert_eq!(table.decide(Role::Moderator, "/pvz", "POST"), Effect::Allow);
        assert_eq!(table.decide(Role::Employee, "/pvz", "POST"), Effect::Deny);
    }

    #[test]
    fn test_listing_open_to_both_roles() {
        let table = PolicyTable::standard();
        for role in Role::ALL {
            assert_eq!(table.decide(*role, "/pvz", "GET"), Effect::Allow);
        }
    }

    #[test]
    fn test_parameterised_paths() {
        let table = PolicyTable::standard();
        let path = "/pvz/0d4c0b8e-2a53-4a0e-9d0b-6e1c7e6a0f11/close_last_reception";
        assert_eq!(table.decide(Role::Employee, path, "POST"), Effect::Allow);
        assert_eq!(table.decide(Role::Moderator, path, "POST"), Effect::Deny);
        assert_eq!(
            table.decide(Role::Employee, "/pvz/x/close_last_reception/extra", "POST"),
            Effect::Deny
        );
        assert_eq!(
            table.decide(Role::Employee, "/pvz//close_last_reception", "POST"),
            Effect::Deny
        );
    }

    #[test]
    fn test_unknown_route_or_method_is_denied() {
        let table = PolicyTable::standard();
        assert_eq!(table.decide(Role::Moderator, "/users", "GET"), Effect::Deny);
        assert_eq!(table.decide(Role::Employee, "/receptions", "DELETE"), Effect::Deny);
    }

    #[test]
    fn test_first_match_wins() {
        let table = PolicyTable::compile(
            7,
            &[
                deny(Role::Employee, "GET", "/pvz"),
                allow(Role::Employee, "GET", "/pvz"),
            ],
        );
        assert_eq!(table.version(), 7);
        assert_eq!(table.decide(Role::Employee, "/pvz", "GET"), Effect::Deny);
    }

    #[test]
    fn test_public_paths() {
        assert!(PolicyTable::is_public("/login"));
        assert!(PolicyTable::is_public("/dummyLogin"));
        assert!(!PolicyTable::is_public("/pvz"));
        assert!(!PolicyTable::is_public("/login/extra"));
    }
}
