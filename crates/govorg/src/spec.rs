use govcore::Variables;
use serde::{Deserialize, Serialize};
use std::fmt;

pub(crate) const WILDCARD: &str = "*";

fn wildcard() -> String {
    WILDCARD.to_string()
}

/// Organizational specification: who may act, in which missions, under
/// which norms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrgSpec {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub missions: Vec<Mission>,
    #[serde(default)]
    pub norms: Vec<Norm>,
}

impl OrgSpec {
    pub fn empty() -> Self {
        Self {
            roles: Vec::new(),
            missions: Vec::new(),
            norms: Vec::new(),
        }
    }

    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    pub fn mission(&self, id: &str) -> Option<&Mission> {
        self.missions.iter().find(|m| m.id == id)
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_mission(mut self, mission: Mission) -> Self {
        self.missions.push(mission);
        self
    }

    pub fn with_norm(mut self, norm: Norm) -> Self {
        self.norms.push(norm);
        self
    }
}

impl Default for OrgSpec {
    /// Built-in organization used until a host installs its own.
    fn default() -> Self {
        OrgSpec::empty()
            .with_role(Role::new("viewer", ["read:*"]))
            .with_role(
                Role::new(
                    "user",
                    [
                        "execute:action",
                        "execute:generate",
                        "execute:decision",
                        "execute:approval",
                        "execute:notification",
                    ],
                )
                .inherits(["viewer"]),
            )
            .with_role(
                Role::new(
                    "agent",
                    ["execute:tool", "execute:api", "execute:llm", "execute:subroutine"],
                )
                .inherits(["user"]),
            )
            .with_role(Role::new("admin", ["*"]))
            .with_mission(Mission {
                id: "data-analysis".into(),
                required_roles: vec!["agent".into()],
                goals: vec!["discover".into(), "analyze".into(), "report".into()],
                constraints: Variables::new(),
            })
            .with_mission(Mission {
                id: "operations".into(),
                required_roles: vec!["admin".into(), "agent".into()],
                goals: vec!["execute".into(), "monitor".into(), "optimize".into()],
                constraints: Variables::new(),
            })
            .with_norm(Norm::new("viewers-never-execute", NormType::Prohibition).for_role("viewer"))
            .with_norm(
                Norm::new("agents-use-tools", NormType::Permission)
                    .for_role("agent")
                    .on_resource("tool"),
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Roles whose permissions this role also holds
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Role {
    pub fn new<I, S>(id: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            inherits: Vec::new(),
            description: None,
        }
    }

    pub fn inherits<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inherits.extend(parents.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    #[serde(default)]
    pub required_roles: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    /// Variable values that must hold exactly while the mission is active
    #[serde(default)]
    pub constraints: Variables,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NormType {
    Permission,
    Obligation,
    Prohibition,
}

impl fmt::Display for NormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NormType::Permission => "permission",
            NormType::Obligation => "obligation",
            NormType::Prohibition => "prohibition",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Norm {
    pub id: String,
    #[serde(rename = "type")]
    pub norm_type: NormType,
    #[serde(default = "wildcard")]
    pub role: String,
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default = "wildcard")]
    pub resource: String,
    #[serde(default = "wildcard")]
    pub action: String,
    #[serde(default)]
    pub condition: Option<String>,
}

impl Norm {
    pub fn new(id: impl Into<String>, norm_type: NormType) -> Self {
        Self {
            id: id.into(),
            norm_type,
            role: wildcard(),
            mission: None,
            resource: wildcard(),
            action: wildcard(),
            condition: None,
        }
    }

    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn in_mission(mut self, mission: impl Into<String>) -> Self {
        self.mission = Some(mission.into());
        self
    }

    pub fn on_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn for_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_scoping_defaults_to_wildcards() {
        let norm: Norm = serde_json::from_str(r#"{"id": "n", "type": "prohibition"}"#).unwrap();
        assert_eq!(norm.role, "*");
        assert_eq!(norm.resource, "*");
        assert_eq!(norm.action, "*");
        assert!(norm.mission.is_none());
    }

    #[test]
    fn default_spec_is_self_consistent() {
        let spec = OrgSpec::default();
        for role in &spec.roles {
            for parent in &role.inherits {
                assert!(spec.role(parent).is_some(), "{} inherits unknown {}", role.id, parent);
            }
        }
        for mission in &spec.missions {
            for role in &mission.required_roles {
                assert!(spec.role(role).is_some());
            }
        }
    }
}
