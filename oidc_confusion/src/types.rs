use serde::{Deserialize, Serialize};
use std::fmt;

/// Path prefix of the fragment that forces a target into fresh discovery
/// and registration. Eight alphanumeric characters follow it.
pub const ENFORCE_REGISTRATION_PREFIX: &str = "enforce-rp-reg-";

/// Identifier of one test object, also the first path segment of every
/// actor URL belonging to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Honest,
    Evil,
}

impl Role {
    /// Pick the value belonging to this role.
    pub fn pick<T>(self, honest: T, evil: T) -> T {
        match self {
            Role::Honest => honest,
            Role::Evil => evil,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Honest => f.write_str("Honest"),
            Role::Evil => f.write_str("Evil"),
        }
    }
}

/// Registry key distinguishing the honest and evil counterparts of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleSlot {
    #[serde(rename = "OP1")]
    Op1,
    #[serde(rename = "OP2")]
    Op2,
    #[serde(rename = "RP1")]
    Rp1,
    #[serde(rename = "RP2")]
    Rp2,
}

impl RoleSlot {
    pub fn role(self) -> Role {
        match self {
            RoleSlot::Op1 | RoleSlot::Rp1 => Role::Honest,
            RoleSlot::Op2 | RoleSlot::Rp2 => Role::Evil,
        }
    }

    pub fn is_op(self) -> bool {
        matches!(self, RoleSlot::Op1 | RoleSlot::Op2)
    }
}

impl fmt::Display for RoleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleSlot::Op1 => "OP1",
            RoleSlot::Op2 => "OP2",
            RoleSlot::Rp1 => "RP1",
            RoleSlot::Rp2 => "RP2",
        };
        f.write_str(name)
    }
}

/// User-editable settings for testing a relying party. The harness plays
/// the two OPs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpTestConfig {
    pub honest_webfinger_resource_id: String,
    pub evil_webfinger_resource_id: String,
    /// Login page of the RP under test.
    pub url_client_target: String,
    /// Name of the input field the OP identity is typed into.
    pub input_field_name: String,
    /// Script submitting the login form. `${name}` placeholders are
    /// substituted from the step context.
    pub login_script: String,
    pub final_valid_url: String,
    pub honest_user_needle: String,
    pub evil_user_needle: String,
    pub profile_url: String,
}

/// User-editable settings for testing an OpenID provider. The harness plays
/// the two RPs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpTestConfig {
    pub url_op_target: String,
    /// Provider metadata as JSON, used instead of discovery when set.
    pub op_metadata: Option<String>,
    pub user1_name: String,
    pub user1_pass: String,
    pub user2_name: String,
    pub user2_pass: String,
    pub login_script: String,
    pub consent_script: String,
    /// Static client registration (JSON) for the honest RP.
    pub client1_config: Option<String>,
    /// Static client registration (JSON) for the evil RP.
    pub client2_config: Option<String>,
}

impl OpTestConfig {
    /// Both users and a way to reach the OP must be configured.
    pub fn is_minimal_valid(&self) -> bool {
        let set = |s: &str| !s.trim().is_empty();
        set(&self.user1_name)
            && set(&self.user1_pass)
            && set(&self.user2_name)
            && set(&self.user2_pass)
            && (set(&self.url_op_target) || self.op_metadata.as_deref().is_some_and(set))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestConfig {
    Rp(RpTestConfig),
    Op(OpTestConfig),
}

impl TestConfig {
    /// URL of the system under test, the base of the grant check.
    pub fn target_url(&self) -> &str {
        match self {
            TestConfig::Rp(cfg) => &cfg.url_client_target,
            TestConfig::Op(cfg) => &cfg.url_op_target,
        }
    }

    pub fn as_rp(&self) -> Option<&RpTestConfig> {
        match self {
            TestConfig::Rp(cfg) => Some(cfg),
            TestConfig::Op(_) => None,
        }
    }

    pub fn as_op(&self) -> Option<&OpTestConfig> {
        match self {
            TestConfig::Op(cfg) => Some(cfg),
            TestConfig::Rp(_) => None,
        }
    }
}
