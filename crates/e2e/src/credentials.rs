//! Test users seeded into the backing service

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::policy::Role;

/// Password shared by every seeded test user
pub const DEFAULT_USER_PASSWORD: &str = "PlaywrightTest123";

const FIRST_NAMES: &[&str] = &[
    "Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald", "Frances", "Ken", "Margaret", "Niklaus",
    "Radia", "Tim",
];

const LAST_NAMES: &[&str] = &[
    "Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Knuth", "Allen", "Thompson",
    "Hamilton", "Wirth", "Perlman", "Berners-Lee",
];

/// Login credentials and profile of one seeded user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl Credential {
    /// Credential with the default password and a random display name
    pub fn generated(email: &str) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            email: email.to_string(),
            password: DEFAULT_USER_PASSWORD.to_string(),
            first_name: FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Test").to_string(),
            last_name: LAST_NAMES.choose(&mut rng).copied().unwrap_or("User").to_string(),
        }
    }
}

/// Role to credential mapping, built once per process and shared by
/// reference with every fixture that needs it.
///
/// Serializes to the `{owner, admin, members}` body of the reset endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRegistry {
    pub owner: Credential,
    pub admin: Credential,
    pub members: Vec<Credential>,
}

impl Default for CredentialRegistry {
    fn default() -> Self {
        Self {
            owner: Credential::generated("nathan@n8n.io"),
            admin: Credential::generated("admin@n8n.io"),
            members: vec![Credential::generated("member@n8n.io")],
        }
    }
}

impl CredentialRegistry {
    pub fn new(owner: Credential, admin: Credential, members: Vec<Credential>) -> Self {
        Self {
            owner,
            admin,
            members,
        }
    }

    /// Member credential by index
    pub fn member(&self, index: usize) -> E2eResult<&Credential> {
        self.members.get(index).ok_or(E2eError::IndexOutOfRange {
            index,
            len: self.members.len(),
        })
    }

    /// Credential for a role
    pub fn for_role(&self, role: Role) -> E2eResult<&Credential> {
        match role {
            Role::Owner => Ok(&self.owner),
            Role::Admin => Ok(&self.admin),
            Role::Member(index) => self.member(index),
        }
    }
}
