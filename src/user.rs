//! Users: a stable id, an opaque API key, an active flag and a role.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub role: Role,
    pub active: bool,
}

impl User {
    pub fn new_user(id: Uuid, name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            api_key: api_key.into(),
            role: Role::User,
            active: true,
        }
    }
}
