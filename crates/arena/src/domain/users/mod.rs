mod store;

pub use store::*;

use arena_core::Role;

/// Verified identity of the caller, as produced by the external token issuer
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
}

impl Identity {
    /// Display name stored with the user row; falls back to the email local part
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}
