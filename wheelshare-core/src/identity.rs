use serde::{Deserialize, Serialize};
use wheelshare_shared::Masked;

use crate::{CoreError, CoreResult};

/// Which app the caller signed in through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Renter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Renter => "RENTER",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value {
            "OWNER" => Ok(Role::Owner),
            "RENTER" => Ok(Role::Renter),
            other => Err(CoreError::IdentityError(format!("unknown role: {}", other))),
        }
    }
}

/// A caller already authenticated by the identity provider.
///
/// The subject is opaque; nothing here interprets it beyond equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub email: Masked<String>,
    pub display_name: Option<String>,
    pub role: Role,
}

impl Principal {
    pub fn new(subject: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            email: Masked(email.into()),
            display_name: None,
            role,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn require_role(&self, role: Role) -> CoreResult<()> {
        if self.role != role {
            return Err(CoreError::IdentityError(format!(
                "{} role required",
                role.as_str()
            )));
        }
        Ok(())
    }

    /// Contact details frozen onto a booking at creation time.
    pub fn contact(&self) -> ContactSnapshot {
        let display_name = self
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.email.expose().clone());

        ContactSnapshot {
            email: self.email.clone(),
            display_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactSnapshot {
    pub email: Masked<String>,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_falls_back_to_email() {
        let renter = Principal::new("uid-1", "sam@renter.com", Role::Renter);
        assert_eq!(renter.contact().display_name, "sam@renter.com");

        let named = renter.clone().with_display_name("Sam Park");
        assert_eq!(named.contact().display_name, "Sam Park");

        let blank = renter.with_display_name("   ");
        assert_eq!(blank.contact().display_name, "sam@renter.com");
    }

    #[test]
    fn test_role_checks() {
        let owner = Principal::new("uid-2", "jo@owner.com", Role::Owner);
        assert!(owner.require_role(Role::Owner).is_ok());
        assert!(owner.require_role(Role::Renter).is_err());
        assert_eq!(Role::parse("RENTER").unwrap(), Role::Renter);
        assert!(Role::parse("ADMIN").is_err());
    }

    #[test]
    fn test_role_wire_form() {
        assert_eq!(serde_json::to_string(&Role::Owner).unwrap(), "\"OWNER\"");
        let role: Role = serde_json::from_str("\"RENTER\"").unwrap();
        assert_eq!(role, Role::Renter);
    }
}
