use serde::{Deserialize, Serialize};

use crate::model::UserId;

/// The signed-in driver. Shells pass it in with `Event::SessionChanged`
/// whenever the authentication provider reports a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl DriverIdentity {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            first_name: None,
            last_name: None,
            email: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into()).filter(|s: &String| !s.is_empty());
        self.last_name = Some(last.into()).filter(|s: &String| !s.is_empty());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// "First Last", whichever parts are known, else the email, else "Driver".
    #[must_use]
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();

        if !parts.is_empty() {
            return parts.join(" ");
        }
        self.email.clone().unwrap_or_else(|| "Driver".to_string())
    }
}
