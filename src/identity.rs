use std::collections::HashSet;

/// Institutional domains accepted when nothing else is configured.
pub const DEFAULT_ALLOWED_DOMAINS: [&str; 3] = [
    "pilani.bits-pilani.ac.in",
    "goa.bits-pilani.ac.in",
    "hyderabad.bits-pilani.ac.in",
];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("No email received from the identity provider.")]
    MissingEmail,
    #[error("Only institutional accounts are allowed.")]
    DomainNotAllowed,
}

/// Login gate: a provider account may only sign in with an email from one of
/// a fixed set of domains. Stateless; compared case-insensitively.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    domains: HashSet<String>,
}

impl IdentityGate {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    /// Returns the normalised email when the account may log in.
    pub fn admit(&self, email: Option<&str>) -> Result<String, IdentityError> {
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(IdentityError::MissingEmail)?;
        let domain = email.rsplit('@').next().unwrap_or_default().to_ascii_lowercase();
        if !email.contains('@') || !self.domains.contains(&domain) {
            return Err(IdentityError::DomainNotAllowed);
        }
        Ok(email.to_ascii_lowercase())
    }
}

impl Default for IdentityGate {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_DOMAINS)
    }
}
