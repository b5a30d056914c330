//! Arena configuration

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, VellumError},
    session::SessionKind,
};

/// Configuration for arenas and the sessions behind them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Lifecycle of the arena's session
    pub kind: SessionKind,
    /// Diagnostic name reported by the session
    pub name: Option<String>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            kind: SessionKind::Confined,
            name: None,
        }
    }
}

impl ArenaConfig {
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Set the session kind
    pub fn with_kind(mut self, kind: SessionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the diagnostic name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match &self.name {
            Some(name) if name.is_empty() => Err(VellumError::invalid_argument(
                "name",
                "Arena name cannot be empty",
            )),
            Some(_) if self.kind == SessionKind::Global => Err(VellumError::invalid_argument(
                "name",
                "The global session cannot be renamed",
            )),
            _ => Ok(()),
        }
    }
}

/// Builder pattern for arena configuration
pub struct ArenaConfigBuilder {
    config: ArenaConfig,
}

impl ArenaConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ArenaConfig::default(),
        }
    }

    pub fn confined(mut self) -> Self {
        self.config.kind = SessionKind::Confined;
        self
    }

    pub fn shared(mut self) -> Self {
        self.config.kind = SessionKind::Shared;
        self
    }

    /// Released when the arena and all its segments are dropped
    pub fn auto(mut self) -> Self {
        self.config.kind = SessionKind::Implicit;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ArenaConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ArenaConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ArenaConfigBuilder::new().shared().name("frames").build().unwrap();
        assert_eq!(config.kind, SessionKind::Shared);
        assert_eq!(config.name.as_deref(), Some("frames"));
    }

    #[test]
    fn test_validation() {
        assert!(ArenaConfigBuilder::new().name("").build().is_err());
        assert!(ArenaConfig::new(SessionKind::Global)
            .with_name("g")
            .validate()
            .is_err());
        assert!(ArenaConfig::new(SessionKind::Global).validate().is_ok());
    }
}
