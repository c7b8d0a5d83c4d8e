//! The instance-id provider contract: a stable identifier for this
//! process, attributed in progress rows and leader-election logs.
use uuid::Uuid;

/// Supplies this process's unique identifier.
pub trait InstanceIdProvider: Send + Sync {
    fn instance_id(&self) -> &str;
}

/// Generates a random `v4` UUID once, at construction, and returns the same
/// value for the life of the process.
#[derive(Debug, Clone)]
pub struct UuidInstanceIdProvider(String);

impl UuidInstanceIdProvider {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for UuidInstanceIdProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceIdProvider for UuidInstanceIdProvider {
    fn instance_id(&self) -> &str {
        &self.0
    }
}

/// A caller-supplied, fixed identifier - useful in tests, or when the host
/// environment already assigns stable pod/process names.
#[derive(Debug, Clone)]
pub struct FixedInstanceIdProvider(String);

impl FixedInstanceIdProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl InstanceIdProvider for FixedInstanceIdProvider {
    fn instance_id(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_provider_returns_a_stable_id_across_calls() {
        let provider = UuidInstanceIdProvider::new();
        assert_eq!(provider.instance_id(), provider.instance_id());
    }

    #[test]
    fn fixed_provider_returns_the_given_id() {
        let provider = FixedInstanceIdProvider::new("worker-1");
        assert_eq!(provider.instance_id(), "worker-1");
    }
}
