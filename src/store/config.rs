use serde::{Deserialize, Serialize};

/// What to do when a slice is registered under a name already in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with [`StoreError::DuplicateSlice`](crate::StoreError::DuplicateSlice).
    #[default]
    Reject,
    /// Drop the registered slice (state and effects) and install the new one.
    Replace,
    /// Keep the registered slice and discard the new one.
    Ignore,
}

/// Store configuration.
///
/// Every field has a default, so partial configs deserialize:
///
/// ```
/// use hai3_state::{DuplicatePolicy, StoreConfig};
///
/// let config: StoreConfig = serde_json::from_str(r#"{ "on_duplicate": "replace" }"#).unwrap();
/// assert_eq!(config.on_duplicate, DuplicatePolicy::Replace);
/// assert_eq!(config.label, "hai3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name attached to the store's log events.
    pub label: String,
    pub on_duplicate: DuplicatePolicy,
    /// Notify store listeners even when no slice handled a dispatch.
    pub notify_unhandled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            label: "hai3".to_string(),
            on_duplicate: DuplicatePolicy::default(),
            notify_unhandled: false,
        }
    }
}

impl StoreConfig {
    /// Set the label attached to log events.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the duplicate-name policy.
    pub fn on_duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = policy;
        self
    }

    /// Notify listeners after unhandled dispatches too.
    pub fn notify_unhandled(mut self, notify: bool) -> Self {
        self.notify_unhandled = notify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.on_duplicate, DuplicatePolicy::Reject);
    }

    #[test]
    fn builder_setters() {
        let config = StoreConfig::default()
            .with_label("app")
            .on_duplicate(DuplicatePolicy::Ignore)
            .notify_unhandled(true);
        assert_eq!(config.label, "app");
        assert_eq!(config.on_duplicate, DuplicatePolicy::Ignore);
        assert!(config.notify_unhandled);
    }
}
