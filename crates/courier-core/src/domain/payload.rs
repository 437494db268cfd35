//! Payload reference carried by a job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to the message a job should produce: a template name plus
/// the variables to render it with.
///
/// The queue core never inspects the contents; rendering and transport
/// belong to the sender. Variables are a structured map rather than a
/// free-form blob so producers cannot smuggle in non-serializable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadRef {
    template: String,
    variables: BTreeMap<String, serde_json::Value>,
}

impl PayloadRef {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variables(
        template: impl Into<String>,
        variables: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            template: template.into(),
            variables,
        }
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn variables(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_variables() {
        let payload = PayloadRef::new("welcome")
            .var("username", "ada")
            .var("attempts", 3);

        assert_eq!(payload.template(), "welcome");
        assert_eq!(
            payload.variables().get("username"),
            Some(&serde_json::json!("ada"))
        );
        assert_eq!(
            payload.variables().get("attempts"),
            Some(&serde_json::json!(3))
        );
    }
}
