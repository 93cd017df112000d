//! Parameter value object module
//!
//! This module defines the typed parameter model shared by workloads and
//! optimization algorithms. A workload publishes parameter stubs describing
//! the values it accepts; a scheduled job carries the concrete values; an
//! algorithm does the same for its knobs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mask shown instead of password values in logs and notifications
const PASSWORD_MASK: &str = "********";

/// Typed value of a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    /// Free-form text
    Text(String),
    /// Signed integer
    Integer(i64),
    /// Floating-point number
    Float(f64),
    /// Boolean flag
    Boolean(bool),
    /// Sensitive text, masked in display output
    Password(String),
    /// One value selected from a fixed set
    Choice {
        selected: String,
        options: Vec<String>,
    },
}

impl ParameterValue {
    /// Renders the value for display, masking passwords
    pub fn display_value(&self) -> String {
        match self {
            ParameterValue::Text(text) => text.clone(),
            ParameterValue::Integer(value) => value.to_string(),
            ParameterValue::Float(value) => value.to_string(),
            ParameterValue::Boolean(value) => value.to_string(),
            ParameterValue::Password(_) => PASSWORD_MASK.to_string(),
            ParameterValue::Choice { selected, .. } => selected.clone(),
        }
    }
}

/// A named, typed parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Machine name used for lookup
    pub name: String,
    /// Human-readable name used in forms and notifications
    pub display_name: String,
    /// Current value
    pub value: ParameterValue,
    /// Whether a value must be supplied before scheduling
    pub required: bool,
}

impl Parameter {
    /// Creates a parameter with the given name, display name, and value
    pub fn new<S: Into<String>>(name: S, display_name: S, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            value,
            required: false,
        }
    }

    /// Marks the parameter as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Ordered list of parameters with name-keyed lookup
///
/// Preserves declaration order so forms and notification bodies render
/// parameters the way the workload declared them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterList {
    parameters: Vec<Parameter>,
}

impl ParameterList {
    /// Creates an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list from parameters in declaration order
    pub fn from_parameters(parameters: Vec<Parameter>) -> Self {
        Self { parameters }
    }

    /// Appends a parameter, replacing any existing parameter with the same name
    pub fn set(&mut self, parameter: Parameter) {
        if let Some(existing) = self
            .parameters
            .iter_mut()
            .find(|p| p.name == parameter.name)
        {
            *existing = parameter;
        } else {
            self.parameters.push(parameter);
        }
    }

    /// Looks up a parameter by machine name
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Returns a text or password value by name
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name).map(|p| &p.value) {
            Some(ParameterValue::Text(text)) => Some(text.as_str()),
            Some(ParameterValue::Password(text)) => Some(text.as_str()),
            Some(ParameterValue::Choice { selected, .. }) => Some(selected.as_str()),
            _ => None,
        }
    }

    /// Returns an integer value by name
    pub fn get_integer(&self, name: &str) -> Option<i64> {
        match self.get(name).map(|p| &p.value) {
            Some(ParameterValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns a float value by name, widening integers
    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.get(name).map(|p| &p.value) {
            Some(ParameterValue::Float(value)) => Some(*value),
            Some(ParameterValue::Integer(value)) => Some(*value as f64),
            _ => None,
        }
    }

    /// Returns a boolean value by name
    pub fn get_boolean(&self, name: &str) -> Option<bool> {
        match self.get(name).map(|p| &p.value) {
            Some(ParameterValue::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    /// Returns the parameters in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Returns true if the list holds no parameters
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Returns the number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns (display name, display value) pairs with passwords masked
    pub fn display_values(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .map(|p| (p.display_name.clone(), p.value.display_value()))
            .collect()
    }

    /// Verifies that every required parameter has a non-empty value
    pub fn validate_required(&self) -> Result<(), String> {
        for parameter in &self.parameters {
            if !parameter.required {
                continue;
            }
            let missing = match &parameter.value {
                ParameterValue::Text(text) | ParameterValue::Password(text) => text.is_empty(),
                ParameterValue::Choice { selected, .. } => selected.is_empty(),
                _ => false,
            };
            if missing {
                return Err(format!(
                    "required parameter '{}' has no value",
                    parameter.display_name
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ParameterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .display_values()
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "{}", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_by_name() {
        let mut list = ParameterList::new();
        list.set(Parameter::new("threads", "Threads", ParameterValue::Integer(1)));
        list.set(Parameter::new("threads", "Threads", ParameterValue::Integer(8)));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get_integer("threads"), Some(8));
    }

    #[test]
    fn test_passwords_are_masked_in_display() {
        let mut list = ParameterList::new();
        list.set(Parameter::new(
            "bind_password",
            "Bind Password",
            ParameterValue::Password("secret".to_string()),
        ));
        let values = list.display_values();
        assert_eq!(values[0].1, PASSWORD_MASK);
        // The raw value is still reachable for the worker
        assert_eq!(list.get_string("bind_password"), Some("secret"));
    }

    #[test]
    fn test_validate_required() {
        let mut list = ParameterList::new();
        list.set(
            Parameter::new("log_file", "Log File", ParameterValue::Text(String::new())).required(),
        );
        assert!(list.validate_required().is_err());

        list.set(
            Parameter::new(
                "log_file",
                "Log File",
                ParameterValue::Text("access.log".to_string()),
            )
            .required(),
        );
        assert!(list.validate_required().is_ok());
    }

    #[test]
    fn test_round_trip() {
        let mut list = ParameterList::new();
        list.set(Parameter::new("ratio", "Ratio", ParameterValue::Float(0.25)));
        list.set(Parameter::new("verbose", "Verbose", ParameterValue::Boolean(true)));
        let encoded = serde_json::to_string(&list).unwrap();
        let decoded: ParameterList = serde_json::from_str(&encoded).unwrap();
        assert_eq!(list, decoded);
    }
}
