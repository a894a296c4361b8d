//! Values published to state listeners

use std::fmt;

/// Observed device state
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    /// On/off state from the `state_on`/`state_off` patterns
    Binary(bool),

    /// Decoded numeric field
    Numeric { field: String, value: f64 },

    /// Named state such as a climate mode or fan speed
    Mode(String),
}

impl StateValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Binary(on) => Some(*on),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_mode(&self) -> Option<&str> {
        match self {
            Self::Mode(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary(true) => f.write_str("ON"),
            Self::Binary(false) => f.write_str("OFF"),
            Self::Numeric { field, value } => write!(f, "{}={}", field, value),
            Self::Mode(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert_eq!(StateValue::Binary(true).as_bool(), Some(true));
        assert_eq!(StateValue::Binary(true).as_f64(), None);

        let temp = StateValue::Numeric {
            field: "current_temperature".into(),
            value: 21.5,
        };
        assert_eq!(temp.as_f64(), Some(21.5));
        assert_eq!(temp.to_string(), "current_temperature=21.5");

        let mode = StateValue::Mode("heat".into());
        assert_eq!(mode.as_mode(), Some("heat"));
        assert_eq!(mode.as_bool(), None);
        assert_eq!(mode.to_string(), "heat");
    }
}
