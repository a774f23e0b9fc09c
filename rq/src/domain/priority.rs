//! Priority levels for queued requests

use serde::{Deserialize, Serialize};

/// Integer priority of a queued request; higher values are dispatched first.
///
/// Any `i32` is accepted. The named levels are conventions used by the CLI
/// and configuration, not a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const LOW: Self = Self(0);
    pub const NORMAL: Self = Self(5);
    pub const HIGH: Self = Self(10);
    pub const CRITICAL: Self = Self(20);

    pub fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::LOW => write!(f, "low"),
            Self::NORMAL => write!(f, "normal"),
            Self::HIGH => write!(f, "high"),
            Self::CRITICAL => write!(f, "critical"),
            Self(n) => write!(f, "{}", n),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::LOW),
            "normal" => Ok(Self::NORMAL),
            "high" => Ok(Self::HIGH),
            "critical" => Ok(Self::CRITICAL),
            other => other
                .parse::<i32>()
                .map(Self)
                .map_err(|_| format!("Unknown priority: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::LOW < Priority::NORMAL);
        assert!(Priority::NORMAL < Priority::HIGH);
        assert!(Priority::HIGH < Priority::CRITICAL);
        assert!(Priority(-3) < Priority::LOW);
    }

    #[test]
    fn test_priority_display() {
        assert_eq!(Priority::LOW.to_string(), "low");
        assert_eq!(Priority::CRITICAL.to_string(), "critical");
        assert_eq!(Priority(7).to_string(), "7");
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::HIGH);
        assert_eq!("42".parse::<Priority>().unwrap(), Priority(42));
        assert_eq!("-1".parse::<Priority>().unwrap(), Priority(-1));
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_serde() {
        let json = serde_json::to_string(&Priority::HIGH).unwrap();
        assert_eq!(json, "10");

        let priority: Priority = serde_json::from_str("3").unwrap();
        assert_eq!(priority, Priority(3));
    }
}
