use std::fmt;

use serde::{Deserialize, Serialize};

/// The three prediction domains an upload can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Maternal,
    Cardiovascular,
    Diabetes,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Maternal, Domain::Cardiovascular, Domain::Diabetes];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Maternal => "maternal",
            Self::Cardiovascular => "cardiovascular",
            Self::Diabetes => "diabetes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "maternal" => Some(Self::Maternal),
            "cardiovascular" | "cardio" => Some(Self::Cardiovascular),
            "diabetes" | "glucose" => Some(Self::Diabetes),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
