use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::QaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Gherkin,
    Selenium,
    Api,
    ManualPlanning,
    ManualTestcases,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Gherkin,
        AgentType::Selenium,
        AgentType::Api,
        AgentType::ManualPlanning,
        AgentType::ManualTestcases,
    ];

    /// Wire name understood by the generation service.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Gherkin => "gherkin",
            AgentType::Selenium => "selenium",
            AgentType::Api => "api",
            AgentType::ManualPlanning => "manual_planning",
            AgentType::ManualTestcases => "manual_testcases",
        }
    }

    /// Only the script writer produces language-specific output.
    pub fn uses_language(&self) -> bool {
        matches!(self, AgentType::Selenium)
    }

    /// Drops the language qualifier for agents that ignore it.
    pub fn effective_language(&self, language: Option<Language>) -> Option<Language> {
        if self.uses_language() { language } else { None }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentType::Gherkin => "BDD Gherkin scenarios",
            AgentType::Selenium => "Selenium browser scripts",
            AgentType::Api => "API test suites",
            AgentType::ManualPlanning => "Manual test plans",
            AgentType::ManualTestcases => "Manual test cases",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = QaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "gherkin" => Ok(AgentType::Gherkin),
            "selenium" => Ok(AgentType::Selenium),
            "api" => Ok(AgentType::Api),
            "manual_planning" => Ok(AgentType::ManualPlanning),
            "manual_testcases" => Ok(AgentType::ManualTestcases),
            other => Err(QaError::validation(format!("unknown agent type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Java,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Python, Language::Java];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = QaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            other => Err(QaError::validation(format!("unknown language: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_types_round_trip_through_wire_names() {
        for agent in AgentType::ALL {
            assert_eq!(agent.as_str().parse::<AgentType>().unwrap(), agent);
        }
    }

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!(" Manual_Planning ".parse::<AgentType>().unwrap(), AgentType::ManualPlanning);
        assert_eq!("JAVA".parse::<Language>().unwrap(), Language::Java);
    }

    #[test]
    fn unknown_agent_is_a_validation_error() {
        let err = "cypress".parse::<AgentType>().unwrap_err();
        assert!(matches!(err, QaError::Validation(_)));
    }

    #[test]
    fn language_only_kept_for_selenium() {
        assert_eq!(
            AgentType::Selenium.effective_language(Some(Language::Java)),
            Some(Language::Java)
        );
        assert_eq!(AgentType::Gherkin.effective_language(Some(Language::Java)), None);
        assert_eq!(AgentType::Api.effective_language(Some(Language::Python)), None);
    }
}
