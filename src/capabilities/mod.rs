use std::collections::HashMap;

use serde::Serialize;

use crate::agent::{AgentType, Language};

pub const JAVA_SELENIUM_UNAVAILABLE: &str = "Java Selenium Script Generator is currently under development. Please use Python for Selenium scripts for now.";
pub const API_UNAVAILABLE: &str =
    "API Test Generator is currently under development. Please check back later.";
pub const AGENT_UNAVAILABLE: &str = "This agent is still under construction. Currently, only the Gherkin Generator and Python Selenium Script Generator are available.";

/// One row of the capability matrix. `language == None` is the
/// language-independent capability of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailabilityEntry {
    pub agent: AgentType,
    pub language: Option<Language>,
    pub enabled: bool,
}

impl AvailabilityEntry {
    pub fn new(agent: AgentType, language: Option<Language>, enabled: bool) -> Self {
        Self {
            agent,
            language: agent.effective_language(language),
            enabled,
        }
    }
}

/// Which agent/language pairs the generation backend implements.
///
/// Built once at start-up and shared read-only between workflows.
#[derive(Debug, Clone)]
pub struct CapabilityMatrix {
    entries: HashMap<(AgentType, Option<Language>), bool>,
}

impl CapabilityMatrix {
    pub fn new(overrides: &[AvailabilityEntry]) -> Self {
        let mut matrix = Self::default();
        for entry in overrides {
            matrix
                .entries
                .insert((entry.agent, entry.language), entry.enabled);
        }
        matrix
    }

    pub fn is_available(&self, agent: AgentType, language: Option<Language>) -> bool {
        let key = (agent, agent.effective_language(language));
        self.entries.get(&key).copied().unwrap_or(false)
    }

    /// Explanatory text shown in place of a result when the pair is not
    /// implemented. Java Selenium wins over API, which wins over the generic text.
    pub fn unavailable_message(agent: AgentType, language: Option<Language>) -> &'static str {
        match (agent, language) {
            (AgentType::Selenium, Some(Language::Java)) => JAVA_SELENIUM_UNAVAILABLE,
            (AgentType::Api, _) => API_UNAVAILABLE,
            _ => AGENT_UNAVAILABLE,
        }
    }

    /// Every known pair in a stable order, for listings.
    pub fn overview(&self) -> Vec<AvailabilityEntry> {
        let mut rows = Vec::new();
        for agent in AgentType::ALL {
            rows.push(AvailabilityEntry::new(
                agent,
                None,
                self.is_available(agent, None),
            ));
            if agent.uses_language() {
                for language in Language::ALL {
                    rows.push(AvailabilityEntry::new(
                        agent,
                        Some(language),
                        self.is_available(agent, Some(language)),
                    ));
                }
            }
        }
        rows
    }

    pub fn help_message(&self) -> String {
        let mut lines = vec!["Generation agents:".to_string()];

        for entry in self.overview() {
            let status = if entry.enabled {
                "available"
            } else {
                "under construction"
            };
            let name = match entry.language {
                Some(language) => format!("{} ({})", entry.agent, language),
                None => entry.agent.to_string(),
            };
            lines.push(format!(
                "- {:<22} {:<26} {}",
                name,
                entry.agent.description(),
                status
            ));
        }

        lines.join("\n")
    }
}

impl Default for CapabilityMatrix {
    fn default() -> Self {
        let mut entries = HashMap::new();
        for agent in AgentType::ALL {
            entries.insert((agent, None), agent == AgentType::Gherkin);
        }
        entries.insert((AgentType::Selenium, Some(Language::Python)), true);
        entries.insert((AgentType::Selenium, Some(Language::Java)), false);
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matrix_only_enables_gherkin_and_python_selenium() {
        let matrix = CapabilityMatrix::default();
        let mut enabled = Vec::new();
        for agent in AgentType::ALL {
            for language in [None, Some(Language::Python), Some(Language::Java)] {
                if matrix.is_available(agent, language) {
                    enabled.push((agent, language));
                }
            }
        }

        assert!(enabled.iter().all(|(agent, language)| {
            *agent == AgentType::Gherkin
                || (*agent == AgentType::Selenium && *language == Some(Language::Python))
        }));
        assert!(matrix.is_available(AgentType::Gherkin, None));
        assert!(matrix.is_available(AgentType::Selenium, Some(Language::Python)));
        assert!(!matrix.is_available(AgentType::Selenium, Some(Language::Java)));
        assert!(!matrix.is_available(AgentType::Selenium, None));
        assert!(!matrix.is_available(AgentType::Api, None));
    }

    #[test]
    fn language_is_ignored_outside_selenium() {
        let matrix = CapabilityMatrix::default();
        assert!(matrix.is_available(AgentType::Gherkin, Some(Language::Java)));
        assert!(!matrix.is_available(AgentType::Api, Some(Language::Python)));
    }

    #[test]
    fn every_agent_has_a_language_independent_row() {
        let overview = CapabilityMatrix::default().overview();
        for agent in AgentType::ALL {
            assert!(overview
                .iter()
                .any(|entry| entry.agent == agent && entry.language.is_none()));
        }
    }

    #[test]
    fn overrides_replace_defaults() {
        let matrix = CapabilityMatrix::new(&[
            AvailabilityEntry::new(AgentType::Api, None, true),
            AvailabilityEntry::new(AgentType::Gherkin, None, false),
        ]);
        assert!(matrix.is_available(AgentType::Api, None));
        assert!(!matrix.is_available(AgentType::Gherkin, None));
    }

    #[test]
    fn unavailable_message_priority() {
        assert_eq!(
            CapabilityMatrix::unavailable_message(AgentType::Selenium, Some(Language::Java)),
            JAVA_SELENIUM_UNAVAILABLE
        );
        assert_eq!(
            CapabilityMatrix::unavailable_message(AgentType::Api, None),
            API_UNAVAILABLE
        );
        assert_eq!(
            CapabilityMatrix::unavailable_message(AgentType::ManualPlanning, None),
            AGENT_UNAVAILABLE
        );
        assert_eq!(
            CapabilityMatrix::unavailable_message(AgentType::Selenium, None),
            AGENT_UNAVAILABLE
        );
    }
}
