use serde::Serialize;

use crate::agent::{AgentType, Language};

/// A dashboard tab hosting one generation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Panel {
    pub id: String,
    pub label: String,
    pub title: String,
    pub agent: AgentType,
    pub language: Option<Language>,
}

impl Panel {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        title: impl Into<String>,
        agent: AgentType,
        language: Option<Language>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            title: title.into(),
            agent,
            language: agent.effective_language(language),
        }
    }
}

pub fn default_panels() -> Vec<Panel> {
    vec![
        Panel::new(
            "gherkin",
            "Gherkin Scenarios",
            "Gherkin Scenario Generator",
            AgentType::Gherkin,
            None,
        ),
        Panel::new(
            "selenium-python",
            "Selenium Scripts (Python)",
            "Selenium Script Generator (Python)",
            AgentType::Selenium,
            Some(Language::Python),
        ),
        Panel::new(
            "selenium-java",
            "Selenium Scripts (Java)",
            "Selenium Script Generator (Java)",
            AgentType::Selenium,
            Some(Language::Java),
        ),
        Panel::new(
            "api-tests",
            "API Tests",
            "API Test Generator",
            AgentType::Api,
            None,
        ),
        Panel::new(
            "test-planning",
            "Test Planning",
            "Test Planning Generator",
            AgentType::ManualPlanning,
            None,
        ),
        Panel::new(
            "test-cases",
            "Manual Test Cases",
            "Test Case Generator",
            AgentType::ManualTestcases,
            None,
        ),
    ]
}
