use bytes::Bytes;
use tracing::debug;

use crate::{
    agent::{AgentType, Language},
    errors::Result,
    service::GenerationService,
    workflow::GenerationResult,
};

pub const TEXT_MEDIA_TYPE: &str = "text/plain";

/// A file ready to hand to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub data: Bytes,
    pub media_type: String,
}

pub fn extension_for(agent: AgentType, language: Option<Language>) -> &'static str {
    match (agent, language) {
        (AgentType::Gherkin, _) => ".feature",
        (AgentType::Selenium, Some(Language::Python)) => ".py",
        (AgentType::Selenium, Some(Language::Java)) => ".java",
        (AgentType::Api, _) => ".js",
        _ => ".txt",
    }
}

/// Lower-cases `title` and collapses every whitespace run into one hyphen.
pub fn slugify_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_whitespace = false;

    for ch in title.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
        } else {
            slug.extend(ch.to_lowercase());
            in_whitespace = false;
        }
    }

    slug
}

pub fn result_filename(title: &str, agent: AgentType, language: Option<Language>) -> String {
    format!(
        "{}-result{}",
        slugify_title(title),
        extension_for(agent, language)
    )
}

/// Turns a generation result into a downloadable artifact.
///
/// A server-issued filename is always fetched from the service; there is no
/// fallback to the local text when that fetch fails.
pub async fn materialize(
    service: &dyn GenerationService,
    result: &GenerationResult,
    title: &str,
) -> Result<Artifact> {
    match &result.filename {
        Some(filename) => {
            debug!(target: "workflow", %filename, "materializing from server file");
            let file = service.download_feature_file(filename).await?;
            Ok(Artifact {
                filename: filename.clone(),
                data: file.data,
                media_type: file.media_type,
            })
        }
        None => {
            let filename = result_filename(title, result.agent, result.language);
            debug!(target: "workflow", %filename, "materializing from result text");
            Ok(Artifact {
                filename,
                data: Bytes::from(result.content.clone()),
                media_type: TEXT_MEDIA_TYPE.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::QaError,
        workflow::{ResultOrigin, testing::FakeService},
    };

    fn result(agent: AgentType, language: Option<Language>, filename: Option<&str>) -> GenerationResult {
        GenerationResult {
            content: "Feature: Login".to_string(),
            filename: filename.map(str::to_string),
            message: None,
            agent,
            language,
            origin: ResultOrigin::Service,
            generated_at: crate::util::now_local(),
        }
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(extension_for(AgentType::Gherkin, None), ".feature");
        assert_eq!(extension_for(AgentType::Selenium, Some(Language::Python)), ".py");
        assert_eq!(extension_for(AgentType::Selenium, Some(Language::Java)), ".java");
        assert_eq!(extension_for(AgentType::Selenium, None), ".txt");
        assert_eq!(extension_for(AgentType::Api, None), ".js");
        assert_eq!(extension_for(AgentType::ManualPlanning, None), ".txt");
        assert_eq!(extension_for(AgentType::ManualTestcases, None), ".txt");
    }

    #[test]
    fn slug_collapses_whitespace_runs() {
        assert_eq!(slugify_title("Gherkin Scenario Generator"), "gherkin-scenario-generator");
        assert_eq!(slugify_title("Test  Case\tGenerator"), "test-case-generator");
        assert_eq!(
            slugify_title("Selenium Script Generator (Java)"),
            "selenium-script-generator-(java)"
        );
    }

    #[test]
    fn gherkin_title_filename() {
        assert_eq!(
            result_filename("Gherkin Scenario Generator", AgentType::Gherkin, None),
            "gherkin-scenario-generator-result.feature"
        );
    }

    #[tokio::test]
    async fn local_text_branch_never_calls_the_service() {
        let service = FakeService::default();
        let result = result(AgentType::Selenium, Some(Language::Java), None);

        let artifact = materialize(&service, &result, "Selenium Script Generator (Java)")
            .await
            .unwrap();

        assert_eq!(artifact.filename, "selenium-script-generator-(java)-result.java");
        assert_eq!(&artifact.data[..], b"Feature: Login");
        assert_eq!(artifact.media_type, TEXT_MEDIA_TYPE);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn server_filename_branch_returns_fetched_bytes() {
        let service = FakeService::default();
        service.set_download(Ok(b"Feature: Server copy\n".to_vec()));
        let result = result(AgentType::Api, None, Some("login_1748079432.feature"));

        let artifact = materialize(&service, &result, "API Test Generator").await.unwrap();

        assert_eq!(artifact.filename, "login_1748079432.feature");
        assert_eq!(&artifact.data[..], b"Feature: Server copy\n");
        assert_eq!(service.download_names(), vec!["login_1748079432.feature".to_string()]);
    }

    #[tokio::test]
    async fn failed_fetch_does_not_fall_back_to_text() {
        let service = FakeService::default();
        service.set_download(Err(Some("File not found".to_string())));
        let result = result(AgentType::Gherkin, None, Some("missing.feature"));

        let err = materialize(&service, &result, "Gherkin Scenario Generator")
            .await
            .unwrap_err();

        assert!(matches!(err, QaError::Service { .. }));
    }
}
