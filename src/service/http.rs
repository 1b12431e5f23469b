use async_trait::async_trait;
use reqwest::{
    Url,
    header::CONTENT_TYPE,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::ServiceConfig,
    errors::{QaError, Result},
    service::{
        ContentRequest, DownloadedFile, FileRequest, GenerationOptions, GenerationService,
        ServiceReply,
    },
};

const DEFAULT_DOWNLOAD_MEDIA_TYPE: &str = "text/plain";

/// Talks to the QA generation backend over HTTP.
pub struct HttpGenerationService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpGenerationService {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| QaError::other(format!("service.base_url cannot be a base url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate_content(&self, request: &ContentRequest) -> Result<ServiceReply> {
        let body = GenerateBody {
            requirement: &request.requirement,
            agent_type: request.agent.as_str(),
            language: request.language.map(|language| language.as_str()),
            feature_name: request.options.feature_name.as_deref(),
            test_name: request.options.test_name.as_deref(),
            iterations: request.options.iterations,
            chunk_input: request.options.chunk_input,
            chunk_size: request.options.chunk_size,
        };

        let url = self.endpoint(&["generate"])?;
        debug!(target: "service", %url, agent = %request.agent, "posting text generation request");

        let response = self.client.post(url).json(&body).send().await?;
        read_reply(response).await
    }

    async fn generate_with_file(&self, request: &FileRequest) -> Result<ServiceReply> {
        let file_part = Part::bytes(request.file.data.to_vec()).file_name(request.file.name.clone());

        let mut form = Form::new()
            .part("file", file_part)
            .text("agentType", request.agent.as_str());

        if let Some(requirement) = &request.requirement {
            form = form.text("requirement", requirement.clone());
        }
        if let Some(language) = request.language {
            form = form.text("language", language.as_str());
        }
        form = append_options(form, &request.options);

        let url = self.endpoint(&["generate-with-file"])?;
        debug!(
            target: "service",
            %url,
            agent = %request.agent,
            file = %request.file.name,
            bytes = request.file.data.len(),
            "uploading file for generation"
        );

        let response = self.client.post(url).multipart(form).send().await?;
        read_reply(response).await
    }

    async fn download_feature_file(&self, filename: &str) -> Result<DownloadedFile> {
        let url = self.endpoint(&["download", filename])?;
        debug!(target: "service", %url, "fetching generated file");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(target: "service", %status, filename, "download rejected");
            return Err(QaError::service(error_message(&body)));
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_DOWNLOAD_MEDIA_TYPE)
            .to_string();
        let data = response.bytes().await?;

        Ok(DownloadedFile { data, media_type })
    }

    async fn health(&self) -> Result<String> {
        let response = self.client.get(self.base_url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(QaError::service(error_message(&body)));
        }

        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "ok".to_string());
        Ok(message)
    }
}

fn append_options(mut form: Form, options: &GenerationOptions) -> Form {
    if let Some(feature_name) = &options.feature_name {
        form = form.text("featureName", feature_name.clone());
    }
    if let Some(test_name) = &options.test_name {
        form = form.text("testName", test_name.clone());
    }
    if let Some(iterations) = options.iterations {
        form = form.text("iterations", iterations.to_string());
    }
    if let Some(chunk_input) = options.chunk_input {
        form = form.text("chunkInput", chunk_input.to_string());
    }
    if let Some(chunk_size) = options.chunk_size {
        form = form.text("chunkSize", chunk_size.to_string());
    }
    form
}

async fn read_reply(response: reqwest::Response) -> Result<ServiceReply> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        warn!(target: "service", %status, "generation request rejected");
        return Err(QaError::service(error_message(&body)));
    }

    let envelope: ReplyEnvelope = serde_json::from_str(&body)?;
    if envelope.status.as_deref() == Some("error") {
        return Err(QaError::service(envelope.message));
    }

    Ok(ServiceReply {
        content: envelope.content.unwrap_or_default(),
        filename: envelope.filename.filter(|name| !name.trim().is_empty()),
        message: envelope.message,
    })
}

/// Pulls a human-readable reason out of an error body. The backend uses
/// `message` for its own errors and `detail` for framework-level ones.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    requirement: &'a str,
    agent_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feature_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_input: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_size: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct ReplyEnvelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    message: Option<String>,
}
