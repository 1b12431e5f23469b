mod http;

pub use http::HttpGenerationService;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    agent::{AgentType, Language},
    errors::Result,
};

/// Optional knobs forwarded to the generation backend untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default)]
    pub feature_name: Option<String>,
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub iterations: Option<u32>,
    #[serde(default)]
    pub chunk_input: Option<bool>,
    #[serde(default)]
    pub chunk_size: Option<u32>,
}

/// A user-supplied document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub data: Bytes,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub requirement: String,
    pub agent: AgentType,
    pub language: Option<Language>,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub file: FileUpload,
    pub agent: AgentType,
    pub requirement: Option<String>,
    pub language: Option<Language>,
    pub options: GenerationOptions,
}

/// What the backend hands back for either generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceReply {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub data: Bytes,
    pub media_type: String,
}

/// The remote generation backend. Every call may reject with
/// [`crate::errors::QaError::Service`].
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate_content(&self, request: &ContentRequest) -> Result<ServiceReply>;

    async fn generate_with_file(&self, request: &FileRequest) -> Result<ServiceReply>;

    async fn download_feature_file(&self, filename: &str) -> Result<DownloadedFile>;

    async fn health(&self) -> Result<String>;
}
