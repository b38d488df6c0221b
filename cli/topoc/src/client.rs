//! HTTP client for the specification registry.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use topo_spec::ApplicationSpec;

use crate::error::CliError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry API client.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch a specification. `None` means it is not registered yet.
    pub async fn get(&self, name: &str) -> Result<Option<ApplicationSpec>, CliError> {
        let response = self.client.get(self.url(&format!("/specs/{name}"))).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.handle_response(response).await.map(Some)
    }

    /// Create or replace a specification.
    pub async fn put(&self, spec: &ApplicationSpec) -> Result<ApplicationSpec, CliError> {
        let response = self
            .client
            .put(self.url(&format!("/specs/{}", spec.name)))
            .json(spec)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), CliError> {
        let response = self
            .client
            .delete(self.url(&format!("/specs/{name}")))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error(response).await
        }
    }

    pub async fn list(&self) -> Result<Vec<ApplicationSpec>, CliError> {
        let response = self.client.get(self.url("/specs")).send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CliError> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            self.handle_error(response).await
        }
    }

    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, CliError> {
        let status = response.status().as_u16();

        let body: ErrorBody = response.json().await.unwrap_or_else(|_| ErrorBody {
            code: "unknown".to_string(),
            message: format!("registry returned status {status}"),
        });

        Err(CliError::api(status, body.code, body.message))
    }
}

/// Registry error response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use topo_spec::{Container, ServiceSpec};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn spec() -> ApplicationSpec {
        ApplicationSpec {
            guid: 9,
            name: "store".to_string(),
            serve: None,
            services: vec![ServiceSpec {
                name: "web".to_string(),
                containers: vec![Container::new("acme/web:1")],
                replicas: 1,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_url_building() {
        let client = RegistryClient::new("http://registry:8080/").unwrap();
        assert_eq!(client.url("/specs"), "http://registry:8080/specs");
    }

    #[tokio::test]
    async fn missing_spec_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/specs/store"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": "spec_not_found",
                "message": "no specification named 'store'"
            })))
            .mount(&server)
            .await;

        let client = RegistryClient::new(&server.uri()).unwrap();
        assert!(client.get("store").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_sends_the_spec_under_its_name() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/specs/store"))
            .and(body_partial_json(json!({ "name": "store", "guid": 9 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::to_value(spec()).unwrap()))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::new(&server.uri()).unwrap();
        assert_eq!(client.put(&spec()).await.unwrap(), spec());
    }

    #[tokio::test]
    async fn registry_errors_keep_code_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "invalid_spec",
                "message": "specification is invalid (1 error(s))"
            })))
            .mount(&server)
            .await;

        let client = RegistryClient::new(&server.uri()).unwrap();
        match client.put(&spec()).await.unwrap_err() {
            CliError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "invalid_spec");
                assert!(message.starts_with("specification is invalid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn list_and_delete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/specs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([spec()])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/specs/store"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::new(&server.uri()).unwrap();
        let listed = client.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "store");
        client.delete("store").await.unwrap();
    }
}
