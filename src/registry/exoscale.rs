// ABOUTME: Exoscale v2 API backend for the template registry.
// ABOUTME: Signed JSON requests per zone endpoint, with async operations polled to completion.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::signature::{self, SIGNATURE_VALIDITY_SECS};
use super::{
    BootMode, ImageRecord, PendingTemplate, RegistryError, TemplateRegistry, TemplateSpec,
};
use crate::storage::ObjectRef;
use crate::types::{DeleteStatus, OperationId, TemplateId, Zone};

/// Connection settings for [`ExoscaleRegistry`].
#[derive(Debug, Clone)]
pub struct ExoscaleConfig {
    pub api_key: String,
    pub api_secret: String,
    /// API environment, `api` in production.
    pub environment: String,
    /// Endpoint override; `{zone}` is replaced by the zone name.
    pub endpoint: Option<String>,
    /// Upper bound for a single request and for each operation wait.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub user_agent: String,
}

/// Template registry backed by the Exoscale compute API.
pub struct ExoscaleRegistry {
    http: Client,
    config: ExoscaleConfig,
}

impl std::fmt::Debug for ExoscaleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExoscaleRegistry")
            .field("environment", &self.config.environment)
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

impl ExoscaleRegistry {
    pub fn new(config: ExoscaleConfig) -> Result<Self, RegistryError> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegistryError::Transient(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Base URL of the API serving `zone`.
    pub fn endpoint(&self, zone: &Zone) -> String {
        match &self.config.endpoint {
            Some(template) => template
                .replace("{zone}", zone.as_str())
                .trim_end_matches('/')
                .to_string(),
            None => format!(
                "https://{}-{}.exoscale.com/v2",
                self.config.environment, zone
            ),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        zone: &Zone,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T, RegistryError> {
        let url = format!("{}{path}", self.endpoint(zone));
        let parsed =
            Url::parse(&url).map_err(|e| RegistryError::InvalidEndpoint(format!("{url}: {e}")))?;
        let body = body.unwrap_or_default();
        let expires = Utc::now().timestamp() + SIGNATURE_VALIDITY_SECS;
        let authorization = signature::authorization(
            &self.config.api_key,
            &self.config.api_secret,
            method.as_str(),
            parsed.path(),
            &body,
            expires,
        );

        tracing::debug!(%method, %url, "registry request");
        let mut request = self
            .http
            .request(method, parsed)
            .header(AUTHORIZATION, authorization);
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout {
                    operation: path.to_string(),
                    after: self.config.timeout,
                }
            } else {
                RegistryError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RegistryError::Transient(e.to_string()))?;
        if !status.is_success() {
            return Err(classify(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| RegistryError::Decode(format!("{path}: {e}")))
    }

    /// Poll `operation` until `done` accepts it or it fails.
    async fn poll(
        &self,
        zone: &Zone,
        mut operation: Operation,
        done: fn(&Operation) -> bool,
    ) -> Result<Operation, RegistryError> {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            match operation.state {
                OperationState::Failure => {
                    return Err(RegistryError::OperationFailed {
                        operation: operation.id.to_string(),
                        reason: operation
                            .message
                            .or(operation.reason)
                            .unwrap_or_else(|| "no reason given".to_string()),
                    });
                }
                OperationState::Timeout => {
                    return Err(RegistryError::Timeout {
                        operation: operation.id.to_string(),
                        after: self.config.timeout,
                    });
                }
                OperationState::Pending | OperationState::Success | OperationState::Unknown => {}
            }
            if done(&operation) {
                return Ok(operation);
            }

            if Instant::now() + self.config.poll_interval > deadline {
                return Err(RegistryError::Timeout {
                    operation: operation.id.to_string(),
                    after: self.config.timeout,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;

            tracing::debug!(operation = %operation.id, "polling operation");
            operation = self
                .call(
                    Method::GET,
                    zone,
                    &format!("/operation/{}", operation.id),
                    None,
                )
                .await?;
        }
    }

    /// Wait until `operation` names the template it creates in `target`.
    async fn pending(
        &self,
        zone: &Zone,
        target: &Zone,
        name: &str,
        operation: Operation,
    ) -> Result<PendingTemplate, RegistryError> {
        let operation = self
            .poll(zone, operation, |op| {
                op.reference.is_some() || op.state == OperationState::Success
            })
            .await?;
        let reference = operation.reference.ok_or_else(|| {
            RegistryError::Decode(format!(
                "operation {} finished without a reference",
                operation.id
            ))
        })?;
        let record = ImageRecord::new(TemplateId::new(reference.id), target.clone(), name);
        Ok(PendingTemplate::new(record).with_operation(zone.clone(), operation.id))
    }

    async fn template(&self, zone: &Zone, id: &TemplateId) -> Result<ImageRecord, RegistryError> {
        let resource: TemplateResource = self
            .call(Method::GET, zone, &format!("/template/{id}"), None)
            .await?;
        Ok(resource.into_record(zone.clone()))
    }
}

#[async_trait]
impl TemplateRegistry for ExoscaleRegistry {
    async fn start_register(
        &self,
        zone: &Zone,
        source: &ObjectRef,
        spec: &TemplateSpec,
    ) -> Result<PendingTemplate, RegistryError> {
        let body = encode(&RegisterTemplateRequest::new(source, spec))?;
        let operation: Operation = self
            .call(Method::POST, zone, "/template", Some(body))
            .await?;
        self.pending(zone, zone, &spec.name, operation).await
    }

    async fn start_copy(
        &self,
        template: &ImageRecord,
        target: &Zone,
    ) -> Result<PendingTemplate, RegistryError> {
        let body = encode(&CopyTemplateRequest {
            target_zone: ZoneRef {
                name: target.as_str(),
            },
        })?;
        let operation: Operation = self
            .call(
                Method::POST,
                template.zone(),
                &format!("/template/{}", template.id()),
                Some(body),
            )
            .await?;
        self.pending(template.zone(), target, template.name(), operation)
            .await
    }

    async fn wait(&self, pending: &PendingTemplate) -> Result<ImageRecord, RegistryError> {
        if let Some((zone, id)) = pending.operation() {
            let operation: Operation = self
                .call(Method::GET, zone, &format!("/operation/{id}"), None)
                .await?;
            self.poll(zone, operation, settled).await?;
        }
        let record = pending.record();
        self.template(record.zone(), record.id()).await
    }

    async fn delete(&self, template: &ImageRecord) -> Result<DeleteStatus, RegistryError> {
        let operation: Operation = match self
            .call(
                Method::DELETE,
                template.zone(),
                &format!("/template/{}", template.id()),
                None,
            )
            .await
        {
            Ok(operation) => operation,
            Err(RegistryError::NotFound(_)) => return Ok(DeleteStatus::NotFound),
            Err(e) => return Err(e),
        };
        self.poll(template.zone(), operation, settled).await?;
        Ok(DeleteStatus::Deleted)
    }
}

fn settled(operation: &Operation) -> bool {
    operation.state == OperationState::Success
}

fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>, RegistryError> {
    serde_json::to_vec(body).map_err(|e| RegistryError::Decode(e.to_string()))
}

fn classify(status: StatusCode, body: &str) -> RegistryError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_string());
    let detail = format!("{status}: {message}");
    match status {
        StatusCode::NOT_FOUND => RegistryError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RegistryError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => RegistryError::Transient(detail),
        s if s.is_client_error() => RegistryError::Rejected(detail),
        _ => RegistryError::Transient(detail),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    id: OperationId,
    state: OperationState,
    #[serde(default)]
    reference: Option<Reference>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OperationState {
    Pending,
    Success,
    Failure,
    Timeout,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct Reference {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TemplateResource {
    id: TemplateId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl TemplateResource {
    fn into_record(self, zone: Zone) -> ImageRecord {
        let mut record = ImageRecord::new(self.id, zone, self.name);
        if let Some(checksum) = self.checksum {
            record = record.with_checksum(checksum);
        }
        if let Some(size) = self.size {
            record = record.with_size(size);
        }
        if let Some(created_at) = self.created_at {
            record = record.with_created_at(created_at);
        }
        record
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct RegisterTemplateRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    url: &'a str,
    checksum: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_user: Option<&'a str>,
    ssh_key_enabled: bool,
    password_enabled: bool,
    boot_mode: BootMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintainer: Option<&'a str>,
}

impl<'a> RegisterTemplateRequest<'a> {
    fn new(source: &'a ObjectRef, spec: &'a TemplateSpec) -> Self {
        Self {
            name: &spec.name,
            description: spec.description.as_deref(),
            url: &source.url,
            checksum: &spec.checksum,
            default_user: spec.default_user.as_deref(),
            ssh_key_enabled: spec.ssh_key_enabled,
            password_enabled: spec.password_enabled,
            boot_mode: spec.boot_mode,
            build: spec.build.as_deref(),
            version: spec.version.as_deref(),
            maintainer: spec.maintainer.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct CopyTemplateRequest<'a> {
    target_zone: ZoneRef<'a>,
}

#[derive(Debug, Serialize)]
struct ZoneRef<'a> {
    name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry(endpoint: Option<&str>) -> ExoscaleRegistry {
        ExoscaleRegistry::new(ExoscaleConfig {
            api_key: "EXOkey".to_string(),
            api_secret: "secret".to_string(),
            environment: "api".to_string(),
            endpoint: endpoint.map(str::to_string),
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(3),
            user_agent: "templify-test".to_string(),
        })
        .unwrap()
    }

    fn zone(name: &str) -> Zone {
        Zone::new(name).unwrap()
    }

    #[test]
    fn endpoint_is_per_zone() {
        let registry = registry(None);
        assert_eq!(
            registry.endpoint(&zone("de-fra-1")),
            "https://api-de-fra-1.exoscale.com/v2"
        );
    }

    #[test]
    fn endpoint_override_substitutes_zone() {
        let registry = registry(Some("http://localhost:8080/{zone}/v2/"));
        assert_eq!(
            registry.endpoint(&zone("at-vie-1")),
            "http://localhost:8080/at-vie-1/v2"
        );
    }

    #[test]
    fn register_body_uses_api_field_names() {
        let source = ObjectRef {
            bucket: "images".to_string(),
            key: "templify/abc/disk.qcow2".to_string(),
            url: "https://sos-ch-gva-2.exo.io/images/templify/abc/disk.qcow2".to_string(),
        };
        let spec = TemplateSpec {
            name: "debian-12".to_string(),
            description: None,
            checksum: "5d41402abc4b2a76b9719d911017c592".to_string(),
            default_user: Some("debian".to_string()),
            boot_mode: BootMode::Uefi,
            password_enabled: false,
            ssh_key_enabled: true,
            build: None,
            version: Some("12.5".to_string()),
            maintainer: None,
        };

        let body = serde_json::to_value(RegisterTemplateRequest::new(&source, &spec)).unwrap();
        assert_eq!(
            body,
            json!({
                "name": "debian-12",
                "url": "https://sos-ch-gva-2.exo.io/images/templify/abc/disk.qcow2",
                "checksum": "5d41402abc4b2a76b9719d911017c592",
                "default-user": "debian",
                "ssh-key-enabled": true,
                "password-enabled": false,
                "boot-mode": "uefi",
                "version": "12.5"
            })
        );
    }

    #[test]
    fn copy_body_names_target_zone() {
        let body = serde_json::to_value(CopyTemplateRequest {
            target_zone: ZoneRef { name: "de-fra-1" },
        })
        .unwrap();
        assert_eq!(body, json!({"target-zone": {"name": "de-fra-1"}}));
    }

    #[test]
    fn operation_decodes_reference_and_unknown_states() {
        let op: Operation = serde_json::from_value(json!({
            "id": "op-1",
            "state": "success",
            "reference": {"id": "tpl-1", "link": "/v2/template/tpl-1"}
        }))
        .unwrap();
        assert_eq!(op.state, OperationState::Success);
        assert_eq!(op.reference.unwrap().id, "tpl-1");

        let op: Operation =
            serde_json::from_value(json!({"id": "op-2", "state": "queued"})).unwrap();
        assert_eq!(op.state, OperationState::Unknown);
    }

    #[test]
    fn template_resource_maps_to_record() {
        let resource: TemplateResource = serde_json::from_value(json!({
            "id": "tpl-9",
            "name": "debian-12",
            "checksum": "abc",
            "size": 10737418240u64,
            "created-at": "2024-05-01T12:30:00Z",
            "boot-mode": "legacy"
        }))
        .unwrap();
        let record = resource.into_record(zone("ch-gva-2"));
        assert_eq!(record.id().as_str(), "tpl-9");
        assert_eq!(record.zone().as_str(), "ch-gva-2");
        assert_eq!(record.size(), Some(10_737_418_240));
        assert!(record.created_at().is_some());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, r#"{"message":"no such template"}"#),
            RegistryError::NotFound(msg) if msg.contains("no such template")
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "quota exceeded"),
            RegistryError::Rejected(_)
        ));
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, ""),
            RegistryError::Unauthorized(_)
        ));
    }
}
