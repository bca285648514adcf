use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Deserializer};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::model::LogStream;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const LOG_TAIL_BYTES: u64 = 50_000;
const TOKEN_HEADER: &str = "X-Nomad-Token";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct JobStub {
    #[serde(rename = "ID")]
    pub id: String,
    pub namespace: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    pub priority: i64,
    pub status: String,
    pub submit_time: i64,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskState {
    pub state: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct AllocStub {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    pub client_status: String,
    /// Null until the client has started the allocation's tasks.
    #[serde(deserialize_with = "null_as_default")]
    pub task_states: BTreeMap<String, TaskState>,
    pub create_time: i64,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeploymentStub {
    #[serde(rename = "ID")]
    pub id: String,
    pub namespace: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    pub job_version: u64,
    pub status: String,
    pub status_description: String,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct EvaluationStub {
    #[serde(rename = "ID")]
    pub id: String,
    pub namespace: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "Type")]
    pub eval_type: String,
    pub triggered_by: String,
    pub status: String,
    pub create_time: i64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A full allocation as returned by the allocation info endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub raw: Value,
}

impl Allocation {
    pub fn from_value(raw: Value) -> Self {
        let field = |name: &str| {
            raw.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: field("ID"),
            name: field("Name"),
            namespace: field("Namespace"),
            raw,
        }
    }
}

/// Source of event batches from the cluster event stream.
pub trait EventSource: Send {
    /// Next batch of events, `Ok(None)` once the stream has ended.
    fn next_batch(&mut self) -> impl Future<Output = Result<Option<Vec<Value>>, ApiError>> + Send;
}

/// The cluster API as seen by the dispatcher. All calls are bound to the base
/// URL and token the client was built with.
pub trait ClusterClient: Clone + Send + Sync + 'static {
    type Events: EventSource + 'static;

    fn list_jobs(&self) -> impl Future<Output = Result<Vec<JobStub>, ApiError>> + Send;

    fn job_allocations(
        &self,
        job_id: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<AllocStub>, ApiError>> + Send;

    fn job_spec(
        &self,
        job_id: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    fn get_allocation(
        &self,
        alloc_id: &str,
    ) -> impl Future<Output = Result<Allocation, ApiError>> + Send;

    fn restart_allocation(
        &self,
        alloc: &Allocation,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn stop_allocation(&self, alloc: &Allocation)
    -> impl Future<Output = Result<(), ApiError>> + Send;

    fn allocation_logs(
        &self,
        alloc_id: &str,
        task: &str,
        stream: LogStream,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    fn list_deployments(&self) -> impl Future<Output = Result<Vec<DeploymentStub>, ApiError>> + Send;

    fn list_evaluations(&self) -> impl Future<Output = Result<Vec<EvaluationStub>, ApiError>> + Send;

    fn stream_events(
        &self,
        topics: &[String],
        namespace: &str,
    ) -> impl Future<Output = Result<Self::Events, ApiError>> + Send;
}

#[derive(Clone)]
pub struct NomadClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl NomadClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|source| ApiError::Transport {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        if self.token.is_empty() {
            builder
        } else {
            builder.header(TOKEN_HEADER, &self.token)
        }
    }

    async fn send(&self, url: &str, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 404 {
            return Err(ApiError::NotFound(url.to_string()));
        }
        Err(ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: body.trim().chars().take(200).collect(),
        })
    }

    async fn get_text(&self, path: &str, query: &[(&str, &str)]) -> Result<String, ApiError> {
        let url = self.url(path);
        let builder = self
            .request(Method::GET, &url)
            .query(query)
            .timeout(REQUEST_TIMEOUT);
        let response = self.send(&url, builder).await?;
        response.text().await.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let body = self.get_text(path, query).await?;
        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            url: self.url(path),
            source,
        })
    }

    async fn put_json(&self, path: &str, body: &Value) -> Result<(), ApiError> {
        let url = self.url(path);
        let builder = self
            .request(Method::PUT, &url)
            .json(body)
            .timeout(REQUEST_TIMEOUT);
        self.send(&url, builder).await.map(|_| ())
    }
}

impl ClusterClient for NomadClient {
    type Events = NomadEventStream;

    async fn list_jobs(&self) -> Result<Vec<JobStub>, ApiError> {
        self.get_json("/v1/jobs", &[("namespace", "*")]).await
    }

    async fn job_allocations(
        &self,
        job_id: &str,
        namespace: &str,
    ) -> Result<Vec<AllocStub>, ApiError> {
        self.get_json(
            &format!("/v1/job/{job_id}/allocations"),
            &[("namespace", namespace)],
        )
        .await
    }

    async fn job_spec(&self, job_id: &str, namespace: &str) -> Result<String, ApiError> {
        self.get_text(&format!("/v1/job/{job_id}"), &[("namespace", namespace)])
            .await
    }

    async fn get_allocation(&self, alloc_id: &str) -> Result<Allocation, ApiError> {
        let raw: Value = self
            .get_json(&format!("/v1/allocation/{alloc_id}"), &[])
            .await?;
        Ok(Allocation::from_value(raw))
    }

    async fn restart_allocation(&self, alloc: &Allocation) -> Result<(), ApiError> {
        let body = serde_json::json!({ "TaskName": "", "AllTasks": true });
        self.put_json(
            &format!(
                "/v1/client/allocation/{}/restart?namespace={}",
                alloc.id, alloc.namespace
            ),
            &body,
        )
        .await
    }

    async fn stop_allocation(&self, alloc: &Allocation) -> Result<(), ApiError> {
        self.put_json(
            &format!(
                "/v1/allocation/{}/stop?namespace={}",
                alloc.id, alloc.namespace
            ),
            &Value::Null,
        )
        .await
    }

    async fn allocation_logs(
        &self,
        alloc_id: &str,
        task: &str,
        stream: LogStream,
    ) -> Result<String, ApiError> {
        let offset = LOG_TAIL_BYTES.to_string();
        self.get_text(
            &format!("/v1/client/fs/logs/{alloc_id}"),
            &[
                ("task", task),
                ("type", stream.as_str()),
                ("plain", "true"),
                ("origin", "end"),
                ("offset", offset.as_str()),
            ],
        )
        .await
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentStub>, ApiError> {
        self.get_json("/v1/deployments", &[("namespace", "*")]).await
    }

    async fn list_evaluations(&self) -> Result<Vec<EvaluationStub>, ApiError> {
        self.get_json("/v1/evaluations", &[("namespace", "*")]).await
    }

    async fn stream_events(
        &self,
        topics: &[String],
        namespace: &str,
    ) -> Result<NomadEventStream, ApiError> {
        let url = self.url("/v1/event/stream");
        let mut query = topic_query(topics)
            .into_iter()
            .map(|topic| ("topic".to_string(), topic))
            .collect::<Vec<_>>();
        query.push(("namespace".to_string(), namespace.to_string()));

        // no request timeout: the stream stays open until superseded
        let builder = self.request(Method::GET, &url).query(&query);
        let response = self.send(&url, builder).await?;
        Ok(NomadEventStream {
            url,
            response,
            buffer: Vec::new(),
        })
    }
}

/// Newline-delimited JSON event stream. Empty `{}` objects are heartbeats.
pub struct NomadEventStream {
    url: String,
    response: Response,
    buffer: Vec<u8>,
}

impl EventSource for NomadEventStream {
    async fn next_batch(&mut self) -> Result<Option<Vec<Value>>, ApiError> {
        loop {
            while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
                let events = parse_event_line(&line).map_err(|source| ApiError::Decode {
                    url: self.url.clone(),
                    source,
                })?;
                if !events.is_empty() {
                    return Ok(Some(events));
                }
            }

            let chunk = self
                .response
                .chunk()
                .await
                .map_err(|source| ApiError::Transport {
                    url: self.url.clone(),
                    source,
                })?;
            match chunk {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => return Ok(None),
            }
        }
    }
}

/// Expands configured topics into `Topic:Filter` query values; a bare topic
/// subscribes to every key.
pub fn topic_query(topics: &[String]) -> Vec<String> {
    topics
        .iter()
        .map(|topic| topic.trim())
        .filter(|topic| !topic.is_empty())
        .map(|topic| {
            if topic.contains(':') {
                topic.to_string()
            } else {
                format!("{topic}:*")
            }
        })
        .collect()
}

fn parse_event_line(line: &[u8]) -> Result<Vec<Value>, serde_json::Error> {
    let trimmed = String::from_utf8_lossy(line);
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed)?;
    Ok(value
        .get("Events")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{AllocStub, Allocation, parse_event_line, topic_query};
    use serde_json::json;

    #[test]
    fn bare_topics_subscribe_to_all_keys() {
        let topics = vec![
            "Job".to_string(),
            " Allocation ".to_string(),
            "Deployment:web".to_string(),
            String::new(),
        ];
        assert_eq!(
            topic_query(&topics),
            vec![
                "Job:*".to_string(),
                "Allocation:*".to_string(),
                "Deployment:web".to_string(),
            ]
        );
    }

    #[test]
    fn heartbeat_lines_carry_no_events() {
        assert!(parse_event_line(b"{}\n").unwrap().is_empty());
        assert!(parse_event_line(b"\n").unwrap().is_empty());
    }

    #[test]
    fn event_lines_yield_each_event() {
        let line = br#"{"Index":7,"Events":[{"Topic":"Job","Type":"JobRegistered"},{"Topic":"Job","Type":"JobDeregistered"}]}"#;
        let events = parse_event_line(line).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["Type"], "JobDeregistered");
    }

    #[test]
    fn malformed_event_lines_are_errors() {
        assert!(parse_event_line(b"{not json").is_err());
    }

    #[test]
    fn allocation_identity_is_read_from_raw_document() {
        let alloc = Allocation::from_value(json!({
            "ID": "3e4f8b2a-91cd-7c3a-0a4b-7f2e9d1c0b55",
            "Name": "web.web[0]",
            "Namespace": "prod",
            "ClientStatus": "running"
        }));
        assert_eq!(alloc.name, "web.web[0]");
        assert_eq!(alloc.namespace, "prod");
    }

    #[test]
    fn allocation_stubs_tolerate_missing_fields() {
        let stub: AllocStub = serde_json::from_value(json!({
            "ID": "a1",
            "Name": "web.web[0]",
            "TaskStates": { "server": { "State": "running" } }
        }))
        .unwrap();
        assert_eq!(stub.task_states["server"].state, "running");
        assert_eq!(stub.client_status, "");
    }

    #[test]
    fn pending_allocations_with_null_task_states_decode() {
        let stubs: Vec<AllocStub> = serde_json::from_str(
            r#"[
                {"ID":"a1","Name":"web.web[0]","ClientStatus":"pending","TaskStates":null,"CreateTime":2},
                {"ID":"a2","Name":"web.web[1]","ClientStatus":"running","TaskStates":{"server":{"State":"running"}},"CreateTime":1}
            ]"#,
        )
        .unwrap();
        assert_eq!(stubs.len(), 2);
        assert!(stubs[0].task_states.is_empty());
        assert_eq!(stubs[0].client_status, "pending");
        assert_eq!(stubs[1].task_states["server"].state, "running");
    }
}
