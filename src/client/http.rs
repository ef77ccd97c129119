use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    Result,
    client::{ExportService, RunService, WorkflowSource},
    config::ApiConfig,
    model::{Agent, ExecutionRun, RunRequest, Task, TaskUpdate},
};

/// Client for the workflow REST api.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: Client,
}

impl HttpClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(
        &self,
        path: &str,
    ) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        request: RequestBuilder,
    ) -> Result<Response> {
        let response = request.send().await?.error_for_status()?;
        debug!(url = %response.url(), status = response.status().as_u16(), "api response");
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T> {
        let response = self.send(self.client.get(self.url(path))).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl WorkflowSource for HttpClient {
    async fn list_agents(
        &self,
        project: &str,
    ) -> Result<Vec<Agent>> {
        self.get_json(&format!("/projects/{}/agents", project)).await
    }

    async fn list_tasks(
        &self,
        project: &str,
    ) -> Result<Vec<Task>> {
        self.get_json(&format!("/projects/{}/tasks", project)).await
    }

    async fn update_task(
        &self,
        task: &str,
        update: &TaskUpdate,
    ) -> Result<Task> {
        let response = self.send(self.client.put(self.url(&format!("/tasks/{}", task))).json(update)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete_agent(
        &self,
        agent: &str,
    ) -> Result<()> {
        self.send(self.client.delete(self.url(&format!("/agents/{}", agent)))).await?;
        Ok(())
    }

    async fn delete_task(
        &self,
        task: &str,
    ) -> Result<()> {
        self.send(self.client.delete(self.url(&format!("/tasks/{}", task)))).await?;
        Ok(())
    }
}

#[async_trait]
impl RunService for HttpClient {
    async fn start_run(
        &self,
        project: &str,
        request: &RunRequest,
    ) -> Result<ExecutionRun> {
        let response = self.send(self.client.post(self.url(&format!("/execute/project/{}", project))).json(request)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_run(
        &self,
        run: &str,
    ) -> Result<ExecutionRun> {
        self.get_json(&format!("/executions/{}", run)).await
    }
}

#[async_trait]
impl ExportService for HttpClient {
    async fn export_project(
        &self,
        project: &str,
    ) -> Result<Vec<u8>> {
        let response = self.send(self.client.get(self.url(&format!("/export/{}/zip", project)))).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{Method, StatusCode, Uri},
        routing::{get, post, put},
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;
    use crate::{CrewGraphError, model::RunStatus};

    type Seen = Arc<Mutex<Vec<(Method, String, Value)>>>;

    fn record(
        seen: &Seen,
        method: Method,
        uri: &Uri,
        body: Value,
    ) {
        seen.lock().unwrap().push((method, uri.path().to_string(), body));
    }

    /// Serve a small fake workflow api and return a client pointed at it.
    async fn fake_api() -> (HttpClient, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/tasks/{id}",
                put(|State(seen): State<Seen>, Path(id): Path<String>, method: Method, uri: Uri, Json(body): Json<Value>| async move {
                    let agent_id = body["agent_id"].clone();
                    record(&seen, method, &uri, body);
                    Json(json!({"id": id.parse::<u64>().unwrap_or_default(), "description": "Draft", "agent_id": agent_id}))
                }),
            )
            .route(
                "/execute/project/{id}",
                post(|State(seen): State<Seen>, method: Method, uri: Uri, Json(body): Json<Value>| async move {
                    record(&seen, method, &uri, body);
                    Json(json!({"id": 41, "status": "created"}))
                }),
            )
            .route(
                "/executions/{id}",
                get(|State(seen): State<Seen>, method: Method, uri: Uri| async move {
                    record(&seen, method, &uri, Value::Null);
                    Json(json!({"id": 41, "status": "running", "logs": "Researcher: started"}))
                }),
            )
            .route("/projects/{id}/agents", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .with_state(seen.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = ApiConfig {
            base_url: format!("http://{}/", addr),
            ..Default::default()
        };
        (HttpClient::new(&config).unwrap(), seen)
    }

    #[test]
    fn test_base_url_trimmed() {
        let config = ApiConfig {
            base_url: "http://localhost:8000/api/".to_string(),
            ..Default::default()
        };
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
        assert_eq!(client.url("/executions/4"), "http://localhost:8000/api/executions/4");
    }

    #[tokio::test]
    async fn test_update_task_puts_agent_id() {
        let (client, seen) = fake_api().await;

        let task = client.update_task("3", &TaskUpdate::assign("2")).await.unwrap();
        assert_eq!(task.id, "3");
        assert_eq!(task.assigned_agent(), Some("2"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (Method::PUT, "/tasks/3".to_string(), json!({"agent_id": "2"})));
    }

    #[tokio::test]
    async fn test_start_and_fetch_run() {
        let (client, seen) = fake_api().await;

        let inputs = HashMap::from([("topic".to_string(), json!("rust"))]);
        let run = client.start_run("1", &RunRequest::new(inputs)).await.unwrap();
        assert_eq!(run.id, "41");
        assert_eq!(run.status, RunStatus::Running);

        let run = client.get_run(&run.id).await.unwrap();
        assert_eq!(run.log, "Researcher: started");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (Method::POST, "/execute/project/1".to_string(), json!({"inputs": {"topic": "rust"}})));
        assert_eq!(seen[1].0, Method::GET);
        assert_eq!(seen[1].1, "/executions/41");
    }

    #[tokio::test]
    async fn test_error_status_becomes_client_error() {
        let (client, _) = fake_api().await;
        let err = client.list_agents("1").await.unwrap_err();
        assert_eq!(err, CrewGraphError::Client("500 Internal Server Error (/projects/1/agents)".to_string()));
    }
}
