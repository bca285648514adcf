//! In-memory cluster used by the unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::error::ApiError;
use crate::model::{AllocTarget, LogStream};
use crate::nomad::{
    AllocStub, Allocation, ClusterClient, DeploymentStub, EvaluationStub, EventSource, JobStub,
    TaskState,
};

pub fn alloc_target(id: &str, name: &str) -> AllocTarget {
    AllocTarget {
        id: id.to_string(),
        name: name.to_string(),
        task: "server".to_string(),
        job_id: "web".to_string(),
        namespace: "default".to_string(),
    }
}

#[derive(Default)]
struct State {
    jobs: Vec<JobStub>,
    job_allocs: BTreeMap<String, Vec<AllocStub>>,
    allocations: BTreeMap<String, Allocation>,
    logs: BTreeMap<(String, String), String>,
    events: Vec<Vec<Value>>,
    fail_mutations: bool,
    calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    fn with_state(self, update: impl FnOnce(&mut State)) -> Self {
        update(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_job(self, id: &str, namespace: &str) -> Self {
        self.with_state(|state| {
            state.jobs.push(JobStub {
                id: id.to_string(),
                namespace: namespace.to_string(),
                job_type: "service".to_string(),
                priority: 50,
                status: "running".to_string(),
                submit_time: 0,
            })
        })
    }

    pub fn with_allocation(self, id: &str, name: &str) -> Self {
        let raw = json!({ "ID": id, "Name": name, "Namespace": "default" });
        self.with_state(|state| {
            state
                .allocations
                .insert(id.to_string(), Allocation::from_value(raw));
        })
    }

    pub fn with_job_allocation(self, job_id: &str, alloc_id: &str, tasks: &[&str]) -> Self {
        let stub = AllocStub {
            id: alloc_id.to_string(),
            name: format!("{job_id}.{job_id}[0]"),
            namespace: "default".to_string(),
            job_id: job_id.to_string(),
            client_status: "running".to_string(),
            task_states: tasks
                .iter()
                .map(|task| {
                    (
                        task.to_string(),
                        TaskState {
                            state: "running".to_string(),
                            ..TaskState::default()
                        },
                    )
                })
                .collect(),
            create_time: 1,
        };
        self.with_state(|state| {
            state
                .job_allocs
                .entry(job_id.to_string())
                .or_default()
                .push(stub)
        })
    }

    pub fn with_logs(self, alloc_id: &str, stream: LogStream, text: &str) -> Self {
        self.with_state(|state| {
            state.logs.insert(
                (alloc_id.to_string(), stream.as_str().to_string()),
                text.to_string(),
            );
        })
    }

    pub fn with_events(self, batches: Vec<Vec<Value>>) -> Self {
        self.with_state(|state| state.events = batches)
    }

    pub fn failing_mutations(self) -> Self {
        self.with_state(|state| state.fail_mutations = true)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Only the calls that change cluster state.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with("restart ") || call.starts_with("stop "))
            .collect()
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }

    fn mutate(&self, call: String) -> Result<(), ApiError> {
        let state = self.record(call.clone());
        if state.fail_mutations {
            return Err(ApiError::Status {
                url: call,
                status: 500,
                body: "permission denied".to_string(),
            });
        }
        Ok(())
    }
}

pub struct FakeEvents {
    batches: VecDeque<Vec<Value>>,
}

impl EventSource for FakeEvents {
    async fn next_batch(&mut self) -> Result<Option<Vec<Value>>, ApiError> {
        match self.batches.pop_front() {
            Some(batch) => Ok(Some(batch)),
            // a live stream stays open until it is aborted
            None => std::future::pending().await,
        }
    }
}

impl ClusterClient for FakeCluster {
    type Events = FakeEvents;

    async fn list_jobs(&self) -> Result<Vec<JobStub>, ApiError> {
        Ok(self.record("list_jobs".to_string()).jobs.clone())
    }

    async fn job_allocations(
        &self,
        job_id: &str,
        _namespace: &str,
    ) -> Result<Vec<AllocStub>, ApiError> {
        let state = self.record(format!("job_allocations {job_id}"));
        Ok(state.job_allocs.get(job_id).cloned().unwrap_or_default())
    }

    async fn job_spec(&self, job_id: &str, _namespace: &str) -> Result<String, ApiError> {
        let state = self.record(format!("job_spec {job_id}"));
        match state.jobs.iter().find(|job| job.id == job_id) {
            Some(job) => Ok(json!({ "ID": job.id, "Priority": job.priority }).to_string()),
            None => Err(ApiError::NotFound(format!("/v1/job/{job_id}"))),
        }
    }

    async fn get_allocation(&self, alloc_id: &str) -> Result<Allocation, ApiError> {
        let state = self.record(format!("get_allocation {alloc_id}"));
        state
            .allocations
            .get(alloc_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("/v1/allocation/{alloc_id}")))
    }

    async fn restart_allocation(&self, alloc: &Allocation) -> Result<(), ApiError> {
        self.mutate(format!("restart {}", alloc.id))
    }

    async fn stop_allocation(&self, alloc: &Allocation) -> Result<(), ApiError> {
        self.mutate(format!("stop {}", alloc.id))
    }

    async fn allocation_logs(
        &self,
        alloc_id: &str,
        _task: &str,
        stream: LogStream,
    ) -> Result<String, ApiError> {
        let state = self.record(format!("logs {alloc_id} {}", stream.as_str()));
        state
            .logs
            .get(&(alloc_id.to_string(), stream.as_str().to_string()))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("/v1/client/fs/logs/{alloc_id}")))
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentStub>, ApiError> {
        self.record("list_deployments".to_string());
        Ok(Vec::new())
    }

    async fn list_evaluations(&self) -> Result<Vec<EvaluationStub>, ApiError> {
        self.record("list_evaluations".to_string());
        Ok(Vec::new())
    }

    async fn stream_events(
        &self,
        topics: &[String],
        namespace: &str,
    ) -> Result<FakeEvents, ApiError> {
        let state = self.record(format!("stream_events {} {namespace}", topics.join(",")));
        Ok(FakeEvents {
            batches: state.events.clone().into(),
        })
    }
}
