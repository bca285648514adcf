use crossterm::event::KeyEvent;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, warn};

use crate::admin::{self, AdminAction};
use crate::error::ApiError;
use crate::format::{format_nanos, format_rfc3339, pretty_print_as_lines, pretty_value_lines, short_id, strings};
use crate::model::{AllocTarget, PageKind, PageRequest, RequestToken, Row, RowKey};
use crate::nomad::{
    AllocStub, ClusterClient, DeploymentStub, EvaluationStub, EventSource, JobStub,
};

/// Everything the session controller reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    PageLoaded {
        token: RequestToken,
        page: PageKind,
        header: Vec<String>,
        rows: Vec<Row>,
    },
    EventsReceived {
        token: RequestToken,
        rows: Vec<Row>,
    },
    FetchFailed {
        token: RequestToken,
        page: PageKind,
        error: String,
    },
    ActionComplete {
        action: AdminAction,
        target: AllocTarget,
    },
    ActionFailed {
        action: AdminAction,
        target: AllocTarget,
        error: String,
    },
    Tick,
    Key(KeyEvent),
    Resize(u16, u16),
}

/// A deferred cluster interaction; the dispatcher turns each into one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch {
        token: RequestToken,
        request: PageRequest,
    },
    Admin {
        action: AdminAction,
        target: AllocTarget,
    },
}

pub struct Dispatcher<C: ClusterClient> {
    client: C,
    tx: mpsc::UnboundedSender<Msg>,
    tasks: JoinSet<()>,
    event_stream: Option<AbortHandle>,
}

impl<C: ClusterClient> Dispatcher<C> {
    pub fn new(client: C, tx: mpsc::UnboundedSender<Msg>) -> Self {
        Self {
            client,
            tx,
            tasks: JoinSet::new(),
            event_stream: None,
        }
    }

    pub fn dispatch(&mut self, command: Command) {
        debug!("dispatch command={command:?}");
        let client = self.client.clone();
        let tx = self.tx.clone();
        match command {
            Command::Fetch { token, request } => {
                // a fetch for any page supersedes the live event stream
                if let Some(stream) = self.event_stream.take() {
                    stream.abort();
                }
                if let PageRequest::Events { topics, namespace } = request {
                    let handle = self.tasks.spawn(async move {
                        stream_events(client, tx, token, topics, namespace).await;
                    });
                    self.event_stream = Some(handle);
                    return;
                }
                self.tasks.spawn(async move {
                    let msg = load_page(&client, token, request).await;
                    let _ = tx.send(msg);
                });
            }
            Command::Admin { action, target } => {
                self.tasks.spawn(async move {
                    let msg = admin::perform(&client, action, target).await;
                    let _ = tx.send(msg);
                });
            }
        }
    }

    /// Collects finished tasks so the set does not grow without bound.
    pub fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(error) = result
                && error.is_panic()
            {
                warn!("command task panicked: {error}");
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }
}

pub async fn load_page<C: ClusterClient>(
    client: &C,
    token: RequestToken,
    request: PageRequest,
) -> Msg {
    let page = request.kind();
    match fetch_rows(client, &request).await {
        Ok((header, rows)) => Msg::PageLoaded {
            token,
            page,
            header,
            rows,
        },
        Err(error) => Msg::FetchFailed {
            token,
            page,
            error: error.to_string(),
        },
    }
}

async fn fetch_rows<C: ClusterClient>(
    client: &C,
    request: &PageRequest,
) -> Result<(Vec<String>, Vec<Row>), ApiError> {
    match request {
        PageRequest::Jobs => {
            let mut jobs = client.list_jobs().await?;
            jobs.sort_by(|left, right| {
                left.id
                    .cmp(&right.id)
                    .then_with(|| left.namespace.cmp(&right.namespace))
            });
            Ok((
                strings(["ID", "Namespace", "Type", "Priority", "Status", "Submitted"]),
                jobs.into_iter().map(job_row).collect(),
            ))
        }
        PageRequest::Deployments => {
            let deployments = client.list_deployments().await?;
            Ok((
                strings(["ID", "Job", "Version", "Status", "Description"]),
                deployments.into_iter().map(deployment_row).collect(),
            ))
        }
        PageRequest::Evaluations => {
            let evaluations = client.list_evaluations().await?;
            Ok((
                strings(["ID", "Job", "Type", "Triggered By", "Status", "Created"]),
                evaluations.into_iter().map(evaluation_row).collect(),
            ))
        }
        PageRequest::Events { .. } => Ok((event_header(), Vec::new())),
        PageRequest::Allocations { job_id, namespace } => {
            let mut allocs = client.job_allocations(job_id, namespace).await?;
            allocs.sort_by(|left, right| {
                right
                    .create_time
                    .cmp(&left.create_time)
                    .then_with(|| left.name.cmp(&right.name))
            });
            Ok((
                strings(["Alloc ID", "Task", "Name", "State", "Started", "Finished"]),
                allocs.into_iter().flat_map(alloc_rows).collect(),
            ))
        }
        PageRequest::JobSpec { job_id, namespace } => {
            let raw = client.job_spec(job_id, namespace).await?;
            Ok((Vec::new(), line_rows(pretty_print_as_lines(&raw))))
        }
        PageRequest::AllocSpec { target } => {
            let alloc = client.get_allocation(&target.id).await?;
            Ok((Vec::new(), line_rows(pretty_value_lines(&alloc.raw))))
        }
        PageRequest::Logs { target, stream } => {
            let logs = client
                .allocation_logs(&target.id, &target.task, *stream)
                .await?;
            Ok((Vec::new(), line_rows(logs.lines().map(str::to_string))))
        }
    }
}

async fn stream_events<C: ClusterClient>(
    client: C,
    tx: mpsc::UnboundedSender<Msg>,
    token: RequestToken,
    topics: Vec<String>,
    namespace: String,
) {
    let failed = |error: ApiError| Msg::FetchFailed {
        token,
        page: PageKind::Events,
        error: error.to_string(),
    };

    let mut source = match client.stream_events(&topics, &namespace).await {
        Ok(source) => source,
        Err(error) => {
            let _ = tx.send(failed(error));
            return;
        }
    };

    let opened = Msg::PageLoaded {
        token,
        page: PageKind::Events,
        header: event_header(),
        rows: Vec::new(),
    };
    if tx.send(opened).is_err() {
        return;
    }

    loop {
        let msg = match source.next_batch().await {
            Ok(Some(events)) => Msg::EventsReceived {
                token,
                rows: events.iter().map(event_row).collect(),
            },
            Ok(None) => return,
            Err(error) => failed(error),
        };
        let terminal = matches!(msg, Msg::FetchFailed { .. });
        if tx.send(msg).is_err() || terminal {
            return;
        }
    }
}

fn job_row(job: JobStub) -> Row {
    Row {
        key: RowKey::Job {
            id: job.id.clone(),
            namespace: job.namespace.clone(),
        },
        cells: vec![
            job.id,
            job.namespace,
            job.job_type,
            job.priority.to_string(),
            job.status,
            format_nanos(job.submit_time),
        ],
    }
}

fn deployment_row(deployment: DeploymentStub) -> Row {
    Row {
        key: RowKey::Job {
            id: deployment.job_id.clone(),
            namespace: deployment.namespace,
        },
        cells: vec![
            short_id(&deployment.id),
            deployment.job_id,
            deployment.job_version.to_string(),
            deployment.status,
            deployment.status_description,
        ],
    }
}

fn evaluation_row(evaluation: EvaluationStub) -> Row {
    Row {
        key: RowKey::Job {
            id: evaluation.job_id.clone(),
            namespace: evaluation.namespace,
        },
        cells: vec![
            short_id(&evaluation.id),
            evaluation.job_id,
            evaluation.eval_type,
            evaluation.triggered_by,
            evaluation.status,
            format_nanos(evaluation.create_time),
        ],
    }
}

/// One row per task; allocations without task state yet get a single row.
fn alloc_rows(alloc: AllocStub) -> Vec<Row> {
    let row = |task: &str, state: &str, started: String, finished: String| Row {
        key: RowKey::Alloc(AllocTarget {
            id: alloc.id.clone(),
            name: alloc.name.clone(),
            task: task.to_string(),
            job_id: alloc.job_id.clone(),
            namespace: alloc.namespace.clone(),
        }),
        cells: vec![
            short_id(&alloc.id),
            if task.is_empty() { "-".to_string() } else { task.to_string() },
            alloc.name.clone(),
            state.to_string(),
            started,
            finished,
        ],
    };

    if alloc.task_states.is_empty() {
        return vec![row(
            "",
            &alloc.client_status,
            "-".to_string(),
            "-".to_string(),
        )];
    }

    alloc
        .task_states
        .iter()
        .map(|(task, state)| {
            row(
                task,
                &state.state,
                format_rfc3339(state.started_at.as_deref()),
                format_rfc3339(state.finished_at.as_deref()),
            )
        })
        .collect()
}

fn event_header() -> Vec<String> {
    strings(["Index", "Topic", "Type", "Key", "Namespace"])
}

fn event_row(event: &Value) -> Row {
    let text = |name: &str| match event.get(name) {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Number(value)) => value.to_string(),
        _ => "-".to_string(),
    };
    Row {
        key: RowKey::None,
        cells: vec![
            text("Index"),
            text("Topic"),
            text("Type"),
            text("Key"),
            text("Namespace"),
        ],
    }
}

fn line_rows(lines: impl IntoIterator<Item = String>) -> Vec<Row> {
    lines.into_iter().map(Row::line).collect()
}
