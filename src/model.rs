use std::fmt::{Display, Formatter};

/// Process-wide build metadata, fixed at compile time.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
}

pub const BUILD: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    commit: match option_env!("DROVER_COMMIT_SHA") {
        Some(commit) => commit,
        None => "",
    },
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PageKind {
    Jobs,
    Deployments,
    Evaluations,
    Events,
    Allocations,
    JobSpec,
    AllocSpec,
    Logs,
}

impl PageKind {
    pub const TABS: [Self; 4] = [Self::Jobs, Self::Deployments, Self::Evaluations, Self::Events];

    pub fn title(self) -> &'static str {
        match self {
            Self::Jobs => "Jobs",
            Self::Deployments => "Deployments",
            Self::Evaluations => "Evaluations",
            Self::Events => "Events",
            Self::Allocations => "Allocations",
            Self::JobSpec => "Job Spec",
            Self::AllocSpec => "Allocation Spec",
            Self::Logs => "Logs",
        }
    }

    pub fn is_tab(self) -> bool {
        Self::TABS.contains(&self)
    }

    /// Live pages are fed by a stream rather than by polling.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Events)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Stdout => Self::Stderr,
            Self::Stderr => Self::Stdout,
        }
    }
}

/// One allocation task as the operator sees it in the allocation list.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct AllocTarget {
    pub id: String,
    pub name: String,
    pub task: String,
    pub job_id: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PageRequest {
    Jobs,
    Deployments,
    Evaluations,
    Events {
        topics: Vec<String>,
        namespace: String,
    },
    Allocations {
        job_id: String,
        namespace: String,
    },
    JobSpec {
        job_id: String,
        namespace: String,
    },
    AllocSpec {
        target: AllocTarget,
    },
    Logs {
        target: AllocTarget,
        stream: LogStream,
    },
}

impl PageRequest {
    pub fn kind(&self) -> PageKind {
        match self {
            Self::Jobs => PageKind::Jobs,
            Self::Deployments => PageKind::Deployments,
            Self::Evaluations => PageKind::Evaluations,
            Self::Events { .. } => PageKind::Events,
            Self::Allocations { .. } => PageKind::Allocations,
            Self::JobSpec { .. } => PageKind::JobSpec,
            Self::AllocSpec { .. } => PageKind::AllocSpec,
            Self::Logs { .. } => PageKind::Logs,
        }
    }

    /// Allocation targeted by this page, if any; admin actions need one.
    pub fn alloc_target(&self) -> Option<&AllocTarget> {
        match self {
            Self::AllocSpec { target } | Self::Logs { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn subject(&self) -> Option<String> {
        match self {
            Self::Allocations { job_id, .. } | Self::JobSpec { job_id, .. } => {
                Some(job_id.clone())
            }
            Self::AllocSpec { target } => Some(target.name.clone()),
            Self::Logs { target, stream } => Some(format!(
                "{} {} {}",
                target.name,
                target.task,
                stream.as_str()
            )),
            Self::Events { namespace, .. } => Some(namespace.clone()),
            Self::Jobs | Self::Deployments | Self::Evaluations => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct RequestToken(pub u64);

impl Display for RequestToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum RowKey {
    #[default]
    None,
    Job {
        id: String,
        namespace: String,
    },
    Alloc(AllocTarget),
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Row {
    pub key: RowKey,
    pub cells: Vec<String>,
}

impl Row {
    pub fn line(line: impl Into<String>) -> Self {
        Self {
            key: RowKey::None,
            cells: vec![line.into()],
        }
    }

    pub fn matches_filter(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }

        let query_lower = query.to_lowercase();
        self.cells
            .iter()
            .any(|cell| cell.to_lowercase().contains(&query_lower))
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocTarget, LogStream, PageKind, PageRequest, Row};

    #[test]
    fn filter_is_case_insensitive_across_cells() {
        let row = Row {
            cells: vec!["redis-cache".to_string(), "Running".to_string()],
            ..Row::default()
        };
        assert!(row.matches_filter("CACHE"));
        assert!(row.matches_filter("runn"));
        assert!(!row.matches_filter("pending"));
        assert!(row.matches_filter(""));
    }

    #[test]
    fn only_logs_and_alloc_spec_carry_alloc_targets() {
        let target = AllocTarget {
            id: "a1".to_string(),
            name: "web.web[0]".to_string(),
            task: "server".to_string(),
            job_id: "web".to_string(),
            namespace: "default".to_string(),
        };
        let logs = PageRequest::Logs {
            target: target.clone(),
            stream: LogStream::Stdout,
        };
        assert_eq!(logs.kind(), PageKind::Logs);
        assert_eq!(logs.alloc_target(), Some(&target));
        assert_eq!(PageRequest::Jobs.alloc_target(), None);
    }

    #[test]
    fn events_is_the_only_streaming_tab() {
        let streaming = PageKind::TABS
            .iter()
            .filter(|kind| kind.is_streaming())
            .collect::<Vec<_>>();
        assert_eq!(streaming, vec![&PageKind::Events]);
    }
}
