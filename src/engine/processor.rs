//! Flow processor - runs nodes in order and persists their jobs.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::resolver::resolve_config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::nodes::{JobStatus, NodeContext, NodeRegistry};
use crate::storage::{Job, JobStore};
use crate::workflow::{Flow, FlowNode};

/// Jobs produced by one pass over a flow.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRun {
    pub execution_id: String,
    /// Failed if the pass stopped at a failed job
    pub status: JobStatus,
    pub jobs: Vec<Job>,
}

/// Runs flows against a node registry and a job store.
#[derive(Clone)]
pub struct Processor {
    registry: NodeRegistry,
    jobs: JobStore,
}

impl Processor {
    pub fn new(registry: NodeRegistry, jobs: JobStore) -> Self {
        Self { registry, jobs }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Resolve a node's config, run it, and persist the job.
    pub async fn run_node(&self, node: &FlowNode, ctx: &NodeContext) -> Result<Job> {
        let config = resolve_config(&node.config, ctx);
        let outcome = self.registry.run(&node.node_type, &config, ctx).await;

        let job = Job::new(&ctx.execution_id, &node.id, &node.node_type, outcome);
        self.jobs.save_job(&job).await?;
        metrics::record_job(&job.node_type, &job.status.to_string());

        info!(
            execution_id = %job.execution_id,
            node_id = %job.node_id,
            job_id = %job.id,
            status = %job.status,
            "Job saved"
        );
        Ok(job)
    }

    /// Run a flow from the first node.
    ///
    /// Stops at the first failed job; a job resolved under ignore-failure
    /// lets the flow continue.
    pub async fn run_flow(&self, flow: &Flow, input: Value) -> Result<FlowRun> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        info!(flow = %flow.name, execution_id = %execution_id, "Starting flow");

        self.continue_flow(flow, execution_id, input, 0, HashMap::new(), Value::Null, Vec::new())
            .await
    }

    /// Re-enter a node on one of its stored jobs.
    ///
    /// Templates in the node config resolve against an empty context. The
    /// read-modify-write happens under the job store lock.
    pub async fn resume_job(&self, node: &FlowNode, job_id: &str) -> Result<Job> {
        let ctx = NodeContext::new("", &node.id);
        let (_, job) = self.resume_in_context(node, job_id, &ctx).await?;
        Ok(job)
    }

    /// Resume a job and report the status it had when the store lock was
    /// taken, so concurrent resumes see exactly one Failed to Resolved flip.
    async fn resume_in_context(
        &self,
        node: &FlowNode,
        job_id: &str,
        ctx: &NodeContext,
    ) -> Result<(JobStatus, Job)> {
        let handler = self
            .registry
            .get(&node.node_type)
            .ok_or_else(|| Error::Node(format!("Unknown node type: {}", node.node_type)))?;

        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Job \"{}\" not found", job_id)))?;
        if job.node_id != node.id {
            return Err(Error::Node(format!(
                "Job \"{}\" belongs to node \"{}\", not \"{}\"",
                job_id, job.node_id, node.id
            )));
        }

        let config = resolve_config(&node.config, ctx);
        let mut before = job.status;
        let job = self
            .jobs
            .update_job(job_id, |outcome| {
                before = outcome.status;
                handler.resume(&config, outcome)
            })
            .await?;

        info!(
            job_id = %job.id,
            node_id = %job.node_id,
            from = %before,
            to = %job.status,
            "Job resumed"
        );
        Ok((before, job))
    }

    /// Resume a stored job and, if that flips it from failed to resolved,
    /// run the rest of the flow after it.
    ///
    /// The node config resolves against `input` and the outputs of the
    /// execution's resolved jobs. Resuming a job that was already resolved,
    /// or that stays failed, runs nothing and returns the stored jobs.
    pub async fn resume_flow(&self, flow: &Flow, job_id: &str, input: Value) -> Result<FlowRun> {
        let stored = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Job \"{}\" not found", job_id)))?;
        let index = flow
            .nodes
            .iter()
            .position(|n| n.id == stored.node_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Node \"{}\" not found in flow \"{}\"",
                    stored.node_id, flow.name
                ))
            })?;
        let node = &flow.nodes[index];

        let mut outputs = HashMap::new();
        let mut previous = Value::Null;
        for job in self.jobs.list_jobs(&stored.execution_id).await? {
            if job.id == stored.id || job.status != JobStatus::Resolved {
                continue;
            }
            if index > 0 && job.node_id == flow.nodes[index - 1].id {
                previous = job.result.clone();
            }
            outputs.insert(job.node_id, job.result);
        }

        let mut ctx = NodeContext::new(&stored.execution_id, &node.id)
            .with_input(input.clone())
            .with_previous(previous);
        ctx.node_outputs = outputs.clone();

        let (before, resumed) = self.resume_in_context(node, job_id, &ctx).await?;

        if before != JobStatus::Failed || resumed.status != JobStatus::Resolved {
            if resumed.status == JobStatus::Failed {
                warn!(job_id = %resumed.id, "Job still failed after resume");
            }
            let jobs = self.jobs.list_jobs(&stored.execution_id).await?;
            let status = if jobs.iter().any(|j| j.status == JobStatus::Failed) {
                JobStatus::Failed
            } else {
                JobStatus::Resolved
            };
            return Ok(FlowRun {
                execution_id: stored.execution_id,
                status,
                jobs,
            });
        }

        outputs.insert(resumed.node_id.clone(), resumed.result.clone());
        let previous = resumed.result.clone();
        let resumed_id = resumed.id.clone();
        let jobs = self
            .jobs
            .list_jobs(&stored.execution_id)
            .await?
            .into_iter()
            .filter(|j| j.id != resumed_id)
            .chain(std::iter::once(resumed))
            .collect();
        self.continue_flow(flow, stored.execution_id, input, index + 1, outputs, previous, jobs)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn continue_flow(
        &self,
        flow: &Flow,
        execution_id: String,
        input: Value,
        start: usize,
        mut outputs: HashMap<String, Value>,
        mut previous: Value,
        mut jobs: Vec<Job>,
    ) -> Result<FlowRun> {
        for node in flow.nodes.iter().skip(start) {
            let existing = jobs
                .iter()
                .find(|j| j.node_id == node.id)
                .map(|j| (j.status, j.result.clone()));
            if let Some((status, result)) = existing {
                if status == JobStatus::Failed {
                    return Ok(FlowRun {
                        execution_id,
                        status: JobStatus::Failed,
                        jobs,
                    });
                }
                previous = result;
                continue;
            }

            let mut ctx = NodeContext::new(&execution_id, &node.id)
                .with_input(input.clone())
                .with_previous(previous.clone());
            ctx.node_outputs = outputs.clone();

            let job = self.run_node(node, &ctx).await?;
            let failed = job.status == JobStatus::Failed;

            outputs.insert(node.id.clone(), job.result.clone());
            previous = job.result.clone();
            jobs.push(job);

            if failed {
                warn!(
                    flow = %flow.name,
                    execution_id = %execution_id,
                    node_id = %node.id,
                    "Flow stopped at failed job"
                );
                return Ok(FlowRun {
                    execution_id,
                    status: JobStatus::Failed,
                    jobs,
                });
            }
        }

        info!(flow = %flow.name, execution_id = %execution_id, jobs = jobs.len(), "Flow resolved");
        Ok(FlowRun {
            execution_id,
            status: JobStatus::Resolved,
            jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::collections::{
        CollectionSchema, CollectionService, FieldDefinition, FieldKind, MemoryCollections,
    };
    use crate::workflow::parse_flow;
    use serde_json::json;

    async fn processor() -> (Processor, MemoryCollections) {
        let schema = CollectionSchema::new("tasks")
            .with_field(FieldDefinition::scalar("title"))
            .with_field(FieldDefinition::scalar("status"))
            .with_field(FieldDefinition::scalar("assigneeId"))
            .with_field(
                FieldDefinition::relation("assignee", FieldKind::BelongsTo, "users")
                    .with_foreign_key("assigneeId"),
            );
        let service = MemoryCollections::new(vec![schema]);
        service
            .collection("tasks")
            .unwrap()
            .insert_raw(json!({"id": 1, "title": "T", "status": "open", "assigneeId": 5}))
            .await
            .unwrap();

        let registry = NodeRegistry::with_collections(Arc::new(service.clone()));
        let processor = Processor::new(registry, JobStore::open_in_memory().unwrap());
        (processor, service)
    }

    const CHAIN: &str = r#"
name: chain
nodes:
  - id: first
    type: duplicate-record
    config:
      collection_name: tasks
      source_record_id: "{{ input.task_id }}"
      overrides:
        - field: status
          value: "copied {{ input.task_id }}"
  - id: second
    type: duplicate-record
    config:
      collection_name: tasks
"#;

    #[tokio::test]
    async fn test_run_flow_chains_previous_result() {
        let (processor, service) = processor().await;
        let flow = parse_flow(CHAIN).unwrap();

        let run = processor.run_flow(&flow, json!({"task_id": 1})).await.unwrap();
        assert_eq!(run.status, JobStatus::Resolved);
        assert_eq!(run.jobs.len(), 2);

        let first = &run.jobs[0];
        assert_eq!(first.result["id"], 2);
        assert_eq!(first.result["status"], "copied 1");

        // second node has no source id and falls back to the first's result
        let second = &run.jobs[1];
        assert_eq!(second.result["id"], 3);
        assert_eq!(second.result["status"], "copied 1");
        assert_eq!(second.result["assigneeId"], 5);

        let tasks = service.get_collection("tasks").unwrap();
        assert!(tasks.find_one(&json!(3)).await.unwrap().is_some());

        let stored = processor.jobs().list_jobs(&run.execution_id).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_flow_stops_at_failure_then_resumes() {
        let (processor, _) = processor().await;
        let flow = parse_flow(
            r#"
name: stop
nodes:
  - id: broken
    type: duplicate-record
    config:
      collection_name: tasks
      source_record_id: 404
      ignore_failure: false
  - id: after
    type: duplicate-record
    config:
      collection_name: tasks
      source_record_id: 1
"#,
        )
        .unwrap();

        let run = processor.run_flow(&flow, Value::Null).await.unwrap();
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.jobs.len(), 1);
        let failed = &run.jobs[0];
        assert_eq!(
            failed.result["message"],
            "Source record with ID \"404\" not found in collection \"tasks\""
        );

        // ignore_failure is false: resume leaves the job failed
        let rerun = processor.resume_flow(&flow, &failed.id, Value::Null).await.unwrap();
        assert_eq!(rerun.status, JobStatus::Failed);
        assert_eq!(rerun.jobs.len(), 1);

        // operator flips the node to ignore failures, then resumes
        let mut relaxed = flow.clone();
        relaxed.nodes[0].config["ignore_failure"] = json!(true);
        let rerun = processor.resume_flow(&relaxed, &failed.id, Value::Null).await.unwrap();
        assert_eq!(rerun.status, JobStatus::Resolved);
        assert_eq!(rerun.jobs.len(), 2);
        assert_eq!(rerun.jobs[0].status, JobStatus::Resolved);
        assert_eq!(rerun.jobs[0].result, failed.result);
        assert_eq!(rerun.jobs[1].node_id, "after");
        assert_eq!(rerun.jobs[1].result["title"], "T");
    }

    #[tokio::test]
    async fn test_ignored_failure_continues_flow() {
        let (processor, _) = processor().await;
        let flow = parse_flow(
            r#"
name: tolerant
nodes:
  - id: missing
    type: duplicate-record
    config:
      collection_name: projects
      source_record_id: 1
      ignore_failure: true
  - id: next
    type: duplicate-record
    config:
      collection_name: tasks
      source_record_id: 1
"#,
        )
        .unwrap();

        let run = processor.run_flow(&flow, Value::Null).await.unwrap();
        assert_eq!(run.status, JobStatus::Resolved);
        assert_eq!(run.jobs[0].result["message"], "Collection \"projects\" not found");
        assert_eq!(run.jobs[1].result["title"], "T");
    }

    #[tokio::test]
    async fn test_resume_job_errors() {
        let (processor, _) = processor().await;
        let flow = parse_flow(CHAIN).unwrap();

        let err = processor.resume_job(&flow.nodes[0], "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let run = processor.run_flow(&flow, json!({"task_id": 1})).await.unwrap();
        let err = processor
            .resume_job(&flow.nodes[1], &run.jobs[0].id)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("belongs to node"));

        let unknown = FlowNode {
            id: "first".to_string(),
            node_type: "teleport".to_string(),
            config: Value::Null,
        };
        let err = processor.resume_job(&unknown, &run.jobs[0].id).await.unwrap_err();
        assert_eq!(err.code(), "NODE_ERROR");
    }

    #[tokio::test]
    async fn test_resume_resolved_job_is_noop() {
        let (processor, _) = processor().await;
        let flow = parse_flow(CHAIN).unwrap();
        let run = processor.run_flow(&flow, json!({"task_id": 1})).await.unwrap();
        let job = &run.jobs[0];

        let resumed = processor.resume_job(&flow.nodes[0], &job.id).await.unwrap();
        assert_eq!(resumed.status, JobStatus::Resolved);
        assert_eq!(resumed.result, job.result);
        assert_eq!(resumed.updated_at, job.updated_at);
    }

    #[tokio::test]
    async fn test_resume_flow_on_resolved_job_runs_nothing() {
        let (processor, service) = processor().await;
        let tasks = service.collection("tasks").unwrap();
        let flow = parse_flow(CHAIN).unwrap();
        let run = processor.run_flow(&flow, json!({"task_id": 1})).await.unwrap();
        assert_eq!(tasks.len().await, 3);

        for _ in 0..2 {
            let rerun = processor
                .resume_flow(&flow, &run.jobs[0].id, json!({"task_id": 1}))
                .await
                .unwrap();
            assert_eq!(rerun.status, JobStatus::Resolved);
            assert_eq!(rerun.execution_id, run.execution_id);
            let ids: Vec<&str> = rerun.jobs.iter().map(|j| j.id.as_str()).collect();
            assert_eq!(ids, vec![run.jobs[0].id.as_str(), run.jobs[1].id.as_str()]);
        }

        assert_eq!(tasks.len().await, 3);
        let stored = processor.jobs().list_jobs(&run.execution_id).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_resume_flow_twice_continues_once() {
        let (processor, service) = processor().await;
        let tasks = service.collection("tasks").unwrap();
        let flow = parse_flow(
            r#"
name: retry
nodes:
  - id: broken
    type: duplicate-record
    config:
      collection_name: tasks
      source_record_id: 404
      ignore_failure: "{{ input.tolerate }}"
  - id: after
    type: duplicate-record
    config:
      collection_name: tasks
      source_record_id: 1
"#,
        )
        .unwrap();

        let run = processor
            .run_flow(&flow, json!({"tolerate": false}))
            .await
            .unwrap();
        assert_eq!(run.status, JobStatus::Failed);
        let failed_id = run.jobs[0].id.clone();

        // the templated flag resolves against the resume input
        let rerun = processor
            .resume_flow(&flow, &failed_id, json!({"tolerate": true}))
            .await
            .unwrap();
        assert_eq!(rerun.status, JobStatus::Resolved);
        assert_eq!(rerun.jobs.len(), 2);
        assert_eq!(tasks.len().await, 2);

        let again = processor
            .resume_flow(&flow, &failed_id, json!({"tolerate": true}))
            .await
            .unwrap();
        assert_eq!(again.status, JobStatus::Resolved);
        assert_eq!(again.jobs.len(), 2);
        assert_eq!(again.jobs[1].id, rerun.jobs[1].id);
        assert_eq!(tasks.len().await, 2);
    }

    #[tokio::test]
    async fn test_resume_job_templated_flag_without_context() {
        let (processor, _) = processor().await;
        let flow = parse_flow(
            r#"
name: templated
nodes:
  - id: broken
    type: duplicate-record
    config:
      collection_name: tasks
      source_record_id: 404
      ignore_failure: "{{ input.tolerate }}"
"#,
        )
        .unwrap();
        let run = processor
            .run_flow(&flow, json!({"tolerate": false}))
            .await
            .unwrap();

        // no input to resolve against: the flag reads as false
        let job = processor.resume_job(&flow.nodes[0], &run.jobs[0].id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }
}
