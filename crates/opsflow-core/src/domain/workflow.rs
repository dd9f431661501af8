use crate::{domain::task::TaskResult, handler::HandlerKind, CoreError, DataBag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Value object: Workflow ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

/// Value object: Step ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

/// Value object: Task ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

/// Workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow is running and may dispatch steps
    Active,

    /// Workflow is paused; no new steps are dispatched
    Paused,

    /// All steps completed successfully
    Completed,

    /// Workflow failed or was cancelled
    Failed,
}

impl WorkflowStatus {
    /// Whether this status is terminal
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not been dispatched yet
    Pending,

    /// Step has been dispatched to its handler
    InProgress,

    /// Step completed successfully
    Completed,

    /// Step failed
    Failed,

    /// Step was skipped (workflow cancelled or an upstream step failed)
    Skipped,
}

impl StepStatus {
    /// Whether this status is terminal
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// The submitted shape of a workflow, before the engine materializes state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Pre-chosen workflow ID; generated when absent
    pub id: Option<WorkflowId>,

    /// Human-readable name of the workflow
    pub name: String,

    /// Description of the workflow
    #[serde(default)]
    pub description: Option<String>,

    /// The steps in this workflow
    pub steps: Vec<StepDefinition>,

    /// Initial shared data for the workflow
    #[serde(default)]
    pub data: DataBag,
}

/// The submitted shape of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Pre-chosen step ID; generated when absent
    pub id: Option<StepId>,

    /// Human-readable name of the step
    pub name: String,

    /// Handler kind that executes this step
    pub handler: HandlerKind,

    /// Action identifier, interpreted by the handler
    pub action: String,

    /// Step-specific configuration merged into the dispatched task
    #[serde(default)]
    pub config: DataBag,

    /// IDs of steps that must complete before this one
    #[serde(default)]
    pub depends_on: Vec<StepId>,
}

impl WorkflowDefinition {
    /// Validate the workflow definition
    ///
    /// Rejects empty workflows, duplicate step ids, dangling `depends_on`
    /// references and dependency cycles. Steps without an explicit id are
    /// ignored by reference checks here; ids are assigned at materialization
    /// and an id-less step cannot be depended on.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.steps.is_empty() {
            return Err(CoreError::DefinitionError(
                "Workflow must have at least one step".to_string(),
            ));
        }

        // Check for ID uniqueness
        let mut step_ids = HashSet::new();
        for step in &self.steps {
            if let Some(id) = &step.id {
                if !step_ids.insert(id.0.as_str()) {
                    return Err(CoreError::DefinitionError(format!(
                        "Duplicate step ID: {}",
                        id.0
                    )));
                }
            }
        }

        // Check for valid depends_on references
        for step in &self.steps {
            for dep in &step.depends_on {
                if !step_ids.contains(dep.0.as_str()) {
                    return Err(CoreError::DefinitionError(format!(
                        "Step {} references non-existent dependency: {}",
                        step.id.as_ref().map(|i| i.0.as_str()).unwrap_or(&step.name),
                        dep.0
                    )));
                }
            }
        }

        self.check_for_cycles()
    }

    /// Check for cycles in the step dependencies
    fn check_for_cycles(&self) -> Result<(), CoreError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        let mut dep_map: HashMap<&str, &Vec<StepId>> = HashMap::new();
        for step in &self.steps {
            if let Some(id) = &step.id {
                dep_map.insert(id.0.as_str(), &step.depends_on);
            }
        }

        // DFS for cycle detection
        for id in dep_map.keys().copied().collect::<Vec<_>>() {
            if Self::is_cyclic(id, &dep_map, &mut visited, &mut rec_stack) {
                return Err(CoreError::DefinitionError(format!(
                    "Cycle detected in step dependencies involving step: {}",
                    id
                )));
            }
        }

        Ok(())
    }

    fn is_cyclic<'a>(
        step_id: &'a str,
        dep_map: &HashMap<&'a str, &'a Vec<StepId>>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
    ) -> bool {
        if !visited.contains(step_id) {
            visited.insert(step_id);
            rec_stack.insert(step_id);

            if let Some(deps) = dep_map.get(step_id) {
                for dep in *deps {
                    let dep_str = dep.0.as_str();
                    if (!visited.contains(dep_str)
                        && Self::is_cyclic(dep_str, dep_map, visited, rec_stack))
                        || rec_stack.contains(dep_str)
                    {
                        return true;
                    }
                }
            }
        }

        rec_stack.remove(step_id);
        false
    }
}

/// One unit of work within a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier within the workflow
    pub id: StepId,

    /// Human-readable name
    pub name: String,

    /// Handler kind that executes this step
    pub handler: HandlerKind,

    /// Action identifier, opaque to the engine
    pub action: String,

    /// Current status
    pub status: StepStatus,

    /// Step-specific configuration
    pub config: DataBag,

    /// IDs of prerequisite steps (non-owning references within the workflow)
    pub depends_on: Vec<StepId>,

    /// Last result attached to this step, if any
    pub result: Option<TaskResult>,
}

/// Aggregate: a named DAG of steps tracked to a terminal status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier
    pub id: WorkflowId,

    /// Human-readable name
    pub name: String,

    /// Description
    pub description: Option<String>,

    /// Steps in declaration order
    pub steps: Vec<Step>,

    /// Shared data bag, read by every dispatched task and written back from
    /// successful results
    pub data: DataBag,

    /// Current status
    pub status: WorkflowStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Completion timestamp; set iff status is terminal
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Materialize a workflow from a validated definition
    ///
    /// Assigns ids to steps lacking one and initializes every step to
    /// pending. The workflow starts out active.
    pub fn from_definition(definition: WorkflowDefinition) -> Self {
        let now = Utc::now();
        let id = definition
            .id
            .unwrap_or_else(|| WorkflowId(Uuid::new_v4().to_string()));

        let steps = definition
            .steps
            .into_iter()
            .map(|def| Step {
                id: def.id.unwrap_or_else(|| StepId(Uuid::new_v4().to_string())),
                name: def.name,
                handler: def.handler,
                action: def.action,
                status: StepStatus::Pending,
                config: def.config,
                depends_on: def.depends_on,
                result: None,
            })
            .collect();

        Self {
            id,
            name: definition.name,
            description: definition.description,
            steps,
            data: definition.data,
            status: WorkflowStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Update the timestamp
    #[inline]
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Find a step by id
    pub fn step(&self, step_id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == step_id)
    }

    /// Find a step by id, mutably
    pub fn step_mut(&mut self, step_id: &StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| &s.id == step_id)
    }

    /// Whether every dependency of the given step is completed
    pub fn dependencies_satisfied(&self, step: &Step) -> bool {
        step.depends_on.iter().all(|dep| {
            self.step(dep)
                .map(|s| s.status == StepStatus::Completed)
                .unwrap_or(false)
        })
    }

    /// The frontier: pending steps whose dependencies are all completed,
    /// in declaration order
    pub fn ready_steps(&self) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending && self.dependencies_satisfied(s))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Pending steps that list the given step as a dependency, in
    /// declaration order
    pub fn pending_dependents_of(&self, step_id: &StepId) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending && s.depends_on.contains(step_id))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Whether every step has reached a terminal status
    pub fn all_steps_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// Whether any step has failed
    pub fn any_step_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// Mark pending steps downstream of failed or skipped steps as skipped
    ///
    /// A pending step whose dependency is failed or skipped can never run;
    /// without this sweep the all-terminal completion check would stall
    /// forever on such descendants.
    pub fn skip_unreachable_steps(&mut self) {
        loop {
            let unreachable: Vec<StepId> = self
                .steps
                .iter()
                .filter(|s| {
                    s.status == StepStatus::Pending
                        && s.depends_on.iter().any(|dep| {
                            self.step(dep)
                                .map(|d| {
                                    matches!(d.status, StepStatus::Failed | StepStatus::Skipped)
                                })
                                .unwrap_or(false)
                        })
                })
                .map(|s| s.id.clone())
                .collect();

            if unreachable.is_empty() {
                break;
            }
            for id in unreachable {
                if let Some(step) = self.step_mut(&id) {
                    step.status = StepStatus::Skipped;
                }
            }
        }
    }

    /// Complete the workflow successfully
    pub fn complete(&mut self) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::LifecycleError(format!(
                "Cannot complete workflow in status: {:?}",
                self.status
            )));
        }
        self.status = WorkflowStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Fail the workflow
    pub fn fail(&mut self) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::LifecycleError(format!(
                "Cannot fail workflow in status: {:?}",
                self.status
            )));
        }
        self.status = WorkflowStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Cancel the workflow: in-progress steps fail, pending steps are
    /// skipped, status becomes failed
    pub fn cancel(&mut self) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::LifecycleError(format!(
                "Cannot cancel workflow in status: {:?}",
                self.status
            )));
        }

        for step in &mut self.steps {
            match step.status {
                StepStatus::InProgress => step.status = StepStatus::Failed,
                StepStatus::Pending => step.status = StepStatus::Skipped,
                _ => {}
            }
        }

        self.status = WorkflowStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }
}
