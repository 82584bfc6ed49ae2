//! Orchestrator end-to-end tests over a scripted container runtime

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use spacectl::deploy::docker::ContainerRuntime;
use spacectl::deploy::fsm::DeploymentState;
use spacectl::deploy::resolver::ContainerResolver;
use spacectl::deploy::runner::CommandRunner;
use spacectl::deploy::{Orchestrator, StepRequest};
use spacectl::errors::ServerError;
use spacectl::models::deployment::{StepKind, StepStatus};
use spacectl::models::project::{Project, Space};
use spacectl::storage::settings::TerraformSettings;
use spacectl::store::{DeploymentStore, MemoryDeploymentStore, MemoryProjectStore, ProjectStore};

use openapi_server::models::TerraformSummary;

use crate::fakes::{terraform_runtime, BrokenRuntime, FakeRuntime};

struct Harness {
    orchestrator: Orchestrator,
    deployments: Arc<MemoryDeploymentStore>,
    projects: Arc<MemoryProjectStore>,
}

fn demo_project() -> Project {
    let mut project = Project::new("p-1", "demo");
    project.owner_id = Some("u-1".to_string());
    project.profile = Some("dev-profile".to_string());
    project.spaces = vec![
        Space {
            space_id: "s-1".to_string(),
            space_name: "network".to_string(),
        },
        Space {
            space_id: "s-2".to_string(),
            space_name: "compute".to_string(),
        },
    ];
    project
}

async fn harness_with(
    runtime: Arc<dyn ContainerRuntime>,
    container_id: Option<&str>,
    image_name: Option<&str>,
) -> Harness {
    let projects = Arc::new(MemoryProjectStore::new());
    let deployments = Arc::new(MemoryDeploymentStore::new());
    projects.save_project(demo_project()).await.unwrap();
    projects.save_project(Project::new("p-2", "other")).await.unwrap();

    let resolver = ContainerResolver::new(
        runtime.clone(),
        container_id.map(str::to_string),
        image_name.map(str::to_string),
    );
    let orchestrator = Orchestrator::new(
        projects.clone(),
        deployments.clone(),
        resolver,
        CommandRunner::new(runtime),
        TerraformSettings::default(),
    );

    Harness {
        orchestrator,
        deployments,
        projects,
    }
}

async fn harness(runtime: Arc<FakeRuntime>) -> Harness {
    harness_with(runtime, None, Some("tf-runner:latest")).await
}

#[tokio::test]
async fn test_init_plan_replan_scenario() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime.clone()).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let deployment_id = init.deployment.deployment_id.clone();
    let id_format = Regex::new(r"^bagel-dep-\d{8}-demo-network-[0-9a-f]{8}$").unwrap();
    assert!(id_format.is_match(&deployment_id), "{}", deployment_id);
    assert!(init
        .deployment
        .deployment_name
        .starts_with("demo network Deployment-"));
    assert_eq!(init.deployment.steps.len(), 1);
    assert_eq!(init.deployment.steps[0].step, StepKind::Init);
    assert_eq!(init.output.exit_code, Some(0));
    assert_eq!(init.deployment.state, DeploymentState::Initialized);

    let init_step = init.deployment.steps[0].clone();

    let plan = h
        .orchestrator
        .plan("p-1", StepRequest::new("network", Some(deployment_id.clone())))
        .await
        .unwrap();
    assert_eq!(plan.deployment.steps.len(), 2);
    assert_eq!(plan.deployment.steps[0], init_step);
    assert_eq!(plan.deployment.steps[1].step, StepKind::Plan);
    assert_eq!(
        plan.summary,
        Some(TerraformSummary::Plan {
            to_add: 2,
            to_change: 1,
            to_destroy: 1
        })
    );
    assert!(plan.structured_data.is_some());
    assert_eq!(plan.deployment.state, DeploymentState::Planned);

    let replan = h
        .orchestrator
        .plan("p-1", StepRequest::new("network", Some(deployment_id.clone())))
        .await
        .unwrap();
    assert_eq!(replan.deployment.steps.len(), 2);
    assert_eq!(replan.deployment.history.len(), 3);
    assert_eq!(
        replan.deployment.deployment_name,
        init.deployment.deployment_name
    );

    let stored = h.deployments.get_deployment(&deployment_id).await.unwrap().unwrap();
    assert_eq!(stored.steps.len(), 2);
    assert_eq!(stored.started_at, init.deployment.started_at);
    assert!(stored.finished_at.is_none());
}

#[tokio::test]
async fn test_plan_message_and_data_come_from_separate_runs() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime.clone()).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let plan = h
        .orchestrator
        .plan(
            "p-1",
            StepRequest::new("network", Some(init.deployment.deployment_id.clone())),
        )
        .await
        .unwrap();

    let step = plan.deployment.step(StepKind::Plan).unwrap();
    assert!(step.message.contains("Plan: 2 to add"));
    let data = step.structured_data.as_ref().unwrap();
    assert_eq!(data["resource_changes"].as_array().unwrap().len(), 3);

    let response = plan.to_response();
    assert_eq!(response.step_name, "Plan");
    assert_eq!(response.raw_format, plan.output.stdout);

    // init, human plan, json plan
    let calls = runtime.calls();
    assert_eq!(calls.len(), 3);
    let json_words = calls[2].words();
    assert!(json_words.contains(&"-out=tfplan".to_string()));
    assert!(json_words.ends_with(&["show".to_string(), "-json".to_string(), "tfplan".to_string()]));
}

#[tokio::test]
async fn test_unparsable_json_plan_is_tolerated() {
    let runtime = terraform_runtime()
        .respond("terraform show", 0, "not json", "")
        .shared();
    let h = harness(runtime).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let plan = h
        .orchestrator
        .plan(
            "p-1",
            StepRequest::new("network", Some(init.deployment.deployment_id)),
        )
        .await
        .unwrap();

    assert!(plan.structured_data.is_none());
    let step = plan.deployment.step(StepKind::Plan).unwrap();
    assert_eq!(step.step_status, StepStatus::Successful);
    assert!(step.structured_data.is_none());
}

#[tokio::test]
async fn test_failed_command_is_a_normal_outcome() {
    let runtime = terraform_runtime()
        .respond("terraform init", 1, "", "Error: Failed to query available provider packages\n")
        .shared();
    let h = harness(runtime).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();

    assert_eq!(init.output.exit_code, Some(1));
    assert_eq!(init.output.step_status(), StepStatus::Failed);
    assert_eq!(init.deployment.steps[0].step_status, StepStatus::Failed);
    assert!(init.deployment.steps[0].message.contains("Failed to query"));
    assert_eq!(init.deployment.state, DeploymentState::Failed);
    assert_eq!(init.to_response().step_status, "failed");
}

#[tokio::test]
async fn test_reinit_replaces_init_step() {
    let runtime = terraform_runtime()
        .respond("terraform init", 1, "first attempt", "")
        .shared();
    let h = harness(runtime.clone()).await;

    let first = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let id = first.deployment.deployment_id.clone();

    runtime.set_response("terraform init", 0, "second attempt", "");
    let second = h
        .orchestrator
        .init("p-1", StepRequest::new("network", Some(id.clone())))
        .await
        .unwrap();

    assert_eq!(second.deployment.deployment_id, id);
    assert_eq!(second.deployment.steps.len(), 1);
    assert_eq!(second.deployment.steps[0].message, "second attempt");
    assert_eq!(second.deployment.steps[0].step_status, StepStatus::Successful);
    assert_eq!(second.deployment.history.len(), 2);
}

#[tokio::test]
async fn test_apply_and_destroy() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let id = init.deployment.deployment_id.clone();

    let apply = h
        .orchestrator
        .apply("p-1", StepRequest::new("network", Some(id.clone())))
        .await
        .unwrap();
    assert_eq!(
        apply.summary,
        Some(TerraformSummary::Apply {
            added: 2,
            changed: 1,
            destroyed: 1
        })
    );
    assert_eq!(apply.command, "terraform apply -auto-approve -input=false -no-color");
    assert!(apply.deployment.finished_at.is_some());
    assert_eq!(apply.deployment.state, DeploymentState::Applied);
    assert!(apply.deployment.step(StepKind::Apply).unwrap().structured_data.is_none());

    let destroy = h
        .orchestrator
        .destroy("p-1", StepRequest::new("network", Some(id)))
        .await
        .unwrap();
    assert_eq!(destroy.summary, Some(TerraformSummary::Destroy { destroyed: 3 }));
    assert_eq!(destroy.deployment.state, DeploymentState::Destroyed);
    assert_eq!(destroy.deployment.steps.len(), 3);
}

#[tokio::test]
async fn test_validation_runs_before_any_command() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime.clone()).await;

    let missing_space = h.orchestrator.init("p-1", StepRequest::default()).await;
    assert!(matches!(missing_space, Err(ServerError::MissingParameter(ref p)) if p == "spaceName"));

    let escaping = h
        .orchestrator
        .init("p-1", StepRequest::new("../other", None))
        .await;
    assert!(matches!(escaping, Err(ServerError::InvalidParameter(_))));

    let missing_id = h
        .orchestrator
        .plan("p-1", StepRequest::new("network", None))
        .await;
    assert!(matches!(missing_id, Err(ServerError::MissingParameter(ref p)) if p == "deploymentId"));

    let no_project = h
        .orchestrator
        .init("p-404", StepRequest::new("network", None))
        .await;
    assert!(matches!(no_project, Err(ServerError::ProjectNotFound(_))));

    let no_deployment = h
        .orchestrator
        .apply("p-1", StepRequest::new("network", Some("dep-404".to_string())))
        .await;
    assert!(matches!(no_deployment, Err(ServerError::DeploymentNotFound(_))));

    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_deployment_of_another_project_is_not_found() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let result = h
        .orchestrator
        .plan(
            "p-2",
            StepRequest::new("network", Some(init.deployment.deployment_id)),
        )
        .await;
    assert!(matches!(result, Err(ServerError::DeploymentNotFound(_))));
}

#[tokio::test]
async fn test_cancel_requires_plan_step() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime.clone()).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let id = init.deployment.deployment_id.clone();

    let result = h.orchestrator.cancel_plan("p-1", Some(&id)).await;
    assert!(matches!(result, Err(ServerError::StepNotFound(_))));
    let unchanged = h.deployments.get_deployment(&id).await.unwrap().unwrap();
    assert_eq!(unchanged.updated_at, init.deployment.updated_at);
    assert_eq!(unchanged.history.len(), 1);

    h.orchestrator
        .plan("p-1", StepRequest::new("network", Some(id.clone())))
        .await
        .unwrap();
    let calls_before = runtime.calls().len();

    let cancelled = h.orchestrator.cancel_plan("p-1", Some(&id)).await.unwrap();
    assert_eq!(
        cancelled.step(StepKind::Plan).unwrap().step_status,
        StepStatus::Cancelled
    );
    assert_eq!(cancelled.state, DeploymentState::Cancelled);
    assert_eq!(cancelled.steps.len(), 2);
    assert_eq!(runtime.calls().len(), calls_before);

    let missing = h.orchestrator.cancel_plan("p-1", None).await;
    assert!(matches!(missing, Err(ServerError::MissingParameter(_))));
}

#[tokio::test]
async fn test_environment_and_workspace() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime.clone()).await;

    h.orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();

    let call = &runtime.calls()[0];
    assert_eq!(call.container_id, "c-1");
    assert_eq!(call.env_value("TF_IN_AUTOMATION"), Some("true"));
    assert_eq!(call.env_value("FORCE_COLOR"), Some("0"));
    assert_eq!(call.env_value("AWS_PROFILE"), Some("dev-profile"));
    assert_eq!(
        call.words(),
        vec![
            "cd",
            "/workspace/demo/network",
            "&&",
            "terraform",
            "init",
            "-input=false",
            "-no-color"
        ]
    );
}

#[tokio::test]
async fn test_workspace_with_shell_metacharacters() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime.clone()).await;

    let space = "net $HOME `id`; 'x'";
    h.orchestrator
        .init("p-1", StepRequest::new(space, None))
        .await
        .unwrap();

    let words = runtime.calls()[0].words();
    assert_eq!(words[1], format!("/workspace/demo/{}", space));
    assert_eq!(words[2], "&&");
}

#[tokio::test]
async fn test_container_resolution_failures() {
    let runtime = FakeRuntime::new().with_container("c-9", "postgres:16").shared();
    let h = harness(runtime.clone()).await;
    let result = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await;
    assert!(matches!(result, Err(ServerError::NoContainerFound(_))));
    assert!(runtime.calls().is_empty());

    let h = harness_with(runtime.clone(), None, None).await;
    let result = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await;
    assert!(matches!(result, Err(ServerError::ConfigError(_))));

    // a fixed container id skips the lookup
    let h = harness_with(runtime.clone(), Some("fixed"), None).await;
    h.orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    assert_eq!(runtime.calls()[0].container_id, "fixed");

    // nothing is stored when resolution fails
    let listed = h
        .deployments
        .list_deployments(&Default::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_transport_error_surfaces() {
    let h = harness_with(Arc::new(BrokenRuntime), Some("c-1"), None).await;
    let result = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, ServerError::CommandTransport(_)));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_same_workspace_runs_are_serialized() {
    let runtime = terraform_runtime()
        .with_delay(Duration::from_millis(20))
        .shared();
    let h = harness(runtime.clone()).await;

    let (a, b) = tokio::join!(
        h.orchestrator.init("p-1", StepRequest::new("network", None)),
        h.orchestrator.init("p-1", StepRequest::new("network", None)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(runtime.max_running(), 1);
    assert_ne!(a.deployment.deployment_id, b.deployment.deployment_id);
    assert_ne!(a.deployment.deployment_name, b.deployment.deployment_name);
}

#[tokio::test]
async fn test_different_workspaces_run_concurrently() {
    let runtime = terraform_runtime()
        .with_delay(Duration::from_millis(20))
        .shared();
    let h = harness(runtime.clone()).await;

    let (a, b) = tokio::join!(
        h.orchestrator.init("p-1", StepRequest::new("network", None)),
        h.orchestrator.init("p-1", StepRequest::new("compute", None)),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(runtime.max_running(), 2);
}

#[tokio::test]
async fn test_summary_projection() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let id = init.deployment.deployment_id.clone();

    let empty = h.orchestrator.summary(&id).await.unwrap();
    assert!(empty.summary.resources_provisioned.is_empty());

    h.orchestrator
        .plan("p-1", StepRequest::new("network", Some(id.clone())))
        .await
        .unwrap();
    let summary = h.orchestrator.summary(&id).await.unwrap();
    assert_eq!(summary.summary.resources_provisioned.len(), 2);
    assert_eq!(summary.summary.resources_changed.len(), 1);
    assert_eq!(summary.summary.resources_destroyed.len(), 1);
    assert_eq!(summary.summary.resources_destroyed[0].address, "aws_subnet.a");
    assert_eq!(summary.steps.len(), 2);

    let missing = h.orchestrator.summary("dep-404").await;
    assert!(matches!(missing, Err(ServerError::DeploymentNotFound(_))));
}

#[tokio::test]
async fn test_space_statuses_and_delete() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime).await;

    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let id = init.deployment.deployment_id.clone();

    let spaces = h.orchestrator.space_statuses("p-1").await.unwrap();
    assert_eq!(spaces.len(), 2);
    assert_eq!(spaces[0].space_name, "network");
    assert_eq!(spaces[0].status, "deployed");
    assert_eq!(spaces[0].deployment_id.as_deref(), Some(id.as_str()));
    assert_eq!(spaces[0].last_run, Some(init.deployment.started_at));
    assert_eq!(spaces[1].status, "not yet deployed");
    assert!(spaces[1].last_run.is_none());

    let forbidden = h
        .orchestrator
        .delete_deployment("p-1", &id, Some("u-2"))
        .await;
    assert!(matches!(forbidden, Err(ServerError::Forbidden(_))));

    let wrong_project = h
        .orchestrator
        .delete_deployment("p-2", &id, Some("u-1"))
        .await;
    assert!(matches!(wrong_project, Err(ServerError::Forbidden(_))));

    h.orchestrator
        .delete_deployment("p-1", &id, Some("u-1"))
        .await
        .unwrap();
    assert!(h.deployments.get_deployment(&id).await.unwrap().is_none());

    let again = h
        .orchestrator
        .delete_deployment("p-1", &id, Some("u-1"))
        .await;
    assert!(matches!(again, Err(ServerError::DeploymentNotFound(_))));

    assert!(h.projects.find_project("p-1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_reset_branch_syncs_spaces_with_folders() {
    let runtime = terraform_runtime()
        .respond("find .", 0, "./network\n./storage\n", "")
        .shared();
    let h = harness(runtime.clone()).await;

    let reset = h.orchestrator.reset_branch("p-1").await.unwrap();
    assert_eq!(reset.branch, "main");
    assert_eq!(reset.changes.added, vec!["storage"]);
    assert_eq!(reset.changes.removed, vec!["compute"]);

    let response = reset.to_response();
    assert_eq!(response.message, "Repo reset to origin/main and spaces synced");
    assert_eq!(response.spaces.len(), 2);

    let stored = h.projects.find_project("p-1").await.unwrap().unwrap();
    let names: Vec<&str> = stored.spaces.iter().map(|s| s.space_name.as_str()).collect();
    assert_eq!(names, vec!["network", "storage"]);
    assert_eq!(stored.spaces[0].space_id, "s-1");

    let calls = runtime.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].words(), vec!["cd", "/workspace", "&&", "test", "-d", "demo"]);
    assert_eq!(
        calls[1].words(),
        vec![
            "cd", "/workspace/demo", "&&", "git", "fetch", "origin", "main", "&&", "git",
            "reset", "--hard", "origin/main", "&&", "git", "clean", "-fd",
        ]
    );
    assert!(calls[2].script.starts_with("cd /workspace/demo && find ."));
    assert!(calls.iter().all(|c| c.container_id == "c-1"));
}

#[tokio::test]
async fn test_reset_branch_uses_project_branch() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime.clone()).await;
    let mut project = h.projects.find_project("p-2").await.unwrap().unwrap();
    project.branch = Some("release".to_string());
    h.projects.save_project(project).await.unwrap();

    let reset = h.orchestrator.reset_branch("p-2").await.unwrap();
    assert_eq!(reset.branch, "release");
    assert!(runtime.calls()[1].script.contains("git reset --hard origin/release"));

    let mut project = h.projects.find_project("p-2").await.unwrap().unwrap();
    project.branch = Some("--upload-pack=x".to_string());
    h.projects.save_project(project).await.unwrap();
    let result = h.orchestrator.reset_branch("p-2").await;
    assert!(matches!(result, Err(ServerError::InvalidParameter(_))));
}

#[tokio::test]
async fn test_reset_branch_failures_leave_spaces_alone() {
    let runtime = terraform_runtime().respond("test -d", 1, "", "").shared();
    let h = harness(runtime.clone()).await;

    let missing = h.orchestrator.reset_branch("p-1").await;
    assert!(matches!(missing, Err(ServerError::InvalidParameter(ref m)) if m.contains("/workspace/demo")));
    assert_eq!(runtime.calls().len(), 1);

    runtime.set_response("test -d", 0, "", "");
    runtime.set_response("git fetch", 128, "", "fatal: couldn't find remote ref main\n");
    let failed = h.orchestrator.reset_branch("p-1").await;
    assert!(
        matches!(failed, Err(ServerError::CommandFailed(ref m)) if m.contains("couldn't find remote ref"))
    );
    assert!(!runtime.calls().iter().any(|c| c.script.contains("find .")));

    let stored = h.projects.find_project("p-1").await.unwrap().unwrap();
    assert_eq!(stored.spaces.len(), 2);

    let unknown = h.orchestrator.reset_branch("p-404").await;
    assert!(matches!(unknown, Err(ServerError::ProjectNotFound(_))));
}

#[tokio::test]
async fn test_delete_project_removes_checkout_and_deployments() {
    let runtime = terraform_runtime().shared();
    let h = harness(runtime.clone()).await;
    let init = h
        .orchestrator
        .init("p-1", StepRequest::new("network", None))
        .await
        .unwrap();
    let id = init.deployment.deployment_id.clone();

    let anonymous = h.orchestrator.delete_project("p-1", None).await;
    assert!(matches!(anonymous, Err(ServerError::MissingParameter(_))));
    let forbidden = h.orchestrator.delete_project("p-1", Some("u-2")).await;
    assert!(matches!(forbidden, Err(ServerError::Forbidden(_))));
    assert_eq!(runtime.calls().len(), 1);

    let deleted = h.orchestrator.delete_project("p-1", Some("u-1")).await.unwrap();
    assert_eq!(deleted.project_name, "demo");

    let removal = runtime.calls().last().cloned().unwrap();
    assert_eq!(removal.words(), vec!["cd", "/workspace", "&&", "rm", "-rf", "--", "demo"]);
    assert!(h.projects.find_project("p-1").await.unwrap().is_none());
    assert!(h.deployments.get_deployment(&id).await.unwrap().is_none());
    assert!(h.projects.find_project("p-2").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_project_survives_failed_removal() {
    let runtime = terraform_runtime()
        .respond("rm -rf", 1, "", "rm: cannot remove 'demo': Device or resource busy\n")
        .shared();
    let h = harness(runtime).await;

    h.orchestrator.delete_project("p-1", Some("u-1")).await.unwrap();
    assert!(h.projects.find_project("p-1").await.unwrap().is_none());

    // without a container nothing is deleted
    let h = harness_with(terraform_runtime().shared(), None, None).await;
    let result = h.orchestrator.delete_project("p-1", Some("u-1")).await;
    assert!(matches!(result, Err(ServerError::ConfigError(_))));
    assert!(h.projects.find_project("p-1").await.unwrap().is_some());
}
