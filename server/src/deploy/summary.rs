//! Resource summary projection
//!
//! Buckets the `resource_changes` of the current plan's structured data by
//! action. A replace (`["delete", "create"]`) lands in two buckets.

use openapi_server::models::{ResourceRef, ResourceSummary};
use serde_json::Value;

use crate::models::deployment::{Deployment, StepKind};

/// Project the current plan step of `deployment` into a resource summary.
///
/// Empty when there is no plan step or it carries no structured data.
pub fn project(deployment: &Deployment) -> ResourceSummary {
    let mut summary = ResourceSummary::default();

    let changes = deployment
        .step(StepKind::Plan)
        .and_then(|plan| plan.structured_data.as_ref())
        .and_then(|data| data.get("resource_changes"))
        .and_then(Value::as_array);
    let Some(changes) = changes else {
        return summary;
    };

    for change in changes {
        let actions: Vec<&str> = change
            .pointer("/change/actions")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let resource = resource_ref(change);
        if actions.contains(&"create") {
            summary.resources_provisioned.push(resource.clone());
        }
        if actions.contains(&"update") {
            summary.resources_changed.push(resource.clone());
        }
        if actions.contains(&"delete") {
            summary.resources_destroyed.push(resource);
        }
    }

    summary
}

fn resource_ref(change: &Value) -> ResourceRef {
    let field = |name: &str| {
        change
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    ResourceRef {
        resource_type: field("type"),
        name: field("name"),
        address: field("address"),
    }
}
