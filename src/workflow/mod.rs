//! Invite-and-wait workflow facade.
//!
//! The one composed domain operation in the daemon: invite a user to the
//! App Store Connect team, then monitor in the background until they accept
//! and, once they have, add them to the app's first internal TestFlight
//! group. The monitoring itself is a generic orchestrator task — this module
//! only supplies the predicate and the side effect.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::clients::appstore::api::{ApiError, AppStoreApi};
use crate::orchestrator::{ApplyOutcome, PollWorkflow, SubmitParams, TaskOrchestrator};

/// Monitoring window and cadence for the invite flow: check every 5 minutes
/// for up to 2 hours.
pub const INVITE_MAX_DURATION: Duration = Duration::from_secs(2 * 3600);
pub const INVITE_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

// ─── Workflow ────────────────────────────────────────────────────────────────

/// Predicate: is the invitee a team member yet. Effect: add them to the
/// app's first internal TestFlight group.
pub struct InviteWorkflow {
    api: Arc<dyn AppStoreApi>,
    email: String,
    first_name: String,
    app_name: String,
}

impl InviteWorkflow {
    pub fn new(api: Arc<dyn AppStoreApi>, email: &str, first_name: &str, app_name: &str) -> Self {
        Self {
            api,
            email: email.to_string(),
            first_name: first_name.to_string(),
            app_name: app_name.to_string(),
        }
    }
}

#[async_trait]
impl PollWorkflow for InviteWorkflow {
    async fn check(&self) -> Result<bool> {
        Ok(self.api.find_team_member(&self.email).await?.is_some())
    }

    async fn apply(&self) -> Result<ApplyOutcome> {
        match add_to_internal_group(
            self.api.as_ref(),
            &self.email,
            &self.first_name,
            &self.app_name,
        )
        .await
        {
            Ok(group) => {
                info!(email = %self.email, group = %group, "invitee added to TestFlight group");
                Ok(ApplyOutcome::Applied)
            }
            Err(ApiError::Conflict(_)) => Ok(ApplyOutcome::AlreadyApplied),
            Err(e) => Err(e.into()),
        }
    }

    async fn on_progress(&self, note: &str) {
        info!(email = %self.email, app = %self.app_name, "{note}");
    }
}

/// Resolve the app and its first internal beta group, then add the tester.
/// Returns the group name on success.
async fn add_to_internal_group(
    api: &dyn AppStoreApi,
    email: &str,
    first_name: &str,
    app_name: &str,
) -> Result<String, ApiError> {
    let app = api
        .find_app_by_name(app_name)
        .await?
        .ok_or_else(|| ApiError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
            detail: format!("app not found: {app_name}"),
        })?;

    let groups = api.list_beta_groups(&app.id).await?;
    let internal = groups
        .into_iter()
        .find(|g| g.is_internal_group)
        .ok_or_else(|| ApiError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
            detail: format!("app {app_name} has no internal test group"),
        })?;

    api.add_beta_tester(email, first_name, &internal.id).await?;
    Ok(internal.name)
}

// ─── Facade ──────────────────────────────────────────────────────────────────

/// Invite a user and monitor acceptance in the background.
///
/// Returns immediately with a human-readable acknowledgement; the background
/// task applies the TestFlight side effect once the invitee shows up in the
/// team. If the user is already a member, the side effect is applied
/// directly and no task is submitted.
pub async fn invite_user_and_monitor(
    api: Arc<dyn AppStoreApi>,
    orchestrator: Arc<TaskOrchestrator>,
    email: &str,
    app_name: &str,
    role: &str,
) -> Result<String> {
    let first_name = email.split('@').next().unwrap_or(email).to_string();
    let roles = vec![crate::clients::appstore::model::map_role(role)];

    // Fast path: already on the team — apply the effect directly.
    if api.find_team_member(email).await?.is_some() {
        return match add_to_internal_group(api.as_ref(), email, &first_name, app_name).await {
            Ok(group) => Ok(format!(
                "{email} is already a team member — added directly to TestFlight group '{group}'"
            )),
            Err(ApiError::Conflict(_)) => Ok(format!(
                "{email} is already a team member and already in the TestFlight group"
            )),
            Err(e) => Err(e.into()),
        };
    }

    let app = api
        .find_app_by_name(app_name)
        .await?
        .ok_or_else(|| anyhow!("app not found: {app_name}"))?;

    api.invite_user(email, &first_name, &roles, &[app.id.clone()])
        .await?;

    let workflow = Arc::new(InviteWorkflow::new(
        Arc::clone(&api),
        email,
        &first_name,
        app_name,
    ));
    let task_id = orchestrator
        .submit(
            SubmitParams {
                subject_key: email.to_string(),
                max_duration: INVITE_MAX_DURATION,
                poll_interval: INVITE_POLL_INTERVAL,
                context: json!({ "app_name": app_name, "email": email }),
            },
            workflow,
        )
        .await?;

    Ok(format!(
        "invited {email} to the team (roles: {}) — monitoring acceptance in the background \
         (task {task_id}, up to {} minutes, checking every {} minutes)",
        roles.join(", "),
        INVITE_MAX_DURATION.as_secs() / 60,
        INVITE_POLL_INTERVAL.as_secs() / 60,
    ))
}
