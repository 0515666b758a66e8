//! App Store Connect handler unit.
//!
//! Team/invitation management plus the invite-and-wait workflow. Almost all
//! tools are direct pass-through to the Connect REST API with human-readable
//! formatting; the polling tools delegate to the task orchestrator.

pub mod api;
pub mod model;

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::warn;

use crate::clients::ClientContext;
use crate::registry::{HandlerUnit, OperationDef, OperationTable};
use crate::workflow;

use api::{AppStoreApi, HttpAppStoreApi, SalesReportQuery};
use model::BetaTester;

pub struct AppStoreUnit {
    api: Arc<dyn AppStoreApi>,
    ctx: Arc<ClientContext>,
    /// Required by the sales/finance report endpoints only.
    vendor_number: Option<String>,
}

impl AppStoreUnit {
    /// Factory for the registry. Fails when the `[appstore]` config section
    /// is absent, which makes discovery skip this unit.
    pub fn create(ctx: Arc<ClientContext>) -> Result<Box<dyn HandlerUnit>> {
        let config = ctx
            .config
            .appstore
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[appstore] config section missing"))?;
        let api: Arc<dyn AppStoreApi> = Arc::new(HttpAppStoreApi::new(ctx.http.clone(), config));
        let vendor_number = config.vendor_number.clone();
        Ok(Box::new(Self {
            api,
            ctx,
            vendor_number,
        }))
    }
}

fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required field '{field}'"))
}

// ─── Formatting helpers ──────────────────────────────────────────────────────

async fn format_team_members(api: &dyn AppStoreApi) -> String {
    match api.list_team_members().await {
        Ok(members) => {
            let mut out = format!("team has {} members:\n", members.len());
            for m in &members {
                out.push_str(&format!("- {} ({})\n", m.email, m.full_name()));
            }
            out
        }
        Err(e) => format!("failed to fetch team members: {e}"),
    }
}

async fn format_invitations(api: &dyn AppStoreApi) -> String {
    match api.list_invitations().await {
        Ok(invitations) if invitations.is_empty() => "no pending invitations".to_string(),
        Ok(invitations) => {
            let mut out = format!("pending invitations ({}):\n", invitations.len());
            for inv in &invitations {
                let state = if inv.is_expired() { "expired" } else { "valid" };
                let expires = inv
                    .expires
                    .map(|e| e.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                out.push_str(&format!(
                    "- {} ({}) — roles: {} — {state} — expires {expires}\n",
                    inv.email,
                    inv.full_name(),
                    inv.roles.join(", "),
                ));
            }
            out
        }
        Err(e) => format!("failed to fetch invitations: {e}"),
    }
}

/// TestFlight testers for one app: union over all of its beta groups,
/// deduplicated by email (case-insensitive). A group whose tester listing
/// fails is skipped with a warning so one broken group does not hide the
/// rest.
pub async fn beta_testers_for_app(
    api: &dyn AppStoreApi,
    app_id: &str,
) -> Result<Vec<BetaTester>, api::ApiError> {
    let groups = api.list_beta_groups(app_id).await?;
    let mut unique: std::collections::BTreeMap<String, BetaTester> = std::collections::BTreeMap::new();
    for group in groups {
        match api.list_beta_testers_in_group(&group.id).await {
            Ok(testers) => {
                for tester in testers {
                    unique.insert(tester.email.to_lowercase(), tester);
                }
            }
            Err(e) => {
                warn!(group = %group.name, error = %e, "tester listing failed for group — skipping");
            }
        }
    }
    Ok(unique.into_values().collect())
}

async fn format_apps(api: &dyn AppStoreApi) -> String {
    match api.list_apps().await {
        Ok(apps) if apps.is_empty() => "no apps found".to_string(),
        Ok(apps) => {
            let mut out = format!("found {} app(s):\n", apps.len());
            for app in &apps {
                out.push_str(&format!("- {} ({}) - {}\n", app.name, app.bundle_id, app.platform));
            }
            out
        }
        Err(e) => format!("failed to fetch apps: {e}"),
    }
}

async fn format_beta_groups(api: &dyn AppStoreApi, app_name: &str) -> String {
    let app = match api.find_app_by_name(app_name).await {
        Ok(Some(app)) => app,
        Ok(None) => return format!("app not found: {app_name}"),
        Err(e) => return format!("failed to look up {app_name}: {e}"),
    };
    match api.list_beta_groups(&app.id).await {
        Ok(groups) if groups.is_empty() => format!("{app_name} has no TestFlight groups"),
        Ok(groups) => {
            let mut out = format!("TestFlight groups for {app_name}:\n");
            for g in &groups {
                let kind = if g.is_internal_group { "internal" } else { "external" };
                out.push_str(&format!("- {} ({kind})\n", g.name));
            }
            out
        }
        Err(e) => format!("failed to fetch groups for {app_name}: {e}"),
    }
}

async fn format_beta_testers(api: &dyn AppStoreApi, app_name: &str) -> String {
    let app = match api.find_app_by_name(app_name).await {
        Ok(Some(app)) => app,
        Ok(None) => return format!("app not found: {app_name}"),
        Err(e) => return format!("failed to look up {app_name}: {e}"),
    };
    match beta_testers_for_app(api, &app.id).await {
        Ok(testers) if testers.is_empty() => format!("{app_name} has no TestFlight testers"),
        Ok(testers) => {
            let mut out = format!("TestFlight testers for {app_name} ({}):\n", testers.len());
            for t in &testers {
                out.push_str(&format!(
                    "- {} ({}) - {}\n",
                    t.email,
                    t.full_name(),
                    t.state_label()
                ));
            }
            out
        }
        Err(e) => format!("failed to fetch testers for {app_name}: {e}"),
    }
}

const SALES_FREQUENCIES: [&str; 4] = ["DAILY", "WEEKLY", "MONTHLY", "YEARLY"];

/// Build the `salesReports` filter set from tool arguments. Report type and
/// subtype are passed through uppercased so new Connect values keep working;
/// the frequency set is closed.
fn sales_query(args: &Value, vendor_number: String) -> Result<SalesReportQuery> {
    let frequency = args
        .get("frequency")
        .and_then(Value::as_str)
        .unwrap_or("DAILY")
        .to_uppercase();
    if !SALES_FREQUENCIES.contains(&frequency.as_str()) {
        anyhow::bail!("frequency must be one of DAILY, WEEKLY, MONTHLY, YEARLY");
    }
    Ok(SalesReportQuery {
        vendor_number,
        report_type: args
            .get("report_type")
            .and_then(Value::as_str)
            .unwrap_or("SALES")
            .to_uppercase(),
        report_subtype: args
            .get("report_subtype")
            .and_then(Value::as_str)
            .unwrap_or("SUMMARY")
            .to_uppercase(),
        frequency,
        report_date: args
            .get("report_date")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    })
}

// ─── HandlerUnit ─────────────────────────────────────────────────────────────

impl HandlerUnit for AppStoreUnit {
    fn name(&self) -> &'static str {
        "AppStoreConnect"
    }

    fn register_tools(&self, table: &mut OperationTable) {
        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "get_team_members",
                "List App Store Connect team members (email and full name).",
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
            ),
            Arc::new(move |_args| {
                let api = Arc::clone(&api);
                Box::pin(async move { Ok(format_team_members(api.as_ref()).await) })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "check_user_invitations",
                "List pending App Store Connect user invitations with roles and expiry.",
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
            ),
            Arc::new(move |_args| {
                let api = Arc::clone(&api);
                Box::pin(async move { Ok(format_invitations(api.as_ref()).await) })
            }),
        );

        let api = Arc::clone(&self.api);
        let orchestrator = Arc::clone(&self.ctx.orchestrator);
        table.insert(
            OperationDef::new(
                "invite_user_with_polling",
                "Invite a user to the team and monitor acceptance in the background; \
                 once they accept they are added to the app's internal TestFlight group.",
                json!({
                    "type": "object",
                    "required": ["email", "app_name"],
                    "properties": {
                        "email": { "type": "string", "description": "Invitee email address." },
                        "app_name": { "type": "string", "description": "App whose TestFlight group the user joins." },
                        "role": {
                            "type": "string",
                            "description": "Team role. Defaults to CUSTOMER_SUPPORT.",
                            "default": "CUSTOMER_SUPPORT"
                        }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                let orchestrator = Arc::clone(&orchestrator);
                Box::pin(async move {
                    let email = required_str(&args, "email")?.to_string();
                    let app_name = required_str(&args, "app_name")?.to_string();
                    let role = args
                        .get("role")
                        .and_then(Value::as_str)
                        .unwrap_or("CUSTOMER_SUPPORT")
                        .to_string();
                    match workflow::invite_user_and_monitor(api, orchestrator, &email, &app_name, &role)
                        .await
                    {
                        Ok(msg) => Ok(msg),
                        Err(e) => Ok(format!("invite failed: {e}")),
                    }
                })
            }),
        );

        let orchestrator = Arc::clone(&self.ctx.orchestrator);
        table.insert(
            OperationDef::new(
                "get_polling_status",
                "Status of invite monitoring tasks: one subject's task, or all of them.",
                json!({
                    "type": "object",
                    "properties": {
                        "email": {
                            "type": "string",
                            "description": "Subject email. Omit to list every running task."
                        }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let orchestrator = Arc::clone(&orchestrator);
                Box::pin(async move {
                    match args.get("email").and_then(Value::as_str) {
                        Some(email) => match orchestrator.status(email).await {
                            Some(task) => Ok(format!(
                                "polling status for {}:\n- task id: {}\n- status: {}\n- app: {}\n- elapsed: {} min\n- remaining: {} min",
                                task.subject_key,
                                task.task_id,
                                task.status.as_str(),
                                task.context.get("app_name").and_then(Value::as_str).unwrap_or("-"),
                                task.elapsed_minutes(),
                                task.remaining_minutes(),
                            )),
                            None => Ok(format!("no polling task found for {email}")),
                        },
                        None => {
                            let tasks = orchestrator.status_all().await;
                            if tasks.is_empty() {
                                return Ok("no polling tasks running".to_string());
                            }
                            let mut out = format!("running polling tasks ({}):\n", tasks.len());
                            for task in tasks {
                                out.push_str(&format!(
                                    "- {} ({}) — {} — elapsed {} min\n",
                                    task.subject_key,
                                    task.context.get("app_name").and_then(Value::as_str).unwrap_or("-"),
                                    task.status.as_str(),
                                    task.elapsed_minutes(),
                                ));
                            }
                            Ok(out)
                        }
                    }
                })
            }),
        );

        let orchestrator = Arc::clone(&self.ctx.orchestrator);
        table.insert(
            OperationDef::new(
                "cancel_polling_task",
                "Cancel the invite monitoring task for a subject email.",
                json!({
                    "type": "object",
                    "required": ["email"],
                    "properties": {
                        "email": { "type": "string", "description": "Subject email." }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let orchestrator = Arc::clone(&orchestrator);
                Box::pin(async move {
                    let email = required_str(&args, "email")?;
                    if orchestrator.cancel(email).await {
                        Ok(format!("cancellation requested for {email}"))
                    } else {
                        Ok(format!("no polling task found for {email}"))
                    }
                })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "remove_team_member",
                "Remove a member from the App Store Connect team.",
                json!({
                    "type": "object",
                    "required": ["email"],
                    "properties": {
                        "email": { "type": "string", "description": "Member email address." }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                Box::pin(async move {
                    let email = required_str(&args, "email")?;
                    match api.find_team_member(email).await {
                        Ok(Some(member)) => match api.remove_user(&member.id).await {
                            Ok(()) => Ok(format!("removed {email} from the team")),
                            Err(e) => Ok(format!("failed to remove {email}: {e}")),
                        },
                        Ok(None) => Ok(format!("{email} is not a team member")),
                        Err(e) => Ok(format!("failed to look up {email}: {e}")),
                    }
                })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "remove_user_completely",
                "Remove a user from both the team and TestFlight. Each step is \
                 attempted independently and reported separately.",
                json!({
                    "type": "object",
                    "required": ["email"],
                    "properties": {
                        "email": { "type": "string", "description": "User email address." }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                Box::pin(async move {
                    let email = required_str(&args, "email")?;
                    let mut results = Vec::new();

                    match api.remove_beta_tester(email).await {
                        Ok(true) => results.push(format!("removed {email} from TestFlight")),
                        Ok(false) => results.push(format!("{email} was not a TestFlight tester")),
                        Err(e) => results.push(format!("TestFlight removal failed: {e}")),
                    }

                    match api.find_team_member(email).await {
                        Ok(Some(member)) => match api.remove_user(&member.id).await {
                            Ok(()) => results.push(format!("removed {email} from the team")),
                            Err(e) => results.push(format!("team removal failed: {e}")),
                        },
                        Ok(None) => results.push(format!("{email} was not a team member")),
                        Err(e) => results.push(format!("team lookup failed: {e}")),
                    }

                    Ok(results.join("\n"))
                })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "get_apps",
                "List all apps in the App Store Connect account.",
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
            ),
            Arc::new(move |_args| {
                let api = Arc::clone(&api);
                Box::pin(async move { Ok(format_apps(api.as_ref()).await) })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "get_beta_groups",
                "List an app's TestFlight groups (internal and external).",
                json!({
                    "type": "object",
                    "required": ["app_name"],
                    "properties": {
                        "app_name": { "type": "string", "description": "App name." }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                Box::pin(async move {
                    let app_name = required_str(&args, "app_name")?;
                    Ok(format_beta_groups(api.as_ref(), app_name).await)
                })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "get_beta_testers",
                "List an app's TestFlight testers across all of its groups, \
                 with invitation state.",
                json!({
                    "type": "object",
                    "required": ["app_name"],
                    "properties": {
                        "app_name": { "type": "string", "description": "App name." }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                Box::pin(async move {
                    let app_name = required_str(&args, "app_name")?;
                    Ok(format_beta_testers(api.as_ref(), app_name).await)
                })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "remove_testflight_tester",
                "Remove a tester from TestFlight without touching their team access.",
                json!({
                    "type": "object",
                    "required": ["email"],
                    "properties": {
                        "email": { "type": "string", "description": "Tester email address." }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                Box::pin(async move {
                    let email = required_str(&args, "email")?;
                    match api.remove_beta_tester(email).await {
                        Ok(true) => Ok(format!("removed {email} from TestFlight")),
                        Ok(false) => Ok(format!("{email} is not a TestFlight tester")),
                        Err(e) => Ok(format!("failed to remove {email} from TestFlight: {e}")),
                    }
                })
            }),
        );

        let api = Arc::clone(&self.api);
        let vendor_number = self.vendor_number.clone();
        table.insert(
            OperationDef::new(
                "get_sales_report",
                "Download a sales and trends report (CSV) for the configured vendor.",
                json!({
                    "type": "object",
                    "properties": {
                        "report_type": {
                            "type": "string",
                            "description": "SALES, SUBSCRIPTION, NEWSSTAND, ... Defaults to SALES.",
                            "default": "SALES"
                        },
                        "report_subtype": {
                            "type": "string",
                            "description": "SUMMARY or DETAILED. Defaults to SUMMARY.",
                            "default": "SUMMARY"
                        },
                        "frequency": {
                            "type": "string",
                            "description": "DAILY, WEEKLY, MONTHLY, or YEARLY. Defaults to DAILY.",
                            "default": "DAILY"
                        },
                        "report_date": {
                            "type": "string",
                            "description": "YYYY-MM-DD (YYYY-MM for monthly). Omit for the latest daily report."
                        }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                let vendor_number = vendor_number.clone();
                Box::pin(async move {
                    let Some(vendor_number) = vendor_number else {
                        return Ok("vendor_number is not configured — set it in the [appstore] \
                                   section or APP_STORE_VENDOR_NUMBER"
                            .to_string());
                    };
                    let query = sales_query(&args, vendor_number)?;
                    match api.sales_report(&query).await {
                        Ok(csv) => Ok(csv),
                        Err(e) => Ok(format!("failed to fetch sales report: {e}")),
                    }
                })
            }),
        );

        let api = Arc::clone(&self.api);
        let vendor_number = self.vendor_number.clone();
        table.insert(
            OperationDef::new(
                "get_finance_report",
                "Download a monthly finance report (CSV) with revenue and tax detail.",
                json!({
                    "type": "object",
                    "required": ["report_date"],
                    "properties": {
                        "report_date": {
                            "type": "string",
                            "description": "Report month in YYYY-MM format."
                        },
                        "region_code": {
                            "type": "string",
                            "description": "Region code; ZZ is the worldwide report. Defaults to ZZ.",
                            "default": "ZZ"
                        }
                    },
                    "additionalProperties": false
                }),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                let vendor_number = vendor_number.clone();
                Box::pin(async move {
                    let Some(vendor_number) = vendor_number else {
                        return Ok("vendor_number is not configured — set it in the [appstore] \
                                   section or APP_STORE_VENDOR_NUMBER"
                            .to_string());
                    };
                    let report_date = required_str(&args, "report_date")?;
                    let region_code = args
                        .get("region_code")
                        .and_then(Value::as_str)
                        .unwrap_or("ZZ");
                    match api.finance_report(&vendor_number, region_code, report_date).await {
                        Ok(csv) => Ok(csv),
                        Err(e) => Ok(format!("failed to fetch finance report: {e}")),
                    }
                })
            }),
        );
    }

    fn register_resources(&self, table: &mut OperationTable) {
        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "appstore://team-members",
                "App Store Connect team member list",
                Value::Null,
            ),
            Arc::new(move |_args| {
                let api = Arc::clone(&api);
                Box::pin(async move { Ok(format_team_members(api.as_ref()).await) })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "appstore://invitations",
                "Pending App Store Connect user invitations",
                Value::Null,
            ),
            Arc::new(move |_args| {
                let api = Arc::clone(&api);
                Box::pin(async move { Ok(format_invitations(api.as_ref()).await) })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new("appstore://apps", "Apps in the Connect account", Value::Null),
            Arc::new(move |_args| {
                let api = Arc::clone(&api);
                Box::pin(async move { Ok(format_apps(api.as_ref()).await) })
            }),
        );

        let api = Arc::clone(&self.api);
        table.insert(
            OperationDef::new(
                "appstore://beta-testers",
                "TestFlight testers across every app",
                Value::Null,
            ),
            Arc::new(move |_args| {
                let api = Arc::clone(&api);
                Box::pin(async move {
                    let apps = match api.list_apps().await {
                        Ok(apps) => apps,
                        Err(e) => return Ok(format!("failed to fetch apps: {e}")),
                    };
                    let mut lines = Vec::new();
                    for app in &apps {
                        match beta_testers_for_app(api.as_ref(), &app.id).await {
                            Ok(testers) => {
                                for t in testers {
                                    lines.push(format!("- {} - {}", t.email, app.name));
                                }
                            }
                            Err(e) => {
                                warn!(app = %app.name, error = %e, "tester listing failed — skipping app");
                            }
                        }
                    }
                    if lines.is_empty() {
                        return Ok("no TestFlight testers found".to_string());
                    }
                    Ok(format!("all TestFlight testers:\n{}", lines.join("\n")))
                })
            }),
        );
    }

    fn register_prompts(&self, table: &mut OperationTable) {
        table.insert(
            OperationDef::new(
                "appstore_invite_user",
                "Guided App Store Connect user invitation.",
                json!({
                    "type": "object",
                    "properties": {
                        "email": { "type": "string" },
                        "app_name": { "type": "string" },
                        "role": { "type": "string" }
                    }
                }),
            ),
            Arc::new(move |args| {
                Box::pin(async move {
                    let email = args.get("email").and_then(Value::as_str).unwrap_or("");
                    let app_name = args.get("app_name").and_then(Value::as_str).unwrap_or("");
                    let role = args.get("role").and_then(Value::as_str).unwrap_or("");
                    Ok(format!(
                        "App Store Connect invitation assistant\n\n\
                         Invitee: {email}\nApp: {app_name}\nRole: {role}\n\n\
                         Supported roles: ADMIN, FINANCE, DEVELOPER, MARKETING, CUSTOMER_SUPPORT.\n\n\
                         Steps:\n\
                         1. Confirm the invitee details above.\n\
                         2. Call invite_user_with_polling with email, app_name, and role.\n\
                         3. The server monitors acceptance in the background and adds the \
                         user to the app's internal TestFlight group once they accept.\n\
                         4. Check progress anytime with get_polling_status."
                    ))
                })
            }),
        );

        table.insert(
            OperationDef::new(
                "appstore_remove_user",
                "Guided App Store Connect user removal.",
                json!({
                    "type": "object",
                    "properties": {
                        "email": { "type": "string" }
                    }
                }),
            ),
            Arc::new(move |args| {
                Box::pin(async move {
                    let email = args.get("email").and_then(Value::as_str).unwrap_or("");
                    Ok(format!(
                        "App Store Connect removal assistant\n\n\
                         User: {email}\n\n\
                         Options:\n\
                         - remove_team_member: revoke team access only.\n\
                         - remove_user_completely: revoke team access and TestFlight access.\n\n\
                         Removal is not reversible; confirm the email before proceeding. \
                         Test feedback already submitted by the user is retained."
                    ))
                })
            }),
        );

        table.insert(
            OperationDef::new(
                "appstore_analytics",
                "Guided sales and finance report retrieval.",
                json!({
                    "type": "object",
                    "properties": {
                        "operation": { "type": "string" },
                        "date_range": { "type": "string" }
                    }
                }),
            ),
            Arc::new(move |args| {
                Box::pin(async move {
                    let operation = args.get("operation").and_then(Value::as_str).unwrap_or("");
                    let date_range = args.get("date_range").and_then(Value::as_str).unwrap_or("");
                    Ok(format!(
                        "App Store Connect analytics assistant\n\n\
                         Operation: {operation}\nDate range: {date_range}\n\n\
                         Available reports:\n\
                         - get_sales_report: downloads and purchases. Report types SALES, \
                         SUBSCRIPTION, NEWSSTAND; frequencies DAILY, WEEKLY, MONTHLY, YEARLY.\n\
                         - get_finance_report: revenue, tax, and exchange-rate detail. Monthly \
                         only, report_date in YYYY-MM format, region code ZZ for worldwide.\n\n\
                         Both require a configured vendor_number. Sales data usually lags by \
                         1-2 days; finance data is published monthly with a longer delay."
                    ))
                })
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::ApiError;
    use async_trait::async_trait;
    use model::{App, BetaGroup, TeamMember, UserInvitation};

    #[test]
    fn sales_query_applies_defaults_and_closes_frequency_set() {
        let query = sales_query(&json!({}), "12345".to_string()).expect("defaults are valid");
        assert_eq!(query.report_type, "SALES");
        assert_eq!(query.report_subtype, "SUMMARY");
        assert_eq!(query.frequency, "DAILY");
        assert!(query.report_date.is_empty());

        let query = sales_query(
            &json!({ "frequency": "monthly", "report_type": "subscription" }),
            "12345".to_string(),
        )
        .expect("lowercase arguments are normalized");
        assert_eq!(query.frequency, "MONTHLY");
        assert_eq!(query.report_type, "SUBSCRIPTION");

        assert!(
            sales_query(&json!({ "frequency": "HOURLY" }), "12345".to_string()).is_err(),
            "unknown frequency must be rejected"
        );
    }

    struct FakeApi;

    fn tester(email: &str, state: &str) -> model::BetaTester {
        model::BetaTester {
            id: format!("id-{email}"),
            email: email.to_string(),
            first_name: "T".to_string(),
            last_name: "peropero".to_string(),
            state: Some(state.to_string()),
        }
    }

    #[async_trait]
    impl AppStoreApi for FakeApi {
        async fn list_team_members(&self) -> Result<Vec<TeamMember>, ApiError> {
            unimplemented!()
        }
        async fn list_invitations(&self) -> Result<Vec<UserInvitation>, ApiError> {
            unimplemented!()
        }
        async fn invite_user(
            &self,
            _email: &str,
            _first_name: &str,
            _roles: &[String],
            _visible_app_ids: &[String],
        ) -> Result<(), ApiError> {
            unimplemented!()
        }
        async fn remove_user(&self, _user_id: &str) -> Result<(), ApiError> {
            unimplemented!()
        }
        async fn list_apps(&self) -> Result<Vec<App>, ApiError> {
            unimplemented!()
        }
        async fn find_app_by_name(&self, _name: &str) -> Result<Option<App>, ApiError> {
            unimplemented!()
        }
        async fn list_beta_groups(&self, _app_id: &str) -> Result<Vec<BetaGroup>, ApiError> {
            Ok(vec![
                BetaGroup {
                    id: "g1".into(),
                    name: "Internal".into(),
                    is_internal_group: true,
                },
                BetaGroup {
                    id: "g2".into(),
                    name: "External".into(),
                    is_internal_group: false,
                },
                BetaGroup {
                    id: "g3".into(),
                    name: "Broken".into(),
                    is_internal_group: false,
                },
            ])
        }
        async fn list_beta_testers_in_group(
            &self,
            group_id: &str,
        ) -> Result<Vec<model::BetaTester>, ApiError> {
            match group_id {
                "g1" => Ok(vec![tester("a@x.com", "ACCEPTED"), tester("b@x.com", "INVITED")]),
                "g2" => Ok(vec![tester("A@X.com", "INSTALLED")]),
                _ => Err(ApiError::Status {
                    status: reqwest::StatusCode::FORBIDDEN,
                    detail: "no access".into(),
                }),
            }
        }
        async fn add_beta_tester(
            &self,
            _email: &str,
            _first_name: &str,
            _group_id: &str,
        ) -> Result<(), ApiError> {
            unimplemented!()
        }
        async fn remove_beta_tester(&self, _email: &str) -> Result<bool, ApiError> {
            unimplemented!()
        }
        async fn sales_report(&self, _query: &SalesReportQuery) -> Result<String, ApiError> {
            unimplemented!()
        }
        async fn finance_report(
            &self,
            _vendor_number: &str,
            _region_code: &str,
            _report_date: &str,
        ) -> Result<String, ApiError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn testers_are_deduplicated_across_groups_and_broken_groups_skipped() {
        let testers = beta_testers_for_app(&FakeApi, "app1")
            .await
            .expect("listing succeeds despite one broken group");

        // a@x.com appears in two groups with different casing; one entry wins.
        let emails: Vec<&str> = testers.iter().map(|t| t.email.as_str()).collect();
        assert_eq!(testers.len(), 2, "got: {emails:?}");
        assert!(emails.iter().any(|e| e.eq_ignore_ascii_case("a@x.com")));
        assert!(emails.iter().any(|e| e.eq_ignore_ascii_case("b@x.com")));
    }
}
