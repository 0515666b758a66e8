//! Google Play reporting handler unit.
//!
//! Monthly sales and earnings reports live as zipped CSVs in the developer's
//! `pubsite_prod_*` Cloud Storage bucket. The unit lists and downloads the
//! matching objects and reports what it fetched; deeper CSV analysis happens
//! client-side.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::clients::ClientContext;
use crate::config::GooglePlayConfig;
use crate::registry::{HandlerUnit, OperationDef, OperationTable};

// ─── Report boundary ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum ReportKind {
    Sales,
    Earnings,
}

impl ReportKind {
    /// Object prefix inside the reporting bucket, e.g.
    /// `sales/salesreport_202401`.
    fn prefix(&self, target_month: &str) -> String {
        match self {
            ReportKind::Sales => format!("sales/salesreport_{target_month}"),
            ReportKind::Earnings => format!("earnings/earnings_{target_month}"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReportKind::Sales => "sales",
            ReportKind::Earnings => "earnings",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportDownload {
    pub object_name: String,
    pub bytes: usize,
}

#[async_trait]
pub trait PlayReportsApi: Send + Sync {
    /// Download every report object for the month. Empty when no report has
    /// been published yet.
    async fn monthly_report(
        &self,
        kind: ReportKind,
        target_month: &str,
    ) -> Result<Vec<ReportDownload>>;
}

// ─── GCS implementation ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GcsListResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
}

#[derive(Debug, Deserialize)]
struct GcsObject {
    name: String,
}

pub struct GcsPlayReports {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    access_token: String,
}

impl GcsPlayReports {
    pub fn new(http: reqwest::Client, config: &GooglePlayConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            access_token: config.access_token.clone(),
        }
    }
}

#[async_trait]
impl PlayReportsApi for GcsPlayReports {
    async fn monthly_report(
        &self,
        kind: ReportKind,
        target_month: &str,
    ) -> Result<Vec<ReportDownload>> {
        let listing: GcsListResponse = self
            .http
            .get(format!("{}/b/{}/o", self.base_url, self.bucket))
            .query(&[("prefix", kind.prefix(target_month))])
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()
            .context("report listing failed")?
            .json()
            .await?;

        let mut downloads = Vec::new();
        for object in listing.items {
            let body = self
                .http
                .get(format!("{}/b/{}/o/{}", self.base_url, self.bucket, urlencode(&object.name)))
                .query(&[("alt", "media")])
                .bearer_auth(&self.access_token)
                .send()
                .await?
                .error_for_status()
                .with_context(|| format!("download failed for {}", object.name))?
                .bytes()
                .await?;
            downloads.push(ReportDownload {
                object_name: object.name,
                bytes: body.len(),
            });
        }
        Ok(downloads)
    }
}

/// Percent-encode a GCS object name for the JSON API path (slashes included).
fn urlencode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// ─── Handler unit ────────────────────────────────────────────────────────────

pub struct GooglePlayUnit {
    api: Arc<dyn PlayReportsApi>,
    package_name: String,
}

impl GooglePlayUnit {
    pub fn create(ctx: Arc<ClientContext>) -> Result<Box<dyn HandlerUnit>> {
        let config = ctx
            .config
            .googleplay
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[googleplay] config section missing"))?;
        Ok(Box::new(Self {
            api: Arc::new(GcsPlayReports::new(ctx.http.clone(), config)),
            package_name: config.package_name.clone(),
        }))
    }
}

fn month_arg(args: &Value) -> Result<String> {
    let month = args
        .get("target_month")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing required field 'target_month'"))?;
    if month.len() != 6 || !month.bytes().all(|b| b.is_ascii_digit()) {
        anyhow::bail!("target_month must be YYYYMM, e.g. 202401");
    }
    Ok(month.to_string())
}

async fn format_report(
    api: &dyn PlayReportsApi,
    package: &str,
    kind: ReportKind,
    target_month: &str,
) -> String {
    match api.monthly_report(kind, target_month).await {
        Ok(downloads) if downloads.is_empty() => format!(
            "no {} report published for {target_month} (package {package})",
            kind.label()
        ),
        Ok(downloads) => {
            let total: usize = downloads.iter().map(|d| d.bytes).sum();
            let mut out = format!(
                "{} report for {target_month} ({} file(s), {total} bytes):\n",
                kind.label(),
                downloads.len()
            );
            for d in &downloads {
                out.push_str(&format!("- {} ({} bytes)\n", d.object_name, d.bytes));
            }
            out
        }
        Err(e) => format!("failed to fetch {} report: {e}", kind.label()),
    }
}

fn month_schema() -> Value {
    json!({
        "type": "object",
        "required": ["target_month"],
        "properties": {
            "target_month": {
                "type": "string",
                "description": "Target month in YYYYMM format, e.g. 202401."
            }
        },
        "additionalProperties": false
    })
}

impl HandlerUnit for GooglePlayUnit {
    fn name(&self) -> &'static str {
        "GooglePlay"
    }

    fn register_tools(&self, table: &mut OperationTable) {
        let api = Arc::clone(&self.api);
        let package = self.package_name.clone();
        table.insert(
            OperationDef::new(
                "get_googleplay_monthly_sales_report",
                "Download the monthly Google Play sales report from Cloud Storage.",
                month_schema(),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                let package = package.clone();
                Box::pin(async move {
                    let month = month_arg(&args)?;
                    Ok(format_report(api.as_ref(), &package, ReportKind::Sales, &month).await)
                })
            }),
        );

        let api = Arc::clone(&self.api);
        let package = self.package_name.clone();
        table.insert(
            OperationDef::new(
                "get_googleplay_monthly_financial_report",
                "Download the monthly Google Play earnings report from Cloud Storage.",
                month_schema(),
            ),
            Arc::new(move |args| {
                let api = Arc::clone(&api);
                let package = package.clone();
                Box::pin(async move {
                    let month = month_arg(&args)?;
                    Ok(format_report(api.as_ref(), &package, ReportKind::Earnings, &month).await)
                })
            }),
        );
    }

    fn register_resources(&self, _table: &mut OperationTable) {}

    fn register_prompts(&self, table: &mut OperationTable) {
        table.insert(
            OperationDef::new(
                "googleplay_sales_report",
                "Guided Google Play sales report retrieval.",
                json!({
                    "type": "object",
                    "properties": { "target_month": { "type": "string" } }
                }),
            ),
            Arc::new(move |args| {
                Box::pin(async move {
                    let month = args.get("target_month").and_then(Value::as_str).unwrap_or("");
                    Ok(format!(
                        "Google Play sales report assistant\n\n\
                         Target month: {month}\n\n\
                         Months use the YYYYMM format (202401 = January 2024). Call \
                         get_googleplay_monthly_sales_report for downloads and purchase data, \
                         or get_googleplay_monthly_financial_report for revenue, tax, and \
                         payout breakdowns."
                    ))
                })
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_prefixes_match_bucket_layout() {
        assert_eq!(
            ReportKind::Sales.prefix("202401"),
            "sales/salesreport_202401"
        );
        assert_eq!(
            ReportKind::Earnings.prefix("202401"),
            "earnings/earnings_202401"
        );
    }

    #[test]
    fn month_arg_rejects_bad_formats() {
        assert!(month_arg(&json!({ "target_month": "202401" })).is_ok());
        assert!(month_arg(&json!({ "target_month": "2024-01" })).is_err());
        assert!(month_arg(&json!({})).is_err());
    }

    #[test]
    fn object_names_are_percent_encoded() {
        assert_eq!(urlencode("sales/salesreport_202401.zip"), "sales%2Fsalesreport_202401.zip");
    }
}
