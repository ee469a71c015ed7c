//! Minijinja template rendering for pipeline alerts.
//!
//! Every alert kind has a built-in subject and body template rendered
//! against an [`AlertContext`]. Templates are plain strings, so a fresh
//! [`minijinja::Environment`] is created per render call.

use crate::traits::{Notification, NotifyError};

/// One member named in an alert.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AlertMember {
    pub biobank_id: String,
    pub sample_id: Option<String>,
    /// Kind-specific detail: missing file names, failure mode, category.
    pub detail: String,
}

/// A group of members sharing a source file.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AlertGroup {
    /// Manifest or data file the group was found in.
    pub file: String,
    pub members: Vec<AlertMember>,
}

/// Structured data behind one alert.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AlertContext {
    /// Dispatcher routing key: `missing_data`, `failure_manifest`, `contamination`.
    pub kind: String,
    pub job_kind: String,
    pub job_run_id: String,
    pub bucket: String,
    pub groups: Vec<AlertGroup>,
    /// Current timestamp in ISO 8601 format.
    pub now: String,
}

impl AlertContext {
    pub fn member_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }
}

const SUBJECT_MISSING_DATA: &str =
    "[{{ job_kind }}] Missing data files in {{ bucket }} ({{ count }} members)";
const SUBJECT_FAILURE_MANIFEST: &str =
    "[{{ job_kind }}] Failure manifest received from {{ bucket }}";
const SUBJECT_CONTAMINATION: &str =
    "[{{ job_kind }}] Contaminated samples need attention ({{ count }})";
const SUBJECT_FALLBACK: &str = "[{{ job_kind }}] {{ kind | upper }}";

const BODY: &str = "\
Job run {{ job_run_id }} ({{ job_kind }}) at {{ now }}
Bucket: {{ bucket }}
{% for group in groups %}
{{ group.file }}:
{% for m in group.members %}  - {{ m.biobank_id }}{% if m.sample_id %} / {{ m.sample_id }}{% endif %}: {{ m.detail }}
{% endfor %}{% endfor %}";

fn subject_template(kind: &str) -> &'static str {
    match kind {
        "missing_data" => SUBJECT_MISSING_DATA,
        "failure_manifest" => SUBJECT_FAILURE_MANIFEST,
        "contamination" => SUBJECT_CONTAMINATION,
        _ => SUBJECT_FALLBACK,
    }
}

/// Renders alert templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("upper", upper_filter);
        env
    }

    /// Render an arbitrary template string against an alert context.
    pub fn render(&self, template_str: &str, ctx: &AlertContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(
            template_str,
            minijinja::context! {
                kind => &ctx.kind,
                job_kind => &ctx.job_kind,
                job_run_id => &ctx.job_run_id,
                bucket => &ctx.bucket,
                groups => &ctx.groups,
                now => &ctx.now,
                count => ctx.member_count(),
            },
        )
        .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Validate that a template string parses without errors.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    /// Render the built-in subject and body for `ctx.kind`.
    pub fn notification(&self, ctx: &AlertContext) -> Result<Notification, NotifyError> {
        Ok(Notification {
            subject: self.render(subject_template(&ctx.kind), ctx)?,
            body: self.render(BODY, ctx)?,
            alert_kind: ctx.kind.clone(),
            job_run_id: ctx.job_run_id.clone(),
            bucket: ctx.bucket.clone(),
        })
    }
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}
