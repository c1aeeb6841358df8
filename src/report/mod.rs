//! Report rendering, handoff payloads and outbound redaction.

pub mod generator;
pub mod handoff;
pub mod redact;

pub use generator::{generate_json_report, generate_markdown_report};
pub use handoff::HandoffPayload;
pub use redact::{
    filter, redact_and_trim, redact_evidence, FilterOptions, Filtered, RedactionWarning,
};

use crate::config::{OutputFormat, ResolvedConfig};
use crate::diff::ChangeSet;
use crate::models::ScoreReport;
use anyhow::Result;

/// Render the report in the requested format.
pub fn render(
    report: &ScoreReport,
    changes: &ChangeSet,
    config: &ResolvedConfig,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(generate_markdown_report(report)),
        OutputFormat::Json => generate_json_report(report),
        OutputFormat::Handoff => {
            let payload = HandoffPayload::build(report, changes, config);
            Ok(payload.to_markdown())
        }
    }
}
