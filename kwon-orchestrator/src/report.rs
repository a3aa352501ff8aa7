//! Report Artifact Writer (C9): renders a `MonthlyState` into
//! a `.docx` via `{{key}}` template substitution, or a plain-text fallback
//! when no template is configured, using the standard
//! `REP-{period}.docx` filename and substitution contract.

use std::collections::BTreeMap;
use std::path::Path;

use docx_rs::{read_docx, Docx, DocumentChild, Paragraph, ParagraphChild, Run, RunChild, Table, TableCellContent, TableChild, TableRowChild};
use kwon_spec::{KwonError, KwonResult, MonthlyState};

/// `REP-{period}.docx`; overwritten in place across a revise loop so a
/// reviewer always opens the same path.
pub fn report_filename(period: &str) -> String {
 format!("REP-{period}.docx")
}

/// Builds the `{{key}}` -> rendered-value substitution table from a
/// `MonthlyState`. Values are single-line; multi-line text (e.g. key
/// points) is joined with `"; "` for table cells and with real line
/// breaks for run-level paragraphs via [`render_fallback`].
pub fn template_context(state: &MonthlyState) -> BTreeMap<String, String> {
 let mut ctx = BTreeMap::new();
 ctx.insert("period".to_string(), state.period.clone());
 ctx.insert("generated_at".to_string(), chrono::Utc::now().to_rfc3339());

 if let Some(summary) = &state.summary {
 ctx.insert("final_grade".to_string(), format!("{:?}", summary.final_grade));
 ctx.insert("key_points".to_string(), summary.key_points.join("; "));
 ctx.insert("revision_status".to_string(), summary.revision_status.clone().unwrap_or_else(|| "initial".to_string()));
 }
 for (key, dim) in [
 ("collateral", &state.collateral),
 ("peg", &state.peg),
 ("disclosure", &state.disclosure),
 ("liquidity", &state.liquidity),
 ("por", &state.por),
 ] {
 if let Some(d) = dim {
 ctx.insert(format!("{key}_grade"), format!("{:?}", d.grade));
 }
 }
 if let Some(consistency) = &state.consistency {
 ctx.insert("consistency_status".to_string(), format!("{:?}", consistency.status));
 ctx.insert("consistency_issues".to_string(), consistency.issues.join("; "));
 }
 ctx.insert("revision_count".to_string(), state.revision_count.to_string());
 if let Some(feedback) = &state.human_feedback {
 ctx.insert("human_feedback".to_string(), feedback.clone());
 }
 ctx
}

fn substitute(text: &str, ctx: &BTreeMap<String, String>) -> String {
 let mut out = String::with_capacity(text.len());
 let mut rest = text;
 while let Some(start) = rest.find("{{") {
 out.push_str(&rest[..start]);
 let after = &rest[start + 2..];
 if let Some(end) = after.find("}}") {
 let key = after[..end].trim();
 match ctx.get(key) {
 Some(value) => out.push_str(value),
 None => out.push_str(&format!("{{{{{key}}}}}")),
 }
 rest = &after[end + 2..];
 } else {
 out.push_str("{{");
 rest = after;
 break;
 }
 }
 out.push_str(rest);
 out
}

/// Applies `{{key}}` substitution to every text run and every table cell
/// paragraph in `template_bytes`, returning the rendered document bytes.
/// Substitution mutates text runs in place (rather than rebuilding the
/// paragraph/run tree) so existing character formatting is preserved.
pub fn render_from_template(template_bytes: &[u8], ctx: &BTreeMap<String, String>) -> KwonResult<Vec<u8>> {
 let mut docx = read_docx(template_bytes).map_err(|e| KwonError::Internal(format!("failed to parse docx template: {e}")))?;
 substitute_children(&mut docx.document.children, ctx);

 let mut buf = Vec::new();
 docx.build().pack(&mut buf).map_err(|e| KwonError::Internal(format!("failed to pack docx: {e}")))?;
 Ok(buf)
}

fn substitute_children(children: &mut [DocumentChild], ctx: &BTreeMap<String, String>) {
 for child in children.iter_mut() {
 match child {
 DocumentChild::Paragraph(p) => substitute_paragraph(p, ctx),
 DocumentChild::Table(t) => substitute_table(t, ctx),
 _ => {}
 }
 }
}

fn substitute_paragraph(paragraph: &mut Paragraph, ctx: &BTreeMap<String, String>) {
 for child in paragraph.children.iter_mut() {
 if let ParagraphChild::Run(run) = child {
 substitute_run(run, ctx);
 }
 }
}

fn substitute_run(run: &mut Run, ctx: &BTreeMap<String, String>) {
 for child in run.children.iter_mut() {
 if let RunChild::Text(text) = child {
 text.text = substitute(&text.text, ctx);
 }
 }
}

fn substitute_table(table: &mut Table, ctx: &BTreeMap<String, String>) {
 for row in table.rows.iter_mut() {
 let TableChild::TableRow(r) = row;
 for cell in r.cells.iter_mut() {
 let TableRowChild::TableCell(c) = cell;
 for content in c.children.iter_mut() {
 match content {
 TableCellContent::Paragraph(p) => substitute_paragraph(p, ctx),
 TableCellContent::Table(t) => substitute_table(t, ctx),
 _ => {}
 }
 }
 }
 }
}

/// Minimal plain-content document used when no `.docx` template is
/// configured for the deployment.
pub fn render_fallback(state: &MonthlyState) -> KwonResult<Vec<u8>> {
 let ctx = template_context(state);
 let mut docx = Docx::new();
 docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(format!("Monthly Compliance Report - {}", state.period))));
 docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(format!(
 "Final grade: {}",
 ctx.get("final_grade").cloned().unwrap_or_else(|| "N/A".to_string())
))));
 if let Some(summary) = &state.summary {
 for point in &summary.key_points {
 docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(format!("- {point}"))));
 }
 }
 let mut buf = Vec::new();
 docx.build().pack(&mut buf).map_err(|e| KwonError::Internal(format!("failed to pack fallback docx: {e}")))?;
 Ok(buf)
}

/// Writes the rendered report to `output_dir/REP-{period}.docx`, using
/// `template_path` when it exists, else the plain-text fallback. Returns
/// the written path.
pub fn write_report(state: &MonthlyState, template_path: Option<&Path>, output_dir: &Path) -> KwonResult<String> {
 std::fs::create_dir_all(output_dir).map_err(|e| KwonError::Internal(format!("failed to create report output dir: {e}")))?;
 let filename = report_filename(&state.period);
 let out_path = output_dir.join(&filename);

 let bytes = match template_path {
 Some(path) if path.exists() => {
 let template_bytes = std::fs::read(path).map_err(|e| KwonError::Internal(format!("failed to read docx template: {e}")))?;
 render_from_template(&template_bytes, &template_context(state))?
 }
 _ => render_fallback(state)?,
 };

 std::fs::write(&out_path, bytes).map_err(|e| KwonError::Internal(format!("failed to write report artifact: {e}")))?;
 Ok(out_path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
 use super::*;
 use kwon_spec::{ConsistencyResult, ConsistencyStatus, DataQuality, DimensionEval, Grade, Summary};
 use std::collections::BTreeMap as Map;

 fn sample_state() -> MonthlyState {
 MonthlyState {
 period: "2026-06".to_string(),
 raw_data: serde_json::Value::Null,
 data_quality: Some(DataQuality::Ok),
 collateral: Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false }),
 peg: Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false }),
 disclosure: Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false }),
 liquidity: Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false }),
 por: Some(DimensionEval { grade: Grade::A, metrics: serde_json::Value::Null, error: None, fallback: false }),
 consistency: Some(ConsistencyResult { status: ConsistencyStatus::Ok, issues: vec![] }),
 summary: Some(Summary { final_grade: Grade::A, key_points: vec!["Collateral grade: A".to_string()], revision_status: Some("initial".to_string()) }),
 report_path: None,
 human_decision: None,
 human_feedback: None,
 revision_count: 0,
 max_revisions: 3,
 retry_counts: Map::new(),
 max_retries: Map::new(),
 }
 }

 #[test]
 fn filename_is_deterministic_and_reused_across_revisions() {
 assert_eq!(report_filename("2026-06"), "REP-2026-06.docx");
 assert_eq!(report_filename("2026-06"), report_filename("2026-06"));
 }

 #[test]
 fn substitute_replaces_known_keys_and_leaves_unknown_ones_intact() {
 let mut ctx = BTreeMap::new();
 ctx.insert("period".to_string(), "2026-06".to_string());
 let rendered = substitute("Report for {{period}}, status {{missing_key}}", &ctx);
 assert_eq!(rendered, "Report for 2026-06, status {{missing_key}}");
 }

 #[test]
 fn template_context_includes_grades_and_summary() {
 let ctx = template_context(&sample_state());
 assert_eq!(ctx.get("final_grade").map(String::as_str), Some("A"));
 assert_eq!(ctx.get("collateral_grade").map(String::as_str), Some("A"));
 assert!(ctx.get("key_points").unwrap().contains("Collateral grade: A"));
 }

 #[test]
 fn fallback_document_builds_without_a_template() {
 let bytes = render_fallback(&sample_state()).unwrap();
 assert!(!bytes.is_empty());
 }

 #[test]
 fn write_report_uses_fallback_when_template_missing() {
 let dir = tempfile::tempdir().unwrap();
 let path = write_report(&sample_state(), Some(Path::new("/nonexistent/template.docx")), dir.path()).unwrap();
 assert!(path.ends_with("REP-2026-06.docx"));
 assert!(Path::new(&path).exists());
 }
}
