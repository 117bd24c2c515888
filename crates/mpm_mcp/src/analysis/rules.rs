//! `_MPM_PROJECT_RULES.md`: auto-generated standing instructions for the
//! LLM client, rewritten after indexing completes.

use crate::session::ProjectHandle;
use anyhow::Result;
use mpm_indexer::IndexSummary;
use std::fmt::Write as _;

pub async fn rewrite_rules_file(
    handle: &ProjectHandle,
    summary: &IndexSummary,
) -> Result<()> {
    let facts = handle.memory.list_facts(20).await?;

    let mut out = String::new();
    out.push_str("# MPM Project Rules\n\n");
    out.push_str("Auto-generated after indexing; do not edit by hand.\n\n");

    let _ = writeln!(out, "## Index\n");
    let _ = writeln!(
        out,
        "- {} files tracked, {} symbols, {} call edges",
        summary.total_files, summary.symbols, summary.call_edges
    );
    let _ = writeln!(
        out,
        "- Last pass: {} parsed, {} unchanged, {} bootstrapped, {} ms\n",
        summary.parsed, summary.skipped_unchanged, summary.bootstrapped, summary.elapsed_ms
    );

    out.push_str("## Working agreements\n\n");
    out.push_str("- Use `code_search` / `code_impact` before editing unfamiliar code; do not guess symbol locations.\n");
    out.push_str("- Record a `memo` after every substantive change (category, entity, act, content).\n");
    out.push_str("- Drive multi-step work through `task_chain`; gates decide pass/fail, not vibes.\n");
    out.push_str("- Check `system_recall` for prior decisions before re-deciding anything.\n\n");

    if !facts.is_empty() {
        out.push_str("## Known facts\n\n");
        for fact in &facts {
            let _ = writeln!(out, "- [{}] {}", fact.fact_type, fact.summarize);
        }
    }

    let path = handle.layout.rules_file();
    tokio::fs::write(&path, out).await?;
    Ok(())
}
