//! Markdown rendering for `project_map`.

use mpm_indexer::map::{MapDetail, MapReport};
use std::fmt::Write as _;

/// Render a map report as markdown. Directory-level for overview,
/// per-file symbol listing otherwise.
pub fn render_markdown(report: &MapReport, detail: MapDetail) -> String {
    let mut out = String::from("# Project Map\n\n");

    let stats = &report.statistics;
    let _ = writeln!(
        out,
        "{} files, {} symbols, {} call edges",
        stats["total_files"], stats["total_symbols"], stats["call_edges"]
    );
    if let Some(scope) = stats["scope"].as_str() {
        let _ = writeln!(out, "Scope: `{}`", scope);
    }
    out.push('\n');

    if let Some(directories) = report.structure["directories"].as_object() {
        out.push_str("## Directories\n\n");
        for (dir, counts) in directories {
            let _ = writeln!(
                out,
                "- `{}/` — {} files, {} symbols",
                dir, counts["files"], counts["symbols"]
            );
        }
        out.push('\n');
    }

    if detail != MapDetail::Overview {
        if let Some(files) = report.structure["files"].as_object() {
            out.push_str("## Symbols\n\n");
            for (file, symbols) in files {
                let _ = writeln!(out, "### {}", file);
                for symbol in symbols.as_array().into_iter().flatten() {
                    let score = symbol["name"]
                        .as_str()
                        .and_then(|n| report.complexity_map.get(n))
                        .and_then(|v| v.as_f64());
                    match (detail, score) {
                        (MapDetail::Full, _) => {
                            let _ = writeln!(
                                out,
                                "- `{}` ({}) L{}-{} — `{}`",
                                symbol["name"].as_str().unwrap_or(""),
                                symbol["type"].as_str().unwrap_or(""),
                                symbol["line_start"],
                                symbol["line_end"],
                                symbol["signature"].as_str().unwrap_or(""),
                            );
                        }
                        (_, Some(score)) => {
                            let _ = writeln!(
                                out,
                                "- `{}` ({}) L{}-{} — DICE {:.1}",
                                symbol["name"].as_str().unwrap_or(""),
                                symbol["type"].as_str().unwrap_or(""),
                                symbol["line_start"],
                                symbol["line_end"],
                                score,
                            );
                        }
                        _ => {
                            let _ = writeln!(
                                out,
                                "- `{}` ({}) L{}-{}",
                                symbol["name"].as_str().unwrap_or(""),
                                symbol["type"].as_str().unwrap_or(""),
                                symbol["line_start"],
                                symbol["line_end"],
                            );
                        }
                    }
                }
                out.push('\n');
            }
        }
    }

    if !report.complexity_map.is_empty() {
        out.push_str("## Complexity hotspots\n\n");
        // The map is keyed by name; rank by score for display.
        let mut hotspots: Vec<(&String, f64)> = report
            .complexity_map
            .iter()
            .map(|(name, score)| (name, score.as_f64().unwrap_or(0.0)))
            .collect();
        hotspots.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (name, score) in hotspots.into_iter().take(10) {
            let _ = writeln!(out, "- `{}` — {:.1}", name, score);
        }
    }

    out
}
