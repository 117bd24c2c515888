//! `dev-log.md`: human-readable mirror of the latest 100 memos.
//!
//! The file is rewritten wholesale on every sync (atomic replace, no
//! diff-merge) and doubles as the recovery source of last resort. Writer
//! and recovery parser agree on one line format:
//!
//! `- [YYYY-MM-DD HH:MM:SS] [category] entity | act | content`

use crate::{Memo, MemoryError};
use chrono::{DateTime, NaiveDateTime, Utc};
use mpm_db::{now_ms, DbPool};
use mpm_project::ProjectLayout;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;

const MIRROR_LIMIT: i64 = 100;

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^- \[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\] \[([^\]]*)\] ([^|]*)\|([^|]*)\|(.*)$")
        .expect("dev-log line regex")
});

/// Rewrite `dev-log.md` from the latest memos, newest first.
pub(crate) async fn sync(pool: &DbPool, layout: &ProjectLayout) -> Result<(), MemoryError> {
    let memos = sqlx::query_as::<_, Memo>(
        "SELECT id, category, entity, act, path, content, session_id, timestamp \
         FROM memos ORDER BY timestamp DESC, id DESC LIMIT ?",
    )
    .bind(MIRROR_LIMIT)
    .fetch_all(pool)
    .await?;

    let mut body = String::from("# Dev Log\n\n");
    for memo in &memos {
        let _ = writeln!(body, "{}", format_line(memo));
    }

    let path = layout.dev_log();
    let tmp = path.with_extension("md.tmp");
    std::fs::write(&tmp, &body).map_err(|e| MemoryError::Io(tmp.display().to_string(), e))?;
    std::fs::rename(&tmp, &path).map_err(|e| MemoryError::Io(path.display().to_string(), e))?;
    Ok(())
}

/// Parse `dev-log.md` back into the memos table. Last-resort recovery;
/// returns rows inserted. Lines that do not match the format are skipped.
pub(crate) async fn replay(pool: &DbPool, layout: &ProjectLayout) -> Result<usize, MemoryError> {
    let Ok(raw) = std::fs::read_to_string(layout.dev_log()) else {
        return Ok(0);
    };

    // The file is newest-first; insert oldest-first so autoincrement ids
    // follow time.
    let mut parsed: Vec<(i64, String, String, String, String)> = raw
        .lines()
        .filter_map(parse_line)
        .collect();
    parsed.reverse();

    let mut restored = 0usize;
    let mut tx = pool.begin().await?;
    for (timestamp, category, entity, act, content) in parsed {
        sqlx::query(
            "INSERT INTO memos (category, entity, act, path, content, session_id, timestamp) \
             VALUES (?, ?, ?, ?, ?, '', ?)",
        )
        .bind(&category)
        .bind(&entity)
        .bind(&act)
        .bind("")
        .bind(&content)
        .bind(timestamp)
        .execute(&mut *tx)
        .await?;
        restored += 1;
    }
    tx.commit().await?;
    Ok(restored)
}

fn format_line(memo: &Memo) -> String {
    let ts = DateTime::<Utc>::from_timestamp_millis(memo.timestamp)
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d %H:%M:%S");
    format!(
        "- [{}] [{}] {} | {} | {}",
        ts, memo.category, memo.entity, memo.act, memo.content
    )
}

fn parse_line(line: &str) -> Option<(i64, String, String, String, String)> {
    let caps = LINE_RE.captures(line)?;
    let timestamp = NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_else(|_| now_ms());
    Some((
        timestamp,
        caps[2].trim().to_string(),
        caps[3].trim().to_string(),
        caps[4].trim().to_string(),
        caps[5].trim().to_string(),
    ))
}
