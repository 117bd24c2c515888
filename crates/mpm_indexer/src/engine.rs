//! Index run orchestration: walk, incremental ingest, bootstrap, prune.

use crate::parser::parse_file;
use crate::stack::detect_stack;
use crate::store::IndexStore;
use crate::types::{IndexLevel, IndexSummary};
use crate::IndexError;
use ignore::WalkBuilder;
use mpm_project::ProjectLayout;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Files larger than this are skipped by the walker, not parse failures.
const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// First-scan bootstrap kicks in above this many files needing work.
const BOOTSTRAP_THRESHOLD: usize = 3000;

/// Files fully parsed before the rest is deferred to bootstrap rows.
const BOOTSTRAP_PARSE_LIMIT: usize = 500;

/// Files per transaction.
const BATCH_SIZE: usize = 50;

/// WAL checkpoint cadence, in batches.
const CHECKPOINT_EVERY: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Project-relative sub-tree to index; `None` walks the whole root.
    pub scope: Option<String>,
    /// Disable the bootstrap strategy.
    pub force_full: bool,
    /// Extra directory names to skip.
    pub ignore_dirs: Vec<String>,
    /// Extension whitelist; empty means every supported extension.
    pub extensions: Vec<String>,
}

struct Candidate {
    abs: PathBuf,
    rel: String,
    ext: String,
    size: i64,
    mtime: i64,
}

pub struct IndexEngine {
    store: IndexStore,
    layout: ProjectLayout,
}

impl IndexEngine {
    pub fn new(store: IndexStore, layout: ProjectLayout) -> Self {
        Self { store, layout }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Run one index pass.
    pub async fn index(&self, opts: &IndexOptions) -> Result<IndexSummary, IndexError> {
        let start = Instant::now();
        let root = self.layout.root().path().to_path_buf();

        let extra_ignore = opts.ignore_dirs.clone();
        let stack = {
            let root_for_task = root.clone();
            tokio::task::spawn_blocking(move || detect_stack(&root_for_task, &extra_ignore))
                .await
                .map_err(|e| IndexError::Parser(root.display().to_string(), e.to_string()))?
        };

        let candidates = self.collect_candidates(opts, &stack.ignore_dirs)?;
        let total = candidates.len();
        let seen: HashSet<String> = candidates.iter().map(|c| c.rel.clone()).collect();

        // Classify: skip unchanged full files; keep bootstrap rows parked
        // unless this run is scoped or forced.
        let mut work: Vec<Candidate> = Vec::new();
        let mut summary = IndexSummary {
            total_files: total,
            ..Default::default()
        };
        for candidate in candidates {
            match self.store.file_meta(&candidate.rel).await? {
                Some((size, mtime, level))
                    if size == candidate.size && mtime == candidate.mtime =>
                {
                    match level {
                        IndexLevel::Full => summary.skipped_unchanged += 1,
                        IndexLevel::Bootstrap => {
                            if opts.scope.is_some() || opts.force_full {
                                work.push(candidate);
                            } else {
                                summary.bootstrapped += 1;
                            }
                        }
                    }
                }
                _ => work.push(candidate),
            }
        }

        // Bootstrap strategy: bound the first scan of very large repos.
        let (to_parse, to_bootstrap) = if !opts.force_full
            && opts.scope.is_none()
            && work.len() > BOOTSTRAP_THRESHOLD
        {
            let mut work = work;
            let rest = work.split_off(BOOTSTRAP_PARSE_LIMIT);
            (work, rest)
        } else {
            (work, Vec::new())
        };

        let mut processed = 0usize;
        for (batch_no, batch) in to_parse.chunks(BATCH_SIZE).enumerate() {
            let parses = self.parse_batch(batch).await?;

            let mut tx = self.store.pool().begin().await?;
            for (candidate, parse) in batch.iter().zip(parses) {
                let Some(parse) = parse else {
                    // Unreadable or undecodable file: record it at
                    // bootstrap level so a later pass can retry.
                    IndexStore::upsert_file(
                        &mut tx,
                        &candidate.rel,
                        candidate.size,
                        candidate.mtime,
                        IndexLevel::Bootstrap,
                    )
                    .await?;
                    summary.bootstrapped += 1;
                    continue;
                };
                IndexStore::upsert_file(
                    &mut tx,
                    &candidate.rel,
                    candidate.size,
                    candidate.mtime,
                    IndexLevel::Full,
                )
                .await?;
                let (symbols, edges) =
                    IndexStore::replace_file_symbols(&mut tx, &candidate.rel, &parse).await?;
                summary.symbols += symbols;
                summary.call_edges += edges;
                summary.parsed += 1;
            }
            tx.commit().await?;

            processed += batch.len();
            self.write_heartbeat(processed, to_parse.len());

            if (batch_no + 1) % CHECKPOINT_EVERY == 0 {
                self.store.wal_checkpoint().await?;
            }
        }

        if !to_bootstrap.is_empty() {
            let mut tx = self.store.pool().begin().await?;
            for candidate in &to_bootstrap {
                IndexStore::upsert_file(
                    &mut tx,
                    &candidate.rel,
                    candidate.size,
                    candidate.mtime,
                    IndexLevel::Bootstrap,
                )
                .await?;
            }
            tx.commit().await?;
            summary.bootstrapped += to_bootstrap.len();
        }

        if opts.scope.is_none() {
            summary.deleted = self.store.prune_missing(&seen).await?;
        }

        self.store.resolve_calls().await?;
        self.store.wal_checkpoint().await?;

        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            total = summary.total_files,
            parsed = summary.parsed,
            skipped = summary.skipped_unchanged,
            bootstrapped = summary.bootstrapped,
            deleted = summary.deleted,
            elapsed_ms = summary.elapsed_ms,
            "Index pass complete"
        );
        Ok(summary)
    }

    fn collect_candidates(
        &self,
        opts: &IndexOptions,
        ignore_dirs: &HashSet<String>,
    ) -> Result<Vec<Candidate>, IndexError> {
        let root = self.layout.root().path().to_path_buf();
        let base = match &opts.scope {
            Some(scope) => root.join(scope.trim_start_matches('/')),
            None => root.clone(),
        };
        if !base.exists() {
            return Ok(Vec::new());
        }

        let whitelist: Option<HashSet<String>> = if opts.extensions.is_empty() {
            None
        } else {
            Some(opts.extensions.iter().map(|e| e.to_lowercase()).collect())
        };

        let ignore_dirs = ignore_dirs.clone();
        let walker = WalkBuilder::new(&base)
            .hidden(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .follow_links(false)
            .filter_entry(move |entry| {
                if entry.file_type().is_some_and(|t| t.is_dir()) {
                    let name = entry.file_name().to_string_lossy();
                    !ignore_dirs.contains(name.as_ref())
                } else {
                    true
                }
            })
            .build();

        let mut candidates = Vec::new();
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext = ext.to_lowercase();
            if crate::lang::grammar_for_extension(&ext).is_none() {
                continue;
            }
            if let Some(ref whitelist) = whitelist {
                if !whitelist.contains(&ext) {
                    continue;
                }
            }
            let Ok(meta) = entry.metadata() else { continue };
            if meta.len() > MAX_FILE_SIZE {
                continue;
            }
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);

            candidates.push(Candidate {
                abs: path.to_path_buf(),
                rel: self.layout.relative(path),
                ext,
                size: meta.len() as i64,
                mtime,
            });
        }
        candidates.sort_by(|a, b| a.rel.cmp(&b.rel));
        Ok(candidates)
    }

    /// Parse a batch on the blocking pool. `None` marks files that could
    /// not be read or decoded (binary content despite a source extension).
    async fn parse_batch(
        &self,
        batch: &[Candidate],
    ) -> Result<Vec<Option<crate::types::FileParse>>, IndexError> {
        let inputs: Vec<(PathBuf, String, String)> = batch
            .iter()
            .map(|c| (c.abs.clone(), c.rel.clone(), c.ext.clone()))
            .collect();

        tokio::task::spawn_blocking(move || {
            inputs
                .into_iter()
                .map(|(abs, rel, ext)| {
                    let Ok(source) = std::fs::read_to_string(&abs) else {
                        return None;
                    };
                    match parse_file(&rel, &ext, &source) {
                        Ok(parse) => Some(parse),
                        Err(e) => {
                            warn!(file = rel, error = %e, "Parse failed");
                            None
                        }
                    }
                })
                .collect()
        })
        .await
        .map_err(|e| IndexError::Parser("parse batch".to_string(), e.to_string()))
    }

    fn write_heartbeat(&self, processed: usize, total: usize) {
        let path = self.layout.heartbeat_file();
        if let Err(e) = std::fs::write(&path, format!("{}/{}", processed, total)) {
            warn!(error = %e, "Heartbeat write failed");
        }
    }
}
