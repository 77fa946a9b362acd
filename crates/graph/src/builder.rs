//! Parallel graph builder: walk the roots through the VFS with ignore
//! pruning, parse collected files on a rayon pool, then merge every result
//! into the target graph.
//!
//! The build is best-effort — a file that fails to read or parse is skipped
//! and counted, never fatal — and cooperative: workers check the
//! cancellation token before picking up the next file and before merging.

use crate::graph::ProjectGraph;
use crate::parser::{ParseResult, ParserRegistry};
use keystorm_core::{CancelToken, IgnoreMatcher, DEFAULT_WORKER_COUNT};
use keystorm_vfs::{Vfs, VfsError, WalkControl};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Vfs(#[from] VfsError),
    #[error("worker pool construction failed: {0}")]
    Pool(String),
    #[error("build cancelled")]
    Cancelled,
}

/// Tuning knobs for one build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub worker_count: usize,
    /// Files larger than this are skipped.
    pub max_file_size: u64,
    pub cancel: CancelToken,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            worker_count: DEFAULT_WORKER_COUNT,
            max_file_size: keystorm_core::DEFAULT_MAX_FILE_SIZE,
            cancel: CancelToken::new(),
        }
    }
}

/// Counters from one build run.
#[derive(Debug, Default, Clone)]
pub struct BuildStats {
    pub files_collected: usize,
    pub files_parsed: u64,
    pub files_skipped: u64,
    pub parse_errors: u64,
    pub nodes_added: u64,
    pub edges_added: u64,
    pub duration_ms: u64,
}

/// Builds a [`ProjectGraph`] from directory roots.
pub struct GraphBuilder {
    vfs: Arc<dyn Vfs>,
    registry: Arc<ParserRegistry>,
    ignore: Arc<IgnoreMatcher>,
}

impl GraphBuilder {
    pub fn new(vfs: Arc<dyn Vfs>, registry: Arc<ParserRegistry>, ignore: Arc<IgnoreMatcher>) -> Self {
        GraphBuilder { vfs, registry, ignore }
    }

    /// Walk `roots`, parse in parallel, and merge into `graph`.
    pub fn build(
        &self,
        roots: &[String],
        graph: &ProjectGraph,
        options: &BuildOptions,
    ) -> Result<BuildStats, BuildError> {
        let started = Instant::now();
        let mut stats = BuildStats::default();

        // Phase 1: collect candidate files, pruning ignored directories.
        let mut files: Vec<(String, u64)> = Vec::new();
        for root in roots {
            if options.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            self.collect_files(root, options, &mut files)?;
        }
        stats.files_collected = files.len();
        debug!(files = files.len(), "collected files for graph build");

        // Phase 2: parse on the worker pool.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.worker_count.max(1))
            .build()
            .map_err(|e| BuildError::Pool(e.to_string()))?;

        let parsed = AtomicU64::new(0);
        let skipped = AtomicU64::new(0);
        let errors = AtomicU64::new(0);

        let results: Vec<ParseResult> = pool.install(|| {
            files
                .par_iter()
                .filter_map(|(path, size)| {
                    if options.cancel.is_cancelled() {
                        return None;
                    }
                    if *size > options.max_file_size {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        return None;
                    }
                    let content = match self.vfs.read_file(path) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            warn!(path, error = %e, "skipping unreadable file");
                            return None;
                        }
                    };
                    let parser = self.registry.parser_for(path);
                    match parser.parse(path, &content) {
                        Ok(result) => {
                            parsed.fetch_add(1, Ordering::Relaxed);
                            Some(result)
                        }
                        Err(e) => {
                            errors.fetch_add(1, Ordering::Relaxed);
                            warn!(path, error = %e, "skipping unparseable file");
                            None
                        }
                    }
                })
                .collect()
        });

        stats.files_parsed = parsed.into_inner();
        stats.files_skipped = skipped.into_inner();
        stats.parse_errors = errors.into_inner();

        if options.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        // Phase 3: merge — all nodes first so cross-file edges resolve, then
        // all edges. Duplicates are expected (every file re-emits its package
        // node) and first-write-wins.
        for result in &results {
            for node in &result.nodes {
                if graph.add_node(node.clone()).is_ok() {
                    stats.nodes_added += 1;
                }
            }
        }
        for result in &results {
            for edge in &result.edges {
                if graph.add_edge(edge.clone()).is_ok() {
                    stats.edges_added += 1;
                }
            }
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            files = stats.files_collected,
            nodes = stats.nodes_added,
            edges = stats.edges_added,
            errors = stats.parse_errors,
            time_ms = stats.duration_ms,
            "graph build complete"
        );
        Ok(stats)
    }

    fn collect_files(
        &self,
        root: &str,
        options: &BuildOptions,
        files: &mut Vec<(String, u64)>,
    ) -> Result<(), BuildError> {
        let ignore = Arc::clone(&self.ignore);
        let cancel = options.cancel.clone();
        // Patterns evaluate relative to the root so directories above the
        // workspace never match.
        let root_owned = root.to_string();
        self.vfs.walk(root, &mut |info| {
            if cancel.is_cancelled() {
                return WalkControl::Stop;
            }
            if info.is_dir {
                if info.path != root_owned && ignore.matches_relative(&info.path, &root_owned, true)
                {
                    return WalkControl::SkipDir;
                }
                return WalkControl::Continue;
            }
            if !ignore.matches_relative(&info.path, &root_owned, false) {
                files.push((info.path.clone(), info.size));
            }
            WalkControl::Continue
        })?;
        Ok(())
    }
}
