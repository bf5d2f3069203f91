//! Build orchestration: enumerate inputs, run the pipeline, finalize.
//!
//! # Architecture
//!
//! ```text
//!   input dir ──► enumerate (exactly 3 regular files, sorted by name)
//!                      │
//!        ┌─────────────┼─────────────┐
//!        ▼             ▼             ▼
//!   ┌─────────┐   ┌─────────┐   ┌─────────┐
//!   │reader 0 │   │reader 1 │   │reader 2 │   one thread per file,
//!   │bit 1<<0 │   │bit 1<<1 │   │bit 1<<2 │   gzip-transparent
//!   └────┬────┘   └────┬────┘   └────┬────┘
//!        └─────────────┼─────────────┘
//!                      ▼
//!           bounded record channel  ◄── backpressure bound
//!                      │
//!        ┌─────────────┼─────────────┐
//!        ▼             ▼             ▼
//!   ┌─────────┐   ┌─────────┐   ┌─────────┐
//!   │worker 0 │   │worker 1 │   │worker N │   trim → length gate →
//!   └────┬────┘   └────┬────┘   └────┬────┘   local batch → flush
//!        └─────────────┼─────────────┘
//!                      ▼
//!               ShardedTable (S shards)
//!                      │
//!          join all readers and workers
//!                      ▼
//!           finalize(threshold) popcount sweep ──► Validator
//! ```
//!
//! # Correctness Invariants
//!
//! - **Happens-before**: every worker is joined before `finalize` runs; the
//!   table is moved out of its `Arc` only after the joins, so a live merge
//!   cannot race the sweep.
//! - **First error wins**: readers report critical errors on a dedicated
//!   channel sized to the file count (sends never block); the orchestrator
//!   returns the first one after draining the pipeline.
//! - **No deadlock on failure**: a failing reader raises the abort flag and
//!   stops; workers keep receiving (discarding) until the channel closes, so
//!   a reader blocked on a full channel always unblocks. If every worker
//!   dies, the disconnected channel unblocks the readers instead.
//! - **Fresh state per build**: channel, table, and flags are allocated per
//!   call; consecutive builds share nothing.

use crate::cancel::{CancelToken, StopSignal};
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::reader::{LineReader, Record};
use crate::stats::BuildStats;
use crate::table::{ShardedTable, MAX_FILES};
use crate::validator::Validator;
use crate::worker::run_worker;

use crossbeam_channel::bounded;
use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// The fixed input contract: exactly this many regular files per directory.
pub const REQUIRED_FILE_COUNT: usize = 3;

/// Runs the full pipeline over `dir` with default configuration.
///
/// One-shot: on success the returned [`Validator`] is frozen; on failure no
/// validator exists and the first critical error is returned.
pub fn build(dir: impl AsRef<Path>) -> Result<Validator, BuildError> {
    build_with_config(dir, BuildConfig::default())
}

/// Runs the full pipeline with explicit configuration.
pub fn build_with_config(
    dir: impl AsRef<Path>,
    config: BuildConfig,
) -> Result<Validator, BuildError> {
    build_with_cancel(dir, config, CancelToken::new())
}

/// Runs the full pipeline with a caller-held cancellation token.
///
/// Raising the token mid-build makes readers stop at their next buffer
/// refill; the pipeline drains, partial state is discarded, and the build
/// fails with [`BuildError::Cancelled`] (unless a reader error happened
/// first, which takes precedence).
pub fn build_with_cancel(
    dir: impl AsRef<Path>,
    config: BuildConfig,
    token: CancelToken,
) -> Result<Validator, BuildError> {
    config.validate();
    let files = enumerate_inputs(dir.as_ref())?;
    run_pipeline(&files, &config, token)
}

/// Non-recursive enumeration of the directory's regular files.
///
/// Directory entries and symlinks to directories are skipped; a symlink to a
/// regular file counts (metadata follows links, matching the stat-based
/// contract). File indices are assigned by lexicographic file-name order, so
/// the presence bits are deterministic for a given directory content.
fn enumerate_inputs(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let meta = fs::metadata(dir).map_err(|_| BuildError::DirectoryMissing {
        path: dir.to_path_buf(),
    })?;
    if !meta.is_dir() {
        return Err(BuildError::DirectoryMissing {
            path: dir.to_path_buf(),
        });
    }

    let entries = fs::read_dir(dir).map_err(|source| BuildError::FileOpenFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_e) => {
                #[cfg(debug_assertions)]
                eprintln!("[build] skipping unreadable directory entry: {_e}");
                continue;
            }
        };
        let path = entry.path();
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => {}
            Err(_e) => {
                #[cfg(debug_assertions)]
                eprintln!("[build] skipping unstat-able entry {}: {_e}", path.display());
            }
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if files.len() != REQUIRED_FILE_COUNT {
        return Err(BuildError::WrongFileCount {
            path: dir.to_path_buf(),
            found: files.len(),
        });
    }
    Ok(files)
}

fn run_pipeline(
    files: &[PathBuf],
    config: &BuildConfig,
    token: CancelToken,
) -> Result<Validator, BuildError> {
    let file_count = files.len();
    debug_assert!(file_count <= MAX_FILES, "mask width bounds the file count");

    let stop = StopSignal::new(token.clone());
    let (rec_tx, rec_rx) = bounded::<Record>(config.channel_capacity_for(file_count));
    let (err_tx, err_rx) = bounded::<BuildError>(file_count);
    let table = Arc::new(ShardedTable::new(config.shard_count));

    let mut reader_handles = Vec::with_capacity(file_count);
    for (index, path) in files.iter().enumerate() {
        let reader = LineReader::new(path.clone(), 1 << index, config.max_line_bytes);
        let rec_tx = rec_tx.clone();
        let err_tx = err_tx.clone();
        let stop = stop.clone();
        let handle = thread::Builder::new()
            .name(format!("sieve-reader-{index}"))
            .spawn(move || match reader.run(&rec_tx, &stop) {
                Ok(lines) => lines,
                Err(err) => {
                    // Siblings stop quietly at their next refill check; the
                    // error channel is sized so this send cannot block.
                    stop.raise_abort();
                    let _ = err_tx.send(err);
                    0
                }
            })
            .expect("failed to spawn reader thread");
        reader_handles.push(handle);
    }
    // Readers hold the only sender clones now; the channel closes when the
    // last reader exits, which is what terminates the workers.
    drop(rec_tx);
    drop(err_tx);

    let worker_count = config.worker_count.max(1);
    let mut worker_handles = Vec::with_capacity(worker_count);
    for index in 0..worker_count {
        let rec_rx = rec_rx.clone();
        let table = Arc::clone(&table);
        let stop = stop.clone();
        let flush_threshold = config.batch_flush_threshold;
        #[cfg(test)]
        let panic_here = config.inject_worker_panic == Some(index);
        let handle = thread::Builder::new()
            .name(format!("sieve-worker-{index}"))
            .spawn(move || {
                #[cfg(test)]
                if panic_here {
                    panic!("injected worker panic");
                }
                run_worker(&rec_rx, &table, flush_threshold, &stop)
            })
            .expect("failed to spawn worker thread");
        worker_handles.push(handle);
    }
    drop(rec_rx);

    let mut stats = BuildStats {
        files: file_count as u64,
        ..BuildStats::default()
    };
    let mut first_panic: Option<String> = None;

    for handle in reader_handles {
        match handle.join() {
            Ok(lines) => stats.lines_read += lines,
            Err(payload) => {
                stop.raise_abort();
                note_panic(&mut first_panic, payload);
            }
        }
    }
    for handle in worker_handles {
        match handle.join() {
            Ok(worker_stats) => {
                stats.records_seen += worker_stats.seen;
                stats.records_accepted += worker_stats.accepted;
            }
            Err(payload) => note_panic(&mut first_panic, payload),
        }
    }

    if let Some(message) = first_panic {
        return Err(BuildError::InternalPanic { message });
    }
    if let Some(err) = err_rx.try_iter().next() {
        return Err(err);
    }
    if token.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    // All merging threads are joined; the Arc has one owner left.
    let table = Arc::into_inner(table).expect("table still shared after joins");
    stats.codes_tracked = table.tracked_count();
    let codes = table.finalize(config.validity_threshold);
    stats.codes_validated = codes.len() as u64;

    Ok(Validator::new(codes, stats))
}

/// Keeps only the first panic payload, as a best-effort message.
fn note_panic(slot: &mut Option<String>, payload: Box<dyn Any + Send>) {
    if slot.is_some() {
        return;
    }
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_owned()
    };
    *slot = Some(message);
}
