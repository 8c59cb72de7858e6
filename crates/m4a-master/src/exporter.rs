//! Batch export of songs to WAV files.
//!
//! Songs are rendered in parallel. Each worker claims song indices from a
//! shared [`WorkQueue`] and renders them with a playback context it owns;
//! nothing but the queue counter and the cancel flag is shared.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use m4a_engine::{PlaybackContext, SharedRom};
use m4a_formats::{SongTable, WavSink};
use m4a_ir::{EngineSoundMode, Frame, Mp2kSoundMode, PlaylistEntry, AGB_FPS, STREAM_SAMPLE_RATE};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Sixty minutes of audio.
pub const DEFAULT_MAX_BLOCKS: u64 = 60 * 60 * AGB_FPS as u64;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("an export is already running")]
    AlreadyRunning,
    #[error("{0} exists and is not a directory")]
    NotADirectory(PathBuf),
    #[error("cannot create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("export worker {worker} panicked")]
    WorkerPanicked { worker: usize },
}

/// Export settings. A snapshot: the exporter never changes it.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Render everything but write no files.
    pub benchmark_only: bool,
    /// One file per track instead of one per song.
    pub separate_tracks: bool,
    /// Safety cap for songs that never end.
    pub max_blocks: u64,
    /// Worker count override; defaults to the available parallelism.
    pub threads: Option<usize>,
    pub mp2k_mode: Mp2kSoundMode,
    pub engine_mode: EngineSoundMode,
}

impl ExportOptions {
    pub fn new(output_dir: impl Into<PathBuf>, mp2k_mode: Mp2kSoundMode, engine_mode: EngineSoundMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            benchmark_only: false,
            separate_tracks: false,
            max_blocks: DEFAULT_MAX_BLOCKS,
            threads: None,
            mp2k_mode,
            engine_mode,
        }
    }
}

/// Hands out `0..len` exactly once across threads.
#[derive(Debug)]
pub struct WorkQueue {
    next: AtomicUsize,
    len: usize,
}

impl WorkQueue {
    pub fn new(len: usize) -> Self {
        Self { next: AtomicUsize::new(0), len }
    }

    /// Claim the next unclaimed index.
    pub fn claim(&self) -> Option<usize> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        (idx < self.len).then_some(idx)
    }
}

/// Stops a running export: workers claim no new songs and abandon the one
/// in progress at the next block.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Outcome for one playlist entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SongReport {
    /// Index into the exported entry list.
    pub index: usize,
    pub blocks: u64,
    pub worker: usize,
    pub files_written: usize,
}

#[derive(Clone, Debug)]
pub struct ExportSummary {
    pub files_written: usize,
    pub blocks_rendered: u64,
    pub elapsed: Duration,
    pub blocks_per_second: f64,
    /// Sorted by index.
    pub songs: Vec<SongReport>,
    pub cancelled: bool,
}

/// Renders playlists to WAV. At most one export runs at a time.
pub struct SoundExporter {
    rom: SharedRom,
    table: SongTable,
    options: ExportOptions,
    running: AtomicBool,
    cancel: CancelHandle,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SoundExporter {
    pub fn new(rom: SharedRom, song_table: SongTable, options: ExportOptions) -> Self {
        Self { rom, table: song_table, options, running: AtomicBool::new(false), cancel: CancelHandle::default() }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Handle for cancelling the current export. A cancel issued while no
    /// export runs applies to the next one.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn acquire(&self) -> Result<RunGuard<'_>, ExportError> {
        self.running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| ExportError::AlreadyRunning)?;
        Ok(RunGuard(&self.running))
    }

    /// Render every entry; blocks until all workers are done.
    pub fn export(&self, entries: &[PlaylistEntry]) -> Result<ExportSummary, ExportError> {
        let _guard = self.acquire()?;
        if !self.options.benchmark_only {
            prepare_dir(&self.options.output_dir)?;
        }

        let workers = self
            .options
            .threads
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()))
            .min(entries.len())
            .max(1);
        info!(songs = entries.len(), workers, benchmark = self.options.benchmark_only, "export started");

        let queue = WorkQueue::new(entries.len());
        let start = Instant::now();
        let songs = run_workers(workers, &queue, &self.cancel, |index, worker| {
            self.render_song(index, &entries[index], worker)
        });
        let mut songs = match songs {
            Ok(songs) => songs,
            Err(err) => {
                self.cancel.reset();
                return Err(err);
            }
        };
        let elapsed = start.elapsed();
        songs.sort_by_key(|r| r.index);

        let cancelled = self.cancel.is_cancelled();
        self.cancel.reset();
        let blocks_rendered: u64 = songs.iter().map(|r| r.blocks).sum();
        let files_written: usize = songs.iter().map(|r| r.files_written).sum();
        let secs = elapsed.as_secs_f64();
        let blocks_per_second = if secs > 0.0 { blocks_rendered as f64 / secs } else { 0.0 };
        info!(
            files = files_written,
            blocks = blocks_rendered,
            elapsed_ms = elapsed.as_millis() as u64,
            blocks_per_second = blocks_per_second.round() as u64,
            cancelled,
            "export finished"
        );
        Ok(ExportSummary { files_written, blocks_rendered, elapsed, blocks_per_second, songs, cancelled })
    }

    fn render_song(&self, index: usize, entry: &PlaylistEntry, worker: usize) -> SongReport {
        let mut report = SongReport { index, blocks: 0, worker, files_written: 0 };
        let Some(pos) = self.table.pos_of_song(entry.id) else {
            warn!(song = entry.id, name = %entry.name, "song not in song table, skipped");
            return report;
        };
        let mut ctx = PlaybackContext::new(Arc::clone(&self.rom), self.options.mp2k_mode, self.options.engine_mode);
        let player = self.table.player_of_song(entry.id).unwrap_or(0);
        if let Err(err) = ctx.init_song_for_player(pos, player) {
            warn!(song = entry.id, %err, "song cannot be started, skipped");
            return report;
        }

        let rank = index + 1;
        let mut sinks = if self.options.benchmark_only {
            Vec::new()
        } else if self.options.separate_tracks {
            (0..ctx.tracks().len())
                .map(|t| {
                    let name = format!("{rank:03} - {}.{t:02}.wav", entry.file_safe_name());
                    open_sink(&self.options.output_dir.join(name))
                })
                .collect()
        } else {
            let name = format!("{rank:03} - {}.wav", entry.file_safe_name());
            match open_sink(&self.options.output_dir.join(name)) {
                Some(sink) => vec![Some(sink)],
                None => return report,
            }
        };

        let pad_start = pad_frames(self.options.engine_mode.pad_start_secs);
        let pad_end = pad_frames(self.options.engine_mode.pad_end_secs);
        for_each_sink(&mut sinks, |s| s.write_silence(pad_start));

        while !ctx.has_ended() {
            if self.cancel.is_cancelled() {
                debug!(song = entry.id, blocks = report.blocks, "song abandoned");
                break;
            }
            if report.blocks >= self.options.max_blocks {
                warn!(song = entry.id, blocks = report.blocks, "song did not end, cut off");
                break;
            }
            ctx.sound_main();
            report.blocks += 1;
            if self.options.separate_tracks {
                let buffers = ctx.track_buffers();
                for (sink, buf) in sinks.iter_mut().zip(buffers) {
                    write_or_drop(sink, buf.frames());
                }
            } else if let Some(sink) = sinks.first_mut() {
                write_or_drop(sink, ctx.master().frames());
            }
        }

        for_each_sink(&mut sinks, |s| s.write_silence(pad_end));
        for sink in sinks.into_iter().flatten() {
            match sink.finalize() {
                Ok(_) => report.files_written += 1,
                Err(err) => error!(%err, "cannot finalize output file"),
            }
        }
        info!(rank, name = %entry.name, blocks = report.blocks, worker, "song exported");
        report
    }
}

type FileSink = WavSink<BufWriter<File>>;

fn prepare_dir(dir: &Path) -> Result<(), ExportError> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ExportError::NotADirectory(dir.to_path_buf()));
        }
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir { path: dir.to_path_buf(), source })
}

fn open_sink(path: &Path) -> Option<FileSink> {
    match WavSink::create(path, STREAM_SAMPLE_RATE) {
        Ok(sink) => Some(sink),
        Err(err) => {
            error!(path = %path.display(), %err, "cannot open output file, skipped");
            None
        }
    }
}

/// Drain `queue` with `workers` scoped threads running `job(index, worker)`.
/// A panicking worker fails the whole run.
fn run_workers<F>(workers: usize, queue: &WorkQueue, cancel: &CancelHandle, job: F) -> Result<Vec<SongReport>, ExportError>
where
    F: Fn(usize, usize) -> SongReport + Sync,
{
    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let job = &job;
                s.spawn(move || {
                    let mut reports = Vec::new();
                    while !cancel.is_cancelled() {
                        let Some(index) = queue.claim() else {
                            break;
                        };
                        reports.push(job(index, worker));
                    }
                    reports
                })
            })
            .collect();

        let mut songs = Vec::new();
        let mut panicked = None;
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(reports) => songs.extend(reports),
                Err(_) => {
                    error!(worker, "export worker panicked");
                    panicked.get_or_insert(worker);
                }
            }
        }
        match panicked {
            Some(worker) => Err(ExportError::WorkerPanicked { worker }),
            None => Ok(songs),
        }
    })
}

fn pad_frames(secs: f64) -> u64 {
    (secs.max(0.0) * STREAM_SAMPLE_RATE as f64).round() as u64
}

fn write_or_drop(sink: &mut Option<FileSink>, frames: &[Frame]) {
    if let Some(s) = sink {
        if let Err(err) = s.write_frames(frames) {
            error!(%err, "write failed, output file abandoned");
            *sink = None;
        }
    }
}

fn for_each_sink(
    sinks: &mut [Option<FileSink>],
    mut f: impl FnMut(&mut FileSink) -> Result<(), m4a_formats::FormatError>,
) {
    for sink in sinks.iter_mut() {
        if let Some(s) = sink {
            if let Err(err) = f(s) {
                error!(%err, "write failed, output file abandoned");
                *sink = None;
            }
        }
    }
}
