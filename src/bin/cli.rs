//! m4a CLI: list songs, play them live, or export them to WAV.
//!
//! Usage:
//!   m4a-cli songs game.gba
//!   m4a-cli play game.gba 12
//!   m4a-cli export game.gba --songs 0..20 --out wav --config player.toml

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use m4a_ir::ByteSource;
use m4a_master::{
    ExportOptions, LivePlayer, PlayerConfig, PlaylistEntry, Rom, SharedRom, SongTable, SoundExporter,
    DEFAULT_MAX_BLOCKS, DEFAULT_MIN_ENTRIES,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tick cadence of live playback (about one UI frame).
const TICK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "m4a-cli")]
#[command(about = "Play and export MP2K (m4a) music from GBA ROM images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the songs of a ROM
    Songs {
        rom: PathBuf,
        /// Song table position (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_addr)]
        table: Option<usize>,
    },
    /// Play one song on the default audio device
    Play {
        rom: PathBuf,
        song: u16,
        #[arg(long, value_parser = parse_addr)]
        table: Option<usize>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Render songs to WAV files
    Export {
        rom: PathBuf,
        /// Song selection: `N`, `A..B` or `A..`
        #[arg(long)]
        songs: Option<String>,
        /// Output directory (overrides the config)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Render without writing files
        #[arg(long)]
        benchmark: bool,
        /// One file per track
        #[arg(long)]
        separate: bool,
        #[arg(long, value_parser = parse_addr)]
        table: Option<usize>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Songs { rom, table } => list_songs(&rom, table),
        Commands::Play { rom, song, table, config } => play(&rom, song, table, config.as_deref()),
        Commands::Export { rom, songs, out, benchmark, separate, table, config } => {
            export(&rom, songs.as_deref(), out, benchmark, separate, table, config.as_deref())
        }
    }
}

fn load_rom(path: &Path, table: Option<usize>) -> Result<(SharedRom, SongTable)> {
    let rom = Rom::open(path).with_context(|| format!("failed to read {}", path.display()))?;
    if let Some(header) = rom.header() {
        info!(title = %header.title(), code = %header.game_code(), "ROM loaded");
    }
    let song_table = match table {
        Some(pos) => SongTable::at(&rom, pos),
        None => SongTable::locate(&rom, DEFAULT_MIN_ENTRIES),
    }
    .context("no song table")?;
    Ok((Arc::new(rom), song_table))
}

fn load_config(path: Option<&Path>) -> Result<PlayerConfig> {
    match path {
        Some(p) => PlayerConfig::load(p).with_context(|| format!("failed to load {}", p.display())),
        None => Ok(PlayerConfig::default()),
    }
}

fn list_songs(path: &Path, table: Option<usize>) -> Result<()> {
    let (rom, song_table) = load_rom(path, table)?;
    println!("Song table at {:#08x}, {} songs", song_table.pos(), song_table.len());
    for (uid, entry) in song_table.entries().iter().enumerate() {
        let tracks = song_table.pos_of_song(uid as u16).and_then(|p| rom.read_u8(p)).unwrap_or(0);
        println!("{uid:4}  {:#010x}  player {}  tracks {tracks}", entry.header_ptr, entry.player);
    }
    Ok(())
}

fn play(path: &Path, song: u16, table: Option<usize>, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let (rom, song_table) = load_rom(path, table)?;
    let mut player = LivePlayer::with_default_device(rom, song_table, config.mp2k_mode(), config.engine_mode())
        .context("cannot open audio output")?;
    player.play_song(song)?;
    println!("Playing song {song}...");

    while player.is_playing() {
        player.tick();
        let state = player.visualizer_state();
        let notes: u32 = state.tracks.iter().map(|t| t.active_notes.count_ones()).sum();
        print!("\rTempo: {:3} | Channels: {:2} | Notes: {:2}", state.tempo, state.active_channels, notes);
        let _ = std::io::stdout().flush();
        std::thread::sleep(TICK_INTERVAL);
    }
    println!("\rDone.                                   ");
    Ok(())
}

fn export(
    path: &Path,
    songs: Option<&str>,
    out: Option<PathBuf>,
    benchmark: bool,
    separate: bool,
    table: Option<usize>,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let (rom, song_table) = load_rom(path, table)?;

    let mut entries = if config.playlist.is_empty() { song_table.playlist() } else { config.playlist.clone() };
    if let Some(sel) = songs {
        let range = parse_song_range(sel, song_table.len())?;
        entries.retain(|e: &PlaylistEntry| range.contains(&(e.id as usize)));
    }

    let mut options = ExportOptions::new(
        out.unwrap_or_else(|| config.wav_output_dir.clone()),
        config.mp2k_mode(),
        config.engine_mode(),
    );
    options.benchmark_only = benchmark;
    options.separate_tracks = separate;
    options.max_blocks = DEFAULT_MAX_BLOCKS / 60 * config.max_minutes as u64;

    let exporter = SoundExporter::new(rom, song_table, options);
    let summary = exporter.export(&entries)?;
    println!(
        "{} songs, {} files, {} blocks in {:.2}s ({:.0} blocks/s)",
        summary.songs.len(),
        summary.files_written,
        summary.blocks_rendered,
        summary.elapsed.as_secs_f64(),
        summary.blocks_per_second
    );
    Ok(())
}

fn parse_addr(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

/// `N`, `A..B` (exclusive) or `A..` (to the end of the table).
fn parse_song_range(s: &str, count: usize) -> Result<std::ops::Range<usize>> {
    let range = match s.split_once("..") {
        Some((a, "")) => a.parse::<usize>()?..count,
        Some((a, b)) => a.parse::<usize>()?..b.parse::<usize>()?,
        None => {
            let n = s.parse::<usize>()?;
            n..n + 1
        }
    };
    if range.is_empty() {
        bail!("empty song range {s:?}");
    }
    Ok(range)
}
