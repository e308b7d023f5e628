//! drumkit CLI: offline WAV rendering and live playback of step patterns.
//!
//! Usage:
//!   dm-cli render --wav out.wav --tempo 96 --pattern 2
//!   dm-cli play --sample 0=kick.wav --filter lowpass --cutoff 800

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use dm_master::{BusPins, Controller, ControllerError, EngineCommand, FilterType, Kit};
use simple_logger::SimpleLogger;

#[derive(Parser)]
#[command(name = "dm-cli")]
#[command(about = "Eight-voice drum machine: render or play step patterns")]
struct Cli {
    /// Log engine and sequencer activity
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the selected pattern to a WAV file
    Render {
        #[arg(long, value_name = "FILE")]
        wav: PathBuf,
        #[arg(long, default_value_t = 8.0)]
        seconds: f32,
        #[command(flatten)]
        setup: Setup,
    },
    /// Play the selected pattern on the default audio device
    Play {
        /// Stop after this many seconds (default: run until interrupted)
        #[arg(long)]
        seconds: Option<f32>,
        #[command(flatten)]
        setup: Setup,
    },
}

#[derive(Args)]
struct Setup {
    /// Tempo in BPM (40-300)
    #[arg(long, default_value_t = 120.0)]
    tempo: f32,

    /// Pattern to play (0-15); 0-2 hold demo grooves
    #[arg(long, default_value_t = 0)]
    pattern: usize,

    /// Replace a pad's sound with a WAV file
    #[arg(long = "sample", value_name = "PAD=FILE", value_parser = parse_pad_sample)]
    samples: Vec<(usize, PathBuf)>,

    /// Global filter: name (e.g. lowpass, highshelf) or id 0-9
    #[arg(long, value_parser = parse_filter)]
    filter: Option<FilterType>,

    #[arg(long, default_value_t = 1000.0)]
    cutoff: f32,

    #[arg(long, default_value_t = 1.0)]
    resonance: f32,

    /// Filter gain in dB for peaking and shelf filters
    #[arg(long, default_value_t = 0.0)]
    gain: f32,

    /// Bit depth of the global crusher (4-16)
    #[arg(long, default_value_t = 16)]
    bits: u8,

    /// Global distortion amount (0-100)
    #[arg(long, default_value_t = 0.0)]
    distortion: f32,

    /// Master volume (0-150)
    #[arg(long, default_value_t = 100)]
    volume: u8,
}

fn parse_pad_sample(s: &str) -> Result<(usize, PathBuf), String> {
    let (pad, file) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PAD=FILE, got '{}'", s))?;
    let pad = pad
        .trim()
        .parse()
        .map_err(|_| format!("invalid pad '{}'", pad))?;
    Ok((pad, PathBuf::from(file)))
}

fn parse_filter(s: &str) -> Result<FilterType, String> {
    if let Ok(id) = s.parse::<u8>() {
        return FilterType::from_id(id).ok_or_else(|| format!("no filter with id {}", id));
    }
    let wanted = normalize(s);
    FilterType::ALL
        .iter()
        .copied()
        .find(|kind| normalize(kind.name()) == wanted)
        .ok_or_else(|| format!("unknown filter '{}'", s))
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("logger: {}", e);
    }

    let result = match cli.command {
        Commands::Render { wav, seconds, setup } => render(&wav, seconds, &setup),
        Commands::Play { seconds, setup } => play(seconds, &setup),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn build(setup: &Setup) -> Result<Controller, ControllerError> {
    let mut kit = Kit::synthesized();
    for (pad, path) in &setup.samples {
        kit.load_wav(*pad, path)?;
    }
    let mut ctl = Controller::with_kit(kit);

    {
        let mut seq = ctl.sequencer();
        seq.set_tempo(setup.tempo);
        seq.select_pattern(setup.pattern);
    }

    if let Some(kind) = setup.filter {
        if let Some(engine) = ctl.engine_mut() {
            engine.set_filter(kind, setup.cutoff, setup.resonance, setup.gain);
        }
    }
    ctl.send(EngineCommand::SetBitDepth(setup.bits));
    ctl.send(EngineCommand::SetDistortion(setup.distortion));
    ctl.send(EngineCommand::SetMasterVolume(setup.volume));
    Ok(ctl)
}

fn render(path: &Path, seconds: f32, setup: &Setup) -> Result<(), ControllerError> {
    let mut ctl = build(setup)?;
    println!("Rendering {:.1}s of pattern {} to {}...", seconds, setup.pattern, path.display());
    let frames = ctl.render_to_wav(path, seconds)?;
    println!("Wrote {} frames.", frames);
    Ok(())
}

fn play(seconds: Option<f32>, setup: &Setup) -> Result<(), ControllerError> {
    let mut ctl = build(setup)?;
    ctl.play(BusPins::default())?;
    println!("Playing pattern {} at {:.0} BPM...", setup.pattern, ctl.sequencer().tempo());
    println!();

    let start = Instant::now();
    let limit = seconds.and_then(|s| Duration::try_from_secs_f32(s).ok());
    while ctl.is_playing() && limit.map_or(true, |l| start.elapsed() < l) {
        let step = ctl.current_step();
        let bar: String = (0..16).map(|s| if s == step { '#' } else { '.' }).collect();
        print!("\r{} | step {:02} | cpu {:5.1}%", bar, step, ctl.cpu_load() * 100.0);
        let _ = std::io::stdout().flush();
        std::thread::sleep(Duration::from_millis(20));
    }

    ctl.stop();
    println!("\rDone.{:40}", "");
    Ok(())
}
