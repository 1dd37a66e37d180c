//! iMelody/eMelody to JSON event dump

use clap::Parser;
use pwm_player::melody::{Dialect, Event, Metadata, Mode, Signal};
use pwm_player::Session;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "imy2json")]
#[command(version = "0.1.0")]
#[command(about = "Convert iMelody/eMelody ringtones to a JSON event list", long_about = None)]
struct Args {
    /// Input melody file
    #[arg(required_unless_present = "inline", conflicts_with = "inline")]
    input: Option<PathBuf>,

    /// Inline melody body instead of a file
    #[arg(long, value_name = "TEXT", requires = "dialect")]
    inline: Option<String>,

    /// Dialect of the inline body (imelody or emelody)
    #[arg(long)]
    dialect: Option<Dialect>,

    /// Output JSON file (writes to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,

    /// Scan mode; infinite repeats never rewind in either
    #[arg(long, default_value = "locate", value_parser = parse_scan_mode)]
    mode: Mode,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

/// LED / vibration / backlight directive and the melody time it was read at
#[derive(Debug, PartialEq, Eq, Serialize)]
struct TimedSignal {
    time: i64,
    #[serde(flatten)]
    signal: Signal,
}

/// Timed event list of one melody
#[derive(Debug, Serialize)]
struct MelodyJson {
    dialect: Option<Dialect>,
    tick: i32,
    style: u8,
    volume: u8,
    metadata: Metadata,
    events: Vec<Event>,
    signals: Vec<TimedSignal>,
    duration_ms: i64,
}

/// Poll `session` until done, draining signals after every poll
fn scan(
    session: &mut Session,
    mode: Mode,
) -> pwm_player::error::Result<(Vec<Event>, Vec<TimedSignal>)> {
    let mut events = Vec::new();
    let mut signals = Vec::new();
    loop {
        let event = session.next_event(mode)?;
        let time = match &event {
            Event::Note(note) => note.time,
            Event::Rest { time, .. } => *time,
            Event::Done => session.clock(),
        };
        signals.extend(
            session
                .take_signals()
                .into_iter()
                .map(|signal| TimedSignal { time, signal }),
        );
        if event.is_done() {
            return Ok((events, signals));
        }
        events.push(event);
    }
}

fn parse_scan_mode(s: &str) -> Result<Mode, String> {
    match s.parse::<Mode>()? {
        Mode::Play => Err("play mode may never finish; use locate or metadata".to_string()),
        mode => Ok(mode),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut metadata = Metadata::default();
    let mut session = match (&args.input, &args.inline, args.dialect) {
        (_, Some(text), Some(dialect)) => Session::open_text(text, dialect),
        (Some(path), _, _) => {
            let mut session = Session::open_file(path)?;
            session.parse_header(&mut metadata)?;
            session
        }
        _ => return Err("an input file or --inline with --dialect is required".into()),
    };

    // Style, tick and volume as set by the header, before the body changes volume
    let (tick, style, volume) = (session.tick(), session.style(), session.volume());

    let (events, signals) = scan(&mut session, args.mode)?;

    let melody_json = MelodyJson {
        dialect: session.dialect(),
        tick,
        style,
        volume,
        metadata,
        events,
        signals,
        duration_ms: session.clock() / 256,
    };
    session.close();

    let json_string = if args.compact {
        serde_json::to_string(&melody_json)?
    } else {
        serde_json::to_string_pretty(&melody_json)?
    };

    match args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(json_string.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => {
            println!("{}", json_string);
        }
    }

    Ok(())
}
