use clap::{ArgGroup, Parser};
use pwm_player::device::pwm::{BUZZER_ENV, DEFAULT_CHIP_DIR};
use pwm_player::device::{PwmBuzzer, Recorder, ToneDevice};
use pwm_player::melody::{Dialect, Metadata};
use pwm_player::player::PlaybackSummary;
use pwm_player::{Error, Player, Session};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "pwm-player")]
#[command(version = "0.1.0")]
#[command(about = "Play iMelody/eMelody ringtones on a PWM buzzer", long_about = None)]
#[command(group(ArgGroup::new("melody").required(true).multiple(false)))]
struct Args {
    /// iMelody file
    #[arg(short = 'i', long, group = "melody")]
    imelody_file: Option<PathBuf>,

    /// eMelody file
    #[arg(short = 'e', long, group = "melody")]
    emelody_file: Option<PathBuf>,

    /// Inline iMelody body, e.g. "c4d4e4"
    #[arg(short = 'I', long, group = "melody", value_name = "TEXT")]
    imelody: Option<String>,

    /// Inline eMelody body
    #[arg(short = 'E', long, group = "melody", value_name = "TEXT")]
    emelody: Option<String>,

    /// PWM channel of the buzzer
    #[arg(short, long, env = BUZZER_ENV)]
    pwm: Option<u32>,

    /// sysfs PWM chip directory
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CHIP_DIR)]
    pwm_chip: PathBuf,

    /// Velocity scaling in percent
    #[arg(short, long, value_name = "PERCENT", default_value_t = 100)]
    volume: u32,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,

    /// Record device calls instead of driving the buzzer
    #[arg(short = 'n', long)]
    dry_run: bool,
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut session = open_session(&args)?;

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!("failed to install interrupt handler: {}", e);
    }

    if args.dry_run {
        // @0 sections never end in play mode; only the interrupt stops them
        let mut recorder = Recorder::new();
        let summary = Player::new(&mut recorder)
            .realtime(false)
            .interrupt(interrupt)
            .play(&mut session)?;
        for call in &recorder.calls {
            println!("{}", serde_json::to_string(call)?);
        }
        report(&summary);
        session.close();
        return Ok(());
    }

    let channel = args.pwm.ok_or_else(|| {
        Error::NoDevice(format!(
            "no {} environment variable set or PWM channel given",
            BUZZER_ENV
        ))
    })?;
    let buzzer = PwmBuzzer::open(&args.pwm_chip, channel, args.volume)?;

    let summary = play(buzzer, &mut session, interrupt)?;
    report(&summary);
    session.close();
    Ok(())
}

fn open_session(args: &Args) -> Result<Session, Error> {
    if let Some(text) = &args.imelody {
        return Ok(Session::open_text(text, Dialect::IMelody));
    }
    if let Some(text) = &args.emelody {
        return Ok(Session::open_text(text, Dialect::EMelody));
    }

    let (path, expected) = match (&args.imelody_file, &args.emelody_file) {
        (Some(path), _) => (path, Dialect::IMelody),
        (None, Some(path)) => (path, Dialect::EMelody),
        (None, None) => return Err(Error::InvalidState("no melody given".to_string())),
    };
    open_file(path, expected)
}

fn open_file(path: &Path, expected: Dialect) -> Result<Session, Error> {
    let mut session = Session::open_file(path)?;
    if let Some(found) = session.dialect() {
        if found != expected {
            tracing::warn!("{} is an {} file, not {}", path.display(), found, expected);
        }
    }

    let mut metadata = Metadata::default();
    session.parse_header(&mut metadata)?;
    if let Some(title) = &metadata.title {
        tracing::info!("title: {}", title);
    }
    if let Some(author) = &metadata.author {
        tracing::info!("composer: {}", author);
    }
    Ok(session)
}

fn play<D: ToneDevice>(
    device: D,
    session: &mut Session,
    interrupt: Arc<AtomicBool>,
) -> Result<PlaybackSummary, Error> {
    Player::new(device).interrupt(interrupt).play(session)
}

fn report(summary: &PlaybackSummary) {
    println!(
        "{} notes, {} rests, {} ms{}",
        summary.notes,
        summary.rests,
        summary.elapsed_ms(),
        if summary.interrupted {
            " (interrupted)"
        } else {
            ""
        }
    );
}
