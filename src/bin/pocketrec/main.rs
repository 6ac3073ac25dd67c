use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use pocketrec::audio::capture::CpalSource;
use pocketrec::audio::output::CpalSink;
use pocketrec::browser::{BrowseAction, Browser};
use pocketrec::catalog::Catalog;
use pocketrec::config::Config;
use pocketrec::container::{self, SAMPLE_RATE};
use pocketrec::error::RecorderError;
use pocketrec::playback::run_playback;
use pocketrec::preview::{PreviewSink, TerminalPreview};
use pocketrec::recording::{CaptureSettings, run_capture};
use pocketrec::session::{Intent, Intents, SessionContext};
use pocketrec::storage::FsStorage;

#[derive(Parser)]
#[command(
    name = "pocketrec",
    about = "Record, play back and browse 16kHz voice recordings",
    long_about = "pocketrec captures 16kHz mono audio from an input device into WAV \
        containers, streams them back to an output device, and draws a live \
        waveform preview on the terminal while doing either. Recordings are \
        named automatically and can be listed, checked, repaired and deleted."
)]
struct Cli {
    /// Path to config file
    ///
    /// Defaults to ~/.config/pocketrec/config.yaml if not specified. Built-in
    /// defaults are used when the default file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    ///
    /// Sets the log level to debug for the pocketrec crate, showing per-chunk
    /// capture and playback bookkeeping.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the input device into a new container
    ///
    /// Runs until Ctrl+C or until the configured maximum duration is
    /// reached, then finalizes the header and prints the path.
    Record {
        /// Override capture.max_duration_secs for this recording
        #[arg(long)]
        max_secs: Option<u64>,
    },

    /// Play a stored recording on the output device
    ///
    /// Ctrl+C stops playback at the next block boundary.
    Play {
        /// Recording name, with or without the .wav extension
        name: String,
    },

    /// List stored recordings with their durations
    List,

    /// Delete a stored recording
    Delete {
        /// Recording name, with or without the .wav extension
        name: String,
    },

    /// Validate a recording's header and decode it end to end
    Check {
        /// Recording name, with or without the .wav extension
        name: String,
    },

    /// Rewrite a recording's size fields from its length on disk
    ///
    /// Recovers containers whose capture was cut off before the header was
    /// finalized, e.g. by power loss.
    Repair {
        /// Recording name, with or without the .wav extension
        name: String,
    },

    /// Browse recordings interactively
    ///
    /// Reads one command per line from stdin: k/up, j/down, p/play (or an
    /// empty line), d/delete, q/quit.
    Browse,

    /// List available audio input and output devices
    Devices,

    /// Generate shell completions
    ///
    /// Prints a completion script for the given shell to stdout.
    /// Source or install the output to enable tab completion.
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

fn load_config(explicit: Option<&Path>) -> Result<Config, RecorderError> {
    if let Some(path) = explicit {
        return Config::load(path);
    }
    let path = Config::default_path();
    if path.exists() {
        Config::load(&path)
    } else {
        tracing::info!("no config at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pocketrec=debug,info")
    } else {
        EnvFilter::new("pocketrec=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    install_completions_if_missing();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Install shell completions for `$SHELL` if the completion file does not
/// already exist. Errors are ignored.
fn install_completions_if_missing() {
    let Ok(shell_env) = std::env::var("SHELL") else {
        return;
    };

    let Some(home) = dirs::home_dir() else {
        return;
    };

    let (shell, path) = if shell_env.ends_with("/bash") {
        let dir = home.join(".local/share/bash-completion/completions");
        (Shell::Bash, dir.join("pocketrec"))
    } else if shell_env.ends_with("/zsh") {
        (Shell::Zsh, home.join(".zfunc/_pocketrec"))
    } else if shell_env.ends_with("/fish") {
        (
            Shell::Fish,
            home.join(".config/fish/completions/pocketrec.fish"),
        )
    } else {
        return;
    };

    if path.exists() {
        return;
    }

    if let Some(parent) = path.parent()
        && std::fs::create_dir_all(parent).is_err()
    {
        return;
    }

    let mut buf = Vec::new();
    generate(shell, &mut Cli::command(), "pocketrec", &mut buf);

    let _ = std::fs::write(&path, buf);
}

fn run(cli: Cli) -> Result<(), RecorderError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Devices => run_devices(),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "pocketrec", &mut std::io::stdout());
            Ok(())
        }
        Command::Record { max_secs } => {
            let mut config = load_config(config_path)?;
            if let Some(secs) = max_secs {
                config.capture.max_duration_secs = secs;
                config.validate()?;
            }
            let catalog = open_catalog(&config)?;
            run_record(&config, catalog)
        }
        Command::Play { name } => {
            let config = load_config(config_path)?;
            run_play(&config, &open_catalog(&config)?, &name)
        }
        Command::List => run_list(&open_catalog(&load_config(config_path)?)?),
        Command::Delete { name } => {
            open_catalog(&load_config(config_path)?)?.remove(&FsStorage, &name)?;
            println!("Deleted {name}");
            Ok(())
        }
        Command::Check { name } => run_check(&open_catalog(&load_config(config_path)?)?, &name),
        Command::Repair { name } => {
            let path = open_catalog(&load_config(config_path)?)?.path_of(&name);
            let size = container::repair(&FsStorage, &path)?;
            println!(
                "Repaired {}: {} payload bytes ({:.2}s)",
                path.display(),
                size.payload_bytes,
                size.duration_secs()
            );
            Ok(())
        }
        Command::Browse => {
            let config = load_config(config_path)?;
            let catalog = open_catalog(&config)?;
            run_browse(&config, catalog)
        }
    }
}

fn print_device_list(devices: &[String], default_name: Option<&str>) {
    for (i, name) in devices.iter().enumerate() {
        let marker = if default_name == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  {}: {name}{marker}", i + 1);
    }
}

fn run_devices() -> Result<(), RecorderError> {
    let inputs = pocketrec::audio::capture::list_input_devices()?;
    let outputs = pocketrec::audio::output::list_output_devices()?;

    if inputs.is_empty() {
        println!("No audio input devices found.");
    } else {
        println!("Input devices:");
        print_device_list(
            &inputs,
            pocketrec::audio::capture::default_input_device_name().as_deref(),
        );
    }
    if outputs.is_empty() {
        println!("No audio output devices found.");
    } else {
        println!("Output devices:");
        print_device_list(
            &outputs,
            pocketrec::audio::output::default_output_device_name().as_deref(),
        );
    }
    Ok(())
}

fn open_catalog(config: &Config) -> Result<Catalog, RecorderError> {
    let dir = Config::expand_path(&config.storage.directory);
    Catalog::scan(
        &FsStorage,
        &dir,
        &config.storage.prefix,
        config.storage.naming,
    )
}

/// Flag raised by Ctrl+C, serviced on a small runtime in its own thread.
fn stop_on_ctrl_c() -> Result<Arc<AtomicBool>, RecorderError> {
    let flag = Arc::new(AtomicBool::new(false));
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let raised = Arc::clone(&flag);
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            rt.block_on(async {
                while tokio::signal::ctrl_c().await.is_ok() {
                    raised.store(true, Ordering::SeqCst);
                }
            });
        })?;
    Ok(flag)
}

fn stop_intents(flag: &AtomicBool) -> impl FnMut() -> Intents + '_ {
    move || {
        if flag.swap(false, Ordering::SeqCst) {
            Intents::NONE.with(Intent::Stop)
        } else {
            Intents::NONE
        }
    }
}

fn terminal_preview(config: &Config) -> TerminalPreview<std::io::Stderr> {
    TerminalPreview::new(std::io::stderr(), config.preview.band_height)
}

fn run_record(config: &Config, mut catalog: Catalog) -> Result<(), RecorderError> {
    let mut ctx = SessionContext::from_config(FsStorage, config)?;
    let mut source = CpalSource::new(&config.audio)?;
    let mut preview = terminal_preview(config);
    let stop = stop_on_ctrl_c()?;

    let path = catalog.next_path();
    ctx.start_capture(
        &path,
        CaptureSettings::from_config(config),
        &mut source,
        &mut preview,
    )?;
    let summary = run_capture(&mut ctx, &mut source, &mut stop_intents(&stop), &mut preview)?;

    println!(
        "{} ({:.2}s, {} bytes)",
        summary.path.display(),
        summary.size.duration_secs(),
        summary.size.on_disk_bytes()
    );
    Ok(())
}

fn play_path(
    ctx: &mut SessionContext<FsStorage>,
    sink: &mut CpalSink,
    stop: &AtomicBool,
    path: &Path,
    preview: &mut impl PreviewSink,
) -> Result<(), RecorderError> {
    ctx.start_playback(path, preview)?;
    run_playback(ctx, sink, &mut stop_intents(stop), preview)?;
    Ok(())
}

fn run_play(config: &Config, catalog: &Catalog, name: &str) -> Result<(), RecorderError> {
    let mut ctx = SessionContext::from_config(FsStorage, config)?;
    let mut sink = CpalSink::new(&config.audio)?;
    let mut preview = terminal_preview(config);
    let stop = stop_on_ctrl_c()?;
    play_path(&mut ctx, &mut sink, &stop, &catalog.path_of(name), &mut preview)
}

fn run_list(catalog: &Catalog) -> Result<(), RecorderError> {
    let entries = catalog.entries(&FsStorage)?;
    if entries.is_empty() {
        println!(
            "No recordings in {}. Use `pocketrec record` to make one.",
            catalog.dir().display()
        );
        return Ok(());
    }

    for entry in &entries {
        match container::inspect(&FsStorage, &entry.path) {
            Ok(info) => println!(
                "  {}  {:>8.2}s  {} bytes",
                entry.name,
                info.duration_secs(),
                info.on_disk_bytes
            ),
            Err(e) => println!("  {}  ({e})", entry.name),
        }
    }
    Ok(())
}

fn run_check(catalog: &Catalog, name: &str) -> Result<(), RecorderError> {
    let path = catalog.path_of(name);
    let info = container::inspect(&FsStorage, &path)?;
    println!(
        "{}: {} Hz, {} ch, {} bit, {} payload bytes ({:.2}s)",
        path.display(),
        info.header.sample_rate,
        info.header.channels,
        info.header.bits_per_sample,
        info.header.payload_bytes,
        info.duration_secs()
    );

    let corrupt = |reason: String| RecorderError::CorruptContainer {
        path: path.clone(),
        reason,
    };
    let reader = hound::WavReader::open(&path).map_err(|e| corrupt(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE || spec.channels != 1 || spec.bits_per_sample != 16 {
        return Err(corrupt(format!("decoder sees {spec:?}")));
    }
    let mut decoded = 0u64;
    for sample in reader.into_samples::<i16>() {
        sample.map_err(|e| corrupt(e.to_string()))?;
        decoded += 1;
    }
    if decoded * 2 != u64::from(info.header.payload_bytes) {
        return Err(corrupt(format!(
            "decoded {decoded} samples, header promises {}",
            info.header.payload_bytes / 2
        )));
    }
    println!("OK: {decoded} samples decode cleanly");
    Ok(())
}

fn parse_intent(line: &str) -> Option<Intents> {
    let intent = match line.trim() {
        "k" | "up" => Intent::Up,
        "j" | "down" => Intent::Down,
        "" | "p" | "play" => Intent::Select,
        "d" | "delete" => Intent::Delete,
        "q" | "quit" => Intent::Stop,
        _ => return None,
    };
    Some(Intents::NONE.with(intent))
}

fn run_browse(config: &Config, catalog: Catalog) -> Result<(), RecorderError> {
    let mut browser = Browser::open(&FsStorage, catalog)?;
    let mut ctx = SessionContext::from_config(FsStorage, config)?;
    let mut preview = terminal_preview(config);
    let stop = stop_on_ctrl_c()?;
    let mut sink: Option<CpalSink> = None;

    preview.report(&browser.status());
    for line in std::io::stdin().lock().lines() {
        let Some(intents) = parse_intent(&line?) else {
            preview.report("k/j move, p play, d delete, q quit");
            continue;
        };

        match browser.handle(&FsStorage, intents)? {
            BrowseAction::Quit => break,
            BrowseAction::Play(path) => {
                if sink.is_none() {
                    sink = Some(CpalSink::new(&config.audio)?);
                }
                let Some(out) = sink.as_mut() else {
                    continue;
                };
                stop.store(false, Ordering::SeqCst);
                if let Err(e) = play_path(&mut ctx, out, &stop, &path, &mut preview) {
                    tracing::warn!("{e}");
                }
            }
            BrowseAction::Deleted(name) => preview.report(&format!("deleted {name}")),
            BrowseAction::Moved | BrowseAction::Nothing => {}
        }
        preview.report(&browser.status());
    }
    Ok(())
}
