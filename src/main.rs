mod cli;

use ffqueue::{
    config::{self, Config},
    tasks::{EncoderService, ProgressCallback, Task, TaskEvent, TaskId, TaskManager, TaskStatus},
};
use ffqueue_av::{format_command, InputSpec, ProgressUpdate};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ConvertArgs, JobCommand, MergeArgs};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "ffqueue=debug,ffqueue_av=debug".to_string()
        } else {
            "ffqueue=warn,ffqueue_av=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert(args) => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            run_convert(&config, args)
        }
        Commands::Merge(args) => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            run_merge(&config, args)
        }
        Commands::PrintCommand { job } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            print_command(&config, job)
        }
        Commands::Probe { file, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            probe_file(&config, &file, json)
        }
        Commands::CheckTools => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("ffqueue {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_convert(config: &Config, args: ConvertArgs) -> Result<()> {
    let service = EncoderService::from_config(config);
    let params = args.encode.to_params(&config.defaults)?;
    let input = InputSpec::new(&args.input).with_trim(args.start, args.end);

    let duration = args
        .duration
        .or_else(|| probed_duration(&service, &args.input))
        .map(|full| trimmed_duration(full, args.start, args.end));

    run_job(config, service, |manager, progress| {
        manager.submit_convert(input, &args.output, params, duration, Some(progress))
    })
}

fn run_merge(config: &Config, args: MergeArgs) -> Result<()> {
    let service = EncoderService::from_config(config);
    let params = args.encode.to_params(&config.defaults)?;
    let probed = service.probe_inputs(&args.inputs);

    run_job(config, service, |manager, progress| {
        manager.submit_merge(
            probed.specs,
            &args.output,
            params,
            probed.total_duration,
            Some(progress),
        )
    })
}

/// Submit one job, render its progress on stderr and wait for it to finish.
fn run_job(
    config: &Config,
    service: EncoderService,
    submit: impl FnOnce(&TaskManager, ProgressCallback) -> Result<Task>,
) -> Result<()> {
    let manager = TaskManager::builder(service)
        .max_workers(config.tasks.max_workers)
        .observer(|task| tracing::info!("Task {} is {}", task.id, task.status))
        .build()?;
    let mut events = manager.subscribe();

    let progress: ProgressCallback = Arc::new(render_progress);
    let task = submit(&manager, progress)?;
    if let Some(command) = task.metadata.get("command").and_then(|c| c.as_str()) {
        tracing::debug!("Running: {}", command);
    }

    let finished = wait_for(&manager, &mut events, task.id);
    eprintln!();
    manager.shutdown();
    manager.join();

    match finished {
        Some(task) if task.status == TaskStatus::Completed => {
            println!("{}", task.output_path.display());
            Ok(())
        }
        Some(task) => {
            if let Some(stderr) = task.stderr.as_deref() {
                tracing::debug!("Encoder output:\n{}", stderr);
            }
            anyhow::bail!(
                "Task {} {}: {}",
                task.id,
                task.status,
                task.error_message.as_deref().unwrap_or("no error message")
            )
        }
        None => anyhow::bail!("Task {} disappeared", task.id),
    }
}

/// Block until `id` reaches a terminal state.
fn wait_for(
    manager: &TaskManager,
    events: &mut tokio::sync::broadcast::Receiver<TaskEvent>,
    id: TaskId,
) -> Option<Task> {
    loop {
        match events.blocking_recv() {
            Ok(TaskEvent::StatusChanged(task)) if task.id == id && task.status.is_terminal() => {
                return Some(task);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} task events", skipped);
                if let Some(task) = manager.get(id).filter(|t| t.status.is_terminal()) {
                    return Some(task);
                }
            }
            Err(RecvError::Closed) => return manager.get(id),
        }
    }
}

fn render_progress(update: &ProgressUpdate) {
    if update.done {
        return;
    }
    let Some(progress) = update.progress else {
        return;
    };
    let mut line = format!("\r{:5.1}%", progress * 100.0);
    if let Some(speed) = update.speed {
        line.push_str(&format!("  {speed:.2}x"));
    }
    if let Some(eta) = update.eta_seconds {
        line.push_str(&format!("  eta {}", format_hms(eta)));
    }
    let mut stderr = std::io::stderr().lock();
    let _ = write!(stderr, "{line}   ");
    let _ = stderr.flush();
}

fn print_command(config: &Config, job: JobCommand) -> Result<()> {
    let service = EncoderService::from_config(config);
    let argv = match job {
        JobCommand::Convert(args) => {
            let params = args.encode.to_params(&config.defaults)?;
            let input = InputSpec::new(&args.input).with_trim(args.start, args.end);
            service.builder().build_convert(&input, &args.output, &params)?
        }
        JobCommand::Merge(args) => {
            let params = args.encode.to_params(&config.defaults)?;
            let probed = service.probe_inputs(&args.inputs);
            service
                .builder()
                .build_merge(&probed.specs, &args.output, &params)?
        }
    };
    println!("{}", format_command(&argv));
    Ok(())
}

fn probed_duration(service: &EncoderService, path: &Path) -> Option<f64> {
    match service.probe(path) {
        Ok(info) => info.duration,
        Err(e) => {
            tracing::warn!("Could not probe {:?}, progress will be unavailable: {}", path, e);
            None
        }
    }
}

/// Length of the encoded span once trim offsets are applied.
fn trimmed_duration(full: f64, start: Option<f64>, end: Option<f64>) -> f64 {
    let end = end.map_or(full, |e| e.min(full));
    (end - start.unwrap_or(0.0)).max(0.0)
}

fn format_hms(seconds: f64) -> String {
    let secs = seconds.round() as u64;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let media_info = EncoderService::from_config(config).probe(file)?;

    if json {
        let json_str = serde_json::to_string_pretty(&media_info)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", media_info.file_path.display());
    if let Some(ref container) = media_info.container {
        println!("Container: {}", container);
    }
    if let Some(size) = media_info.size {
        println!("Size: {} bytes", size);
    }
    if let Some(duration) = media_info.duration {
        println!("Duration: {}", format_hms(duration));
    }

    println!("\nVideo Streams: {}", media_info.video_streams.len());
    for stream in &media_info.video_streams {
        print!("  [{}] {}", stream.index, stream.codec.as_deref().unwrap_or("unknown"));
        if let (Some(w), Some(h)) = (stream.width, stream.height) {
            print!(" {}x{}", w, h);
        }
        if let Some(fps) = stream.frame_rate {
            print!(", {:.3} fps", fps);
        }
        println!();
    }

    println!("\nAudio Streams: {}", media_info.audio_streams.len());
    for stream in &media_info.audio_streams {
        print!("  [{}] {}", stream.index, stream.codec.as_deref().unwrap_or("unknown"));
        if let Some(channels) = stream.channels {
            print!(" {}ch", channels);
        }
        if let Some(rate) = stream.sample_rate {
            print!(" {} Hz", rate);
        }
        println!();
    }

    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ffqueue_av::check_tools(
        &config.tools.resolved_ffmpeg(),
        &config.tools.resolved_ffprobe(),
    );
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg or set [tools] paths in the config.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  ffmpeg: {}", config.tools.ffmpeg().display());
    println!("  ffprobe: {}", config.tools.ffprobe().display());
    println!("  Max workers: {}", config.tasks.max_workers);
    println!("  Cancel grace: {}s", config.tasks.cancel_grace_secs);

    Ok(())
}
