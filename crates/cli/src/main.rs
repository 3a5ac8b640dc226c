use anyhow::{Context, Result};
use arboard::Clipboard;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use storyface_core::{
    Config, DirectorySink, HttpClient, ImageFile, Phase, Session, Settings, Snapshot, Storyface,
    SystemViewer, init,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Photo of the person to personalize
    photo: PathBuf,

    /// Style prompt for the illustration
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,

    /// Template image supplying the target scene
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Override the personalization service address
    #[arg(long)]
    service_url: Option<String>,

    /// Directory to save the result into
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Open the result in the system viewer
    #[arg(long, default_value_t = false)]
    open: bool,

    /// Copy the result address to the clipboard
    #[arg(short, long, default_value_t = false)]
    copy: bool,

    /// Only print the result address, do not save it
    #[arg(long, default_value_t = false)]
    no_download: bool,

    /// Remember --service-url and --out-dir for later runs
    #[arg(long, default_value_t = false)]
    remember: bool,

    /// Log requests and state changes
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init();
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let mut settings = Settings::load();
    if args.remember {
        remember(&mut settings, &args)?;
    }

    let mut config = Config::load_with(&settings).context("Failed to load configuration")?;
    if let Some(url) = &args.service_url {
        config = Config::builder()
            .with_service_url(url.as_str())
            .with_poll_interval(config.poll_interval)
            .with_request_timeout(config.request_timeout)
            .build()
            .context("Invalid --service-url")?;
    }
    log::info!("Using service at {}", config.service_url);

    let app = Storyface::with_config(config).context("Failed to create service client")?;
    let session = app.session();

    let photo = ImageFile::from_path(&args.photo)
        .with_context(|| format!("Failed to read photo {}", args.photo.display()))?;
    session
        .select_primary_image(photo)
        .with_context(|| format!("{} is not a usable photo", args.photo.display()))?;

    if let Some(path) = &args.template {
        let template = ImageFile::from_path(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        session.select_template_image(template);
    }

    // If there is neither a template nor a prompt, ask now
    let mut prompt_text = args.prompt.join(" ");
    if args.template.is_none() && prompt_text.trim().is_empty() {
        print!("Enter prompt: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        prompt_text = input.trim().to_string();
    }
    session.set_prompt(prompt_text);

    if let Err(e) = session.submit().await {
        // Input problems are already phrased for the user
        if e.is_validation() {
            anyhow::bail!("{}", e);
        }
        return Err(e).context("Submission failed");
    }
    let finished = wait_with_spinner(&session).await?;

    if finished.phase == Phase::Error {
        let message = finished.error.unwrap_or_else(|| "Processing failed".to_string());
        anyhow::bail!("Personalization failed: {}", message);
    }

    let Some(result_url) = finished.result_url().cloned() else {
        println!("The service finished without a result image.");
        return Ok(());
    };
    println!("Result: {}", result_url);
    if let Some(note) = finished.job.as_ref().and_then(|job| job.note.as_deref()) {
        println!("Note: {}", describe_note(note));
    }

    if !args.no_download {
        let dir = args
            .out_dir
            .clone()
            .or_else(|| settings.download_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let sink = DirectorySink::new(dir);
        match session.download_result(&sink).await {
            Ok(Some(path)) => println!("Saved to {}", path.display()),
            Ok(None) => {}
            Err(e) => eprintln!("Warning: Download failed: {}", e),
        }
    }

    if args.open || settings.open_after_download {
        if let Err(e) = session.open_result(&SystemViewer) {
            eprintln!("Warning: Could not open result: {}", e);
        }
    }

    // Copy to clipboard if requested
    if args.copy {
        match Clipboard::new() {
            Ok(mut clipboard) => {
                if let Err(e) = clipboard.set_text(result_url.to_string()) {
                    eprintln!("Warning: Failed to copy to clipboard: {}", e);
                } else {
                    println!("(Copied to clipboard)");
                }
            }
            Err(e) => eprintln!("Warning: Could not access clipboard: {}", e),
        }
    }

    Ok(())
}

/// Follows the session until nothing is in flight, showing the phase.
async fn wait_with_spinner(session: &Session<HttpClient>) -> Result<Snapshot> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut updates = session.subscribe();
    let finished = loop {
        let snapshot = updates.borrow_and_update().clone();
        spinner.set_message(phase_message(snapshot.phase));
        if !snapshot.phase.is_busy() {
            break snapshot;
        }
        if updates.changed().await.is_err() {
            break session.snapshot();
        }
    };

    spinner.finish_and_clear();
    Ok(finished)
}

fn phase_message(phase: Phase) -> &'static str {
    match phase {
        Phase::Uploading => "Uploading...",
        Phase::Processing => "Personalizing your illustration...",
        Phase::Downloading => "Downloading...",
        Phase::Idle | Phase::Done | Phase::Error => "",
    }
}

fn describe_note(note: &str) -> &str {
    match note {
        "no_template" => "no template was available, this is the stylized photo",
        "used_template_as_style" => "the template was used as a style reference only",
        "insertion_failed" => "the face could not be placed into the template, this is the stylized photo",
        other => other,
    }
}

fn remember(settings: &mut Settings, args: &Args) -> Result<()> {
    if let Some(url) = &args.service_url {
        settings.service_url = Some(url.clone());
    }
    if let Some(dir) = &args.out_dir {
        settings.download_dir = Some(dir.clone());
    }
    if args.open {
        settings.open_after_download = true;
    }
    settings.save().context("Failed to save settings")?;
    println!("(Settings saved)");
    Ok(())
}
