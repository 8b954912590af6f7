//! Generate a slide deck from the command line and write one HTML file per slide.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use slides_harness::prelude::*;
use slides_harness::init_observability;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "slides-demo", about = "Stream a slide deck from the slides agent")]
struct Args {
    /// Instruction for the agent.
    #[arg(required_unless_present = "prompt_file")]
    prompt: Option<String>,

    /// Read the instruction from a file instead.
    #[arg(long, conflicts_with = "prompt")]
    prompt_file: Option<PathBuf>,

    /// Directory that receives `slide-NN.html` files.
    #[arg(long, default_value = "./out/slides")]
    out_dir: PathBuf,

    /// Edit the deck from an earlier conversation.
    #[arg(long)]
    conversation_id: Option<String>,

    #[arg(long)]
    knowledge_base_id: Option<String>,

    /// Abort when the generation takes longer than this.
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    /// Also write the raw SSE transcript to `transcript.sse`.
    #[arg(long)]
    transcript: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_observability();
    let args = Args::parse();

    let prompt = match (&args.prompt, &args.prompt_file) {
        (_, Some(path)) => std::fs::read_to_string(path)?,
        (Some(prompt), None) => prompt.clone(),
        (None, None) => return Err("a prompt or --prompt-file is required".into()),
    };

    let client = SlidesClient::from_env()?;
    let mut builder = client
        .generate(prompt)
        .timeout(Duration::from_secs(args.timeout_secs))
        .capture_transcript(args.transcript);
    if let Some(id) = &args.conversation_id {
        builder = builder.conversation_id(id);
    }
    if let Some(id) = &args.knowledge_base_id {
        builder = builder.knowledge_base_id(id);
    }

    let mut stream = builder.start_stream().await?;
    let abort = stream.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    while let Some(event) = stream.next_event().await {
        match event {
            SlideEvent::Started { request_id } => eprintln!("started {request_id}"),
            SlideEvent::Partial(partial) => eprintln!(
                "slide {:>2}: {:>6} chars{}",
                partial.position,
                partial.html.chars().count(),
                if partial.complete { " (done)" } else { "" }
            ),
            SlideEvent::Log { message } => eprintln!("{message}"),
            SlideEvent::Error { error, .. } => eprintln!("{}", error.user_message()),
            SlideEvent::Completed { .. } => {}
        }
    }

    let output = stream.finish().await?;
    let written = write_slides(&args.out_dir, &output.slides)?;
    for path in &written {
        println!("{}", path.display());
    }
    if let Some(transcript) = &output.transcript {
        std::fs::write(args.out_dir.join("transcript.sse"), transcript)?;
    }
    if let Some(id) = &output.conversation_id {
        println!("conversation_id={id}");
    }
    info!(slides = written.len(), out_dir = %args.out_dir.display(), "deck written");
    Ok(())
}

/// Writes each slide to `slide-NN.html` under `out_dir`.
fn write_slides(out_dir: &Path, slides: &[GeneratedSlide]) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    slides
        .iter()
        .map(|slide| {
            let path = out_dir.join(format!("slide-{:02}.html", slide.page_number));
            std::fs::write(&path, &slide.html)?;
            Ok(path)
        })
        .collect()
}
