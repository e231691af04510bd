use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;
use mrzscan::{ExtractOptions, MrzExtractor, OcrError, ProcessingCache, TesseractEngine};

/// Read the machine-readable zone of a passport photo.
#[derive(Parser)]
#[command(name = "mrz_demo", about = "Extract passport MRZ fields from an image")]
struct Args {
    /// Path to the passport image (JPEG or PNG).
    image: PathBuf,

    /// Pipeline timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let image = std::fs::read(&args.image)
        .map_err(|e| format!("failed to read {}: {}", args.image.display(), e))?;

    let extractor = MrzExtractor::new(
        Arc::new(TesseractEngine),
        Arc::new(ProcessingCache::default()),
    );

    let options = ExtractOptions {
        timeout: Some(Duration::from_secs(args.timeout)),
        on_progress: Some(Arc::new(|update| {
            eprintln!("  [{:>3}%] {:?}", update.percentage, update.status);
        })),
        ..Default::default()
    };

    match extractor.extract(&image, options).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(err) => {
            report_failure(&err);
            std::process::exit(1);
        }
    }
}

fn report_failure(err: &OcrError) {
    eprintln!("Scan failed: {}", err.message);
    if let Some(technical) = &err.technical {
        log::debug!("technical detail: {}", technical);
    }
}
