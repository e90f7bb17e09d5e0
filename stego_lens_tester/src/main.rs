use anyhow::{Context, bail};
use image::ImageFormat;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stego_lens::{
    AnalysisSession, ImageSource, LoadStatus, NewImage, SessionConfig, SessionLogger, TransformEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: stego_lens_tester <input_image> <output_dir>");
        return Ok(());
    }
    let input_path = PathBuf::from(&args[1]);
    let output_dir = PathBuf::from(&args[2]);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    // --- 2. Session Initialization ---
    let session = Arc::new(AnalysisSession::new(
        SessionConfig::default(),
        SessionLogger::global("stego_lens"),
    ));

    // Ctrl-C cancels the run; whatever finished so far is still written.
    let on_interrupt = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    // --- 3. Load ---
    match session.load(ImageSource::FilePath(input_path.clone())).await? {
        LoadStatus::Loaded { width, height, has_alpha } => {
            println!(
                "Loaded {} ({}x{}, {})",
                input_path.display(),
                width,
                height,
                if has_alpha { "alpha" } else { "no alpha" }
            );
        }
        LoadStatus::Cancelled => bail!("cancelled while loading"),
    }

    // --- 4. Stream Results To Disk ---
    let mut stream = session.run_transforms()?;
    let mut written = 0usize;
    while let Some(event) = stream.recv().await {
        match event {
            TransformEvent::Completed(result) => {
                let path = output_path(&output_dir, &result.label);
                write_png(&result.image, &path)?;
                written += 1;
            }
            TransformEvent::Failed(failure) => println!("FAILED  {failure}"),
            TransformEvent::Skipped { label } => println!("SKIPPED {label}"),
        }
    }

    // --- 5. Summary ---
    let report = session.join().await?;
    println!(
        "Processing complete ({}). {} images saved to {}, {} failed, {} skipped",
        session.stage().name(),
        written,
        output_dir.display(),
        report.failures.len(),
        report.skipped.len()
    );
    Ok(())
}

/// "Red plane 0" -> "<dir>/red_plane_0.png"
fn output_path(dir: &Path, label: &str) -> PathBuf {
    let stem: String = label
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
            ' ' | '-' => Some('_'),
            _ => None,
        })
        .collect();
    dir.join(format!("{stem}.png"))
}

/// Always PNG, whatever the extension says.
fn write_png(image: &NewImage, path: &Path) -> anyhow::Result<()> {
    image
        .to_dynamic()
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_become_file_names() {
        let dir = Path::new("out");
        assert_eq!(output_path(dir, "Red plane 0"), dir.join("red_plane_0.png"));
        assert_eq!(output_path(dir, "Bit pair 6-7"), dir.join("bit_pair_6_7.png"));
        assert_eq!(output_path(dir, "Grayscale (gamma)"), dir.join("grayscale_gamma.png"));
    }

    #[test]
    fn views_are_written_as_png() {
        let dir = env::temp_dir().join(format!("stego_lens_tester_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("view.out");
        let view = NewImage::filled(3, 2, stego_lens::OutputEncoding::Argb, stego_lens::Argb::new(128, 1, 2, 3));

        write_png(&view, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [1, 2, 3, 128]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
