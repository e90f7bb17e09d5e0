// This file is an example of how to use the `stego_lens` library.
// The library entry point is `src/lib.rs`; `stego_lens_tester` is the full CLI.

use stego_lens::{AnalysisSession, ImageSource, SessionConfig, SessionLogger, TransformEvent};

#[tokio::main]
async fn main() {
    println!("Stego Lens - Example Runner");

    let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 64, |x, y| {
        // Hide a checkerboard in the red least significant bit.
        let hidden = ((x / 8 + y / 8) % 2) as u8;
        image::Rgb([200 | hidden, 120, 40])
    }));

    let session = AnalysisSession::new(SessionConfig::default(), SessionLogger::global("stego_lens"));
    if let Err(error) = session.load(ImageSource::Decoded(image)).await {
        eprintln!("load failed: {error}");
        return;
    }

    let mut stream = match session.run_transforms() {
        Ok(stream) => stream,
        Err(error) => {
            eprintln!("could not start transforms: {error}");
            return;
        }
    };
    while let Some(event) = stream.recv().await {
        if let TransformEvent::Completed(result) = event {
            println!("{:<28} {}x{}", result.label, result.image.width(), result.image.height());
        }
    }
    println!("session finished: {}", session.stage().name());
}
