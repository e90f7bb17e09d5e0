// THEORY:
// This file is the main entry point for the `stego_lens` library crate: the
// analysis core of a steganography viewer. Given one image, it renders the
// catalogue of visual aids (bit-planes, channel views, bit pairs, XOR and HSB
// inversions, grey-bit masks) that make hidden payloads visible, computing them in
// parallel and streaming them back as they complete.
//
// The public API is the `AnalysisSession` facade and the data it speaks in
// (`SessionConfig`, `ImageSource`, `TransformResult`, `TransformEvent`, ...). The
// pixel model (`core_modules`), the transform library and the scheduler are public
// too, for callers that want to run single transforms without a session.

pub mod cancel;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod loader;
pub mod logging;
pub mod scheduler;
pub mod session;
pub mod transforms;

pub use config::SessionConfig;
pub use core_modules::channel::{Argb, BitIndex, Channel};
pub use core_modules::codec::{BufferEncoding, ChannelOrder};
pub use core_modules::new_image::{NewImage, OutputEncoding};
pub use core_modules::pixel_source::{PixelAccess, PixelSource};
pub use error::{LoadError, PreconditionViolation, SessionError, TaskFailure};
pub use loader::ImageSource;
pub use logging::SessionLogger;
pub use scheduler::{ScheduleReport, TransformEvent, TransformStream};
pub use session::{AnalysisSession, LoadStatus, Stage};
pub use transforms::TransformResult;
