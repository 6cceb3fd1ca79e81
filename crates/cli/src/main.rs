mod settings;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use facesnap_core::camera::domain::frame_source::FrameSource;
use facesnap_core::camera::infrastructure::image_sequence_source::ImageSequenceSource;
use facesnap_core::capture::infrastructure::image_file_capture_sink::ImageFileCaptureSink;
use facesnap_core::capture::infrastructure::image_file_writer::ImageFileWriter;
use facesnap_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use facesnap_core::detection::infrastructure::threaded_face_detector::ThreadedFaceDetector;
use facesnap_core::pipeline::face_capture_pipeline::FaceCapturePipeline;
use facesnap_core::pipeline::frame_producer::spawn_producer;
use facesnap_core::pipeline::frame_queue::LatestFrameQueue;
use facesnap_core::pipeline::pipeline_config::PipelineConfig;
use facesnap_core::pipeline::pipeline_logger::LogPipelineLogger;
use facesnap_core::shared::constants::CAPTURE_DIR_NAME;
use facesnap_core::shared::frame::Rotation;
use facesnap_core::shared::frame_pool::FramePool;

use settings::Settings;

/// Capture a still image whenever a face enters the frame.
///
/// The camera is replayed from an image or a directory of images.
#[derive(Parser)]
#[command(name = "facesnap")]
struct Cli {
    /// Image file or directory of images acting as the camera.
    input: PathBuf,

    /// Directory that receives captured images [default: <Pictures>/FaceSnap].
    #[arg(long)]
    output: Option<PathBuf>,

    /// BlazeFace ONNX model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Camera frame rate; 0 replays as fast as images decode.
    #[arg(long)]
    fps: Option<f64>,

    /// Sensor rotation in degrees: 0, 90, 180 or 270.
    #[arg(long)]
    rotation: Option<u32>,

    /// Frame buffers the camera may have in flight.
    #[arg(long)]
    pool_size: Option<usize>,

    /// Fail a capture that has not finished after this many seconds (0 = never).
    #[arg(long)]
    capture_timeout_secs: Option<u64>,

    /// Stop after this many saved captures (0 = run until the input ends).
    #[arg(long)]
    max_captures: Option<usize>,

    /// JPEG quality (1-100).
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Restart the input after the last image, like a live camera.
    #[arg(long = "loop")]
    looping: bool,

    /// Store the effective options as the new defaults.
    #[arg(long)]
    save_settings: bool,
}

impl Cli {
    /// Command-line flags layered over the saved settings.
    fn merge(&self, saved: &Settings) -> Settings {
        Settings {
            output_dir: self.output.clone().or_else(|| saved.output_dir.clone()),
            model_path: self.model.clone().or_else(|| saved.model_path.clone()),
            confidence: self.confidence.unwrap_or(saved.confidence),
            fps: self.fps.unwrap_or(saved.fps),
            rotation: self.rotation.unwrap_or(saved.rotation),
            pool_size: self.pool_size.unwrap_or(saved.pool_size),
            capture_timeout_secs: self
                .capture_timeout_secs
                .unwrap_or(saved.capture_timeout_secs),
            max_captures: self.max_captures.unwrap_or(saved.max_captures),
            jpeg_quality: self.jpeg_quality.unwrap_or(saved.jpeg_quality),
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let options = cli.merge(&Settings::load());
    validate(&options)?;

    if !camera_accessible(&cli.input) {
        return Err(format!("Camera input is not accessible: {}", cli.input.display()).into());
    }

    if cli.save_settings {
        let path = options.save()?;
        log::info!("Settings saved to {}", path.display());
    }

    let output_dir = resolve_output_dir(&options)?;
    fs::create_dir_all(&output_dir)?;

    let model_path = options
        .model_path
        .as_deref()
        .ok_or("No face detection model given; pass --model or set model_path in settings")?;
    let detector = ThreadedFaceDetector::spawn(Box::new(OnnxBlazefaceDetector::new(
        model_path,
        options.confidence,
    )?));

    let mut source = ImageSequenceSource::new(options.fps).looping(cli.looping);
    let metadata = source.open(&cli.input)?;

    let config = PipelineConfig {
        capture_timeout: (options.capture_timeout_secs > 0)
            .then(|| Duration::from_secs(options.capture_timeout_secs)),
        max_captures: options.max_captures,
        ..PipelineConfig::default()
    };
    let queue = Arc::new(LatestFrameQueue::new());
    let pool = FramePool::new(options.pool_size)?;
    let rotation = Rotation::from_degrees(options.rotation)
        .ok_or_else(|| format!("Unsupported rotation: {}", options.rotation))?;

    let producer = spawn_producer(
        Box::new(source),
        metadata.frame_interval(),
        rotation,
        pool,
        queue.clone(),
        config.cancelled.clone(),
    );

    let writer = ImageFileWriter::new().with_jpeg_quality(options.jpeg_quality);
    let sink = ImageFileCaptureSink::new(&output_dir, Arc::new(writer));
    let cancelled = config.cancelled.clone();

    log::info!(
        "Watching {} ({}x{}), saving captures to {}",
        cli.input.display(),
        metadata.width,
        metadata.height,
        output_dir.display()
    );

    let stats = FaceCapturePipeline::new(
        queue.clone(),
        detector,
        Arc::new(sink),
        Box::new(LogPipelineLogger::new()),
        config,
    )
    .run();

    // The pipeline may stop before the camera does (capture limit).
    cancelled.store(true, std::sync::atomic::Ordering::Relaxed);
    queue.close();
    let produced = producer
        .join()
        .map_err(|_| "Frame producer thread panicked")?;
    drop(queue.take());

    log::info!(
        "Read {} image(s), analysed {} frame(s), saved {} capture(s) to {}",
        produced.images_read,
        stats.frames_analyzed,
        stats.captures_saved,
        output_dir.display()
    );
    if stats.captures_failed > 0 {
        log::warn!("{} capture(s) could not be saved", stats.captures_failed);
    }
    Ok(())
}

fn validate(options: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&options.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            options.confidence
        )
        .into());
    }
    if !options.fps.is_finite() || options.fps < 0.0 {
        return Err(format!("FPS must be zero or positive, got {}", options.fps).into());
    }
    if Rotation::from_degrees(options.rotation).is_none() {
        return Err(format!(
            "Rotation must be one of 0, 90, 180, 270, got {}",
            options.rotation
        )
        .into());
    }
    if options.pool_size == 0 {
        return Err("Pool size must be at least 1".into());
    }
    if !(1..=100).contains(&options.jpeg_quality) {
        return Err(format!(
            "JPEG quality must be between 1 and 100, got {}",
            options.jpeg_quality
        )
        .into());
    }
    if let Some(model) = &options.model_path {
        if !model.is_file() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    Ok(())
}

/// Stand-in for the platform camera permission: the input must exist and be
/// readable by this process.
fn camera_accessible(input: &Path) -> bool {
    if input.is_dir() {
        fs::read_dir(input).is_ok()
    } else {
        fs::File::open(input).is_ok()
    }
}

fn resolve_output_dir(options: &Settings) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(dir) = &options.output_dir {
        return Ok(dir.clone());
    }
    let pictures = dirs::picture_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Pictures")))
        .ok_or("Cannot determine a pictures directory; pass --output")?;
    Ok(pictures.join(CAPTURE_DIR_NAME))
}
