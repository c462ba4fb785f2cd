use std::path::{Path, PathBuf};
use std::sync::Arc;

use colorize_refine::canvas::export::{binarize, encode_mask};
use colorize_refine::canvas::{export_mask, MaskCanvasEngine, MaskPng, RasterPoint, SampledColor};
use colorize_refine::default_app_root;
use colorize_refine::history::Artifact;
use colorize_refine::refine::{
    ArtifactMetrics, ColorizationService, HttpColorizationService, SourceImage,
};
use colorize_refine::session::EditingSession;
use colorize_refine::settings::{load_colorizer_settings, ColorizerSettings};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = cli_args.first().map(String::as_str) else {
        print_usage();
        return Ok(());
    };
    let rest = cli_args[1..].to_vec();
    match command {
        "status" => run_status_cli(rest).await,
        "colorize" => run_colorize_cli(rest).await,
        "mask" => run_mask_cli(rest),
        "refine" => run_refine_cli(rest).await,
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        unknown => Err(std::io::Error::other(format!(
            "Unknown command: {unknown}\n\nUse --help for usage."
        ))
        .into()),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Default)]
struct CliArgs {
    app_root: Option<PathBuf>,
    settings_path: Option<String>,
    input: Option<PathBuf>,
    base: Option<PathBuf>,
    mask: Option<PathBuf>,
    output: Option<PathBuf>,
    strokes: Vec<Vec<RasterPoint>>,
    brush_size: Option<f32>,
    color: Option<SampledColor>,
    sample: Option<RasterPoint>,
    help: bool,
}

fn parse_cli_args(args: &[String]) -> CliResult<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "-h" | "--help" => {
                parsed.help = true;
                i += 1;
                continue;
            }
            "--app-root" => parsed.app_root = Some(PathBuf::from(needs_value(i)?)),
            "--settings" => parsed.settings_path = Some(needs_value(i)?),
            "--input" => parsed.input = Some(PathBuf::from(needs_value(i)?)),
            "--base" => parsed.base = Some(PathBuf::from(needs_value(i)?)),
            "--mask" => parsed.mask = Some(PathBuf::from(needs_value(i)?)),
            "--output" => parsed.output = Some(PathBuf::from(needs_value(i)?)),
            "--stroke" => parsed.strokes.push(parse_stroke(needs_value(i)?.as_str())?),
            "--brush-size" => {
                let raw = needs_value(i)?;
                let size = raw
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| std::io::Error::other(format!("Invalid --brush-size: {raw}")))?;
                parsed.brush_size = Some(size);
            }
            "--color" => parsed.color = Some(needs_value(i)?.parse::<SampledColor>()?),
            "--sample" => parsed.sample = Some(parse_point(needs_value(i)?.as_str())?),
            unknown => {
                return Err(std::io::Error::other(format!(
                    "Unknown argument: {unknown}\n\nUse --help for usage."
                ))
                .into());
            }
        }
        i += 2;
    }
    Ok(parsed)
}

fn parse_point(raw: &str) -> CliResult<RasterPoint> {
    let invalid = || std::io::Error::other(format!("Invalid point '{raw}', expected x,y"));
    let (x, y) = raw.split_once(',').ok_or_else(invalid)?;
    let x = x.trim().parse::<f32>().map_err(|_| invalid())?;
    let y = y.trim().parse::<f32>().map_err(|_| invalid())?;
    if !x.is_finite() || !y.is_finite() {
        return Err(invalid().into());
    }
    Ok(RasterPoint::new(x, y))
}

fn parse_stroke(raw: &str) -> CliResult<Vec<RasterPoint>> {
    let points = raw
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse_point)
        .collect::<CliResult<Vec<_>>>()?;
    if points.is_empty() {
        return Err(std::io::Error::other("--stroke needs at least one x,y point").into());
    }
    Ok(points)
}

fn required<'a, T>(value: &'a Option<T>, flag: &str) -> CliResult<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| std::io::Error::other(format!("Missing required {flag}")).into())
}

fn resolve_settings(args: &CliArgs) -> CliResult<ColorizerSettings> {
    let app_root = args.app_root.clone().unwrap_or_else(default_app_root);
    Ok(load_colorizer_settings(
        app_root.as_path(),
        args.settings_path.as_deref(),
    )?)
}

fn http_session(settings: &ColorizerSettings) -> EditingSession {
    let service = Arc::new(HttpColorizationService::new(settings.service.clone()));
    EditingSession::new(service, settings)
}

async fn run_status_cli(args: Vec<String>) -> CliResult<()> {
    let parsed = parse_cli_args(args.as_slice())?;
    if parsed.help {
        print_usage();
        return Ok(());
    }
    let settings = resolve_settings(&parsed)?;
    let service = HttpColorizationService::new(settings.service.clone());
    let status = tokio::task::spawn_blocking(move || service.status()).await??;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": true,
            "service_url": settings.service.base_url,
            "message": status.message,
            "device": status.device
        }))?
    );
    Ok(())
}

async fn run_colorize_cli(args: Vec<String>) -> CliResult<()> {
    let parsed = parse_cli_args(args.as_slice())?;
    if parsed.help {
        print_usage();
        return Ok(());
    }
    let input = required(&parsed.input, "--input")?;
    let output = required(&parsed.output, "--output")?;
    let settings = resolve_settings(&parsed)?;

    let mut session = http_session(&settings);
    session.upload(SourceImage::from_path(input)?);
    if let Err(error) = session.colorize().await {
        if let Some(message) = error.user_message() {
            eprintln!("{message}");
        }
        return Err(error.into());
    }
    let artifact = session.save_current(output)?;
    print_artifact_summary(&session, &artifact, output)
}

fn run_mask_cli(args: Vec<String>) -> CliResult<()> {
    let parsed = parse_cli_args(args.as_slice())?;
    if parsed.help {
        print_usage();
        return Ok(());
    }
    let base = required(&parsed.base, "--base")?;
    let output = required(&parsed.output, "--output")?;
    if parsed.strokes.is_empty() {
        return Err(std::io::Error::other("Missing required --stroke").into());
    }
    let settings = resolve_settings(&parsed)?;

    let mut canvas = MaskCanvasEngine::new(settings.brush);
    canvas.load_target(&image::open(base)?);
    paint_strokes(&mut canvas, &parsed);
    let mask = export_mask(&canvas)?;
    write_file(output, &mask.bytes)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": true,
            "output": output.display().to_string(),
            "width": mask.size.width,
            "height": mask.size.height,
            "strokes": canvas.strokes().len(),
            "painted_pixels": mask.painted_pixels
        }))?
    );
    Ok(())
}

async fn run_refine_cli(args: Vec<String>) -> CliResult<()> {
    let parsed = parse_cli_args(args.as_slice())?;
    if parsed.help {
        print_usage();
        return Ok(());
    }
    let input = required(&parsed.input, "--input")?;
    let base_path = required(&parsed.base, "--base")?;
    let output = required(&parsed.output, "--output")?;
    if parsed.mask.is_some() == !parsed.strokes.is_empty() {
        return Err(std::io::Error::other("Provide exactly one of --mask or --stroke").into());
    }
    if parsed.color.is_some() && parsed.sample.is_some() {
        return Err(std::io::Error::other("--color and --sample are mutually exclusive").into());
    }
    let settings = resolve_settings(&parsed)?;

    let mut session = http_session(&settings);
    let base = Artifact::new(
        std::fs::read(base_path)?,
        None,
        ArtifactMetrics::Colorize(Default::default()),
    );
    session.resume(SourceImage::from_path(input)?, base);
    let Some(size) = session.canvas().size() else {
        return Err(std::io::Error::other(format!(
            "Base image could not be decoded: {}",
            base_path.display()
        ))
        .into());
    };

    if let Some(color) = parsed.color {
        session.canvas_mut().set_sampled_color(color);
    }
    if let Some(point) = parsed.sample {
        let canvas = session.canvas_mut();
        canvas.toggle_sample_mode();
        if canvas.sample(point).is_none() {
            return Err(std::io::Error::other(format!(
                "--sample {},{} is outside the {}x{} base image",
                point.x, point.y, size.width, size.height
            ))
            .into());
        }
    }

    let result = match parsed.mask.as_ref() {
        Some(mask_path) => {
            let mask = load_mask(mask_path)?;
            if mask.size != size {
                return Err(std::io::Error::other(format!(
                    "Mask is {}x{} but base image is {}x{}",
                    mask.size.width, mask.size.height, size.width, size.height
                ))
                .into());
            }
            session.refine_with_mask(&mask).await
        }
        None => {
            paint_strokes(session.canvas_mut(), &parsed);
            session.refine().await
        }
    };
    if let Err(error) = result {
        if let Some(message) = error.user_message() {
            eprintln!("{message}");
        }
        return Err(error.into());
    }
    let artifact = session.save_current(output)?;
    print_artifact_summary(&session, &artifact, output)
}

fn paint_strokes(canvas: &mut MaskCanvasEngine, parsed: &CliArgs) {
    if let Some(size) = parsed.brush_size {
        canvas.set_brush_size(size);
    }
    for points in &parsed.strokes {
        canvas.paint_path(points);
    }
}

fn load_mask(path: &Path) -> CliResult<MaskPng> {
    let luma = image::open(path)?.to_luma8();
    Ok(encode_mask(&binarize(&luma))?)
}

fn write_file(path: &Path, bytes: &[u8]) -> CliResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn print_artifact_summary(
    session: &EditingSession,
    artifact: &Artifact,
    output: &Path,
) -> CliResult<()> {
    let history = session.history();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": true,
            "output": output.display().to_string(),
            "artifact": {
                "id": artifact.id().to_string(),
                "sha256": artifact.sha256(),
                "media_type": artifact.media_type(),
                "bytes": artifact.bytes().len(),
                "created_at": artifact.created_at().to_rfc3339()
            },
            "metrics": artifact.metrics(),
            "tier": session.current_tier().map(|tier| tier.as_str()),
            "target_color": session.canvas().sampled_color(),
            "history": { "len": history.len, "cursor": history.cursor }
        }))?
    );
    Ok(())
}

fn print_usage() {
    eprintln!(
        concat!(
            "Usage:\n",
            "  colorize-refine status\n",
            "  colorize-refine colorize --input PHOTO --output PATH\n",
            "  colorize-refine mask --base IMAGE --stroke \"x,y;x,y;...\" [--stroke ...] ",
            "[--brush-size N] --output MASK.png\n",
            "  colorize-refine refine --input PHOTO --base IMAGE (--mask PNG | --stroke ...) ",
            "[--color #rrggbb | --sample x,y] [--brush-size N] --output PATH\n\n",
            "Global flags:\n",
            "  --settings PATH   settings file (default: config/colorizer.settings.toml, ",
            "fallback: config/colorizer.settings.json)\n",
            "  --app-root DIR    directory holding config/ and .env (default: current directory)\n\n",
            "Environment:\n",
            "  COLORIZER_SERVICE_URL, COLORIZER_TIMEOUT_SECS override the settings file\n"
        )
    );
}
