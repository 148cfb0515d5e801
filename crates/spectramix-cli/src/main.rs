//! spectramix: mix the Fourier components of grayscale images.
//!
//! Loads up to four images into input slots, brings them to a common
//! size, and mixes them into one or two outputs through the background
//! job controller. Each output has its own weights, component mode and
//! region mask. A second subcommand dumps a single spectrum component as
//! an image for inspection.
//!
//! # Usage
//!
//! ```text
//! spectramix mix --image a.png --image b.png \
//!     --weights "1,0;0,1" --mask inner --sigma 8 --out1 low.png \
//!     --mask2 outer --out2 high.png
//! spectramix inspect a.png --kind magnitude --out a-magnitude.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::debug;
use spectramix_engine::{
    ComponentKind, ComponentMode, ComponentWeights, DEFAULT_GAMMA, DEFAULT_SIGMA, JobEvent,
    MaskKind, MixDiagnostics, MixSession, MixSpecification, OutputScaling, OutputSlot,
    SLOT_COUNT, VisualizeConfig,
};
use spectramix_io::{BrightnessContrast, DEFAULT_BRIGHTNESS, DEFAULT_CONTRAST, ResizeFilter};

/// How long to wait for a single worker event before giving up.
const EVENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Fourier-domain image mixing.
#[derive(Parser)]
#[command(name = "spectramix", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mix up to four images into one or two outputs.
    Mix(MixArgs),
    /// Write one spectrum component of an image as a grayscale picture.
    Inspect(InspectArgs),
}

#[derive(Args)]
struct MixArgs {
    /// Input image, repeated once per slot (at most four).
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,

    /// Resampling filter used to bring inputs to a common size.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    resize_filter: Filter,

    /// Brightness offset applied to every input.
    #[arg(long, default_value_t = DEFAULT_BRIGHTNESS, allow_hyphen_values = true)]
    brightness: f64,

    /// Contrast gain applied to every input.
    #[arg(long, default_value_t = DEFAULT_CONTRAST)]
    contrast: f64,

    /// Component pair to combine.
    #[arg(long, value_enum, default_value_t = Mode::MagnitudePhase)]
    mode: Mode,

    /// Per-slot weights as `primary,secondary` pairs separated by `;`.
    ///
    /// Missing slots get zero weights. Example: `1,0;0,1`.
    #[arg(long, default_value = "1,1")]
    weights: String,

    /// Frequency region kept in output 1.
    #[arg(long, value_enum, default_value_t = Region::None)]
    mask: Region,

    /// Gaussian sigma of the region mask, in frequency bins.
    #[arg(long, default_value_t = DEFAULT_SIGMA)]
    sigma: f64,

    /// Stretch each output to the full range instead of clipping.
    #[arg(long)]
    normalize: bool,

    /// Weights for output 2 (defaults to `--weights`).
    #[arg(long)]
    weights2: Option<String>,

    /// Frequency region kept in output 2 (defaults to `--mask`).
    #[arg(long, value_enum)]
    mask2: Option<Region>,

    /// Full specification for output 1 as JSON. Overrides the mix flags.
    #[arg(long)]
    spec1_json: Option<String>,

    /// Full specification for output 2 as JSON. Overrides the mix flags.
    #[arg(long)]
    spec2_json: Option<String>,

    /// Where to write output 1 (`.png`, `.jpg`).
    #[arg(long)]
    out1: PathBuf,

    /// Where to write output 2. Output 2 is only computed when given.
    #[arg(long)]
    out2: Option<PathBuf>,

    /// Print diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Input image (PNG, JPEG, BMP, WebP).
    image: PathBuf,

    /// Component to render.
    #[arg(long, value_enum)]
    kind: Kind,

    /// Where to write the rendered component.
    #[arg(long)]
    out: PathBuf,

    /// Gamma applied to log-scaled real and imaginary parts.
    #[arg(long, default_value_t = DEFAULT_GAMMA)]
    gamma: f64,
}

/// Component mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Weighted magnitudes and phases.
    MagnitudePhase,
    /// Weighted real and imaginary parts.
    RealImaginary,
}

impl From<Mode> for ComponentMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::MagnitudePhase => Self::MagnitudePhase,
            Mode::RealImaginary => Self::RealImaginary,
        }
    }
}

/// Region mask selection.
#[derive(Clone, Copy, ValueEnum)]
enum Region {
    /// Keep every frequency.
    None,
    /// Keep low frequencies.
    Inner,
    /// Keep high frequencies.
    Outer,
}

impl From<Region> for MaskKind {
    fn from(region: Region) -> Self {
        match region {
            Region::None => Self::None,
            Region::Inner => Self::Inner,
            Region::Outer => Self::Outer,
        }
    }
}

/// Spectrum component selection.
#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    /// `|F|`, log-scaled.
    Magnitude,
    /// Phase angle.
    Phase,
    /// Real part, log-scaled.
    Real,
    /// Imaginary part, log-scaled.
    Imaginary,
}

impl From<Kind> for ComponentKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Magnitude => Self::Magnitude,
            Kind::Phase => Self::Phase,
            Kind::Real => Self::Real,
            Kind::Imaginary => Self::Imaginary,
        }
    }
}

/// Resize filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Filter> for ResizeFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Parse `p,s;p,s;...` into per-slot weights.
fn parse_weights(text: &str) -> Result<[ComponentWeights; SLOT_COUNT], String> {
    let mut weights = [ComponentWeights::ZERO; SLOT_COUNT];
    let groups: Vec<&str> = text
        .split(';')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .collect();
    if groups.len() > SLOT_COUNT {
        return Err(format!(
            "--weights has {} groups, at most {SLOT_COUNT} are allowed",
            groups.len()
        ));
    }
    for (slot, group) in groups.into_iter().enumerate() {
        let (primary, secondary) = group
            .split_once(',')
            .ok_or_else(|| format!("weight group '{group}' must be 'primary,secondary'"))?;
        let parse = |value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid weight '{value}' in group '{group}': {e}"))
        };
        weights[slot] = ComponentWeights::new(parse(primary)?, parse(secondary)?);
    }
    Ok(weights)
}

/// Build the specification for one output from CLI arguments.
///
/// A `--specN-json` value is parsed directly and every mix flag is
/// ignored. Otherwise the spec is assembled from the flags, with the
/// `--weights2` / `--mask2` overrides for output 2.
fn spec_from_cli(args: &MixArgs, output: OutputSlot) -> Result<MixSpecification, String> {
    let (json, weights, mask) = match output {
        OutputSlot::First => (&args.spec1_json, None, None),
        OutputSlot::Second => (&args.spec2_json, args.weights2.as_deref(), args.mask2),
    };
    if let Some(json) = json {
        let flag = match output {
            OutputSlot::First => "--spec1-json",
            OutputSlot::Second => "--spec2-json",
        };
        return serde_json::from_str(json).map_err(|e| format!("Error parsing {flag}: {e}"));
    }

    Ok(MixSpecification {
        mode: args.mode.into(),
        weights: parse_weights(weights.unwrap_or(&args.weights))?,
        mask: mask.unwrap_or(args.mask).into(),
        sigma: args.sigma,
        scaling: if args.normalize {
            OutputScaling::Normalize
        } else {
            OutputScaling::Clip
        },
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Mix(args) => run_mix(args),
        Command::Inspect(args) => run_inspect(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run_mix(args: &MixArgs) -> Result<(), String> {
    if args.images.len() > SLOT_COUNT {
        return Err(format!(
            "{} images given, at most {SLOT_COUNT} are allowed",
            args.images.len()
        ));
    }

    let mut outputs = vec![(
        OutputSlot::First,
        spec_from_cli(args, OutputSlot::First)?,
        &args.out1,
    )];
    if let Some(out2) = &args.out2 {
        outputs.push((OutputSlot::Second, spec_from_cli(args, OutputSlot::Second)?, out2));
    }

    let loaded = args
        .images
        .iter()
        .map(|path| {
            spectramix_io::load_grayscale(path)
                .map_err(|e| format!("Error loading {}: {e}", path.display()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let unified = spectramix_io::unify_sizes(&loaded, args.resize_filter.into())
        .map_err(|e| format!("Error resizing inputs: {e}"))?;
    let adjust = BrightnessContrast {
        brightness: args.brightness,
        contrast: args.contrast,
    };

    let mut session = MixSession::new().map_err(|e| format!("Error starting worker: {e}"))?;
    for (slot, (image, path)) in unified.iter().zip(&args.images).enumerate() {
        let adjusted = adjust
            .apply(image)
            .map_err(|e| format!("Error adjusting {}: {e}", path.display()))?;
        eprintln!(
            "Slot {slot}: {} ({})",
            path.display(),
            adjusted.dimensions()
        );
        session
            .set_image(slot, adjusted)
            .map_err(|e| format!("Error loading slot {slot}: {e}"))?;
    }
    eprintln!();

    let mut pending = Vec::with_capacity(outputs.len());
    for (output, spec, path) in outputs {
        debug!("{output}: {spec:?}");
        let job = session
            .submit(output, spec)
            .map_err(|e| format!("Error submitting {output}: {e}"))?;
        pending.push((job, output, path));
    }

    let mut diagnostics: Vec<(OutputSlot, MixDiagnostics)> = Vec::new();
    while !pending.is_empty() {
        let event = session
            .wait_event(EVENT_TIMEOUT)
            .ok_or_else(|| "Timed out waiting for the mix worker".to_owned())?;
        match event {
            JobEvent::Progress {
                output, percent, ..
            } => eprintln!("{output}: {percent:>3}%"),
            JobEvent::Completed {
                job,
                output,
                image,
                diagnostics: run,
            } => {
                let Some(index) = pending.iter().position(|(id, ..)| *id == job) else {
                    continue;
                };
                let (_, _, path) = pending.swap_remove(index);
                spectramix_io::save(&image, path)
                    .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
                eprintln!("{output}: written to {}", path.display());
                diagnostics.push((output, run));
            }
            JobEvent::Failed { output, error, .. } => {
                return Err(format!("{output}: mix failed: {error}"));
            }
        }
    }

    diagnostics.sort_by_key(|(output, _)| *output);
    print_diagnostics(&diagnostics, args.json)
}

fn print_diagnostics(
    diagnostics: &[(OutputSlot, MixDiagnostics)],
    json: bool,
) -> Result<(), String> {
    if json {
        let runs: Vec<&MixDiagnostics> = diagnostics.iter().map(|(_, d)| d).collect();
        let text = serde_json::to_string_pretty(&runs)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{text}");
    } else {
        for (output, run) in diagnostics {
            println!("[{output}]");
            println!("{}", run.report());
            println!();
        }
    }
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> Result<(), String> {
    let image = spectramix_io::load_grayscale(&args.image)
        .map_err(|e| format!("Error loading {}: {e}", args.image.display()))?;
    let config = VisualizeConfig {
        gamma: args.gamma,
        ..VisualizeConfig::default()
    };
    let spectrum = spectramix_engine::transform(&image);
    let grid = spectramix_engine::visualize(&spectrum, args.kind.into(), &config);
    spectramix_io::save_gray(&grid.to_gray(config.display_max), &args.out)
        .map_err(|e| format!("Error writing {}: {e}", args.out.display()))?;
    eprintln!(
        "{} of {} written to {}",
        ComponentKind::from(args.kind),
        args.image.display(),
        args.out.display()
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn weights_parse_pairs_and_pad_with_zero() {
        let weights = parse_weights("1,0; 0.5 , 0.25").unwrap();
        assert_eq!(weights[0], ComponentWeights::new(1.0, 0.0));
        assert_eq!(weights[1], ComponentWeights::new(0.5, 0.25));
        assert_eq!(weights[2], ComponentWeights::ZERO);
        assert_eq!(weights[3], ComponentWeights::ZERO);
    }

    #[test]
    fn weights_reject_malformed_groups() {
        assert!(parse_weights("1").is_err());
        assert!(parse_weights("1,x").is_err());
        assert!(parse_weights("1,1;1,1;1,1;1,1;1,1").is_err());
    }

    #[test]
    fn second_output_uses_overrides() {
        let cli = Cli::try_parse_from([
            "spectramix",
            "mix",
            "--image",
            "a.png",
            "--weights",
            "1,1",
            "--mask",
            "inner",
            "--mask2",
            "outer",
            "--sigma",
            "4",
            "--out1",
            "a.png",
            "--out2",
            "b.png",
        ])
        .unwrap();
        let Command::Mix(args) = cli.command else {
            unreachable!("parsed a mix command");
        };
        let first = spec_from_cli(&args, OutputSlot::First).unwrap();
        let second = spec_from_cli(&args, OutputSlot::Second).unwrap();
        assert_eq!(first.mask, MaskKind::Inner);
        assert_eq!(second.mask, MaskKind::Outer);
        assert_eq!(first.weights, second.weights);
        assert!((second.sigma - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn spec_json_overrides_flags() {
        let cli = Cli::try_parse_from([
            "spectramix",
            "mix",
            "--image",
            "a.png",
            "--spec1-json",
            r#"{"mode":"RealImaginary","sigma":2.5}"#,
            "--out1",
            "a.png",
        ])
        .unwrap();
        let Command::Mix(args) = cli.command else {
            unreachable!("parsed a mix command");
        };
        let spec = spec_from_cli(&args, OutputSlot::First).unwrap();
        assert_eq!(spec.mode, ComponentMode::RealImaginary);
        assert!((spec.sigma - 2.5).abs() < f64::EPSILON);
        assert_eq!(spec.weights[0], ComponentWeights::ZERO);
    }
}
