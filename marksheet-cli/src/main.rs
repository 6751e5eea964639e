use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// Import from marksheet-core
use marksheet_core::config::SubjectTableConfig;
use marksheet_core::rules::SubjectTableExtractor;
use marksheet_core::{
    ExtractedMarksheet, ExtractionConfig, ExtractionStages, MarksheetProcessor, MediaType,
    UploadStore,
};

// Import CLI utilities
use marksheet_cli::locate_config;

#[derive(Parser)]
#[command(name = "marksheet-extract")]
#[command(about = "Extract student details and subject marks from a scanned marksheet")]
struct Args {
    /// Marksheet image (PNG, JPEG, WebP, GIF, BMP, TIFF) or PDF
    #[arg(short, long)]
    input: String,

    /// Declared MIME type (guessed from the file extension if not given)
    #[arg(short, long)]
    media_type: Option<String>,

    /// Path to custom config file (YAML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Output format: marksheet or rows
    #[arg(short = 'f', long, default_value = "marksheet")]
    output_format: String,

    /// Show available config options and exit
    #[arg(long)]
    show_configs: bool,

    /// Output file path (if not specified, auto-generated based on input)
    #[arg(short, long)]
    output: Option<String>,

    /// Skip the vision model even when an API key is available
    #[arg(long)]
    no_vision: bool,

    /// Tesseract language hint (e.g. eng, eng+tam)
    #[arg(long)]
    lang: Option<String>,

    /// Enable detailed profiling of all pipeline steps
    #[arg(long)]
    profile: bool,

    /// Dump raw text, normalized lines and the final record to a directory
    #[arg(long)]
    dump_stages: bool,

    /// Directory for stage dump output
    #[arg(long, default_value = "test_outputs/stages")]
    stages_dir: String,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    println!("Marksheet Extractor");

    if args.show_configs {
        show_help()?;
        return Ok(());
    }

    let input = Path::new(&args.input);
    if !input.exists() {
        eprintln!("Input file not found at: {}", args.input);
        std::process::exit(2);
    }

    let media_type = match resolve_media_type(input, args.media_type.as_deref()) {
        Ok(media_type) => media_type,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let working_dir = std::env::current_dir()?;
    let config_path = locate_config(args.config.as_deref(), &working_dir);
    let mut config = ExtractionConfig::load_with_fallback(
        config_path.as_deref().and_then(|path| path.to_str()),
    );

    match &config_path {
        Some(path) => println!("Loaded config from: {}", path.display()),
        None => println!("Using default config"),
    }

    // Apply CLI overrides to config
    if args.no_vision {
        config.vision.enabled = false;
    }
    if let Some(lang) = &args.lang {
        config.local.language = lang.clone();
    }

    let store = UploadStore::new(config.upload_dir())?;
    debug!(dir = %store.root().display(), "staging uploads");
    let processor = MarksheetProcessor::from_config(config)?;
    println!("Backends: {}", processor.chain_names().join(" -> "));
    println!("Processing: {} ({media_type})", args.input);

    let upload = store.stage_file(input, media_type)?;

    // Stage dump mode: capture and save all intermediates
    if args.dump_stages {
        match processor.extract_capture_stages(upload) {
            Ok(stages) => {
                save_stages(&stages, &args.input, &args.stages_dir)?;
                println!("\nAll stages dumped to: {}", args.stages_dir);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Stage dump failed: {e}");
                std::process::exit(1);
            }
        }
    }

    match processor.extract_with_profiling(upload, args.profile) {
        Ok(marksheet) => {
            print_summary(&marksheet);

            let output_path = args.output.clone().unwrap_or_else(|| {
                let input_name = input
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("output");
                format!("{input_name}_marksheet.json")
            });

            save_marksheet(&marksheet, &output_path, &args.output_format)?;
        }
        Err(e) => {
            eprintln!("Extraction failed: {e}");
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays readable; RUST_LOG overrides the level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_media_type(input: &Path, declared: Option<&str>) -> Result<MediaType> {
    match declared {
        Some(mime) => MediaType::from_mime(mime)
            .ok_or_else(|| anyhow!("Unsupported media type: {mime}. Upload an image or PDF.")),
        None => MediaType::from_path(input).ok_or_else(|| {
            anyhow!(
                "Cannot tell the media type of {} from its extension; pass --media-type",
                input.display()
            )
        }),
    }
}

fn print_summary(marksheet: &ExtractedMarksheet) {
    println!("Extracted with {} backend", marksheet.diagnostics.backend);
    println!("   - Student: {}", display_or_dash(&marksheet.student_name));
    println!("   - Register number: {}", display_or_dash(&marksheet.register_number));
    println!("   - Subjects: {}", marksheet.subjects.len());
    for subject in &marksheet.subjects {
        let result = subject
            .result
            .map(|r| if r.is_pass() { "PASS" } else { "FAIL" })
            .unwrap_or("-");
        println!(
            "       {:<32} {:>4}  {:<9} {}",
            subject.subject_name,
            subject.marks,
            subject.paper_type.as_str(),
            result
        );
    }
    println!("   - Total: {}", display_or_dash(&marksheet.total_marks));
    if let Some(result) = marksheet.overall_result {
        println!("   - Result: {}", if result.is_pass() { "PASS" } else { "FAIL" });
    }
    println!("   - Confidence: {}%", marksheet.confidence);
    if let Some(warning) = &marksheet.warning {
        println!("Warning: {warning}");
    }
    for attempt in &marksheet.diagnostics.failed_attempts {
        println!("   (fell back after {attempt})");
    }
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn show_help() -> Result<()> {
    println!("\nAvailable Configuration Options:");
    println!("  --config <path>         Load custom config file");
    println!("  --input <path>          Marksheet image or PDF to process");
    println!("  --media-type <mime>     Declared MIME type (default: from extension)");
    println!("  --output <path>         Output file path (auto-generated if not specified)");
    println!("  --output-format <fmt>   Output format: marksheet or rows");
    println!("  --no-vision             Use local OCR only");
    println!("  --lang <code>           Tesseract language hint");

    println!("\nOutput Formats:");
    println!("  marksheet   - Full extracted record with confidence and diagnostics (default)");
    println!("  rows        - Subject rows ready for the marks table");

    println!("\nConfig lookup (when --config is not given):");
    println!("  ./marksheet.yaml");
    println!("  <user config dir>/marksheet-extract/config.yaml");

    println!("\nVision backend:");
    println!("  Reads the API key from OPENAI_API_KEY unless vision.api_key is set.");
    println!("  Without a key, only tesseract and poppler are used.");

    println!("\nSubject line layouts (tried in order):");
    let extractor = SubjectTableExtractor::new(&SubjectTableConfig::default())?;
    for name in extractor.pattern_names() {
        println!("  {name}");
    }

    println!("\nUsage Examples:");
    println!("  marksheet-extract -i scan.jpg");
    println!("  marksheet-extract -i result.pdf -f rows -o rows.json");
    println!("  marksheet-extract -i upload.bin -m image/png --no-vision --profile");
    Ok(())
}

fn save_stages(stages: &ExtractionStages, input: &str, output_dir: &str) -> Result<()> {
    use std::fs;
    fs::create_dir_all(output_dir)?;

    // Stage 1: Raw recognized text
    let raw_path = format!("{}/stage1_raw_text.txt", output_dir);
    fs::write(&raw_path, &stages.raw_text)?;
    println!("  {}", raw_path);

    // Stage 2: Normalized lines
    let lines_path = format!("{}/stage2_lines.json", output_dir);
    fs::write(&lines_path, serde_json::to_string_pretty(&stages.lines)?)?;
    println!("  {} ({} lines)", lines_path, stages.lines.len());

    // Stage 3: Reconciled marksheet
    let marksheet_path = format!("{}/stage3_marksheet.json", output_dir);
    stages.marksheet.save_with_format(&marksheet_path, "marksheet")?;
    println!("  {} ({} subjects)", marksheet_path, stages.marksheet.subjects.len());

    let summary = serde_json::json!({
        "input": input,
        "captured_at": chrono::Utc::now().to_rfc3339(),
        "backend": stages.marksheet.diagnostics.backend,
        "stage_counts": {
            "raw_text_bytes": stages.raw_text.len(),
            "lines": stages.lines.len(),
            "subjects": stages.marksheet.subjects.len(),
            "rejected_lines": stages.marksheet.diagnostics.rejected_lines,
        }
    });
    let summary_path = format!("{}/summary.json", output_dir);
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    println!("  {}", summary_path);

    Ok(())
}

fn save_marksheet(marksheet: &ExtractedMarksheet, output_path: &str, format: &str) -> Result<()> {
    marksheet.save_with_format(output_path, format)?;

    match format {
        "rows" => println!("Subject rows saved to: {}", output_path),
        "marksheet" => println!("Marksheet saved to: {}", output_path),
        _ => {
            println!("Unknown output format '{}', using marksheet format", format);
            println!("Marksheet saved to: {}", output_path);
        }
    }

    Ok(())
}
