//! Scenequest CLI
//!
//! Thin command-line front end over the scenequest libraries:
//! - `generate`: enumerate every question a template registry can render
//! - `answer`: answer a free-text question about a scene
//! - `apply`: apply one transformation request to a scene
//! - `relationships`: print or re-derive a scene's relationship table

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::filter::LevelFilter;

use scenequest_eval::QuestionAnswerer;
use scenequest_scene::{compute_relationships, Direction, EngineConfig, Scene, Transformation, Transformer};
use scenequest_templates::{GenerateOptions, QuestionGenerator, TemplateDocument, TemplateRegistry};

#[derive(Parser)]
#[command(name = "scenequest")]
#[command(author, version, about = "Scenequest: template questions about edited 3D scenes")]
struct Cli {
    /// Engine configuration (JSON). Missing fields fall back to defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity: -v info, -vv debug, -vvv trace (default: warnings only)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate rendered questions for every (or selected) transformation.
    Generate {
        #[command(flatten)]
        registry: RegistryArgs,
        /// Stop after this many questions
        #[arg(long)]
        max: Option<usize>,
        /// Only this transformation type (repeatable)
        #[arg(short = 't', long = "transformation")]
        transformations: Vec<String>,
        /// Enumerate transformations in parallel
        #[arg(long)]
        parallel: bool,
        /// Output records JSON (default: one question per line on stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also export the registry in tabular (CSV) form
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Answer a free-text question about a scene.
    Answer {
        /// Scene description JSON
        #[arg(long)]
        scene: PathBuf,
        /// Question text
        #[arg(short, long)]
        question: String,
        #[command(flatten)]
        registry: RegistryArgs,
        /// Print the matched template, bindings and answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply a transformation request (JSON) to a scene.
    Apply {
        /// Scene description JSON
        #[arg(long)]
        scene: PathBuf,
        /// Transformation request, e.g. `{"kind":"rotate","degrees":90}`
        #[arg(long)]
        edit: String,
        /// Output scene JSON (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print a scene's relationship table, or check it against its geometry.
    Relationships {
        /// Scene description JSON
        #[arg(long)]
        scene: PathBuf,
        /// Recompute from coordinates and fail on any difference
        #[arg(long)]
        check: bool,
    },
}

/// Where templates come from: the built-in registry, a template document, or
/// a CSV table plus a document supplying value sets.
#[derive(Args)]
struct RegistryArgs {
    /// Template document (QUESTION_TEMPLATES / TRANSFORM_PLACEHOLDER_VALUES JSON)
    #[arg(long, conflicts_with = "templates_csv")]
    templates: Option<PathBuf>,
    /// Tabular templates (CSV); requires --values
    #[arg(long, requires = "values")]
    templates_csv: Option<PathBuf>,
    /// Template document whose TRANSFORM_PLACEHOLDER_VALUES are used with --templates-csv
    #[arg(long)]
    values: Option<PathBuf>,
}

impl RegistryArgs {
    fn load(&self) -> Result<TemplateRegistry> {
        let registry = match (&self.templates, &self.templates_csv, &self.values) {
            (Some(path), _, _) => TemplateRegistry::from_json_path(path)
                .with_context(|| format!("loading templates from {}", path.display()))?,
            (None, Some(csv), Some(values)) => {
                let document = TemplateDocument::from_path(values)
                    .with_context(|| format!("loading value sets from {}", values.display()))?;
                TemplateRegistry::from_csv_path(csv, &document)
                    .with_context(|| format!("loading templates from {}", csv.display()))?
            }
            _ => TemplateRegistry::builtin().context("loading built-in templates")?,
        };
        tracing::info!(templates = registry.len(), "template registry loaded");
        Ok(registry)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            registry,
            max,
            transformations,
            parallel,
            out,
            csv,
        } => {
            let options = GenerateOptions {
                max_questions: max,
                transformations,
            };
            cmd_generate(&registry.load()?, &options, parallel, out.as_deref(), csv.as_deref())
        }
        Commands::Answer {
            scene,
            question,
            registry,
            json,
        } => cmd_answer(&config, &registry.load()?, &scene, &question, json),
        Commands::Apply { scene, edit, out } => cmd_apply(&config, &scene, &edit, out.as_deref()),
        Commands::Relationships { scene, check } => cmd_relationships(&config, &scene, check),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: EngineConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    if !(config.epsilon.is_finite() && config.epsilon >= 0.0) {
        bail!("config epsilon must be a non-negative number, got {}", config.epsilon);
    }
    Ok(config)
}

fn read_scene(path: &Path) -> Result<Scene> {
    Scene::read_from_path(path).with_context(|| format!("loading scene {}", path.display()))
}

fn cmd_generate(
    registry: &TemplateRegistry,
    options: &GenerateOptions,
    parallel: bool,
    out: Option<&Path>,
    csv: Option<&Path>,
) -> Result<()> {
    let generator = QuestionGenerator::new(registry);
    for transformation in registry.transformations() {
        tracing::info!(
            transformation,
            bindings = %generator.enumeration_size(transformation),
            questions = %generator.record_count(transformation),
            "enumeration size"
        );
    }

    let records = if parallel {
        generator.generate_parallel(options)
    } else {
        generator.generate(options)
    };

    match out {
        Some(path) => {
            let text = serde_json::to_string_pretty(&records)?;
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} {} questions to {}",
                "wrote".green().bold(),
                records.len(),
                path.display().to_string().bold()
            );
        }
        None => {
            for record in &records {
                println!("{}", record.question);
            }
        }
    }

    if let Some(path) = csv {
        let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        registry.write_csv(file)?;
        eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    }
    Ok(())
}

fn cmd_answer(
    config: &EngineConfig,
    registry: &TemplateRegistry,
    scene_path: &Path,
    question: &str,
    json: bool,
) -> Result<()> {
    let scene = read_scene(scene_path)?;
    let answerer = QuestionAnswerer::new(registry, config.clone());
    let answered = answerer.answer(&scene, question)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&answered)?);
    } else {
        eprintln!("{} {}", "template".cyan().bold(), answered.template_id);
        for (key, value) in &answered.bindings {
            eprintln!("  {} {key} = {value}", "→".yellow());
        }
        println!("{}", answered.answer);
    }
    Ok(())
}

fn cmd_apply(config: &EngineConfig, scene_path: &Path, edit: &str, out: Option<&Path>) -> Result<()> {
    let scene = read_scene(scene_path)?;
    let transformation: Transformation =
        serde_json::from_str(edit).context("parsing --edit as a transformation request")?;
    let edited = Transformer::new(config.clone()).apply(&scene, &transformation)?;
    match out {
        Some(path) => {
            edited.write_to_path(path)?;
            eprintln!(
                "{} {} ({} → {} objects) to {}",
                "applied".green().bold(),
                transformation.name(),
                scene.len(),
                edited.len(),
                path.display().to_string().bold()
            );
        }
        None => println!("{}", edited.to_json_pretty()?),
    }
    Ok(())
}

fn cmd_relationships(config: &EngineConfig, scene_path: &Path, check: bool) -> Result<()> {
    let scene = read_scene(scene_path)?;
    if !check {
        print!("{}", render_relationships(&scene));
        return Ok(());
    }

    let derived = compute_relationships(scene.objects(), scene.directions(), config.epsilon);
    let mismatched: Vec<Direction> = Direction::CARDINAL
        .into_iter()
        .filter(|&d| scene.relationships().get(d) != derived.get(d))
        .collect();
    if mismatched.is_empty() {
        eprintln!(
            "{} relationships match coordinates (epsilon {})",
            "ok".green().bold(),
            config.epsilon
        );
        return Ok(());
    }
    for direction in &mismatched {
        eprintln!("{} `{direction}` differs from the recomputed table", "error:".red().bold());
    }
    bail!("{} of {} directions disagree with the scene geometry", mismatched.len(), Direction::CARDINAL.len())
}

fn render_relationships(scene: &Scene) -> String {
    let mut out = String::new();
    for index in 0..scene.len() {
        let description = scene.describe(index).unwrap_or_default();
        out.push_str(&format!("{index}: {description}\n"));
        for direction in Direction::CARDINAL {
            let related = scene.related(direction, index);
            if !related.is_empty() {
                out.push_str(&format!("    {direction}: {related:?}\n"));
            }
        }
    }
    out
}
