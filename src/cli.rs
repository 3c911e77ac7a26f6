//! CLI: generate documents, or turn a JSON Schema into an editable template.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rand::Rng;
use rayon::prelude::*;
use regex::Regex;
use serde_json::Value;

use json_fakedoc::generator::{DEFAULT_DEPTH, Generator, GeneratorOptions};
use json_fakedoc::limits::{LimitTree, Limits};
use json_fakedoc::template::Template;

/// Matches the scale of the lengths in typical limits files.
const DEFAULT_SIZE: f64 = 0.00001;

/// Placeholder for the document number in `--out`.
const NUMBER_PLACEHOLDER: &str = "{n}";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate random documents from a JSON Schema and/or a TOML template
#[derive(Parser, Debug)]
#[command(version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// generate one or more documents
    Generate(GenerateArgs),
    /// compile a JSON Schema into a TOML template to edit and feed back in
    Template(TemplateArgs),
}

#[derive(Args, Debug, Clone)]
struct GrammarSettings {
    /// JSON Schema the default template is compiled from
    #[arg(long)]
    schema: Option<PathBuf>,

    /// TOML templates merged in order over the schema-derived one. May be
    /// literal paths or quoted glob patterns
    #[arg(long, num_args = 1..)]
    template: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    grammar: GrammarSettings,

    /// size guidance (JSON limits file)
    #[arg(short, long)]
    limits: Option<PathBuf>,

    /// factor applied to the lengths of the limits file
    #[arg(long, default_value_t = DEFAULT_SIZE, value_parser = parse_size)]
    size: f64,

    /// make arrays as long as allowed instead of a random length
    #[arg(long)]
    force_max_size: bool,

    /// random seed, decimal or 0x-prefixed hex (random if omitted)
    #[arg(long, value_parser = parse_seed)]
    seed: Option<u64>,

    /// recursion budget
    #[arg(long, default_value_t = DEFAULT_DEPTH)]
    depth: usize,

    /// output .json file (stdout if omitted). With -n > 1 it must contain
    /// `{n}`, which is replaced by the document number starting at 0
    #[arg(short, long)]
    out: Option<String>,

    /// number of documents
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// pretty-print the JSON
    #[arg(short, long)]
    formatted: bool,

    /// regex over property names to force as required
    #[arg(long, value_parser = parse_regex)]
    require: Option<Regex>,

    /// slash separated path of a field to overwrite with the output file
    /// name, minus `.json` (e.g. document/tracking/id)
    #[arg(long, requires = "out")]
    filename_field: Option<String>,
}

#[derive(clap::Parser, Debug)]
struct TemplateArgs {
    /// JSON Schema to compile
    #[arg(long)]
    schema: PathBuf,

    /// output .toml file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl GrammarSettings {
    fn load(&self) -> anyhow::Result<Template> {
        if self.schema.is_none() && self.template.is_empty() {
            bail!("nothing to generate from: pass --schema and/or --template");
        }
        let mut template = match &self.schema {
            Some(path) => load_schema(path)?,
            None => Template::default(),
        };
        let paths = resolve_file_path_patterns(&self.template)
            .context("failed to resolve template file paths")?;
        for path in paths {
            template.merge(Template::load(&path)?);
        }
        template.validate().context("invalid template")?;
        Ok(template)
    }
}

impl GenerateArgs {
    fn run(&self) -> anyhow::Result<()> {
        if self.count > 1 && !self.out.as_deref().is_some_and(|o| o.contains(NUMBER_PLACEHOLDER)) {
            bail!("-n {} needs an --out file name containing {NUMBER_PLACEHOLDER}", self.count);
        }

        let template = Arc::new(self.grammar.load()?);
        let limits = match &self.limits {
            Some(path) => LimitTree::from_limits(&Limits::load(path)?),
            None => LimitTree::empty(),
        };
        let limits = Arc::new(limits);
        let options = GeneratorOptions {
            depth: self.depth,
            size_factor: self.size,
            force_max_size: self.force_max_size,
            require: self.require.clone(),
            now: chrono::Utc::now(),
        };
        let seed = self.seed.unwrap_or_else(|| rand::rng().random());
        tracing::info!(seed = %format!("{seed:#x}"), "seeding generator");

        if self.count <= 1 {
            let generator = Generator::new(template, limits, options, seed);
            return self.generate_one(generator, self.out.clone());
        }

        (0..self.count).into_par_iter().try_for_each(|n| {
            let generator = Generator::new(
                template.clone(),
                limits.clone(),
                options.clone(),
                document_seed(seed, n),
            );
            let out = self
                .out
                .as_ref()
                .map(|o| o.replace(NUMBER_PLACEHOLDER, &n.to_string()));
            self.generate_one(generator, out)
                .with_context(|| format!("document {n}"))
        })?;
        eprintln!("{} {} documents", "generated".green().bold(), self.count);
        Ok(())
    }

    fn generate_one(&self, mut generator: Generator, out: Option<String>) -> anyhow::Result<()> {
        let mut doc = generator.generate().context("generation failed")?;
        if let (Some(field), Some(out)) = (&self.filename_field, &out) {
            let stem = file_stem(out)?;
            set_value(&mut doc, field, Value::String(stem))
                .with_context(|| format!("setting {field}"))?;
        }
        let mut src = if self.formatted {
            serde_json::to_string_pretty(&doc)?
        } else {
            serde_json::to_string(&doc)?
        };
        src.push('\n');
        match out {
            Some(out) => write_file(Path::new(&out), &src),
            None => {
                print!("{src}");
                Ok(())
            }
        }
    }
}

impl TemplateArgs {
    fn run(&self) -> anyhow::Result<()> {
        let template = load_schema(&self.schema)?;
        let src = template.to_toml().context("failed to encode template as TOML")?;
        match &self.out {
            Some(out) => write_file(out, &src),
            None => {
                print!("{src}");
                Ok(())
            }
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Generate(target) => target.run(),
            Command::Template(target) => target.run(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn parse_seed(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|error| format!("invalid seed {s:?}: {error}"))
}

fn parse_size(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(size) if size.is_finite() && size >= 0.0 => Ok(size),
        Ok(_) => Err(format!("size must be a finite, non-negative number, got {s}")),
        Err(error) => Err(format!("invalid size {s:?}: {error}")),
    }
}

fn parse_regex(s: &str) -> Result<Regex, regex::Error> {
    Regex::new(s)
}

/// Independent, reproducible seeds for the documents of a batch.
fn document_seed(seed: u64, n: usize) -> u64 {
    seed.wrapping_add((n as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn load_schema(path: &Path) -> anyhow::Result<Template> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    let schema: Value = json_fakedoc::path_de::from_json_with_path(&src)
        .map_err(|message| anyhow!("{}: {message}", path.display()))?;
    json_fakedoc::schema::compile(&schema)
        .with_context(|| format!("failed to compile schema {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// File name without directory and `.json` suffix.
fn file_stem(path: &str) -> anyhow::Result<String> {
    let base = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{path:?} has no file name"))?;
    base.strip_suffix(".json")
        .map(str::to_string)
        .ok_or_else(|| anyhow!("file name {path:?} doesn't end with .json"))
}

/// Overwrite the field at a slash separated `path`; every component but
/// the last must name an existing object.
pub fn set_value(doc: &mut Value, path: &str, value: Value) -> anyhow::Result<()> {
    let components: Vec<&str> = path.split('/').collect();
    let (last, parents) = components
        .split_last()
        .ok_or_else(|| anyhow!("empty path"))?;
    let mut map = doc
        .as_object_mut()
        .ok_or_else(|| anyhow!("document is not an object"))?;
    for (i, key) in parents.iter().enumerate() {
        let prefix = || components[..=i].join("/");
        map = map
            .get_mut(*key)
            .ok_or_else(|| anyhow!("path {:?} not in document", prefix()))?
            .as_object_mut()
            .ok_or_else(|| anyhow!("path {:?} does not refer to an object", prefix()))?;
    }
    map.insert(last.to_string(), value);
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let matched = glob::glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
            if matched.is_empty() {
                // an explicit glob that matched nothing is an error
                bail!("glob pattern matched no files: {pattern}");
            }
            out.extend(matched);
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
