use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Once};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "tagvm_core=info,tagvm_stdlib=info,tagvm_cli=info,tagvm::console=info";

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tagvm_core::{
    VmConfig,
    vm::{
        self, BytecodeArtifact, BytecodeModule, CharMode, ConstantDecoder, ModuleFlags, ModuleMeta, OpcodeMap,
        ProgramStats, TraceRecorder, ValueStats, Vm, VmState,
    },
};
use tagvm_stdlib::{reference_opcode_map, standard_machine};

mod output;

use output::{print_histogram, write_output};

#[derive(Debug, Parser)]
#[command(
    name = "tagvm",
    author,
    version,
    about = "Decode, disassemble and run tagged bytecode",
    long_about = None
)]
struct CliArgs {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

/// Options that override the configuration file.
#[derive(Debug, Default, Args)]
struct GlobalOpts {
    /// VM configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,

    /// Digit alphabet of the encoded stream
    #[arg(long, global = true)]
    alphabet: Option<String>,

    /// Terminal digit count; the rest of the alphabet continues a number
    #[arg(long, global = true)]
    base: Option<usize>,

    /// Character transform applied to inline string slots
    #[arg(long, global = true, value_enum)]
    chars: Option<CharsArg>,

    /// Extract the embedded string pool before running or disassembling
    #[arg(long, global = true)]
    string_pool: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CharsArg {
    Identity,
    MaskMultiply,
}

impl From<CharsArg> for CharMode {
    fn from(value: CharsArg) -> Self {
        match value {
            CharsArg::Identity => CharMode::Identity,
            CharsArg::MaskMultiply => CharMode::MaskMultiply,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode an encoded instruction stream into a bytecode artifact.
    Decode {
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        /// Output file; prints JSON to stdout when omitted
        #[arg(short, long, value_name = "FILE", value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
        /// Write a TGVB container instead of JSON
        #[arg(long, requires = "output")]
        module: bool,
    },
    /// Encode a program back into the stream alphabet.
    Encode {
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        #[arg(short, long, value_name = "FILE", value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
    },
    /// Statically disassemble a program without executing it.
    Disasm {
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        /// Opcode metadata (JSON, YAML or TOML); defaults to the reference set
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        opcodes: Option<PathBuf>,
        /// Maximum number of instructions to decode
        #[arg(long, default_value_t = 500)]
        limit: usize,
        /// Write the disassembly artifact (JSON) here instead of printing a listing
        #[arg(short, long, value_name = "FILE", value_parser = parse_sanitized_path)]
        output: Option<PathBuf>,
        /// Number of most frequent raw values to report
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Execute a program with the reference opcode handlers.
    Run {
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        opcodes: Option<PathBuf>,
        /// Write an execution trace (JSON) to this file
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        trace: Option<PathBuf>,
        /// Maximum number of trace entries kept
        #[arg(long)]
        trace_limit: Option<usize>,
        /// Abort after this many instructions
        #[arg(long)]
        max_steps: Option<u64>,
    },
    /// Print raw value statistics for a program.
    Stats {
        #[arg(value_name = "INPUT", value_parser = parse_sanitized_path)]
        input: PathBuf,
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        opcodes: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("TAGVM_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

/// Config file first, then command-line overrides.
fn resolve_config(opts: &GlobalOpts) -> anyhow::Result<VmConfig> {
    let mut config = match &opts.config {
        Some(path) => VmConfig::load(path)?,
        None => VmConfig::default(),
    };
    if let Some(alphabet) = &opts.alphabet {
        config.alphabet = alphabet.clone();
    }
    if let Some(base) = opts.base {
        config.base = base;
    }
    if let Some(chars) = opts.chars {
        config.chars = chars.into();
    }
    if opts.string_pool {
        config.string_pool = true;
    }
    config.validate()?;
    tracing::debug!(
        base = config.base,
        chars = ?config.chars,
        string_pool = config.string_pool,
        "resolved VM config"
    );
    Ok(config)
}

/// A program ready for the VM or the disassembler.
struct Prepared {
    program: Vec<i32>,
    decoder: ConstantDecoder,
    config: VmConfig,
}

fn prepare_program(path: &Path, config: &VmConfig) -> anyhow::Result<Prepared> {
    let loaded = vm::load_program(path, config)?;
    let mut config = config.clone();
    if let Some(tags) = loaded.tags {
        config.tags = tags;
    }
    if loaded.flags.contains(ModuleFlags::STRING_POOL) {
        config.string_pool = true;
    }
    config.validate()?;
    let (program, decoder) = config
        .prepare(loaded.program)
        .with_context(|| format!("Failed to prepare {}", path.display()))?;
    Ok(Prepared {
        program,
        decoder,
        config,
    })
}

fn load_opcodes(path: Option<&Path>) -> anyhow::Result<Cow<'static, OpcodeMap>> {
    match path {
        Some(path) => Ok(Cow::Owned(OpcodeMap::load(path)?)),
        None => Ok(Cow::Borrowed(reference_opcode_map())),
    }
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs { global, command } = CliArgs::parse();
    let config = resolve_config(&global)?;

    match command {
        Commands::Decode { input, output, module } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read encoded stream {}", input.display()))?;
            let program = config.alphabet()?.decode(text.trim())?;
            if module {
                let mut module = BytecodeModule::new(program);
                if config.string_pool {
                    module.flags.insert(ModuleFlags::STRING_POOL);
                }
                if config.tags != Default::default() {
                    module.tags = Some(config.tags);
                }
                module.meta = Some(ModuleMeta {
                    source: Some(input.display().to_string()),
                    ..Default::default()
                });
                let Some(out_path) = output.as_deref() else {
                    anyhow::bail!("--module requires --output");
                };
                let bytes = vm::encode_module(&module)?;
                output::write_bytes(out_path, &bytes)?;
                eprintln!("Emitted module to {} ({} bytes)", out_path.display(), bytes.len());
            } else {
                let artifact = BytecodeArtifact::new(program);
                write_output(output.as_deref(), &artifact.to_json_pretty()?)?;
            }
        }
        Commands::Encode { input, output } => {
            let loaded = vm::load_program(&input, &config)?;
            let encoded = config.alphabet()?.encode(&loaded.program)?;
            write_output(output.as_deref(), &encoded)?;
        }
        Commands::Disasm {
            input,
            opcodes,
            limit,
            output,
            top,
        } => {
            let prepared = prepare_program(&input, &config)?;
            let map = load_opcodes(opcodes.as_deref())?;
            let disassembly = vm::disassemble(&prepared.program, &map, &prepared.decoder, Some(limit));
            eprintln!(
                "Disassembled {} instructions from {} slots ({} positions skipped, {} decode errors)",
                disassembly.instructions_disassembled,
                disassembly.total_bytecode,
                disassembly.skipped,
                disassembly.decode_errors()
            );
            match output {
                Some(path) => {
                    let json = serde_json::to_string_pretty(&disassembly)?;
                    write_output(Some(&path), &json)?;
                }
                None => {
                    print!("{}", disassembly);
                    println!();
                    print_histogram(&disassembly.histogram());
                    println!();
                    print!(
                        "{}",
                        ValueStats::of(&prepared.program, top, &map, &prepared.config.tags)
                    );
                }
            }
        }
        Commands::Run {
            input,
            opcodes,
            trace,
            trace_limit,
            max_steps,
        } => {
            let prepared = prepare_program(&input, &config)?;
            let custom = match opcodes.as_deref() {
                Some(path) => Some(OpcodeMap::load(path)?),
                None => None,
            };
            let max_steps = max_steps.or(prepared.config.max_steps);
            let machine = standard_machine(prepared.program, prepared.decoder, custom.as_ref())?
                .with_max_steps(max_steps)
                .with_max_call_depth(prepared.config.max_call_depth);
            let machine = Arc::new(machine);

            let mut recorder = TraceRecorder::new(trace_limit.unwrap_or(prepared.config.trace_limit));
            let outcome = if trace.is_some() {
                let mut vm = Vm::new(machine).with_trace(&mut recorder);
                vm.run()
            } else {
                Vm::new(machine).run()
            };

            if let Some(path) = &trace {
                let json = serde_json::to_string_pretty(&recorder.into_artifact())?;
                write_output(Some(path), &json)?;
            }

            eprintln!("{:?} after {} steps", outcome.state, outcome.steps);
            if outcome.state == VmState::Faulted {
                if let Some(fault) = outcome.fault {
                    return Err(fault.into());
                }
            }
            if let Some(result) = outcome.result {
                println!("{}", result);
            }
        }
        Commands::Stats { input, opcodes, top } => {
            let prepared = prepare_program(&input, &config)?;
            let map = load_opcodes(opcodes.as_deref())?;
            let stats = ProgramStats::of(&prepared.program);
            println!("Length: {}", stats.length);
            println!("Unique values: {}", stats.unique);
            if let (Some(min), Some(max)) = (stats.min, stats.max) {
                println!("Range: {}..={}", min, max);
            }
            println!();
            print!(
                "{}",
                ValueStats::of(&prepared.program, top, &map, &prepared.config.tags)
            );
        }
    }

    Ok(())
}
