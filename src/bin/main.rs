use anyhow::{anyhow, bail, Context};
use colored::*;
use itertools::Itertools;
use llvm_ir::Module;
use std::collections::HashSet;
use std::path::PathBuf;
use symtrace::{analyze_trace, parse_trace, watch_ip, AnalyzerConfig, RenderOptions};

fn usage() {
    let progname = std::env::args().next().unwrap();
    println!("Usage:");
    println!("  {} <options> module.bc memlog.bin functions.txt", progname);
    println!("Replays the trace in memlog.bin against the IR in module.bc, following the");
    println!("dynamic function order listed (one name per line) in functions.txt.");
    println!();
    println!("Options: (these must come before non-option arguments)");
    println!();
    println!("  -h, --help: display this help message and exit");
    println!();
    println!("  --list-functions: list all functions defined in the LLVM bitcode and exit.");
    println!("      Only the module.bc argument is required with this option.");
    println!();
    println!("  --watch-ip <hex>: print the messages recorded at this guest IP instead of");
    println!("      the full message log, as a JSON response line. May be given multiple");
    println!("      times.");
    println!();
    println!("  --limit <n>: with --watch-ip, print at most <n> messages per IP.");
    println!();
    println!("  --max-depth <n>: elide expression subtrees deeper than <n> when rendering");
    println!("      messages.");
    println!();
    println!("  --interesting <funcname>: only analyze blocks of this function (may be");
    println!("      given multiple times). Other functions still advance the trace cursor.");
    println!();
    println!("  --debug-ip <hex>: log every (instruction, event) pair processed while the");
    println!("      current guest IP equals this value.");
    println!();
    println!("  --log-file <path>: route detailed logs to this file instead of stderr.");
    println!();
    println!("  --debug-logging: record log messages with `DEBUG` and higher priority.");
    println!("      If this option is not specified, only log messages with `INFO` and");
    println!("      higher priority will be recorded.");
    println!();
    println!("  --no-progress: disable the ~1% progress lines during evaluation.");
}

/// A struct which represents the options the user specified at the command-line
struct CommandLineOptions {
    config: AnalyzerConfig,
    watch_ips: Vec<u64>,
    limit: usize,
    max_depth: Option<usize>,
    list_functions: bool,
}

impl Default for CommandLineOptions {
    fn default() -> Self {
        Self {
            config: AnalyzerConfig::default(),
            watch_ips: Vec::new(),
            limit: 0,
            max_depth: None,
            list_functions: false,
        }
    }
}

fn parse_hex(s: &str) -> anyhow::Result<u64> {
    let digits = s.trim_start_matches("0x");
    u64::from_str_radix(digits, 16).with_context(|| format!("expected a hex value, got {:?}", s))
}

fn main() -> anyhow::Result<()> {
    let mut options = CommandLineOptions::default();
    let mut positional: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                usage();
                return Ok(());
            },
            "--list-functions" => options.list_functions = true,
            "--watch-ip" => {
                let value = args.next().context("--watch-ip requires a value")?;
                options.watch_ips.push(parse_hex(&value)?);
            },
            "--limit" => {
                options.limit = args
                    .next()
                    .context("--limit requires a value")?
                    .parse()
                    .context("--limit expects a number")?;
            },
            "--max-depth" => {
                options.max_depth = Some(
                    args.next()
                        .context("--max-depth requires a value")?
                        .parse()
                        .context("--max-depth expects a number")?,
                );
            },
            "--interesting" => {
                let name = args.next().context("--interesting requires a function name")?;
                options
                    .config
                    .interesting_funcs
                    .get_or_insert_with(HashSet::new)
                    .insert(name);
            },
            "--debug-ip" => {
                let value = args.next().context("--debug-ip requires a value")?;
                options.config.debug_ip = Some(parse_hex(&value)?);
            },
            "--log-file" => {
                let path = args.next().context("--log-file requires a path")?;
                options.config.log_file = Some(PathBuf::from(path));
            },
            "--debug-logging" => options.config.debug_logging = true,
            "--no-progress" => options.config.progress_updates = false,
            s if s.starts_with('-') => {
                bail!("unrecognized option {}; use --help for more information", s);
            },
            other => {
                positional.push(other.to_string());
                positional.extend(args.by_ref());
            },
        }
    }

    match &options.config.log_file {
        Some(path) => {
            symtrace::logging::init(path.display().to_string(), options.config.debug_logging);
        },
        None => {
            use env_logger::Env;
            let default = if options.config.debug_logging { "debug" } else { "info" };
            env_logger::Builder::from_env(Env::default().default_filter_or(default)).init();
        },
    }

    let bc_path = positional
        .first()
        .context("missing bitcode path; use --help for more information")?;
    let module = Module::from_bc_path(bc_path)
        .map_err(|e| anyhow!("failed to parse module at path {}: {}", bc_path, e))?;

    if options.list_functions {
        println!("\nFunctions defined in the LLVM bitcode:\n");
        for funcname in module.functions.iter().map(|f| &f.name).sorted() {
            println!("{}", funcname);
        }
        return Ok(());
    }

    if positional.len() != 3 {
        bail!("expected exactly 3 arguments (module.bc memlog.bin functions.txt); use --help for more information");
    }
    let trace_bytes = std::fs::read(&positional[1])
        .with_context(|| format!("failed to read trace at {}", positional[1]))?;
    let trace = parse_trace(&trace_bytes)?;
    let func_list: Vec<String> = std::fs::read_to_string(&positional[2])
        .with_context(|| format!("failed to read function list at {}", positional[2]))?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    let watch_ips = options.watch_ips.clone();
    let render = RenderOptions { max_depth: options.max_depth };
    let state = analyze_trace(&module, &trace, &func_list, options.config)?;

    if watch_ips.is_empty() {
        for (ip, msg) in state.messages() {
            match ip {
                Some(ip) => println!("({:#x}) {}", ip, msg.render(render.max_depth)),
                None => println!("(unknown) {}", msg.render(render.max_depth)),
            }
        }
    } else {
        for ip in watch_ips {
            let response = watch_ip(&state, ip, options.limit, &render);
            println!("{}", serde_json::to_string(&response)?);
        }
    }

    let num_messages = state.messages().len();
    let num_warnings = state.warnings().len();
    eprintln!();
    eprintln!("messages recorded: {}", num_messages.to_string().green());
    eprintln!(
        "warnings generated: {}",
        if num_warnings > 0 {
            num_warnings.to_string().yellow()
        } else {
            num_warnings.to_string().normal()
        }
    );
    Ok(())
}
