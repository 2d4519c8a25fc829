use std::sync::Arc;

use facet::Facet;
use figue as args;
use guardlock::{DiagnosticSink, GuardConfig, JsonLinesSink, ProductInfo, TracingSink};

mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Write diagnostic events to stderr as JSON lines instead of logging them.
    #[facet(args::named, default)]
    json: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    ReactorViolation,
    NamedThread {
        #[facet(args::named, default)]
        thread_name: Option<String>,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = GuardConfig::from_env()
        .map_err(|e| format!("invalid guard configuration: {e}"))?
        .with_product(ProductInfo::new(
            "guardlock-demo",
            option_env!("CARGO_PKG_VERSION").unwrap_or("dev"),
        ));
    let sink: Arc<dyn DiagnosticSink> = if cli.json {
        Arc::new(JsonLinesSink::new(std::io::stderr()))
    } else {
        Arc::new(TracingSink)
    };

    match cli.command {
        CommandKind::ReactorViolation => scenarios::reactor_violation::run(config, sink),
        CommandKind::NamedThread { thread_name } => scenarios::named_thread::run(
            config,
            sink,
            thread_name.as_deref().unwrap_or("reactor"),
        ),
    }
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("guardlock-demo")
                .description("Trip guardlock forbidden-context diagnostics on purpose")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}
