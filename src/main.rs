use firespec::api::HttpCloudApi;
use firespec::output::OutputEnvelope;
use firespec::pipeline::DiscoveryPipeline;
use firespec::request::DiscoveryRequest;
use firespec::spawn::StdioPolicy;
use firespec::{Error, VERSION};

use clap::Parser;
use std::env;
use std::io::Write;
use tracing::{debug, error, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Backend spec discovery for Firebase Cloud Functions projects
#[derive(Parser, Debug)]
#[command(
    name = "firespec",
    about = "Backend spec discovery for Firebase Cloud Functions projects",
    version,
    long_about = "firespec reads one JSON discovery request from stdin, resolves the \
                  project's runtime delegate, validates and builds the functions source, \
                  merges remote and user environment variables, and writes the flattened \
                  trigger specification to stdout. All diagnostics go to stderr."
)]
struct CliArgs {
    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    log_level: Option<String>,

    #[arg(short = 'v', long, help = "Increase verbosity")]
    verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("firespec v{} starting", VERSION);

    std::process::exit(run().await);
}

async fn run() -> i32 {
    let request = match DiscoveryRequest::from_reader(std::io::stdin().lock()) {
        Ok(request) => request,
        Err(e) => return fail(&e),
    };

    let api = match HttpCloudApi::from_env() {
        Ok(api) => api,
        Err(e) => return fail(&e),
    };

    let pipeline = DiscoveryPipeline::new(&api, StdioPolicy::RedirectStdoutToStderr);
    let outcome = match pipeline.run(&request).await {
        Ok(outcome) => outcome,
        Err(e) => return fail(&e),
    };

    let document = match OutputEnvelope::from_outcome(&outcome)
        .and_then(|envelope| envelope.encode(request.formatting))
    {
        Ok(document) => document,
        Err(e) => return fail(&e),
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout
        .write_all(document.as_bytes())
        .and_then(|()| stdout.flush())
    {
        error!("failed to write response: {e}");
        return 1;
    }
    0
}

/// Logs the full error chain and returns the exit code for it. Nothing
/// is ever written to stdout on failure.
fn fail(err: &Error) -> i32 {
    error!("{}", render_chain(err));
    err.exit_code()
}

fn render_chain(err: &Error) -> String {
    use std::error::Error as _;
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}

fn init_logging_from_args(args: &CliArgs) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &args.log_level {
            parse_level(level_str)
        } else if args.verbose {
            Level::DEBUG
        } else if args.quiet {
            Level::ERROR
        } else {
            let level_str = env::var("FIRESPEC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            parse_level(&level_str)
        };

        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            filter = filter
                .add_directive(format!("firespec={}", level).parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("reqwest=warn".parse().unwrap());
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
