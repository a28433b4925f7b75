use facet::Facet;
use figue as args;
use tether_examples::scenarios;
use tether_types::{GraphSnapshot, SequenceSnapshot};

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Print the graph as JSON instead of one line per node.
    #[facet(args::named, default)]
    json: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    IoChain,
    AwaitChain,
    CrossContextSettle,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let graph = dispatch_command(cli.command).await?;
    if cli.json {
        let json = facet_json::to_string(&graph).map_err(|e| format!("encode graph: {e}"))?;
        println!("{json}");
    } else {
        print_graph(&graph);
    }
    Ok(())
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("tether-examples")
                .description("Run tether scenarios and print the causality graph they build")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

async fn dispatch_command(command: CommandKind) -> AnyResult<GraphSnapshot> {
    match command {
        CommandKind::IoChain => scenarios::io_chain::run().await,
        CommandKind::AwaitChain => scenarios::await_chain::run().await,
        CommandKind::CrossContextSettle => scenarios::cross_context_settle::run().await,
    }
}

fn print_graph(graph: &GraphSnapshot) {
    for node in &graph.nodes {
        let marker = if node.id == graph.root { "*" } else { " " };
        println!("{marker} {}", describe(node));
    }
}

fn describe(node: &SequenceSnapshot) -> String {
    let mut line = format!("#{} {:?}", node.id, node.kind);
    if let Some(owner) = &node.owner {
        line.push_str(&format!(" owner={owner}"));
    }
    match node.end_ns {
        Some(end_ns) => line.push_str(&format!(
            " took={:.3}ms",
            end_ns.saturating_sub(node.start_ns) as f64 / 1_000_000.0
        )),
        None => line.push_str(" pending"),
    }
    if let Some(awaited) = node.awaited {
        line.push_str(&format!(" awaited=#{awaited}"));
    }
    if let Some(previous) = node.previous {
        line.push_str(&format!(" previous=#{previous}"));
    }
    if let Some(stack) = &node.stack {
        line.push_str(&format!(" stack={}f", stack.len()));
    } else if node.stack_inherited {
        line.push_str(" stack=inherited");
    }
    line
}
