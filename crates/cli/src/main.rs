use std::io::Write;
use std::str::FromStr;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use orka_get::{chunk_size_from_env, GetCommand, GetOptions};
use orka_kubehub::{DisplayConverter, KubeFetcher};
use orka_printers::TabWriter;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "orkactl", version, about = "Orka CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Display one or many resources
    Get(GetArgs),
    /// List served resource types (incl. CRDs)
    Discover {
        /// Print the discovered resources as JSON
        #[arg(long = "json", action = ArgAction::SetTrue)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct GetArgs {
    /// TYPE[,TYPE...] [NAME...] or TYPE/NAME ...
    args: Vec<String>,
    /// json|yaml|name|wide|go-template=...|go-template-file=...|template=...|jsonpath=...|jsonpath-file=...|custom-columns=...|custom-columns-file=...
    #[arg(short = 'o', long = "output", default_value = "")]
    output: String,
    /// Template string or path for -o go-template / jsonpath
    #[arg(long = "template")]
    template: Option<String>,
    #[arg(long = "allow-missing-template-keys", default_value_t = true, action = ArgAction::Set)]
    allow_missing_template_keys: bool,
    #[arg(long = "no-headers", action = ArgAction::SetTrue)]
    no_headers: bool,
    #[arg(long = "show-labels", action = ArgAction::SetTrue)]
    show_labels: bool,
    #[arg(long = "show-kind", action = ArgAction::SetTrue)]
    show_kind: bool,
    /// Label keys to show as columns
    #[arg(short = 'L', long = "label-columns", value_delimiter = ',')]
    label_columns: Vec<String>,
    #[arg(short = 'A', long = "all-namespaces", action = ArgAction::SetTrue)]
    all_namespaces: bool,
    /// Kubernetes namespace (default: current context)
    #[arg(short = 'n', long = "namespace")]
    namespace: Option<String>,
    #[arg(short = 'l', long = "selector")]
    selector: Option<String>,
    #[arg(long = "field-selector")]
    field_selector: Option<String>,
    /// JSONPath to sort by, e.g. '{.metadata.name}'
    #[arg(long = "sort-by")]
    sort_by: Option<String>,
    #[arg(short = 'w', long = "watch", action = ArgAction::SetTrue)]
    watch: bool,
    #[arg(long = "watch-only", action = ArgAction::SetTrue)]
    watch_only: bool,
    #[arg(long = "ignore-not-found", action = ArgAction::SetTrue)]
    ignore_not_found: bool,
    /// Ask the server for pre-rendered tables
    #[arg(long = "server-print", default_value_t = true, action = ArgAction::Set)]
    server_print: bool,
    /// List page size (0 disables chunking)
    #[arg(long = "chunk-size", default_value_t = chunk_size_from_env())]
    chunk_size: u32,
}

impl GetArgs {
    fn into_options(self) -> GetOptions {
        GetOptions {
            args: self.args,
            output: self.output,
            template: self.template,
            allow_missing_template_keys: self.allow_missing_template_keys,
            no_headers: self.no_headers,
            show_labels: self.show_labels,
            show_kind: self.show_kind,
            label_columns: self.label_columns,
            all_namespaces: self.all_namespaces,
            namespace: self.namespace,
            selector: self.selector,
            field_selector: self.field_selector,
            sort_by: self.sort_by,
            watch: self.watch,
            watch_only: self.watch_only,
            ignore_not_found: self.ignore_not_found,
            server_print: self.server_print,
            chunk_size: self.chunk_size,
        }
    }
}

fn init_tracing() {
    let env = std::env::var("ORKA_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ORKA_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid ORKA_METRICS_ADDR; expected host:port");
        }
    }
}

async fn run_get(args: GetArgs) -> Result<()> {
    let opts = args.into_options();
    opts.validate()?;
    debug!(?opts, "get invoked");

    let fetcher = KubeFetcher::connect().await?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping");
            on_interrupt.cancel();
        }
    });

    let cmd = GetCommand::new(&fetcher, &DisplayConverter).with_type_resolver(fetcher.index());
    let mut out = std::io::stdout();
    let mut err = std::io::stderr();
    cmd.run(&opts, &mut out, &mut err, &cancel).await?;
    Ok(())
}

async fn run_discover(json: bool) -> Result<()> {
    let fetcher = KubeFetcher::connect().await?;
    let index = fetcher.index();
    let mut out = std::io::stdout();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(index.entries())?)?;
        return Ok(());
    }
    let mut tw = TabWriter::new(out);
    writeln!(tw, "NAME\tAPIVERSION\tNAMESPACED\tKIND")?;
    for r in index.entries() {
        let gv = if r.group.is_empty() { r.version.clone() } else { format!("{}/{}", r.group, r.version) };
        writeln!(tw, "{}\t{}\t{}\t{}", r.plural, gv, r.namespaced, r.kind)?;
    }
    tw.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Get(args) => run_get(args).await,
        Commands::Discover { json } => run_discover(json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> GetOptions {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Get(args) => args.into_options(),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn get_flags_map_onto_options() {
        let o = parse(&["orkactl", "get", "pods,svc", "-o", "wide", "-L", "app,tier", "-A", "--show-labels", "--chunk-size", "10"]);
        assert_eq!(o.args, vec!["pods,svc"]);
        assert_eq!(o.output, "wide");
        assert_eq!(o.label_columns, vec!["app", "tier"]);
        assert!(o.all_namespaces && o.show_labels);
        assert_eq!(o.chunk_size, 10);
        assert!(o.server_print);
        assert!(o.allow_missing_template_keys);
        o.validate().unwrap();
    }

    #[test]
    fn boolean_switches_take_values() {
        let o = parse(&["orkactl", "get", "pods", "--server-print=false", "--allow-missing-template-keys=false", "-w", "--sort-by", ".metadata.name"]);
        assert!(!o.server_print);
        assert!(!o.allow_missing_template_keys);
        assert!(o.watch);
        assert!(o.validate().is_err());
    }

    #[test]
    fn output_defaults_to_table() {
        let o = parse(&["orkactl", "get", "deploy/web", "--ignore-not-found"]);
        assert_eq!(o.output, "");
        assert!(o.ignore_not_found);
        assert_eq!(o.sort_by, None);
    }
}
