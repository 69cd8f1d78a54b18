use apiwatch::commands::{ErrorBanner, MonitorHandle, PingReport};
use apiwatch::config::MonitorConfig;
use apiwatch::monitor::{AggregatedRecord, StatsSummary};
use apiwatch::providers::{PingResult, PingStatus, ProviderFamily};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug)]
struct CliArgs {
    command: String,
    format: OutputFormat,
    pretty: bool,
    include_ping: bool,
}

fn main() {
    let args = parse_args(std::env::args().skip(1).collect());
    if args.command == "--help" || args.command == "-h" {
        print_help();
        return;
    }
    if args.command == "--version" || args.command == "-V" {
        println!("apiwatch {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(banner) = run(&args) {
        eprintln!("❌ {}", banner.message);
        eprintln!("{}", banner.hint);
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<(), ErrorBanner> {
    apiwatch::init_logging(false);
    let config = MonitorConfig::from_env().map_err(|err| ErrorBanner::new(format!("{:#}", err)))?;
    apiwatch::init_logging(config.log_to_file);

    let handle = MonitorHandle::from_config(&config)?;

    match args.command.as_str() {
        "balances" => {
            let records = handle.get_cached_balances(args.include_ping)?;
            match args.format {
                OutputFormat::Text => println!("{}", render_balances_text(&records)),
                OutputFormat::Json => print_json(&records, args.pretty)?,
            }
        }
        "ping" => {
            let report = handle.ping_all_apis()?;
            match args.format {
                OutputFormat::Text => println!("{}", render_ping_text(&report)),
                OutputFormat::Json => print_json(&report, args.pretty)?,
            }
        }
        "stats" => {
            let records = handle.get_cached_balances(false)?;
            let stats = handle.compute_stats(&records);
            match args.format {
                OutputFormat::Text => println!("{}", render_stats_text(&stats)),
                OutputFormat::Json => print_json(&stats, args.pretty)?,
            }
        }
        other => {
            return Err(ErrorBanner::new(format!(
                "Unknown command: {}. Use --help for usage.",
                other
            )))
        }
    }

    Ok(())
}

fn parse_args(mut argv: Vec<String>) -> CliArgs {
    let mut format = OutputFormat::Text;
    let mut pretty = false;
    let mut include_ping = false;
    let mut command = String::new();

    if let Some(first) = argv.first() {
        if !first.starts_with('-') {
            command = argv.remove(0);
        }
    }

    if command.is_empty() {
        command = "balances".to_string();
    }

    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" => {
                if let Some(value) = iter.next() {
                    if value == "json" {
                        format = OutputFormat::Json;
                    } else if value == "text" {
                        format = OutputFormat::Text;
                    }
                }
            }
            "--json" => format = OutputFormat::Json,
            "--pretty" => pretty = true,
            "--ping" => include_ping = true,
            "--help" | "-h" | "--version" | "-V" => {
                command = arg;
                break;
            }
            _ => {}
        }
    }

    CliArgs {
        command,
        format,
        pretty,
        include_ping,
    }
}

fn render_balances_text(records: &[AggregatedRecord]) -> String {
    if records.is_empty() {
        return "No API keys configured.".to_string();
    }

    let sections: Vec<String> = records
        .iter()
        .map(|record| {
            let display = &record.display;
            let mut lines = Vec::new();
            lines.push(format!("== {} ({}) ==", display.service, display.kind));
            lines.push(format!("Status: {}", display.status));
            lines.push(format!(
                "Balance: {} (granted {}, topped up {})",
                display.total_balance, display.granted, display.topped_up
            ));
            lines.push(format!("Ping: {}", display.ping_test));
            lines.push(format!("Last check: {}", display.last_check));
            if let Some(note) = record.internals.note.as_ref() {
                lines.push(format!("Note: {}", note));
            }
            if let Some(url) = record.internals.dashboard_url.as_ref() {
                lines.push(format!("Dashboard: {}", url));
            }
            if let Some(error) = display.error.as_ref().filter(|value| !value.is_empty()) {
                lines.push(format!("Error: {}", error));
            }
            lines.join("\n")
        })
        .collect();

    sections.join("\n\n")
}

fn render_ping_text(report: &PingReport) -> String {
    let mut lines: Vec<String> = report.results.iter().map(render_ping_line).collect();
    lines.push(String::new());
    lines.push(format!(
        "Tested {} of {} in {:.2}s",
        report.tested,
        report.results.len(),
        report.total_seconds
    ));
    lines.join("\n")
}

fn render_ping_line(ping: &PingResult) -> String {
    let detail = match ping.status {
        PingStatus::Success => ping
            .response_text
            .as_deref()
            .map(|text| format!(" \"{}\"", text))
            .unwrap_or_default(),
        _ => ping
            .error
            .as_deref()
            .map(|error| format!(" - {}", error))
            .unwrap_or_default(),
    };
    format!(
        "{}: {}{}",
        ping.service,
        apiwatch::monitor::ping_display(ping.status, ping.time_seconds),
        detail
    )
}

fn render_stats_text(stats: &StatsSummary) -> String {
    let mut lines = Vec::new();
    for family in ProviderFamily::all().into_iter().map(|family| stats.family(family)) {
        lines.push(format!(
            "{} {}: {} active / {} configured / {} slots",
            if family.is_active() { "🟢" } else { "🔴" },
            family.family.label(),
            family.active_keys,
            family.configured_keys,
            family.total_keys
        ));
        if let Some(balance) = family.balance {
            lines.push(format!(
                "  Total ${:.2} · Average ${:.2} · Lowest ${:.2}",
                balance.total_balance, balance.average_balance, balance.lowest_balance
            ));
        }
    }
    lines.push(format!(
        "Overall: {} active / {} configured / {} APIs",
        stats.overall.active_apis, stats.overall.configured_apis, stats.overall.total_apis
    ));
    lines.join("\n")
}

fn print_json<T: Serialize>(payload: &T, pretty: bool) -> Result<(), ErrorBanner> {
    let output = if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    }
    .map_err(|err| ErrorBanner::new(err.to_string()))?;
    println!("{output}");
    Ok(())
}

fn print_help() {
    println!(
        "apiwatch {}\n\nUsage:\n  apiwatch balances [--ping] [--format text|json] [--pretty]\n  apiwatch ping [--format text|json] [--pretty]\n  apiwatch stats [--format text|json] [--pretty]\n\nCommands:\n  balances  Print balance and key status for every configured slot (default)\n  ping      Send a tiny completion to every configured key\n  stats     Print balance totals and active key counts\n\nFlags:\n  --format <text|json>  Output format\n  --json               Shortcut for --format json\n  --pretty             Pretty-print JSON output\n  --ping               Include ping results in the balance view\n  -h, --help           Show help\n  -V, --version        Show version\n\nEnvironment:\n  DEEPSEEK_API_KEY_1..3, GEMINI_API_KEY (also read from .env)",
        env!("CARGO_PKG_VERSION")
    );
}
