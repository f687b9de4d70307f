use clap::{CommandFactory, Parser};
use color_eyre::eyre::bail;
use comfy_table::{Attribute, Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use owo_colors::OwoColorize;
use runloop::cache;
use runloop::cli::{CacheAction, Cli, Command};
use runloop::config::{self, Settings};
use runloop::devices::{self, Device, DeviceKind, FormatKind};
use runloop::launch::{self, LaunchOptions};
use runloop::paths::Paths;
use runloop::ps::{ProcessRecord, ToolMatcher};
use runloop::supervisor::{KillReport, SignalPolicy, Supervisor};
use runloop::sys::CommandRunner;
use runloop::terminate::{KillSignal, Terminator};
use runloop::toolchain::ToolchainVersion;
use serde_json::json;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    runloop::telemetry::init_tracing(&cli.log_level);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let paths = Paths::new()?;
    let settings = config::load_settings(&paths.config_file())?;

    match command {
        Command::Running => {
            let running = supervisor(&settings).is_running()?;
            if cli.json {
                println!("{}", json!({ "running": running }));
            } else if running {
                println!("{}", "instruments is running".green());
            } else {
                println!("{}", "instruments is not running".yellow());
            }
        }
        Command::Pids => {
            let processes = supervisor(&settings).processes()?;
            if cli.json {
                println!("{}", serde_json::to_string(&processes)?);
            } else {
                print_processes(&processes);
            }
        }
        Command::Kill { signal, toolchain } => {
            let policy = match signal {
                Some(name) => SignalPolicy::new(name.parse::<KillSignal>()?),
                None => match resolve_toolchain(toolchain.as_deref(), &settings)? {
                    Some(version) => SignalPolicy::for_toolchain(&version),
                    None => {
                        tracing::warn!("toolchain version unknown, using TERM");
                        SignalPolicy::default()
                    }
                },
            };
            let report = supervisor(&settings).kill_all(policy)?;
            if cli.json {
                print_report_json(&report);
            } else {
                print_report(&report);
            }
            if !report.is_clean() {
                bail!("{} process(es) could not be terminated", report.failed.len());
            }
        }
        Command::Devices {
            physical,
            format,
            toolchain,
        } => {
            let format = match format {
                Some(name) => name.parse::<FormatKind>()?,
                None => {
                    let Some(version) = resolve_toolchain(toolchain.as_deref(), &settings)? else {
                        bail!("could not determine toolchain version; pass --toolchain or --format");
                    };
                    FormatKind::for_toolchain(&version)?
                }
            };
            let kind = if physical {
                DeviceKind::Physical
            } else {
                DeviceKind::Simulator
            };
            let devices = devices::list_devices(&CommandRunner, format, kind)?;
            if cli.json {
                println!("{}", serde_json::to_string(&devices)?);
            } else {
                print_devices(&devices);
            }
        }
        Command::Launch {
            device,
            template,
            trace_dir,
            env,
            args,
            log_file,
            bundle,
        } => {
            let env = env
                .iter()
                .map(|pair| launch::parse_env_pair(pair))
                .collect::<Result<Vec<_>, _>>()?;
            let extra_args = args
                .as_deref()
                .map(launch::parse_extra_args)
                .transpose()?
                .unwrap_or_default();
            let options = LaunchOptions {
                launcher: settings.launcher().to_string(),
                device,
                trace_dir,
                template,
                bundle,
                env,
                extra_args,
                log_file: log_file.unwrap_or_else(|| paths.tool_log()),
            };
            let pid = launch::spawn_detached(&options)?;
            if cli.json {
                println!(
                    "{}",
                    json!({ "pid": pid, "log_file": options.log_file.display().to_string() })
                );
            } else {
                println!("{} {pid}", "launched:".green());
                println!("  {} {}", "log:".dimmed(), options.log_file.display());
            }
        }
        Command::Cache { action } => {
            let cache = cache::default_cache()?;
            match action {
                CacheAction::Path => println!("{}", cache.path().display()),
                CacheAction::Show => {
                    let map = cache.read()?;
                    if cli.json {
                        println!("{}", serde_json::to_string(&map)?);
                    } else {
                        println!("{}", serde_json::to_string_pretty(&map)?);
                    }
                }
                CacheAction::Clear => {
                    cache.clear()?;
                    if cli.json {
                        println!("{}", json!({ "cleared": true }));
                    } else {
                        println!("{}", "cache cleared".green());
                    }
                }
            }
        }
    }

    Ok(())
}

fn supervisor(settings: &Settings) -> Supervisor {
    let terminator = Terminator::default().with_budget(
        settings.terminate.attempts,
        settings.terminate.interval(),
    );
    Supervisor::new(CommandRunner, ToolMatcher::default(), terminator)
}

/// Command line first, then the settings file, then `xcodebuild`.
fn resolve_toolchain(
    flag: Option<&str>,
    settings: &Settings,
) -> color_eyre::Result<Option<ToolchainVersion>> {
    if let Some(version) = flag {
        return Ok(Some(version.parse()?));
    }
    if let Some(version) = settings.toolchain_version()? {
        return Ok(Some(version));
    }
    match ToolchainVersion::detect(&CommandRunner) {
        Ok(version) => Ok(Some(version)),
        Err(e) => {
            tracing::debug!(error = %e, "toolchain detection failed");
            Ok(None)
        }
    }
}

fn print_processes(processes: &[ProcessRecord]) {
    if processes.is_empty() {
        println!("{}", "no instruments processes".yellow());
        return;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("pid").add_attribute(Attribute::Bold),
        Cell::new("command").add_attribute(Attribute::Bold),
    ]);
    for p in processes {
        table.add_row(vec![
            Cell::new(p.pid).fg(Color::Cyan),
            Cell::new(&p.command_line),
        ]);
    }
    println!("{table}");
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("{}", "no devices found".yellow());
        return;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("name").add_attribute(Attribute::Bold),
        Cell::new("version").add_attribute(Attribute::Bold),
        Cell::new("identifier").add_attribute(Attribute::Bold),
    ]);
    for d in devices {
        table.add_row(vec![
            Cell::new(&d.name).fg(Color::Cyan),
            Cell::new(&d.os_version),
            Cell::new(&d.identifier).fg(Color::Magenta),
        ]);
    }
    println!("{table}");
}

fn print_report(report: &KillReport) {
    if report.terminated.is_empty() && report.failed.is_empty() {
        println!("{}", "no instruments processes".yellow());
        return;
    }
    for (pid, signal) in &report.terminated {
        println!("{} {pid} ({signal})", "terminated:".green());
    }
    for (pid, error) in &report.failed {
        eprintln!("{} {pid}: {error}", "error:".red().bold());
    }
}

fn print_report_json(report: &KillReport) {
    let terminated: Vec<_> = report
        .terminated
        .iter()
        .map(|(pid, signal)| json!({ "pid": pid, "signal": signal.to_string() }))
        .collect();
    let failed: Vec<_> = report
        .failed
        .iter()
        .map(|(pid, error)| json!({ "pid": pid, "error": error.to_string() }))
        .collect();
    println!("{}", json!({ "terminated": terminated, "failed": failed }));
}
