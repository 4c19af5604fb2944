use clap::{Parser, Subcommand};
use libconnectbox::config::{Config, Target};
use libconnectbox::protocol::DEFAULT_USERNAME;
use libconnectbox::{ConnectBox, LanUserTable, Record, State, SystemInfo};
use log::{debug, info, warn, LevelFilter};
use std::{path::PathBuf, time::Duration};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG: &str = "./config.yaml";

#[derive(Parser, Debug)]
#[command(author = "connectbox", version = "0.1", about = "Read telemetry from a Connect Box router", long_about = None)]
struct Args {
    /// Path to the configuration file (default: ./config.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address of a single Connect Box, instead of the configured targets
    #[arg(short, long)]
    addr: Option<String>,

    /// Connect Box user (default: NULL)
    #[arg(long)]
    username: Option<String>,

    /// Password of the Connect Box user (prompted if omitted)
    #[arg(short, long)]
    password: Option<String>,

    /// Time budget per target in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// More log output, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cable modem system information
    Info,
    /// Cable modem state: temperatures, WAN addresses
    State,
    /// Wired and wireless LAN clients
    Clients,
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn get_password(arg_password: &Option<String>) -> Result<String, std::io::Error> {
    match arg_password {
        Some(password) => Ok(password.to_string()),
        None => rpassword::prompt_password("Your password: "),
    }
}

fn get_targets(args: &Args) -> Result<(Vec<Target>, Duration), Box<dyn std::error::Error>> {
    if let Some(addr) = &args.addr {
        let target = Target {
            addr: addr.clone(),
            username: args
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: get_password(&args.password)?,
        };
        let timeout = Duration::from_secs(args.timeout.unwrap_or(30));

        return Ok((vec![target], timeout));
    }

    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    info!("Reading configuration from {}...", path.display());
    let config = Config::read(&path)?;
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.timeout());

    Ok((config.targets, timeout))
}

/// Context cancelled once `timeout` has passed.
fn deadline(timeout: Duration) -> CancellationToken {
    let ctx = CancellationToken::new();
    let timer = ctx.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => timer.cancel(),
        }
    });

    ctx
}

fn print_system_info(info: &SystemInfo) {
    println!("| {0: <16} | {1: <24} |", "DOCSIS mode", info.docsis_mode);
    println!("| {0: <16} | {1: <24} |", "Hardware", info.hardware_version);
    println!("| {0: <16} | {1: <24} |", "MAC address", info.mac_addr);
    println!("| {0: <16} | {1: <24} |", "Serial number", info.serial_number);
    println!("| {0: <16} | {1: <24} |", "Uptime (s)", info.uptime);
    println!("| {0: <16} | {1: <24} |", "Network access", info.network_access);
}

fn print_state(state: &State) {
    println!("| {0: <16} | {1: <24} |", "Tuner (°C)", state.tuner_temperature);
    println!("| {0: <16} | {1: <24} |", "Board (°C)", state.temperature);
    println!("| {0: <16} | {1: <24} |", "Oper state", state.oper_state);
    println!("| {0: <16} | {1: <24} |", "WAN IPv4", state.wan_ipv4_addr);
    for addr in &state.wan_ipv6_addrs {
        println!("| {0: <16} | {1: <24} |", "WAN IPv6", addr);
    }
}

fn print_lan_users(table: &LanUserTable) {
    println!(
        "| {0: <8} | {1: <12} | {2: <18} | {3: <18} | {4: <20} |",
        "Link", "Interface", "IPv4", "MAC", "Hostname"
    );
    println!("+----------+--------------+--------------------+--------------------+----------------------+");
    for (connection, client) in table.clients() {
        println!(
            "| {0: <8} | {1: <12} | {2: <18} | {3: <18} | {4: <20} |",
            connection.as_str(),
            client.interface,
            client.ipv4_addr,
            client.mac_addr,
            client.hostname
        );
    }
}

async fn fetch_one<R: Record>(
    connectbox: &mut ConnectBox,
    ctx: &CancellationToken,
    print: fn(&R),
) -> Result<(), Box<dyn std::error::Error>> {
    connectbox.login(ctx).await?;
    let result = connectbox.fetch::<R>(ctx).await;

    connectbox.release().await;

    print(&result?);

    Ok(())
}

async fn poll_all(
    connectbox: &mut ConnectBox,
    ctx: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = connectbox.poll(ctx).await?;

    if let Ok(state) = &snapshot.state {
        print_state(state);
    }
    if let Ok(info) = &snapshot.system_info {
        print_system_info(info);
    }
    if let Ok(table) = &snapshot.lan_users {
        print_lan_users(table);
    }

    Ok(())
}

async fn run_target(
    target: &Target,
    timeout: Duration,
    command: &Option<Commands>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut connectbox = ConnectBox::new(&target.addr, &target.username, &target.password)?;
    let ctx = deadline(timeout);

    println!("{}", connectbox.address());
    let result = match command {
        Some(Commands::Info) => {
            fetch_one::<SystemInfo>(&mut connectbox, &ctx, print_system_info).await
        }
        Some(Commands::State) => fetch_one::<State>(&mut connectbox, &ctx, print_state).await,
        Some(Commands::Clients) => {
            fetch_one::<LanUserTable>(&mut connectbox, &ctx, print_lan_users).await
        }
        None => poll_all(&mut connectbox, &ctx).await,
    };
    ctx.cancel();

    result
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    simple_logger::SimpleLogger::new()
        .with_level(log_level(args.verbose))
        .init()
        .map_err(|e| e.to_string())?;

    let (targets, timeout) = get_targets(&args)?;
    debug!("{} target(s), timeout {:?}", targets.len(), timeout);

    let mut failed = 0;
    for target in &targets {
        if let Err(err) = run_target(target, timeout, &args.command).await {
            warn!("{}: {}", target.addr, err);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} target(s) failed", failed, targets.len()).into());
    }

    Ok(())
}
