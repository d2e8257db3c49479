use std::error::Error;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::thread;

use clap::{Parser, ValueEnum};
use env_logger::Env;
use tokio::signal::unix::{SignalKind, signal};
use xvc_server::{
    Shutdown,
    server::{Config, Server},
};
use xvc_server_gpio::{
    backends::loopback::LoopbackLines,
    engine::{BitBang, DEFAULT_DELAY},
    lines::{JtagLines, LinePins},
};

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
enum Backend {
    /// GPIO header of a Raspberry Pi
    Rpi,
    /// Software target with TDO wired to TDI
    Loopback,
}

#[derive(Parser)]
#[command(about = "Xilinx Virtual Cable (XVC) server bit-banging JTAG over GPIO", long_about = None)]
struct Args {
    #[arg(short, long, action = clap::ArgAction::Count, help = "Log more (-v debug, -vv trace)")]
    verbose: u8,

    #[arg(
        short,
        long,
        default_value_t = DEFAULT_DELAY,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Spin iterations after every line write"
    )]
    delay: u32,

    #[arg(short, long, default_value = "2542")]
    port: u16,

    #[arg(short, long, default_value = "0.0.0.0")]
    ip: IpAddr,

    #[arg(long, default_value_t = LinePins::default().tck, help = "GPIO of TCK")]
    tck: u8,

    #[arg(long, default_value_t = LinePins::default().tms, help = "GPIO of TMS")]
    tms: u8,

    #[arg(long, default_value_t = LinePins::default().tdi, help = "GPIO of TDI")]
    tdi: u8,

    #[arg(long, default_value_t = LinePins::default().tdo, help = "GPIO of TDO")]
    tdo: u8,

    #[arg(short, long, value_enum, default_value_t = Backend::Rpi)]
    backend: Backend,
}

impl Args {
    fn pins(&self) -> LinePins {
        LinePins {
            tck: self.tck,
            tms: self.tms,
            tdi: self.tdi,
            tdo: self.tdo,
        }
    }
}

/// Sets `shutdown` on SIGINT or SIGTERM.
///
/// The handlers are registered before this returns, the wait happens on a helper thread.
fn watch_signals(shutdown: Shutdown) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let (mut interrupt, mut terminate) = runtime.block_on(async {
        io::Result::Ok((
            signal(SignalKind::interrupt())?,
            signal(SignalKind::terminate())?,
        ))
    })?;
    thread::Builder::new()
        .name("xvc-signals".to_string())
        .spawn(move || {
            let name = runtime.block_on(async {
                tokio::select! {
                    _ = interrupt.recv() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                }
            });
            log::info!("Received {}, shutting down...", name);
            shutdown.request();
        })?;
    Ok(())
}

/// Serves until shutdown, then releases the lines.
fn run<L: JtagLines>(
    lines: L,
    delay: u32,
    addr: SocketAddr,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn Error>> {
    let config = Config::default();
    log::debug!(
        "Server config: max_vector_size={}, poll_interval={:?}",
        config.max_vector_size,
        config.poll_interval
    );
    let mut server = Server::new(BitBang::new(lines, delay), config);
    log::info!("Binding to address: {}", addr);
    let result = server.listen(addr, shutdown);
    drop(server.into_backend().into_lines());
    log::info!("JTAG lines released");
    Ok(result?)
}

#[cfg(target_os = "linux")]
fn serve_rpi(
    pins: &LinePins,
    delay: u32,
    addr: SocketAddr,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn Error>> {
    use xvc_server_gpio::backends::rpi::RpiLines;

    let lines = RpiLines::acquire(pins).inspect_err(|e| {
        log::error!("Failed to acquire GPIO lines {}: {}", pins, e);
    })?;
    watch_signals(shutdown.clone())?;
    run(lines, delay, addr, shutdown)
}

#[cfg(not(target_os = "linux"))]
fn serve_rpi(
    _pins: &LinePins,
    _delay: u32,
    _addr: SocketAddr,
    _shutdown: &Shutdown,
) -> Result<(), Box<dyn Error>> {
    Err(xvc_server_gpio::lines::LineError::Unsupported.into())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter)).init();
    log::info!("Starting XVC GPIO server");
    log::debug!("jtag_delay={}", args.delay);

    let pins = args.pins();
    let addr = SocketAddr::new(args.ip, args.port);
    let shutdown = Shutdown::new();

    match args.backend {
        Backend::Rpi => serve_rpi(&pins, args.delay, addr, &shutdown),
        Backend::Loopback => {
            log::info!("Using loopback lines, no hardware is driven");
            watch_signals(shutdown.clone())?;
            run(LoopbackLines::new(), args.delay, addr, &shutdown)
        }
    }
}
