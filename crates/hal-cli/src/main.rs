use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hal_core::{Module, ModuleConfig, ModuleKind, OpenStreamArgs};
use hal_graph::{
    resolve_default, AudioPatch, AudioPort, AudioPortConfig, AudioRoute, Configuration,
    DevicePortExt, Direction, PortExt, PortId,
};
use hal_rt::{Command, Reply};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Dump(args) => execute_dump(args),
        Commands::Connect(args) => execute_connect(args),
        Commands::Demo(args) => execute_demo(args),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Inspect and exercise simulated audio HAL modules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the ports, routes and port configs of a module as JSON.
    Dump(DumpArgs),
    /// Connect an external device and print the resulting port and routes.
    Connect(ConnectArgs),
    /// Run a short capture session and print every reply.
    Demo(DemoArgs),
}

#[derive(Args)]
struct ModuleArgs {
    /// Module variant (default, r_submix, stub, usb, bluetooth).
    #[arg(long)]
    variant: Option<ModuleKind>,
    /// Module settings (JSON). The variant flag overrides its kind.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Replacement configuration table (JSON).
    #[arg(long)]
    table: Option<PathBuf>,
}

#[derive(Args)]
struct DumpArgs {
    #[command(flatten)]
    module: ModuleArgs,
}

#[derive(Args)]
struct ConnectArgs {
    #[command(flatten)]
    module: ModuleArgs,
    /// Id of the template device port.
    #[arg(long)]
    port: PortId,
    /// Device address, for example `card=1;device=0` for USB.
    #[arg(long, default_value = "")]
    address: String,
}

#[derive(Args)]
struct DemoArgs {
    #[command(flatten)]
    module: ModuleArgs,
    /// Number of bursts to request after starting the stream.
    #[arg(long, default_value_t = 4)]
    bursts: u32,
    /// Stream buffer size in frames. Raised to the patch minimum if smaller.
    #[arg(long, default_value_t = 480)]
    frames: i64,
}

fn build_module(args: &ModuleArgs) -> Result<Module> {
    let mut config = match &args.config {
        Some(path) => ModuleConfig::from_json_file(path)
            .with_context(|| format!("failed to load module config {}", path.display()))?,
        None => ModuleConfig::default(),
    };
    if let Some(kind) = args.variant {
        config = config.with_kind(kind);
    }
    debug!(kind = %config.kind, "creating module");
    let module = Module::from_config(config);
    Ok(match &args.table {
        Some(path) => {
            let table = Configuration::from_json_file(path)
                .with_context(|| format!("failed to load configuration table {}", path.display()))?;
            module.with_configuration(table)
        }
        None => module,
    })
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct ModuleDump {
    kind: ModuleKind,
    ports: Vec<AudioPort>,
    routes: Vec<AudioRoute>,
    port_configs: Vec<AudioPortConfig>,
}

fn execute_dump(args: DumpArgs) -> Result<()> {
    let module = build_module(&args.module)?;
    print_json(&ModuleDump {
        kind: module.kind(),
        ports: module.audio_ports(),
        routes: module.audio_routes(),
        port_configs: module.audio_port_configs(),
    })
}

#[derive(Serialize)]
struct ConnectReport {
    port: AudioPort,
    routes: Vec<AudioRoute>,
}

/// Copies the template device port and stamps `address` on it.
fn device_request(module: &Module, template_id: PortId, address: &str) -> Result<AudioPort> {
    let mut request = module
        .audio_port(template_id)
        .with_context(|| format!("no port with id {template_id}"))?;
    match &mut request.ext {
        PortExt::Device(DevicePortExt { device, .. }) => device.address = address.to_owned(),
        PortExt::Unspecified | PortExt::Mix(_) => {
            bail!("port {template_id} is not a device port")
        }
    }
    Ok(request)
}

fn execute_connect(args: ConnectArgs) -> Result<()> {
    let module = build_module(&args.module)?;
    let request = device_request(&module, args.port, &args.address)?;
    let port = module
        .connect_external_device(&request)
        .with_context(|| format!("failed to connect '{}'", request.name))?;
    info!(port = port.id, template = args.port, "device connected");
    let routes = module.audio_routes_for_port(port.id)?;
    print_json(&ConnectReport { port, routes })
}

#[derive(Serialize)]
struct DemoStep {
    command: &'static str,
    reply: Reply,
    bytes_read: usize,
}

/// Picks the first input mix port that some device can be routed into.
fn capture_endpoints(module: &Module) -> Result<(AudioPort, AudioPort)> {
    let ports = module.audio_ports();
    for mix in ports
        .iter()
        .filter(|port| port.is_mix() && port.direction() == Direction::Input)
    {
        let routes = module.audio_routes_for_port(mix.id)?;
        let device = routes
            .iter()
            .filter(|route| route.sink_port_id == mix.id)
            .flat_map(|route| route.source_port_ids.iter())
            .find_map(|id| ports.iter().find(|port| port.id == *id && port.is_device()));
        if let Some(device) = device {
            return Ok((mix.clone(), device.clone()));
        }
    }
    Err(anyhow!("module has no routable input mix port"))
}

fn port_config_for(module: &Module, port: &AudioPort) -> Result<AudioPortConfig> {
    if let Some(existing) = module
        .audio_port_configs()
        .into_iter()
        .find(|config| config.port_id == port.id)
    {
        return Ok(existing);
    }
    let requested = resolve_default(port)
        .with_context(|| format!("port '{}' has no usable profile", port.name))?;
    let outcome = module.set_audio_port_config(&requested)?;
    if !outcome.applied {
        bail!("port '{}' rejected its default config", port.name);
    }
    Ok(outcome.suggested)
}

fn execute_demo(args: DemoArgs) -> Result<()> {
    let module = build_module(&args.module)?;
    let (mix, device) = capture_endpoints(&module)?;
    let mix_config = port_config_for(&module, &mix)?;
    let device_config = port_config_for(&module, &device)?;
    let patch = module
        .set_audio_patch(&AudioPatch::new(&[device_config.id], &[mix_config.id]))
        .with_context(|| format!("failed to patch '{}' to '{}'", device.name, mix.name))?;
    info!(
        patch = patch.id,
        device = %device.name,
        mix = %mix.name,
        "capture patch created"
    );

    let frames = args
        .frames
        .max(i64::from(patch.minimum_stream_buffer_size_frames));
    let stream = module
        .open_input_stream(OpenStreamArgs::new(mix_config.id, frames))
        .context("failed to open capture stream")?;
    let mut descriptor = stream
        .descriptor()
        .ok_or_else(|| anyhow!("stream descriptor already taken"))?;
    let burst_bytes = i32::try_from(descriptor.buffer_size_bytes())
        .context("stream buffer does not fit a burst request")?;

    let mut commands = vec![Command::Start];
    commands.extend((0..args.bursts).map(|_| Command::Burst(burst_bytes)));
    commands.push(Command::Pause);
    commands.push(Command::Flush);

    let mut steps = Vec::with_capacity(commands.len());
    for command in commands {
        let reply = descriptor
            .send(command)
            .with_context(|| format!("stream worker did not answer {}", command.name()))?;
        let mut bytes_read = 0;
        if let Some(reader) = descriptor.capture_data() {
            let mut sink = vec![0; reader.available_to_read()];
            if reader.read(&mut sink) {
                bytes_read = sink.len();
            }
        }
        steps.push(DemoStep {
            command: command.name(),
            reply,
            bytes_read,
        });
    }

    let frame_count = stream.frame_count();
    stream.close()?;
    module.reset_audio_patch(patch.id)?;
    info!(frames = frame_count, "capture demo finished");
    print_json(&steps)
}
