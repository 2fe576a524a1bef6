use clap::{Args, Parser, Subcommand, ValueEnum};
use serial_overlapped::config::{Config, ConfigLoader};
use serial_overlapped::rfc2217::{
    encode, BaudrateControlCmd, ControlCmd, DataSizeControlCmd, ParityControlCmd, Rfc2217Port,
    SignatureControlCmd, StopSizeControlCmd,
};
use serial_overlapped::settings::{DataBits, FlowControl, Parity, SerialPortSettings, StopBits};
use serial_overlapped::{logging, Dcb};
use std::error::Error;
use std::path::PathBuf;
use tracing::debug;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-overlapped",
    version,
    about = "Overlapped serial I/O engine tools.",
    long_about = "Inspect the device control block a set of line settings maps to, frame RFC 2217 control commands, and write to a COM port through the bounded overlapped engine."
)]
struct Cli {
    /// Configuration file to use instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the device control block for the line settings as JSON.
    Dcb(LineArgs),

    /// Print an RFC 2217 control frame in hex.
    Encode {
        #[command(subcommand)]
        frame: FrameArgs,
    },

    /// Print the RFC 2217 frames a client sends to an access server.
    Negotiate {
        /// Access server host.
        host: String,
        /// Access server port.
        #[arg(default_value_t = 2217)]
        port: u16,
        #[command(flatten)]
        line: LineArgs,
    },

    /// Write hex-encoded bytes to a COM port (Windows only).
    Write {
        /// Port name or configured alias, e.g. COM3.
        port: String,
        /// Payload as hex, e.g. "48656c6c6f".
        data: String,
        #[command(flatten)]
        line: LineArgs,
    },
}

#[derive(Subcommand, Debug)]
enum FrameArgs {
    /// SIGNATURE request; defaults to the configured signature.
    Signature { text: Option<String> },
    /// SET-BAUDRATE request.
    Baudrate { bauds: u32 },
    /// SET-DATASIZE request.
    Datasize {
        #[arg(value_enum)]
        bits: DataBitsArg,
    },
    /// SET-PARITY request.
    Parity {
        #[arg(value_enum)]
        parity: ParityArg,
    },
    /// SET-STOPSIZE request.
    Stopsize {
        #[arg(value_enum)]
        stop_bits: StopBitsArg,
    },
}

/// Line settings overriding the configured defaults.
#[derive(Args, Debug)]
struct LineArgs {
    #[arg(long)]
    bauds: Option<u32>,
    #[arg(long, value_enum)]
    data_bits: Option<DataBitsArg>,
    #[arg(long, value_enum)]
    parity: Option<ParityArg>,
    #[arg(long, value_enum)]
    stop_bits: Option<StopBitsArg>,
    #[arg(long, value_enum)]
    flow_control: Option<FlowControlArg>,
}

impl LineArgs {
    fn apply(&self, base: SerialPortSettings) -> serial_overlapped::Result<SerialPortSettings> {
        let mut builder = base.to_builder();
        if let Some(bauds) = self.bauds {
            builder = builder.bauds(bauds);
        }
        if let Some(bits) = self.data_bits {
            builder = builder.data_bits(bits.into());
        }
        if let Some(parity) = self.parity {
            builder = builder.parity(parity.into());
        }
        if let Some(stop_bits) = self.stop_bits {
            builder = builder.stop_bits(stop_bits.into());
        }
        if let Some(flow) = self.flow_control {
            builder = builder.flow_control(flow.into());
        }
        builder.build()
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DataBitsArg {
    #[value(name = "5")]
    Five,
    #[value(name = "6")]
    Six,
    #[value(name = "7")]
    Seven,
    #[value(name = "8")]
    Eight,
    #[value(name = "9")]
    Nine,
}

impl From<DataBitsArg> for DataBits {
    fn from(arg: DataBitsArg) -> Self {
        match arg {
            DataBitsArg::Five => DataBits::Five,
            DataBitsArg::Six => DataBits::Six,
            DataBitsArg::Seven => DataBits::Seven,
            DataBitsArg::Eight => DataBits::Eight,
            DataBitsArg::Nine => DataBits::Nine,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ParityArg {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
            ParityArg::Mark => Parity::Mark,
            ParityArg::Space => Parity::Space,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum StopBitsArg {
    #[value(name = "1")]
    One,
    #[value(name = "1.5")]
    OnePointFive,
    #[value(name = "2")]
    Two,
}

impl From<StopBitsArg> for StopBits {
    fn from(arg: StopBitsArg) -> Self {
        match arg {
            StopBitsArg::One => StopBits::One,
            StopBitsArg::OnePointFive => StopBits::OnePointFive,
            StopBitsArg::Two => StopBits::Two,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FlowControlArg {
    None,
    RtsCtsIn,
    RtsCtsOut,
    RtsCtsInOut,
    XonXoffIn,
    XonXoffOut,
    XonXoffInOut,
}

impl From<FlowControlArg> for FlowControl {
    fn from(arg: FlowControlArg) -> Self {
        match arg {
            FlowControlArg::None => FlowControl::None,
            FlowControlArg::RtsCtsIn => FlowControl::RtsCtsIn,
            FlowControlArg::RtsCtsOut => FlowControl::RtsCtsOut,
            FlowControlArg::RtsCtsInOut => FlowControl::RtsCtsInOut,
            FlowControlArg::XonXoffIn => FlowControl::XonXoffIn,
            FlowControlArg::XonXoffOut => FlowControl::XonXoffOut,
            FlowControlArg::XonXoffInOut => FlowControl::XonXoffInOut,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    logging::init(&loader.config().logging);
    if let Some(path) = &loader.config_path {
        debug!("Using configuration {}", path.display());
    }
    let config = loader.into_config();

    match cli.command {
        Command::Dcb(line) => {
            let settings = line.apply(config.serial.settings)?;
            let dcb = Dcb::from_settings(&settings);
            println!("{}", serde_json::to_string_pretty(&dcb)?);
        }
        Command::Encode { frame } => {
            let frame = encode_frame(frame, &config)?;
            println!("{}", to_hex(&frame));
        }
        Command::Negotiate { host, port, line } => {
            let settings = line.apply(config.serial.settings)?;
            let server = Rfc2217Port::new(host, port)?;
            println!("{}", server.port_name());
            for frame in server.negotiation_frames(&config.rfc2217.signature, &settings)? {
                println!("{}", to_hex(&frame));
            }
        }
        Command::Write { port, data, line } => {
            let settings = line.apply(config.serial.settings)?;
            let port = config.serial.resolve_port(&port);
            let data = parse_hex(&data)?;
            write_port(port, data, settings)?;
        }
    }

    Ok(())
}

fn encode_frame(frame: FrameArgs, config: &Config) -> Result<Vec<u8>, Box<dyn Error>> {
    let cmd: Box<dyn ControlCmd> = match frame {
        FrameArgs::Signature { text } => Box::new(SignatureControlCmd::new(
            text.unwrap_or_else(|| config.rfc2217.signature.clone()),
        )),
        FrameArgs::Baudrate { bauds } => Box::new(BaudrateControlCmd::new(bauds)),
        FrameArgs::Datasize { bits } => Box::new(DataSizeControlCmd::new(bits.into())?),
        FrameArgs::Parity { parity } => Box::new(ParityControlCmd::new(parity.into())),
        FrameArgs::Stopsize { stop_bits } => Box::new(StopSizeControlCmd::new(stop_bits.into())),
    };
    Ok(encode(Some(&*cmd))?)
}

#[cfg(windows)]
fn write_port(
    port: String,
    data: Vec<u8>,
    settings: SerialPortSettings,
) -> Result<(), Box<dyn Error>> {
    use serial_overlapped::{spawn_blocking, SerialConnection, Win32DeviceApi};

    let future = spawn_blocking("serial-write", move || {
        let api = Win32DeviceApi::new();
        let handle = api.open(&port, &settings)?;
        let connection = SerialConnection::new(port, api, handle)?;
        connection.write(&data)?;
        connection.close()?;
        Ok(data.len())
    })?;

    let written = future.get()?;
    println!("{} bytes written", written);
    Ok(())
}

#[cfg(not(windows))]
fn write_port(
    port: String,
    _data: Vec<u8>,
    _settings: SerialPortSettings,
) -> Result<(), Box<dyn Error>> {
    Err(format!("Writing to {} requires Windows overlapped I/O", port).into())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits in '{}'", text));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16).map_err(|_| format!("Invalid hex byte '{}'", byte))
        })
        .collect()
}
