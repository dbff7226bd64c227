use clap::{Args, Parser, Subcommand};
use efc::cli::{
    decode_command, encode_command, list_ciphers, show_info, DecodeOptions, EncodeOptions,
    InfoOptions, KeySource,
};
use efc::header::{CipherKind, CompressionKind, DEFAULT_COMPRESSION};
use efc::pipeline::DEFAULT_LEVEL;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Version info from build.rs
const VERSION: &str = env!("EFC_VERSION");
const BUILD: &str = env!("EFC_BUILD");
const PROFILE: &str = env!("EFC_PROFILE");
const GIT_HASH: &str = env!("EFC_GIT_HASH");

fn get_version() -> &'static str {
    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} {} build {} ({})", PROFILE, VERSION, BUILD, GIT_HASH))
}

#[derive(Parser)]
#[command(name = "efc")]
#[command(author, about = "Encrypted file container", long_about = None)]
struct Cli {
    /// Print version
    #[arg(short = 'V', long)]
    version: bool,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Exactly one key source
#[derive(Args)]
#[group(required = true, multiple = false)]
struct KeyArgs {
    /// Password to hash into a key ("-" reads it from stdin)
    #[arg(short, long)]
    password: Option<String>,

    /// File whose first 32 bytes are the key
    #[arg(short, long)]
    keyfile: Option<PathBuf>,

    /// File whose SHA-256 digest is the key
    #[arg(long)]
    hash_keyfile: Option<PathBuf>,

    /// Key as 64 hex digits
    #[arg(long, value_parser = parse_hex_key)]
    key_hex: Option<HexKey>,
}

impl KeyArgs {
    fn into_source(self) -> efc::Result<KeySource> {
        KeySource::from_flags(
            self.password,
            self.keyfile,
            self.hash_keyfile,
            self.key_hex.map(|k| k.0),
        )
    }
}

#[derive(Clone)]
struct HexKey(Vec<u8>);

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file into an EFC container
    #[command(alias = "e")]
    Encode {
        /// File to encode
        input: PathBuf,

        /// Container path (default: input with .efc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        key: KeyArgs,

        /// Cipher to encrypt with
        #[arg(long, default_value = "aes256cfb", value_parser = parse_cipher)]
        cipher: CipherKind,

        /// Store the data without zlib compression
        #[arg(long)]
        no_compress: bool,

        /// zlib compression level (0-9)
        #[arg(long, default_value_t = DEFAULT_LEVEL, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,

        /// Replace an existing output file
        #[arg(short = 'y', long)]
        overwrite: bool,
    },

    /// Recover the original file from an EFC container
    #[command(alias = "d")]
    Decode {
        /// Container to decode
        input: PathBuf,

        /// Output file, or directory to place the recovered file in
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        key: KeyArgs,

        /// Replace an existing output file
        #[arg(short = 'y', long)]
        overwrite: bool,
    },

    /// Show header information without decoding
    #[command(alias = "i")]
    Info {
        /// Container to inspect
        file: PathBuf,

        /// Print only the original filename
        #[arg(long)]
        only_filename: bool,

        /// Print as JSON
        #[arg(long, conflicts_with = "only_filename")]
        json: bool,
    },

    /// List available ciphers
    Ciphers,
}

fn parse_cipher(s: &str) -> Result<CipherKind, String> {
    s.parse().map_err(|e| format!("{}", e))
}

fn parse_hex_key(s: &str) -> Result<HexKey, String> {
    hex::decode(s)
        .map(HexKey)
        .map_err(|e| format!("invalid hex key: {}", e))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("efc {}", get_version());
        return ExitCode::SUCCESS;
    }

    init_logging(cli.verbose);

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            use clap::CommandFactory;
            let _ = Cli::command().print_help();
            println!();
            return ExitCode::SUCCESS;
        }
    };

    let result = match command {
        Commands::Encode {
            input,
            output,
            key,
            cipher,
            no_compress,
            level,
            overwrite,
        } => key.into_source().and_then(|key| {
            let options = EncodeOptions {
                key,
                compression: if no_compress {
                    CompressionKind::None
                } else {
                    DEFAULT_COMPRESSION
                },
                cipher,
                level,
                output,
                overwrite,
            };
            let (path, report) = encode_command(&input, &options)?;
            println!(
                "Encoded {} to {} ({} bytes)",
                input.display(),
                path.display(),
                report.container_len()
            );
            Ok(true)
        }),

        Commands::Decode {
            input,
            output,
            key,
            overwrite,
        } => key.into_source().and_then(|key| {
            let options = DecodeOptions {
                key,
                output,
                overwrite,
            };
            let decoded = decode_command(&input, &options)?;
            println!("Decoded {} to {}", input.display(), decoded.path.display());
            if decoded.report.checksum_matched {
                println!("Checksum OK: {}", decoded.report.actual);
            } else {
                eprintln!(
                    "Warning: checksum mismatch (expected {}, got {}); wrong key or corrupt container",
                    decoded.report.expected, decoded.report.actual
                );
            }
            Ok(decoded.report.checksum_matched)
        }),

        Commands::Info {
            file,
            only_filename,
            json,
        } => show_info(&file, &InfoOptions { only_filename, json }).map(|info| {
            print!("{}", info);
            true
        }),

        Commands::Ciphers => {
            print!("{}", list_ciphers());
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
