//! Command line configuration: argument parsing and the subcommands
//! described in §6 (`init`, `reset`, `refresh`, `print`), plus a `serve`
//! command for the reference server.

use std::path::PathBuf;
use std::str::FromStr;
use clap::{App, Arg, ArgMatches, SubCommand};
use dirs::home_dir;
use log::LevelFilter;

/// Where per-client records are persisted, one `clientN.json` each.
fn default_base_dir() -> PathBuf {
    home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".rtr-client")
}

/// Parsed command line configuration: where state lives, how verbose to
/// be, and which [`Command`] to run.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_dir: PathBuf,
    pub verbose: LevelFilter,
    pub command: Command,
}

/// One cache to add with `init`.
#[derive(Clone, Debug)]
pub struct NewCache {
    pub server: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub enum Command {
    /// Create a fresh client record for each given cache.
    Init { caches: Vec<NewCache>, versions: Vec<u8> },
    /// Run an unconditional Reset episode against one client.
    Reset { client_id: usize },
    /// Run a timer-gated refresh against one client, or every client.
    Refresh { client_id: Option<usize>, force: bool },
    /// Dump the merged state, or one client's state.
    Print { client_id: Option<usize>, format: PrintFormat },
    /// Run the reference server against its own published payload set.
    Serve { listen: std::net::SocketAddr, version: u8 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrintFormat {
    Text,
    Json,
}

impl Config {
    pub fn create() -> Result<Self, String> {
        let matches = Self::app().get_matches();
        Self::from_matches(&matches)
    }

    fn app() -> App<'static, 'static> {
        App::new("rtr-client")
            .version(crate_version!())
            .author(crate_authors!())
            .about("a client and reference server for the RPKI-to-Router protocol")
            .arg(Arg::with_name("base-dir")
                .short("b")
                .long("base-dir")
                .value_name("DIR")
                .global(true)
                .takes_value(true)
                .help("directory holding persisted client records")
            )
            .arg(Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .global(true)
                .multiple(true)
                .help("print more (and more) diagnostic output")
            )
            .subcommand(SubCommand::with_name("init")
                .about("creates a client record for one or more caches")
                .arg(Arg::with_name("server")
                    .long("server")
                    .value_name("HOST:PORT")
                    .takes_value(true)
                    .multiple(true)
                    .number_of_values(1)
                    .required(true)
                    .help("a cache to add, repeatable")
                )
                .arg(Arg::with_name("versions")
                    .long("versions")
                    .value_name("LIST")
                    .takes_value(true)
                    .default_value("0,1,2")
                    .help("comma-separated protocol versions to support")
                )
            )
            .subcommand(SubCommand::with_name("reset")
                .about("runs an unconditional Reset episode against one cache")
                .arg(Arg::with_name("client_id")
                    .long("client_id")
                    .value_name("ID")
                    .takes_value(true)
                    .required(true)
                )
            )
            .subcommand(SubCommand::with_name("refresh")
                .about("runs a timer-gated refresh against one or all caches")
                .arg(Arg::with_name("client_id")
                    .long("client_id")
                    .value_name("ID")
                    .takes_value(true)
                    .help("omit to refresh every configured cache")
                )
                .arg(Arg::with_name("force")
                    .long("force")
                    .help("bypass the refresh/retry timers")
                )
            )
            .subcommand(SubCommand::with_name("print")
                .about("dumps merged state, or one client's state")
                .arg(Arg::with_name("client_id")
                    .long("client_id")
                    .value_name("ID")
                    .takes_value(true)
                    .help("omit to print the merge of every cache")
                )
                .arg(Arg::with_name("format")
                    .long("format")
                    .value_name("FORMAT")
                    .possible_values(&["text", "json"])
                    .default_value("text")
                    .takes_value(true)
                )
            )
            .subcommand(SubCommand::with_name("serve")
                .about("runs the reference RTR server")
                .arg(Arg::with_name("listen")
                    .long("listen")
                    .value_name("ADDR:PORT")
                    .default_value("127.0.0.1:3323")
                    .takes_value(true)
                )
                .arg(Arg::with_name("version")
                    .long("version")
                    .value_name("V")
                    .default_value("2")
                    .takes_value(true)
                )
            )
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let base_dir = matches.value_of("base-dir")
            .map(PathBuf::from)
            .unwrap_or_else(default_base_dir);
        let verbose = match matches.occurrences_of("verbose") {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        };
        let command = match matches.subcommand() {
            ("init", Some(sub)) => Command::Init {
                caches: sub.values_of("server")
                    .into_iter().flatten()
                    .map(parse_cache)
                    .collect::<Result<_, _>>()?,
                versions: parse_versions(sub.value_of("versions").unwrap())?,
            },
            ("reset", Some(sub)) => Command::Reset {
                client_id: parse_id(sub.value_of("client_id").unwrap())?,
            },
            ("refresh", Some(sub)) => Command::Refresh {
                client_id: sub.value_of("client_id").map(parse_id).transpose()?,
                force: sub.is_present("force"),
            },
            ("print", Some(sub)) => Command::Print {
                client_id: sub.value_of("client_id").map(parse_id).transpose()?,
                format: match sub.value_of("format").unwrap() {
                    "json" => PrintFormat::Json,
                    _ => PrintFormat::Text,
                },
            },
            ("serve", Some(sub)) => Command::Serve {
                listen: sub.value_of("listen").unwrap().parse()
                    .map_err(|err| format!("invalid --listen address: {}", err))?,
                version: sub.value_of("version").unwrap().parse()
                    .map_err(|_| "invalid --version".to_string())?,
            },
            _ => return Err(
                "no subcommand given; see --help for init/reset/refresh/print/serve"
                    .to_string()
            ),
        };
        Ok(Config { base_dir, verbose, command })
    }
}

fn parse_id(s: &str) -> Result<usize, String> {
    usize::from_str(s).map_err(|_| format!("invalid client id {:?}", s))
}

fn parse_cache(s: &str) -> Result<NewCache, String> {
    let (host, port) = s.rsplit_once(':')
        .ok_or_else(|| format!("expected HOST:PORT, got {:?}", s))?;
    let port = port.parse().map_err(|_| format!("invalid port in {:?}", s))?;
    Ok(NewCache { server: host.to_string(), port })
}

fn parse_versions(s: &str) -> Result<Vec<u8>, String> {
    let versions: Result<Vec<u8>, _> = s.split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect();
    let versions = versions.map_err(|_| format!("invalid --versions {:?}", s))?;
    if versions.is_empty() {
        return Err("--versions must name at least one version".to_string());
    }
    for v in &versions {
        if *v > 2 {
            return Err(format!("unsupported protocol version {}", v));
        }
    }
    Ok(versions)
}


//============ Testing =======================================================
