#[macro_use] extern crate clap;

use std::fs;
use std::process::exit;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use log::{error, info};
use rtr_client::client::TcpConnector;
use rtr_client::clock::SystemClock;
use rtr_client::config::{Command, Config, NewCache, PrintFormat};
use rtr_client::error::ExitError;
use rtr_client::orchestrator::Orchestrator;
use rtr_client::persist;
use rtr_client::server::maintainer::Maintainer;
use rtr_client::server::{self, Timers};
use rtr_client::utils::json::JsonBuilder;
use rtr_client::utils::sync::RwLock;

fn main() {
    let config = match Config::create() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };
    if let Err(err) = rtr_client::log::init(config.verbose) {
        eprintln!("failed to initialize logging: {}", err);
        exit(1);
    }
    match run(config) {
        Ok(()) => exit(0),
        Err(ExitError::Generic) => exit(1),
        Err(ExitError::OperationFailed) => exit(2),
    }
}

fn run(config: Config) -> Result<(), ExitError> {
    fs::create_dir_all(&config.base_dir).map_err(|err| {
        error!(
            "failed to create base directory {}: {}",
            config.base_dir.display(), err
        );
        ExitError::Generic
    })?;
    match config.command {
        Command::Init { caches, versions } => init(&config, caches, versions),
        Command::Reset { client_id } => run_reset(&config, client_id),
        Command::Refresh { client_id, force } => run_refresh(&config, client_id, force),
        Command::Print { client_id, format } => print(&config, client_id, format),
        Command::Serve { listen, version } => serve(listen, version),
    }
}

fn init(
    config: &Config, caches: Vec<NewCache>, versions: Vec<u8>,
) -> Result<(), ExitError> {
    let mut next_id = persist::next_id(&config.base_dir).map_err(|err| {
        error!("failed to inspect {}: {}", config.base_dir.display(), err);
        ExitError::Generic
    })?;
    for cache in caches {
        let record = rtr_client::client::ClientRecord::new(
            cache.server.clone(), cache.port, versions.clone(),
        );
        persist::save(&config.base_dir, next_id, &record).map_err(|err| {
            error!("failed to persist client record: {}", err);
            ExitError::Generic
        })?;
        info!("created client {} for {}:{}", next_id, cache.server, cache.port);
        next_id += 1;
    }
    Ok(())
}

fn run_reset(config: &Config, client_id: usize) -> Result<(), ExitError> {
    let mut record = persist::load(&config.base_dir, client_id).map_err(|err| {
        error!("failed to load client {}: {}", client_id, err);
        ExitError::Generic
    })?;
    let connector = TcpConnector::default();
    let clock = SystemClock;
    let cancel = AtomicBool::new(false);
    let outcome = rtr_client::client::reset(&mut record, &connector, &clock, &cancel);
    persist::save(&config.base_dir, client_id, &record).map_err(|err| {
        error!("failed to persist client {}: {}", client_id, err);
        ExitError::Generic
    })?;
    outcome.map_err(|err| {
        error!("reset against {} failed: {}", record.server, err);
        ExitError::OperationFailed
    })
}

fn run_refresh(
    config: &Config, client_id: Option<usize>, force: bool,
) -> Result<(), ExitError> {
    let connector = TcpConnector::default();
    let clock = SystemClock;
    let cancel = AtomicBool::new(false);

    let ids = match client_id {
        Some(id) => vec![id],
        None => persist::list_ids(&config.base_dir).map_err(|err| {
            error!("failed to inspect {}: {}", config.base_dir.display(), err);
            ExitError::Generic
        })?,
    };
    let records = ids.iter().map(|&id| {
        persist::load(&config.base_dir, id).map_err(|err| {
            error!("failed to load client {}: {}", id, err);
            ExitError::Generic
        })
    }).collect::<Result<Vec<_>, _>>()?;

    let mut orchestrator = Orchestrator::init(records);
    let results = orchestrator.refresh_all(&connector, &clock, &cancel, force);

    let mut failed = false;
    for (id, record) in ids.iter().zip(orchestrator.records()) {
        if let Err(err) = persist::save(&config.base_dir, *id, record) {
            error!("failed to persist client {}: {}", id, err);
            failed = true;
        }
    }
    for result in &results {
        match &result.outcome {
            Ok(rtr_client::client::RefreshOutcome::Skipped) => {
                info!("client {} ({}): not due yet", ids[result.index], result.server);
            }
            Ok(rtr_client::client::RefreshOutcome::Ran) => {
                info!("client {} ({}): refreshed", ids[result.index], result.server);
            }
            Err(err) => {
                error!(
                    "client {} ({}): refresh failed: {}",
                    ids[result.index], result.server, err,
                );
                failed = true;
            }
        }
    }
    if failed {
        Err(ExitError::OperationFailed)
    } else {
        Ok(())
    }
}

fn print(
    config: &Config, client_id: Option<usize>, format: PrintFormat,
) -> Result<(), ExitError> {
    let state = match client_id {
        Some(id) => {
            let record = persist::load(&config.base_dir, id).map_err(|err| {
                error!("failed to load client {}: {}", id, err);
                ExitError::Generic
            })?;
            record.state
        }
        None => {
            let ids = persist::list_ids(&config.base_dir).map_err(|err| {
                error!("failed to inspect {}: {}", config.base_dir.display(), err);
                ExitError::Generic
            })?;
            let records = ids.iter().map(|&id| {
                persist::load(&config.base_dir, id).map_err(|err| {
                    error!("failed to load client {}: {}", id, err);
                    ExitError::Generic
                })
            }).collect::<Result<Vec<_>, _>>()?;
            let orchestrator = Orchestrator::init(records);
            orchestrator.merged_state().map_err(|err| {
                error!("failed to merge client states: {}", err);
                ExitError::Generic
            })?
        }
    };
    match (state, format) {
        (None, _) => println!("no state available yet"),
        (Some(state), PrintFormat::Text) => {
            println!("session_id: {}", state.session_id());
            println!("serial_number: {}", state.serial_number());
            println!("vrps:");
            for (key, count) in state.vrps() {
                println!(
                    "  {}/{}-{} => {} ({})",
                    key.address, key.prefix_len, key.max_len, key.asn, count,
                );
            }
            println!("router_keys:");
            for (id, spki) in state.router_keys() {
                println!(
                    "  asn {} ski {} spki {} bytes", id.asn, hex(&id.ski), spki.len(),
                );
            }
            println!("aspas:");
            for (customer_asn, providers) in state.aspas() {
                println!("  {} => {:?}", customer_asn, providers);
            }
        }
        (Some(state), PrintFormat::Json) => {
            let json = JsonBuilder::build(|builder| {
                builder.member_raw("session_id", state.session_id());
                builder.member_raw("serial_number", state.serial_number());
                builder.member_array("vrps", |builder| {
                    for (key, count) in state.vrps() {
                        builder.array_object(|builder| {
                            builder.member_str("prefix", key.address);
                            builder.member_raw("prefix_len", key.prefix_len);
                            builder.member_raw("max_len", key.max_len);
                            builder.member_raw("asn", key.asn);
                            builder.member_raw("count", *count);
                        });
                    }
                });
                builder.member_array("router_keys", |builder| {
                    for (id, spki) in state.router_keys() {
                        builder.array_object(|builder| {
                            builder.member_raw("asn", id.asn);
                            builder.member_str("ski", hex(&id.ski));
                            builder.member_str("spki", base64::encode(spki));
                        });
                    }
                });
                builder.member_array("aspas", |builder| {
                    for (customer_asn, providers) in state.aspas() {
                        builder.array_object(|builder| {
                            builder.member_raw("customer_asn", *customer_asn);
                            builder.member_array("providers", |builder| {
                                for asn in providers {
                                    builder.array_raw(*asn);
                                }
                            });
                        });
                    }
                });
            });
            println!("{}", json);
        }
    }
    Ok(())
}

fn serve(listen: std::net::SocketAddr, version: u8) -> Result<(), ExitError> {
    let session_id = server::startup_session_id(std::time::SystemTime::now());
    let maintainer = Arc::new(RwLock::new(Maintainer::new(session_id, version, 64)));
    server::bind_and_serve(listen, maintainer, Timers::default()).map_err(|err| {
        error!("reference server failed: {}", err);
        ExitError::Generic
    })
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
