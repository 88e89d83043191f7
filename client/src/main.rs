/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2026 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Query client CLI: sync a dataset's change log from a server over HTTP
//! and query IOCs against it. Per-server state mirrors `spec.md` §6's
//! client layout: `changes.log` (the replicated log), `active_index.csv`
//! (the persisted active-set cache), timestamped `delta-*.log`/`full-*.log`
//! audit copies of each raw sync response, and an append-only `matches.txt`
//! of successful queries.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use psi_engine::{
    client::{apply_active_set_delta, ClientReplica, Describe, ServerApi, SyncTail},
    crypto::{aead, Nonce24, Point32},
    error::{Error, Result},
};
use serde::Deserialize;
use structopt::StructOpt;

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "client", about = "PSI query client")]
struct Args {
    /// Local state directory for per-server replicas
    #[structopt(long, default_value = ".")]
    base_dir: String,

    /// Increase verbosity (-vvv supported)
    #[structopt(short, parse(from_occurrences))]
    verbose: u8,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, StructOpt)]
enum Command {
    /// Fetch the latest changes from a server and store them locally
    Sync { server: String, data_name: String },
    /// Force a full resync, discarding local state first
    Reset { server: String, data_name: String },
    /// Remove all local state for a server/dataset pair
    Purge { server: String, data_name: String },
    /// Sync, then query a single IOC
    Query { server: String, data_name: String, ioc: String },
}

fn init_logger(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let cfg = simplelog::ConfigBuilder::new().build();
    simplelog::TermLogger::init(level, cfg, simplelog::TerminalMode::Mixed, simplelog::ColorChoice::Auto)
        .map_err(|e| Error::InvalidInput(e.to_string()))?;
    Ok(())
}

/// A server address normalizes to a filesystem-safe label for local state,
/// mirroring the reference client's per-server state directories.
fn server_label(server: &str) -> String {
    server.replace(':', "_").replace('/', "_")
}

/// `data/<server_label>/<data_name>/`, the root of one dataset's client
/// mirror (`spec.md` §6).
fn dataset_dir(base_dir: &Path, server: &str, data_name: &str) -> PathBuf {
    base_dir.join("data").join(server_label(server)).join(data_name)
}

fn replica_path(dir: &Path) -> PathBuf {
    dir.join("changes.log")
}

fn active_index_path(dir: &Path) -> PathBuf {
    dir.join("active_index.csv")
}

fn matches_path(dir: &Path) -> PathBuf {
    dir.join("matches.txt")
}

fn load_replica(path: &Path) -> ClientReplica {
    match fs::read(path) {
        Ok(bytes) => ClientReplica::from_log(bytes),
        Err(_) => ClientReplica::new(),
    }
}

fn save_replica(path: &Path, replica: &ClientReplica) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, replica.log_bytes())?;
    Ok(())
}

/// Parse a persisted `active_index.csv` (`prf_hex,nonce_hex:ct_hex` lines).
/// Missing or unreadable is treated as empty, never an error — the active
/// set is always recoverable by replaying `changes.log`.
fn load_active_index(path: &Path) -> HashMap<String, (Nonce24, Vec<u8>)> {
    let Ok(text) = fs::read_to_string(path) else { return HashMap::new() };
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((prf_hex, enc_meta)) = line.split_once(',') else { continue };
        let Some((nonce_hex, ct_hex)) = enc_meta.split_once(':') else { continue };
        if let (Ok(nonce), Ok(ct)) = (Nonce24::from_hex(nonce_hex), hex::decode(ct_hex)) {
            map.insert(prf_hex.trim().to_lowercase(), (nonce, ct));
        }
    }
    map
}

fn save_active_index(path: &Path, active: &HashMap<String, (Nonce24, Vec<u8>)>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for (prf_hex, (nonce, ct)) in active {
        out.push_str(&format!("{prf_hex},{}:{}\n", nonce.to_hex(), hex::encode(ct)));
    }
    fs::write(path, out)?;
    Ok(())
}

/// Update the persisted active-set index after a sync: a full reply rebuilds
/// it from scratch (the just-replaced log), a delta reply merges onto
/// whatever was already on disk (`spec.md` §4.5 steps 3/5/6).
fn update_active_index(dir: &Path, replica: &ClientReplica, tail: &SyncTail) -> Result<()> {
    let path = active_index_path(dir);
    let active = if tail.is_full {
        replica.active_set()
    } else {
        let mut active = load_active_index(&path);
        apply_active_set_delta(&mut active, &tail.body);
        active
    };
    save_active_index(&path, &active)
}

/// The active set a query matches against: the persisted index if present,
/// else a full replay of the local log (`spec.md` §4.5's "Active-set
/// fallback").
fn active_set_for_query(dir: &Path, replica: &ClientReplica) -> HashMap<String, (Nonce24, Vec<u8>)> {
    let path = active_index_path(dir);
    if path.exists() {
        load_active_index(&path)
    } else {
        replica.active_set()
    }
}

/// Persist the raw tail payload just received, timestamped, for operator
/// audit (`spec.md` §6's `delta-*.log`/`full-*.log` files).
fn write_audit_log(dir: &Path, tail: &SyncTail) -> Result<()> {
    fs::create_dir_all(dir)?;
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let prefix = if tail.is_full { "full" } else { "delta" };
    fs::write(dir.join(format!("{prefix}-{ts}.log")), &tail.body)?;
    Ok(())
}

/// A full reply replaces the log wholesale; any previously accumulated
/// delta audit files no longer describe a valid chain from the new anchor,
/// so they're discarded (`spec.md` §4.5 step 3).
fn purge_delta_audit_logs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("delta-") {
            let _ = fs::remove_file(entry.path());
        }
    }
}

fn append_match(dir: &Path, ioc: &str, prf_hex: &str, metadata: &[u8]) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut f = fs::OpenOptions::new().create(true).append(true).open(matches_path(dir))?;
    writeln!(f, "{ioc},{prf_hex},{}", String::from_utf8_lossy(metadata))?;
    Ok(())
}

/// `ServerApi` implementation over `surf`, bridging synchronous trait
/// methods to async HTTP calls via `async_std::task::block_on`.
struct HttpServerApi {
    base_url: String,
}

#[derive(Deserialize)]
struct DescribeWire {
    encryption: String,
    suite: String,
}

#[derive(Deserialize)]
struct EvaluateWire {
    evaluated: String,
}

impl HttpServerApi {
    async fn describe_async(&self, data_name: &str) -> Result<Describe> {
        let url = format!("{}/encryption_type?data_type={}", self.base_url, data_name);
        let mut res =
            surf::get(&url).await.map_err(|e| Error::Io(io_err(e)))?;
        if res.status() != surf::StatusCode::Ok {
            return Err(Error::NotFound(format!("describe failed: HTTP {}", res.status())));
        }
        let wire: DescribeWire = res.body_json().await.map_err(|e| Error::Io(io_err(e)))?;
        Ok(Describe { suite: wire.suite, encryption: wire.encryption })
    }

    async fn sync_tail_async(&self, data_name: &str, anchor_hash: Option<&str>) -> Result<SyncTail> {
        let mut url = format!("{}/sync_data?data_type={}", self.base_url, data_name);
        if let Some(hash) = anchor_hash {
            url.push_str(&format!("&hash={hash}"));
        }
        let mut res = surf::get(&url).await.map_err(|e| Error::Io(io_err(e)))?;
        if res.status() != surf::StatusCode::Ok {
            return Err(Error::NotFound(format!("sync failed: HTTP {}", res.status())));
        }
        let is_full = res.header("X-Delta").map(|v| v.to_string() != "delta").unwrap_or(true);
        let body = res.body_bytes().await.map_err(|e| Error::Io(io_err(e)))?;
        Ok(SyncTail { is_full, body })
    }

    async fn evaluate_async(&self, data_name: &str, blinded: &Point32) -> Result<Point32> {
        let url = format!("{}/oprf_evaluate", self.base_url);
        let payload = serde_json::json!({ "data_type": data_name, "blinded": blinded.to_hex() });
        let mut res = surf::post(&url)
            .body_json(&payload)
            .map_err(|e| Error::Io(io_err(e)))?
            .await
            .map_err(|e| Error::Io(io_err(e)))?;
        if res.status() != surf::StatusCode::Ok {
            return Err(Error::AuthFailure);
        }
        let wire: EvaluateWire = res.body_json().await.map_err(|e| Error::Io(io_err(e)))?;
        Point32::from_hex(&wire.evaluated)
    }
}

fn io_err(e: surf::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

impl ServerApi for HttpServerApi {
    fn describe(&self, data_name: &str) -> Result<Describe> {
        async_std::task::block_on(self.describe_async(data_name))
    }

    fn sync_tail(&self, data_name: &str, anchor_hash: Option<&str>) -> Result<SyncTail> {
        async_std::task::block_on(self.sync_tail_async(data_name, anchor_hash))
    }

    fn evaluate(&self, data_name: &str, blinded: &Point32) -> Result<Point32> {
        async_std::task::block_on(self.evaluate_async(data_name, blinded))
    }
}

fn run(args: &Args) -> Result<()> {
    let base_dir = PathBuf::from(&args.base_dir);

    match &args.command {
        Command::Sync { server, data_name } => {
            let api = HttpServerApi { base_url: format!("http://{server}") };
            let dir = dataset_dir(&base_dir, server, data_name);
            let path = replica_path(&dir);
            let mut replica = load_replica(&path);
            let tail = replica.sync_fetch(&api, data_name)?;
            if tail.is_full {
                purge_delta_audit_logs(&dir);
            }
            write_audit_log(&dir, &tail)?;
            save_replica(&path, &replica)?;
            update_active_index(&dir, &replica, &tail)?;
            log::info!("synced '{data_name}' from {server} ({})", if tail.is_full { "full" } else { "delta" });
        }
        Command::Reset { server, data_name } => {
            let dir = dataset_dir(&base_dir, server, data_name);
            let _ = fs::remove_dir_all(&dir);
            let api = HttpServerApi { base_url: format!("http://{server}") };
            let mut replica = ClientReplica::new();
            let tail = replica.sync_fetch(&api, data_name)?;
            write_audit_log(&dir, &tail)?;
            save_replica(&replica_path(&dir), &replica)?;
            update_active_index(&dir, &replica, &tail)?;
            log::info!("reset and resynced '{data_name}' from {server}");
        }
        Command::Purge { server, data_name } => {
            let dir = dataset_dir(&base_dir, server, data_name);
            let _ = fs::remove_dir_all(&dir);
            log::info!("purged local state for '{data_name}' @ {server}");
        }
        Command::Query { server, data_name, ioc } => {
            let api = HttpServerApi { base_url: format!("http://{server}") };
            let dir = dataset_dir(&base_dir, server, data_name);
            let path = replica_path(&dir);
            let mut replica = load_replica(&path);
            let tail = replica.sync_fetch(&api, data_name)?;
            if tail.is_full {
                purge_delta_audit_logs(&dir);
            }
            write_audit_log(&dir, &tail)?;
            save_replica(&path, &replica)?;
            update_active_index(&dir, &replica, &tail)?;

            let mut rng = rand::rngs::OsRng;
            let (prf, q) = replica.evaluate_ioc(&api, &mut rng, data_name, ioc.as_bytes())?;
            let active = active_set_for_query(&dir, &replica);
            let prf_hex = prf.to_hex();
            match active.get(&prf_hex) {
                Some((nonce, ct)) => {
                    let metadata = aead::decrypt_metadata(data_name, ioc.as_bytes(), &prf, &q, nonce, ct)?;
                    append_match(&dir, ioc, &prf_hex, &metadata)?;
                    println!("Match found.");
                    println!("Metadata: {}", String::from_utf8_lossy(&metadata));
                }
                None => println!("No active match found."),
            }
        }
    }
    Ok(())
}

#[async_std::main]
async fn main() {
    let args = Args::from_args();
    if let Err(e) = init_logger(args.verbose) {
        eprintln!("failed to initialize logger: {e}");
        std::process::exit(1);
    }
    if let Err(e) = run(&args) {
        log::error!("{e}");
        std::process::exit(e.exit_code());
    }
}
