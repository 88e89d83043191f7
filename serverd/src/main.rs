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

//! Operator CLI and HTTP daemon for a PSI dataset server: create/reconcile/
//! rekey/purge a dataset offline, or serve the three query-responder
//! operations over HTTP (`/encryption_type`, `/sync_data`, `/oprf_evaluate`).

use std::{fs, path::PathBuf, str::FromStr};

use psi_engine::{
    dataset::{self, parse_source, Dataset},
    schema::{Algorithm, RekeyInterval},
    server::QueryResponder,
    store::{DatasetPaths, FsKeyStore},
};
use structopt::StructOpt;
use tide::{Body, Request, Response, StatusCode};

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "serverd", about = "PSI dataset operator daemon")]
struct Args {
    /// Base directory holding schemas/, secrets/, and data/
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
    /// Create a new dataset's schema and private key
    CreateSource {
        data_name: String,
        #[structopt(short = "a", long, default_value = "classic")]
        supported_algorithm: String,
        #[structopt(short = "r", long, default_value = "1d")]
        rekey_interval: String,
    },
    /// Remove a dataset's schema and private key (not its data directory)
    RemoveSource { data_name: String },
    /// Diff a source file against the index and append change events
    Reconcile { data_name: String, data_source_file: String },
    /// Rotate the private key and recompute all evaluations
    Rekey { data_name: String, data_source_file: String },
    /// Delete a dataset's index and change log
    PurgeData { data_name: String },
    /// Serve the query responder over HTTP
    Serve { bind: String },
}

fn init_logger(verbosity: u8) -> psi_engine::Result<()> {
    let level = match verbosity {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let cfg = simplelog::ConfigBuilder::new().build();
    simplelog::TermLogger::init(level, cfg, simplelog::TerminalMode::Mixed, simplelog::ColorChoice::Auto)
        .map_err(|e| psi_engine::Error::InvalidInput(e.to_string()))?;
    Ok(())
}

fn read_source(path: &str) -> psi_engine::Result<Vec<(String, Vec<u8>)>> {
    let bytes = fs::read(path)?;
    Ok(parse_source(&bytes))
}

fn run_cli(args: &Args) -> psi_engine::Result<()> {
    let base_dir = PathBuf::from(&args.base_dir);
    let mut rng = rand::rngs::OsRng;

    match &args.command {
        Command::CreateSource { data_name, supported_algorithm, rekey_interval } => {
            let algorithm = Algorithm::from_str(supported_algorithm)?;
            let interval = RekeyInterval::from_str(rekey_interval)?;
            let paths = DatasetPaths::new(&base_dir, data_name);
            Dataset::create(
                &mut rng,
                data_name,
                algorithm,
                interval,
                Box::new(FsKeyStore::new(paths.schema)),
                Box::new(FsKeyStore::new(paths.key)),
            )?;
            log::info!("created dataset '{data_name}'");
        }
        Command::RemoveSource { data_name } => {
            let paths = DatasetPaths::new(&base_dir, data_name);
            let removed = Dataset::remove(&FsKeyStore::new(paths.schema), &FsKeyStore::new(paths.key))?;
            log::info!("remove '{data_name}': removed_any={removed}");
        }
        Command::Reconcile { data_name, data_source_file } => {
            let ds = Dataset::open_fs(&base_dir, data_name)?;
            let source = read_source(data_source_file)?;
            let report = ds.reconcile(&mut rng, &source)?;
            log::info!(
                "reconciled '{data_name}': added={} removed={} upgraded={}",
                report.added,
                report.removed,
                report.upgraded
            );
        }
        Command::Rekey { data_name, data_source_file } => {
            let ds = Dataset::open_fs(&base_dir, data_name)?;
            let source = read_source(data_source_file)?;
            let report = ds.rekey(&mut rng, &source)?;
            log::info!("rekeyed '{data_name}': reissued={}", report.added);
        }
        Command::PurgeData { data_name } => {
            dataset::purge(&base_dir, data_name)?;
            log::info!("purged data directory for '{data_name}'");
        }
        Command::Serve { .. } => unreachable!("handled in main"),
    }
    Ok(())
}

#[derive(Clone)]
struct ServerState {
    responder: std::sync::Arc<QueryResponder>,
}

fn error_status(err: &psi_engine::Error) -> StatusCode {
    match err {
        psi_engine::Error::NotFound(_) => StatusCode::NotFound,
        psi_engine::Error::InvalidInput(_) | psi_engine::Error::UnsupportedAlgorithm(_) => {
            StatusCode::BadRequest
        }
        _ => StatusCode::InternalServerError,
    }
}

fn error_response(err: psi_engine::Error) -> tide::Result {
    let status = error_status(&err);
    let mut res = Response::new(status);
    res.set_body(Body::from_json(&serde_json::json!({ "error": err.to_string() }))?);
    Ok(res)
}

#[derive(serde::Deserialize)]
struct DataTypeQuery {
    data_type: String,
}

async fn handle_encryption_type(req: Request<ServerState>) -> tide::Result {
    let data_type = match req.query::<DataTypeQuery>() {
        Ok(q) => q.data_type,
        Err(_) => return error_response(psi_engine::Error::InvalidInput("missing data_type".into())),
    };
    match req.state().responder.describe(&data_type) {
        Ok(info) => {
            let mut res = Response::new(StatusCode::Ok);
            res.set_body(Body::from_json(&serde_json::json!({
                "data_type": info.data_name,
                "encryption": info.encryption,
                "suite": info.suite,
            }))?);
            Ok(res)
        }
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct SyncDataQuery {
    data_type: String,
    hash: Option<String>,
}

async fn handle_sync_data(req: Request<ServerState>) -> tide::Result {
    let query = match req.query::<SyncDataQuery>() {
        Ok(q) => q,
        Err(_) => return error_response(psi_engine::Error::InvalidInput("missing data_type".into())),
    };

    match req.state().responder.sync(&query.data_type, query.hash.as_deref()) {
        Ok(tail) => {
            let is_delta = tail.is_delta();
            let mut res = Response::new(StatusCode::Ok);
            res.insert_header("X-Delta", if is_delta { "delta" } else { "full" });
            res.set_content_type("text/plain; charset=utf-8");
            res.set_body(tail.into_body());
            Ok(res)
        }
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct EvaluateRequest {
    data_type: String,
    blinded: String,
}

async fn handle_oprf_evaluate(mut req: Request<ServerState>) -> tide::Result {
    let body: EvaluateRequest = req.body_json().await?;
    let blinded = match psi_engine::crypto::Point32::from_hex(&body.blinded) {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };
    match req.state().responder.evaluate(&body.data_type, &blinded) {
        Ok(evaluated) => {
            let mut res = Response::new(StatusCode::Ok);
            res.set_body(Body::from_json(&serde_json::json!({ "evaluated": evaluated.to_hex() }))?);
            Ok(res)
        }
        Err(e) => error_response(e),
    }
}

async fn serve(base_dir: PathBuf, bind: String) -> tide::Result<()> {
    let state = ServerState { responder: std::sync::Arc::new(QueryResponder::new(base_dir)) };
    let mut app = tide::with_state(state);
    app.at("/encryption_type").get(handle_encryption_type);
    app.at("/sync_data").get(handle_sync_data);
    app.at("/oprf_evaluate").post(handle_oprf_evaluate);
    log::info!("listening on {bind}");
    app.listen(bind).await?;
    Ok(())
}

#[async_std::main]
async fn main() -> psi_engine::Result<()> {
    let args = Args::from_args();
    init_logger(args.verbose)?;

    if let Command::Serve { bind } = &args.command {
        serve(PathBuf::from(&args.base_dir), bind.clone())
            .await
            .map_err(|e| psi_engine::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        return Ok(());
    }

    match run_cli(&args) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}
