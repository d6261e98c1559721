//! A tiny operator-facing CLI that drives the three storage layers
//! against a temp or given directory and prints what happened. Not a
//! general-purpose database shell.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use log::error;

use deltalite::btree::BTree;
use deltalite::pagestore::Store;
use deltalite::sim::{block_on, Endpoint, HashRing, KvClient, KvServer, Message, MessageBus, NetworkConfig};
use deltalite::txlog::{Action, TableLog, Transaction};
use deltalite::value::{serialize, RecordMap, Value};

#[derive(Parser, Debug)]
#[command(name = "deltalite", version, about = "deltalite demo CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write a handful of records into a fresh B+Tree, then read and scan
    /// them back.
    Btree {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long, default_value_t = 4096)]
        page_size: u64,
    },
    /// Open two transactions against the same table and commit both,
    /// demonstrating the optimistic-concurrency conflict.
    Txlog {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Put and get a key through the simulated network and object KV
    /// service.
    Sim,
}

fn main() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Btree { path, page_size } => run_btree(path, page_size),
        Cmd::Txlog { path } => run_txlog(path),
        Cmd::Sim => run_sim(),
    }
}

fn run_btree(path: Option<PathBuf>, page_size: u64) -> Result<()> {
    let (_tmp, path) = resolve_path(path, "deltalite-demo.page")?;
    let store = Arc::new(Store::open(&path, page_size)?);
    let tree = BTree::open(store)?;

    for (key, name) in [("user1", "A"), ("user2", "B"), ("user3", "C")] {
        let mut record = RecordMap::new();
        record.insert("name".into(), Value::String(name.into()));
        tree.write(key.as_bytes(), &serialize(&record)?)?;
    }

    let bytes = tree
        .read(b"user2")
        .map_err(|e| anyhow!("read user2: {e}"))?
        .ok_or_else(|| anyhow!("user2 unexpectedly missing"))?;
    let record = deltalite::value::deserialize(&bytes)?;
    println!("read(user2) = {record:?}");

    let scanned = tree.scan(Some(b"user1"), Some(b"user4"))?.collect_all()?;
    println!("scan(user1, user4) returned {} records:", scanned.len());
    for (key, value) in &scanned {
        let record = deltalite::value::deserialize(value)?;
        println!("  {} -> {record:?}", String::from_utf8_lossy(key));
    }
    println!("root is still page {}", tree.root_id());
    Ok(())
}

fn run_txlog(path: Option<PathBuf>) -> Result<()> {
    let (_tmp, path) = resolve_path(path, "deltalite-demo-table")?;
    let log = TableLog::for_table(&path);

    let mut t1 = Transaction::begin(&log)?;
    t1.add_action(Action::AddFile {
        path: "a".into(),
        size: 1000,
        modification_time: 1,
        data_change: true,
    })?;
    let v1 = t1.commit("WRITE", BTreeMap::new(), None)?;
    println!("T1 committed as version {v1}");

    let mut t2 = Transaction::begin(&log)?;
    t2.add_action(Action::AddFile {
        path: "a".into(),
        size: 2000,
        modification_time: 2,
        data_change: true,
    })?;
    match t2.commit("WRITE", BTreeMap::new(), None) {
        Ok(v2) => println!("T2 unexpectedly committed as version {v2}"),
        Err(e) => println!("T2 failed as expected: {e}"),
    }

    let snapshot = log.checkout()?;
    println!(
        "latest snapshot is version {} with {} actions",
        snapshot.version(),
        snapshot.actions().len()
    );
    Ok(())
}

fn run_sim() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut bus = MessageBus::new(NetworkConfig::default());

    let server_endpoint = Endpoint::new("localhost", 8081);
    let server = KvServer::new(tmp.path().join("server-8081"))?;
    bus.register(server_endpoint.clone(), Rc::new(RefCell::new(server)));

    let mut ring = HashRing::with_default_virtual_nodes();
    ring.add_server(server_endpoint);
    let mut client = KvClient::new(Endpoint::new("localhost", 8080), ring);

    let put_future = client.put(&mut bus, "test-key-1", b"value1".to_vec(), true);
    block_on(&mut bus, &put_future)?;
    println!("put(test-key-1, value1) done at tick {}", bus.current_tick());

    let get_future = client.get(&mut bus, "test-key-1");
    match block_on(&mut bus, &get_future)? {
        Message::GetResponse { data: Some(data), .. } => {
            println!("get(test-key-1) = {:?}", String::from_utf8_lossy(&data));
        }
        other => return Err(anyhow!("unexpected response: {other:?}")),
    }
    Ok(())
}

/// Resolve a user-given path, or fall back to a fresh temp directory that
/// must be kept alive for as long as the path is used.
fn resolve_path(path: Option<PathBuf>, name: &str) -> Result<(Option<tempfile::TempDir>, PathBuf)> {
    match path {
        Some(p) => Ok((None, p)),
        None => {
            let dir = tempfile::tempdir()?;
            let p = dir.path().join(name);
            Ok((Some(dir), p))
        }
    }
}
