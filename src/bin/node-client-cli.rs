//! node-client-cli
//!
//! A small interactive client for exercising [`redis_node_client::NodeClient`]
//! against a single Redis node: connect, then issue PING/GET/SET from the
//! command line, same shape as the teacher's own `cli.rs` but driving the
//! reconnecting pipeline instead of a one-shot request/response `Client`.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use redis_node_client::{Command, Frame, NodeClient, NodeClientOptions, DEFAULT_PORT};
use std::convert::Infallible;
use std::num::ParseIntError;
use std::str;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(
    name = "node-client-cli",
    version,
    author,
    about = "Issue Redis commands through a reconnecting single-node client"
)]
struct Cli {
    #[clap(subcommand)]
    command: Cmd,

    #[clap(name = "hostname", long, default_value = "127.0.0.1")]
    host: String,

    #[clap(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// How long to wait for a reply before giving up.
    #[clap(long, value_parser = duration_from_ms_str, default_value = "5000")]
    timeout: Duration,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    Ping {
        #[clap(value_parser = bytes_from_str)]
        msg: Option<Bytes>,
    },
    Get {
        key: String,
    },
    Set {
        key: String,

        #[clap(value_parser = bytes_from_str)]
        value: Bytes,

        #[clap(long, value_parser = duration_from_ms_str)]
        expires: Option<Duration>,
    },
}

/// `current_thread` flavor: a CLI issuing one command per invocation has no
/// use for a multi-threaded runtime.
#[tokio::main(flavor = "current_thread")]
async fn main() -> redis_node_client::Result<()> {
    tracing_subscriber::fmt::try_init()?;

    let cli = Cli::parse();
    let options = NodeClientOptions::new(cli.host, cli.port);
    let client = NodeClient::start(options).await?;

    let command = match cli.command {
        Cmd::Ping { msg } => Command::ping(msg),
        Cmd::Get { key } => Command::get(key),
        Cmd::Set {
            key,
            value,
            expires,
        } => Command::set(key, value, expires),
    };

    match client.command(command, cli.timeout).await {
        redis_node_client::Reply::Ok(frame) => print_frame(&frame),
        redis_node_client::Reply::Err(e) => eprintln!("error: {e}"),
    }

    client.stop().await;
    Ok(())
}

fn print_frame(frame: &Frame) {
    match frame {
        Frame::Null => println!("(nil)"),
        Frame::Bulk(b) => match str::from_utf8(b) {
            Ok(s) => println!("\"{s}\""),
            Err(_) => println!("{b:?}"),
        },
        other => println!("{other}"),
    }
}

fn duration_from_ms_str(src: &str) -> Result<Duration, ParseIntError> {
    let ms = src.parse::<u64>()?;
    Ok(Duration::from_millis(ms))
}

fn bytes_from_str(src: &str) -> Result<Bytes, Infallible> {
    Ok(Bytes::from(src.to_string()))
}
