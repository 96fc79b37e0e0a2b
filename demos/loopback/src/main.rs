use std::error::Error;
use std::time::Duration;

use seqlink::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Workload
// ---------------------------------------------------------------------------

/// Message sizes sent by the client, chosen around the single-datagram and
/// fragment boundaries.
const MESSAGE_SIZES: &[usize] = &[0, 1, 100, 508, 509, 1011, 1200, 5000, 20_000];

fn message(index: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i + index * 31) % 251) as u8).collect()
}

#[derive(Debug, Serialize)]
struct Report {
    messages: usize,
    bytes: usize,
    client: ChannelStats,
    server: ChannelStats,
}

// ---------------------------------------------------------------------------
// Both ends
// ---------------------------------------------------------------------------

/// Echoes `expected` messages back, then waits for the client to leave.
async fn echo(mut server: DriverHandle, expected: usize) -> Result<ChannelStats, BoxError> {
    for _ in 0..expected {
        let message = server.recv().await.ok_or("server driver stopped early")?;
        server.send(message).await?;
    }
    let stats = server.status().await?.stats;
    while server.recv().await.is_some() {}
    server.join().await?;
    Ok(stats)
}

async fn wait_established(handle: &DriverHandle) -> Result<(), BoxError> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.status().await?.state != SessionState::Established {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok::<_, SeqlinkError>(())
    })
    .await
    .map_err(|_| "handshake timed out")??;
    Ok(())
}

async fn run(config: ChannelConfig) -> Result<Report, BoxError> {
    let a = UdpConnection::bind("127.0.0.1:0").await?;
    let b = UdpConnection::bind("127.0.0.1:0").await?;
    a.connect_to(b.local_addr()?).await?;
    b.connect_to(a.local_addr()?).await?;
    tracing::info!(client = %a.local_addr()?, server = %b.local_addr()?, "sockets bound");

    let mut client = ChannelDriver::spawn(a, ReliableChannel::new(config.clone(), KeyedCrc));
    let server = ChannelDriver::spawn(b, ReliableChannel::new(config, KeyedCrc));
    let echo_task = tokio::spawn(echo(server, MESSAGE_SIZES.len()));

    client.connect().await?;
    wait_established(&client).await?;
    client.request_max_timeout().await?;

    let mut bytes = 0;
    for (i, &len) in MESSAGE_SIZES.iter().enumerate() {
        client.send(message(i, len)).await?;
        bytes += len;
    }
    for (i, &len) in MESSAGE_SIZES.iter().enumerate() {
        let echoed = tokio::time::timeout(Duration::from_secs(5), client.recv())
            .await
            .map_err(|_| "echo timed out")?
            .ok_or("client driver stopped early")?;
        if echoed != message(i, len) {
            return Err(format!("echo {i} does not match what was sent").into());
        }
        tracing::info!(index = i, len, "echo verified");
    }

    let client_stats = client.status().await?.stats;
    client.disconnect().await?;
    client.join().await?;
    let server_stats = echo_task.await??;

    Ok(Report {
        messages: MESSAGE_SIZES.len(),
        bytes,
        client: client_stats,
        server: server_stats,
    })
}

fn load_config(path: Option<String>) -> Result<ChannelConfig, BoxError> {
    let Some(path) = path else {
        return Ok(ChannelConfig::default());
    };
    let text = std::fs::read_to_string(&path)?;
    let config: ChannelConfig = serde_json::from_str(&text)?;
    tracing::info!(%path, "loaded channel config");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(std::env::args().nth(1))?;
    let report = run(config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
