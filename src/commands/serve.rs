//! `graphrag serve`: load the index once and answer HTTP queries.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::graphrag::RetrievalIndex;
use crate::server;

/// Listen address: the CLI override, else `server.addr` from config.
pub fn resolve_addr(config: &Config, addr: Option<&str>) -> Result<SocketAddr> {
    let raw = addr.unwrap_or(config.server_addr.as_str());
    raw.parse::<SocketAddr>()
        .with_context(|| format!("invalid listen address: {}", raw))
}

pub async fn run(config: &Config, addr: Option<&str>) -> Result<()> {
    let addr = resolve_addr(config, addr)?;
    let index = RetrievalIndex::init(config).await?;
    server::serve(addr, Arc::new(index)).await
}
