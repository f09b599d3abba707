//! Per-connection handler: drives the RESP parser over the read half, routes
//! decoded command frames through the façade, and writes replies back in
//! request order.

use crate::client::ClientState;
use crate::db::MultiDb;
use crate::tracing_config::RequestContext;
use anyhow::Result;
use gedis_core::resp::{Reply, RespParser};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// In-flight replies get this long to drain when the connection winds down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    peer_addr: SocketAddr,
    db: Arc<MultiDb>,
    state: ClientState,
}

impl Connection {
    pub fn new(socket: TcpStream, peer_addr: SocketAddr, db: Arc<MultiDb>) -> Self {
        let (reader, writer) = socket.into_split();
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            peer_addr,
            db,
            state: ClientState::new(),
        }
    }

    async fn write_reply(writer: &mut BufWriter<OwnedWriteHalf>, reply: &Reply) -> Result<()> {
        let bytes = reply.to_bytes();
        if bytes.is_empty() {
            return Ok(());
        }
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn handle(&mut self) -> Result<()> {
        let conn_span = info_span!("connection", peer = %self.peer_addr);
        async {
            info!("connection established");
            let mut parser = RespParser::new(&mut self.reader);

            loop {
                let frame = match parser.next().await {
                    None => break,
                    Some(Err(e)) if e.is_protocol() => {
                        // recoverable: answer the error, keep the pipeline
                        warn!(error = %e, "protocol error");
                        Self::write_reply(&mut self.writer, &Reply::err(e.to_string())).await?;
                        continue;
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "connection read failed");
                        break;
                    }
                    Some(Ok(frame)) => frame,
                };

                let Reply::MultiBulk(args) = frame else {
                    error!("expected a multi-bulk command frame");
                    Self::write_reply(&mut self.writer, &Reply::unknown_err()).await?;
                    continue;
                };

                let command = String::from_utf8_lossy(&args[0]).into_owned();
                let req_span = RequestContext::for_client(&self.peer_addr.to_string())
                    .with_command(&command)
                    .span();
                let reply = req_span.in_scope(|| self.db.exec(&mut self.state, &args));
                Self::write_reply(&mut self.writer, &reply).await?;
            }

            // bounded grace period for anything still buffered
            let _ = timeout(DRAIN_TIMEOUT, self.writer.flush()).await;
            info!("connection closed");
            Ok(())
        }
        .instrument(conn_span)
        .await
    }
}
