use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::colorizer_service::ColorizerService;
use crate::errors::Result;

/// Accept connections on `bind_address` until Ctrl-C, one task per connection.
pub async fn run(bind_address: &str, service: ColorizerService) -> Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    info!("listening on {}", listener.local_addr()?);
    serve(listener, service).await
}

pub async fn serve(listener: TcpListener, service: ColorizerService) -> Result<()> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!("failed to accept connection: {}", err);
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        };
        debug!("connection from {}", peer);

        let service = service.clone();
        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                warn!("connection from {} failed: {}", peer, err);
            }
        });
    }
}
