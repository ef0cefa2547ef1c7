//! Transport ligne par ligne : une requête JSON par ligne en entrée, une
//! trame JSON par ligne en sortie.

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::bridge::{Bridge, BridgeHandle, Request};
use crate::error::BridgeError;
use crate::sink::Frame;

/// Sert le pont jusqu'à la fin de `input` ou l'annulation de `token`.
///
/// Les requêtes déjà lues sont traitées avant l'arrêt du pont ; toutes les
/// trames produites sont écrites avant le retour.
pub async fn serve<R, W>(
    input: R,
    output: W,
    bridge: Bridge,
    token: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let Bridge {
        handle,
        frames,
        task,
    } = bridge;

    let writer = tokio::spawn(write_frames(frames, output));

    let mut lines = input.lines();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&handle, &line)?,
                Ok(None) => {
                    tracing::info!("[BRIDGE] Fin de l'entrée.");
                    break;
                }
                Err(e) => {
                    tracing::error!("[BRIDGE] Erreur de lecture: {}", e);
                    break;
                }
            }
        }
    }

    // Dernière poignée : le pont vide sa file puis s'arrête
    drop(handle);
    task.await.context("tâche du pont")?;
    writer.await.context("écriture des trames")??;
    Ok(())
}

/// Une ligne vide est ignorée, une ligne illisible est journalisée puis ignorée
fn handle_line(handle: &BridgeHandle, line: &str) -> Result<(), BridgeError> {
    if line.trim().is_empty() {
        return Ok(());
    }

    match Request::parse(line) {
        Ok(request) => handle.send(request),
        Err(e) => {
            tracing::warn!("[BRIDGE] Requête ignorée: {}", e);
            Ok(())
        }
    }
}

async fn write_frames<W>(mut frames: UnboundedReceiver<Frame>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }

    output.shutdown().await?;
    Ok(())
}
