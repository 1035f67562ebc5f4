//! Connection gateway for players and spectators
//!
//! Each player connection gets two tasks: a reader that turns lines into
//! `MatchCommand::Input` messages and a writer that drains the player's
//! outbox. The session never touches a socket directly.

use crate::error::MatchError;
use crate::session::{MatchCommand, PlayerTicket};
use log::{debug, error, info, warn};
use shared::{Command, PlayerId, QUIT_HINT_LINE, WELCOME_LINE};
use std::io;
use std::net::SocketAddr;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

/// Longest command line accepted from a player, newline included
const MAX_LINE_BYTES: u64 = 256;

pub const LINE_TOO_LONG_NOTICE: &str = "Line too long";

/// Accepts player connections until the listener fails for good
pub async fn accept_players(listener: TcpListener, commands: mpsc::Sender<MatchCommand>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Player connection from {}", addr);
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                }

                let commands = commands.clone();
                tokio::spawn(async move {
                    match handle_player(stream, addr, commands).await {
                        Ok(()) => debug!("Connection from {} closed", addr),
                        Err(MatchError::EngineClosed) => {
                            debug!("Engine stopped while {} was connected", addr)
                        }
                        Err(e) => info!("Connection from {} ended: {}", addr, e),
                    }
                });
            }
            Err(e) => {
                error!("Error accepting player connection: {}", e);
            }
        }
    }
}

/// Accepts spectator connections and hands them to the fan-out task
pub async fn accept_spectators(listener: TcpListener, attach: mpsc::UnboundedSender<TcpStream>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Spectator connected from {}", addr);
                if attach.send(stream).is_err() {
                    warn!("Spectator fan-out is gone, no longer accepting spectators");
                    break;
                }
            }
            Err(e) => {
                error!("Error accepting spectator connection: {}", e);
            }
        }
    }
}

/// Runs one player connection from handshake to disconnect
pub async fn handle_player<S>(
    stream: S,
    addr: SocketAddr,
    commands: mpsc::Sender<MatchCommand>,
) -> Result<(), MatchError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (outbox, inbox) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_lines(writer, inbox));

    queue_line(&outbox, WELCOME_LINE);
    queue_line(&outbox, QUIT_HINT_LINE);

    let ticket = match join(addr, &outbox, &commands).await {
        Ok(ticket) => ticket,
        Err(e) => {
            if let Some(message) = e.rejection_message() {
                queue_line(&outbox, message);
            }
            drop(outbox);
            if let Ok(Err(write_error)) = writer_task.await {
                debug!("Failed to deliver rejection to {}: {}", addr, write_error);
            }
            return Err(e);
        }
    };

    info!("{} playing as {} from {}", ticket.name, ticket.id, addr);
    let result = read_commands(reader, ticket.id, &outbox, &commands).await;

    if commands
        .send(MatchCommand::Leave { player: ticket.id })
        .await
        .is_err()
    {
        debug!("Engine gone before {} could leave", ticket.id);
    }

    result
}

async fn join(
    addr: SocketAddr,
    outbox: &mpsc::UnboundedSender<String>,
    commands: &mpsc::Sender<MatchCommand>,
) -> Result<PlayerTicket, MatchError> {
    let (reply, reply_rx) = oneshot::channel();
    commands
        .send(MatchCommand::Join {
            addr,
            outbox: outbox.clone(),
            reply,
        })
        .await
        .map_err(|_| MatchError::EngineClosed)?;

    reply_rx.await.map_err(|_| MatchError::EngineClosed)?
}

/// Forwards every received line to the session, echoing it back first
///
/// Bytes that are not UTF-8 are replaced rather than treated as a broken
/// connection; overlong lines are dropped with a notice. Only EOF, a real
/// I/O error or a quit ends the loop.
async fn read_commands<R>(
    reader: R,
    player: PlayerId,
    outbox: &mpsc::UnboundedSender<String>,
    commands: &mpsc::Sender<MatchCommand>,
) -> Result<(), MatchError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);

    loop {
        let line = match read_line_capped(&mut reader).await? {
            LineRead::Line(line) => line,
            LineRead::TooLong => {
                debug!("Dropped an overlong line from player {}", player);
                queue_line(outbox, LINE_TOO_LONG_NOTICE);
                continue;
            }
            LineRead::Eof => break,
        };

        queue_line(outbox, line.clone());
        let quit = matches!(Command::parse(&line), Command::Quit);

        commands
            .send(MatchCommand::Input { player, text: line })
            .await
            .map_err(|_| MatchError::EngineClosed)?;

        if quit {
            break;
        }
    }

    Ok(())
}

enum LineRead {
    Line(String),
    TooLong,
    Eof,
}

/// Reads one line of at most `MAX_LINE_BYTES`, decoding it lossily
async fn read_line_capped<R>(reader: &mut R) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES)
        .read_until(b'\n', &mut buf)
        .await?;

    if read == 0 {
        return Ok(LineRead::Eof);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if read as u64 >= MAX_LINE_BYTES {
        // skip the rest of the line
        loop {
            buf.clear();
            let read = (&mut *reader)
                .take(MAX_LINE_BYTES)
                .read_until(b'\n', &mut buf)
                .await?;
            if read == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(LineRead::TooLong);
    }

    Ok(LineRead::Line(String::from_utf8_lossy(&buf).into_owned()))
}

fn queue_line(outbox: &mpsc::UnboundedSender<String>, line: impl Into<String>) {
    if outbox.send(line.into()).is_err() {
        debug!("Connection writer is gone, dropping outgoing line");
    }
}

/// Writes queued lines until every sender is dropped, then closes the stream
async fn write_lines<W>(mut writer: W, mut inbox: mpsc::UnboundedReceiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = inbox.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    writer.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Handshake, CAPACITY_REJECTION};
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};

    type ClientLines = Lines<BufReader<ReadHalf<DuplexStream>>>;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn connect(
        commands: mpsc::Sender<MatchCommand>,
    ) -> (
        ClientLines,
        WriteHalf<DuplexStream>,
        tokio::task::JoinHandle<Result<(), MatchError>>,
    ) {
        let (client, server_side) = tokio::io::duplex(1024);
        let handle = tokio::spawn(handle_player(server_side, test_addr(), commands));
        let (read, write) = tokio::io::split(client);
        (BufReader::new(read).lines(), write, handle)
    }

    async fn next_line(lines: &mut ClientLines) -> Option<String> {
        lines.next_line().await.unwrap()
    }

    #[tokio::test]
    async fn test_handshake_echo_and_quit() {
        let (tx, mut rx) = mpsc::channel(16);
        let (mut lines, mut write, handle) = connect(tx);

        let Some(MatchCommand::Join { outbox, reply, .. }) = rx.recv().await else {
            panic!("expected a join");
        };
        let handshake = Handshake {
            id: PlayerId(1),
            name: "blue1".to_string(),
        };
        outbox.send(handshake.id_line()).unwrap();
        outbox.send(handshake.name_line()).unwrap();
        reply
            .send(Ok(PlayerTicket {
                id: handshake.id,
                name: handshake.name.clone(),
            }))
            .unwrap();

        assert_eq!(next_line(&mut lines).await.unwrap(), WELCOME_LINE);
        assert_eq!(next_line(&mut lines).await.unwrap(), QUIT_HINT_LINE);
        assert_eq!(next_line(&mut lines).await.unwrap(), "YourID:1");
        assert_eq!(next_line(&mut lines).await.unwrap(), "YourName:blue1");

        write.write_all(b"u\n").await.unwrap();
        assert_eq!(next_line(&mut lines).await.unwrap(), "u");
        match rx.recv().await {
            Some(MatchCommand::Input { player, text }) => {
                assert_eq!(player, PlayerId(1));
                assert_eq!(text, "u");
            }
            other => panic!("expected input, got {:?}", other),
        }

        write.write_all(b"q\n").await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(MatchCommand::Input { ref text, .. }) if text == "q"
        ));
        assert!(matches!(
            rx.recv().await,
            Some(MatchCommand::Leave { player: PlayerId(1) })
        ));

        handle.await.unwrap().unwrap();
        drop(outbox);
    }

    #[tokio::test]
    async fn test_rejected_join_writes_message_and_closes() {
        let (tx, mut rx) = mpsc::channel(16);
        let (mut lines, _write, handle) = connect(tx);

        let Some(MatchCommand::Join { outbox, reply, .. }) = rx.recv().await else {
            panic!("expected a join");
        };
        drop(outbox);
        reply
            .send(Err(MatchError::CapacityExceeded { max: 1 }))
            .unwrap();

        assert_eq!(next_line(&mut lines).await.unwrap(), WELCOME_LINE);
        assert_eq!(next_line(&mut lines).await.unwrap(), QUIT_HINT_LINE);
        assert_eq!(next_line(&mut lines).await.unwrap(), CAPACITY_REJECTION);
        assert_eq!(next_line(&mut lines).await, None);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(MatchError::CapacityExceeded { max: 1 })));
    }

    #[tokio::test]
    async fn test_eof_reports_leave() {
        let (tx, mut rx) = mpsc::channel(16);
        let (_lines, mut write, handle) = connect(tx);

        let Some(MatchCommand::Join { reply, .. }) = rx.recv().await else {
            panic!("expected a join");
        };
        reply
            .send(Ok(PlayerTicket {
                id: PlayerId(7),
                name: "magenta7".to_string(),
            }))
            .unwrap();

        write.shutdown().await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(MatchCommand::Leave { player: PlayerId(7) })
        ));
        assert!(handle.await.unwrap().is_ok());
    }

    async fn accept_join(rx: &mut mpsc::Receiver<MatchCommand>, id: PlayerId) {
        let Some(MatchCommand::Join { reply, .. }) = rx.recv().await else {
            panic!("expected a join");
        };
        reply
            .send(Ok(PlayerTicket {
                id,
                name: "blue1".to_string(),
            }))
            .unwrap();
    }

    async fn next_input(rx: &mut mpsc::Receiver<MatchCommand>) -> String {
        match rx.recv().await {
            Some(MatchCommand::Input { text, .. }) => text,
            other => panic!("expected input, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_connection() {
        let (tx, mut rx) = mpsc::channel(16);
        let (_lines, mut write, handle) = connect(tx);
        accept_join(&mut rx, PlayerId(1)).await;

        write.write_all(b"\xff\xfe\nu\n").await.unwrap();

        assert_eq!(next_input(&mut rx).await, "\u{FFFD}\u{FFFD}");
        assert_eq!(next_input(&mut rx).await, "u");

        write.shutdown().await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(MatchCommand::Leave { player: PlayerId(1) })
        ));
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_overlong_line_is_dropped_with_notice() {
        let (tx, mut rx) = mpsc::channel(16);
        let (mut lines, mut write, _handle) = connect(tx);
        accept_join(&mut rx, PlayerId(1)).await;

        let mut flood = vec![b'a'; 600];
        flood.extend_from_slice(b"\nu\n");
        write.write_all(&flood).await.unwrap();

        assert_eq!(next_input(&mut rx).await, "u");
        assert_eq!(next_line(&mut lines).await.unwrap(), WELCOME_LINE);
        assert_eq!(next_line(&mut lines).await.unwrap(), QUIT_HINT_LINE);
        assert_eq!(next_line(&mut lines).await.unwrap(), LINE_TOO_LONG_NOTICE);
        assert_eq!(next_line(&mut lines).await.unwrap(), "u");
    }

    #[tokio::test]
    async fn test_crlf_line_endings_are_stripped() {
        let (tx, mut rx) = mpsc::channel(16);
        let (_lines, mut write, _handle) = connect(tx);
        accept_join(&mut rx, PlayerId(1)).await;

        write.write_all(b"b\r\n").await.unwrap();
        assert_eq!(next_input(&mut rx).await, "b");
    }

    #[tokio::test]
    async fn test_closed_engine_is_reported() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let (_lines, _write, handle) = connect(tx);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(MatchError::EngineClosed)));
    }
}
