use clap::Parser;
use shared::{Command, Handshake, DEFAULT_PLAYER_PORT};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Minimal line client for poking at a running server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PLAYER_PORT))]
    server: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);

    let (read_half, mut write_half) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();

    // Welcome, quit hint, then either the identity or a rejection
    let mut greeting = Vec::new();
    while greeting.len() < 4 {
        match server_lines.next_line().await? {
            Some(line) => {
                println!("< {}", line);
                greeting.push(line);
            }
            None => {
                println!("Server closed the connection");
                return Ok(());
            }
        }
    }

    match Handshake::from_lines(&greeting[2], &greeting[3]) {
        Some(handshake) => println!("Playing as {} (ID {})", handshake.name, handshake.id),
        None => println!("Unexpected handshake, continuing anyway"),
    }

    let printer = tokio::spawn(async move {
        while let Ok(Some(line)) = server_lines.next_line().await {
            println!("< {}", line);
        }
        println!("Server closed the connection");
    });

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin_lines.next_line().await? {
        let command = Command::parse(&line);
        if let Command::Unknown(text) = &command {
            println!("Unknown command {:?}, use u/d/l/r/b/w/q", text);
            continue;
        }

        write_half.write_all(command.as_line().as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        if command == Command::Quit {
            break;
        }
    }

    let _ = printer.await;
    Ok(())
}
