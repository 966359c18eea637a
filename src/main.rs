//! wireprobe command-line front end.
//!
//! ```text
//! wireprobe http <URL> [-X METHOD] [-H LINE]... [-d BODY] [-F FIELD]... [-i] [--json]
//! wireprobe ws   <URL> [-H LINE]... [--protocol P]... [-m MESSAGE]... [--ping]
//! ```
//!
//! Response bytes go to stdout, logs to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use wireprobe::config::loader::load_config;
use wireprobe::config::{ProbeConfig, ProxyConfig, Target};
use wireprobe::http::{self, ParsedResponse, RequestMessage};
use wireprobe::observability::logging;
use wireprobe::websocket::{Message, Session, SessionConfig, SessionEvent};

#[derive(Parser)]
#[command(name = "wireprobe", version)]
#[command(about = "Raw-socket HTTP/1.1 and WebSocket client for security testing", long_about = None)]
struct Cli {
    /// TOML file with default timeout, proxy and headers
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one HTTP request and print the response
    Http(HttpArgs),
    /// Open a WebSocket session and relay messages
    Ws(WsArgs),
}

#[derive(Args)]
struct ConnectionArgs {
    /// Raw header line (`Name: value`), repeatable, sent as given
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Cookie header value
    #[arg(short = 'b', long)]
    cookie: Option<String>,

    /// Proxy as host:port
    #[arg(long)]
    proxy: Option<String>,

    /// Per-phase timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args)]
struct HttpArgs {
    url: String,

    /// Request method (GET, or POST when a body or form is given)
    #[arg(short = 'X', long)]
    method: Option<String>,

    /// Raw request body
    #[arg(short = 'd', long)]
    data: Option<String>,

    /// Multipart field: name=value or name=@path;filename=X;type=Y
    #[arg(short = 'F', long = "form")]
    form: Vec<String>,

    /// Print the raw response, headers included
    #[arg(short = 'i', long)]
    include: bool,

    /// Print the parsed response as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Args)]
struct WsArgs {
    url: String,

    /// Subprotocol to offer, repeatable
    #[arg(long = "protocol")]
    protocols: Vec<String>,

    /// Text message sent right after the session opens, repeatable
    #[arg(short = 'm', long = "message")]
    messages: Vec<String>,

    /// Send a ping after opening
    #[arg(long)]
    ping: bool,

    #[command(flatten)]
    connection: ConnectionArgs,
}

/// File defaults merged with command-line flags.
struct Resolved {
    headers: Vec<String>,
    proxy: Option<ProxyConfig>,
    timeout: Duration,
}

impl Resolved {
    fn new(file: &ProbeConfig, args: &ConnectionArgs) -> wireprobe::ProbeResult<Self> {
        let proxy = match args.proxy.as_deref().or(file.proxy.as_deref()) {
            Some(spec) => Some(ProxyConfig::parse(spec)?),
            None => None,
        };
        let mut headers = file.headers.clone();
        headers.extend(args.headers.iter().cloned());
        Ok(Self {
            headers,
            proxy,
            timeout: Duration::from_millis(args.timeout.unwrap_or(file.timeout_ms)),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProbeConfig::default(),
    };
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| file.observability.log_level.clone());
    logging::init(&level);

    match cli.command {
        Commands::Http(args) => run_http(&file, args).await,
        Commands::Ws(args) => run_ws(&file, args).await,
    }
}

async fn run_http(file: &ProbeConfig, args: HttpArgs) -> Result<(), Box<dyn std::error::Error>> {
    let target = Target::parse(&args.url)?;
    let resolved = Resolved::new(file, &args.connection)?;

    let has_body = args.data.is_some() || !args.form.is_empty();
    let method = args
        .method
        .unwrap_or_else(|| if has_body { "POST" } else { "GET" }.to_string());

    let mut request = RequestMessage::new(method, &target);
    request.headers = resolved.headers;
    request.cookie = args.connection.cookie;
    request.body = args.data;
    request.form = args.form;

    let exchange = http::send(request, resolved.proxy.as_ref(), resolved.timeout).await?;

    let mut stdout = std::io::stdout().lock();
    if args.json {
        let report = match &exchange.response {
            ParsedResponse::Valid(response) => serde_json::json!({
                "valid": true,
                "http_version": response.http_version,
                "status_code": response.status_code,
                "status_text": response.status_text,
                "headers": response.headers,
                "body": response.body_text(),
                "elapsed_ms": exchange.elapsed.as_millis() as u64,
            }),
            ParsedResponse::Invalid { reason } => serde_json::json!({
                "valid": false,
                "reason": reason,
                "raw": String::from_utf8_lossy(&exchange.raw),
                "elapsed_ms": exchange.elapsed.as_millis() as u64,
            }),
        };
        writeln!(stdout, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        match &exchange.response {
            ParsedResponse::Valid(response) if !args.include => stdout.write_all(&response.body)?,
            _ => stdout.write_all(&exchange.raw)?,
        }
    }
    stdout.flush()?;
    Ok(())
}

async fn run_ws(file: &ProbeConfig, args: WsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let target = Target::parse(&args.url)?;
    let resolved = Resolved::new(file, &args.connection)?;

    let mut config = SessionConfig::new(&target);
    config.headers = resolved.headers;
    config.cookie = args.connection.cookie;
    config.proxy = resolved.proxy;
    config.timeout = resolved.timeout;
    config.subprotocols = if args.protocols.is_empty() {
        file.subprotocols.clone()
    } else {
        args.protocols
    };

    let mut session = Session::new(config);
    session.connect().await?;
    let sender = session
        .sender()
        .ok_or("session opened without a write handle")?;

    for message in &args.messages {
        sender.send_text(message)?;
    }
    if args.ping {
        sender.ping(b"wireprobe")?;
    }

    // stdin lines become text messages; EOF on stdin closes the session.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = session.next_event() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = sender.send_text(&line) {
                        eprintln!("! {}", e);
                    }
                }
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    sender.close();
                }
            },
        }
    }
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Open { protocol } => match protocol {
            Some(p) => eprintln!("* open (protocol {})", p),
            None => eprintln!("* open"),
        },
        SessionEvent::Message(Message::Text(text)) => println!("< {}", text),
        SessionEvent::Message(Message::Binary(bytes)) => {
            println!("< [{} bytes binary] {:02x?}", bytes.len(), &bytes[..bytes.len().min(32)])
        }
        SessionEvent::Ping(payload) => eprintln!("* ping {:?}", String::from_utf8_lossy(payload)),
        SessionEvent::Pong(payload) => eprintln!("* pong {:?}", String::from_utf8_lossy(payload)),
        SessionEvent::Close { code, reason } => match code {
            Some(code) => eprintln!("* close {} {}", code, reason),
            None => eprintln!("* close"),
        },
        SessionEvent::Error(e) => eprintln!("! {}", e),
    }
}
