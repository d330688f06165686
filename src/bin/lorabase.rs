use clap::{App, Arg, ArgMatches, SubCommand};
use colored::*;
use lorabase::protocol::{Frame, StationSnapshot};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("lorabase")
        .version("0.1.0")
        .author("Ground Segment Engineering Team")
        .about("Operator CLI for the LoRa base station coordinator")
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Base station host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Control API port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("json")
                .long("json")
                .help("Print raw JSON responses")
                .global(true),
        )
        .subcommand(SubCommand::with_name("status").about("List registered stations"))
        .subcommand(
            SubCommand::with_name("data")
                .about("Drain collected frames from a station")
                .arg(
                    Arg::with_name("client")
                        .help("Station link address")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("schedule")
                .about("Upload an observation schedule from a JSON file")
                .arg(
                    Arg::with_name("client")
                        .help("Station link address")
                        .required(true),
                )
                .arg(
                    Arg::with_name("file")
                        .help("Path to a JSON array of observation requests")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("register")
                .about("Register a station and persist it to the configuration")
                .arg(
                    Arg::with_name("client")
                        .help("Station link address")
                        .required(true),
                )
                .arg(
                    Arg::with_name("min-freq")
                        .help("Lower bound of the station's radio band, Hz")
                        .required(true)
                        .validator(validate_u64),
                )
                .arg(
                    Arg::with_name("max-freq")
                        .help("Upper bound of the station's radio band, Hz")
                        .required(true)
                        .validator(validate_u64),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap();
    let port = matches.value_of("port").unwrap().parse::<u16>()?;
    let raw_json = matches.is_present("json");

    match matches.subcommand() {
        ("status", _) => handle_status(host, port, raw_json).await?,
        ("data", Some(sub)) => handle_data(sub, host, port, raw_json).await?,
        ("schedule", Some(sub)) => handle_schedule(sub, host, port).await?,
        ("register", Some(sub)) => handle_register(sub, host, port).await?,
        _ => {
            println!(
                "{}",
                "No command specified. Use --help for usage information.".yellow()
            );
        }
    }

    Ok(())
}

fn validate_u64(value: String) -> Result<(), String> {
    value
        .parse::<u64>()
        .map(|_| ())
        .map_err(|_| "expected an unsigned integer".to_string())
}

async fn handle_status(
    host: &str,
    port: u16,
    raw_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (status, body) = send_request(host, port, "GET", "/api/v1/status", None).await?;
    if raw_json {
        println!("{}", body);
        return Ok(());
    }
    if status != 200 {
        print_api_error(status, &body);
        return Ok(());
    }

    let stations: Vec<StationSnapshot> = serde_json::from_str(&body)?;
    if stations.is_empty() {
        println!("{}", "No stations registered".yellow());
        return Ok(());
    }
    for station in stations {
        let battery = match station.battery_level {
            Some(level) if level <= 20 => format!("{}%", level).bright_red(),
            Some(level) => format!("{}%", level).bright_green(),
            None => "n/a".dimmed(),
        };
        println!(
            "{}  band {}-{} Hz  battery {}  {} scheduled observation(s)",
            station.address.bright_cyan(),
            station.min_frequency,
            station.max_frequency,
            battery,
            station.schedule.len()
        );
    }
    Ok(())
}

async fn handle_data(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    raw_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = matches.value_of("client").unwrap();
    let path = format!("/api/v1/data?client={}", encode_query_value(client));
    let (status, body) = send_request(host, port, "GET", &path, None).await?;
    if raw_json {
        println!("{}", body);
        return Ok(());
    }
    if status != 200 {
        print_api_error(status, &body);
        return Ok(());
    }

    let frames: Vec<Frame> = serde_json::from_str(&body)?;
    if frames.is_empty() {
        println!("{}", "No frames pending".yellow());
        return Ok(());
    }
    for frame in frames {
        println!(
            "{}  rssi {} dBm  snr {:.2} dB  freq error {} Hz  {}",
            frame.timestamp_millis.to_string().bright_white(),
            frame.rssi,
            frame.snr,
            frame.frequency_error,
            hex::encode(&frame.data).bright_cyan()
        );
    }
    Ok(())
}

async fn handle_schedule(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = matches.value_of("client").unwrap();
    let file = matches.value_of("file").unwrap();
    let body = std::fs::read_to_string(file)?;

    let path = format!("/api/v1/schedule?client={}", encode_query_value(client));
    let (status, response) = send_request(host, port, "POST", &path, Some(&body)).await?;
    if status == 200 {
        println!("{} Schedule uploaded for {}", "OK".bright_green(), client.bright_cyan());
    } else {
        print_api_error(status, &response);
    }
    Ok(())
}

async fn handle_register(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = matches.value_of("client").unwrap();
    let min_freq = matches.value_of("min-freq").unwrap();
    let max_freq = matches.value_of("max-freq").unwrap();

    let path = format!(
        "/api/v1/client?client={}&minFreq={}&maxFreq={}",
        encode_query_value(client),
        min_freq,
        max_freq
    );
    let (status, response) = send_request(host, port, "POST", &path, None).await?;
    if status == 200 {
        println!("{} Registered {}", "OK".bright_green(), client.bright_cyan());
    } else {
        print_api_error(status, &response);
    }
    Ok(())
}

fn print_api_error(status: u16, body: &str) {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    println!("{} {} {}", "Error".bright_red(), status, message);
}

fn encode_query_value(value: &str) -> String {
    // Addresses only need ':' escaped; everything else the CLI sends is
    // already URL-safe.
    value.replace(':', "%3A")
}

async fn send_request(
    host: &str,
    port: u16,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<(u16, String), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    let mut stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!(
                "{} Failed to connect to base station at {}",
                "Error".bright_red(),
                addr.bright_white()
            );
            return Err(e.into());
        }
    };

    let body = body.unwrap_or("");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        addr,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    tokio::time::timeout(std::time::Duration::from_secs(5), stream.read_to_end(&mut raw))
        .await
        .map_err(|_| "request timed out")??;

    let response = String::from_utf8_lossy(&raw);
    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or("malformed HTTP response")?;
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or("malformed HTTP status line")?;

    Ok((status, body.to_string()))
}
