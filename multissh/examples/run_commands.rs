//! Connect to a host and run a list of commands over one shell.
//!
//! # Prerequisites
//!
//! - SSH server reachable from this machine
//! - Valid credentials (username/password or SSH key)
//!
//! # Usage
//!
//! ```bash
//! cargo run --example run_commands -- --host localhost --user me --key ~/.ssh/id_ed25519 \
//!     "uname -a" "ls -la" "ls /does-not-exist"
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use multissh::{MultiCommandSession, SessionBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("Connecting to {}:{}...", args.host, args.port);

    let mut builder = SessionBuilder::new(&args.host)
        .port(args.port)
        .username(&args.user)
        .timeout(Duration::from_secs(30));

    if let Some(password) = &args.password {
        builder = builder.password(password);
    } else if let Some(key_path) = &args.key {
        builder = builder.private_key(key_path);
    } else {
        eprintln!("Error: Must provide either --password or --key");
        std::process::exit(1);
    }

    let mut session = builder.open().await?;
    println!(
        "Connected to a {} host, prompt {:?}",
        session.kernel_name(),
        session.shell_prompt()
    );

    let timeout = Duration::from_secs(args.timeout);
    for command in &args.commands {
        println!("\n$ {}", command);
        println!("{}", "-".repeat(50));

        let response = session.run(command, timeout, &[]).await?;
        for line in response.lines() {
            println!("{}", line);
        }
        if let Some(stderr) = &response.stderr {
            eprintln!("stderr: {}", stderr.trim_end());
        }
        if response.timed_out {
            eprintln!("(no prompt within {:?})", timeout);
        }

        println!("{}", "-".repeat(50));
        println!("Completed in {:?}", response.elapsed);
    }

    session.close().await?;
    println!("\nDone!");

    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    timeout: u64,
    commands: Vec<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 22u16;
        let mut user = env::var("USER").unwrap_or_else(|_| "root".to_string());
        let mut password = None;
        let mut key = None;
        let mut timeout = 5u64;
        let mut commands = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = args[i].clone();
                    }
                }
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].parse().unwrap_or(22);
                    }
                }
                "--user" | "-u" => {
                    i += 1;
                    if i < args.len() {
                        user = args[i].clone();
                    }
                }
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = Some(args[i].clone());
                    }
                }
                "--key" | "-k" => {
                    i += 1;
                    if i < args.len() {
                        key = Some(PathBuf::from(&args[i]));
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(5);
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                other => commands.push(other.to_string()),
            }
            i += 1;
        }

        if commands.is_empty() {
            commands = vec!["uname -a".to_string(), "pwd".to_string(), "whoami".to_string()];
        }

        Self {
            host,
            port,
            user,
            password,
            key,
            timeout,
            commands,
        }
    }

    fn print_help() {
        println!(
            r#"multissh run_commands example

USAGE:
    cargo run --example run_commands -- [OPTIONS] [COMMAND]...

OPTIONS:
    -h, --host <HOST>        Target host [default: localhost]
    -p, --port <PORT>        SSH port [default: 22]
    -u, --user <USER>        Username [default: $USER]
    -P, --password <PASS>    Password for authentication
    -k, --key <PATH>         Path to SSH private key
    -t, --timeout <SECS>     Per-command timeout [default: 5]
    --help                   Print this help message

Without commands, runs `uname -a`, `pwd` and `whoami`.
"#
        );
    }
}
