use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "switchyard-ctl")]
#[command(about = "Control a running switchyard server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain in-flight requests and stop (SIGTERM)
    Stop {
        #[arg(short, long)]
        pid: i32,
    },
    /// Hand the listener to a fresh process, then stop (SIGUSR2)
    Restart {
        #[arg(short, long)]
        pid: i32,
    },
    /// Probe the health endpoint
    Health {
        #[arg(short, long, default_value = "http://localhost:8080/healthz")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Stop { pid } => send_signal(pid, Lifecycle::Stop)?,
        Commands::Restart { pid } => send_signal(pid, Lifecycle::Restart)?,
        Commands::Health { url } => {
            let res = reqwest::get(&url).await?;
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            if status.is_success() {
                println!("healthy: {} {}", status, body.trim());
            } else {
                eprintln!("Error: health check returned status {}", status);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

enum Lifecycle {
    Stop,
    Restart,
}

#[cfg(unix)]
fn send_signal(pid: i32, action: Lifecycle) -> Result<(), Box<dyn std::error::Error>> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = match action {
        Lifecycle::Stop => Signal::SIGTERM,
        Lifecycle::Restart => Signal::SIGUSR2,
    };
    kill(Pid::from_raw(pid), signal)?;
    println!("sent {:?} to {}", signal, pid);
    Ok(())
}

#[cfg(not(unix))]
fn send_signal(_pid: i32, _action: Lifecycle) -> Result<(), Box<dyn std::error::Error>> {
    Err("signals are only supported on unix".into())
}
