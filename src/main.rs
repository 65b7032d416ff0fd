//! switchyard demo server.
//!
//! Boots an application with a recovery-wrapped primary group, one plain
//! route and one controller, then serves until SIGINT/SIGTERM (stop) or
//! SIGUSR2 (graceful restart).
//!
//! The runtime is built by hand so that blocking chains abandoned by a
//! timed-out or forced shutdown cannot hold the process open.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use switchyard::config::loader::default_config_path;
use switchyard::config::{load_config, AppConfig};
use switchyard::http::middleware::recovery;
use switchyard::observability::{logging, metrics};
use switchyard::{handler, Application, ControllerOptions};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Demo server for the switchyard dispatch core", long_about = None)]
struct Args {
    /// Config file, defaults to <executable dir>/config/app.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

mod controllers {
    pub mod api {
        use std::time::Duration;

        use axum::http::StatusCode;
        use serde_json::json;
        use switchyard::actions;
        use switchyard::{Action, ApiController, BaseController, Context, Controller, HandlerResult};

        const MAX_SLEEP_MS: u64 = 60_000;

        /// Served at `/api/echo/*`.
        #[derive(Default)]
        pub struct EchoController {
            base: ApiController,
        }

        impl EchoController {
            fn hello_action(&mut self, ctx: &mut Context) -> HandlerResult {
                let name = ctx.params().string_or("name", "world").to_string();
                ctx.string(StatusCode::OK, &format!("hello, {}", name));
                Ok(())
            }

            fn params_action(&mut self, ctx: &mut Context) -> HandlerResult {
                let app = self.base.app().map(|app| app.name().to_string());
                let params: Vec<_> = ctx
                    .params()
                    .iter()
                    .map(|(k, v)| json!({ "key": k, "value": v }))
                    .collect();
                ctx.json(StatusCode::OK, &json!({ "app": app, "params": params }))
            }

            /// Holds a worker for `ms` milliseconds, capped at a minute.
            fn sleep_action(&mut self, ctx: &mut Context) -> HandlerResult {
                let ms = ctx.params().parse_or("ms", 1_000u64).min(MAX_SLEEP_MS);
                std::thread::sleep(Duration::from_millis(ms));
                ctx.string(StatusCode::OK, &format!("slept {}ms", ms));
                Ok(())
            }
        }

        impl Controller for EchoController {
            fn base(&mut self) -> Option<&mut dyn BaseController> {
                Some(&mut self.base)
            }

            fn actions() -> Vec<Action<Self>> {
                actions![EchoController => hello_action, params_action, sleep_action]
            }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(args));
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting with error");
            eprintln!("switchyard: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = if path.exists() {
        load_config(&path)?
    } else {
        AppConfig::default()
    };

    logging::init_logging(&config.observability.log_level, config.app.environment)?;
    tracing::info!(
        config_path = %path.display(),
        found = path.exists(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut app = Application::new(config);
    app.routes().add_middleware(vec![recovery()])?;
    app.routes().get(
        "/",
        vec![handler(|ctx| {
            let banner = format!(
                "{} {} (pid {})",
                ctx.app().name(),
                ctx.app().version(),
                std::process::id()
            );
            ctx.string(axum::http::StatusCode::OK, &banner);
            Ok(())
        })],
    )?;
    app.routes()
        .register_controller::<controllers::api::EchoController>(ControllerOptions::default())?;

    app.start().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
