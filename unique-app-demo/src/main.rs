use clap::Parser;
use log::debug;
use log::error;
use log::info;
use log::warn;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use unique_app::AppId;
use unique_app::Application;
use unique_app::ApplicationImpl;
use unique_app::ApplicationOptions;
use unique_app::CommandLine;
use unique_app::EmitHooks;
use unique_app::FileRef;
use unique_app::ForwardedCall;
use unique_app::PlatformData;
use unique_app::dbus::DBusNamespace;

const DEFAULT_APP_ID: &str = "io.github.UniqueApp.Demo";

#[derive(Parser, Debug)]
#[command(name = "unique-app-demo")]
#[command(about = "Runs as a single instance, later starts are forwarded to the first one", long_about = None)]
struct Cli {
    /// Application id to register on the session bus
    #[arg(short, long, default_value = DEFAULT_APP_ID)]
    app_id: String,

    /// Only forward to a running instance, never become the primary one
    #[arg(short, long)]
    launcher: bool,

    /// Forward the whole command line and exit with the primary's status
    #[arg(short, long)]
    command_line: bool,

    /// Seconds to wait for a forwarded command line to finish
    #[arg(short, long, default_value_t = 120)]
    timeout: u64,

    /// Hint passed along with opened files (e.g. "edit" or "view")
    #[arg(long, default_value = "")]
    hint: String,

    /// Exit status the primary reports for a forwarded command line
    #[arg(short, long, default_value_t = 0)]
    exit_status: i32,

    /// Files to open
    files: Vec<PathBuf>,
}

#[derive(Debug)]
enum AppMessage {
    Forwarded(ForwardedCall),
    Exit,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(debug_assertions)]
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("unique_app_demo=trace,unique_app=trace"),
    )
    .init();

    #[cfg(not(debug_assertions))]
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("unique_app_demo=info,unique_app=warn"),
    )
    .init();

    let cli = Cli::parse();
    let app_id = AppId::new(cli.app_id.as_str())?;
    let options = ApplicationOptions {
        is_launcher: cli.launcher,
        command_line_timeout: Duration::from_secs(cli.timeout),
    };
    let (appmsg_sender, mut appmsgs) = tokio::sync::mpsc::unbounded_channel::<AppMessage>();

    let sender_for_forwarded = appmsg_sender.clone();
    let mut registration = ApplicationImpl::register(
        Arc::new(DBusNamespace::session()?),
        app_id,
        options,
        move |call| {
            if sender_for_forwarded
                .send(AppMessage::Forwarded(call))
                .is_err()
            {
                warn!("Event loop has exited, dropping forwarded call");
            }
        },
    )?;

    let platform_data = startup_platform_data();
    let files = cli
        .files
        .iter()
        .map(FileRef::for_path)
        .collect::<Result<Vec<_>, _>>()?;

    if registration.is_remote() {
        let status = if cli.command_line {
            registration.command_line(std::env::args_os(), &platform_data)
        } else {
            let forwarded = if files.is_empty() {
                registration.activate(&platform_data)
            } else {
                registration.open(&files, &cli.hint, &platform_data)
            };
            match forwarded {
                Ok(()) => 0,
                Err(e) => {
                    error!("Failed to reach the running instance: {}", e);
                    1
                }
            }
        };
        registration.destroy();
        std::process::exit(status);
    }

    spawn_ctrlc_handler(appmsg_sender.clone())?;

    let mut demo = DemoApp::default();
    if cli.command_line {
        let arguments = std::env::args_os()
            .map(OsString::into_encoded_bytes)
            .collect();
        let mut command_line = CommandLine::local(arguments, platform_data);
        let status = demo.command_line(&mut command_line);
        command_line.set_exit_status(status);
    } else if files.is_empty() {
        demo.activate();
    } else {
        demo.open(&files, &cli.hint);
    }

    let hooks = DemoHooks;
    while let Some(message) = appmsgs.recv().await {
        match message {
            AppMessage::Forwarded(call) => call.run(&mut demo, &hooks),
            AppMessage::Exit => break,
        }
    }

    // Nothing new arrives once the name is released, answer what is queued
    registration.destroy();
    appmsgs.close();
    while let Some(message) = appmsgs.recv().await {
        if let AppMessage::Forwarded(call) = message {
            call.reject();
        }
    }

    info!(
        "Exiting after {} activation(s), {} opened file(s), {} command line(s)",
        demo.activations, demo.opened, demo.command_lines
    );
    Ok(())
}

/// Startup notification id handed over by the launcher, if any
fn startup_platform_data() -> PlatformData {
    std::env::var("DESKTOP_STARTUP_ID")
        .ok()
        .and_then(|id| PlatformData::new("s", id.into_bytes()).ok())
        .unwrap_or_default()
}

fn spawn_ctrlc_handler(sender: UnboundedSender<AppMessage>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        let _ = sender.send(AppMessage::Exit);
    })
}

#[derive(Default)]
struct DemoApp {
    activations: usize,
    opened: usize,
    command_lines: usize,
}

impl Application for DemoApp {
    fn activate(&mut self) {
        self.activations += 1;
        info!("Activated ({} times so far)", self.activations);
    }

    fn open(&mut self, files: &[FileRef], hint: &str) {
        self.opened += files.len();
        for file in files {
            info!("Opening {} (hint '{}')", file, hint);
        }
    }

    fn command_line(&mut self, command_line: &mut CommandLine) -> i32 {
        self.command_lines += 1;

        let cli = match Cli::try_parse_from(command_line.arguments_os()) {
            Ok(cli) => cli,
            Err(e) => {
                command_line.print_error(&e.to_string());
                return 2;
            }
        };

        let origin = if command_line.is_remote() {
            "forwarded"
        } else {
            "local"
        };
        command_line.print(&format!(
            "Handled {} command line #{} with {} file(s)\n",
            origin,
            self.command_lines,
            cli.files.len()
        ));
        cli.exit_status
    }
}

struct DemoHooks;

impl EmitHooks for DemoHooks {
    fn before_emit(&self, platform_data: &PlatformData) {
        if platform_data.type_tag() == "s" {
            debug!(
                "Startup id {}",
                String::from_utf8_lossy(platform_data.payload())
            );
        }
    }

    fn after_emit(&self, _platform_data: &PlatformData) {
        debug!("Forwarded call handled");
    }
}
